//! The quick-access list: which messages and combinations the overlay shows,
//! in which order.

use std::{collections::HashSet, sync::Arc};

use kenflow_protocol::{
    ItemKind, SelectionEntry,
    api::{Combination, Message},
};
use serde_json::Value;
use tracing::{debug, info};

use crate::{Result, bus::Bus, store::LocalStore};

/// Authoritative ordered list of `{item_id, item_type}` entries.
pub const QUICK_ACCESS_KEY: &str = "quick_access";
/// Ordered message ids, kept alongside the unified list.
pub const MESSAGES_KEY: &str = "overlay_messages";
/// Ordered combination ids, kept alongside the unified list.
pub const COMBINATIONS_KEY: &str = "overlay_combinations";

/// Persistence of the quick-access list in the local store.
#[derive(Debug, Clone)]
pub struct SelectionStore {
    /// Backing key/value store.
    store: Arc<LocalStore>,
}

impl SelectionStore {
    /// Selection persistence over `store`.
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// The committed list. Falls back to the per-type id arrays (messages,
    /// then combinations) when the unified list was never written.
    pub fn load(&self) -> Vec<SelectionEntry> {
        if let Some(entries) = self.store.get::<Vec<SelectionEntry>>(QUICK_ACCESS_KEY) {
            return dedup(entries);
        }
        let mut entries = Vec::new();
        for (key, kind) in [
            (MESSAGES_KEY, ItemKind::Message),
            (COMBINATIONS_KEY, ItemKind::Combination),
        ] {
            let ids = self.store.get::<Vec<Value>>(key).unwrap_or_default();
            entries.extend(
                ids.iter()
                    .filter_map(id_string)
                    .map(|id| SelectionEntry::new(id, kind)),
            );
        }
        dedup(entries)
    }

    /// Write `entries` as the committed list.
    pub fn save(&self, entries: &[SelectionEntry]) -> Result<()> {
        let ids_of = |kind: ItemKind| {
            entries
                .iter()
                .filter(|e| e.item_type == kind)
                .map(|e| e.item_id.as_str())
                .collect::<Vec<_>>()
        };
        self.store.set(QUICK_ACCESS_KEY, entries)?;
        self.store.set(MESSAGES_KEY, &ids_of(ItemKind::Message))?;
        self.store
            .set(COMBINATIONS_KEY, &ids_of(ItemKind::Combination))?;
        Ok(())
    }
}

/// Coerce a stored id (string or number) to its string form.
fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Drop repeated `(item_id, item_type)` pairs, keeping first occurrences.
fn dedup(entries: Vec<SelectionEntry>) -> Vec<SelectionEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(e.clone()))
        .collect()
}

/// In-memory working copy of the list, edited while the item picker is open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    /// Ordered unique entries.
    entries: Vec<SelectionEntry>,
    /// Changed since the last commit.
    dirty: bool,
}

impl SelectionState {
    /// Working copy starting from `entries`.
    pub fn new(entries: Vec<SelectionEntry>) -> Self {
        Self {
            entries: dedup(entries),
            dirty: false,
        }
    }

    /// Working copy of the committed list.
    pub fn load(store: &SelectionStore) -> Self {
        Self::new(store.load())
    }

    /// Current entries in order.
    pub fn entries(&self) -> &[SelectionEntry] {
        &self.entries
    }

    /// Whether `entry` is selected.
    pub fn contains(&self, entry: &SelectionEntry) -> bool {
        self.entries.contains(entry)
    }

    /// Position of `entry`.
    pub fn position(&self, entry: &SelectionEntry) -> Option<usize> {
        self.entries.iter().position(|e| e == entry)
    }

    /// Whether there are uncommitted edits.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Add (`present`) or remove `entry`. Adding appends; adding an entry that
    /// is already there and removing a missing one are no-ops. Returns whether
    /// the list changed.
    pub fn toggle(&mut self, entry: SelectionEntry, present: bool) -> bool {
        let changed = match (present, self.position(&entry)) {
            (true, None) => {
                self.entries.push(entry);
                true
            }
            (false, Some(i)) => {
                self.entries.remove(i);
                true
            }
            _ => false,
        };
        self.dirty |= changed;
        changed
    }

    /// Move the entry at `from` to `to`, shifting the entries in between.
    /// Equal or out-of-range indices are a no-op.
    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        if from == to || from >= self.entries.len() || to >= self.entries.len() {
            return false;
        }
        let e = self.entries.remove(from);
        self.entries.insert(to, e);
        self.dirty = true;
        true
    }

    /// Persist the working copy and ask every surface to refresh. On failure
    /// the working copy stays active and dirty.
    pub fn commit(&mut self, store: &SelectionStore, bus: &Bus) -> Result<()> {
        store.save(&self.entries)?;
        self.dirty = false;
        info!(count = self.entries.len(), "quick-access list committed");
        bus.refresh();
        Ok(())
    }
}

/// A selected entry resolved against the backend library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickItem {
    /// The entry.
    pub entry: SelectionEntry,
    /// Backend id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Assigned hotkey.
    pub trigger_key: Option<String>,
    /// Icon class.
    pub icon: Option<String>,
    /// Number of messages, for combinations.
    pub item_count: Option<usize>,
}

impl QuickItem {
    /// Item for a message.
    pub fn from_message(m: &Message) -> Self {
        Self {
            entry: SelectionEntry::message(m.id),
            id: m.id,
            name: m.name.clone(),
            trigger_key: m.trigger_key.clone(),
            icon: m.icon.clone(),
            item_count: None,
        }
    }

    /// Item for a combination.
    pub fn from_combination(c: &Combination) -> Self {
        Self {
            entry: SelectionEntry::combination(c.id),
            id: c.id,
            name: c.name.clone(),
            trigger_key: c.trigger_key.clone(),
            icon: c.icon.clone(),
            item_count: Some(c.items.len()),
        }
    }

    /// Item kind.
    pub fn kind(&self) -> ItemKind {
        self.entry.item_type
    }
}

/// Look up one entry in the library.
pub fn resolve_entry(
    entry: &SelectionEntry,
    messages: &[Message],
    combinations: &[Combination],
) -> Option<QuickItem> {
    match entry.item_type {
        ItemKind::Message => messages
            .iter()
            .find(|m| entry.refers_to(ItemKind::Message, m.id))
            .map(QuickItem::from_message),
        ItemKind::Combination => combinations
            .iter()
            .find(|c| entry.refers_to(ItemKind::Combination, c.id))
            .map(QuickItem::from_combination),
    }
}

/// Resolve `entries` in order, skipping entries whose item no longer exists.
pub fn resolve(
    entries: &[SelectionEntry],
    messages: &[Message],
    combinations: &[Combination],
) -> Vec<QuickItem> {
    let items: Vec<QuickItem> = entries
        .iter()
        .filter_map(|e| resolve_entry(e, messages, combinations))
        .collect();
    if items.len() != entries.len() {
        debug!(
            stale = entries.len() - items.len(),
            "skipping stale quick-access entries"
        );
    }
    items
}

/// One row of the item picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickerRow {
    /// The library item.
    pub item: QuickItem,
    /// Position in the working list, when selected.
    pub position: Option<usize>,
}

impl PickerRow {
    /// Whether the row is selected.
    pub fn selected(&self) -> bool {
        self.position.is_some()
    }
}

/// Picker listing: selected items first in list order, then the rest of the
/// library (messages, then combinations).
pub fn picker_rows(
    state: &SelectionState,
    messages: &[Message],
    combinations: &[Combination],
) -> Vec<PickerRow> {
    let mut rows: Vec<PickerRow> = state
        .entries()
        .iter()
        .enumerate()
        .filter_map(|(i, e)| {
            resolve_entry(e, messages, combinations).map(|item| PickerRow {
                item,
                position: Some(i),
            })
        })
        .collect();
    let rest = messages
        .iter()
        .map(QuickItem::from_message)
        .chain(combinations.iter().map(QuickItem::from_combination))
        .filter(|item| !state.contains(&item.entry))
        .map(|item| PickerRow {
            item,
            position: None,
        });
    rows.extend(rest);
    rows
}

#[cfg(test)]
mod tests {
    use kenflow_protocol::{Signal, WindowKind};
    use proptest::prelude::*;

    use super::*;

    fn msg(id: i64, name: &str) -> Message {
        Message {
            id,
            name: name.into(),
            trigger_key: None,
            icon: None,
            templates: Vec::new(),
        }
    }

    fn combo(id: i64, name: &str) -> Combination {
        Combination {
            id,
            name: name.into(),
            trigger_key: None,
            icon: None,
            delay_ms: 500,
            items: Vec::new(),
        }
    }

    fn store() -> (tempfile::TempDir, SelectionStore, Arc<LocalStore>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let local = Arc::new(LocalStore::new(dir.path().join("local-state.json")));
        (dir, SelectionStore::new(local.clone()), local)
    }

    #[test]
    fn toggle_appends_once_and_removes() {
        let mut s = SelectionState::default();
        assert!(s.toggle(SelectionEntry::message(1), true));
        assert!(!s.toggle(SelectionEntry::message(1), true));
        assert!(s.toggle(SelectionEntry::combination(1), true));
        assert_eq!(s.entries().len(), 2);
        assert!(s.toggle(SelectionEntry::message(1), false));
        assert!(!s.toggle(SelectionEntry::message(1), false));
        assert_eq!(s.entries(), &[SelectionEntry::combination(1)]);
        assert!(s.is_dirty());
    }

    #[test]
    fn reorder_edges() {
        let mut s = SelectionState::new(vec![
            SelectionEntry::message(1),
            SelectionEntry::message(2),
            SelectionEntry::message(3),
        ]);
        assert!(!s.reorder(1, 1));
        assert!(!s.reorder(0, 3));
        assert!(!s.is_dirty());
        assert!(s.reorder(0, 2));
        let ids: Vec<&str> = s.entries().iter().map(|e| e.item_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3", "1"]);
    }

    #[test]
    fn commit_writes_both_forms_and_signals() {
        let (_dir, store, local) = store();
        let bus = Bus::new();
        let mut overlay = bus.subscribe(WindowKind::Overlay);
        let mut s = SelectionState::default();
        s.toggle(SelectionEntry::combination(5), true);
        s.toggle(SelectionEntry::message(1), true);
        s.commit(&store, &bus).expect("commit");
        assert!(!s.is_dirty());
        assert_eq!(overlay.try_recv(), Some(Signal::Refresh));
        assert_eq!(store.load(), s.entries());
        assert_eq!(local.get::<Vec<String>>(MESSAGES_KEY), Some(vec!["1".into()]));
        assert_eq!(
            local.get::<Vec<String>>(COMBINATIONS_KEY),
            Some(vec!["5".into()])
        );
    }

    #[test]
    fn legacy_arrays_load_messages_first() {
        let (_dir, store, local) = store();
        local
            .set(MESSAGES_KEY, &serde_json::json!([3, "1", 3]))
            .expect("set");
        local
            .set(COMBINATIONS_KEY, &serde_json::json!(["5"]))
            .expect("set");
        assert_eq!(
            store.load(),
            vec![
                SelectionEntry::message(3),
                SelectionEntry::message(1),
                SelectionEntry::combination(5),
            ]
        );
    }

    #[test]
    fn stale_entries_are_filtered() {
        let entries = vec![
            SelectionEntry::message(1),
            SelectionEntry::message(9),
            SelectionEntry::combination(5),
        ];
        let items = resolve(&entries, &[msg(1, "Hello")], &[combo(5, "Greet+Bye")]);
        let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Hello", "Greet+Bye"]);
        assert_eq!(items[1].item_count, Some(0));
    }

    #[test]
    fn picker_lists_selected_first() {
        let state = SelectionState::new(vec![
            SelectionEntry::combination(5),
            SelectionEntry::message(2),
        ]);
        let rows = picker_rows(
            &state,
            &[msg(1, "A"), msg(2, "B")],
            &[combo(5, "C"), combo(6, "D")],
        );
        let names: Vec<(&str, bool)> = rows
            .iter()
            .map(|r| (r.item.name.as_str(), r.selected()))
            .collect();
        assert_eq!(
            names,
            vec![("C", true), ("B", true), ("A", false), ("D", false)]
        );
    }

    fn entry() -> impl Strategy<Value = SelectionEntry> {
        (0i64..6, any::<bool>()).prop_map(|(id, m)| {
            if m {
                SelectionEntry::message(id)
            } else {
                SelectionEntry::combination(id)
            }
        })
    }

    proptest! {
        #[test]
        fn toggle_round_trip_restores_state(
            initial in proptest::collection::vec(entry(), 0..8),
            e in entry(),
        ) {
            let mut s = SelectionState::new(initial);
            prop_assume!(!s.contains(&e));
            let before = s.entries().to_vec();
            s.toggle(e.clone(), true);
            s.toggle(e, false);
            prop_assert_eq!(s.entries(), before.as_slice());
        }

        #[test]
        fn reorder_is_a_single_relocation(
            initial in proptest::collection::vec(entry(), 1..8),
            from in 0usize..8,
            to in 0usize..8,
        ) {
            let mut s = SelectionState::new(initial);
            let before = s.entries().to_vec();
            let n = before.len();
            prop_assume!(from < n && to < n);
            s.reorder(from, to);
            let after = s.entries().to_vec();
            let mut a = after.clone();
            let mut b = before.clone();
            a.sort_by(|x, y| x.to_string().cmp(&y.to_string()));
            b.sort_by(|x, y| x.to_string().cmp(&y.to_string()));
            prop_assert_eq!(a, b);
            prop_assert_eq!(&after[to], &before[from]);
            let mut rest_before = before;
            rest_before.remove(from);
            let mut rest_after = after;
            rest_after.remove(to);
            prop_assert_eq!(rest_before, rest_after);
        }
    }
}
