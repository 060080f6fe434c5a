//! Hotkey ownership: conflict detection, confirmed overrides, and the
//! interactive key capture used by the editors.

use std::{fmt, iter, result::Result as StdResult, sync::Arc};

use kenflow_backend::{
    Backend,
    api::{Combination, HotkeyHolder, Message},
};
use kenflow_protocol::ItemKind;
use keycombo::{Combo, KeyEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Identity of a message or combination that can own a hotkey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerRef {
    /// Message or combination.
    pub kind: ItemKind,
    /// Backend id.
    pub id: i64,
}

impl OwnerRef {
    /// Message `id`.
    pub fn message(id: i64) -> Self {
        Self {
            kind: ItemKind::Message,
            id,
        }
    }

    /// Combination `id`.
    pub fn combination(id: i64) -> Self {
        Self {
            kind: ItemKind::Combination,
            id,
        }
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// A hotkey owner with its display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    /// Identity.
    pub owner: OwnerRef,
    /// Display name.
    pub name: String,
}

impl Owner {
    /// Owner describing `holder`.
    pub fn of(holder: &dyn HotkeyHolder) -> Self {
        Self {
            owner: OwnerRef {
                kind: holder.kind(),
                id: holder.id(),
            },
            name: holder.name().to_string(),
        }
    }
}

/// `combo` is already held by one or more owners.
///
/// Normally there is a single holder, but stale or concurrently written data
/// can leave several; all of them are reported and all are cleared together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// The contested combo.
    combo: Combo,
    /// First holder in scan order.
    owner: Owner,
    /// Any further holders.
    others: Vec<Owner>,
}

impl Conflict {
    /// The contested combo.
    pub fn combo(&self) -> &Combo {
        &self.combo
    }

    /// Its first holder.
    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    /// Every holder, first one first.
    pub fn owners(&self) -> impl Iterator<Item = &Owner> {
        iter::once(&self.owner).chain(&self.others)
    }

    /// The user agreed to take the combo away from its holders.
    ///
    /// This is the only way to obtain an [`OverrideConfirmed`].
    pub fn confirm(&self) -> OverrideConfirmed {
        OverrideConfirmed {
            combo: self.combo.clone(),
            cleared: self.owners().map(|o| o.owner).collect(),
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is already used by ", self.combo)?;
        for (i, o) in self.owners().enumerate() {
            if i > 0 {
                f.write_str(" and ")?;
            }
            write!(f, "{} '{}'", o.owner.kind, o.name)?;
        }
        Ok(())
    }
}

/// Proof that the user confirmed clearing specific owners' hotkey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideConfirmed {
    /// Combo the override applies to.
    combo: Combo,
    /// Owners whose hotkey may be cleared.
    cleared: Vec<OwnerRef>,
}

impl OverrideConfirmed {
    /// Whether this confirmation covers every holder in `conflict`.
    fn covers(&self, conflict: &Conflict) -> bool {
        self.combo == conflict.combo
            && conflict
                .owners()
                .all(|o| self.cleared.contains(&o.owner))
    }
}

/// Parse a stored hotkey. Unparseable legacy values are skipped with a warning.
fn parse_stored(owner: &Owner, raw: &str) -> Option<Combo> {
    if raw.trim().is_empty() {
        return None;
    }
    match Combo::parse(raw) {
        Ok(c) => Some(c),
        Err(e) => {
            warn!(owner = %owner.owner, key = raw, error = %e, "ignoring unparseable hotkey");
            None
        }
    }
}

/// Snapshot of every hotkey assignment, messages first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignments {
    /// `(owner, combo)` pairs in scan order.
    entries: Vec<(Owner, Combo)>,
}

impl Assignments {
    /// Assignments held by `messages` and `combinations`.
    pub fn from_library(messages: &[Message], combinations: &[Combination]) -> Self {
        let holders = messages
            .iter()
            .map(|m| m as &dyn HotkeyHolder)
            .chain(combinations.iter().map(|c| c as &dyn HotkeyHolder));
        let entries = holders
            .filter_map(|h| {
                let owner = Owner::of(h);
                let combo = parse_stored(&owner, h.trigger_key()?)?;
                Some((owner, combo))
            })
            .collect();
        Self { entries }
    }

    /// Every owner of `combo` other than `exclude`, in scan order.
    pub fn holders<'a>(
        &'a self,
        combo: &'a Combo,
        exclude: Option<OwnerRef>,
    ) -> impl Iterator<Item = &'a Owner> + 'a {
        self.entries
            .iter()
            .filter(move |(o, c)| c == combo && Some(o.owner) != exclude)
            .map(|(o, _)| o)
    }

    /// First owner of `combo` other than `exclude`.
    pub fn check<'a>(&'a self, combo: &'a Combo, exclude: Option<OwnerRef>) -> Option<&'a Owner> {
        self.holders(combo, exclude).next()
    }

    /// Conflict for giving `combo` to `owner`, naming every other holder.
    pub fn conflict(&self, combo: &Combo, owner: Option<OwnerRef>) -> Option<Conflict> {
        let mut holders = self.holders(combo, owner).cloned();
        let first = holders.next()?;
        Some(Conflict {
            combo: combo.clone(),
            owner: first,
            others: holders.collect(),
        })
    }

    /// Combo held by `owner`.
    pub fn combo_of(&self, owner: OwnerRef) -> Option<&Combo> {
        self.entries
            .iter()
            .find(|(o, _)| o.owner == owner)
            .map(|(_, c)| c)
    }

    /// Replace `owner`'s assignment.
    pub fn set(&mut self, owner: Owner, combo: Option<Combo>) {
        self.entries.retain(|(o, _)| o.owner != owner.owner);
        if let Some(c) = combo {
            self.entries.push((owner, c));
        }
    }

    /// Give `combo` to `owner`. Conflicting holders are cleared only when
    /// `confirmed` covers all of them. Returns the cleared owners.
    pub fn try_assign(
        &mut self,
        combo: &Combo,
        owner: Owner,
        confirmed: Option<&OverrideConfirmed>,
    ) -> StdResult<Vec<OwnerRef>, Conflict> {
        let cleared = match self.conflict(combo, Some(owner.owner)) {
            None => Vec::new(),
            Some(c) if confirmed.is_some_and(|ok| ok.covers(&c)) => {
                let prior: Vec<OwnerRef> = c.owners().map(|o| o.owner).collect();
                self.entries.retain(|(o, _)| !prior.contains(&o.owner));
                prior
            }
            Some(c) => return Err(c),
        };
        self.set(owner, Some(combo.clone()));
        Ok(cleared)
    }

    /// Whether every combo has a single owner.
    pub fn is_consistent(&self) -> bool {
        self.entries
            .iter()
            .enumerate()
            .all(|(i, (_, c))| self.entries[i + 1..].iter().all(|(_, d)| d != c))
    }

    /// Number of assignments.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no hotkey is assigned.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Phase of a [`KeyCapture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Not listening.
    Idle,
    /// Waiting for the next key press.
    Listening,
}

/// What a captured key press led to. After any outcome other than
/// [`Ignored`](Self::Ignored) the capture is idle again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Not listening; the press was not consumed.
    Ignored,
    /// Escape pressed; nothing assigned.
    Cancelled,
    /// The combo is free.
    Assigned(Combo),
    /// The combo is held by someone else.
    Blocked(Conflict),
}

/// Interactive hotkey capture:
/// `Idle -> Listening -> (press -> check -> Assigned | Blocked) -> Idle`.
///
/// A capture is bound to its window's token; once the window closes the
/// capture stops consuming input.
#[derive(Debug, Clone)]
pub struct KeyCapture {
    /// Current phase.
    state: CaptureState,
    /// Owner being edited, excluded from conflict checks.
    exclude: Option<OwnerRef>,
    /// Token of the window hosting the capture.
    token: Option<CancellationToken>,
}

impl Default for KeyCapture {
    fn default() -> Self {
        Self {
            state: CaptureState::Idle,
            exclude: None,
            token: None,
        }
    }
}

impl KeyCapture {
    /// Start listening for `exclude`'s new hotkey inside the window owning `token`.
    pub fn start(&mut self, exclude: Option<OwnerRef>, token: CancellationToken) {
        self.state = CaptureState::Listening;
        self.exclude = exclude;
        self.token = Some(token);
        debug!(?exclude, "hotkey capture listening");
    }

    /// Stop listening without assigning.
    pub fn stop(&mut self) {
        self.state = CaptureState::Idle;
        self.token = None;
    }

    /// Current phase, `Idle` once the hosting window is gone.
    pub fn state(&self) -> CaptureState {
        if self.token.as_ref().is_some_and(|t| t.is_cancelled()) {
            CaptureState::Idle
        } else {
            self.state
        }
    }

    /// Whether the next press will be consumed.
    pub fn is_listening(&self) -> bool {
        self.state() == CaptureState::Listening
    }

    /// Feed one key press.
    pub fn press(&mut self, ev: &KeyEvent, assignments: &Assignments) -> CaptureOutcome {
        if !self.is_listening() {
            self.stop();
            return CaptureOutcome::Ignored;
        }
        self.stop();
        if ev.is_escape() {
            return CaptureOutcome::Cancelled;
        }
        let combo = ev.to_combo();
        match assignments.conflict(&combo, self.exclude) {
            Some(c) => {
                info!(combo = %combo, holder = %c.owner.name, "hotkey capture blocked");
                CaptureOutcome::Blocked(c)
            }
            None => CaptureOutcome::Assigned(combo),
        }
    }
}

/// Conflict checks and assignments against the live backend.
///
/// There is no cross-process lock: every operation re-reads both libraries
/// immediately before acting.
#[derive(Clone)]
pub struct HotkeyResolver {
    /// Backend holding the assignments.
    backend: Arc<dyn Backend>,
}

impl HotkeyResolver {
    /// Resolver over `backend`.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Current assignments.
    pub async fn assignments(&self) -> Result<Assignments> {
        let messages = self.backend.messages(None).await?;
        let combinations = self.backend.combinations().await?;
        Ok(Assignments::from_library(&messages, &combinations))
    }

    /// Owner already holding `combo`, ignoring `exclude`.
    pub async fn check_conflict(
        &self,
        combo: &Combo,
        exclude: Option<OwnerRef>,
    ) -> Result<Option<Owner>> {
        Ok(self.assignments().await?.check(combo, exclude).cloned())
    }

    /// Make `combo` available to `owner` (`None` for an item not created yet).
    ///
    /// Fails with [`Error::Conflict`] unless `confirmed` covers every current
    /// holder, in which case all of them lose the hotkey. Returns the cleared
    /// owners. If clearing fails part way, the owners already cleared get the
    /// combo back before the error is returned.
    pub async fn claim(
        &self,
        combo: &Combo,
        owner: Option<OwnerRef>,
        confirmed: Option<&OverrideConfirmed>,
    ) -> Result<Vec<Owner>> {
        let Some(conflict) = self.assignments().await?.conflict(combo, owner) else {
            return Ok(Vec::new());
        };
        if !confirmed.is_some_and(|ok| ok.covers(&conflict)) {
            return Err(conflict.into());
        }
        let mut cleared = Vec::new();
        for prior in conflict.owners() {
            if let Err(e) = self.clear(prior.owner).await {
                self.restore(combo, &cleared).await;
                return Err(e);
            }
            info!(combo = %combo, cleared = %prior.owner, "hotkey overridden");
            cleared.push(prior.clone());
        }
        Ok(cleared)
    }

    /// Hand `combo` back to owners a [`claim`](Self::claim) cleared, after the
    /// write that needed it failed. Failures are logged.
    pub async fn restore(&self, combo: &Combo, cleared: &[Owner]) {
        for prior in cleared {
            match self.write_key(prior.owner, Some(combo.to_string())).await {
                Ok(()) => info!(combo = %combo, owner = %prior.owner, "hotkey restored"),
                Err(e) => warn!(
                    combo = %combo,
                    owner = %prior.owner,
                    error = %e,
                    "hotkey restore failed"
                ),
            }
        }
    }

    /// Give `combo` to the existing `owner`, keeping the rest of its record.
    pub async fn assign(
        &self,
        combo: &Combo,
        owner: OwnerRef,
        confirmed: Option<&OverrideConfirmed>,
    ) -> Result<Vec<Owner>> {
        let cleared = self.claim(combo, Some(owner), confirmed).await?;
        if let Err(e) = self.write_key(owner, Some(combo.to_string())).await {
            self.restore(combo, &cleared).await;
            return Err(e);
        }
        info!(combo = %combo, owner = %owner, "hotkey assigned");
        Ok(cleared)
    }

    /// Remove `owner`'s hotkey.
    pub async fn clear(&self, owner: OwnerRef) -> Result<()> {
        self.write_key(owner, None).await
    }

    /// Rewrite one owner's record with a new trigger key.
    async fn write_key(&self, owner: OwnerRef, key: Option<String>) -> Result<()> {
        match owner.kind {
            ItemKind::Message => {
                let m = self.fetch_message(owner.id).await?;
                self.backend
                    .update_message(m.id, &m.to_input_with_key(key))
                    .await?;
            }
            ItemKind::Combination => {
                let c = self.fetch_combination(owner.id).await?;
                self.backend
                    .update_combination(c.id, &c.to_input_with_key(key))
                    .await?;
            }
        }
        Ok(())
    }

    /// Fetch a message, mapping 404 to [`Error::UnknownOwner`].
    async fn fetch_message(&self, id: i64) -> Result<Message> {
        self.backend.message(id).await.map_err(|e| {
            if e.is_not_found() {
                Error::UnknownOwner
            } else {
                e.into()
            }
        })
    }

    /// Fetch a combination, mapping 404 to [`Error::UnknownOwner`].
    async fn fetch_combination(&self, id: i64) -> Result<Combination> {
        self.backend.combination(id).await.map_err(|e| {
            if e.is_not_found() {
                Error::UnknownOwner
            } else {
                e.into()
            }
        })
    }
}

/// Parse user input into a combo.
pub fn parse_combo(raw: &str) -> Result<Combo> {
    Combo::parse(raw).map_err(|_| Error::InvalidCombo(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use kenflow_backend::MockBackend;
    use keycombo::Modifier;
    use proptest::prelude::*;

    use super::*;

    fn owner(kind: ItemKind, id: i64, name: &str) -> Owner {
        Owner {
            owner: OwnerRef { kind, id },
            name: name.into(),
        }
    }

    fn combo(s: &str) -> Combo {
        Combo::parse(s).expect("combo")
    }

    #[test]
    fn check_excludes_the_edited_owner() {
        let mut a = Assignments::default();
        a.set(owner(ItemKind::Message, 1, "A"), Some(combo("ctrl+1")));
        assert!(a.check(&combo("ctrl+1"), Some(OwnerRef::message(1))).is_none());
        assert_eq!(
            a.check(&combo("Ctrl+1"), Some(OwnerRef::message(2)))
                .map(|o| o.name.as_str()),
            Some("A")
        );
        // Same id but a different kind is a different owner.
        assert!(a.check(&combo("ctrl+1"), Some(OwnerRef::combination(1))).is_some());
    }

    #[test]
    fn override_requires_matching_confirmation() {
        let mut a = Assignments::default();
        a.set(owner(ItemKind::Message, 1, "A"), Some(combo("ctrl+1")));
        a.set(owner(ItemKind::Message, 3, "C"), Some(combo("ctrl+3")));

        let conflict = a
            .try_assign(&combo("ctrl+1"), owner(ItemKind::Message, 2, "B"), None)
            .expect_err("blocked");
        assert_eq!(conflict.owner().name, "A");
        assert_eq!(a.combo_of(OwnerRef::message(2)), None);

        // A confirmation for another conflict does not transfer.
        let other = a
            .conflict(&combo("ctrl+3"), Some(OwnerRef::message(2)))
            .expect("conflict")
            .confirm();
        assert!(
            a.try_assign(&combo("ctrl+1"), owner(ItemKind::Message, 2, "B"), Some(&other))
                .is_err()
        );

        let cleared = a
            .try_assign(
                &combo("ctrl+1"),
                owner(ItemKind::Message, 2, "B"),
                Some(&conflict.confirm()),
            )
            .expect("override");
        assert_eq!(cleared, vec![OwnerRef::message(1)]);
        assert_eq!(a.combo_of(OwnerRef::message(1)), None);
        assert!(a.is_consistent());
    }

    #[test]
    fn override_clears_every_duplicate_holder() {
        let mut a = Assignments::default();
        a.set(owner(ItemKind::Message, 1, "A"), Some(combo("ctrl+1")));
        a.set(owner(ItemKind::Combination, 3, "C"), Some(combo("ctrl+1")));
        assert!(!a.is_consistent());

        let conflict = a
            .try_assign(&combo("ctrl+1"), owner(ItemKind::Message, 2, "B"), None)
            .expect_err("blocked");
        let names: Vec<&str> = conflict.owners().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["A", "C"]);
        assert_eq!(
            conflict.to_string(),
            "'ctrl+1' is already used by message 'A' and combination 'C'"
        );

        let cleared = a
            .try_assign(
                &combo("ctrl+1"),
                owner(ItemKind::Message, 2, "B"),
                Some(&conflict.confirm()),
            )
            .expect("override");
        assert_eq!(cleared, vec![OwnerRef::message(1), OwnerRef::combination(3)]);
        assert!(a.is_consistent());
        assert_eq!(a.holders(&combo("ctrl+1"), None).count(), 1);
    }

    #[test]
    fn confirmation_must_cover_a_new_holder() {
        let mut a = Assignments::default();
        a.set(owner(ItemKind::Message, 1, "A"), Some(combo("ctrl+1")));
        let confirmed = a
            .conflict(&combo("ctrl+1"), Some(OwnerRef::message(2)))
            .expect("conflict")
            .confirm();
        // Someone else picked the combo up after the user confirmed.
        a.set(owner(ItemKind::Message, 4, "D"), Some(combo("ctrl+1")));
        assert!(
            a.try_assign(&combo("ctrl+1"), owner(ItemKind::Message, 2, "B"), Some(&confirmed))
                .is_err()
        );
    }

    #[test]
    fn capture_state_machine() {
        let token = CancellationToken::new();
        let mut a = Assignments::default();
        a.set(owner(ItemKind::Combination, 5, "Greet+Bye"), Some(combo("alt+g")));
        let mut cap = KeyCapture::default();
        assert_eq!(
            cap.press(&KeyEvent::plain("x"), &a),
            CaptureOutcome::Ignored
        );

        cap.start(Some(OwnerRef::message(1)), token.clone());
        assert!(cap.is_listening());
        assert_eq!(
            cap.press(&KeyEvent::plain("Escape"), &a),
            CaptureOutcome::Cancelled
        );
        assert_eq!(cap.state(), CaptureState::Idle);

        cap.start(Some(OwnerRef::message(1)), token.clone());
        match cap.press(&KeyEvent::plain("G").with(Modifier::Alt), &a) {
            CaptureOutcome::Blocked(c) => assert_eq!(c.owner().name, "Greet+Bye"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!cap.is_listening());

        cap.start(Some(OwnerRef::message(1)), token.clone());
        assert_eq!(
            cap.press(&KeyEvent::plain("1").with(Modifier::Ctrl), &a),
            CaptureOutcome::Assigned(combo("ctrl+1"))
        );
    }

    #[test]
    fn closing_the_window_stops_capture() {
        let token = CancellationToken::new();
        let mut cap = KeyCapture::default();
        cap.start(None, token.clone());
        token.cancel();
        assert!(!cap.is_listening());
        assert_eq!(
            cap.press(&KeyEvent::plain("a"), &Assignments::default()),
            CaptureOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn assign_without_override_leaves_target_unset() {
        let backend = Arc::new(MockBackend::new());
        let a = backend.add_message("A", Some("ctrl+1"));
        let b = backend.add_message("B", None);
        let resolver = HotkeyResolver::new(backend.clone());

        let holder = resolver
            .check_conflict(&combo("ctrl+1"), Some(OwnerRef::message(b)))
            .await
            .expect("check")
            .expect("conflict");
        assert_eq!(holder.owner, OwnerRef::message(a));

        let err = resolver
            .assign(&combo("ctrl+1"), OwnerRef::message(b), None)
            .await
            .expect_err("blocked");
        let conflict = err.as_conflict().expect("conflict").clone();
        assert_eq!(backend.stored_message(b).expect("b").trigger_key, None);

        resolver
            .assign(&combo("ctrl+1"), OwnerRef::message(b), Some(&conflict.confirm()))
            .await
            .expect("override");
        assert_eq!(backend.stored_message(a).expect("a").trigger_key, None);
        assert_eq!(
            backend.stored_message(b).expect("b").trigger_key.as_deref(),
            Some("ctrl+1")
        );
    }

    #[tokio::test]
    async fn assign_clears_duplicate_holders_in_backend() {
        let backend = Arc::new(MockBackend::new());
        let a = backend.add_message("A", Some("ctrl+1"));
        let b = backend.add_message("B", None);
        let c = backend.add_message("C", Some("Ctrl+1"));
        let resolver = HotkeyResolver::new(backend.clone());

        let err = resolver
            .assign(&combo("ctrl+1"), OwnerRef::message(b), None)
            .await
            .expect_err("blocked");
        let conflict = err.as_conflict().expect("conflict").clone();
        assert_eq!(conflict.owners().count(), 2);

        let cleared = resolver
            .assign(&combo("ctrl+1"), OwnerRef::message(b), Some(&conflict.confirm()))
            .await
            .expect("override");
        assert_eq!(cleared.len(), 2);
        let keys: Vec<Option<String>> = [a, b, c]
            .iter()
            .map(|id| backend.stored_message(*id).expect("stored").trigger_key)
            .collect();
        assert_eq!(keys, [None, Some("ctrl+1".to_string()), None]);
        let held = resolver.assignments().await.expect("assignments");
        assert!(held.is_consistent());
    }

    #[tokio::test]
    async fn failed_assign_restores_cleared_holder() {
        let backend = Arc::new(MockBackend::new());
        let a = backend.add_message("A", Some("ctrl+1"));
        let b = backend.add_message("B", None);
        let resolver = HotkeyResolver::new(backend.clone());
        let conflict = resolver
            .assignments()
            .await
            .expect("assignments")
            .conflict(&combo("ctrl+1"), Some(OwnerRef::message(b)))
            .expect("conflict");

        backend.fail_endpoint(&format!("PUT /messages/{b}"));
        resolver
            .assign(&combo("ctrl+1"), OwnerRef::message(b), Some(&conflict.confirm()))
            .await
            .expect_err("write fails");
        assert_eq!(
            backend.stored_message(a).expect("a").trigger_key.as_deref(),
            Some("ctrl+1")
        );
        assert_eq!(backend.stored_message(b).expect("b").trigger_key, None);
    }

    #[tokio::test]
    async fn assign_to_missing_owner() {
        let backend = Arc::new(MockBackend::new());
        let resolver = HotkeyResolver::new(backend);
        let err = resolver
            .assign(&combo("f5"), OwnerRef::combination(42), None)
            .await
            .expect_err("missing");
        assert!(matches!(err, Error::UnknownOwner));
    }

    proptest! {
        #[test]
        fn successful_assignments_keep_combos_unique(
            seeded in proptest::collection::vec(0usize..4, 0..6),
            ops in proptest::collection::vec((0i64..6, 0usize..4, any::<bool>()), 1..40),
        ) {
            let combos = ["ctrl+1", "alt+shift+x", "f5", "ctrl+alt+space"];
            let mut a = Assignments::default();
            // Legacy data may already hold duplicates; ids 100.. stay out of `ops`.
            for (id, ci) in (100i64..).zip(seeded) {
                a.set(owner(ItemKind::Message, id, "legacy"), Some(combo(combos[ci])));
            }
            for (id, ci, confirm) in ops {
                let kind = if id % 2 == 0 { ItemKind::Message } else { ItemKind::Combination };
                let who = owner(kind, id, "o");
                let c = combo(combos[ci]);
                let assigned = match a.try_assign(&c, who.clone(), None) {
                    Ok(_) => true,
                    Err(conflict) if confirm => {
                        prop_assert!(
                            a.try_assign(&c, who.clone(), Some(&conflict.confirm())).is_ok()
                        );
                        true
                    }
                    Err(_) => false,
                };
                if assigned {
                    prop_assert_eq!(a.holders(&c, None).count(), 1);
                    prop_assert_eq!(a.combo_of(who.owner), Some(&c));
                }
            }
        }
    }
}
