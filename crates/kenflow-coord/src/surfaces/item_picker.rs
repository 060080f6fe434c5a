//! Quick-access picker: choose and order the overlay's items.

use async_trait::async_trait;
use kenflow_protocol::{
    SelectionEntry, Signal, Theme, Toast, WindowKind,
    api::{Combination, Message},
};
use keycombo::KeyEvent;
use tracing::{debug, warn};

use super::{Flow, Shared, Surface};
use crate::{
    Error,
    notify::Notifier,
    selection::{PickerRow, SelectionState, picker_rows},
};

/// Item picker input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerAction {
    /// Select or deselect an item.
    Toggle(SelectionEntry),
    /// Move a selected entry within the working list.
    Reorder {
        /// Current position.
        from: usize,
        /// New position.
        to: usize,
    },
    /// Commit without closing.
    Save,
    /// A key press inside the picker.
    Key(KeyEvent),
    /// Commit and close.
    Close,
}

/// Render model of the item picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickerView {
    /// Selected rows first, then the rest of the library.
    pub rows: Vec<PickerRow>,
    /// No messages or combinations exist.
    pub empty_library: bool,
    /// The library could not be loaded.
    pub unreachable: bool,
    /// The working list has unsaved changes.
    pub dirty: bool,
    /// Active theme.
    pub theme: Theme,
    /// Visible toasts.
    pub toasts: Vec<Toast>,
}

/// Item picker controller. The working list lives here until commit.
#[derive(Debug)]
pub struct ItemPicker {
    /// Services.
    shared: Shared,
    /// Working copy of the quick-access list.
    state: SelectionState,
    /// Library messages.
    messages: Vec<Message>,
    /// Library combinations.
    combinations: Vec<Combination>,
    /// Last library load failed.
    unreachable: bool,
    /// Theme.
    theme: Theme,
    /// Toasts.
    notifier: Notifier,
}

impl ItemPicker {
    /// Picker over `shared`, starting from the committed list.
    pub fn new(shared: Shared) -> Self {
        let notifier = shared.notifier(WindowKind::ItemPicker);
        let state = SelectionState::load(&shared.selection);
        Self {
            shared,
            state,
            messages: Vec::new(),
            combinations: Vec::new(),
            unreachable: false,
            theme: Theme::default(),
            notifier,
        }
    }

    /// The working list.
    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    /// Re-read the library. The working list is left alone.
    async fn load_library(&mut self) {
        self.theme = self.shared.theme.get();
        let backend = &self.shared.backend;
        match (backend.messages(None).await, backend.combinations().await) {
            (Ok(m), Ok(c)) => {
                self.messages = m;
                self.combinations = c;
                self.unreachable = false;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "picker library load failed");
                self.unreachable = true;
                self.notifier.error("Loading items", &Error::from(e));
            }
        }
    }

    /// Persist the working list, keeping it active on failure.
    fn commit(&mut self) -> bool {
        match self.state.commit(&self.shared.selection, &self.shared.bus) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "quick-access list not saved");
                self.notifier.error("Saving selection", &e);
                false
            }
        }
    }
}

#[async_trait]
impl Surface for ItemPicker {
    const KIND: WindowKind = WindowKind::ItemPicker;
    type Action = PickerAction;
    type View = PickerView;

    async fn open(&mut self) {
        self.load_library().await;
    }

    async fn handle(&mut self, action: PickerAction) -> Flow<PickerAction> {
        self.notifier.prune();
        match action {
            PickerAction::Toggle(entry) => {
                let present = !self.state.contains(&entry);
                self.state.toggle(entry, present);
            }
            PickerAction::Reorder { from, to } => {
                if !self.state.reorder(from, to) {
                    debug!(from, to, "reorder ignored");
                }
            }
            PickerAction::Save => {
                if self.commit() {
                    self.notifier.success("Selection saved");
                }
            }
            PickerAction::Key(ev) if ev.is_escape() || ev.is_ctrl_enter() => return Flow::Close,
            PickerAction::Key(_) => {}
            PickerAction::Close => return Flow::Close,
        }
        Flow::Continue
    }

    async fn on_signal(&mut self, signal: Signal) {
        if signal == Signal::Refresh {
            self.load_library().await;
        }
    }

    fn view(&self) -> PickerView {
        PickerView {
            rows: picker_rows(&self.state, &self.messages, &self.combinations),
            empty_library: !self.unreachable
                && self.messages.is_empty()
                && self.combinations.is_empty(),
            unreachable: self.unreachable,
            dirty: self.state.is_dirty(),
            theme: self.theme,
            toasts: self.notifier.visible(),
        }
    }

    /// Closing commits, it never discards.
    async fn teardown(&mut self) {
        if self.state.is_dirty() {
            self.commit();
        }
    }
}

#[cfg(test)]
mod tests {
    use keycombo::Modifier;

    use super::{
        super::test_support::{drive, fixture},
        *,
    };

    #[tokio::test]
    async fn close_commits_working_list() {
        let fx = fixture();
        let hello = fx.mock.add_message("Hello", None);
        let bye = fx.mock.add_message("Bye", None);
        let combo = fx.mock.add_combination("Greet+Bye", None, &[hello, bye]);
        let mut sub = fx.shared.bus.subscribe(WindowKind::Overlay);

        let mut picker = ItemPicker::new(fx.shared.clone());
        picker.open().await;
        assert_eq!(picker.view().rows.len(), 3);
        assert!(picker.view().rows.iter().all(|r| !r.selected()));

        drive(&mut picker, PickerAction::Toggle(SelectionEntry::message(hello))).await;
        drive(&mut picker, PickerAction::Toggle(SelectionEntry::combination(combo))).await;
        assert!(picker.view().dirty);
        // Nothing is persisted before commit.
        assert!(fx.shared.selection.load().is_empty());

        let closed = drive(&mut picker, PickerAction::Key(KeyEvent::plain("Escape"))).await;
        assert!(closed);
        assert_eq!(
            fx.shared.selection.load(),
            vec![
                SelectionEntry::message(hello),
                SelectionEntry::combination(combo)
            ]
        );
        assert_eq!(sub.try_recv(), Some(Signal::Refresh));
    }

    #[tokio::test]
    async fn rows_follow_working_order() {
        let fx = fixture();
        let a = fx.mock.add_message("A", None);
        let b = fx.mock.add_message("B", None);
        fx.shared
            .selection
            .save(&[SelectionEntry::message(a), SelectionEntry::message(b)])
            .unwrap();
        let mut picker = ItemPicker::new(fx.shared.clone());
        picker.open().await;
        drive(&mut picker, PickerAction::Reorder { from: 1, to: 0 }).await;
        let names: Vec<String> = picker
            .view()
            .rows
            .iter()
            .map(|r| r.item.name.clone())
            .collect();
        assert_eq!(names, ["B", "A"]);

        drive(&mut picker, PickerAction::Save).await;
        assert!(!picker.view().dirty);
        assert_eq!(fx.shared.selection.load()[0], SelectionEntry::message(b));
    }

    #[tokio::test]
    async fn ctrl_enter_closes_and_plain_keys_do_not() {
        let fx = fixture();
        let mut picker = ItemPicker::new(fx.shared.clone());
        picker.open().await;
        assert!(picker.view().empty_library);
        assert!(!drive(&mut picker, PickerAction::Key(KeyEvent::plain("Enter"))).await);
        let ctrl_enter = KeyEvent::plain("Enter").with(Modifier::Ctrl);
        assert!(drive(&mut picker, PickerAction::Key(ctrl_enter)).await);
    }

    #[tokio::test]
    async fn unreachable_library_is_flagged() {
        let fx = fixture();
        fx.mock.set_unreachable(true);
        let mut picker = ItemPicker::new(fx.shared.clone());
        picker.open().await;
        let view = picker.view();
        assert!(view.unreachable);
        assert!(!view.empty_library);
        assert_eq!(view.toasts.len(), 1);
    }
}
