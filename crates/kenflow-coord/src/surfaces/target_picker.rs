//! Target-window picker.

use async_trait::async_trait;
use kenflow_protocol::{Signal, Theme, Toast, WindowKind};
use keycombo::KeyEvent;
use tracing::{info, warn};

use super::{Flow, Shared, Surface};
use crate::{
    notify::Notifier,
    targets::{TargetRow, TargetSet},
};

/// Target picker input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAction {
    /// Check or uncheck one window title.
    Toggle(String),
    /// Clear the working set: deliver to every window.
    SelectAll,
    /// Re-request the open windows.
    Refresh,
    /// A key press inside the picker.
    Key(KeyEvent),
    /// Commit and close.
    Close,
}

/// One change the user made to the working set.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Edit {
    /// A title ended up checked (`true`) or unchecked.
    Check(String, bool),
    /// "All windows" was chosen.
    All,
}

impl Edit {
    /// Apply to `set`.
    fn apply(&self, set: &mut TargetSet) {
        match self {
            Self::Check(title, on) => set.check(title, *on),
            Self::All => set.select_all(),
        }
    }
}

/// Render model of the target picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetView {
    /// Open windows first, then checked titles that are not open.
    pub rows: Vec<TargetRow>,
    /// The "all windows" button is active.
    pub all_windows: bool,
    /// Checked titles.
    pub count: usize,
    /// Active theme.
    pub theme: Theme,
    /// Visible toasts.
    pub toasts: Vec<Toast>,
}

/// Target picker controller.
#[derive(Debug)]
pub struct TargetPicker {
    /// Services.
    shared: Shared,
    /// Working set plus the last good window list.
    set: TargetSet,
    /// The committed set was read, so committing cannot wipe it by accident.
    loaded: bool,
    /// The user changed the working set.
    dirty: bool,
    /// Changes made since open, replayed if the committed set has to be re-read.
    edits: Vec<Edit>,
    /// Theme.
    theme: Theme,
    /// Toasts.
    notifier: Notifier,
}

impl TargetPicker {
    /// Picker over `shared`.
    pub fn new(shared: Shared) -> Self {
        let notifier = shared.notifier(WindowKind::TargetPicker);
        Self {
            shared,
            set: TargetSet::default(),
            loaded: false,
            dirty: false,
            edits: Vec::new(),
            theme: Theme::default(),
            notifier,
        }
    }

    /// The working set.
    pub fn set(&self) -> &TargetSet {
        &self.set
    }

    /// Re-request the open windows. Failure keeps the last good list.
    async fn refresh_windows(&mut self) {
        match self.shared.targets.list_available_windows().await {
            Ok(titles) => self.set.set_available(titles),
            Err(e) => {
                warn!(error = %e, "window list refresh failed");
                self.notifier.error("Loading windows", &e);
            }
        }
    }

    /// Read the committed set again and replay this session's edits onto it.
    /// Returns false, with a toast, when the set still cannot be read.
    async fn rebase(&mut self) -> bool {
        match self.shared.targets.get_targets().await {
            Ok(targets) => {
                let mut set = TargetSet::new(&targets);
                set.set_available(self.set.available().to_vec());
                for e in &self.edits {
                    e.apply(&mut set);
                }
                self.set = set;
                self.loaded = true;
                true
            }
            Err(e) => {
                warn!(error = %e, "target windows not saved: committed set unknown");
                self.notifier.error("Saving targets", &e);
                false
            }
        }
    }

    /// Commit the working set and ask every surface to refresh.
    ///
    /// If the committed set was never read it is read again first, and
    /// nothing is written when that fails too.
    async fn commit(&mut self) {
        if !self.loaded && (!self.dirty || !self.rebase().await) {
            return;
        }
        match self.shared.targets.set_targets(self.set.selected()).await {
            Ok(()) => {
                self.dirty = false;
                self.shared.bus.refresh();
            }
            Err(e) => {
                warn!(error = %e, "target windows not saved");
                self.notifier.error("Saving targets", &e);
            }
        }
    }
}

/// Ctrl+R.
fn is_refresh_key(ev: &KeyEvent) -> bool {
    ev.ctrl && ev.key.eq_ignore_ascii_case("r")
}

#[async_trait]
impl Surface for TargetPicker {
    const KIND: WindowKind = WindowKind::TargetPicker;
    type Action = TargetAction;
    type View = TargetView;

    async fn open(&mut self) {
        self.theme = self.shared.theme.get();
        match self.shared.targets.get_targets().await {
            Ok(targets) => {
                self.set = TargetSet::new(&targets);
                self.loaded = true;
            }
            Err(e) => {
                warn!(error = %e, "target windows unavailable");
                self.notifier.error("Loading targets", &e);
            }
        }
        self.refresh_windows().await;
    }

    async fn handle(&mut self, action: TargetAction) -> Flow<TargetAction> {
        self.notifier.prune();
        match action {
            TargetAction::Toggle(title) => {
                let on = self.set.toggle(&title);
                self.edits.push(Edit::Check(title, on));
                self.dirty = true;
            }
            TargetAction::SelectAll => {
                self.set.select_all();
                self.edits.push(Edit::All);
                self.dirty = true;
            }
            TargetAction::Refresh => self.refresh_windows().await,
            TargetAction::Key(ev) if is_refresh_key(&ev) => self.refresh_windows().await,
            TargetAction::Key(ev) if ev.is_escape() || ev.is_ctrl_enter() => return Flow::Close,
            TargetAction::Key(_) => {}
            TargetAction::Close => return Flow::Close,
        }
        Flow::Continue
    }

    async fn on_signal(&mut self, signal: Signal) {
        if signal == Signal::Refresh {
            self.theme = self.shared.theme.get();
        }
    }

    fn view(&self) -> TargetView {
        TargetView {
            rows: self.set.rows(),
            all_windows: self.set.is_all(),
            count: self.set.selected().len(),
            theme: self.theme,
            toasts: self.notifier.visible(),
        }
    }

    async fn teardown(&mut self) {
        self.commit().await;
        info!(count = self.set.selected().len(), "target picker closed");
    }
}
