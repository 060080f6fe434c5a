//! The main window: library management, the message and combination
//! editors, and dashboard statistics.

use std::time::Duration;

use async_trait::async_trait;
use kenflow_backend::{Result as BackendResult, wait_until_ready};
use kenflow_protocol::{
    ItemKind, NotifyKind, Signal, Theme, Toast, WindowKind,
    api::{
        ActivityLog, Combination, CombinationInput, DEFAULT_COMBINATION_DELAY_MS, DashboardStats,
        Message, MessageInput, Pattern, PatternInput, PeriodStats, Settings,
    },
};
use keycombo::{Combo, KeyEvent};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Flow, Shared, Surface, WindowRequest};
use crate::{
    Error, Result,
    hotkeys::{
        Assignments, CaptureOutcome, Conflict, KeyCapture, Owner, OverrideConfirmed, OwnerRef,
    },
    notify::Notifier,
};

/// Days covered by the activity chart.
const PERIOD_DAYS: u32 = 7;
/// Activity log entries shown.
const LOG_LIMIT: u32 = 20;

/// Message being created or edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    /// Backend id, `None` for a new message.
    pub id: Option<i64>,
    /// Name.
    pub name: String,
    /// Template texts; blank ones are dropped on save.
    pub templates: Vec<String>,
    /// Hotkey.
    pub trigger_key: Option<Combo>,
    /// Icon class.
    pub icon: Option<String>,
}

impl Default for MessageDraft {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            templates: vec![String::new()],
            trigger_key: None,
            icon: None,
        }
    }
}

impl MessageDraft {
    /// Draft editing `m`.
    pub fn from_message(m: &Message) -> Self {
        Self {
            id: Some(m.id),
            name: m.name.clone(),
            templates: m.templates.iter().map(|t| t.content.clone()).collect(),
            trigger_key: parse_stored_key(m.trigger_key.as_deref()),
            icon: m.icon.clone(),
        }
    }

    /// Owner identity once saved.
    fn owner(&self) -> Option<OwnerRef> {
        self.id.map(OwnerRef::message)
    }

    /// Validated request body.
    fn to_input(&self) -> Result<MessageInput> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::Invalid("message name is required".into()));
        }
        let templates: Vec<String> = self
            .templates
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        if templates.is_empty() {
            return Err(Error::Invalid("at least one template is required".into()));
        }
        Ok(MessageInput {
            name: name.to_string(),
            templates,
            trigger_key: self.trigger_key.as_ref().map(Combo::to_string),
            icon: self.icon.clone(),
        })
    }
}

/// The inline "add message" selector of the combination editor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selector {
    /// Not shown.
    #[default]
    Closed,
    /// Shown with the messages that can be added.
    Open {
        /// `(message id, name)` choices.
        options: Vec<(i64, String)>,
        /// Close at this instant unless focus comes back.
        blur_at: Option<Instant>,
    },
}

impl Selector {
    /// Whether the selector is shown.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

/// Combination being created or edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComboDraft {
    /// Backend id, `None` for a new combination.
    pub id: Option<i64>,
    /// Name.
    pub name: String,
    /// Messages in firing order, repeats allowed.
    pub messages: Vec<(i64, String)>,
    /// Pause between messages in milliseconds.
    pub delay_ms: u64,
    /// Hotkey.
    pub trigger_key: Option<Combo>,
    /// Icon class.
    pub icon: Option<String>,
    /// Inline message selector.
    pub selector: Selector,
}

impl Default for ComboDraft {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            messages: Vec::new(),
            delay_ms: DEFAULT_COMBINATION_DELAY_MS,
            trigger_key: None,
            icon: None,
            selector: Selector::Closed,
        }
    }
}

impl ComboDraft {
    /// Draft editing `c`, items in stored order.
    pub fn from_combination(c: &Combination) -> Self {
        let mut items = c.items.clone();
        items.sort_by_key(|i| i.order_index);
        Self {
            id: Some(c.id),
            name: c.name.clone(),
            messages: items
                .into_iter()
                .map(|i| {
                    let name = i.message_name.unwrap_or_else(|| format!("#{}", i.message_id));
                    (i.message_id, name)
                })
                .collect(),
            delay_ms: c.delay_ms,
            trigger_key: parse_stored_key(c.trigger_key.as_deref()),
            icon: c.icon.clone(),
            selector: Selector::Closed,
        }
    }

    /// Owner identity once saved.
    fn owner(&self) -> Option<OwnerRef> {
        self.id.map(OwnerRef::combination)
    }

    /// Swap item `index` with its neighbour; out-of-range moves are ignored.
    pub fn move_item(&mut self, index: usize, up: bool) {
        let target = if up {
            index.checked_sub(1)
        } else {
            index.checked_add(1)
        };
        if let Some(t) = target
            && index < self.messages.len()
            && t < self.messages.len()
        {
            self.messages.swap(index, t);
        }
    }

    /// Drop item `index`.
    pub fn remove_item(&mut self, index: usize) {
        if index < self.messages.len() {
            self.messages.remove(index);
        }
    }

    /// Validated request body.
    fn to_input(&self) -> Result<CombinationInput> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::Invalid("combination name is required".into()));
        }
        if self.messages.is_empty() {
            return Err(Error::Invalid("add at least one message".into()));
        }
        Ok(CombinationInput {
            name: name.to_string(),
            message_ids: self.messages.iter().map(|(id, _)| *id).collect(),
            trigger_key: self.trigger_key.as_ref().map(Combo::to_string),
            delay_ms: self.delay_ms,
            icon: self.icon.clone(),
        })
    }
}

/// Stored hotkey text as a combo; unparsable text reads as no hotkey.
fn parse_stored_key(raw: Option<&str>) -> Option<Combo> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match Combo::parse(raw) {
        Ok(c) => Some(c),
        Err(e) => {
            warn!(key = raw, error = %e, "ignoring unparsable stored hotkey");
            None
        }
    }
}

/// Which editor is open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Editor {
    /// No editor.
    #[default]
    Closed,
    /// Message editor.
    Message {
        /// Working copy.
        draft: MessageDraft,
        /// Conflict awaiting an override decision.
        pending: Option<Conflict>,
    },
    /// Combination editor.
    Combination {
        /// Working copy.
        draft: ComboDraft,
        /// Conflict awaiting an override decision.
        pending: Option<Conflict>,
    },
}

impl Editor {
    /// Conflict awaiting a decision.
    pub fn pending(&self) -> Option<&Conflict> {
        match self {
            Self::Closed => None,
            Self::Message { pending, .. } | Self::Combination { pending, .. } => pending.as_ref(),
        }
    }

    /// Replace the pending conflict.
    fn set_pending(&mut self, conflict: Option<Conflict>) {
        match self {
            Self::Closed => {}
            Self::Message { pending, .. } | Self::Combination { pending, .. } => {
                *pending = conflict;
            }
        }
    }

    /// Owner being edited.
    fn owner(&self) -> Option<OwnerRef> {
        match self {
            Self::Closed => None,
            Self::Message { draft, .. } => draft.owner(),
            Self::Combination { draft, .. } => draft.owner(),
        }
    }

    /// Set the hotkey of whichever draft is open.
    fn set_key(&mut self, combo: Option<Combo>) {
        match self {
            Self::Closed => {}
            Self::Message { draft, .. } => draft.trigger_key = combo,
            Self::Combination { draft, .. } => draft.trigger_key = combo,
        }
    }

    /// Set the name of whichever draft is open.
    fn set_name(&mut self, name: String) {
        match self {
            Self::Closed => {}
            Self::Message { draft, .. } => draft.name = name,
            Self::Combination { draft, .. } => draft.name = name,
        }
    }

    /// Set the icon of whichever draft is open.
    fn set_icon(&mut self, icon: Option<String>) {
        match self {
            Self::Closed => {}
            Self::Message { draft, .. } => draft.icon = icon,
            Self::Combination { draft, .. } => draft.icon = icon,
        }
    }

    /// The open combination draft.
    fn combination(&mut self) -> Option<&mut ComboDraft> {
        match self {
            Self::Combination { draft, .. } => Some(draft),
            _ => None,
        }
    }

    /// The open message draft.
    fn message(&mut self) -> Option<&mut MessageDraft> {
        match self {
            Self::Message { draft, .. } => Some(draft),
            _ => None,
        }
    }

    /// Whether any editor is open.
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

/// Main window input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MainAction {
    /// Filter the message list; `None` clears the filter.
    Search(Option<String>),
    /// Re-read everything.
    Reload,
    /// Flip between dark and light.
    ToggleTheme,
    /// Open or close the overlay.
    ToggleOverlay,
    /// Start or stop the hotkey listener.
    ToggleListener,
    /// Flip enter-after-send.
    ToggleEnter,
    /// Ask the listener to re-read hotkeys.
    RefreshHotkeys,
    /// Open the message editor for a new message.
    NewMessage,
    /// Open the message editor on an existing message.
    EditMessage(i64),
    /// Open the combination editor for a new combination.
    NewCombination,
    /// Open the combination editor on an existing combination.
    EditCombination(i64),
    /// Set the draft name.
    SetName(String),
    /// Replace one template text.
    SetTemplate(usize, String),
    /// Append an empty template.
    AddTemplate,
    /// Drop one template.
    RemoveTemplate(usize),
    /// Set the draft icon.
    SetIcon(Option<String>),
    /// Set the combination delay.
    SetDelay(u64),
    /// Listen for the next key press as the draft hotkey.
    StartCapture,
    /// Remove the draft hotkey.
    ClearHotkey,
    /// A key press in the main window.
    Key(KeyEvent),
    /// Show the inline message selector.
    OpenSelector,
    /// Add a message from the selector.
    PickMessage(i64),
    /// The selector lost focus.
    SelectorBlur,
    /// The selector regained focus.
    SelectorFocus,
    /// Move a combination item up or down.
    MoveItem {
        /// Item position.
        index: usize,
        /// Towards the front.
        up: bool,
    },
    /// Drop a combination item.
    RemoveItem(usize),
    /// Save the open editor.
    Save,
    /// Clear the conflicting owner's hotkey and save.
    ConfirmOverride,
    /// Keep the conflicting owner's hotkey.
    CancelOverride,
    /// Discard the open editor.
    CancelEdit,
    /// Delete a message.
    DeleteMessage(i64),
    /// Delete a combination.
    DeleteCombination(i64),
    /// Deliver a message or combination now.
    Send(ItemKind, i64),
    /// Create a pattern.
    CreatePattern(PatternInput),
    /// Replace a pattern.
    UpdatePattern(i64, PatternInput),
    /// Delete a pattern.
    DeletePattern(i64),
    /// Dismiss every toast.
    DismissToasts,
    /// Close the main window, which quits.
    Close,
}

/// Render model of the main window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainView {
    /// The backend answered the startup probe.
    pub ready: bool,
    /// The last library load could not reach the backend.
    pub unreachable: bool,
    /// Active theme.
    pub theme: Theme,
    /// Active message filter.
    pub search: Option<String>,
    /// Messages matching the filter.
    pub messages: Vec<Message>,
    /// Combinations.
    pub combinations: Vec<Combination>,
    /// Patterns.
    pub patterns: Vec<Pattern>,
    /// Hotkey listener running.
    pub listener_active: bool,
    /// Hotkeys the listener holds.
    pub hotkey_count: usize,
    /// Enter pressed after each send.
    pub enter_enabled: bool,
    /// Target windows; zero means all windows.
    pub target_count: usize,
    /// Overlay toggle state.
    pub overlay_open: bool,
    /// Dashboard counters.
    pub stats: Option<DashboardStats>,
    /// Per-day activity.
    pub period: Option<PeriodStats>,
    /// Recent activity.
    pub logs: Vec<ActivityLog>,
    /// Open editor.
    pub editor: Editor,
    /// The editor is listening for a hotkey.
    pub capturing: bool,
    /// Visible toasts.
    pub toasts: Vec<Toast>,
}

/// Main window controller.
#[derive(Debug)]
pub struct MainSurface {
    /// Services.
    shared: Shared,
    /// Token of the main window; hotkey captures are bound to it.
    token: CancellationToken,
    /// Cached state shown by the view.
    view: MainView,
    /// Hotkey capture for the open editor.
    capture: KeyCapture,
    /// Assignments snapshot taken when a capture starts.
    assignments: Assignments,
    /// Toasts.
    notifier: Notifier,
}

impl MainSurface {
    /// Main surface over `shared`, bound to the main window's `token`.
    pub fn new(shared: Shared, token: CancellationToken) -> Self {
        let notifier = shared.notifier(WindowKind::Main);
        Self {
            shared,
            token,
            view: MainView {
                ready: false,
                unreachable: false,
                theme: Theme::default(),
                search: None,
                messages: Vec::new(),
                combinations: Vec::new(),
                patterns: Vec::new(),
                listener_active: false,
                hotkey_count: 0,
                enter_enabled: true,
                target_count: 0,
                overlay_open: false,
                stats: None,
                period: None,
                logs: Vec::new(),
                editor: Editor::Closed,
                capturing: false,
                toasts: Vec::new(),
            },
            capture: KeyCapture::default(),
            assignments: Assignments::default(),
            notifier,
        }
    }

    /// Re-read everything the view shows. Failures keep the previous values.
    pub async fn reload(&mut self) {
        self.view.theme = self.shared.theme.get();
        self.view.overlay_open = self.shared.registry.is_open(WindowKind::Overlay);
        self.load_library().await;
        self.load_status().await;
        self.load_dashboard().await;
    }

    /// Messages, combinations and patterns.
    async fn load_library(&mut self) {
        let backend = self.shared.backend.clone();
        match backend.messages(self.view.search.as_deref()).await {
            Ok(m) => {
                self.view.messages = m;
                self.view.unreachable = false;
            }
            Err(e) => {
                warn!(error = %e, "messages unavailable");
                self.view.unreachable = e.is_unreachable();
            }
        }
        match backend.combinations().await {
            Ok(c) => self.view.combinations = c,
            Err(e) => warn!(error = %e, "combinations unavailable"),
        }
        match backend.patterns().await {
            Ok(p) => self.view.patterns = p,
            Err(e) => warn!(error = %e, "patterns unavailable"),
        }
    }

    /// Listener and settings.
    async fn load_status(&mut self) {
        match self.shared.backend.listener_status().await {
            Ok(s) => {
                self.view.listener_active = s.active;
                self.view.hotkey_count = s.hotkey_count;
            }
            Err(e) => debug!(error = %e, "listener status unavailable"),
        }
        match self.shared.backend.settings().await {
            Ok(s) => {
                self.view.enter_enabled = s.enter_enabled();
                self.view.target_count = s.target_windows().len();
            }
            Err(e) => debug!(error = %e, "settings unavailable"),
        }
    }

    /// Counters, activity chart and log.
    async fn load_dashboard(&mut self) {
        let backend = self.shared.backend.clone();
        match backend.dashboard_stats().await {
            Ok(s) => self.view.stats = Some(s),
            Err(e) => debug!(error = %e, "dashboard stats unavailable"),
        }
        match backend.dashboard_period(PERIOD_DAYS).await {
            Ok(p) => self.view.period = Some(p),
            Err(e) => debug!(error = %e, "dashboard period unavailable"),
        }
        match backend.dashboard_logs(LOG_LIMIT).await {
            Ok(l) => self.view.logs = l,
            Err(e) => debug!(error = %e, "dashboard logs unavailable"),
        }
    }

    /// After any library change: reload, let the listener pick up hotkeys, and
    /// tell the other surfaces.
    async fn after_mutation(&mut self) {
        if let Err(e) = self.shared.backend.refresh_listener().await {
            warn!(error = %e, "listener refresh failed");
        }
        self.reload().await;
        self.shared.bus.refresh();
    }

    /// Report `result` of `what` as a toast.
    fn report(&mut self, what: &str, result: Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(action = what, error = %e, "main action failed");
                self.notifier.error(what, &e);
                false
            }
        }
    }

    /// Library, status and window actions.
    async fn handle_app(&mut self, action: MainAction) {
        match action {
            MainAction::Search(q) => {
                self.view.search = q.filter(|s| !s.trim().is_empty());
                self.load_library().await;
            }
            MainAction::Reload => self.reload().await,
            MainAction::ToggleTheme => match self.shared.theme.toggle(&self.shared.bus) {
                Ok(t) => {
                    info!(theme = %t, "theme changed");
                    self.view.theme = t;
                }
                Err(e) => self.notifier.error("Theme", &e),
            },
            MainAction::ToggleOverlay => self.toggle_overlay(),
            MainAction::ToggleListener => self.toggle_listener().await,
            MainAction::ToggleEnter => self.toggle_enter().await,
            MainAction::RefreshHotkeys => {
                let r = self.shared.backend.refresh_listener().await;
                if self.report("Hotkey refresh", r.map(drop).map_err(Error::from)) {
                    self.notifier.success("Hotkeys refreshed");
                    self.load_status().await;
                }
            }
            MainAction::DeleteMessage(id) => {
                let r = self.shared.backend.delete_message(id).await;
                if self.report("Delete message", r.map_err(Error::from)) {
                    self.after_mutation().await;
                }
            }
            MainAction::DeleteCombination(id) => {
                let r = self.shared.backend.delete_combination(id).await;
                if self.report("Delete combination", r.map_err(Error::from)) {
                    self.after_mutation().await;
                }
            }
            MainAction::Send(kind, id) => {
                let r = self.shared.backend.send_item(kind, id).await;
                if self.report("Send", r.map_err(Error::from)) {
                    self.load_dashboard().await;
                }
            }
            MainAction::CreatePattern(input) => self.save_pattern(None, &input).await,
            MainAction::UpdatePattern(id, input) => self.save_pattern(Some(id), &input).await,
            MainAction::DeletePattern(id) => {
                let r = self.shared.backend.delete_pattern(id).await;
                if self.report("Delete pattern", r.map_err(Error::from)) {
                    self.after_mutation().await;
                }
            }
            MainAction::DismissToasts => self.notifier.clear(),
            other => self.handle_editor(other).await,
        }
    }

    /// Open or close the overlay through the coordinator.
    fn toggle_overlay(&mut self) {
        if self.shared.registry.is_open(WindowKind::Overlay) {
            self.shared.request(WindowRequest::Close(WindowKind::Overlay));
            self.view.overlay_open = false;
        } else {
            self.shared.request(WindowRequest::Open(WindowKind::Overlay));
            self.view.overlay_open = true;
        }
    }

    /// Start or stop the listener.
    async fn toggle_listener(&mut self) {
        let backend = &self.shared.backend;
        let r = if self.view.listener_active {
            backend.stop_listener().await
        } else {
            backend.start_listener().await
        };
        if self.report("Listener", r.map(drop).map_err(Error::from)) {
            self.load_status().await;
            self.shared.bus.refresh();
        }
    }

    /// Flip enter-after-send.
    async fn toggle_enter(&mut self) {
        let enabled = !self.view.enter_enabled;
        let r = self
            .shared
            .backend
            .update_settings(&Settings::enter_patch(enabled))
            .await;
        if self.report("Enter setting", r.map_err(Error::from)) {
            self.view.enter_enabled = enabled;
            self.shared.bus.refresh();
        }
    }

    /// Create or replace a pattern.
    async fn save_pattern(&mut self, id: Option<i64>, input: &PatternInput) {
        let r = if input.name.trim().is_empty() {
            Err(Error::Invalid("pattern name is required".into()))
        } else {
            let backend = &self.shared.backend;
            let written = match id {
                Some(id) => backend.update_pattern(id, input).await,
                None => backend.create_pattern(input).await.map(drop),
            };
            written.map_err(Error::from)
        };
        if self.report("Save pattern", r) {
            self.after_mutation().await;
        }
    }

    /// Editor actions.
    async fn handle_editor(&mut self, action: MainAction) {
        match action {
            MainAction::NewMessage => self.open_editor(Editor::Message {
                draft: MessageDraft::default(),
                pending: None,
            }),
            MainAction::EditMessage(id) => self.edit_message(id).await,
            MainAction::NewCombination => self.open_editor(Editor::Combination {
                draft: ComboDraft::default(),
                pending: None,
            }),
            MainAction::EditCombination(id) => self.edit_combination(id).await,
            MainAction::SetName(name) => self.view.editor.set_name(name),
            MainAction::SetIcon(icon) => self.view.editor.set_icon(icon),
            MainAction::SetTemplate(i, text) => {
                if let Some(t) = self.view.editor.message().and_then(|d| d.templates.get_mut(i)) {
                    *t = text;
                }
            }
            MainAction::AddTemplate => {
                if let Some(d) = self.view.editor.message() {
                    d.templates.push(String::new());
                }
            }
            MainAction::RemoveTemplate(i) => {
                if let Some(d) = self.view.editor.message()
                    && i < d.templates.len()
                {
                    d.templates.remove(i);
                }
            }
            MainAction::SetDelay(ms) => {
                if let Some(d) = self.view.editor.combination() {
                    d.delay_ms = ms;
                }
            }
            MainAction::StartCapture => self.start_capture().await,
            MainAction::ClearHotkey => {
                self.capture.stop();
                self.view.editor.set_key(None);
            }
            MainAction::Key(ev) => self.key(&ev).await,
            MainAction::Save => self.save(None).await,
            MainAction::ConfirmOverride => {
                if let Some(conflict) = self.view.editor.pending().cloned() {
                    self.view.editor.set_key(Some(conflict.combo().clone()));
                    self.save(Some(conflict.confirm())).await;
                }
            }
            MainAction::CancelOverride => self.view.editor.set_pending(None),
            MainAction::CancelEdit => self.close_editor(),
            other => self.handle_selector(other),
        }
    }

    /// Combination selector and item actions.
    fn handle_selector(&mut self, action: MainAction) {
        let blur = self.shared.config.selector_blur();
        let options: Vec<(i64, String)> = self
            .view
            .messages
            .iter()
            .map(|m| (m.id, m.name.clone()))
            .collect();
        let Some(draft) = self.view.editor.combination() else {
            debug!(?action, "no combination editor open");
            return;
        };
        match action {
            MainAction::OpenSelector if options.is_empty() => {
                self.notifier.warn("Create a message first");
            }
            MainAction::OpenSelector => {
                draft.selector = Selector::Open {
                    options,
                    blur_at: None,
                };
            }
            MainAction::PickMessage(id) => {
                if let Selector::Open { options, .. } = &draft.selector
                    && let Some(picked) = options.iter().find(|(o, _)| *o == id).cloned()
                {
                    draft.messages.push(picked);
                }
                draft.selector = Selector::Closed;
            }
            MainAction::SelectorBlur => {
                if let Selector::Open { blur_at, .. } = &mut draft.selector {
                    *blur_at = Some(Instant::now() + blur);
                }
            }
            MainAction::SelectorFocus => {
                if let Selector::Open { blur_at, .. } = &mut draft.selector {
                    *blur_at = None;
                }
            }
            MainAction::MoveItem { index, up } => draft.move_item(index, up),
            MainAction::RemoveItem(i) => draft.remove_item(i),
            other => debug!(action = ?other, "unhandled main action"),
        }
    }

    /// Replace the editor, stopping any capture.
    fn open_editor(&mut self, editor: Editor) {
        self.capture.stop();
        self.view.editor = editor;
    }

    /// Close the editor.
    fn close_editor(&mut self) {
        self.capture.stop();
        self.view.editor = Editor::Closed;
    }

    /// Load `id` into the message editor.
    async fn edit_message(&mut self, id: i64) {
        match self.shared.backend.message(id).await {
            Ok(m) => self.open_editor(Editor::Message {
                draft: MessageDraft::from_message(&m),
                pending: None,
            }),
            Err(e) => self.notifier.error("Open message", &Error::from(e)),
        }
    }

    /// Load `id` into the combination editor.
    async fn edit_combination(&mut self, id: i64) {
        match self.shared.backend.combination(id).await {
            Ok(c) => self.open_editor(Editor::Combination {
                draft: ComboDraft::from_combination(&c),
                pending: None,
            }),
            Err(e) => self.notifier.error("Open combination", &Error::from(e)),
        }
    }

    /// Start listening for a hotkey, with a fresh assignments snapshot.
    async fn start_capture(&mut self) {
        if !self.view.editor.is_open() {
            return;
        }
        self.assignments = match self.shared.hotkeys.assignments().await {
            Ok(a) => a,
            Err(e) => {
                warn!(error = %e, "assignments unavailable; using cached library");
                Assignments::from_library(&self.view.messages, &self.view.combinations)
            }
        };
        self.capture
            .start(self.view.editor.owner(), self.token.child_token());
    }

    /// Route a key press: capture first, then the selector, then the editor.
    async fn key(&mut self, ev: &KeyEvent) {
        if self.capture.is_listening() {
            match self.capture.press(ev, &self.assignments) {
                CaptureOutcome::Assigned(combo) => {
                    self.view.editor.set_key(Some(combo));
                    self.view.editor.set_pending(None);
                }
                CaptureOutcome::Blocked(conflict) => {
                    self.notifier.warn(conflict.to_string());
                    self.view.editor.set_pending(Some(conflict));
                }
                CaptureOutcome::Cancelled | CaptureOutcome::Ignored => {}
            }
            return;
        }
        if let Some(d) = self.view.editor.combination()
            && d.selector.is_open()
            && ev.is_escape()
        {
            d.selector = Selector::Closed;
            return;
        }
        if !self.view.editor.is_open() {
            return;
        }
        if ev.is_escape() {
            self.close_editor();
        } else if ev.is_ctrl_enter() {
            self.save(None).await;
        }
    }

    /// Save the open editor. Conflicts stay pending until the user decides.
    async fn save(&mut self, confirmed: Option<OverrideConfirmed>) {
        let result = match self.view.editor.clone() {
            Editor::Closed => return,
            Editor::Message { draft, .. } => self.save_message(&draft, confirmed.as_ref()).await,
            Editor::Combination { draft, .. } => {
                self.save_combination(&draft, confirmed.as_ref()).await
            }
        };
        match result {
            Ok(()) => {
                self.close_editor();
                self.notifier.success("Saved");
                self.after_mutation().await;
            }
            Err(Error::Conflict(conflict)) => {
                self.notifier.warn(conflict.to_string());
                self.view.editor.set_pending(Some(*conflict));
            }
            Err(e) => self.notifier.error("Save", &e),
        }
    }

    /// Claim the hotkey if any, then write the message.
    async fn save_message(
        &self,
        draft: &MessageDraft,
        confirmed: Option<&OverrideConfirmed>,
    ) -> Result<()> {
        let input = draft.to_input()?;
        let combo = draft.trigger_key.as_ref();
        let cleared = self.claim(combo, draft.owner(), confirmed).await?;
        let written = match draft.id {
            Some(id) => self.shared.backend.update_message(id, &input).await,
            None => self.shared.backend.create_message(&input).await.map(|id| {
                info!(id, "message created");
            }),
        };
        self.settle(combo, &cleared, written).await
    }

    /// Claim the hotkey if any, then write the combination.
    async fn save_combination(
        &self,
        draft: &ComboDraft,
        confirmed: Option<&OverrideConfirmed>,
    ) -> Result<()> {
        let input = draft.to_input()?;
        let combo = draft.trigger_key.as_ref();
        let cleared = self.claim(combo, draft.owner(), confirmed).await?;
        let written = match draft.id {
            Some(id) => self.shared.backend.update_combination(id, &input).await,
            None => self.shared.backend.create_combination(&input).await.map(|id| {
                info!(id, "combination created");
            }),
        };
        self.settle(combo, &cleared, written).await
    }

    /// Take the draft's hotkey, if it has one, from its current holders.
    async fn claim(
        &self,
        combo: Option<&Combo>,
        owner: Option<OwnerRef>,
        confirmed: Option<&OverrideConfirmed>,
    ) -> Result<Vec<Owner>> {
        match combo {
            Some(combo) => self.shared.hotkeys.claim(combo, owner, confirmed).await,
            None => Ok(Vec::new()),
        }
    }

    /// Finish a save. A failed write hands the hotkey back to the owners the
    /// claim cleared.
    async fn settle(
        &self,
        combo: Option<&Combo>,
        cleared: &[Owner],
        written: BackendResult<()>,
    ) -> Result<()> {
        let Err(e) = written else {
            return Ok(());
        };
        if let Some(combo) = combo
            && !cleared.is_empty()
        {
            self.shared.hotkeys.restore(combo, cleared).await;
        }
        Err(e.into())
    }

    /// Instant at which the open selector closes.
    fn selector_deadline(&self) -> Option<Instant> {
        match &self.view.editor {
            Editor::Combination { draft, .. } => match &draft.selector {
                Selector::Open { blur_at, .. } => *blur_at,
                Selector::Closed => None,
            },
            _ => None,
        }
    }
}

#[async_trait]
impl Surface for MainSurface {
    const KIND: WindowKind = WindowKind::Main;
    type Action = MainAction;
    type View = MainView;

    async fn open(&mut self) {
        self.view.theme = self.shared.theme.get();
        let policy = self.shared.config.readiness;
        match wait_until_ready(self.shared.backend.as_ref(), policy).await {
            Ok(()) => {
                self.view.ready = true;
                self.reload().await;
            }
            Err(e) => {
                error!(error = %e, "backend unavailable at startup");
                self.notifier.persistent(
                    NotifyKind::Error,
                    format!("Backend unavailable at {}", self.shared.config.backend_url),
                );
            }
        }
    }

    async fn handle(&mut self, action: MainAction) -> Flow<MainAction> {
        self.notifier.prune();
        if action == MainAction::Close {
            return Flow::Close;
        }
        self.handle_app(action).await;
        Flow::Continue
    }

    async fn on_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Refresh => self.reload().await,
            Signal::OverlayClosed => self.view.overlay_open = false,
        }
    }

    async fn tick(&mut self) {
        self.notifier.prune();
        self.load_status().await;
    }

    fn poll_interval(&self) -> Option<Duration> {
        Some(self.shared.config.main_poll())
    }

    fn deadline(&self) -> Option<Instant> {
        self.selector_deadline()
    }

    async fn on_deadline(&mut self) {
        if let Some(d) = self.view.editor.combination() {
            debug!("inline selector closed after blur");
            d.selector = Selector::Closed;
        }
    }

    fn view(&self) -> MainView {
        let mut view = self.view.clone();
        view.capturing = self.capture.is_listening();
        view.toasts = self.notifier.visible();
        view
    }

    /// Closing the main window quits.
    async fn teardown(&mut self) {
        self.capture.stop();
        if let Some(d) = self.view.editor.combination() {
            d.selector = Selector::Closed;
        }
        self.shared.request(WindowRequest::Quit);
    }
}

#[cfg(test)]
mod tests {
    use keycombo::Modifier;

    use super::{
        super::test_support::{Fixture, drive, fixture},
        *,
    };

    /// Main surface over `fx`, opened and loaded.
    async fn main(fx: &Fixture) -> MainSurface {
        fx.open(WindowKind::Main);
        let token = fx.shared.registry.handle(WindowKind::Main).unwrap().token();
        let mut m = MainSurface::new(fx.shared.clone(), token);
        m.open().await;
        m
    }

    fn ctrl(key: &str) -> KeyEvent {
        KeyEvent::plain(key).with(Modifier::Ctrl)
    }

    #[tokio::test]
    async fn conflict_blocks_until_confirmed() {
        let fx = fixture();
        let a = fx.mock.add_message("A", Some("ctrl+1"));
        let b = fx.mock.add_message("B", None);
        let mut m = main(&fx).await;
        assert!(m.view().ready);

        drive(&mut m, MainAction::EditMessage(b)).await;
        drive(&mut m, MainAction::StartCapture).await;
        assert!(m.view().capturing);
        drive(&mut m, MainAction::Key(ctrl("1"))).await;
        let view = m.view();
        assert!(!view.capturing);
        let pending = view.editor.pending().unwrap();
        assert_eq!(pending.owner().owner, OwnerRef::message(a));
        assert_eq!(pending.owner().name, "A");

        // Declining keeps both records as they were.
        drive(&mut m, MainAction::CancelOverride).await;
        drive(&mut m, MainAction::Save).await;
        assert_eq!(fx.mock.stored_message(b).unwrap().trigger_key, None);
        assert_eq!(
            fx.mock.stored_message(a).unwrap().trigger_key.as_deref(),
            Some("ctrl+1")
        );
    }

    #[tokio::test]
    async fn confirmed_override_moves_the_hotkey() {
        let fx = fixture();
        let a = fx.mock.add_message("A", Some("ctrl+1"));
        let b = fx.mock.add_message("B", None);
        let mut m = main(&fx).await;

        drive(&mut m, MainAction::EditMessage(b)).await;
        drive(&mut m, MainAction::StartCapture).await;
        drive(&mut m, MainAction::Key(ctrl("1"))).await;
        fx.mock.clear_calls();
        drive(&mut m, MainAction::ConfirmOverride).await;

        assert_eq!(fx.mock.stored_message(a).unwrap().trigger_key, None);
        assert_eq!(
            fx.mock.stored_message(b).unwrap().trigger_key.as_deref(),
            Some("ctrl+1")
        );
        assert!(!m.view().editor.is_open());
        assert_eq!(fx.mock.call_count("POST /listener/refresh"), 1);
    }

    #[tokio::test]
    async fn failed_save_hands_the_hotkey_back() {
        let fx = fixture();
        let a = fx.mock.add_message("A", Some("ctrl+1"));
        let b = fx.mock.add_message("B", None);
        let mut m = main(&fx).await;

        drive(&mut m, MainAction::EditMessage(b)).await;
        drive(&mut m, MainAction::StartCapture).await;
        drive(&mut m, MainAction::Key(ctrl("1"))).await;
        fx.mock.fail_endpoint(&format!("PUT /messages/{b}"));
        drive(&mut m, MainAction::ConfirmOverride).await;

        assert_eq!(
            fx.mock.stored_message(a).unwrap().trigger_key.as_deref(),
            Some("ctrl+1")
        );
        assert_eq!(fx.mock.stored_message(b).unwrap().trigger_key, None);
        assert!(m.view().editor.is_open());
        assert_eq!(fx.mock.call_count("POST /listener/refresh"), 0);
    }

    #[tokio::test]
    async fn save_without_capture_still_checks_conflicts() {
        let fx = fixture();
        fx.mock.add_message("A", Some("alt+x"));
        let mut m = main(&fx).await;
        drive(&mut m, MainAction::NewMessage).await;
        drive(&mut m, MainAction::SetName("New".into())).await;
        drive(&mut m, MainAction::SetTemplate(0, "hello".into())).await;
        if let Editor::Message { draft, .. } = &mut m.view.editor {
            draft.trigger_key = Some(Combo::parse("alt+x").unwrap());
        }
        drive(&mut m, MainAction::Save).await;
        assert!(m.view().editor.pending().is_some());
        assert_eq!(fx.mock.call_count("POST /messages"), 0);
    }

    #[tokio::test]
    async fn message_needs_name_and_template() {
        let fx = fixture();
        let mut m = main(&fx).await;
        drive(&mut m, MainAction::NewMessage).await;
        drive(&mut m, MainAction::SetName("Hi".into())).await;
        drive(&mut m, MainAction::Save).await;
        assert!(m.view().editor.is_open());
        assert_eq!(m.view().toasts.len(), 1);
        assert_eq!(fx.mock.call_count("POST /messages"), 0);

        drive(&mut m, MainAction::SetTemplate(0, "Hello there".into())).await;
        drive(&mut m, MainAction::Key(ctrl("Enter"))).await;
        assert!(!m.view().editor.is_open());
        assert_eq!(m.view().messages.len(), 1);
    }

    #[tokio::test]
    async fn escape_cancels_capture_then_editor() {
        let fx = fixture();
        let mut m = main(&fx).await;
        drive(&mut m, MainAction::NewMessage).await;
        drive(&mut m, MainAction::StartCapture).await;
        drive(&mut m, MainAction::Key(KeyEvent::plain("Escape"))).await;
        assert!(m.view().editor.is_open());
        assert!(!m.view().capturing);
        drive(&mut m, MainAction::Key(KeyEvent::plain("Escape"))).await;
        assert!(!m.view().editor.is_open());
    }

    #[tokio::test]
    async fn capture_stops_when_window_closes() {
        let fx = fixture();
        let mut m = main(&fx).await;
        drive(&mut m, MainAction::NewMessage).await;
        drive(&mut m, MainAction::StartCapture).await;
        assert!(m.view().capturing);
        fx.shared.registry.close(WindowKind::Main);
        assert!(!m.view().capturing);
    }

    #[tokio::test]
    async fn combination_editor() {
        let fx = fixture();
        let hello = fx.mock.add_message("Hello", None);
        let bye = fx.mock.add_message("Bye", None);
        let mut m = main(&fx).await;

        drive(&mut m, MainAction::NewCombination).await;
        drive(&mut m, MainAction::SetName("Greet+Bye".into())).await;
        drive(&mut m, MainAction::Save).await;
        assert!(m.view().editor.is_open(), "needs at least one message");

        for id in [bye, hello] {
            drive(&mut m, MainAction::OpenSelector).await;
            drive(&mut m, MainAction::PickMessage(id)).await;
        }
        drive(&mut m, MainAction::MoveItem { index: 1, up: true }).await;
        drive(&mut m, MainAction::Save).await;
        assert!(!m.view().editor.is_open());

        let stored = &m.view().combinations[0];
        assert_eq!(stored.delay_ms, DEFAULT_COMBINATION_DELAY_MS);
        let ids: Vec<i64> = stored.items.iter().map(|i| i.message_id).collect();
        assert_eq!(ids, [hello, bye]);
    }

    #[tokio::test(start_paused = true)]
    async fn selector_closes_after_blur_timeout() {
        let fx = fixture();
        fx.mock.add_message("Hello", None);
        let mut m = main(&fx).await;
        drive(&mut m, MainAction::NewCombination).await;
        drive(&mut m, MainAction::OpenSelector).await;
        drive(&mut m, MainAction::SelectorBlur).await;
        let deadline = m.deadline().unwrap();
        assert_eq!(deadline - Instant::now(), Duration::from_millis(150));

        drive(&mut m, MainAction::SelectorFocus).await;
        assert!(m.deadline().is_none());
        drive(&mut m, MainAction::SelectorBlur).await;
        m.on_deadline().await;
        match &m.view().editor {
            Editor::Combination { draft, .. } => assert!(!draft.selector.is_open()),
            other => panic!("unexpected editor {other:?}"),
        }
    }

    #[tokio::test]
    async fn selector_needs_messages() {
        let fx = fixture();
        let mut m = main(&fx).await;
        drive(&mut m, MainAction::NewCombination).await;
        drive(&mut m, MainAction::OpenSelector).await;
        match &m.view().editor {
            Editor::Combination { draft, .. } => assert!(!draft.selector.is_open()),
            other => panic!("unexpected editor {other:?}"),
        }
        assert_eq!(m.view().toasts.len(), 1);
    }

    #[tokio::test]
    async fn overlay_toggle_follows_close_signal() {
        let mut fx = fixture();
        let mut m = main(&fx).await;
        drive(&mut m, MainAction::ToggleOverlay).await;
        assert!(m.view().overlay_open);
        assert_eq!(fx.requests(), [WindowRequest::Open(WindowKind::Overlay)]);
        m.on_signal(Signal::OverlayClosed).await;
        assert!(!m.view().overlay_open);
    }

    #[tokio::test]
    async fn theme_toggle_persists_and_broadcasts() {
        let fx = fixture();
        let mut sub = fx.shared.bus.subscribe(WindowKind::Overlay);
        let mut m = main(&fx).await;
        drive(&mut m, MainAction::ToggleTheme).await;
        assert_eq!(m.view().theme, Theme::Light);
        assert_eq!(fx.shared.theme.get(), Theme::Light);
        assert_eq!(sub.try_recv(), Some(Signal::Refresh));
    }

    #[tokio::test]
    async fn unreachable_backend_shows_persistent_message() {
        let fx = fixture();
        fx.mock.set_unreachable(true);
        let m = main(&fx).await;
        let view = m.view();
        assert!(!view.ready);
        assert_eq!(view.toasts.len(), 1);
        assert!(view.toasts[0].persistent);
    }

    #[tokio::test]
    async fn close_requests_quit() {
        let mut fx = fixture();
        let mut m = main(&fx).await;
        assert!(drive(&mut m, MainAction::Close).await);
        assert_eq!(fx.requests(), [WindowRequest::Quit]);
    }

    #[tokio::test]
    async fn patterns_round_trip_through_backend() {
        let fx = fixture();
        let mut m = main(&fx).await;
        let input = PatternInput {
            name: "greetings".into(),
            items: vec!["hi".into(), "hello".into()],
        };
        drive(&mut m, MainAction::CreatePattern(input)).await;
        assert_eq!(m.view().patterns.len(), 1);
        let id = m.view().patterns[0].id;
        drive(&mut m, MainAction::DeletePattern(id)).await;
        assert!(m.view().patterns.is_empty());
    }
}
