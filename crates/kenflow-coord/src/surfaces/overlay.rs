//! The floating overlay: quick-access buttons plus a status strip.

use std::time::Duration;

use async_trait::async_trait;
use kenflow_protocol::{
    SelectionEntry, Signal, Theme, Toast, WindowKind,
    api::{Combination, Message, Settings},
};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{Flow, Shared, Surface, WindowRequest};
use crate::{
    Error, Result,
    notify::Notifier,
    selection::{QuickItem, resolve},
};

/// Overlay size when it shows an empty state.
pub const EMPTY_SIZE: (u32, u32) = (400, 66);
/// Buttons per row.
const BUTTONS_PER_ROW: usize = 8;
/// Horizontal gap between buttons.
const BUTTON_GAP: u32 = 8;
/// Height of one button row, gap included.
const ROW_HEIGHT: u32 = 44;
/// Horizontal padding around the button area.
const PADDING: u32 = 24;
/// Width reserved for the status strip.
const STATUS_WIDTH: u32 = 96;
/// Minimum overlay height.
const MIN_HEIGHT: u32 = 60;

/// What the overlay shows instead of buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyState {
    /// The quick-access list is empty: "no items selected, click to choose".
    NoItems,
    /// There are no messages or combinations at all.
    EmptyLibrary,
    /// The backend did not answer: "connection error, click to retry".
    Unreachable,
}

/// Listener, enter and target indicators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusStrip {
    /// Hotkey listener running.
    pub listener_active: bool,
    /// Enter pressed after each send.
    pub enter_enabled: bool,
    /// Number of target windows; zero means all windows.
    pub target_count: usize,
}

impl StatusStrip {
    /// Whether delivery is unrestricted, in which case the badge is hidden.
    pub fn all_windows(&self) -> bool {
        self.target_count == 0
    }
}

/// Render model of the overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayView {
    /// Buttons in quick-access order.
    pub buttons: Vec<QuickItem>,
    /// Shown instead of buttons when set.
    pub empty: Option<EmptyState>,
    /// Status strip.
    pub status: StatusStrip,
    /// Active theme.
    pub theme: Theme,
    /// Visible toasts.
    pub toasts: Vec<Toast>,
    /// Requested window size.
    pub size: (u32, u32),
}

/// Overlay input, including the results of its own background requests.
#[derive(Debug)]
pub enum OverlayAction {
    /// Deliver a quick-access item.
    Send(SelectionEntry),
    /// Reload after a connection error.
    Retry,
    /// Start or stop the hotkey listener.
    ToggleListener,
    /// Flip enter-after-send.
    ToggleEnter,
    /// Open the quick-access picker.
    OpenItemPicker,
    /// Open the target-window picker.
    OpenTargetPicker,
    /// Close the overlay.
    Close,
    /// A send finished.
    Sent(SelectionEntry, Result<()>),
    /// A listener toggle finished; `active` is the state that was requested.
    ListenerToggled {
        /// Requested state.
        active: bool,
        /// Outcome.
        result: Result<()>,
    },
    /// An enter toggle finished.
    EnterToggled {
        /// Requested state.
        enabled: bool,
        /// Outcome.
        result: Result<()>,
    },
}

/// Pixel size fitting `labels` as buttons, or the empty-state size.
pub fn overlay_size<'a>(labels: impl IntoIterator<Item = &'a str>) -> (u32, u32) {
    let widths: Vec<u32> = labels.into_iter().map(button_width).collect();
    if widths.is_empty() {
        return EMPTY_SIZE;
    }
    let rows = widths.chunks(BUTTONS_PER_ROW);
    let row_count = u32::try_from(rows.len()).unwrap_or(u32::MAX);
    let widest = rows
        .map(|row| {
            let gaps = u32::try_from(row.len() - 1).unwrap_or(0);
            row.iter().sum::<u32>() + BUTTON_GAP * gaps
        })
        .max()
        .unwrap_or(0);
    let width = widest + PADDING + STATUS_WIDTH;
    let height = (row_count * ROW_HEIGHT + 16).max(MIN_HEIGHT);
    (width, height)
}

/// Width of one button for `label`.
fn button_width(label: &str) -> u32 {
    let chars = u32::try_from(label.chars().count()).unwrap_or(u32::MAX);
    chars.saturating_mul(8).saturating_add(32).clamp(60, 200)
}

/// Overlay controller.
#[derive(Debug)]
pub struct Overlay {
    /// Services.
    shared: Shared,
    /// Resolved quick-access items.
    buttons: Vec<QuickItem>,
    /// Current empty state.
    empty: Option<EmptyState>,
    /// Status strip.
    status: StatusStrip,
    /// Theme.
    theme: Theme,
    /// Toasts.
    notifier: Notifier,
    /// A toggle request is in flight.
    updating: bool,
    /// Status syncs are ignored until this instant.
    quiet_until: Option<Instant>,
}

impl Overlay {
    /// Overlay over `shared`.
    pub fn new(shared: Shared) -> Self {
        let notifier = shared.notifier(WindowKind::Overlay);
        Self {
            shared,
            buttons: Vec::new(),
            empty: Some(EmptyState::NoItems),
            status: StatusStrip::default(),
            theme: Theme::default(),
            notifier,
            updating: false,
            quiet_until: None,
        }
    }

    /// Re-read the quick-access list, the library and the status.
    pub async fn reload(&mut self) {
        self.theme = self.shared.theme.get();
        let entries = self.shared.selection.load();
        match self.library().await {
            Ok((messages, combinations)) => {
                self.buttons = resolve(&entries, &messages, &combinations);
                self.empty = if !self.buttons.is_empty() {
                    None
                } else if messages.is_empty() && combinations.is_empty() {
                    Some(EmptyState::EmptyLibrary)
                } else {
                    Some(EmptyState::NoItems)
                };
            }
            Err(e) if e.is_unreachable() => {
                warn!(error = %e, "overlay cannot reach the backend");
                self.buttons.clear();
                self.empty = Some(EmptyState::Unreachable);
            }
            Err(e) => {
                warn!(error = %e, "overlay reload failed");
                self.notifier.error("Loading items", &e);
            }
        }
        self.sync_status().await;
        self.fit();
    }

    /// Messages and combinations.
    async fn library(&self) -> Result<(Vec<Message>, Vec<Combination>)> {
        let messages = self.shared.backend.messages(None).await?;
        let combinations = self.shared.backend.combinations().await?;
        Ok((messages, combinations))
    }

    /// Whether status syncs are suppressed right now.
    fn quiet(&self) -> bool {
        self.updating || self.quiet_until.is_some_and(|t| Instant::now() < t)
    }

    /// Re-read listener, enter and target state unless a toggle is settling.
    async fn sync_status(&mut self) {
        if self.quiet() {
            debug!("status sync skipped during toggle");
            return;
        }
        match self.shared.backend.listener_status().await {
            Ok(s) => self.status.listener_active = s.active,
            Err(e) => debug!(error = %e, "listener status unavailable"),
        }
        match self.shared.backend.settings().await {
            Ok(s) => {
                self.status.enter_enabled = s.enter_enabled();
                self.status.target_count = s.target_windows().len();
            }
            Err(e) => debug!(error = %e, "settings unavailable"),
        }
    }

    /// Ask the registry for the size the current content needs.
    fn fit(&self) {
        let (w, h) = if self.empty.is_some() {
            EMPTY_SIZE
        } else {
            overlay_size(self.buttons.iter().map(|b| b.name.as_str()))
        };
        if let Err(e) = self.shared.registry.resize(WindowKind::Overlay, w, h) {
            warn!(error = %e, "overlay resize failed");
        }
    }

    /// Hand focus back to the target app and fire the send in the background.
    fn send(&self, entry: SelectionEntry) -> Flow<OverlayAction> {
        let Some(id) = entry.item_id.parse::<i64>().ok() else {
            warn!(entry = %entry, "quick-access entry has a non-numeric id");
            return Flow::Continue;
        };
        if let Err(e) = self.shared.registry.blur(WindowKind::Overlay) {
            debug!(error = %e, "overlay blur failed");
        }
        let backend = self.shared.backend.clone();
        Flow::spawn(async move {
            let result = backend
                .send_item(entry.item_type, id)
                .await
                .map_err(Error::from);
            OverlayAction::Sent(entry, result)
        })
    }

    /// Start a toggle unless one is in flight or cooling down.
    fn begin_toggle(&mut self) -> bool {
        if self.quiet() {
            debug!("toggle ignored while another settles");
            return false;
        }
        self.updating = true;
        true
    }

    /// Finish a toggle and start its cooldown.
    fn end_toggle(&mut self) {
        self.updating = false;
        self.quiet_until = Some(Instant::now() + self.cooldown());
    }

    /// Quiet period after a toggle.
    fn cooldown(&self) -> Duration {
        self.shared.config.toggle_cooldown()
    }

    /// Optimistically flip the listener and request the change.
    fn toggle_listener(&mut self) -> Flow<OverlayAction> {
        if !self.begin_toggle() {
            return Flow::Continue;
        }
        let active = !self.status.listener_active;
        self.status.listener_active = active;
        let backend = self.shared.backend.clone();
        Flow::spawn(async move {
            let result = if active {
                backend.start_listener().await
            } else {
                backend.stop_listener().await
            };
            OverlayAction::ListenerToggled {
                active,
                result: result.map(drop).map_err(Error::from),
            }
        })
    }

    /// Optimistically flip enter-after-send and request the change.
    fn toggle_enter(&mut self) -> Flow<OverlayAction> {
        if !self.begin_toggle() {
            return Flow::Continue;
        }
        let enabled = !self.status.enter_enabled;
        self.status.enter_enabled = enabled;
        let backend = self.shared.backend.clone();
        Flow::spawn(async move {
            let result = backend
                .update_settings(&Settings::enter_patch(enabled))
                .await
                .map_err(Error::from);
            OverlayAction::EnterToggled { enabled, result }
        })
    }
}

#[async_trait]
impl Surface for Overlay {
    const KIND: WindowKind = WindowKind::Overlay;
    type Action = OverlayAction;
    type View = OverlayView;

    async fn open(&mut self) {
        self.reload().await;
    }

    async fn handle(&mut self, action: OverlayAction) -> Flow<OverlayAction> {
        self.notifier.prune();
        match action {
            OverlayAction::Send(entry) => return self.send(entry),
            OverlayAction::Retry => self.reload().await,
            OverlayAction::ToggleListener => return self.toggle_listener(),
            OverlayAction::ToggleEnter => return self.toggle_enter(),
            OverlayAction::OpenItemPicker => {
                self.shared.request(WindowRequest::Open(WindowKind::ItemPicker));
            }
            OverlayAction::OpenTargetPicker => {
                self.shared.request(WindowRequest::Open(WindowKind::TargetPicker));
            }
            OverlayAction::Close => return Flow::Close,
            OverlayAction::Sent(entry, result) => match result {
                Ok(()) => debug!(entry = %entry, "sent"),
                Err(e) => {
                    warn!(entry = %entry, error = %e, "send failed");
                    self.notifier.error("Send", &e);
                }
            },
            OverlayAction::ListenerToggled { active, result } => {
                self.end_toggle();
                if let Err(e) = result {
                    self.status.listener_active = !active;
                    self.notifier.error("Listener", &e);
                }
            }
            OverlayAction::EnterToggled { enabled, result } => {
                self.end_toggle();
                match result {
                    Ok(()) => {
                        self.shared.bus.refresh();
                    }
                    Err(e) => {
                        self.status.enter_enabled = !enabled;
                        self.notifier.error("Enter setting", &e);
                    }
                }
            }
        }
        Flow::Continue
    }

    async fn on_signal(&mut self, signal: Signal) {
        if signal == Signal::Refresh {
            self.reload().await;
        }
    }

    async fn tick(&mut self) {
        self.notifier.prune();
        self.sync_status().await;
    }

    fn poll_interval(&self) -> Option<Duration> {
        Some(self.shared.config.overlay_poll())
    }

    fn view(&self) -> OverlayView {
        let size = match self.empty {
            Some(_) => EMPTY_SIZE,
            None => overlay_size(self.buttons.iter().map(|b| b.name.as_str())),
        };
        OverlayView {
            buttons: self.buttons.clone(),
            empty: self.empty,
            status: self.status.clone(),
            theme: self.theme,
            toasts: self.notifier.visible(),
            size,
        }
    }
}
