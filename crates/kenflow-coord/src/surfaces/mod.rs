//! Per-window controllers and the task that drives them.
//!
//! Each surface owns its state outright and runs as its own task. Surfaces
//! talk to each other only through the [`Bus`] and the backend.

mod dashboard;
mod item_picker;
mod overlay;
mod target_picker;
#[cfg(test)]
mod test_support;

use std::{
    fmt,
    future::{self, Future},
    pin::Pin,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use kenflow_backend::Backend;
use kenflow_protocol::{Signal, WindowKind};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::{JoinHandle, JoinSet},
    time::{self, Instant, Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub use self::{
    dashboard::{ComboDraft, Editor, MainAction, MainSurface, MainView, MessageDraft, Selector},
    item_picker::{ItemPicker, PickerAction, PickerView},
    overlay::{EmptyState, Overlay, OverlayAction, OverlayView, StatusStrip, overlay_size},
    target_picker::{TargetAction, TargetPicker, TargetView},
};
use crate::{
    Error, Result,
    bus::{Bus, Subscription},
    config::CoordConfig,
    hotkeys::HotkeyResolver,
    notify::{Notifier, ToastEvent},
    registry::Registry,
    selection::SelectionStore,
    store::LocalStore,
    targets::TargetSelector,
    theme::ThemeStore,
};

/// A window change a surface asks the coordinator to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowRequest {
    /// Open the window and start its surface.
    Open(WindowKind),
    /// Close the window.
    Close(WindowKind),
    /// Close every window and stop.
    Quit,
}

/// Everything a surface may reach beyond its own state.
#[derive(Clone)]
pub struct Shared {
    /// Backend service.
    pub backend: Arc<dyn Backend>,
    /// Window registry.
    pub registry: Arc<Registry>,
    /// Refresh fan-out.
    pub bus: Bus,
    /// Local key/value state.
    pub store: Arc<LocalStore>,
    /// Runtime settings.
    pub config: Arc<CoordConfig>,
    /// Quick-access persistence.
    pub selection: SelectionStore,
    /// Theme persistence.
    pub theme: ThemeStore,
    /// Hotkey ownership.
    pub hotkeys: HotkeyResolver,
    /// Target-window set.
    pub targets: TargetSelector,
    /// Where toasts are forwarded, if anywhere.
    pub toasts: Option<mpsc::UnboundedSender<ToastEvent>>,
    /// Window requests to the coordinator.
    requests: mpsc::UnboundedSender<WindowRequest>,
}

impl Shared {
    /// Context over the given services, with the receiving end of the window
    /// requests its surfaces will make.
    pub fn new(
        backend: Arc<dyn Backend>,
        registry: Arc<Registry>,
        bus: Bus,
        store: Arc<LocalStore>,
        config: Arc<CoordConfig>,
    ) -> (Self, mpsc::UnboundedReceiver<WindowRequest>) {
        let (requests, rx) = mpsc::unbounded_channel();
        let shared = Self {
            selection: SelectionStore::new(store.clone()),
            theme: ThemeStore::new(store.clone()),
            hotkeys: HotkeyResolver::new(backend.clone()),
            targets: TargetSelector::new(backend.clone()),
            backend,
            registry,
            bus,
            store,
            config,
            toasts: None,
            requests,
        };
        (shared, rx)
    }

    /// Ask the coordinator for a window change. Lost when the coordinator is gone.
    pub fn request(&self, req: WindowRequest) {
        if self.requests.send(req).is_err() {
            debug!(?req, "window request dropped; coordinator gone");
        }
    }

    /// Forward toasts to `tx`.
    pub fn with_toasts(mut self, tx: mpsc::UnboundedSender<ToastEvent>) -> Self {
        self.toasts = Some(tx);
        self
    }

    /// A fresh notifier for `kind`.
    pub fn notifier(&self, kind: WindowKind) -> Notifier {
        Notifier::new(kind, self.config.toast_ttl(), self.toasts.clone())
    }
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("bus", &self.bus)
            .field("backend_url", &self.config.backend_url)
            .finish_non_exhaustive()
    }
}

/// Background work started by an action; its output is fed back as an action.
pub type Job<A> = Pin<Box<dyn Future<Output = A> + Send + 'static>>;

/// What the runner does after an action.
pub enum Flow<A> {
    /// Keep running.
    Continue,
    /// Run `job` in the background and handle its result later.
    Spawn(Job<A>),
    /// Tear down and close the window.
    Close,
}

impl<A> Flow<A> {
    /// Wrap `fut` as a background job.
    pub fn spawn(fut: impl Future<Output = A> + Send + 'static) -> Self {
        Self::Spawn(Box::pin(fut))
    }
}

impl<A> fmt::Debug for Flow<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => f.write_str("Continue"),
            Self::Spawn(_) => f.write_str("Spawn(..)"),
            Self::Close => f.write_str("Close"),
        }
    }
}

/// A window controller.
///
/// Hooks are called from one task only, so implementations hold plain owned
/// state.
#[async_trait]
pub trait Surface: Send + 'static {
    /// Window kind this controller drives.
    const KIND: WindowKind;
    /// Input events.
    type Action: Send + fmt::Debug + 'static;
    /// Render model.
    type View: Clone + Send + Sync + 'static;

    /// Initial load.
    async fn open(&mut self);

    /// Handle one action.
    async fn handle(&mut self, action: Self::Action) -> Flow<Self::Action>;

    /// Handle a bus signal.
    async fn on_signal(&mut self, signal: Signal);

    /// Periodic status sync.
    async fn tick(&mut self) {}

    /// Period of [`tick`](Self::tick); `None` disables polling.
    fn poll_interval(&self) -> Option<Duration> {
        None
    }

    /// Instant at which [`on_deadline`](Self::on_deadline) should run.
    fn deadline(&self) -> Option<Instant> {
        None
    }

    /// The deadline passed.
    async fn on_deadline(&mut self) {}

    /// Current render model.
    fn view(&self) -> Self::View;

    /// Final hook before the task ends, whether the surface asked to close or
    /// its window was closed from outside.
    async fn teardown(&mut self) {}
}

/// An action together with its completion notice.
struct Envelope<A> {
    /// The action.
    action: A,
    /// Fired once the action (and any resulting close) has been handled.
    ack: oneshot::Sender<()>,
}

/// Control side of a running surface.
pub struct SurfaceHandle<S: Surface> {
    /// Action queue.
    tx: mpsc::UnboundedSender<Envelope<S::Action>>,
    /// Latest view.
    view: watch::Receiver<S::View>,
    /// Window token.
    token: CancellationToken,
}

impl<S: Surface> Clone for SurfaceHandle<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            view: self.view.clone(),
            token: self.token.clone(),
        }
    }
}

impl<S: Surface> SurfaceHandle<S> {
    /// Queue `action` and wait until it has been handled.
    pub async fn dispatch(&self, action: S::Action) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Envelope { action, ack })
            .map_err(|_| Error::ChannelClosed)?;
        done.await.map_err(|_| Error::ChannelClosed)
    }

    /// Queue `action` without waiting.
    pub fn post(&self, action: S::Action) -> Result<()> {
        let (ack, _done) = oneshot::channel();
        self.tx
            .send(Envelope { action, ack })
            .map_err(|_| Error::ChannelClosed)
    }

    /// Latest published view.
    pub fn view(&self) -> S::View {
        self.view.borrow().clone()
    }

    /// Watch for view changes.
    pub fn watch(&self) -> watch::Receiver<S::View> {
        self.view.clone()
    }

    /// Whether the surface task has stopped.
    pub fn is_finished(&self) -> bool {
        self.tx.is_closed()
    }

    /// Token of the window this surface drives.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl<S: Surface> fmt::Debug for SurfaceHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceHandle")
            .field("kind", &S::KIND)
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

/// Start `surface` as a task bound to its window `token`.
pub fn spawn_surface<S: Surface>(
    surface: S,
    bus: &Bus,
    registry: Arc<Registry>,
    token: CancellationToken,
) -> (SurfaceHandle<S>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (view_tx, view) = watch::channel(surface.view());
    // Subscribe before the task starts so no signal published after spawn is missed.
    let sub = bus.subscribe(S::KIND);
    let task = tokio::spawn(run(surface, rx, view_tx, sub, registry, token.clone()));
    (SurfaceHandle { tx, view, token }, task)
}

/// Poll timer for `period`, first tick one period from now.
fn poll_timer(period: Option<Duration>) -> Option<Interval> {
    period.map(|p| {
        let mut t = time::interval_at(Instant::now() + p, p);
        t.set_missed_tick_behavior(MissedTickBehavior::Skip);
        t
    })
}

/// Wait for the next poll tick, forever when polling is off.
async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(t) => {
            t.tick().await;
        }
        None => future::pending::<()>().await,
    }
}

/// Wait for `deadline`, forever when there is none.
async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => time::sleep_until(d).await,
        None => future::pending::<()>().await,
    }
}

/// Surface event loop.
async fn run<S: Surface>(
    mut surface: S,
    mut rx: mpsc::UnboundedReceiver<Envelope<S::Action>>,
    view: watch::Sender<S::View>,
    mut sub: Subscription,
    registry: Arc<Registry>,
    token: CancellationToken,
) {
    debug!(kind = %S::KIND, "surface started");
    surface.open().await;
    view.send_replace(surface.view());
    let mut poll = poll_timer(surface.poll_interval());
    let mut jobs: JoinSet<S::Action> = JoinSet::new();

    loop {
        let deadline = surface.deadline();
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            Some(env) = rx.recv() => {
                trace!(kind = %S::KIND, action = ?env.action, "surface action");
                let closing = match surface.handle(env.action).await {
                    Flow::Continue => false,
                    Flow::Spawn(job) => {
                        jobs.spawn(job);
                        false
                    }
                    Flow::Close => true,
                };
                if closing {
                    surface.teardown().await;
                    view.send_replace(surface.view());
                    registry.close(S::KIND);
                    jobs.detach_all();
                    env.ack.send(()).ok();
                    debug!(kind = %S::KIND, "surface closed itself");
                    return;
                }
                view.send_replace(surface.view());
                env.ack.send(()).ok();
            }
            Some(done) = jobs.join_next(), if !jobs.is_empty() => {
                match done {
                    Ok(action) => {
                        if let Flow::Spawn(job) = surface.handle(action).await {
                            jobs.spawn(job);
                        }
                        view.send_replace(surface.view());
                    }
                    Err(e) => debug!(kind = %S::KIND, error = %e, "background job failed"),
                }
            }
            Some(signal) = sub.recv() => {
                surface.on_signal(signal).await;
                for other in sub.coalesce(signal) {
                    surface.on_signal(other).await;
                }
                view.send_replace(surface.view());
            }
            () = until(deadline), if deadline.is_some() => {
                surface.on_deadline().await;
                view.send_replace(surface.view());
            }
            () = next_tick(&mut poll) => {
                surface.tick().await;
                view.send_replace(surface.view());
            }
        }
    }

    surface.teardown().await;
    view.send_replace(surface.view());
    // In-flight requests finish on their own; their results are dropped.
    jobs.detach_all();
    debug!(kind = %S::KIND, "surface stopped");
}
