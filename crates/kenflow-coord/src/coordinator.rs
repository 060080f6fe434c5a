//! Wires the stores, the registry and the surfaces together and owns the
//! surface tasks.

use std::{
    mem,
    sync::{Arc, Weak},
    time::Duration,
};

use kenflow_backend::Backend;
use kenflow_protocol::WindowKind;
use parking_lot::Mutex;
use tokio::{
    sync::mpsc::{UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    Result,
    bus::Bus,
    config::CoordConfig,
    geometry::GeometryStore,
    host::WindowHost,
    notify::ToastEvent,
    registry::{Opened, Registry, WindowHandle},
    store::LocalStore,
    surfaces::{
        ItemPicker, MainSurface, Overlay, Shared, Surface, SurfaceHandle, TargetPicker,
        WindowRequest, spawn_surface,
    },
};

/// How long shutdown waits for each surface task.
const STOP_WAIT: Duration = Duration::from_secs(2);

/// Handles of the running surfaces.
#[derive(Default)]
struct Running {
    /// Main window.
    main: Option<SurfaceHandle<MainSurface>>,
    /// Overlay.
    overlay: Option<SurfaceHandle<Overlay>>,
    /// Item picker.
    item_picker: Option<SurfaceHandle<ItemPicker>>,
    /// Target picker.
    target_picker: Option<SurfaceHandle<TargetPicker>>,
    /// Surface tasks; finished ones are dropped when the next one starts.
    tasks: Vec<JoinHandle<()>>,
}

/// State behind [`Coordinator`].
struct Inner {
    /// Context given to every surface.
    shared: Shared,
    /// Running surfaces.
    running: Mutex<Running>,
    /// Cancelled once every window is closed.
    done: CancellationToken,
}

/// Entry point of the coordination layer.
///
/// Must be created inside a tokio runtime; it starts a task serving the
/// window requests surfaces make.
#[derive(Clone)]
pub struct Coordinator {
    /// Shared state.
    inner: Arc<Inner>,
}

impl Coordinator {
    /// Build every store and service from `config`.
    pub fn new(
        config: CoordConfig,
        backend: Arc<dyn Backend>,
        host: Arc<dyn WindowHost>,
        toasts: Option<UnboundedSender<ToastEvent>>,
    ) -> Self {
        let bus = Bus::new();
        let geometry = Arc::new(GeometryStore::new(config.window_state_path()));
        let registry = Arc::new(Registry::new(host, geometry, bus.clone()));
        let store = Arc::new(LocalStore::new(config.local_state_path()));
        info!(
            backend = %config.backend_url,
            data_dir = %config.data_dir.display(),
            "coordinator starting"
        );
        let (mut shared, requests) = Shared::new(backend, registry, bus, store, Arc::new(config));
        if let Some(tx) = toasts {
            shared = shared.with_toasts(tx);
        }
        let inner = Arc::new(Inner {
            shared,
            running: Mutex::new(Running::default()),
            done: CancellationToken::new(),
        });
        tokio::spawn(serve_requests(Arc::downgrade(&inner), requests));
        Self { inner }
    }

    /// Open the main window.
    pub fn start(&self) -> Result<()> {
        self.open_window(WindowKind::Main).map(drop)
    }

    /// Open `kind` and start its surface. Returns `false` when it was
    /// already open, in which case a picker is focused instead.
    pub fn open_window(&self, kind: WindowKind) -> Result<bool> {
        match self.inner.shared.registry.open(kind)? {
            Opened::Created(handle) => {
                self.inner.start_surface(&handle);
                Ok(true)
            }
            Opened::Existing(_) => Ok(false),
        }
    }

    /// Close `kind`. Closing Main closes everything.
    pub fn close_window(&self, kind: WindowKind) -> bool {
        self.inner.close(kind)
    }

    /// The user moved `kind`.
    pub fn window_moved(&self, kind: WindowKind) {
        self.inner.shared.registry.window_moved(kind);
    }

    /// The user resized `kind`.
    pub fn window_resized(&self, kind: WindowKind) {
        self.inner.shared.registry.window_resized(kind);
    }

    /// Context shared by the surfaces.
    pub fn shared(&self) -> &Shared {
        &self.inner.shared
    }

    /// Window registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.shared.registry
    }

    /// Main surface, while running.
    pub fn main(&self) -> Option<SurfaceHandle<MainSurface>> {
        live(self.inner.running.lock().main.as_ref())
    }

    /// Overlay surface, while running.
    pub fn overlay(&self) -> Option<SurfaceHandle<Overlay>> {
        live(self.inner.running.lock().overlay.as_ref())
    }

    /// Item picker surface, while running.
    pub fn item_picker(&self) -> Option<SurfaceHandle<ItemPicker>> {
        live(self.inner.running.lock().item_picker.as_ref())
    }

    /// Target picker surface, while running.
    pub fn target_picker(&self) -> Option<SurfaceHandle<TargetPicker>> {
        live(self.inner.running.lock().target_picker.as_ref())
    }

    /// Wait until every window has been closed.
    pub async fn closed(&self) {
        self.inner.done.cancelled().await;
    }

    /// Close every window and wait for the surface tasks to finish.
    pub async fn shutdown(&self) {
        self.inner.quit();
        let tasks = mem::take(&mut self.inner.running.lock().tasks);
        for task in tasks {
            match timeout(STOP_WAIT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "surface task failed"),
                Err(_) => warn!("surface task did not stop in time"),
            }
        }
        info!("coordinator stopped");
    }
}

impl Inner {
    /// Start the surface for a freshly created window.
    fn start_surface(&self, handle: &WindowHandle) {
        let shared = self.shared.clone();
        let bus = shared.bus.clone();
        let registry = shared.registry.clone();
        let token = handle.token();
        let mut running = self.running.lock();
        let task = match handle.kind() {
            WindowKind::Main => {
                let surface = MainSurface::new(shared, token.clone());
                let (h, task) = spawn_surface(surface, &bus, registry, token);
                running.main = Some(h);
                task
            }
            WindowKind::Overlay => {
                let (h, task) = spawn_surface(Overlay::new(shared), &bus, registry, token);
                running.overlay = Some(h);
                task
            }
            WindowKind::ItemPicker => {
                let (h, task) = spawn_surface(ItemPicker::new(shared), &bus, registry, token);
                running.item_picker = Some(h);
                task
            }
            WindowKind::TargetPicker => {
                let (h, task) = spawn_surface(TargetPicker::new(shared), &bus, registry, token);
                running.target_picker = Some(h);
                task
            }
        };
        running.tasks.retain(|t| !t.is_finished());
        running.tasks.push(task);
        debug!(kind = %handle.kind(), "surface task started");
    }

    /// Close `kind`; Main takes everything with it.
    fn close(&self, kind: WindowKind) -> bool {
        if kind == WindowKind::Main {
            let was_open = self.shared.registry.is_open(kind);
            self.quit();
            return was_open;
        }
        self.shared.registry.close(kind)
    }

    /// Close every window: pickers, then the overlay, then Main.
    fn quit(&self) {
        if self.done.is_cancelled() {
            return;
        }
        self.shared.registry.close_all();
        self.done.cancel();
        info!("all windows closed");
    }

    /// Apply one request from a surface.
    fn apply(&self, req: WindowRequest) {
        debug!(?req, "window request");
        match req {
            WindowRequest::Open(kind) => match self.shared.registry.open(kind) {
                Ok(Opened::Created(handle)) => self.start_surface(&handle),
                Ok(Opened::Existing(_)) => {}
                Err(e) => warn!(kind = %kind, error = %e, "window not opened"),
            },
            WindowRequest::Close(kind) => {
                self.close(kind);
            }
            WindowRequest::Quit => self.quit(),
        }
    }
}

/// A clone of `handle` if its task is still running.
fn live<S: Surface>(handle: Option<&SurfaceHandle<S>>) -> Option<SurfaceHandle<S>> {
    handle.filter(|h| !h.is_finished()).cloned()
}

/// Serve window requests until the coordinator is dropped or done.
async fn serve_requests(inner: Weak<Inner>, mut rx: UnboundedReceiver<WindowRequest>) {
    let done = match inner.upgrade() {
        Some(i) => i.done.clone(),
        None => return,
    };
    loop {
        let req = tokio::select! {
            _ = done.cancelled() => break,
            req = rx.recv() => req,
        };
        let Some(req) = req else { break };
        let Some(inner) = inner.upgrade() else { break };
        inner.apply(req);
    }
    debug!("window request loop ended");
}
