//! Fixtures for surface tests: a mock backend, an in-memory host, and a
//! scratch data directory.

use std::sync::Arc;

use kenflow_backend::{MockBackend, Readiness};
use kenflow_protocol::WindowKind;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

use super::{Flow, Shared, Surface, WindowRequest};
use crate::{
    bus::Bus, config::CoordConfig, geometry::GeometryStore, host::MemoryHost, registry::Registry,
    store::LocalStore,
};

/// A wired-up context over in-memory collaborators.
pub struct Fixture {
    /// Context handed to surfaces.
    pub shared: Shared,
    /// Backend behind `shared`.
    pub mock: Arc<MockBackend>,
    /// Host behind the registry.
    pub host: Arc<MemoryHost>,
    /// Window requests made by surfaces.
    requests: UnboundedReceiver<WindowRequest>,
    /// Data directory, removed on drop.
    _dir: TempDir,
}

impl Fixture {
    /// Drain the window requests made so far.
    pub fn requests(&mut self) -> Vec<WindowRequest> {
        let mut out = Vec::new();
        while let Ok(r) = self.requests.try_recv() {
            out.push(r);
        }
        out
    }

    /// Open `kind` in the registry without starting a surface.
    pub fn open(&self, kind: WindowKind) {
        self.shared.registry.open(kind).expect("open window");
    }
}

/// Fresh fixture with an empty library.
pub fn fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = CoordConfig::in_dir(dir.path());
    config.readiness = Readiness {
        attempts: 2,
        interval_ms: 1,
        probe_timeout_ms: 50,
    };
    let mock = Arc::new(MockBackend::new());
    let host = Arc::new(MemoryHost::default());
    let bus = Bus::new();
    let geometry = Arc::new(GeometryStore::new(config.window_state_path()));
    let registry = Arc::new(Registry::new(host.clone(), geometry, bus.clone()));
    let store = Arc::new(LocalStore::new(config.local_state_path()));
    let (shared, requests) = Shared::new(mock.clone(), registry, bus, store, Arc::new(config));
    Fixture {
        shared,
        mock,
        host,
        requests,
        _dir: dir,
    }
}

/// Handle `action` the way the runner would, awaiting background jobs
/// inline. Returns `true` when the surface asked to close; closing the
/// registry window is left to the caller.
pub async fn drive<S: Surface>(surface: &mut S, action: S::Action) -> bool {
    let mut next = action;
    loop {
        match surface.handle(next).await {
            Flow::Continue => return false,
            Flow::Spawn(job) => next = job.await,
            Flow::Close => {
                surface.teardown().await;
                return true;
            }
        }
    }
}
