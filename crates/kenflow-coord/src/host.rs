//! The native windowing seam.
//!
//! The coordination layer never touches a window toolkit directly; it drives
//! a [`WindowHost`]. [`MemoryHost`] keeps windows in memory and records every
//! operation, for tests and the headless session.

use std::{
    collections::BTreeMap,
    fmt,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use kenflow_protocol::WindowKind;
use parking_lot::Mutex;

use crate::{Error, Result};

/// Opaque id of a native window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeId(pub u64);

impl fmt::Display for NativeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Window rectangle in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl Bounds {
    /// Rectangle from parts.
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge (exclusive).
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width as i32)
    }

    /// Bottom edge (exclusive).
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height as i32)
    }
}

/// Window chrome requested at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    /// Which surface the window hosts.
    pub kind: WindowKind,
    /// Initial rectangle.
    pub bounds: Bounds,
    /// No title bar or border.
    pub frameless: bool,
    /// Stays above normal windows.
    pub always_on_top: bool,
    /// Hidden from the taskbar / dock.
    pub skip_taskbar: bool,
    /// User may resize.
    pub resizable: bool,
}

/// Native window operations used by the registry.
pub trait WindowHost: Send + Sync {
    /// Create a window.
    fn create(&self, spec: &WindowSpec) -> Result<NativeId>;
    /// Destroy a window.
    fn close(&self, id: NativeId) -> Result<()>;
    /// Bring a window to the foreground.
    fn focus(&self, id: NativeId) -> Result<()>;
    /// Give up keyboard focus so the previously active application gets it back.
    fn blur(&self, id: NativeId) -> Result<()>;
    /// Current rectangle, `None` when the window is gone.
    fn bounds(&self, id: NativeId) -> Option<Bounds>;
    /// Move and resize.
    fn set_bounds(&self, id: NativeId, bounds: Bounds) -> Result<()>;
    /// Work area of the screen new windows are placed on.
    fn work_area(&self) -> Bounds;
}

/// One operation recorded by [`MemoryHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    /// `create` for a kind at a rectangle.
    Create(WindowKind, Bounds),
    /// `close`.
    Close(WindowKind),
    /// `focus`.
    Focus(WindowKind),
    /// `blur`.
    Blur(WindowKind),
    /// `set_bounds`.
    SetBounds(WindowKind, Bounds),
}

/// One in-memory window.
#[derive(Debug, Clone)]
struct MemWindow {
    /// Creation parameters.
    spec: WindowSpec,
    /// Current rectangle.
    bounds: Bounds,
}

/// In-memory [`WindowHost`].
#[derive(Debug)]
pub struct MemoryHost {
    /// Next id.
    next_id: AtomicU64,
    /// Live windows.
    windows: Mutex<BTreeMap<NativeId, MemWindow>>,
    /// Recorded operations.
    ops: Mutex<Vec<HostOp>>,
    /// Screen work area.
    screen: Mutex<Bounds>,
    /// When set, `create` fails.
    fail_create: AtomicBool,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new(Bounds::new(0, 0, 1920, 1080))
    }
}

impl MemoryHost {
    /// Host with the given screen work area.
    pub fn new(screen: Bounds) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            windows: Mutex::new(BTreeMap::new()),
            ops: Mutex::new(Vec::new()),
            screen: Mutex::new(screen),
            fail_create: AtomicBool::new(false),
        }
    }

    /// Make `create` fail (or succeed again).
    pub fn set_fail_create(&self, v: bool) {
        self.fail_create.store(v, Ordering::SeqCst);
    }

    /// Change the screen work area.
    pub fn set_work_area(&self, b: Bounds) {
        *self.screen.lock() = b;
    }

    /// Simulate the user dragging a window; the registry must be told
    /// separately, as a native move event would.
    pub fn user_move(&self, id: NativeId, x: i32, y: i32) -> Option<Bounds> {
        let mut wins = self.windows.lock();
        let w = wins.get_mut(&id)?;
        w.bounds.x = x;
        w.bounds.y = y;
        Some(w.bounds)
    }

    /// Simulate the user resizing a window.
    pub fn user_resize(&self, id: NativeId, width: u32, height: u32) -> Option<Bounds> {
        let mut wins = self.windows.lock();
        let w = wins.get_mut(&id)?;
        w.bounds.width = width;
        w.bounds.height = height;
        Some(w.bounds)
    }

    /// Recorded operations, oldest first.
    pub fn ops(&self) -> Vec<HostOp> {
        self.ops.lock().clone()
    }

    /// Forget recorded operations.
    pub fn clear_ops(&self) {
        self.ops.lock().clear();
    }

    /// Number of live windows of `kind`.
    pub fn live_count(&self, kind: WindowKind) -> usize {
        self.windows
            .lock()
            .values()
            .filter(|w| w.spec.kind == kind)
            .count()
    }

    /// Creation parameters of the live window of `kind`.
    pub fn spec_of(&self, kind: WindowKind) -> Option<WindowSpec> {
        self.windows
            .lock()
            .values()
            .find(|w| w.spec.kind == kind)
            .map(|w| w.spec.clone())
    }

    /// Record an operation.
    fn note(&self, op: HostOp) {
        self.ops.lock().push(op);
    }

    /// Kind of a live window.
    fn kind_of(&self, id: NativeId) -> Result<WindowKind> {
        self.windows
            .lock()
            .get(&id)
            .map(|w| w.spec.kind)
            .ok_or_else(|| Error::Host(format!("no window {id}")))
    }
}

impl WindowHost for MemoryHost {
    fn create(&self, spec: &WindowSpec) -> Result<NativeId> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::Host("window creation failed".into()));
        }
        let id = NativeId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.windows.lock().insert(
            id,
            MemWindow {
                spec: spec.clone(),
                bounds: spec.bounds,
            },
        );
        self.note(HostOp::Create(spec.kind, spec.bounds));
        Ok(id)
    }

    fn close(&self, id: NativeId) -> Result<()> {
        let kind = self.kind_of(id)?;
        self.windows.lock().remove(&id);
        self.note(HostOp::Close(kind));
        Ok(())
    }

    fn focus(&self, id: NativeId) -> Result<()> {
        let kind = self.kind_of(id)?;
        self.note(HostOp::Focus(kind));
        Ok(())
    }

    fn blur(&self, id: NativeId) -> Result<()> {
        let kind = self.kind_of(id)?;
        self.note(HostOp::Blur(kind));
        Ok(())
    }

    fn bounds(&self, id: NativeId) -> Option<Bounds> {
        self.windows.lock().get(&id).map(|w| w.bounds)
    }

    fn set_bounds(&self, id: NativeId, bounds: Bounds) -> Result<()> {
        let kind = {
            let mut wins = self.windows.lock();
            let w = wins
                .get_mut(&id)
                .ok_or_else(|| Error::Host(format!("no window {id}")))?;
            w.bounds = bounds;
            w.spec.kind
        };
        self.note(HostOp::SetBounds(kind, bounds));
        Ok(())
    }

    fn work_area(&self) -> Bounds {
        *self.screen.lock()
    }
}
