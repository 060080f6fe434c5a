//! Lifecycle of the four surfaces' native windows.
//!
//! The registry is the only component that creates, moves, resizes or closes
//! windows. It holds at most one handle per [`WindowKind`], consults the
//! geometry store when placing Main and Overlay, anchors pickers above the
//! overlay, and emits the close signals other surfaces depend on.

use std::{collections::BTreeMap, sync::Arc};

use kenflow_protocol::{Signal, WindowKind};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    Result,
    bus::Bus,
    geometry::{Geometry, GeometryPatch, GeometryStore},
    host::{Bounds, NativeId, WindowHost, WindowSpec},
};

/// Gap between the overlay's top edge and an anchored picker.
pub const PICKER_GAP: i32 = 10;
/// Smallest distance between a picker and the top of the work area.
pub const PICKER_MIN_TOP: i32 = 10;
/// Default distance between the overlay and the bottom of the work area.
pub const OVERLAY_BOTTOM_MARGIN: i32 = 80;

/// Fixed size of a picker window.
pub fn picker_size(kind: WindowKind) -> (u32, u32) {
    match kind {
        WindowKind::TargetPicker => (340, 500),
        _ => (320, 450),
    }
}

/// A live window.
///
/// The token is cancelled when the window closes; surface tasks and key
/// captures bound to the window watch it.
#[derive(Debug, Clone)]
pub struct WindowHandle {
    /// Surface kind.
    kind: WindowKind,
    /// Native window id.
    native: NativeId,
    /// Cancelled on close.
    token: CancellationToken,
}

impl WindowHandle {
    /// Surface kind.
    pub fn kind(&self) -> WindowKind {
        self.kind
    }

    /// Native window id.
    pub fn native(&self) -> NativeId {
        self.native
    }

    /// Token cancelled when this window closes.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Whether the window is still open.
    pub fn is_live(&self) -> bool {
        !self.token.is_cancelled()
    }
}

/// Result of [`Registry::open`].
#[derive(Debug, Clone)]
pub enum Opened {
    /// A new window was created.
    Created(WindowHandle),
    /// The window already existed (and was focused, for pickers).
    Existing(WindowHandle),
}

impl Opened {
    /// The window handle.
    pub fn handle(&self) -> &WindowHandle {
        match self {
            Self::Created(h) | Self::Existing(h) => h,
        }
    }

    /// Whether a window was created by this call.
    pub fn created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Window registry.
pub struct Registry {
    /// Native windowing.
    host: Arc<dyn WindowHost>,
    /// Persisted Main/Overlay geometry.
    geometry: Arc<GeometryStore>,
    /// Signals emitted on close.
    bus: Bus,
    /// Live handles, one per kind.
    handles: Mutex<BTreeMap<WindowKind, WindowHandle>>,
    /// Parent of every window token.
    root: CancellationToken,
}

impl Registry {
    /// Registry over `host`.
    pub fn new(host: Arc<dyn WindowHost>, geometry: Arc<GeometryStore>, bus: Bus) -> Self {
        Self {
            host,
            geometry,
            bus,
            handles: Mutex::new(BTreeMap::new()),
            root: CancellationToken::new(),
        }
    }

    /// Open `kind`. Main and Overlay are no-ops when already open; pickers are
    /// focused instead of duplicated.
    pub fn open(&self, kind: WindowKind) -> Result<Opened> {
        let mut handles = self.handles.lock();
        if let Some(existing) = handles.get(&kind) {
            if kind.is_picker() {
                self.host.focus(existing.native)?;
                debug!(kind = %kind, "picker already open; focused");
            }
            return Ok(Opened::Existing(existing.clone()));
        }
        let overlay = handles
            .get(&WindowKind::Overlay)
            .and_then(|h| self.host.bounds(h.native));
        let spec = self.spec_for(kind, overlay);
        let native = self.host.create(&spec)?;
        let handle = WindowHandle {
            kind,
            native,
            token: self.root.child_token(),
        };
        handles.insert(kind, handle.clone());
        info!(kind = %kind, x = spec.bounds.x, y = spec.bounds.y, "window opened");
        Ok(Opened::Created(handle))
    }

    /// Close `kind`. Returns `false` when it was not open.
    ///
    /// Main and Overlay write a geometry snapshot first. Closing the overlay
    /// tells Main; closing a picker asks every surface to refresh.
    pub fn close(&self, kind: WindowKind) -> bool {
        let Some(handle) = self.handles.lock().remove(&kind) else {
            return false;
        };
        if kind.persists_geometry()
            && let Some(b) = self.host.bounds(handle.native)
        {
            self.persist(kind, &GeometryPatch::full(to_geometry(b)));
        }
        handle.token.cancel();
        if let Err(e) = self.host.close(handle.native) {
            warn!(kind = %kind, error = %e, "host failed to close window");
        }
        info!(kind = %kind, "window closed");
        match kind {
            WindowKind::Overlay => {
                self.bus.publish(Signal::OverlayClosed);
            }
            WindowKind::ItemPicker | WindowKind::TargetPicker => {
                self.bus.publish(Signal::Refresh);
            }
            WindowKind::Main => {}
        }
        true
    }

    /// Close everything, pickers first and Main last.
    pub fn close_all(&self) {
        for kind in [
            WindowKind::ItemPicker,
            WindowKind::TargetPicker,
            WindowKind::Overlay,
            WindowKind::Main,
        ] {
            self.close(kind);
        }
        self.root.cancel();
    }

    /// Whether `kind` is open.
    pub fn is_open(&self, kind: WindowKind) -> bool {
        self.handles.lock().contains_key(&kind)
    }

    /// Handle of `kind`, if open.
    pub fn handle(&self, kind: WindowKind) -> Option<WindowHandle> {
        self.handles.lock().get(&kind).cloned()
    }

    /// Open kinds in stable order.
    pub fn open_kinds(&self) -> Vec<WindowKind> {
        self.handles.lock().keys().copied().collect()
    }

    /// Current rectangle of `kind`.
    pub fn bounds(&self, kind: WindowKind) -> Option<Bounds> {
        let native = self.handles.lock().get(&kind)?.native;
        self.host.bounds(native)
    }

    /// Focus `kind` if open.
    pub fn focus(&self, kind: WindowKind) -> Result<()> {
        match self.native(kind) {
            Some(n) => self.host.focus(n),
            None => Ok(()),
        }
    }

    /// Blur `kind` if open, returning keyboard focus to the target application.
    pub fn blur(&self, kind: WindowKind) -> Result<()> {
        match self.native(kind) {
            Some(n) => self.host.blur(n),
            None => Ok(()),
        }
    }

    /// Resize `kind` in place, keeping its top-left corner.
    pub fn resize(&self, kind: WindowKind, width: u32, height: u32) -> Result<()> {
        let Some(native) = self.native(kind) else {
            return Ok(());
        };
        let Some(current) = self.host.bounds(native) else {
            return Ok(());
        };
        if current.width == width && current.height == height {
            return Ok(());
        }
        self.host
            .set_bounds(native, Bounds::new(current.x, current.y, width, height))?;
        self.persist(kind, &GeometryPatch::size(width, height));
        Ok(())
    }

    /// Record a native move of `kind`.
    pub fn window_moved(&self, kind: WindowKind) {
        if let Some(b) = self.bounds(kind) {
            self.persist(kind, &GeometryPatch::position(b.x, b.y));
        }
    }

    /// Record a native resize of `kind`.
    pub fn window_resized(&self, kind: WindowKind) {
        if let Some(b) = self.bounds(kind) {
            self.persist(kind, &GeometryPatch::full(to_geometry(b)));
        }
    }

    /// Placement and chrome of a new `kind` window, given the overlay bounds
    /// when the overlay is open.
    pub fn spec_for(&self, kind: WindowKind, overlay: Option<Bounds>) -> WindowSpec {
        let area = self.host.work_area();
        let bounds = match kind {
            WindowKind::Main | WindowKind::Overlay => {
                let g = self.geometry.load().get(kind);
                let (x, y) = g
                    .position()
                    .unwrap_or_else(|| default_position(kind, area, g.width, g.height));
                clamp_into(area, Bounds::new(x, y, g.width, g.height), 0)
            }
            WindowKind::ItemPicker | WindowKind::TargetPicker => {
                let (w, h) = picker_size(kind);
                anchored_picker(area, overlay, w, h)
            }
        };
        WindowSpec {
            kind,
            bounds,
            frameless: true,
            always_on_top: kind != WindowKind::Main,
            skip_taskbar: kind != WindowKind::Main,
            resizable: kind != WindowKind::Overlay,
        }
    }

    /// Native id of `kind`.
    fn native(&self, kind: WindowKind) -> Option<NativeId> {
        self.handles.lock().get(&kind).map(|h| h.native)
    }

    /// Save geometry, logging failures.
    fn persist(&self, kind: WindowKind, patch: &GeometryPatch) {
        if let Err(e) = self.geometry.save(kind, patch) {
            warn!(kind = %kind, error = %e, "geometry not saved");
        }
    }
}

/// Geometry of a rectangle.
fn to_geometry(b: Bounds) -> Geometry {
    Geometry {
        width: b.width,
        height: b.height,
        x: Some(b.x),
        y: Some(b.y),
    }
}

/// Position used when nothing is saved: Main centered, Overlay centered
/// horizontally near the bottom of the work area.
fn default_position(kind: WindowKind, area: Bounds, width: u32, height: u32) -> (i32, i32) {
    let x = area.x + (area.width as i32 - width as i32) / 2;
    let y = match kind {
        WindowKind::Overlay => area.bottom() - height as i32 - OVERLAY_BOTTOM_MARGIN,
        _ => area.y + (area.height as i32 - height as i32) / 2,
    };
    (x, y)
}

/// Picker rectangle: just above the overlay when it is open, else centered.
fn anchored_picker(area: Bounds, overlay: Option<Bounds>, width: u32, height: u32) -> Bounds {
    let Some(o) = overlay else {
        let x = area.x + (area.width as i32 - width as i32) / 2;
        let y = area.y + (area.height as i32 - height as i32) / 2;
        return clamp_into(area, Bounds::new(x, y, width, height), PICKER_MIN_TOP);
    };
    let mut y = o.y - height as i32 - PICKER_GAP;
    if y < area.y {
        y = area.y + PICKER_MIN_TOP;
    }
    clamp_into(area, Bounds::new(o.x, y, width, height), PICKER_MIN_TOP)
}

/// Shift `b` so it lies inside `area`, at least `min_top` below its top edge.
fn clamp_into(area: Bounds, b: Bounds, min_top: i32) -> Bounds {
    let max_x = (area.right() - b.width as i32).max(area.x);
    let max_y = (area.bottom() - b.height as i32).max(area.y + min_top);
    Bounds {
        x: b.x.clamp(area.x, max_x),
        y: b.y.clamp(area.y + min_top, max_y),
        ..b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostOp, MemoryHost};

    struct Fixture {
        _dir: tempfile::TempDir,
        host: Arc<MemoryHost>,
        bus: Bus,
        geometry: Arc<GeometryStore>,
        registry: Registry,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let host = Arc::new(MemoryHost::default());
        let bus = Bus::new();
        let geometry = Arc::new(GeometryStore::new(dir.path().join("window-state.json")));
        let registry = Registry::new(host.clone(), geometry.clone(), bus.clone());
        Fixture {
            _dir: dir,
            host,
            bus,
            geometry,
            registry,
        }
    }

    #[test]
    fn picker_opened_twice_is_focused_not_duplicated() {
        let f = fixture();
        assert!(f.registry.open(WindowKind::ItemPicker).expect("open").created());
        let again = f.registry.open(WindowKind::ItemPicker).expect("open");
        assert!(!again.created());
        assert_eq!(f.host.live_count(WindowKind::ItemPicker), 1);
        assert_eq!(f.host.ops().last(), Some(&HostOp::Focus(WindowKind::ItemPicker)));
    }

    #[test]
    fn overlay_open_is_idempotent() {
        let f = fixture();
        f.registry.open(WindowKind::Overlay).expect("open");
        f.host.clear_ops();
        assert!(!f.registry.open(WindowKind::Overlay).expect("open").created());
        assert!(f.host.ops().is_empty());
    }

    #[test]
    fn default_placements() {
        let f = fixture();
        let main = f.registry.spec_for(WindowKind::Main, None);
        assert_eq!(main.bounds, Bounds::new(360, 140, 1200, 800));
        assert!(!main.always_on_top);
        let overlay = f.registry.spec_for(WindowKind::Overlay, None);
        assert_eq!(overlay.bounds, Bounds::new(660, 1080 - 60 - 80, 600, 60));
        assert!(overlay.frameless && overlay.always_on_top && overlay.skip_taskbar);
    }

    #[test]
    fn picker_anchors_above_overlay() {
        let f = fixture();
        let spec = f
            .registry
            .spec_for(WindowKind::ItemPicker, Some(Bounds::new(100, 900, 600, 60)));
        assert_eq!(spec.bounds, Bounds::new(100, 900 - 450 - 10, 320, 450));
        let spec = f
            .registry
            .spec_for(WindowKind::TargetPicker, Some(Bounds::new(100, 900, 600, 60)));
        assert_eq!(spec.bounds, Bounds::new(100, 900 - 500 - 10, 340, 500));
    }

    #[test]
    fn picker_near_top_is_clamped_on_screen() {
        let f = fixture();
        let spec = f
            .registry
            .spec_for(WindowKind::ItemPicker, Some(Bounds::new(1800, 100, 600, 60)));
        assert_eq!(spec.bounds.y, PICKER_MIN_TOP);
        assert_eq!(spec.bounds.x, 1920 - 320);
    }

    #[test]
    fn unanchored_picker_is_centered() {
        let f = fixture();
        let spec = f.registry.spec_for(WindowKind::TargetPicker, None);
        assert_eq!(spec.bounds, Bounds::new((1920 - 340) / 2, (1080 - 500) / 2, 340, 500));
    }

    #[test]
    fn overlay_close_saves_geometry_and_tells_main() {
        let f = fixture();
        let mut main = f.bus.subscribe(WindowKind::Main);
        let handle = f.registry.open(WindowKind::Overlay).expect("open").handle().clone();
        f.host.user_move(handle.native(), 50, 70).expect("move");
        f.registry.window_moved(WindowKind::Overlay);
        assert!(f.registry.close(WindowKind::Overlay));
        assert!(!handle.is_live());
        assert!(!f.registry.is_open(WindowKind::Overlay));
        assert_eq!(main.try_recv(), Some(Signal::OverlayClosed));
        assert_eq!(f.geometry.load().overlay.position(), Some((50, 70)));

        let reopened = f.registry.open(WindowKind::Overlay).expect("reopen");
        assert_eq!(
            f.registry.bounds(WindowKind::Overlay),
            Some(Bounds::new(50, 70, 600, 60))
        );
        assert!(reopened.created());
    }

    #[test]
    fn picker_close_requests_refresh() {
        let f = fixture();
        let mut overlay = f.bus.subscribe(WindowKind::Overlay);
        f.registry.open(WindowKind::TargetPicker).expect("open");
        assert!(f.registry.close(WindowKind::TargetPicker));
        assert_eq!(overlay.try_recv(), Some(Signal::Refresh));
        assert!(!f.registry.close(WindowKind::TargetPicker));
    }

    #[test]
    fn resize_keeps_origin_and_persists_size() {
        let f = fixture();
        f.registry.open(WindowKind::Overlay).expect("open");
        let before = f.registry.bounds(WindowKind::Overlay).expect("bounds");
        f.registry.resize(WindowKind::Overlay, 400, 66).expect("resize");
        let after = f.registry.bounds(WindowKind::Overlay).expect("bounds");
        assert_eq!((after.x, after.y), (before.x, before.y));
        assert_eq!((after.width, after.height), (400, 66));
        assert_eq!(f.geometry.load().overlay.width, 400);
    }

    #[test]
    fn failed_create_leaves_kind_creatable() {
        let f = fixture();
        f.host.set_fail_create(true);
        assert!(f.registry.open(WindowKind::Overlay).is_err());
        assert!(!f.registry.is_open(WindowKind::Overlay));
        f.host.set_fail_create(false);
        assert!(f.registry.open(WindowKind::Overlay).expect("open").created());
    }
}
