//! Durable size and position of the Main and Overlay windows.

use std::path::{Path, PathBuf};

use kenflow_protocol::WindowKind;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    Result,
    store::{read_object, write_json_atomic},
};

/// Size and optional position of one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    /// Width in logical pixels.
    pub width: u32,
    /// Height in logical pixels.
    pub height: u32,
    /// Left edge, unset until the window was placed once.
    pub x: Option<i32>,
    /// Top edge, unset until the window was placed once.
    pub y: Option<i32>,
}

impl Geometry {
    /// Built-in Main geometry.
    pub const MAIN_DEFAULT: Self = Self {
        width: 1200,
        height: 800,
        x: None,
        y: None,
    };

    /// Built-in Overlay geometry.
    pub const OVERLAY_DEFAULT: Self = Self {
        width: 600,
        height: 60,
        x: None,
        y: None,
    };

    /// Built-in geometry for `kind`. Pickers share the overlay default but are
    /// never persisted.
    pub fn default_for(kind: WindowKind) -> Self {
        match kind {
            WindowKind::Main => Self::MAIN_DEFAULT,
            _ => Self::OVERLAY_DEFAULT,
        }
    }

    /// Saved position, when both coordinates are known.
    pub fn position(&self) -> Option<(i32, i32)> {
        self.x.zip(self.y)
    }

    /// `self` with every field present in `patch` replaced.
    #[must_use]
    pub fn merged(mut self, patch: &GeometryPatch) -> Self {
        if let Some(w) = patch.width {
            self.width = w;
        }
        if let Some(h) = patch.height {
            self.height = h;
        }
        if patch.x.is_some() {
            self.x = patch.x;
        }
        if patch.y.is_some() {
            self.y = patch.y;
        }
        self
    }
}

/// A partial update; absent fields keep their persisted value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometryPatch {
    /// New width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// New height.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// New left edge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    /// New top edge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
}

impl GeometryPatch {
    /// Patch carrying every field of `g`.
    pub fn full(g: Geometry) -> Self {
        Self {
            width: Some(g.width),
            height: Some(g.height),
            x: g.x,
            y: g.y,
        }
    }

    /// Patch carrying only a position.
    pub fn position(x: i32, y: i32) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    /// Patch carrying only a size.
    pub fn size(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }
}

/// Persisted geometry of every positionable window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryRecord {
    /// Main window.
    pub main: Geometry,
    /// Overlay window.
    pub overlay: Geometry,
}

impl GeometryRecord {
    /// Geometry of `kind`.
    pub fn get(&self, kind: WindowKind) -> Geometry {
        match kind {
            WindowKind::Main => self.main,
            _ => self.overlay,
        }
    }
}

impl Default for GeometryRecord {
    fn default() -> Self {
        Self {
            main: Geometry::MAIN_DEFAULT,
            overlay: Geometry::OVERLAY_DEFAULT,
        }
    }
}

/// File-backed geometry store.
///
/// The file holds one object per window kind (`{"main": {...}, "overlay":
/// {...}}`); every `save` merges into what is already on disk.
#[derive(Debug)]
pub struct GeometryStore {
    /// Backing file.
    path: PathBuf,
    /// Serializes read-modify-write cycles within the process.
    lock: Mutex<()>,
}

impl GeometryStore {
    /// Store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persisted values merged over the built-in defaults. Never fails:
    /// unreadable state is logged and replaced by defaults.
    pub fn load(&self) -> GeometryRecord {
        let _guard = self.lock.lock();
        let obj = read_object(&self.path);
        GeometryRecord {
            main: read_kind(&obj, WindowKind::Main),
            overlay: read_kind(&obj, WindowKind::Overlay),
        }
    }

    /// Merge `patch` into the persisted state of `kind`. Pickers are ignored.
    pub fn save(&self, kind: WindowKind, patch: &GeometryPatch) -> Result<()> {
        if !kind.persists_geometry() {
            return Ok(());
        }
        let _guard = self.lock.lock();
        let mut obj = read_object(&self.path);
        let entry = obj
            .entry(kind.as_str().to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(fields) = entry {
            let encoded = match serde_json::to_value(patch) {
                Ok(Value::Object(m)) => m,
                _ => Map::new(),
            };
            for (k, v) in encoded {
                fields.insert(k, v);
            }
        }
        write_json_atomic(&self.path, &Value::Object(obj))?;
        debug!(kind = %kind, ?patch, "geometry saved");
        Ok(())
    }
}

/// Decode one window's geometry, field by field, over its defaults.
fn read_kind(obj: &Map<String, Value>, kind: WindowKind) -> Geometry {
    let base = Geometry::default_for(kind);
    let Some(raw) = obj.get(kind.as_str()) else {
        return base;
    };
    match serde_json::from_value::<GeometryPatch>(raw.clone()) {
        Ok(patch) => {
            let mut g = base.merged(&patch);
            if g.width == 0 || g.height == 0 {
                g.width = base.width;
                g.height = base.height;
            }
            g
        }
        Err(e) => {
            warn!(kind = %kind, error = %e, "malformed geometry; using defaults");
            base
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = GeometryStore::new(dir.path().join("window-state.json"));
        let rec = store.load();
        assert_eq!(rec, GeometryRecord::default());
        assert_eq!(rec.main.width, 1200);
        assert_eq!(rec.overlay.height, 60);
        assert_eq!(rec.overlay.position(), None);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults_not_zero() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("window-state.json");
        fs::write(&path, r#"{"main":{"x":40},"overlay":{"width":0,"height":0,"y":7}}"#)
            .expect("write");
        let rec = GeometryStore::new(&path).load();
        assert_eq!(rec.main.width, 1200);
        assert_eq!(rec.main.x, Some(40));
        assert_eq!(rec.main.y, None);
        assert_eq!(rec.overlay.width, 600);
        assert_eq!(rec.overlay.y, Some(7));
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("window-state.json");
        fs::write(&path, "\u{0}garbage").expect("write");
        assert_eq!(GeometryStore::new(&path).load(), GeometryRecord::default());
    }

    #[test]
    fn disjoint_saves_both_survive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = GeometryStore::new(dir.path().join("window-state.json"));
        store
            .save(WindowKind::Main, &GeometryPatch::size(1000, 700))
            .expect("main");
        store
            .save(WindowKind::Overlay, &GeometryPatch::position(12, 34))
            .expect("overlay");
        store
            .save(WindowKind::Main, &GeometryPatch::position(5, 6))
            .expect("main pos");

        let rec = store.load();
        assert_eq!(rec.main.width, 1000);
        assert_eq!(rec.main.height, 700);
        assert_eq!(rec.main.position(), Some((5, 6)));
        assert_eq!(rec.overlay.position(), Some((12, 34)));
        assert_eq!(rec.overlay.width, 600);
    }

    #[test]
    fn pickers_are_never_persisted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("window-state.json");
        let store = GeometryStore::new(&path);
        store
            .save(WindowKind::ItemPicker, &GeometryPatch::position(1, 1))
            .expect("noop");
        assert!(!path.exists());
    }
}
