use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use kenflow_backend::Readiness;
use serde::{Deserialize, Serialize};

/// Default backend base URL.
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000/api";
/// Environment variable overriding the backend URL.
pub const ENV_BACKEND_URL: &str = "KENFLOW_BACKEND_URL";
/// Environment variable overriding the data directory.
pub const ENV_DATA_DIR: &str = "KENFLOW_DATA_DIR";

/// Geometry file name inside the data directory.
pub const WINDOW_STATE_FILE: &str = "window-state.json";
/// Key/value file name inside the data directory.
pub const LOCAL_STATE_FILE: &str = "local-state.json";

/// Runtime configuration of the coordination layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordConfig {
    /// Backend base URL.
    pub backend_url: String,
    /// Directory holding local state files.
    pub data_dir: PathBuf,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Startup readiness wait.
    pub readiness: Readiness,
    /// Main surface status poll interval in milliseconds.
    pub main_poll_ms: u64,
    /// Overlay status poll interval in milliseconds.
    pub overlay_poll_ms: u64,
    /// Quiet period after an overlay toggle, in milliseconds.
    pub toggle_cooldown_ms: u64,
    /// Delay before a blurred inline selector closes, in milliseconds.
    pub selector_blur_ms: u64,
    /// Lifetime of transient toasts, in milliseconds.
    pub toast_ttl_ms: u64,
}

impl Default for CoordConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            data_dir: default_data_dir(),
            request_timeout_ms: 5_000,
            readiness: Readiness::default(),
            main_poll_ms: 2_000,
            overlay_poll_ms: 500,
            toggle_cooldown_ms: 500,
            selector_blur_ms: 150,
            toast_ttl_ms: 3_000,
        }
    }
}

/// Platform data directory for kenflow, or `./kenflow` when the platform has none.
fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kenflow")
}

impl CoordConfig {
    /// Resolve the configuration from explicit overrides, then the
    /// environment, then defaults.
    pub fn resolve(backend_url: Option<String>, data_dir: Option<PathBuf>) -> Self {
        let backend_url = backend_url
            .or_else(|| env::var(ENV_BACKEND_URL).ok().filter(|s| !s.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        let data_dir = data_dir
            .or_else(|| env::var_os(ENV_DATA_DIR).map(PathBuf::from))
            .unwrap_or_else(default_data_dir);
        Self {
            backend_url,
            data_dir,
            ..Self::default()
        }
    }

    /// Defaults rooted at `dir`, for tests and throwaway sessions.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            data_dir: dir.to_path_buf(),
            ..Self::default()
        }
    }

    /// Path of the geometry file.
    pub fn window_state_path(&self) -> PathBuf {
        self.data_dir.join(WINDOW_STATE_FILE)
    }

    /// Path of the key/value file.
    pub fn local_state_path(&self) -> PathBuf {
        self.data_dir.join(LOCAL_STATE_FILE)
    }

    /// Request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Main surface poll interval.
    pub fn main_poll(&self) -> Duration {
        Duration::from_millis(self.main_poll_ms)
    }

    /// Overlay poll interval.
    pub fn overlay_poll(&self) -> Duration {
        Duration::from_millis(self.overlay_poll_ms)
    }

    /// Toggle cooldown.
    pub fn toggle_cooldown(&self) -> Duration {
        Duration::from_millis(self.toggle_cooldown_ms)
    }

    /// Inline selector blur timeout.
    pub fn selector_blur(&self) -> Duration {
        Duration::from_millis(self.selector_blur_ms)
    }

    /// Transient toast lifetime.
    pub fn toast_ttl(&self) -> Duration {
        Duration::from_millis(self.toast_ttl_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_overrides_win() {
        let cfg = CoordConfig::resolve(
            Some("http://10.0.0.2:9000/api".into()),
            Some(PathBuf::from("/tmp/kf")),
        );
        assert_eq!(cfg.backend_url, "http://10.0.0.2:9000/api");
        assert_eq!(cfg.window_state_path(), PathBuf::from("/tmp/kf/window-state.json"));
        assert_eq!(cfg.local_state_path(), PathBuf::from("/tmp/kf/local-state.json"));
        assert_eq!(cfg.readiness.attempts, 30);
        assert_eq!(cfg.overlay_poll(), Duration::from_millis(500));
    }

    #[test]
    fn partial_config_file_keeps_defaults() {
        let cfg: CoordConfig =
            serde_json::from_str(r#"{"backend_url":"http://x/api","toast_ttl_ms":1000}"#)
                .expect("config");
        assert_eq!(cfg.toast_ttl(), Duration::from_secs(1));
        assert_eq!(cfg.main_poll(), Duration::from_secs(2));
        assert_eq!(cfg.selector_blur(), Duration::from_millis(150));
    }
}
