use std::sync::Arc;

use kenflow_protocol::Theme;
use tracing::info;

use crate::{Result, bus::Bus, store::LocalStore};

/// Local store key of the active theme.
pub const THEME_KEY: &str = "theme";

/// Active theme, shared by every surface through the local store.
#[derive(Debug, Clone)]
pub struct ThemeStore {
    /// Backing key/value store.
    store: Arc<LocalStore>,
}

impl ThemeStore {
    /// Theme persistence over `store`.
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Active theme; unknown or missing names mean the default.
    pub fn get(&self) -> Theme {
        self.store
            .get::<String>(THEME_KEY)
            .and_then(|s| Theme::from_name(&s))
            .unwrap_or_default()
    }

    /// Persist `theme` and ask every surface to re-read it.
    pub fn set(&self, theme: Theme, bus: &Bus) -> Result<()> {
        self.store.set(THEME_KEY, theme.as_str())?;
        info!(theme = %theme, "theme changed");
        bus.refresh();
        Ok(())
    }

    /// Switch to the other theme and return it.
    pub fn toggle(&self, bus: &Bus) -> Result<Theme> {
        let next = self.get().toggled();
        self.set(next, bus)?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use kenflow_protocol::{Signal, WindowKind};

    use super::*;

    #[test]
    fn toggle_persists_and_broadcasts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(LocalStore::new(dir.path().join("local-state.json")));
        let themes = ThemeStore::new(store.clone());
        let bus = Bus::new();
        let mut overlay = bus.subscribe(WindowKind::Overlay);

        assert_eq!(themes.get(), Theme::Dark);
        assert_eq!(themes.toggle(&bus).expect("toggle"), Theme::Light);
        assert_eq!(overlay.try_recv(), Some(Signal::Refresh));
        assert_eq!(ThemeStore::new(store).get(), Theme::Light);
    }
}
