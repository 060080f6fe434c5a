//! The set of OS windows message delivery is restricted to.

use std::sync::Arc;

use kenflow_backend::{Backend, Error as BackendError, api::Settings};
use tracing::{debug, info};

use crate::{Error, Result};

/// Reads and writes the target set through the backend settings.
#[derive(Clone)]
pub struct TargetSelector {
    /// Backend owning the `target_windows` setting.
    backend: Arc<dyn Backend>,
}

impl TargetSelector {
    /// Selector over `backend`.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Committed target titles; empty means every window.
    pub async fn get_targets(&self) -> Result<Vec<String>> {
        Ok(self.backend.settings().await?.target_windows())
    }

    /// Commit `targets`. Blank and repeated titles are dropped.
    pub async fn set_targets(&self, targets: &[String]) -> Result<()> {
        let cleaned = clean_titles(targets.iter().map(String::as_str));
        self.backend
            .update_settings(&Settings::targets_patch(&cleaned))
            .await?;
        info!(count = cleaned.len(), "target windows committed");
        Ok(())
    }

    /// Titles of the OS windows open right now, blank titles skipped.
    pub async fn list_available_windows(&self) -> Result<Vec<String>> {
        let list = self.backend.windows().await?;
        if let Some(err) = list.error
            && list.windows.is_empty()
        {
            return Err(Error::Backend(BackendError::Status {
                endpoint: "GET /windows".into(),
                status: 200,
                message: err,
            }));
        }
        let titles = clean_titles(list.windows.iter().map(String::as_str));
        debug!(count = titles.len(), "available windows");
        Ok(titles)
    }
}

/// Trimmed-empty titles removed, first occurrence of each title kept.
fn clean_titles<'a>(titles: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for t in titles {
        if t.trim().is_empty() || out.iter().any(|o| o == t) {
            continue;
        }
        out.push(t.to_string());
    }
    out
}

/// One row of the target picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRow {
    /// Window title.
    pub title: String,
    /// Checked in the working set.
    pub selected: bool,
    /// Present in the last window listing.
    pub open: bool,
}

/// Working copy of the target set while the picker is open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSet {
    /// Checked titles in selection order.
    selected: Vec<String>,
    /// Last successfully loaded window titles.
    available: Vec<String>,
}

impl TargetSet {
    /// Working copy starting from the committed `selected` titles.
    pub fn new(selected: &[String]) -> Self {
        Self {
            selected: clean_titles(selected.iter().map(String::as_str)),
            available: Vec::new(),
        }
    }

    /// Checked titles.
    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    /// Last good window listing.
    pub fn available(&self) -> &[String] {
        &self.available
    }

    /// Whether delivery is unrestricted.
    pub fn is_all(&self) -> bool {
        self.selected.is_empty()
    }

    /// Flip `title`; returns whether it is now checked.
    pub fn toggle(&mut self, title: &str) -> bool {
        if let Some(i) = self.selected.iter().position(|t| t == title) {
            self.selected.remove(i);
            false
        } else if title.trim().is_empty() {
            false
        } else {
            self.selected.push(title.to_string());
            true
        }
    }

    /// Check or uncheck `title`.
    pub fn check(&mut self, title: &str, on: bool) {
        if self.selected.iter().any(|t| t == title) != on {
            self.toggle(title);
        }
    }

    /// Back to "all windows".
    pub fn select_all(&mut self) {
        self.selected.clear();
    }

    /// Replace the listing after a successful refresh.
    pub fn set_available(&mut self, titles: Vec<String>) {
        self.available = titles;
    }

    /// Rows for display: open windows first, then checked titles that are not
    /// open at the moment.
    pub fn rows(&self) -> Vec<TargetRow> {
        let open = self.available.iter().map(|t| TargetRow {
            title: t.clone(),
            selected: self.selected.contains(t),
            open: true,
        });
        let missing = self
            .selected
            .iter()
            .filter(|t| !self.available.contains(t))
            .map(|t| TargetRow {
                title: t.clone(),
                selected: true,
                open: false,
            });
        open.chain(missing).collect()
    }
}

#[cfg(test)]
mod tests {
    use kenflow_backend::MockBackend;

    use super::*;

    #[tokio::test]
    async fn empty_set_means_all_windows() {
        let backend = Arc::new(MockBackend::new());
        backend.set_windows(["Notepad", "", "Chat", "Terminal"]);
        let selector = TargetSelector::new(backend.clone());

        assert!(selector.get_targets().await.expect("targets").is_empty());
        let windows = selector.list_available_windows().await.expect("windows");
        assert_eq!(windows, vec!["Notepad", "Chat", "Terminal"]);
        assert_eq!(backend.call_count("GET /windows"), 1);
    }

    #[tokio::test]
    async fn set_targets_round_trips_through_settings() {
        let backend = Arc::new(MockBackend::new());
        let selector = TargetSelector::new(backend.clone());
        selector
            .set_targets(&["Chat", " ", "Chat", "Mail"].map(String::from))
            .await
            .expect("set");
        assert_eq!(
            backend.stored_settings().get("target_windows"),
            Some(r#"["Chat","Mail"]"#)
        );
        assert_eq!(selector.get_targets().await.expect("get"), vec!["Chat", "Mail"]);
    }

    #[test]
    fn working_set_toggles() {
        let mut set = TargetSet::new(&["Chat".to_string()]);
        set.set_available(vec!["Notepad".into(), "Chat".into()]);
        assert!(!set.is_all());
        assert!(set.toggle("Notepad"));
        assert!(!set.toggle("Chat"));
        assert_eq!(set.selected(), &["Notepad".to_string()]);
        set.select_all();
        assert!(set.is_all());
        assert!(!set.toggle("  "));

        set.check("Chat", true);
        set.check("Chat", true);
        assert_eq!(set.selected(), &["Chat".to_string()]);
        set.check("Mail", false);
        set.check("Chat", false);
        assert!(set.is_all());
    }

    #[test]
    fn rows_keep_checked_but_closed_windows() {
        let mut set = TargetSet::new(&["Gone".to_string(), "Chat".to_string()]);
        set.set_available(vec!["Chat".into(), "Mail".into()]);
        let rows = set.rows();
        let summary: Vec<(&str, bool, bool)> = rows
            .iter()
            .map(|r| (r.title.as_str(), r.selected, r.open))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Chat", true, true),
                ("Mail", false, true),
                ("Gone", true, false)
            ]
        );
    }
}
