//! Toast notifications shown by a surface.

use std::time::Duration;

use kenflow_protocol::{NotifyKind, Toast, WindowKind};
use tokio::{sync::mpsc::UnboundedSender, time::Instant};
use tracing::info;

use crate::Error;

/// A toast addressed to one surface, as forwarded to an external renderer.
pub type ToastEvent = (WindowKind, Toast);

/// Per-surface toast list.
///
/// Transient toasts expire after the configured lifetime; persistent ones stay
/// until dismissed. Every toast is logged and, when a sink is attached,
/// forwarded.
#[derive(Debug)]
pub struct Notifier {
    /// Owning surface.
    surface: WindowKind,
    /// Lifetime of transient toasts.
    ttl: Duration,
    /// Visible toasts with their expiry.
    active: Vec<(Toast, Option<Instant>)>,
    /// Optional forwarder.
    sink: Option<UnboundedSender<ToastEvent>>,
}

impl Notifier {
    /// Notifier for `surface`.
    pub fn new(
        surface: WindowKind,
        ttl: Duration,
        sink: Option<UnboundedSender<ToastEvent>>,
    ) -> Self {
        Self {
            surface,
            ttl,
            active: Vec::new(),
            sink,
        }
    }

    /// Show `toast`.
    pub fn push(&mut self, toast: Toast) {
        // Always log toasts at info level, including the full text.
        info!(
            surface = %self.surface,
            kind = ?toast.kind,
            text = %toast.text,
            persistent = toast.persistent,
            "notification_display"
        );
        let expiry = (!toast.persistent).then(|| Instant::now() + self.ttl);
        if let Some(tx) = &self.sink
            && tx.send((self.surface, toast.clone())).is_err()
        {
            self.sink = None;
        }
        self.active.push((toast, expiry));
    }

    /// Show a transient toast.
    pub fn notify(&mut self, kind: NotifyKind, text: impl Into<String>) {
        self.push(Toast::transient(kind, text));
    }

    /// Transient success toast.
    pub fn success(&mut self, text: impl Into<String>) {
        self.notify(NotifyKind::Success, text);
    }

    /// Transient warning toast.
    pub fn warn(&mut self, text: impl Into<String>) {
        self.notify(NotifyKind::Warn, text);
    }

    /// Transient toast describing `err`, prefixed by what was attempted.
    pub fn error(&mut self, action: &str, err: &Error) {
        let text = if err.is_unreachable() {
            format!("{action}: connection error")
        } else {
            format!("{action}: {err}")
        };
        self.notify(NotifyKind::Error, text);
    }

    /// Persistent toast.
    pub fn persistent(&mut self, kind: NotifyKind, text: impl Into<String>) {
        self.push(Toast::persistent(kind, text));
    }

    /// Toasts still visible now.
    pub fn visible(&self) -> Vec<Toast> {
        let now = Instant::now();
        self.active
            .iter()
            .filter(|(_, exp)| exp.is_none_or(|e| e > now))
            .map(|(t, _)| t.clone())
            .collect()
    }

    /// Drop expired toasts.
    pub fn prune(&mut self) {
        let now = Instant::now();
        self.active.retain(|(_, exp)| exp.is_none_or(|e| e > now));
    }

    /// Dismiss every persistent toast.
    pub fn dismiss_persistent(&mut self) {
        self.active.retain(|(t, _)| !t.persistent);
    }

    /// Dismiss everything.
    pub fn clear(&mut self) {
        self.active.clear();
    }

    /// Next instant at which a toast expires.
    pub fn next_expiry(&self) -> Option<Instant> {
        self.active.iter().filter_map(|(_, e)| *e).min()
    }
}

#[cfg(test)]
mod tests {
    use tokio::{sync::mpsc, time};

    use kenflow_backend::Error as BackendError;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn transient_toasts_expire_persistent_stay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut n = Notifier::new(WindowKind::Main, Duration::from_secs(3), Some(tx));
        n.success("saved");
        n.persistent(NotifyKind::Error, "backend unavailable");
        assert_eq!(n.visible().len(), 2);
        assert_eq!(
            rx.recv().await.map(|(k, t)| (k, t.text)),
            Some((WindowKind::Main, "saved".to_string()))
        );

        time::advance(Duration::from_millis(3_100)).await;
        n.prune();
        let left = n.visible();
        assert_eq!(left.len(), 1);
        assert!(left[0].persistent);
        n.dismiss_persistent();
        assert!(n.visible().is_empty());
    }

    #[test]
    fn unreachable_errors_read_as_connection_errors() {
        let mut n = Notifier::new(WindowKind::Overlay, Duration::from_secs(3), None);
        let err = Error::Backend(BackendError::Unreachable {
            endpoint: "GET /settings".into(),
            message: "refused".into(),
        });
        n.error("Listener", &err);
        assert_eq!(n.visible()[0].text, "Listener: connection error");
    }
}
