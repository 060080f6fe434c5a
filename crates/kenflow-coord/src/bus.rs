//! One-to-many signal fan-out between surfaces.

use std::{
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use kenflow_protocol::{Signal, WindowKind};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tracing::trace;

/// One live subscriber.
struct Subscriber {
    /// Subscription id, used for removal.
    id: u64,
    /// Surface the subscriber belongs to.
    kind: WindowKind,
    /// Delivery channel.
    tx: UnboundedSender<Signal>,
}

/// Shared state of a [`Bus`].
#[derive(Default)]
struct BusInner {
    /// Next subscription id.
    next_id: AtomicU64,
    /// Live subscribers.
    subscribers: Mutex<Vec<Subscriber>>,
}

impl BusInner {
    /// Remove subscription `id`.
    fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().retain(|s| s.id != id);
    }
}

/// Broadcast bus. Cloning yields another handle to the same bus.
///
/// Publishing never fails: subscribers whose receiving end is gone are pruned.
#[derive(Clone, Default)]
pub struct Bus {
    /// Shared state.
    inner: Arc<BusInner>,
}

impl Bus {
    /// New bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a surface of `kind`. Dropping the subscription unsubscribes.
    pub fn subscribe(&self, kind: WindowKind) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .subscribers
            .lock()
            .push(Subscriber { id, kind, tx });
        Subscription {
            id,
            kind,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `signal` to every live subscriber it is meant for. Returns the
    /// number of subscribers reached.
    pub fn publish(&self, signal: Signal) -> usize {
        let mut subs = self.inner.subscribers.lock();
        subs.retain(|s| !s.tx.is_closed());
        let mut delivered = 0;
        for s in subs.iter().filter(|s| signal.is_for(s.kind)) {
            if s.tx.send(signal).is_ok() {
                delivered += 1;
            }
        }
        trace!(?signal, delivered, "bus publish");
        delivered
    }

    /// Shorthand for `publish(Signal::Refresh)`.
    pub fn refresh(&self) -> usize {
        self.publish(Signal::Refresh)
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut subs = self.inner.subscribers.lock();
        subs.retain(|s| !s.tx.is_closed());
        subs.len()
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("subscribers", &self.inner.subscribers.lock().len())
            .finish_non_exhaustive()
    }
}

/// Receiving end of a bus subscription.
pub struct Subscription {
    /// Subscription id.
    id: u64,
    /// Surface kind this subscription was registered for.
    kind: WindowKind,
    /// Delivery channel.
    rx: UnboundedReceiver<Signal>,
    /// Owning bus, for removal on drop.
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Surface kind of this subscription.
    pub fn kind(&self) -> WindowKind {
        self.kind
    }

    /// Wait for the next signal. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Signal> {
        self.rx.recv().await
    }

    /// Next pending signal without waiting.
    pub fn try_recv(&mut self) -> Option<Signal> {
        match self.rx.try_recv() {
            Ok(s) => Some(s),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Discard queued signals equal to `signal`; handlers re-read state anyway.
    pub fn coalesce(&mut self, signal: Signal) -> Vec<Signal> {
        let mut others = Vec::new();
        while let Some(s) = self.try_recv() {
            if s != signal {
                others.push(s);
            }
        }
        others
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fan_out_reaches_every_window() {
        let bus = Bus::new();
        let mut main = bus.subscribe(WindowKind::Main);
        let mut overlay = bus.subscribe(WindowKind::Overlay);
        assert_eq!(bus.refresh(), 2);
        assert_eq!(main.recv().await, Some(Signal::Refresh));
        assert_eq!(overlay.recv().await, Some(Signal::Refresh));
    }

    #[tokio::test]
    async fn overlay_closed_is_main_only() {
        let bus = Bus::new();
        let mut main = bus.subscribe(WindowKind::Main);
        let mut overlay = bus.subscribe(WindowKind::Overlay);
        assert_eq!(bus.publish(Signal::OverlayClosed), 1);
        assert_eq!(main.try_recv(), Some(Signal::OverlayClosed));
        assert_eq!(overlay.try_recv(), None);
    }

    #[test]
    fn dropped_subscriber_is_removed() {
        let bus = Bus::new();
        let sub = bus.subscribe(WindowKind::ItemPicker);
        let _keep = bus.subscribe(WindowKind::Main);
        assert_eq!(bus.subscriber_count(), 2);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.refresh(), 1);
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = Bus::new();
        assert_eq!(bus.refresh(), 0);
        assert_eq!(bus.publish(Signal::OverlayClosed), 0);
    }

    #[test]
    fn coalesce_keeps_distinct_signals() {
        let bus = Bus::new();
        let mut main = bus.subscribe(WindowKind::Main);
        bus.refresh();
        bus.publish(Signal::OverlayClosed);
        bus.refresh();
        assert_eq!(main.coalesce(Signal::Refresh), vec![Signal::OverlayClosed]);
        assert_eq!(main.try_recv(), None);
    }
}
