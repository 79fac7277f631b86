// Push handler registry
//
// Each registered handler owns a bounded queue and a worker task. The read
// loop only ever pushes into queues, so a slow or panicking handler delays
// nobody but itself. A full queue sheds its oldest snapshot: the newest one
// is always delivered.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use futures_util::FutureExt as _;
use futures_util::future::BoxFuture;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, trace, warn};

use crate::model::PanelStatus;

/// Notifications queued per handler. Past this the oldest are discarded.
pub const HANDLER_QUEUE_CAPACITY: usize = 64;

/// Receives panel snapshots pushed by the service.
///
/// Implemented for any `Fn(Arc<PanelStatus>) -> impl Future<Output = ()>`,
/// so async closures can be registered directly.
pub trait PushHandler: Send + Sync + 'static {
    fn handle(&self, status: Arc<PanelStatus>) -> BoxFuture<'static, ()>;
}

impl<F, Fut> PushHandler for F
where
    F: Fn(Arc<PanelStatus>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn handle(&self, status: Arc<PanelStatus>) -> BoxFuture<'static, ()> {
        Box::pin(self(status))
    }
}

/// Identifies one registration, for [`PushListener::unregister_handler`](super::PushListener::unregister_handler).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

struct Slot {
    id: HandlerId,
    tx: broadcast::Sender<Arc<PanelStatus>>,
}

#[derive(Default)]
pub(crate) struct Registry {
    panels: DashMap<String, Vec<Slot>>,
    next_id: AtomicU64,
}

impl Registry {
    /// Add a handler for `panel_id` and start its worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn register(&self, panel_id: String, handler: Arc<dyn PushHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = broadcast::channel(HANDLER_QUEUE_CAPACITY);
        tokio::spawn(run_worker(id, handler, rx));

        debug!(panel_id = %panel_id, handler = %id, "push handler registered");
        self.panels.entry(panel_id).or_default().push(Slot { id, tx });
        id
    }

    /// Remove every handler of `panel_id`. Returns how many were removed.
    pub(crate) fn unregister_panel(&self, panel_id: &str) -> usize {
        self.panels
            .remove(panel_id)
            .map_or(0, |(_, slots)| slots.len())
    }

    pub(crate) fn unregister(&self, id: HandlerId) -> bool {
        let mut removed = false;
        self.panels.retain(|_, slots| {
            let before = slots.len();
            slots.retain(|slot| slot.id != id);
            removed |= slots.len() != before;
            !slots.is_empty()
        });
        removed
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    pub(crate) fn clear(&self) {
        self.panels.clear();
    }

    /// Queue `status` for every handler of its panel. Returns the number of
    /// handlers it was queued for.
    pub(crate) fn dispatch(&self, status: &Arc<PanelStatus>) -> usize {
        let Some(slots) = self.panels.get(&status.panel_id) else {
            trace!(panel_id = %status.panel_id, "no handler for panel");
            return 0;
        };

        let mut queued = 0;
        for slot in slots.iter() {
            match slot.tx.send(Arc::clone(status)) {
                Ok(_) => queued += 1,
                Err(_) => debug!(handler = %slot.id, "push handler worker has stopped"),
            }
        }
        queued
    }
}

async fn run_worker(
    id: HandlerId,
    handler: Arc<dyn PushHandler>,
    mut rx: broadcast::Receiver<Arc<PanelStatus>>,
) {
    loop {
        let status = match rx.recv().await {
            Ok(status) => status,
            Err(RecvError::Lagged(skipped)) => {
                warn!(
                    handler = %id,
                    skipped,
                    "push handler is falling behind, oldest notifications dropped"
                );
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let outcome = AssertUnwindSafe(async { handler.handle(status).await })
            .catch_unwind()
            .await;
        if outcome.is_err() {
            warn!(handler = %id, "push handler panicked");
        }
    }
    trace!(handler = %id, "push handler worker exiting");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::sync::mpsc::UnboundedSender;

    fn status(panel_id: &str) -> Arc<PanelStatus> {
        Arc::new(PanelStatus {
            panel_id: panel_id.to_owned(),
            ..PanelStatus::default()
        })
    }

    fn forwarder(tx: UnboundedSender<String>) -> Arc<dyn PushHandler> {
        Arc::new(move |s: Arc<PanelStatus>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(s.panel_id.clone());
            }
        })
    }

    async fn explode(_status: Arc<PanelStatus>) {
        panic!("handler bug");
    }

    #[tokio::test]
    async fn dispatch_routes_by_panel() {
        let registry = Registry::default();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry.register("A".into(), forwarder(tx_a));
        registry.register("B".into(), forwarder(tx_b));

        assert_eq!(registry.dispatch(&status("A")), 1);
        assert_eq!(registry.dispatch(&status("C")), 0);

        assert_eq!(rx_a.recv().await.unwrap(), "A");
        assert!(
            tokio::time::timeout(Duration::from_millis(50), rx_b.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn panicking_handler_keeps_working_and_spares_others() {
        let registry = Registry::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("A".into(), Arc::new(explode));
        registry.register("A".into(), forwarder(tx));

        assert_eq!(registry.dispatch(&status("A")), 2);
        assert_eq!(registry.dispatch(&status("A")), 2);
        assert_eq!(rx.recv().await.unwrap(), "A");
        assert_eq!(rx.recv().await.unwrap(), "A");
    }

    #[tokio::test]
    async fn unregister_by_id_and_by_panel() {
        let registry = Registry::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let first = registry.register("A".into(), forwarder(tx.clone()));
        registry.register("A".into(), forwarder(tx.clone()));
        registry.register("B".into(), forwarder(tx));

        assert!(registry.unregister(first));
        assert!(!registry.unregister(first));
        assert_eq!(registry.unregister_panel("A"), 1);
        assert_eq!(registry.unregister_panel("A"), 0);
        assert!(!registry.is_empty());
        assert_eq!(registry.unregister_panel("B"), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn slow_handler_always_gets_the_newest_snapshot() {
        let registry = Registry::default();
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let waiting = Arc::clone(&gate);
        registry.register(
            "A".into(),
            Arc::new(move |s: Arc<PanelStatus>| {
                let gate = Arc::clone(&waiting);
                let tx = tx.clone();
                async move {
                    let _permit = gate.acquire().await;
                    let _ = tx.send(s.release.clone().unwrap_or_default());
                }
            }),
        );

        for n in 0..100 {
            let snapshot = Arc::new(PanelStatus {
                panel_id: "A".into(),
                release: Some(n.to_string()),
                ..PanelStatus::default()
            });
            assert_eq!(registry.dispatch(&snapshot), 1);
        }
        gate.add_permits(1_000);

        let mut handled = Vec::new();
        while handled.last().map(String::as_str) != Some("99") {
            let release = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            handled.push(release);
        }

        assert!(handled.len() <= HANDLER_QUEUE_CAPACITY + 1);
        let order: Vec<u32> = handled.iter().map(|r| r.parse().unwrap()).collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]), "out of order: {order:?}");
    }
}
