use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::observability::metrics::Metrics;

/// Hand-off from the lifecycle to the dispatch worker. Carries order ids
/// only; the worker always re-reads the order before acting.
#[derive(Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<Uuid>,
    metrics: Metrics,
}

impl DispatchQueue {
    pub fn new(size: usize, metrics: Metrics) -> (Self, mpsc::Receiver<Uuid>) {
        let (tx, rx) = mpsc::channel(size.max(1));
        (Self { tx, metrics }, rx)
    }

    /// Never blocks the transition path. A full or closed queue is logged
    /// and the order stays `ready` for a later dispatch.
    pub fn offer(&self, order_id: Uuid) -> bool {
        // Counted before the send so the worker's decrement never runs first.
        self.metrics.dispatch_queue_depth.inc();
        match self.tx.try_send(order_id) {
            Ok(()) => true,
            Err(err) => {
                self.metrics.dispatch_queue_depth.dec();
                warn!(order_id = %order_id, error = %err, "order not queued for dispatch");
                false
            }
        }
    }
}
