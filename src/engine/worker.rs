use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::dispatch::DispatchOutcome;
use crate::error::AppError;
use crate::state::AppState;

/// Drains the dispatch queue, running one dispatch pass per order id.
/// Orders that find no agent are left `ready`; re-offering them is the job
/// of whoever schedules redispatch, not this loop.
pub async fn run_dispatch_worker(state: Arc<AppState>, mut order_rx: mpsc::Receiver<Uuid>) {
    info!("dispatch worker started");

    while let Some(order_id) = order_rx.recv().await {
        state.metrics.dispatch_queue_depth.dec();

        let start = Instant::now();
        let outcome = match state.dispatcher.dispatch(order_id).await {
            Ok(DispatchOutcome::Assigned { agent_id, .. }) => {
                info!(order_id = %order_id, agent_id = %agent_id, "dispatch succeeded");
                "assigned"
            }
            Ok(DispatchOutcome::NoAgentAvailable) => "no_agent",
            Err(
                err @ (AppError::AlreadyAssigned { .. } | AppError::OrderNotAssignable { .. }),
            ) => {
                info!(order_id = %order_id, reason = %err, "dispatch skipped");
                "skipped"
            }
            Err(err) => {
                error!(order_id = %order_id, error = %err, "dispatch failed");
                "error"
            }
        };

        state
            .metrics
            .dispatch_latency_seconds
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());
    }

    warn!("dispatch worker stopped: queue channel closed");
}
