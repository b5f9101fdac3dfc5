use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::assignment::{Assignment, ClaimOutcome};
use crate::models::order::{Actor, Order, OrderStatus, TimelineEntry};
use crate::notify::{DispatchEvent, Notifier};
use crate::observability::metrics::Metrics;
use crate::store::Store;

#[derive(Debug, Clone)]
pub enum AssignOutcome {
    Assigned(Box<Order>),
    AlreadyAssigned,
    OrderNotAssignable(OrderStatus),
    AgentUnavailable,
}

impl AssignOutcome {
    fn label(&self) -> &'static str {
        match self {
            AssignOutcome::Assigned(_) => "assigned",
            AssignOutcome::AlreadyAssigned => "already_assigned",
            AssignOutcome::OrderNotAssignable(_) => "not_assignable",
            AssignOutcome::AgentUnavailable => "agent_unavailable",
        }
    }

    /// Maps losing outcomes onto the caller-facing error taxonomy.
    pub fn into_result(self, order_id: Uuid) -> Result<Order, AppError> {
        match self {
            AssignOutcome::Assigned(order) => Ok(*order),
            AssignOutcome::AlreadyAssigned => Err(AppError::AlreadyAssigned { order_id }),
            AssignOutcome::OrderNotAssignable(status) => {
                Err(AppError::OrderNotAssignable { order_id, status })
            }
            AssignOutcome::AgentUnavailable => Err(AppError::Conflict(
                "agent is not available for dispatch".to_string(),
            )),
        }
    }
}

/// Owns the only write of `delivery_person_id`. The whole decision is
/// delegated to one conditional store write, so any number of callers on
/// any number of processes can race here and at most one wins.
#[derive(Clone)]
pub struct AssignmentGuard {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    metrics: Metrics,
}

impl AssignmentGuard {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, metrics: Metrics) -> Self {
        Self {
            store,
            notifier,
            metrics,
        }
    }

    pub async fn try_assign(
        &self,
        order_id: Uuid,
        agent_id: Uuid,
        distance_km: Option<f64>,
    ) -> Result<AssignOutcome, AppError> {
        let entry = TimelineEntry {
            status: OrderStatus::Assigned,
            timestamp: Utc::now(),
            note: Some("accepted by delivery agent".to_string()),
            actor: Some(Actor::Agent(agent_id)),
        };

        let outcome = match self.store.claim_order(order_id, agent_id, entry).await? {
            ClaimOutcome::Claimed { order, agent: _ } => {
                self.on_claimed(&order, agent_id, distance_km).await;
                AssignOutcome::Assigned(order)
            }
            ClaimOutcome::AlreadyAssigned { holder } => {
                debug!(order_id = %order_id, agent_id = %agent_id, holder = %holder, "lost assignment race");
                AssignOutcome::AlreadyAssigned
            }
            ClaimOutcome::OrderNotAssignable { status } => {
                debug!(order_id = %order_id, status = %status, "order left assignable window");
                AssignOutcome::OrderNotAssignable(status)
            }
            ClaimOutcome::AgentUnavailable => {
                debug!(order_id = %order_id, agent_id = %agent_id, "agent no longer eligible");
                AssignOutcome::AgentUnavailable
            }
        };

        self.metrics
            .assignments_total
            .with_label_values(&[outcome.label()])
            .inc();

        Ok(outcome)
    }

    /// Runs after the binding is stored. The history record is best effort;
    /// a failure here must not turn a won claim into an error.
    async fn on_claimed(&self, order: &Order, agent_id: Uuid, distance_km: Option<f64>) {
        let assigned_at = order.updated_at;
        if let Err(err) = self
            .store
            .record_assignment(Assignment {
                id: Uuid::new_v4(),
                order_id: order.id,
                agent_id,
                distance_km,
                assigned_at,
            })
            .await
        {
            error!(
                order_id = %order.id,
                agent_id = %agent_id,
                error = %err,
                "failed to record assignment history"
            );
        }

        self.metrics
            .status_transitions_total
            .with_label_values(&[OrderStatus::Assigned.as_str()])
            .inc();

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            agent_id = %agent_id,
            distance_km = ?distance_km,
            "order assigned"
        );

        self.notifier.notify(DispatchEvent::StatusChanged {
            order_id: order.id,
            order_number: order.order_number.clone(),
            from: OrderStatus::Ready,
            to: OrderStatus::Assigned,
            actor: Some(Actor::Agent(agent_id)),
            at: assigned_at,
        });
        self.notifier.notify(DispatchEvent::AgentAssigned {
            order_id: order.id,
            agent_id,
            distance_km,
            at: assigned_at,
        });
    }
}
