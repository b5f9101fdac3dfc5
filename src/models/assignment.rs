use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::agent::DeliveryAgent;
use crate::models::order::{Order, OrderStatus};

/// History record of a committed binding. The binding itself lives on
/// `Order::delivery_person_id` and `DeliveryAgent::current_order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub agent_id: Uuid,
    pub distance_km: Option<f64>,
    pub assigned_at: DateTime<Utc>,
}

/// Result of one atomic claim attempt against the store.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    Claimed {
        order: Box<Order>,
        agent: Box<DeliveryAgent>,
    },
    /// Another agent already holds the order.
    AlreadyAssigned { holder: Uuid },
    /// The order is outside the assignable window.
    OrderNotAssignable { status: OrderStatus },
    /// The agent went offline or picked up other work meanwhile.
    AgentUnavailable,
}
