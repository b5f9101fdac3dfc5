use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use crate::models::order::{Actor, OrderStatus};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    StatusChanged {
        order_id: Uuid,
        order_number: String,
        from: OrderStatus,
        to: OrderStatus,
        actor: Option<Actor>,
        at: DateTime<Utc>,
    },
    AgentAssigned {
        order_id: Uuid,
        agent_id: Uuid,
        distance_km: Option<f64>,
        at: DateTime<Utc>,
    },
    NoAgentAvailable {
        order_id: Uuid,
        at: DateTime<Utc>,
    },
}

/// Fire-and-forget sink for lifecycle events. Implementations must not
/// block and must not fail the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: DispatchEvent);
}

/// Fans events out to every live subscriber (websocket clients, tests).
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<DispatchEvent>,
}

impl BroadcastNotifier {
    pub fn new(buffer: usize) -> Self {
        let (tx, _unused_rx) = broadcast::channel(buffer.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.tx.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, event: DispatchEvent) {
        // No subscribers is fine; the event is simply dropped.
        if self.tx.send(event).is_err() {
            trace!("dispatch event dropped: no subscribers");
        }
    }
}
