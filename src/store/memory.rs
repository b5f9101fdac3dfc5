use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::agent::{AgentLocation, DeliveryAgent, GeoPoint, VerificationStatus};
use crate::models::assignment::{Assignment, ClaimOutcome};
use crate::models::earnings::EarningsCalendar;
use crate::models::order::{Order, OrderStatus, TimelineEntry};
use crate::store::Store;

/// DashMap-backed store. An entry guard is the unit of atomicity; when a
/// write spans both maps the agent entry is always locked before the order
/// entry, and no method ever holds two entries of the same map.
#[derive(Default)]
pub struct InMemoryStore {
    orders: DashMap<Uuid, Order>,
    agents: DashMap<Uuid, DeliveryAgent>,
    assignments: DashMap<Uuid, Assignment>,
    credited_orders: DashMap<Uuid, Uuid>,
    order_sequence: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }
}

fn agent_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("agent {id} not found"))
}

fn order_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("order {id} not found"))
}

#[async_trait]
impl Store for InMemoryStore {
    async fn next_order_sequence(&self) -> Result<u64, AppError> {
        Ok(self.order_sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn insert_order(&self, order: Order) -> Result<(), AppError> {
        match self.orders.entry(order.id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "order {} already exists",
                order.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(order);
                Ok(())
            }
        }
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, AppError> {
        Ok(self.orders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<Order>, AppError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| status.is_none_or(|wanted| entry.status == wanted))
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by_key(|order| order.created_at);
        Ok(orders)
    }

    async fn compare_and_swap_order(
        &self,
        mut order: Order,
        expected_version: u64,
    ) -> Result<bool, AppError> {
        let mut stored = self
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| order_not_found(order.id))?;

        if stored.version != expected_version {
            return Ok(false);
        }

        order.version = expected_version + 1;
        *stored = order;
        Ok(true)
    }

    async fn delivered_orders_for_agent(&self, agent_id: Uuid) -> Result<Vec<Order>, AppError> {
        Ok(self
            .orders
            .iter()
            .filter(|entry| {
                entry.status == OrderStatus::Delivered
                    && entry.delivery_person_id == Some(agent_id)
            })
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn insert_agent(&self, agent: DeliveryAgent) -> Result<(), AppError> {
        match self.agents.entry(agent.id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "agent {} already exists",
                agent.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(agent);
                Ok(())
            }
        }
    }

    async fn get_agent(&self, id: Uuid) -> Result<Option<DeliveryAgent>, AppError> {
        Ok(self.agents.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_agents(&self) -> Result<Vec<DeliveryAgent>, AppError> {
        Ok(self
            .agents
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn update_agent_location(
        &self,
        id: Uuid,
        point: GeoPoint,
        at: DateTime<Utc>,
    ) -> Result<DeliveryAgent, AppError> {
        let mut agent = self.agents.get_mut(&id).ok_or_else(|| agent_not_found(id))?;

        // Heartbeats can arrive out of order; keep the newest fix.
        let is_newer = agent
            .current_location
            .is_none_or(|current| current.last_updated <= at);
        if is_newer {
            agent.current_location = Some(AgentLocation {
                point,
                last_updated: at,
            });
            agent.updated_at = at;
        }

        Ok(agent.clone())
    }

    async fn set_agent_verification(
        &self,
        id: Uuid,
        status: VerificationStatus,
        at: DateTime<Utc>,
    ) -> Result<DeliveryAgent, AppError> {
        let mut agent = self.agents.get_mut(&id).ok_or_else(|| agent_not_found(id))?;

        agent.verification_status = status;
        if status != VerificationStatus::Verified {
            agent.is_online = false;
        }
        agent.updated_at = at;

        Ok(agent.clone())
    }

    async fn set_agent_online(
        &self,
        id: Uuid,
        online: bool,
        at: DateTime<Utc>,
    ) -> Result<DeliveryAgent, AppError> {
        let mut agent = self.agents.get_mut(&id).ok_or_else(|| agent_not_found(id))?;

        if online && agent.verification_status != VerificationStatus::Verified {
            return Err(AppError::BadRequest(format!(
                "agent {id} must be verified before going online"
            )));
        }
        if !online {
            if let Some(order_id) = agent.current_order {
                return Err(AppError::Conflict(format!(
                    "agent {id} cannot go offline while delivering order {order_id}"
                )));
            }
        }

        agent.is_online = online;
        agent.updated_at = at;
        Ok(agent.clone())
    }

    async fn claim_order(
        &self,
        order_id: Uuid,
        agent_id: Uuid,
        entry: TimelineEntry,
    ) -> Result<ClaimOutcome, AppError> {
        let mut agent = self
            .agents
            .get_mut(&agent_id)
            .ok_or_else(|| agent_not_found(agent_id))?;
        let mut order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| order_not_found(order_id))?;

        if let Some(holder) = order.delivery_person_id {
            return Ok(ClaimOutcome::AlreadyAssigned { holder });
        }
        if !order.status.is_assignable() {
            return Ok(ClaimOutcome::OrderNotAssignable {
                status: order.status,
            });
        }
        if !agent.is_dispatch_eligible() {
            return Ok(ClaimOutcome::AgentUnavailable);
        }

        order.delivery_person_id = Some(agent_id);
        order.push_status(OrderStatus::Assigned, entry.actor, entry.note, entry.timestamp);
        order.version += 1;
        agent.bind_order(order_id, entry.timestamp);

        Ok(ClaimOutcome::Claimed {
            order: Box::new(order.clone()),
            agent: Box::new(agent.clone()),
        })
    }

    async fn release_agent(
        &self,
        agent_id: Uuid,
        order_id: Uuid,
        completed: bool,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut agent = self
            .agents
            .get_mut(&agent_id)
            .ok_or_else(|| agent_not_found(agent_id))?;

        if agent.current_order != Some(order_id) {
            return Ok(false);
        }

        agent.release_order(completed, at);
        Ok(true)
    }

    async fn credit_earnings(
        &self,
        agent_id: Uuid,
        order_id: Uuid,
        amount: Decimal,
        at: DateTime<Utc>,
        calendar: &EarningsCalendar,
    ) -> Result<bool, AppError> {
        let mut agent = self
            .agents
            .get_mut(&agent_id)
            .ok_or_else(|| agent_not_found(agent_id))?;

        match self.credited_orders.entry(order_id) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(agent_id);
                calendar.credit(&mut agent.earnings, amount, at);
                agent.updated_at = at;
                Ok(true)
            }
        }
    }

    async fn record_assignment(&self, assignment: Assignment) -> Result<(), AppError> {
        self.assignments.insert(assignment.id, assignment);
        Ok(())
    }

    async fn list_assignments(&self) -> Result<Vec<Assignment>, AppError> {
        let mut assignments: Vec<Assignment> = self
            .assignments
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        assignments.sort_by_key(|assignment| assignment.assigned_at);
        Ok(assignments)
    }
}
