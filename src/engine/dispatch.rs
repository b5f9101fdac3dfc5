use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{DispatchCenter, DispatchSettings};
use crate::engine::guard::{AssignOutcome, AssignmentGuard};
use crate::error::AppError;
use crate::geo::index::GeoAvailabilityIndex;
use crate::models::agent::GeoPoint;
use crate::models::order::Order;
use crate::notify::{DispatchEvent, Notifier};
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Assigned {
        order: Box<Order>,
        agent_id: Uuid,
        distance_km: f64,
    },
    NoAgentAvailable,
}

/// One dispatch pass: rank candidates, try them in order, stop at the
/// first successful claim. Never retries; an unassigned order stays `ready`.
#[derive(Clone)]
pub struct DispatchMatcher {
    store: Arc<dyn Store>,
    index: GeoAvailabilityIndex,
    guard: AssignmentGuard,
    notifier: Arc<dyn Notifier>,
    settings: DispatchSettings,
}

impl DispatchMatcher {
    pub fn new(
        store: Arc<dyn Store>,
        index: GeoAvailabilityIndex,
        guard: AssignmentGuard,
        notifier: Arc<dyn Notifier>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            index,
            guard,
            notifier,
            settings,
        }
    }

    pub fn center_for(&self, order: &Order) -> GeoPoint {
        match self.settings.center {
            DispatchCenter::Restaurant => order.restaurant_location,
            DispatchCenter::DeliveryAddress => order.delivery_address.location,
        }
    }

    pub async fn dispatch(&self, order_id: Uuid) -> Result<DispatchOutcome, AppError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        if order.delivery_person_id.is_some() {
            return Err(AppError::AlreadyAssigned { order_id });
        }
        if !order.status.is_assignable() {
            return Err(AppError::OrderNotAssignable {
                order_id,
                status: order.status,
            });
        }

        let center = self.center_for(&order);
        let candidates = self
            .index
            .find_candidates(&center, self.settings.radius_km, self.settings.candidate_limit)
            .await?;

        for candidate in candidates {
            debug!(
                order_id = %order_id,
                agent_id = %candidate.agent_id,
                distance_km = candidate.distance_km,
                "trying candidate"
            );

            match self
                .guard
                .try_assign(order_id, candidate.agent_id, Some(candidate.distance_km))
                .await?
            {
                AssignOutcome::Assigned(order) => {
                    return Ok(DispatchOutcome::Assigned {
                        order,
                        agent_id: candidate.agent_id,
                        distance_km: candidate.distance_km,
                    });
                }
                AssignOutcome::AgentUnavailable => continue,
                AssignOutcome::AlreadyAssigned => {
                    info!(order_id = %order_id, "order claimed elsewhere during dispatch");
                    return Err(AppError::AlreadyAssigned { order_id });
                }
                AssignOutcome::OrderNotAssignable(status) => {
                    info!(order_id = %order_id, status = %status, "order left ready during dispatch");
                    return Err(AppError::OrderNotAssignable { order_id, status });
                }
            }
        }

        warn!(
            order_id = %order_id,
            radius_km = self.settings.radius_km,
            "no delivery agent available"
        );
        self.notifier.notify(DispatchEvent::NoAgentAvailable {
            order_id,
            at: Utc::now(),
        });

        Ok(DispatchOutcome::NoAgentAvailable)
    }
}
