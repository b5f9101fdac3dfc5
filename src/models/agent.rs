use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::earnings::Earnings;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Bicycle,
    Motorcycle,
    Car,
    OnFoot,
}

/// Last position reported by the agent's own heartbeat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AgentLocation {
    pub point: GeoPoint,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAgent {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub vehicle: VehicleType,
    pub rating: f64,
    pub is_online: bool,
    pub is_available: bool,
    pub verification_status: VerificationStatus,
    pub current_location: Option<AgentLocation>,
    pub current_order: Option<Uuid>,
    pub delivery_history: Vec<Uuid>,
    pub total_deliveries: u64,
    pub earnings: Earnings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryAgent {
    pub fn register(name: String, phone: String, vehicle: VehicleType, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            phone,
            vehicle,
            rating: 5.0,
            is_online: false,
            is_available: true,
            verification_status: VerificationStatus::Pending,
            current_location: None,
            current_order: None,
            delivery_history: Vec::new(),
            total_deliveries: 0,
            earnings: Earnings::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The eligibility predicate shared with every collaborator that asks
    /// "can this agent be offered an order". Location freshness is checked
    /// separately by the geo index.
    pub fn is_dispatch_eligible(&self) -> bool {
        self.is_online
            && self.is_available
            && self.current_order.is_none()
            && self.verification_status == VerificationStatus::Verified
    }

    pub fn location_is_fresh(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        match &self.current_location {
            Some(location) => now - location.last_updated <= max_age,
            None => false,
        }
    }

    pub(crate) fn bind_order(&mut self, order_id: Uuid, now: DateTime<Utc>) {
        self.current_order = Some(order_id);
        self.is_available = false;
        self.updated_at = now;
    }

    pub(crate) fn release_order(&mut self, completed: bool, now: DateTime<Utc>) {
        if completed {
            if let Some(order_id) = self.current_order {
                self.delivery_history.push(order_id);
                self.total_deliveries = self.total_deliveries.saturating_add(1);
            }
        }
        self.current_order = None;
        self.is_available = true;
        self.updated_at = now;
    }
}
