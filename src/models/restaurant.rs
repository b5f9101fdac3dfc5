use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::agent::GeoPoint;

/// The slice of restaurant data the dispatch core reads. Owned by
/// restaurant management and never written here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestaurantProfile {
    pub id: Uuid,
    pub name: String,
    pub location: GeoPoint,
    pub preparation_time_minutes: u32,
    pub commission_rate: Decimal,
    pub accepting_orders: bool,
}
