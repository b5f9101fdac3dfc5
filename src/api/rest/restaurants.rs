use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::put;
use axum::Json;
use axum::Router;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::agent::GeoPoint;
use crate::models::restaurant::RestaurantProfile;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/restaurants/:id", put(upsert_restaurant))
}

#[derive(Deserialize)]
pub struct UpsertRestaurantRequest {
    pub name: String,
    pub location: GeoPoint,
    pub preparation_time_minutes: u32,
    pub commission_rate: Decimal,
    #[serde(default = "default_accepting")]
    pub accepting_orders: bool,
}

fn default_accepting() -> bool {
    true
}

/// Sync endpoint for restaurant management pushing the fields the
/// dispatch core reads.
async fn upsert_restaurant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpsertRestaurantRequest>,
) -> Result<Json<RestaurantProfile>, AppError> {
    if !payload.location.is_valid() {
        return Err(AppError::BadRequest("coordinates are out of range".to_string()));
    }
    if payload.commission_rate < Decimal::ZERO || payload.commission_rate > Decimal::ONE {
        return Err(AppError::BadRequest(
            "commission_rate must be between 0 and 1".to_string(),
        ));
    }

    let profile = RestaurantProfile {
        id,
        name: payload.name,
        location: payload.location,
        preparation_time_minutes: payload.preparation_time_minutes,
        commission_rate: payload.commission_rate,
        accepting_orders: payload.accepting_orders,
    };
    state.restaurants.upsert(profile.clone());
    Ok(Json(profile))
}
