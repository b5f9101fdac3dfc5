use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::index::Candidate;
use crate::models::agent::{DeliveryAgent, GeoPoint, VehicleType, VerificationStatus};
use crate::models::earnings::{Earnings, EarningsPeriod, EarningsSummary};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/agents", post(register_agent).get(list_agents))
        .route("/agents/nearby", get(nearby_agents))
        .route("/agents/:id", get(get_agent))
        .route("/agents/:id/verification", patch(update_verification))
        .route("/agents/:id/availability", patch(update_availability))
        .route("/agents/:id/location", patch(update_location))
        .route("/agents/:id/earnings", get(agent_earnings))
}

#[derive(Deserialize)]
pub struct RegisterAgentRequest {
    pub name: String,
    pub phone: String,
    pub vehicle: VehicleType,
}

#[derive(Deserialize)]
pub struct UpdateVerificationRequest {
    pub status: VerificationStatus,
}

#[derive(Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub is_online: bool,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub location: GeoPoint,
}

#[derive(Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: Option<f64>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct EarningsQuery {
    #[serde(default)]
    pub period: EarningsPeriod,
}

#[derive(Serialize)]
pub struct EarningsResponse {
    pub totals: Earnings,
    pub summary: EarningsSummary,
}

async fn register_agent(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterAgentRequest>,
) -> Result<Json<DeliveryAgent>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if payload.phone.trim().is_empty() {
        return Err(AppError::BadRequest("phone cannot be empty".to_string()));
    }

    let agent = DeliveryAgent::register(payload.name, payload.phone, payload.vehicle, Utc::now());
    state.store.insert_agent(agent.clone()).await?;
    Ok(Json(agent))
}

async fn list_agents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DeliveryAgent>>, AppError> {
    let agents = state.store.list_agents().await?;
    Ok(Json(agents))
}

async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryAgent>, AppError> {
    let agent = state
        .store
        .get_agent(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("agent {} not found", id)))?;

    Ok(Json(agent))
}

async fn nearby_agents(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Vec<Candidate>>, AppError> {
    let point = GeoPoint {
        lat: query.lat,
        lng: query.lng,
    };
    if !point.is_valid() {
        return Err(AppError::BadRequest("coordinates are out of range".to_string()));
    }

    let radius_km = query.radius_km.unwrap_or(state.dispatch_settings.radius_km);
    let limit = query.limit.unwrap_or(state.dispatch_settings.candidate_limit);
    let candidates = state
        .index
        .find_candidates(&point, radius_km, limit)
        .await?
        .collect();

    Ok(Json(candidates))
}

async fn update_verification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateVerificationRequest>,
) -> Result<Json<DeliveryAgent>, AppError> {
    let agent = state
        .store
        .set_agent_verification(id, payload.status, Utc::now())
        .await?;
    Ok(Json(agent))
}

async fn update_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAvailabilityRequest>,
) -> Result<Json<DeliveryAgent>, AppError> {
    let agent = state
        .store
        .set_agent_online(id, payload.is_online, Utc::now())
        .await?;
    Ok(Json(agent))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<DeliveryAgent>, AppError> {
    if !payload.location.is_valid() {
        return Err(AppError::BadRequest("coordinates are out of range".to_string()));
    }

    let agent = state
        .store
        .update_agent_location(id, payload.location, Utc::now())
        .await?;
    Ok(Json(agent))
}

async fn agent_earnings(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<EarningsQuery>,
) -> Result<Json<EarningsResponse>, AppError> {
    let totals = state.earnings.current_totals(id).await?;
    let summary = state.earnings.summarize(id, query.period).await?;
    Ok(Json(EarningsResponse { totals, summary }))
}
