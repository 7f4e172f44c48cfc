// HTTP request handlers
use crate::application::analysis_service::CompareLap;
use crate::application::replay_service::ReplayLap;
use crate::domain::analysis::replay::CarState;
use crate::domain::lap::Vehicle;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::infrastructure::ndjson_stream::stream_from_receiver;
use crate::presentation::app_state::AppState;
use crate::presentation::error::ApiError;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct RaceQuery {
    pub race: Option<String>,
}

#[derive(Deserialize)]
pub struct CompareRequest {
    pub circuit: String,
    pub chassis: String,
    pub car_number: u32,
    pub lap: u32,
    pub race: Option<String>,
}

#[derive(Deserialize)]
pub struct PrepareRequest {
    pub circuit: String,
    pub race: Option<String>,
    pub laps: Vec<ReplayLap>,
}

#[derive(Deserialize)]
pub struct CommentaryRequest {
    #[serde(default)]
    pub cars: Vec<CarState>,
    pub current_time: f64,
}

async fn respond<T: Serialize>(headers: &HeaderMap, data: &T) -> Result<Response, ApiError> {
    Ok(json_response(StatusCode::OK, data, accepts_brotli(headers)).await?)
}

pub async fn root() -> impl IntoResponse {
    let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
    Json(json!({
        "message": "Apex Replay API",
        "status": "running",
        "environment": environment,
    }))
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

pub async fn clear_cache(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.analysis_service.clear_caches().await;
    Json(json!({ "status": "cache cleared" }))
}

pub async fn list_circuits(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let circuits = state.circuit_service.list_circuits().await?;
    respond(&headers, &circuits).await
}

pub async fn get_circuit(
    Path(circuit): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let circuit = state.circuit_service.get_circuit(&circuit).await?;
    respond(&headers, &circuit).await
}

pub async fn list_vehicles(
    Path(circuit): Path<String>,
    Query(query): Query<RaceQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let race = state.race(query.race);
    let vehicles = state.vehicle_service.list_vehicles(&circuit, &race).await?;
    respond(&headers, &vehicles).await
}

pub async fn list_laps(
    Path((circuit, chassis, car_number)): Path<(String, String, u32)>,
    Query(query): Query<RaceQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let race = state.race(query.race);
    let vehicle = Vehicle::new(chassis, car_number);
    let laps = state
        .vehicle_service
        .list_laps(&circuit, &race, &vehicle)
        .await?;
    respond(&headers, &laps).await
}

pub async fn golden_lap(
    Path(circuit): Path<String>,
    Query(query): Query<RaceQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let race = state.race(query.race);
    let golden = state
        .golden_lap_service
        .golden_lap(&circuit, &race)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("No lap with telemetry for {} {}", circuit, race))
        })?;
    respond(&headers, &golden.info).await
}

pub async fn compare_lap(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(request): Json<CompareRequest>,
) -> Result<Response, ApiError> {
    let race = state.race(request.race);
    let request = CompareLap {
        circuit: request.circuit,
        race,
        vehicle: Vehicle::new(request.chassis, request.car_number),
        lap: request.lap,
    };
    let result = state.analysis_service.compare_lap(&request).await?;
    respond(&headers, result.as_ref()).await
}

pub async fn replay_setup(
    Path(circuit): Path<String>,
    Query(query): Query<RaceQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let race = state.race(query.race);
    let setup = state.replay_service.setup(&circuit, &race).await?;
    respond(&headers, &setup).await
}

pub async fn replay_vehicle_laps(
    Path((circuit, chassis, car)): Path<(String, String, u32)>,
    Query(query): Query<RaceQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let race = state.race(query.race);
    let laps = state
        .vehicle_service
        .list_laps(&circuit, &race, &Vehicle::new(chassis, car))
        .await?;
    respond(&headers, &json!({ "laps": laps })).await
}

/// Stream replay timelines as NDJSON (progressive loading)
pub async fn prepare_replay(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PrepareRequest>,
) -> Result<Response, ApiError> {
    if request.laps.is_empty() {
        return Err(ApiError::BadRequest("No laps requested".to_string()));
    }
    let race = state.race(request.race);
    let rx = state
        .replay_service
        .prepare(&request.circuit, &race, request.laps);
    Ok(stream_from_receiver(rx).into_response())
}

pub async fn replay_commentary(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CommentaryRequest>,
) -> impl IntoResponse {
    let comment = state
        .replay_service
        .commentary(&request.cars, request.current_time);
    Json(json!({ "comment": comment }))
}
