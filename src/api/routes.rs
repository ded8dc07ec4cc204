use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::HealthSnapshot;
use crate::config::{DEFAULT_FORECAST_MONTHS, MAX_FORECAST_MONTHS};
use crate::engine::{MarketEngine, RankRequest};
use crate::error::AppError;
use crate::types::{GeoPoint, Origin, PriceForecast, Ranking, SeasonalPattern};

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<MarketEngine>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .route("/states", get(get_states))
        .route("/states/:state/districts", get(get_districts))
        .route("/states/:state/districts/:district/markets", get(get_markets))
        .route("/varieties", get(get_varieties))
        .route("/varieties/:variety/seasonal", get(get_seasonal))
        .route("/varieties/:variety/forecast", get(get_forecast))
        .route("/varieties/:variety/rankings", get(get_rankings))
        .route("/reload", post(post_reload))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ForecastQuery {
    pub months: Option<usize>,
}

#[derive(Deserialize)]
pub struct RankingsQuery {
    pub state: Option<String>,
    pub district: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub fuel_price: Option<f64>,
    pub mileage: Option<f64>,
    pub limit: Option<usize>,
    pub narrative: Option<bool>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

#[derive(Serialize)]
pub struct ReloadResponse {
    pub files_read: usize,
    pub accepted: usize,
    pub rejected: usize,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthSnapshot> {
    Json(state.engine.health().snapshot())
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    let latency = state.engine.latency();
    let (p50, p95, p99) = latency.percentiles();
    let to_ms = |us: Option<u64>| us.map(|v| v as f64 / 1000.0);
    Json(LatencyResponse {
        samples: latency.len(),
        p50_ms: to_ms(p50),
        p95_ms: to_ms(p95),
        p99_ms: to_ms(p99),
    })
}

async fn get_states(State(state): State<ApiState>) -> Json<Vec<String>> {
    Json(state.engine.list_states())
}

async fn get_districts(
    State(state): State<ApiState>,
    Path(state_name): Path<String>,
) -> Json<Vec<String>> {
    Json(state.engine.list_districts(&state_name))
}

async fn get_markets(
    State(state): State<ApiState>,
    Path((state_name, district)): Path<(String, String)>,
) -> Json<Vec<String>> {
    Json(state.engine.list_markets(&state_name, &district))
}

async fn get_varieties(State(state): State<ApiState>) -> Json<Vec<String>> {
    Json(state.engine.list_varieties())
}

async fn get_seasonal(
    State(state): State<ApiState>,
    Path(variety): Path<String>,
) -> Json<Vec<SeasonalPattern>> {
    Json(state.engine.seasonal_patterns(&variety))
}

async fn get_forecast(
    State(state): State<ApiState>,
    Path(variety): Path<String>,
    Query(params): Query<ForecastQuery>,
) -> Result<Json<Vec<PriceForecast>>, AppError> {
    let months = params.months.unwrap_or(DEFAULT_FORECAST_MONTHS);
    if months == 0 || months > MAX_FORECAST_MONTHS {
        return Err(AppError::InvalidRequest(format!(
            "months must be between 1 and {MAX_FORECAST_MONTHS}"
        )));
    }
    Ok(Json(state.engine.forecast(&variety, months)))
}

async fn get_rankings(
    State(state): State<ApiState>,
    Path(variety): Path<String>,
    Query(params): Query<RankingsQuery>,
) -> Result<Json<Ranking>, AppError> {
    let point = match (params.lat, params.lon) {
        (Some(lat), Some(lon)) => Some(GeoPoint { lat, lon }),
        (None, None) => None,
        _ => {
            return Err(AppError::InvalidRequest(
                "lat and lon must be given together".to_string(),
            ))
        }
    };

    let request = RankRequest {
        variety,
        origin: Origin {
            point,
            state: non_blank(params.state),
            district: non_blank(params.district),
        },
        fuel_price_per_liter: params.fuel_price,
        mileage_km_per_liter: params.mileage,
        limit: params.limit,
        with_narrative: params.narrative.unwrap_or(false),
    };
    Ok(Json(state.engine.rank_markets(&request).await?))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn post_reload(State(state): State<ApiState>) -> Result<Json<ReloadResponse>, AppError> {
    let stats = state.engine.reload().await?;
    Ok(Json(ReloadResponse {
        files_read: stats.files_read,
        accepted: stats.accepted,
        rejected: stats.rejected(),
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
