use crate::infra::{AppState, ScreeningBatch};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use site_scanner::error::AppError;
use site_scanner::screening::views::{ScenarioView, SiteDetailView};
use site_scanner::screening::{
    CsvComparableStore, FeasibilityInputs, FeasibilityModel, HoldingPeriodSweep, ParcelId,
    ScoreAggregator, SiteScreeningService,
};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Serialize)]
pub(crate) struct ScreenResponse {
    pub(crate) screened: usize,
    pub(crate) ranked: Vec<SiteDetailView>,
    pub(crate) failures: Vec<FailureView>,
}

#[derive(Debug, Serialize)]
pub(crate) struct FailureView {
    pub(crate) parcel_id: ParcelId,
    pub(crate) error: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SweepRequest {
    pub(crate) inputs: FeasibilityInputs,
    #[serde(default)]
    pub(crate) holding_months: Option<Vec<u32>>,
    #[serde(default)]
    pub(crate) finance_to_profit_limit: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SweepResponse {
    pub(crate) scenarios: Vec<ScenarioView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) best_holding_months: Option<u32>,
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/sites/screen", post(screen_endpoint))
        .route("/api/v1/feasibility/sweep", post(sweep_endpoint))
        .layer(Extension(state))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn screen_endpoint(
    Extension(state): Extension<AppState>,
    Json(batch): Json<ScreeningBatch>,
) -> Result<Json<ScreenResponse>, AppError> {
    let config = state.screening.as_ref().clone();
    let parts = batch.into_parts();
    let top_n = parts.top_n.unwrap_or(config.scoring.top_n);
    let screened = parts.requests.len();

    let comparables = Arc::new(CsvComparableStore::from_comparables(parts.comparables));
    let service = SiteScreeningService::new(parts.spatial, comparables, parts.sewer, config);
    let report = service.screen_batch(parts.requests).await;

    let failures: Vec<FailureView> = report
        .failures()
        .map(|(parcel, error)| FailureView {
            parcel_id: parcel.clone(),
            error: error.to_string(),
        })
        .collect();
    let ranked: Vec<SiteDetailView> = report
        .ranked(top_n)
        .iter()
        .enumerate()
        .map(|(index, site)| SiteDetailView::from_site(index + 1, site))
        .collect();

    info!(screened, failed = failures.len(), "screening request served");
    Ok(Json(ScreenResponse {
        screened,
        ranked,
        failures,
    }))
}

pub(crate) async fn sweep_endpoint(
    Extension(state): Extension<AppState>,
    Json(payload): Json<SweepRequest>,
) -> Result<Json<SweepResponse>, AppError> {
    let config = state.screening.as_ref();
    let months = payload
        .holding_months
        .filter(|months| !months.is_empty())
        .unwrap_or_else(|| config.scenarios.holding_months.clone());
    let limit = payload
        .finance_to_profit_limit
        .unwrap_or(config.scenarios.finance_to_profit_limit);

    let sweep = HoldingPeriodSweep::new(FeasibilityModel::from_config(&config.feasibility), limit);
    let outcomes = sweep.sweep(&payload.inputs, &months)?;

    let best_holding_months = ScoreAggregator::new(config.scoring.clone())
        .best_scenario(&outcomes)
        .map(|(index, _)| outcomes[index].result.holding_months);

    Ok(Json(SweepResponse {
        scenarios: outcomes.iter().map(ScenarioView::from).collect(),
        best_holding_months,
    }))
}
