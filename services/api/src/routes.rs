use crate::infra::{AppState, Backends};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::Duration;
use recruit_desk::workflows::applications::{application_router, ApplicationWorkflowService};
use recruit_desk::workflows::jobs::{job_router, JobCatalogCache, JobScoringService};
use serde_json::json;
use std::sync::Arc;

/// Application, notification and job routes over the in-memory backends, plus health and metrics endpoints.
pub(crate) fn workflow_routes(backends: &Backends, job_cache_ttl: Duration) -> Router {
    let workflow = Arc::new(ApplicationWorkflowService::new(
        backends.store.clone(),
        backends.templates.clone(),
        backends.transport.clone(),
    ));
    let scoring = Arc::new(JobScoringService::new(backends.job_config.clone()));
    let catalog = Arc::new(JobCatalogCache::new(backends.catalog.clone(), job_cache_ttl));

    application_router(workflow)
        .merge(job_router(scoring, catalog))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
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
