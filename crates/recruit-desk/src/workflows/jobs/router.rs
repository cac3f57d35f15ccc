use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;

use super::catalog::{JobCatalog, JobCatalogCache};
use super::scoring::{
    validate_weights, JobConfigError, JobConfigStore, JobScoringService, ScoreWeightSet,
    ScoringError,
};
use crate::workflows::applications::domain::JobId;

pub struct JobRouterState<J, C> {
    pub scoring: Arc<JobScoringService<J>>,
    pub catalog: Arc<JobCatalogCache<C>>,
}

impl<J, C> Clone for JobRouterState<J, C> {
    fn clone(&self) -> Self {
        Self {
            scoring: self.scoring.clone(),
            catalog: self.catalog.clone(),
        }
    }
}

/// Router exposing criterion-weight validation, job scoring persistence and cached job
/// summaries.
pub fn job_router<J, C>(
    scoring: Arc<JobScoringService<J>>,
    catalog: Arc<JobCatalogCache<C>>,
) -> Router
where
    J: JobConfigStore + 'static,
    C: JobCatalog + 'static,
{
    Router::new()
        .route("/api/v1/scoring/validate", post(validate_handler))
        .route("/api/v1/scoring/defaults", get(defaults_handler))
        .route("/api/v1/scoring/equal", get(equal_handler))
        .route("/api/v1/jobs/:job_id", get(job_handler::<J, C>))
        .route(
            "/api/v1/jobs/:job_id/scoring",
            get(load_scoring_handler::<J, C>).put(save_scoring_handler::<J, C>),
        )
        .with_state(JobRouterState { scoring, catalog })
}

pub(crate) async fn validate_handler(axum::Json(weights): axum::Json<ScoreWeightSet>) -> Response {
    (StatusCode::OK, axum::Json(validate_weights(&weights))).into_response()
}

pub(crate) async fn defaults_handler() -> Response {
    (StatusCode::OK, axum::Json(ScoreWeightSet::defaults())).into_response()
}

pub(crate) async fn equal_handler() -> Response {
    (StatusCode::OK, axum::Json(ScoreWeightSet::distribute_equally())).into_response()
}

pub(crate) async fn job_handler<J, C>(
    State(state): State<JobRouterState<J, C>>,
    Path(job_id): Path<String>,
) -> Response
where
    J: JobConfigStore + 'static,
    C: JobCatalog + 'static,
{
    let id = JobId(job_id);
    match state.catalog.get(&id, Utc::now()) {
        Ok(Some(summary)) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Ok(None) => {
            let payload = json!({ "error": format!("job {id} not found") });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(err) => {
            let payload = json!({ "error": err.to_string() });
            (StatusCode::BAD_GATEWAY, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn load_scoring_handler<J, C>(
    State(state): State<JobRouterState<J, C>>,
    Path(job_id): Path<String>,
) -> Response
where
    J: JobConfigStore + 'static,
    C: JobCatalog + 'static,
{
    match state.scoring.load(&JobId(job_id)) {
        Ok(weights) => (StatusCode::OK, axum::Json(weights)).into_response(),
        Err(err) => scoring_error_response(err),
    }
}

pub(crate) async fn save_scoring_handler<J, C>(
    State(state): State<JobRouterState<J, C>>,
    Path(job_id): Path<String>,
    axum::Json(weights): axum::Json<ScoreWeightSet>,
) -> Response
where
    J: JobConfigStore + 'static,
    C: JobCatalog + 'static,
{
    match state.scoring.save(&JobId(job_id), &weights) {
        Ok(validation) => (StatusCode::OK, axum::Json(validation)).into_response(),
        Err(err) => scoring_error_response(err),
    }
}

fn scoring_error_response(err: ScoringError) -> Response {
    match err {
        ScoringError::WeightMismatch {
            total,
            out_of_range,
        } => {
            let payload = json!({
                "error": "weight_mismatch",
                "message": format!("criterion weights must total 100 (currently {total})"),
                "total": total,
                "out_of_range": out_of_range,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        ScoringError::Store(JobConfigError::NotFound(id)) => {
            let payload = json!({ "error": format!("job {id} not found") });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        ScoringError::Store(JobConfigError::Rejected(reason)) => {
            let payload = json!({ "error": reason });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        ScoringError::Store(other) => {
            let payload = json!({ "error": other.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}
