use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ApplicationId, Decision, EvaluationSubmission, JobId};
use super::notification::{BulkSendOutcome, BulkSendRequest, DispatchError};
use super::repository::{
    ApplicationStore, MailTransport, RepositoryError, TemplateError, TemplateId, TemplateStore,
};
use super::service::{ApplicationView, ApplicationWorkflowService, WorkflowError};

#[derive(Debug, Deserialize)]
pub(crate) struct SendRequest {
    pub(crate) template_id: TemplateId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConflictCheckRequest {
    pub(crate) application_ids: Vec<ApplicationId>,
    pub(crate) outcome: Decision,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CandidateQuery {
    #[serde(default)]
    pub(crate) outcome: Option<Decision>,
}

/// Router builder exposing evaluation and result-notification endpoints.
pub fn application_router<S, T, M>(service: Arc<ApplicationWorkflowService<S, T, M>>) -> Router
where
    S: ApplicationStore + 'static,
    T: TemplateStore + 'static,
    M: MailTransport + 'static,
{
    Router::new()
        .route(
            "/api/v1/applications/:application_id",
            get(application_handler::<S, T, M>),
        )
        .route(
            "/api/v1/applications/:application_id/evaluation",
            put(evaluation_handler::<S, T, M>),
        )
        .route(
            "/api/v1/applications/:application_id/notification",
            get(eligibility_handler::<S, T, M>).post(send_single_handler::<S, T, M>),
        )
        .route(
            "/api/v1/applications/:application_id/preview/:template_id",
            get(preview_handler::<S, T, M>),
        )
        .route(
            "/api/v1/jobs/:job_id/applications",
            get(candidates_handler::<S, T, M>),
        )
        .route(
            "/api/v1/notifications/conflicts",
            post(conflicts_handler::<S, T, M>),
        )
        .route(
            "/api/v1/notifications/bulk",
            post(send_bulk_handler::<S, T, M>),
        )
        .route("/api/v1/templates", get(templates_handler::<S, T, M>))
        .with_state(service)
}

pub(crate) async fn application_handler<S, T, M>(
    State(service): State<Arc<ApplicationWorkflowService<S, T, M>>>,
    Path(application_id): Path<String>,
) -> Response
where
    S: ApplicationStore + 'static,
    T: TemplateStore + 'static,
    M: MailTransport + 'static,
{
    match service.get(&ApplicationId(application_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => workflow_error_response(err),
    }
}

pub(crate) async fn evaluation_handler<S, T, M>(
    State(service): State<Arc<ApplicationWorkflowService<S, T, M>>>,
    Path(application_id): Path<String>,
    axum::Json(submission): axum::Json<EvaluationSubmission>,
) -> Response
where
    S: ApplicationStore + 'static,
    T: TemplateStore + 'static,
    M: MailTransport + 'static,
{
    match service.submit_evaluation(&ApplicationId(application_id), submission) {
        Ok(record) => (StatusCode::OK, axum::Json(ApplicationView::of(record))).into_response(),
        Err(err) => workflow_error_response(err),
    }
}

pub(crate) async fn eligibility_handler<S, T, M>(
    State(service): State<Arc<ApplicationWorkflowService<S, T, M>>>,
    Path(application_id): Path<String>,
) -> Response
where
    S: ApplicationStore + 'static,
    T: TemplateStore + 'static,
    M: MailTransport + 'static,
{
    match service.notification_eligibility(&ApplicationId(application_id)) {
        Ok(eligibility) => (StatusCode::OK, axum::Json(eligibility)).into_response(),
        Err(err) => workflow_error_response(err),
    }
}

pub(crate) async fn send_single_handler<S, T, M>(
    State(service): State<Arc<ApplicationWorkflowService<S, T, M>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<SendRequest>,
) -> Response
where
    S: ApplicationStore + 'static,
    T: TemplateStore + 'static,
    M: MailTransport + 'static,
{
    match service.send_single(&ApplicationId(application_id), &request.template_id) {
        Ok(receipt) => (StatusCode::OK, axum::Json(receipt)).into_response(),
        Err(err) => workflow_error_response(err),
    }
}

pub(crate) async fn preview_handler<S, T, M>(
    State(service): State<Arc<ApplicationWorkflowService<S, T, M>>>,
    Path((application_id, template_id)): Path<(String, String)>,
) -> Response
where
    S: ApplicationStore + 'static,
    T: TemplateStore + 'static,
    M: MailTransport + 'static,
{
    match service.preview(&ApplicationId(application_id), &TemplateId(template_id)) {
        Ok(rendered) => (StatusCode::OK, axum::Json(rendered)).into_response(),
        Err(err) => workflow_error_response(err),
    }
}

pub(crate) async fn candidates_handler<S, T, M>(
    State(service): State<Arc<ApplicationWorkflowService<S, T, M>>>,
    Path(job_id): Path<String>,
    Query(query): Query<CandidateQuery>,
) -> Response
where
    S: ApplicationStore + 'static,
    T: TemplateStore + 'static,
    M: MailTransport + 'static,
{
    match service.batch_candidates(&JobId(job_id), query.outcome) {
        Ok(records) => {
            let views: Vec<ApplicationView> = records.into_iter().map(ApplicationView::of).collect();
            (StatusCode::OK, axum::Json(views)).into_response()
        }
        Err(err) => workflow_error_response(err),
    }
}

pub(crate) async fn conflicts_handler<S, T, M>(
    State(service): State<Arc<ApplicationWorkflowService<S, T, M>>>,
    axum::Json(request): axum::Json<ConflictCheckRequest>,
) -> Response
where
    S: ApplicationStore + 'static,
    T: TemplateStore + 'static,
    M: MailTransport + 'static,
{
    match service.detect_conflicts(&request.application_ids, request.outcome) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(err) => workflow_error_response(err),
    }
}

pub(crate) async fn send_bulk_handler<S, T, M>(
    State(service): State<Arc<ApplicationWorkflowService<S, T, M>>>,
    axum::Json(request): axum::Json<BulkSendRequest>,
) -> Response
where
    S: ApplicationStore + 'static,
    T: TemplateStore + 'static,
    M: MailTransport + 'static,
{
    match service.send_bulk(&request) {
        Ok(outcome @ BulkSendOutcome::ConfirmationRequired(_)) => {
            (StatusCode::CONFLICT, axum::Json(outcome)).into_response()
        }
        Ok(outcome @ BulkSendOutcome::Completed(_)) => {
            (StatusCode::OK, axum::Json(outcome)).into_response()
        }
        Err(err) => workflow_error_response(err),
    }
}

pub(crate) async fn templates_handler<S, T, M>(
    State(service): State<Arc<ApplicationWorkflowService<S, T, M>>>,
) -> Response
where
    S: ApplicationStore + 'static,
    T: TemplateStore + 'static,
    M: MailTransport + 'static,
{
    match service.templates() {
        Ok(templates) => (StatusCode::OK, axum::Json(templates)).into_response(),
        Err(err) => workflow_error_response(err),
    }
}

fn error_payload(status: StatusCode, code: &str, message: String) -> Response {
    let payload = json!({
        "error": code,
        "message": message,
    });
    (status, axum::Json(payload)).into_response()
}

pub(crate) fn workflow_error_response(err: WorkflowError) -> Response {
    let message = err.to_string();
    match err {
        WorkflowError::NotFound(_)
        | WorkflowError::Dispatch(DispatchError::NotFound(_))
        | WorkflowError::Repository(RepositoryError::NotFound)
        | WorkflowError::Dispatch(DispatchError::Repository(RepositoryError::NotFound)) => {
            error_payload(StatusCode::NOT_FOUND, "not_found", message)
        }
        WorkflowError::Evaluation(rejection) => {
            error_payload(StatusCode::CONFLICT, rejection.code(), message)
        }
        WorkflowError::Dispatch(DispatchError::Blocked(reason)) => {
            let code = serde_json::to_value(reason)
                .ok()
                .and_then(|value| value.as_str().map(str::to_string))
                .unwrap_or_else(|| "blocked".to_string());
            error_payload(StatusCode::CONFLICT, &code, message)
        }
        WorkflowError::Dispatch(DispatchError::PreviouslyNotified(prior)) => {
            let payload = json!({
                "error": "previously_notified",
                "message": message,
                "prior": prior,
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        WorkflowError::Dispatch(DispatchError::SendInProgress(_)) => {
            error_payload(StatusCode::CONFLICT, "send_in_progress", message)
        }
        WorkflowError::Template(TemplateError::UnknownTemplate(_))
        | WorkflowError::Dispatch(DispatchError::Template(TemplateError::UnknownTemplate(_))) => {
            error_payload(StatusCode::NOT_FOUND, "unknown_template", message)
        }
        WorkflowError::Dispatch(DispatchError::Transport(_)) => {
            error_payload(StatusCode::BAD_GATEWAY, "transport_failed", message)
        }
        WorkflowError::Template(TemplateError::Render(_))
        | WorkflowError::Dispatch(DispatchError::Template(TemplateError::Render(_))) => {
            error_payload(StatusCode::BAD_GATEWAY, "render_failed", message)
        }
        WorkflowError::Repository(RepositoryError::Conflict)
        | WorkflowError::Dispatch(DispatchError::Repository(RepositoryError::Conflict)) => {
            error_payload(StatusCode::CONFLICT, "conflict", message)
        }
        WorkflowError::Repository(RepositoryError::Unavailable(_))
        | WorkflowError::Dispatch(DispatchError::Repository(RepositoryError::Unavailable(_))) => {
            error_payload(StatusCode::INTERNAL_SERVER_ERROR, "unavailable", message)
        }
    }
}
