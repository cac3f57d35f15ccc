use super::common::*;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::workflows::applications::domain::Decision;
use crate::workflows::applications::router::{application_handler, application_router};
use crate::workflows::applications::service::ApplicationWorkflowService;

fn router_with(records: Vec<crate::workflows::applications::domain::ApplicationRecord>) -> (
    axum::Router,
    Arc<MemoryStore>,
    Arc<MemoryTransport>,
) {
    let (service, store, transport) = build_service(records);
    (application_router(Arc::new(service)), store, transport)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

#[tokio::test]
async fn application_view_includes_evaluation_panel() {
    let (router, _, _) = router_with(vec![record("app-1", "ana", "job-1")]);

    let response = router
        .oneshot(get_request("/api/v1/applications/app-1"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "new");
    assert_eq!(payload["result"], Value::Null);
    assert_eq!(payload["evaluation"]["mode"], "editable");
}

#[tokio::test]
async fn unknown_application_is_not_found() {
    let (router, _, _) = router_with(Vec::new());

    let response = router
        .oneshot(get_request("/api/v1/applications/nope"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn store_outage_maps_to_internal_error() {
    let service = Arc::new(ApplicationWorkflowService::new(
        Arc::new(UnavailableStore),
        Arc::new(MemoryTemplates),
        Arc::new(MemoryTransport::default()),
    ));

    let response = application_handler::<UnavailableStore, MemoryTemplates, MemoryTransport>(
        State(service),
        Path("app-1".to_string()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let payload = read_json_body(response).await;
    assert_eq!(payload["error"], "unavailable");
}

#[tokio::test]
async fn evaluation_on_closed_job_conflicts() {
    let (router, store, _) = router_with(vec![record("app-1", "ana", "job-1")]);
    store.close_job("job-1");

    let response = router
        .oneshot(json_request(
            "PUT",
            "/api/v1/applications/app-1/evaluation",
            json!({ "note": "late", "result": true }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let payload = read_json_body(response).await;
    assert_eq!(payload["error"], "job_closed");
}

#[tokio::test]
async fn evaluation_after_notification_accepts_note_only() {
    let mut notified = decided("app-1", "ana", "job-1", Decision::Accept);
    notified.email_sent = true;
    let (router, store, _) = router_with(vec![notified]);

    let rejected = router
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/v1/applications/app-1/evaluation",
            json!({ "note": "", "result": false }),
        ))
        .await
        .expect("route executes");
    assert_eq!(rejected.status(), StatusCode::CONFLICT);
    assert_eq!(read_json_body(rejected).await["error"], "already_notified");

    let accepted = router
        .oneshot(json_request(
            "PUT",
            "/api/v1/applications/app-1/evaluation",
            json!({ "note": "Signed contract", "result": true }),
        ))
        .await
        .expect("route executes");
    assert_eq!(accepted.status(), StatusCode::OK);
    let payload = read_json_body(accepted).await;
    assert_eq!(payload["note"], "Signed contract");
    assert_eq!(payload["evaluation"]["mode"], "note_only");
    assert_eq!(store.record("app-1").note, "Signed contract");
}

#[tokio::test]
async fn single_send_route_reports_gate_reasons() {
    let (router, _, transport) = router_with(vec![
        record("app-1", "ana", "job-1"),
        decided("app-2", "bo", "job-1", Decision::Reject),
    ]);

    let blocked = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/applications/app-1/notification",
            json!({ "template_id": "regret-letter" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(blocked.status(), StatusCode::CONFLICT);
    assert_eq!(read_json_body(blocked).await["error"], "no_decision");

    let sent = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/applications/app-2/notification",
            json!({ "template_id": "regret-letter" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(sent.status(), StatusCode::OK);
    let payload = read_json_body(sent).await;
    assert_eq!(payload["record"]["email_sent"], true);

    let again = router
        .oneshot(json_request(
            "POST",
            "/api/v1/applications/app-2/notification",
            json!({ "template_id": "regret-letter" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(again.status(), StatusCode::CONFLICT);
    assert_eq!(read_json_body(again).await["error"], "already_sent");
    assert_eq!(transport.calls().len(), 1);
}

#[tokio::test]
async fn transport_failure_maps_to_bad_gateway() {
    let (router, store, transport) =
        router_with(vec![decided("app-1", "ana", "job-1", Decision::Accept)]);
    transport.fail_for("app-1");

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/applications/app-1/notification",
            json!({ "template_id": "offer-letter" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(!store.record("app-1").email_sent);
}

#[tokio::test]
async fn eligibility_route_exposes_gate() {
    let (router, _, _) = router_with(vec![record("app-1", "ana", "job-1")]);

    let response = router
        .oneshot(get_request("/api/v1/applications/app-1/notification"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["gate"]["allowed"], false);
    assert_eq!(payload["gate"]["reason"], "no_decision");
    assert_eq!(payload["can_send"], false);
}

#[tokio::test]
async fn bulk_route_pauses_on_conflicts_until_acknowledged() {
    let (router, store, transport) = router_with(vec![
        decided("app-1", "ana", "job-1", Decision::Accept),
        decided("app-2", "ana", "job-2", Decision::Reject),
    ]);

    let paused = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/notifications/bulk",
            json!({
                "application_ids": ["app-1"],
                "template_id": "offer-letter",
                "outcome": "accept"
            }),
        ))
        .await
        .expect("route executes");
    assert_eq!(paused.status(), StatusCode::CONFLICT);
    let payload = read_json_body(paused).await;
    assert_eq!(payload["state"], "confirmation_required");
    assert_eq!(payload["conflicts"][0]["applicant_id"], "ana");
    assert!(transport.calls().is_empty());

    let sent = router
        .oneshot(json_request(
            "POST",
            "/api/v1/notifications/bulk",
            json!({
                "application_ids": ["app-1"],
                "template_id": "offer-letter",
                "outcome": "accept",
                "acknowledge_conflicts": true
            }),
        ))
        .await
        .expect("route executes");
    assert_eq!(sent.status(), StatusCode::OK);
    let payload = read_json_body(sent).await;
    assert_eq!(payload["state"], "completed");
    assert_eq!(payload["succeeded"], json!(["app-1"]));
    assert!(store.record("app-1").email_sent);
}

#[tokio::test]
async fn conflict_review_route_returns_report() {
    let (router, _, _) = router_with(vec![
        decided("app-1", "ana", "job-1", Decision::Reject),
        record("app-2", "ana", "job-2"),
    ]);

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/notifications/conflicts",
            json!({ "application_ids": ["app-1"], "outcome": "reject" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(
        payload["conflicts"][0]["impact"],
        "will_receive_batch_email"
    );
}

#[tokio::test]
async fn candidates_route_filters_by_outcome() {
    let (router, _, _) = router_with(vec![
        decided("app-1", "ana", "job-1", Decision::Accept),
        decided("app-2", "bo", "job-1", Decision::Reject),
        record("app-3", "cy", "job-1"),
    ]);

    let response = router
        .oneshot(get_request("/api/v1/jobs/job-1/applications?outcome=rejected"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    let rows = payload.as_array().expect("array payload");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], "app-2");
}

#[tokio::test]
async fn templates_and_preview_routes() {
    let (router, _, _) = router_with(vec![decided("app-1", "ana", "job-1", Decision::Accept)]);

    let listed = router
        .clone()
        .oneshot(get_request("/api/v1/templates"))
        .await
        .expect("route executes");
    assert_eq!(listed.status(), StatusCode::OK);
    assert_eq!(read_json_body(listed).await.as_array().map(Vec::len), Some(2));

    let preview = router
        .clone()
        .oneshot(get_request("/api/v1/applications/app-1/preview/offer-letter"))
        .await
        .expect("route executes");
    assert_eq!(preview.status(), StatusCode::OK);
    assert_eq!(read_json_body(preview).await["subject"], "Offer letter (app-1)");

    let missing = router
        .oneshot(get_request("/api/v1/applications/app-1/preview/unknown"))
        .await
        .expect("route executes");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_json_body(missing).await["error"], "unknown_template");
}

#[tokio::test]
async fn unrecorded_delivery_blocks_resend_route() {
    let (router, store, transport) =
        router_with(vec![decided("app-1", "ana", "job-1", Decision::Accept)]);
    store.fail_next_mark();

    let first = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/applications/app-1/notification",
            json!({ "template_id": "offer-letter" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(read_json_body(first).await["recorded"], false);

    let again = router
        .oneshot(json_request(
            "POST",
            "/api/v1/applications/app-1/notification",
            json!({ "template_id": "offer-letter" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(again.status(), StatusCode::CONFLICT);
    assert_eq!(read_json_body(again).await["error"], "send_in_progress");
    assert_eq!(transport.calls().len(), 1);
}
