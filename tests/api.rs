use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use pomodoro_keeper::{
    alarms::{AlarmDispatcher, AlarmKind, RecordingAlarmBackend},
    clock::ManualClock,
    config::RedundancyConfig,
    create_router,
    session::CycleDurations,
    AppState,
};

struct Harness {
    clock: ManualClock,
    backend: Arc<RecordingAlarmBackend>,
    app: Router,
}

fn harness() -> Harness {
    let clock = ManualClock::new(1_700_000_000_000);
    let backend = Arc::new(RecordingAlarmBackend::new());
    let state = AppState::assemble(
        Arc::new(clock.clone()),
        RedundancyConfig::default(),
        CycleDurations::default(),
        backend.clone(),
        &AlarmDispatcher::new(),
        20554,
        "127.0.0.1".to_string(),
    );
    Harness {
        clock,
        backend,
        app: create_router(Arc::new(state)),
    }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_reports_ok() {
    let h = harness();
    let (status, body) = send(&h.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn start_without_body_runs_a_work_session() {
    let h = harness();
    let (status, body) = send(&h.app, "POST", "/start", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");
    assert_eq!(body["timer"]["state"], "running");
    assert_eq!(body["timer"]["cycle"], "work");
    assert_eq!(body["timer"]["duration_ms"], 1_500_000);
    assert!(h.backend.is_pending(AlarmKind::Backup));
    assert!(h.backend.is_pending(AlarmKind::HealthCheck));
}

#[tokio::test]
async fn start_with_zero_duration_is_a_bad_request() {
    let h = harness();
    let (status, body) = send(&h.app, "POST", "/start", Some(json!({ "duration_ms": 0 }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["timer"]["state"], "stopped");
    assert!(h.backend.pending_kinds().is_empty());
}

#[tokio::test]
async fn pause_resume_round_trip() {
    let h = harness();
    send(&h.app, "POST", "/start", Some(json!({ "cycle": "break", "duration_ms": 300_000 }))).await;
    h.clock.advance(60_000);

    let (status, body) = send(&h.app, "POST", "/pause", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["timer"]["state"], "paused");
    assert_eq!(body["timer"]["remaining_ms"], 240_000);
    assert!(h.backend.pending_kinds().is_empty());

    let (status, body) = send(&h.app, "POST", "/resume", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["timer"]["state"], "running");
    assert_eq!(body["timer"]["cycle"], "break");
    assert_eq!(body["timer"]["duration_ms"], 240_000);

    let (status, _) = send(&h.app, "POST", "/resume", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn denied_alarms_surface_as_unavailable() {
    let h = harness();
    h.backend.deny_exact_alarms(true);

    let (status, body) = send(&h.app, "POST", "/start", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["timer"]["state"], "stopped");
    assert_eq!(body["timer"]["health"], "backup_unavailable");

    let (_, diagnostics) = send(&h.app, "GET", "/diagnostics", None).await;
    assert_eq!(diagnostics["telemetry"]["counters"]["alarm_failures"], 1);
    assert_eq!(diagnostics["telemetry"]["recent"][0]["type"], "alarm_failure");
}

#[tokio::test]
async fn status_reports_primary_progress() {
    let h = harness();
    send(&h.app, "POST", "/start", Some(json!({ "cycle": "break", "duration_ms": 300_000 }))).await;

    let (status, body) = send(&h.app, "GET", "/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["primary"]["cycle"], "break");
    assert_eq!(body["primary"]["remaining_ms"], 300_000);
    assert_eq!(body["primary"]["total_ms"], 300_000);
    assert_eq!(body["primary"]["progress"], 0.0);
}

#[tokio::test]
async fn stop_and_status() {
    let h = harness();
    send(&h.app, "POST", "/start", None).await;

    let (status, body) = send(&h.app, "POST", "/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "inactive");
    assert!(h.backend.pending_kinds().is_empty());

    let (status, body) = send(&h.app, "GET", "/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["timer"]["state"], "stopped");
    assert_eq!(body["timer"]["health"], "healthy");
    assert_eq!(body["last_action"], "stop");
    assert_eq!(body["port"], 20554);
}
