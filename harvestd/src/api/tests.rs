use super::*;
use axum::body::Body;
use axum::http::Request;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

fn test_state(temp: &TempDir) -> SharedState {
    let registry = Registry::builtin(temp.path());
    let store = ConfigStore::new(temp.path().join("jobs.json"));
    AppState::new(registry, store, Supervisor::new())
}

async fn send(
    state: SharedState,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn status_all_covers_every_job_and_masks_passwords() {
    let temp = TempDir::new().unwrap();
    let (status, body) = send(test_state(&temp), "GET", "/status", None).await;

    assert_eq!(status, StatusCode::OK);
    let jobs = body.as_object().unwrap();
    assert_eq!(jobs.len(), 3);
    for name in ["daily", "pickup", "weekly"] {
        let job = &jobs[name];
        assert_eq!(job["running"], false);
        assert_eq!(job["status"], "Stopped");
        assert_eq!(job["password"], "******");
    }
    assert_eq!(jobs["daily"]["hours"], serde_json::json!([9, 22]));
    assert_eq!(jobs["pickup"]["frequency"], 120);
}

#[tokio::test]
async fn status_single_job_shape() {
    let temp = TempDir::new().unwrap();
    let (status, body) = send(test_state(&temp), "GET", "/status?job=weekly", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], false);
    assert_eq!(body["schedule_run"], 1);
    assert_eq!(body["password"], "******");
}

#[tokio::test]
async fn schedule_run_only_reported_for_gated_jobs() {
    let temp = TempDir::new().unwrap();
    let (_, body) = send(test_state(&temp), "GET", "/status?job=daily", None).await;
    assert!(body.get("schedule_run").is_none());
}

#[tokio::test]
async fn status_unknown_job_rejected() {
    let temp = TempDir::new().unwrap();
    let (status, body) = send(test_state(&temp), "GET", "/status?job=ghost", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn control_unknown_job_rejected() {
    let temp = TempDir::new().unwrap();
    let (status, _) = send(
        test_state(&temp),
        "POST",
        "/control/ghost",
        Some(serde_json::json!({"action": "start"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn control_unknown_action_is_no_change() {
    let temp = TempDir::new().unwrap();
    let state = test_state(&temp);

    let (status, body) = send(
        state.clone(),
        "POST",
        "/control/daily",
        Some(serde_json::json!({"action": "pause"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "no change");
    assert!(!state.supervisor.status("daily").await.running);
}

#[tokio::test]
async fn control_stop_on_stopped_job_is_a_no_op() {
    let temp = TempDir::new().unwrap();
    let (status, body) = send(
        test_state(&temp),
        "POST",
        "/control/daily",
        Some(serde_json::json!({"action": "stop"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "daily not running");
}

#[tokio::test]
async fn update_settings_unknown_job_rejected() {
    let temp = TempDir::new().unwrap();
    let (status, _) = send(
        test_state(&temp),
        "POST",
        "/update_settings/ghost",
        Some(serde_json::json!({"frequency": 30})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_settings_rejects_invalid_hours() {
    let temp = TempDir::new().unwrap();
    let (status, body) = send(
        test_state(&temp),
        "POST",
        "/update_settings/daily",
        Some(serde_json::json!({"start_hour": 24})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("run window"));
}

#[tokio::test]
async fn update_settings_rejects_zero_frequency() {
    let temp = TempDir::new().unwrap();
    let (status, _) = send(
        test_state(&temp),
        "POST",
        "/update_settings/daily",
        Some(serde_json::json!({"frequency": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_settings_rejects_malformed_payload_with_json_error() {
    let temp = TempDir::new().unwrap();
    // 300 does not fit the hour field; the rejection must carry the same
    // error body shape as a validation failure, not axum's plain text.
    let (status, body) = send(
        test_state(&temp),
        "POST",
        "/update_settings/daily",
        Some(serde_json::json!({"start_hour": 300})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn update_settings_persists_and_stamps_destination() {
    let temp = TempDir::new().unwrap();
    let state = test_state(&temp);

    let (status, body) = send(
        state.clone(),
        "POST",
        "/update_settings/daily",
        Some(serde_json::json!({"frequency": 30, "destinationId": "F-9"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "settings updated");
    assert_eq!(body["config"]["destinationId"], "F-9");
    assert_eq!(body["config"]["frequency"], 30);
    assert_eq!(body["config"]["password"], "******");
    assert!(body["config"]["destination_updated"].is_string());

    // Changes survive a daemon restart: a fresh store sees them.
    let registry = Registry::builtin(temp.path());
    let reloaded = ConfigStore::new(temp.path().join("jobs.json")).load(&registry);
    assert_eq!(reloaded["daily"].destination_id, "F-9");
    assert_eq!(reloaded["daily"].frequency_minutes, 30);
}

#[tokio::test]
async fn unchanged_destination_is_not_restamped() {
    let temp = TempDir::new().unwrap();
    let state = test_state(&temp);

    let (_, first) = send(
        state.clone(),
        "POST",
        "/update_settings/daily",
        Some(serde_json::json!({"destinationId": "F-9"})),
    )
    .await;
    let stamp = first["config"]["destination_updated"].clone();

    let (_, second) = send(
        state,
        "POST",
        "/update_settings/daily",
        Some(serde_json::json!({"destinationId": "F-9"})),
    )
    .await;
    assert_eq!(second["config"]["destination_updated"], stamp);
}

#[tokio::test]
async fn update_credentials_applies_to_every_job() {
    let temp = TempDir::new().unwrap();
    let state = test_state(&temp);

    let (status, body) = send(
        state.clone(),
        "POST",
        "/update_credentials/daily",
        Some(serde_json::json!({"username": "operator", "password": "hunter2"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "operator");
    assert_eq!(body["password"], "******");

    let (_, all) = send(state, "GET", "/status", None).await;
    for name in ["daily", "pickup", "weekly"] {
        assert_eq!(all[name]["username"], "operator");
        assert_eq!(all[name]["password"], "******");
        assert!(all[name]["credentials_updated"].is_string());
    }
}

#[tokio::test]
async fn update_credentials_unknown_job_rejected() {
    let temp = TempDir::new().unwrap();
    let (status, body) = send(
        test_state(&temp),
        "POST",
        "/update_credentials/ghost",
        Some(serde_json::json!({"username": "operator"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn update_schedule_unknown_job_rejected() {
    let temp = TempDir::new().unwrap();
    let (status, body) = send(
        test_state(&temp),
        "POST",
        "/update_schedule/ghost",
        Some(serde_json::json!({"schedule_run": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn update_schedule_rejected_for_interval_jobs() {
    let temp = TempDir::new().unwrap();
    let (status, _) = send(
        test_state(&temp),
        "POST",
        "/update_schedule/daily",
        Some(serde_json::json!({"schedule_run": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_schedule_rejects_out_of_range_flag() {
    let temp = TempDir::new().unwrap();
    let (status, _) = send(
        test_state(&temp),
        "POST",
        "/update_schedule/weekly",
        Some(serde_json::json!({"schedule_run": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_schedule_toggles_the_gate() {
    let temp = TempDir::new().unwrap();
    let state = test_state(&temp);

    let (status, body) = send(
        state.clone(),
        "POST",
        "/update_schedule/weekly",
        Some(serde_json::json!({"schedule_run": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["schedule_run"], 0);

    let (_, view) = send(state, "GET", "/status?job=weekly", None).await;
    assert_eq!(view["schedule_run"], 0);

    // Persisted as well.
    let registry = Registry::builtin(temp.path());
    let reloaded = ConfigStore::new(temp.path().join("jobs.json")).load(&registry);
    assert_eq!(reloaded["weekly"].schedule_mode, ScheduleMode::Always);
}
