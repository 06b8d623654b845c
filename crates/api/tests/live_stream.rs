//! Integration tests for the Live Channel SSE endpoints.

mod common;

use axum::http::StatusCode;
use common::{get, post_json, read_sse_until, wait_finished};
use serde_json::json;

#[tokio::test]
async fn unknown_job_gets_not_found_event_and_stream_ends() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = common::build_test_app(common::test_config(dir.path()));

    let response = get(app, "/api/v1/jobs/ghost/stream").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");

    let bytes = http_body_util::BodyExt::collect(response.into_body())
        .await
        .unwrap()
        .to_bytes();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("event: not-found"), "{text}");
    assert!(text.contains(r#""jobId":"ghost""#), "{text}");
    assert_eq!(state.registry.bus().subscriber_count("ghost"), 0);
}

#[tokio::test]
async fn stream_starts_with_snapshot_then_live_events() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = common::build_test_app(common::test_config(dir.path()));

    post_json(
        app.clone(),
        "/api/v1/jobs",
        json!({ "command": ["echo", "done"], "id": "live" }),
    )
    .await;
    wait_finished(&state, "live").await;

    let response = get(app, "/api/v1/jobs/live/stream").await;
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body();

    let text = read_sse_until(&mut body, "event: snapshot").await;
    assert!(text.contains(r#""status":"succeeded""#), "{text}");
    assert!(text.contains(r#""message":"done""#), "{text}");

    state
        .registry
        .publish_stage("live", "publishing", None)
        .unwrap();
    let text = read_sse_until(&mut body, "event: stage").await;
    assert!(text.contains(r#""stage":"publishing""#), "{text}");

    drop(body);
    assert_eq!(state.registry.bus().subscriber_count("live"), 0);
}

#[tokio::test]
async fn observer_limit_returns_503() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(dir.path());
    config.jobs.max_subscribers_per_job = 1;
    let (app, state) = common::build_test_app(config);

    post_json(app.clone(), "/api/v1/jobs", json!({ "command": ["true"], "id": "full" })).await;
    wait_finished(&state, "full").await;

    let _held = state.registry.subscribe("full").unwrap();
    let response = get(app, "/api/v1/jobs/full/stream").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(common::body_json(response).await["code"], "CAPACITY");
}

#[tokio::test]
async fn activity_stream_sees_every_job() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = common::build_test_app(common::test_config(dir.path()));

    let response = get(app.clone(), "/api/v1/jobs/events").await;
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body();

    post_json(app, "/api/v1/jobs", json!({ "command": ["true"], "id": "any-1" })).await;
    let text = read_sse_until(&mut body, "event: finished").await;
    assert!(text.contains("event: queued"), "{text}");
    assert!(text.contains(r#""jobId":"any-1""#), "{text}");

    drop(body);
    assert_eq!(state.registry.bus().wildcard_count(), 0);
}

#[tokio::test]
async fn shutdown_ends_open_streams() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = common::build_test_app(common::test_config(dir.path()));

    let response = get(app, "/api/v1/jobs/events").await;
    let body = response.into_body();
    state.shutdown.cancel();

    let collected = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        http_body_util::BodyExt::collect(body),
    )
    .await
    .expect("stream ended after shutdown");
    assert!(collected.is_ok());
}
