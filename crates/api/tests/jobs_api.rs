//! Integration tests for the `/api/v1/jobs` resource.

mod common;

use axum::http::StatusCode;
use common::{body_json, get, patch_json, post_json, wait_finished};
use serde_json::json;

fn setup() -> (tempfile::TempDir, axum::Router, refinery_api::state::AppState) {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = common::build_test_app(common::test_config(dir.path()));
    (dir, app, state)
}

// ---------------------------------------------------------------------------
// Submit + read
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_returns_201_with_queued_job() {
    let (_dir, app, state) = setup();

    let response = post_json(
        app.clone(),
        "/api/v1/jobs",
        json!({ "command": ["echo", "hello"], "label": "greeting" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    let id = json["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(json["data"]["status"], "queued");
    assert_eq!(json["data"]["label"], "greeting");
    assert_eq!(json["data"]["command"], json!(["echo", "hello"]));

    let job = wait_finished(&state, &id).await;
    assert_eq!(job.exit_code, Some(0));

    let response = get(app, &format!("/api/v1/jobs/{id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "succeeded");
    assert_eq!(json["data"]["exitCode"], 0);
    assert_eq!(json["data"]["logs"][0]["message"], "hello");
    assert_eq!(json["data"]["logs"][0]["stream"], "stdout");
    assert_eq!(json["data"]["logsTruncated"], false);
}

#[tokio::test]
async fn spawn_failure_is_reported_on_the_job_not_the_request() {
    let (_dir, app, state) = setup();

    let response = post_json(
        app.clone(),
        "/api/v1/jobs",
        json!({ "command": ["definitely-not-a-real-binary"], "id": "broken" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    wait_finished(&state, "broken").await;
    let json = body_json(get(app, "/api/v1/jobs/broken").await).await;
    assert_eq!(json["data"]["status"], "failed");
    assert!(json["data"]["exitCode"].is_null());
    assert!(json["data"]["error"].as_str().unwrap().contains("definitely-not-a-real-binary"));
}

#[tokio::test]
async fn empty_command_is_a_validation_error() {
    let (_dir, app, _) = setup();
    let response = post_json(app, "/api/v1/jobs", json!({ "command": [] })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn duplicate_id_conflicts() {
    let (_dir, app, _) = setup();
    let body = json!({ "command": ["true"], "id": "twice" });
    let first = post_json(app.clone(), "/api/v1/jobs", body.clone()).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let second = post_json(app, "/api/v1/jobs", body).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(second).await["code"], "CONFLICT");
}

#[tokio::test]
async fn unknown_job_returns_404() {
    let (_dir, app, _) = setup();
    let response = get(app, "/api/v1/jobs/nope").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Job with id nope not found");
}

#[tokio::test]
async fn list_is_newest_first() {
    let (_dir, app, _) = setup();
    for id in ["one", "two"] {
        post_json(app.clone(), "/api/v1/jobs", json!({ "command": ["true"], "id": id })).await;
    }
    let json = body_json(get(app, "/api/v1/jobs").await).await;
    let ids: Vec<_> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, ["two", "one"]);
}

// ---------------------------------------------------------------------------
// Refinery commands
// ---------------------------------------------------------------------------

#[tokio::test]
async fn import_prepares_output_dir_and_metadata() {
    let (dir, app, state) = setup();
    let response = post_json(
        app,
        "/api/v1/jobs/import",
        json!({ "inputPath": "uploads/sales.csv" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    let id = json["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(json["data"]["metadata"]["kind"], "import");
    assert_eq!(json["data"]["command"][0], "true");
    assert_eq!(json["data"]["command"][1], "import");
    assert!(dir.path().join("outputs").join(&id).is_dir());

    let job = wait_finished(&state, &id).await;
    assert_eq!(job.exit_code, Some(0));
}

#[tokio::test]
async fn contract_with_blank_input_is_rejected() {
    let (_dir, app, _) = setup();
    let response = post_json(app, "/api/v1/jobs/contract", json!({ "inputPath": " " })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Metadata + stages
// ---------------------------------------------------------------------------

#[tokio::test]
async fn metadata_patch_merges_shallowly() {
    let (_dir, app, state) = setup();
    post_json(
        app.clone(),
        "/api/v1/jobs",
        json!({ "command": ["true"], "id": "meta", "metadata": { "kind": "custom", "keep": 1 } }),
    )
    .await;
    wait_finished(&state, "meta").await;

    let response = patch_json(
        app,
        "/api/v1/jobs/meta/metadata",
        json!({ "metadata": { "keep": 2, "added": "yes" } }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["metadata"], json!({ "kind": "custom", "keep": 2, "added": "yes" }));
}

#[tokio::test]
async fn stage_publishes_to_subscribers() {
    let (_dir, app, state) = setup();
    post_json(app.clone(), "/api/v1/jobs", json!({ "command": ["true"], "id": "staged" })).await;
    wait_finished(&state, "staged").await;

    let mut sub = state.registry.subscribe("staged").unwrap();
    let response = post_json(
        app.clone(),
        "/api/v1/jobs/staged/stage",
        json!({ "stage": "profiling", "detail": { "pct": 40 } }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(sub.try_recv().unwrap().event_name(), "stage");

    let missing = post_json(app, "/api/v1/jobs/ghost/stage", json!({ "stage": "x" })).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn artifacts_are_listed_and_downloadable() {
    let (dir, app, state) = setup();
    post_json(
        app.clone(),
        "/api/v1/jobs",
        json!({
            "command": ["sh", "-c", "printf 'a,b\\n1,2\\n' > out.csv"],
            "id": "art",
            "cwd": dir.path().to_string_lossy(),
            "metadata": { "outputPath": "out.csv" },
        }),
    )
    .await;
    wait_finished(&state, "art").await;

    let json = body_json(get(app.clone(), "/api/v1/jobs/art/artifacts").await).await;
    let artifact = &json["data"][0];
    assert_eq!(artifact["id"], "refined-out.csv");
    assert_eq!(artifact["kind"], "refined");
    assert_eq!(artifact["size"], 8);
    let url = artifact["url"].as_str().unwrap().to_string();

    let response = get(app.clone(), &url).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/csv");
    let bytes = http_body_util::BodyExt::collect(response.into_body())
        .await
        .unwrap()
        .to_bytes();
    assert_eq!(&bytes[..], b"a,b\n1,2\n");

    let missing = get(app, "/api/v1/jobs/art/artifacts/refined-other.csv").await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}
