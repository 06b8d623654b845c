#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use refinery_api::config::{LogFormat, ServerConfig};
use refinery_api::router::build_app_router;
use refinery_api::state::AppState;
use refinery_events::EventBus;
use refinery_jobs::{JobRegistry, JobsConfig};
use tower::ServiceExt;

/// Build a test `ServerConfig` rooted at `dir`.
///
/// The refinery CLI is replaced by `true`, so import/refine/contract jobs
/// succeed without doing anything.
pub fn test_config(dir: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        keep_alive_secs: 25,
        log_format: LogFormat::Pretty,
        jobs: JobsConfig {
            working_dir: dir.to_path_buf(),
            output_root: dir.join("outputs"),
            cli_program: "true".to_string(),
            ..Default::default()
        },
    }
}

/// Build the production router over fresh state.
///
/// The returned [`AppState`] shares the registry with the router so tests
/// can inspect it or wait on jobs directly.
pub fn build_test_app(config: ServerConfig) -> (Router, AppState) {
    let bus = Arc::new(EventBus::new(config.jobs.max_subscribers_per_job));
    let registry = JobRegistry::new(&config.jobs, bus);
    let state = AppState::new(config.clone(), registry);
    (build_app_router(state.clone(), &config), state)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Body::empty()).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Body::from(body.to_string())).await
}

pub async fn patch_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::PATCH, uri, Body::from(body.to_string())).await
}

async fn send(app: Router, method: Method, uri: &str, body: Body) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Read an SSE body until `needle` shows up, returning everything read.
pub async fn read_sse_until(body: &mut Body, needle: &str) -> String {
    let mut text = String::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        while !text.contains(needle) {
            let Some(frame) = body.frame().await else {
                break;
            };
            if let Ok(data) = frame.unwrap().into_data() {
                text.push_str(&String::from_utf8_lossy(&data));
            }
        }
    })
    .await
    .expect("SSE data in time");
    text
}

/// Wait until the job reaches a terminal status and return it.
pub async fn wait_finished(state: &AppState, id: &str) -> refinery_core::job::Job {
    let (job, mut sub) = state.registry.watch(id).unwrap();
    if !job.status.is_terminal() {
        tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(event) = sub.recv().await {
                if event.is_finished() {
                    break;
                }
            }
        })
        .await
        .expect("job finished in time");
    }
    state.registry.get(id).unwrap()
}
