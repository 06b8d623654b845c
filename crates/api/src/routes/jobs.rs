//! Route definitions for the `/jobs` resource.

use axum::routing::{get, patch, post};
use axum::Router;

use crate::handlers::{artifacts, jobs, stream};
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /                                -> list_jobs
/// POST   /                                -> submit_job
/// POST   /import                          -> submit_import
/// POST   /refine                          -> submit_refine
/// POST   /contract                        -> submit_contract
/// GET    /events                          -> stream_all
/// GET    /{id}                            -> get_job
/// PATCH  /{id}/metadata                   -> merge_metadata
/// POST   /{id}/stage                      -> publish_stage
/// GET    /{id}/stream                     -> stream_job
/// GET    /{id}/artifacts                  -> list_artifacts
/// GET    /{id}/artifacts/{artifact_id}    -> download_artifact
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(jobs::list_jobs).post(jobs::submit_job))
        .route("/import", post(jobs::submit_import))
        .route("/refine", post(jobs::submit_refine))
        .route("/contract", post(jobs::submit_contract))
        .route("/events", get(stream::stream_all))
        .route("/{id}", get(jobs::get_job))
        .route("/{id}/metadata", patch(jobs::merge_metadata))
        .route("/{id}/stage", post(jobs::publish_stage))
        .route("/{id}/stream", get(stream::stream_job))
        .route("/{id}/artifacts", get(artifacts::list_artifacts))
        .route(
            "/{id}/artifacts/{artifact_id}",
            get(artifacts::download_artifact),
        )
}
