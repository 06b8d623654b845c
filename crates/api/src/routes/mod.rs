pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /jobs                                      list, submit raw command
/// /jobs/import                               submit refinery import
/// /jobs/refine                               submit refinery refine
/// /jobs/contract                             submit contract emission
/// /jobs/events                               every job's events (SSE)
/// /jobs/{id}                                 get
/// /jobs/{id}/metadata                        shallow merge (PATCH)
/// /jobs/{id}/stage                           publish stage event (POST)
/// /jobs/{id}/stream                          Live Channel (SSE)
/// /jobs/{id}/artifacts                       resolve artifacts
/// /jobs/{id}/artifacts/{artifact_id}         download
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/jobs", jobs::router())
}
