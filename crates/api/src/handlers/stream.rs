//! Live Channel endpoints (Server-Sent Events).

use axum::extract::{Path, State};
use axum::response::IntoResponse;

use crate::error::AppResult;
use crate::live::{sse, LiveChannel};
use crate::state::AppState;

/// GET /api/v1/jobs/{id}/stream
///
/// Snapshot of the job followed by its live events. Unknown jobs get a
/// single `not-found` event. Returns 503 when the job already has the
/// maximum number of observers.
pub async fn stream_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let channel = LiveChannel::open(&state.registry, &job_id, state.config.keep_alive())?;
    tracing::info!(job_id = %job_id, "Live channel connected");
    Ok(sse::into_sse(channel, state.shutdown.clone()))
}

/// GET /api/v1/jobs/events
///
/// Events of every job, without snapshots.
pub async fn stream_all(State(state): State<AppState>) -> impl IntoResponse {
    let channel = LiveChannel::open_all(&state.registry, state.config.keep_alive());
    tracing::info!("Activity stream connected");
    sse::into_sse(channel, state.shutdown.clone())
}
