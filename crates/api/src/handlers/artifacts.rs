//! Handlers for job artifacts.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio_util::io::ReaderStream;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/jobs/{id}/artifacts
///
/// Resolve what a finished job left on disk. A non-empty result is also
/// recorded in the job's metadata and published as `artifact-ready`.
/// Unfinished jobs have no artifacts yet.
pub async fn list_artifacts(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let artifacts = state.registry.resolve_artifacts(&job_id, true).await?;
    Ok(Json(DataResponse { data: artifacts }))
}

/// GET /api/v1/jobs/{id}/artifacts/{artifact_id}
///
/// Stream the artifact's file as an attachment.
pub async fn download_artifact(
    State(state): State<AppState>,
    Path((job_id, artifact_id)): Path<(String, String)>,
) -> AppResult<Response> {
    let resolved = state
        .registry
        .locate_artifact(&job_id, &artifact_id)
        .await?;

    let file = tokio::fs::File::open(&resolved.path)
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    let stream = ReaderStream::new(file);

    tracing::debug!(job_id = %job_id, artifact_id = %artifact_id, "Serving artifact");

    let artifact = resolved.artifact;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type_for(&artifact.name).to_string()),
            (header::CONTENT_LENGTH, artifact.size.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", artifact.name.replace('"', "")),
            ),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

fn content_type_for(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "json" => "application/json",
        "yaml" | "yml" => "application/yaml",
        "csv" => "text/csv",
        "txt" | "log" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type_for("profile.json"), "application/json");
        assert_eq!(content_type_for("contract.YAML"), "application/yaml");
        assert_eq!(content_type_for("a.csv"), "text/csv");
        assert_eq!(content_type_for("refined.parquet"), "application/octet-stream");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
