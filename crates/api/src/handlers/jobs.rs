//! Handlers for the `/jobs` resource.
//!
//! Submission only fails for malformed input; everything that goes wrong
//! while the process runs is reported on the job's own event stream.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use refinery_core::error::CoreError;
use refinery_core::job::{Job, JobOptions};
use refinery_core::metadata::Metadata;
use refinery_jobs::commands::{ContractRequest, ImportRequest, PreparedJob, RefineRequest};
use serde::Deserialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Body of `POST /jobs`: the command plus optional job settings.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub command: Vec<String>,
    #[serde(flatten)]
    pub options: JobOptions,
}

/// Body of `PATCH /jobs/{id}/metadata`.
#[derive(Debug, Deserialize)]
pub struct MergeMetadataRequest {
    pub metadata: Metadata,
    /// Also resolve artifacts and publish `artifact-ready` when the job
    /// has finished.
    #[serde(default)]
    pub announce: bool,
}

/// Body of `POST /jobs/{id}/stage`.
#[derive(Debug, Deserialize)]
pub struct StageRequest {
    pub stage: String,
    pub detail: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Start an arbitrary command. Returns 201 with the job in `queued` state.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<SubmitJobRequest>,
) -> AppResult<impl IntoResponse> {
    let job = state.registry.submit(input.command, input.options)?;
    Ok(created(job))
}

/// POST /api/v1/jobs/import
pub async fn submit_import(
    State(state): State<AppState>,
    Json(input): Json<ImportRequest>,
) -> AppResult<impl IntoResponse> {
    let prepared = state.commands.import(input).await?;
    submit_prepared(&state, prepared)
}

/// POST /api/v1/jobs/refine
pub async fn submit_refine(
    State(state): State<AppState>,
    Json(input): Json<RefineRequest>,
) -> AppResult<impl IntoResponse> {
    let prepared = state.commands.refine(input).await?;
    submit_prepared(&state, prepared)
}

/// POST /api/v1/jobs/contract
pub async fn submit_contract(
    State(state): State<AppState>,
    Json(input): Json<ContractRequest>,
) -> AppResult<impl IntoResponse> {
    let prepared = state.commands.contract(input).await?;
    submit_prepared(&state, prepared)
}

fn submit_prepared(state: &AppState, prepared: PreparedJob) -> AppResult<impl IntoResponse> {
    let job = state.registry.submit(prepared.command, prepared.options)?;
    Ok(created(job))
}

fn created(job: Job) -> impl IntoResponse {
    (StatusCode::CREATED, Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
///
/// All jobs, newest first.
pub async fn list_jobs(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: state.registry.list(),
    }))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let job = state.registry.get(&job_id).ok_or(CoreError::NotFound {
        entity: "Job",
        id: job_id,
    })?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Metadata and stages
// ---------------------------------------------------------------------------

/// PATCH /api/v1/jobs/{id}/metadata
///
/// Shallow-merge the given keys into the job's metadata and return the
/// updated job. Publishes nothing unless `announce` is set.
pub async fn merge_metadata(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(input): Json<MergeMetadataRequest>,
) -> AppResult<impl IntoResponse> {
    let mut job = state.registry.merge_metadata(&job_id, input.metadata)?;

    if input.announce {
        let artifacts = state.registry.resolve_artifacts(&job_id, true).await?;
        if !artifacts.is_empty() {
            job = state.registry.get(&job_id).unwrap_or(job);
        }
    }

    tracing::info!(job_id = %job_id, announce = input.announce, "Job metadata updated");
    Ok(Json(DataResponse { data: job }))
}

/// POST /api/v1/jobs/{id}/stage
///
/// Publish a `stage` event on the job's channel. Returns 204.
pub async fn publish_stage(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Json(input): Json<StageRequest>,
) -> AppResult<impl IntoResponse> {
    let stage = input.stage.trim();
    if stage.is_empty() {
        return Err(CoreError::Validation("stage must not be empty".into()).into());
    }
    state.registry.publish_stage(&job_id, stage, input.detail)?;
    Ok(StatusCode::NO_CONTENT)
}
