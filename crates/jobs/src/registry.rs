//! Job registry: the single owner of job records.
//!
//! Every state change of a job and the event announcing it happen under
//! one lock, and [`JobRegistry::watch`] takes its snapshot and registers
//! its subscription under that same lock. An observer therefore sees each
//! change either in its snapshot or as a live event, never both and never
//! neither.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use refinery_core::artifact::Artifact;
use refinery_core::error::CoreError;
use refinery_core::job::{generate_job_id, validate_command, validate_job_id, Job, JobOptions};
use refinery_core::log_buffer::{LogEntry, LogStream};
use refinery_core::metadata::{merge_shallow, Metadata, META_ARTIFACTS};
use refinery_core::types::JobId;
use refinery_events::{EventBus, EventPayload, JobEvent, Subscription};
use tokio::sync::Semaphore;

use crate::artifacts::{self, ResolvedArtifact};
use crate::config::JobsConfig;
use crate::executor::{self, LaunchSpec, Slot};

/// Owns all jobs of one console instance and the bus their events go to.
///
/// Created once via [`JobRegistry::new`] and shared as `Arc<JobRegistry>`.
pub struct JobRegistry {
    jobs: Mutex<IndexMap<JobId, Job>>,
    bus: Arc<EventBus>,
    slots: Option<Arc<Semaphore>>,
    log_capacity: usize,
    working_dir: String,
}

impl JobRegistry {
    pub fn new(config: &JobsConfig, bus: Arc<EventBus>) -> Arc<Self> {
        let slots = (config.max_concurrent > 0)
            .then(|| Arc::new(Semaphore::new(config.max_concurrent)));
        Arc::new(Self {
            jobs: Mutex::new(IndexMap::new()),
            bus,
            slots,
            log_capacity: config.log_capacity,
            working_dir: config.working_dir.to_string_lossy().into_owned(),
        })
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Register a job and start executing it.
    ///
    /// Returns the job in `queued` state. Only malformed input (empty
    /// command, bad or duplicate id) is an error here; spawn failures show
    /// up later on the job's own event stream. Must be called from within
    /// a Tokio runtime.
    pub fn submit(
        self: &Arc<Self>,
        command: Vec<String>,
        options: JobOptions,
    ) -> Result<Job, CoreError> {
        validate_command(&command)?;
        let id = match options.id.as_deref() {
            Some(id) => {
                validate_job_id(id)?;
                id.to_string()
            }
            None => generate_job_id(),
        };
        let cwd = options
            .cwd
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| self.working_dir.clone());

        let job = {
            let mut jobs = self.jobs.lock();
            if jobs.contains_key(&id) {
                return Err(CoreError::Conflict(format!("job {id} already exists")));
            }
            let slot = self.take_slot();
            let mut job = Job::new(id.clone(), command, cwd, options, self.log_capacity);
            job.awaiting_slot = matches!(slot, Slot::Pending(_));
            jobs.insert(id.clone(), job.clone());
            self.bus.publish(JobEvent::queued(&job));
            tokio::spawn(executor::run(Arc::clone(self), id, slot));
            job
        };

        tracing::info!(
            job_id = %job.id,
            label = %job.label,
            awaiting_slot = job.awaiting_slot,
            "Job submitted"
        );
        Ok(job)
    }

    fn take_slot(&self) -> Slot {
        match &self.slots {
            None => Slot::Unlimited,
            Some(semaphore) => match Arc::clone(semaphore).try_acquire_owned() {
                Ok(permit) => Slot::Ready(permit),
                Err(_) => Slot::Pending(Arc::clone(semaphore)),
            },
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get(&self, id: &str) -> Option<Job> {
        self.jobs.lock().get(id).cloned()
    }

    /// All jobs, newest first; jobs created at the same instant keep the
    /// later-submitted one first.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.lock().values().rev().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    /// Snapshot a job and subscribe to its later events in one step.
    pub fn watch(&self, id: &str) -> Result<(Job, Subscription), CoreError> {
        let jobs = self.jobs.lock();
        let job = jobs.get(id).cloned().ok_or_else(|| not_found(id))?;
        let subscription = self.bus.subscribe(id)?;
        Ok((job, subscription))
    }

    /// Subscribe to a job's events, whether or not it exists yet.
    pub fn subscribe(&self, id: &str) -> Result<Subscription, CoreError> {
        self.bus.subscribe(id)
    }

    /// Subscribe to the events of every job.
    pub fn subscribe_all(&self) -> Subscription {
        self.bus.subscribe_all()
    }

    // -----------------------------------------------------------------------
    // Metadata and side-channel events
    // -----------------------------------------------------------------------

    /// Shallow-merge `partial` into the job's metadata. Publishes nothing.
    pub fn merge_metadata(&self, id: &str, partial: Metadata) -> Result<Job, CoreError> {
        let mut jobs = self.jobs.lock();
        let job = jobs.get_mut(id).ok_or_else(|| not_found(id))?;
        let keys = merge_shallow(&mut job.metadata, partial);
        tracing::debug!(job_id = id, keys = ?keys, "Job metadata merged");
        Ok(job.clone())
    }

    /// Publish a `stage` event for an existing job.
    pub fn publish_stage(
        &self,
        id: &str,
        stage: impl Into<String>,
        detail: Option<serde_json::Value>,
    ) -> Result<(), CoreError> {
        self.publish_for(
            id,
            EventPayload::Stage {
                stage: stage.into(),
                detail,
            },
        )
    }

    /// Publish a `file-accepted` event for an existing job.
    pub fn publish_file_accepted(
        &self,
        id: &str,
        file_name: impl Into<String>,
        size: u64,
        path: Option<String>,
    ) -> Result<(), CoreError> {
        self.publish_for(
            id,
            EventPayload::FileAccepted {
                file_name: file_name.into(),
                size,
                path,
            },
        )
    }

    /// Record `artifacts` in the job's metadata and publish `artifact-ready`.
    pub fn announce_artifacts(
        &self,
        id: &str,
        artifacts: Vec<Artifact>,
    ) -> Result<(), CoreError> {
        let listed = serde_json::to_value(&artifacts)
            .map_err(|e| CoreError::Internal(format!("failed to encode artifacts: {e}")))?;
        let mut jobs = self.jobs.lock();
        let job = jobs.get_mut(id).ok_or_else(|| not_found(id))?;
        let mut partial = Metadata::new();
        partial.insert(META_ARTIFACTS.to_string(), listed);
        merge_shallow(&mut job.metadata, partial);
        tracing::info!(job_id = id, count = artifacts.len(), "Artifacts ready");
        self.bus
            .publish(JobEvent::new(id, EventPayload::ArtifactReady { artifacts }));
        Ok(())
    }

    fn publish_for(&self, id: &str, payload: EventPayload) -> Result<(), CoreError> {
        let jobs = self.jobs.lock();
        if !jobs.contains_key(id) {
            return Err(not_found(id));
        }
        self.bus.publish(JobEvent::new(id, payload));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Artifacts
    // -----------------------------------------------------------------------

    /// Discover the artifacts of a finished job.
    ///
    /// Jobs that have not reached a terminal status have none yet. With
    /// `announce`, a non-empty result is also recorded and published as
    /// `artifact-ready`.
    pub async fn resolve_artifacts(
        &self,
        id: &str,
        announce: bool,
    ) -> Result<Vec<Artifact>, CoreError> {
        let job = self.get(id).ok_or_else(|| not_found(id))?;
        if !job.status.is_terminal() {
            return Ok(Vec::new());
        }
        let artifacts: Vec<Artifact> = artifacts::resolve(&job)
            .await
            .into_iter()
            .map(|r| r.artifact)
            .collect();
        if announce && !artifacts.is_empty() {
            self.announce_artifacts(id, artifacts.clone())?;
        }
        Ok(artifacts)
    }

    /// Find one artifact of a finished job together with its file path.
    pub async fn locate_artifact(
        &self,
        id: &str,
        artifact_id: &str,
    ) -> Result<ResolvedArtifact, CoreError> {
        let job = self.get(id).ok_or_else(|| not_found(id))?;
        if !job.status.is_terminal() {
            return Err(CoreError::NotFound {
                entity: "Artifact",
                id: artifact_id.to_string(),
            });
        }
        artifacts::locate(&job, artifact_id)
            .await
            .ok_or_else(|| CoreError::NotFound {
                entity: "Artifact",
                id: artifact_id.to_string(),
            })
    }

    // -----------------------------------------------------------------------
    // Executor callbacks
    // -----------------------------------------------------------------------

    pub(crate) fn launch_spec(&self, id: &str) -> Option<LaunchSpec> {
        self.jobs.lock().get(id).map(|job| LaunchSpec {
            command: job.command.clone(),
            cwd: job.cwd.clone(),
            env: job.env.clone(),
        })
    }

    pub(crate) fn mark_started(&self, id: &str, pid: Option<u32>) {
        self.update(id, |job, bus| {
            job.mark_running(pid)?;
            bus.publish(JobEvent::new(id, EventPayload::Started { pid }));
            tracing::info!(job_id = id, pid = ?pid, "Job started");
            Ok(())
        });
    }

    pub(crate) fn append_log(&self, id: &str, stream: LogStream, message: String) {
        self.update(id, |job, bus| {
            let entry = LogEntry::new(stream, message);
            job.push_log(entry.clone());
            bus.publish(JobEvent::new(id, EventPayload::Log { entry }));
            Ok(())
        });
    }

    pub(crate) fn report_error(&self, id: &str, message: &str) {
        self.update(id, |job, bus| {
            job.push_log(LogEntry::new(LogStream::Error, message));
            bus.publish(JobEvent::new(
                id,
                EventPayload::Error {
                    message: message.to_string(),
                },
            ));
            Ok(())
        });
    }

    pub(crate) fn finish(
        &self,
        id: &str,
        exit_code: Option<i32>,
        signal: Option<String>,
        error: Option<String>,
    ) {
        self.update(id, |job, bus| {
            let status = job.mark_finished(exit_code, signal, error)?;
            bus.publish(JobEvent::finished(job));
            tracing::info!(
                job_id = id,
                status = status.as_str(),
                exit_code = ?job.exit_code,
                signal = ?job.signal,
                "Job finished"
            );
            Ok(())
        });
    }

    /// Apply `f` to a job under the registry lock.
    fn update<F>(&self, id: &str, f: F)
    where
        F: FnOnce(&mut Job, &EventBus) -> Result<(), CoreError>,
    {
        let mut jobs = self.jobs.lock();
        let Some(job) = jobs.get_mut(id) else {
            tracing::error!(job_id = id, "Update for unknown job");
            return;
        };
        if let Err(e) = f(job, &self.bus) {
            tracing::error!(job_id = id, error = %e, "Rejected job update");
        }
    }
}

fn not_found(id: &str) -> CoreError {
    CoreError::NotFound {
        entity: "Job",
        id: id.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
