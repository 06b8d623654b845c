//! Job lifecycle events.

use refinery_core::artifact::Artifact;
use refinery_core::job::{Job, JobStatus};
use refinery_core::job_events::{
    EVENT_ARTIFACT_READY, EVENT_ERROR, EVENT_FILE_ACCEPTED, EVENT_FINISHED, EVENT_LOG,
    EVENT_QUEUED, EVENT_STAGE, EVENT_STARTED,
};
use refinery_core::log_buffer::LogEntry;
use refinery_core::types::{JobId, Timestamp};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// One notification about one job.
///
/// Serializes flat: `{ "jobId": ..., "timestamp": ..., "type": "log", ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    pub job_id: JobId,
    pub timestamp: Timestamp,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Type-specific part of a [`JobEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum EventPayload {
    Queued {
        label: String,
        command: Vec<String>,
    },
    Started {
        pid: Option<u32>,
    },
    Log {
        entry: LogEntry,
    },
    Error {
        message: String,
    },
    Finished {
        status: JobStatus,
        exit_code: Option<i32>,
        signal: Option<String>,
        error: Option<String>,
    },
    ArtifactReady {
        artifacts: Vec<Artifact>,
    },
    Stage {
        stage: String,
        #[serde(default)]
        detail: Option<serde_json::Value>,
    },
    FileAccepted {
        file_name: String,
        size: u64,
        path: Option<String>,
    },
}

impl JobEvent {
    /// Create an event stamped with the current time.
    pub fn new(job_id: impl Into<JobId>, payload: EventPayload) -> Self {
        Self {
            job_id: job_id.into(),
            timestamp: chrono::Utc::now(),
            payload,
        }
    }

    pub fn queued(job: &Job) -> Self {
        Self::new(
            job.id.clone(),
            EventPayload::Queued {
                label: job.label.clone(),
                command: job.command.clone(),
            },
        )
    }

    /// The `finished` event matching a job's terminal state.
    pub fn finished(job: &Job) -> Self {
        Self::new(
            job.id.clone(),
            EventPayload::Finished {
                status: job.status,
                exit_code: job.exit_code,
                signal: job.signal.clone(),
                error: job.error.clone(),
            },
        )
    }

    /// Wire name of the event (`log`, `finished`, `artifact-ready`, ...).
    pub fn event_name(&self) -> &'static str {
        self.payload.event_name()
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.payload, EventPayload::Finished { .. })
    }
}

impl EventPayload {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Queued { .. } => EVENT_QUEUED,
            Self::Started { .. } => EVENT_STARTED,
            Self::Log { .. } => EVENT_LOG,
            Self::Error { .. } => EVENT_ERROR,
            Self::Finished { .. } => EVENT_FINISHED,
            Self::ArtifactReady { .. } => EVENT_ARTIFACT_READY,
            Self::Stage { .. } => EVENT_STAGE,
            Self::FileAccepted { .. } => EVENT_FILE_ACCEPTED,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use refinery_core::log_buffer::LogStream;

    use super::*;

    #[test]
    fn finished_serializes_camel_case_fields() {
        let event = JobEvent::new(
            "job-1",
            EventPayload::Finished {
                status: JobStatus::Failed,
                exit_code: Some(2),
                signal: None,
                error: Some("process exited with code 2".into()),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "finished");
        assert_eq!(json["jobId"], "job-1");
        assert_eq!(json["exitCode"], 2);
        assert_eq!(json["status"], "failed");
        assert!(json["signal"].is_null());
    }

    #[test]
    fn kebab_case_type_tags_match_event_names() {
        let ready = JobEvent::new("j", EventPayload::ArtifactReady { artifacts: vec![] });
        assert_eq!(serde_json::to_value(&ready).unwrap()["type"], "artifact-ready");
        assert_eq!(ready.event_name(), "artifact-ready");

        let accepted = JobEvent::new(
            "j",
            EventPayload::FileAccepted {
                file_name: "in.csv".into(),
                size: 12,
                path: None,
            },
        );
        let json = serde_json::to_value(&accepted).unwrap();
        assert_eq!(json["type"], "file-accepted");
        assert_eq!(json["fileName"], "in.csv");
    }

    #[test]
    fn log_event_round_trips() {
        let event = JobEvent::new(
            "j",
            EventPayload::Log {
                entry: LogEntry::new(LogStream::Stderr, "warning: x"),
            },
        );
        let text = serde_json::to_string(&event).unwrap();
        let back: JobEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back, event);
    }
}
