//! Job record, status lifecycle, and submission validation.
//!
//! A [`Job`] is one tracked invocation of an external command. Status only
//! moves forward: `queued -> running -> {succeeded, failed}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::log_buffer::{LogBuffer, LogEntry};
use crate::metadata::Metadata;
use crate::types::{JobId, Timestamp};

/// Maximum length of a caller-supplied job id.
pub const MAX_JOB_ID_LEN: usize = 128;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether `self -> next` is a legal forward transition.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }

    /// Terminal status for a process exit: succeeded iff the code is exactly 0.
    pub fn from_exit_code(exit_code: Option<i32>) -> Self {
        if exit_code == Some(0) {
            Self::Succeeded
        } else {
            Self::Failed
        }
    }
}

// ---------------------------------------------------------------------------
// Submission options
// ---------------------------------------------------------------------------

/// Optional settings accepted alongside a command.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    /// Working directory; defaults to the registry's configured root.
    pub cwd: Option<String>,
    /// Environment overlay merged over the ambient environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Human label; defaults to the space-joined command.
    pub label: Option<String>,
    /// Externally supplied id, used to line the job up with a
    /// pre-created output directory.
    pub id: Option<JobId>,
    /// Initial metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

/// Reject empty commands and blank executables.
pub fn validate_command(command: &[String]) -> Result<(), CoreError> {
    let Some(program) = command.first() else {
        return Err(CoreError::Validation(
            "command must contain at least the executable".to_string(),
        ));
    };
    if program.trim().is_empty() {
        return Err(CoreError::Validation(
            "executable must not be blank".to_string(),
        ));
    }
    if command.iter().any(|arg| arg.contains('\0')) {
        return Err(CoreError::Validation(
            "command arguments must not contain NUL bytes".to_string(),
        ));
    }
    Ok(())
}

/// Validate a caller-supplied job id.
///
/// Ids end up in filesystem paths and URLs, so only `[A-Za-z0-9._-]` is
/// accepted and `.`/`..` are refused.
pub fn validate_job_id(id: &str) -> Result<(), CoreError> {
    if id.is_empty() || id.len() > MAX_JOB_ID_LEN {
        return Err(CoreError::Validation(format!(
            "job id must be 1-{MAX_JOB_ID_LEN} characters"
        )));
    }
    if id == "." || id == ".." {
        return Err(CoreError::Validation(format!("invalid job id '{id}'")));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(CoreError::Validation(format!(
            "job id '{id}' may only contain letters, digits, '.', '_' and '-'"
        )));
    }
    Ok(())
}

/// Generate a fresh job id.
pub fn generate_job_id() -> JobId {
    uuid::Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A tracked command invocation.
///
/// Owned by the registry; everything outside it works on clones.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub label: String,
    pub command: Vec<String>,
    pub cwd: String,
    pub env: BTreeMap<String, String>,
    pub status: JobStatus,
    /// `true` while the job is queued behind the concurrency limit.
    pub awaiting_slot: bool,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub exit_code: Option<i32>,
    pub signal: Option<String>,
    pub error: Option<String>,
    pub pid: Option<u32>,
    #[serde(flatten)]
    pub logs: LogBuffer,
    pub metadata: Metadata,
}

impl Job {
    /// Build a `queued` job from a validated command.
    pub fn new(
        id: JobId,
        command: Vec<String>,
        cwd: String,
        options: JobOptions,
        log_capacity: usize,
    ) -> Self {
        let label = options
            .label
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| command.join(" "));
        Self {
            id,
            label,
            command,
            cwd,
            env: options.env,
            status: JobStatus::Queued,
            awaiting_slot: false,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            exit_code: None,
            signal: None,
            error: None,
            pid: None,
            logs: LogBuffer::new(log_capacity),
            metadata: options.metadata,
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "job {} cannot move from {} to {}",
                self.id,
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        Ok(())
    }

    /// `queued -> running`.
    pub fn mark_running(&mut self, pid: Option<u32>) -> Result<(), CoreError> {
        self.transition(JobStatus::Running)?;
        self.awaiting_slot = false;
        self.pid = pid;
        self.started_at = Some(chrono::Utc::now());
        Ok(())
    }

    /// `running -> {succeeded, failed}`.
    ///
    /// Any `error` forces `failed`, regardless of exit code.
    pub fn mark_finished(
        &mut self,
        exit_code: Option<i32>,
        signal: Option<String>,
        error: Option<String>,
    ) -> Result<JobStatus, CoreError> {
        let next = if error.is_some() {
            JobStatus::Failed
        } else {
            JobStatus::from_exit_code(exit_code)
        };
        self.transition(next)?;
        self.exit_code = exit_code;
        self.signal = signal;
        if error.is_some() {
            self.error = error;
        } else if next == JobStatus::Failed && self.error.is_none() {
            self.error = Some(match (&self.signal, exit_code) {
                (Some(sig), _) => format!("process terminated by signal {sig}"),
                (None, Some(code)) => format!("process exited with code {code}"),
                (None, None) => "process exited abnormally".to_string(),
            });
        }
        self.completed_at = Some(chrono::Utc::now());
        Ok(next)
    }

    pub fn push_log(&mut self, entry: LogEntry) -> bool {
        self.logs.push(entry)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::log_buffer::LogStream;

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn queued_job() -> Job {
        Job::new(
            "j1".into(),
            cmd(&["echo", "hi"]),
            "/tmp".into(),
            JobOptions::default(),
            10,
        )
    }

    #[test]
    fn empty_command_is_rejected() {
        assert_matches!(validate_command(&[]), Err(CoreError::Validation(_)));
        assert_matches!(validate_command(&cmd(&["  "])), Err(CoreError::Validation(_)));
        assert!(validate_command(&cmd(&["echo"])).is_ok());
    }

    #[test]
    fn job_id_rules() {
        assert!(validate_job_id("import-2024_01.a").is_ok());
        assert_matches!(validate_job_id(""), Err(CoreError::Validation(_)));
        assert_matches!(validate_job_id(".."), Err(CoreError::Validation(_)));
        assert_matches!(validate_job_id("a/b"), Err(CoreError::Validation(_)));
        assert_matches!(
            validate_job_id(&"x".repeat(MAX_JOB_ID_LEN + 1)),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn label_defaults_to_joined_command() {
        let job = queued_job();
        assert_eq!(job.label, "echo hi");
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[test]
    fn status_only_moves_forward() {
        let mut job = queued_job();
        assert_matches!(
            job.mark_finished(Some(0), None, None),
            Err(CoreError::Conflict(_))
        );
        job.mark_running(Some(42)).unwrap();
        assert_matches!(job.mark_running(None), Err(CoreError::Conflict(_)));
        assert_eq!(job.mark_finished(Some(0), None, None).unwrap(), JobStatus::Succeeded);
        assert_matches!(
            job.mark_finished(Some(1), None, None),
            Err(CoreError::Conflict(_))
        );
        assert_eq!(job.status, JobStatus::Succeeded);
    }

    #[test]
    fn nonzero_exit_fails_with_message() {
        let mut job = queued_job();
        job.mark_running(None).unwrap();
        assert_eq!(job.mark_finished(Some(3), None, None).unwrap(), JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("process exited with code 3"));
    }

    #[test]
    fn spawn_error_fails_without_exit_code() {
        let mut job = queued_job();
        job.mark_running(None).unwrap();
        let status = job
            .mark_finished(None, None, Some("No such file or directory".into()))
            .unwrap();
        assert_eq!(status, JobStatus::Failed);
        assert_eq!(job.exit_code, None);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn serialized_job_carries_logs_inline() {
        let mut job = queued_job();
        job.push_log(LogEntry::new(LogStream::Stdout, "hello"));
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["status"], "queued");
        assert_eq!(json["logs"][0]["message"], "hello");
        assert_eq!(json["logsTruncated"], false);
        assert!(json["exitCode"].is_null());
        assert_eq!(json["awaitingSlot"], false);
    }
}
