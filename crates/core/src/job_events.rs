//! Event names used on the live job stream.
//!
//! These double as the `type` tag of serialized job events and as the
//! `event:` line of server-sent-event frames.

/// Job accepted and waiting to spawn.
pub const EVENT_QUEUED: &str = "queued";

/// Process spawned (or spawn attempted) and the job is running.
pub const EVENT_STARTED: &str = "started";

/// One line of process output.
pub const EVENT_LOG: &str = "log";

/// The job could not run (spawn failure, pipe failure).
pub const EVENT_ERROR: &str = "error";

/// Terminal event, published exactly once per job.
pub const EVENT_FINISHED: &str = "finished";

/// Downloadable outputs were discovered for the job.
pub const EVENT_ARTIFACT_READY: &str = "artifact-ready";

/// Progress marker from a multi-stage workflow.
pub const EVENT_STAGE: &str = "stage";

/// An uploaded file was accepted for the job.
pub const EVENT_FILE_ACCEPTED: &str = "file-accepted";

/// Full job state sent once when an observer connects.
pub const EVENT_SNAPSHOT: &str = "snapshot";

/// Terminal frame sent when an observer asks for an unknown job.
pub const EVENT_NOT_FOUND: &str = "not-found";
