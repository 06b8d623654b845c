/// Jobs are keyed by an opaque string id: either caller-supplied (to line
/// up with a pre-created output directory) or a generated UUID v4.
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
