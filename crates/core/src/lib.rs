pub mod artifact;
pub mod error;
pub mod job;
pub mod job_events;
pub mod log_buffer;
pub mod metadata;
pub mod types;
