//! Refinery job event bus.
//!
//! - [`JobEvent`] / [`EventPayload`]: the lifecycle notifications a job
//!   emits while it runs.
//! - [`EventBus`]: in-process publish/subscribe keyed by job id, plus a
//!   wildcard channel that sees every job.
//! - [`Subscription`]: receiving half of a subscription; unsubscribing is
//!   idempotent and also happens on drop.

pub mod bus;
pub mod event;

pub use bus::{EventBus, Subscription, DEFAULT_MAX_SUBSCRIBERS_PER_JOB};
pub use event::{EventPayload, JobEvent};
