//! Refinery job engine.
//!
//! - [`JobRegistry`]: owns every job record, spawns its process, and
//!   publishes lifecycle events on the shared [`EventBus`](refinery_events::EventBus).
//! - [`artifacts`]: pull-based discovery of the files a finished job
//!   produced.
//! - [`CompletionHandler`]: background task that resolves artifacts as
//!   soon as a job finishes and announces them.
//! - [`commands`]: argument builders for the refinery CLI (import, refine,
//!   contract emission).

pub mod artifacts;
pub mod commands;
pub mod completion;
pub mod config;
mod executor;
pub mod registry;

pub use completion::CompletionHandler;
pub use config::JobsConfig;
pub use registry::JobRegistry;
