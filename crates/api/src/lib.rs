//! HTTP surface of the refinery console.
//!
//! The binary in `main.rs` and the integration tests both build the app
//! from these modules: configuration, shared state, error mapping, routes,
//! and the Live Channel that streams job events over SSE.

pub mod config;
pub mod error;
pub mod handlers;
pub mod live;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
