//! Live Channel: the gateway between one HTTP observer and the event bus.
//!
//! - [`LiveChannel`]: per-connection state machine. Sends a snapshot of
//!   the job first, then its live events, with keep-alives while idle.
//! - [`sse`]: maps [`LiveFrame`]s onto Server-Sent Events.

pub mod channel;
pub mod sse;

pub use channel::{ChannelState, LiveChannel, LiveFrame};
