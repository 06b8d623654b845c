//! Server-Sent Events framing for [`LiveFrame`]s.
//!
//! | Frame      | SSE                                        |
//! |------------|--------------------------------------------|
//! | snapshot   | `event: snapshot`, job JSON                |
//! | event      | `event: <type>`, event JSON                |
//! | keep-alive | comment line `: keep-alive`                |
//! | not-found  | `event: not-found`, `{"jobId"}`, then EOF  |

use axum::response::sse::{Event, Sse};
use futures::stream::{self, Stream, StreamExt};
use refinery_core::job_events::{EVENT_NOT_FOUND, EVENT_SNAPSHOT};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::channel::{LiveChannel, LiveFrame};

/// Encode one frame as an SSE event.
pub fn frame_to_event(frame: LiveFrame) -> Result<Event, axum::Error> {
    match frame {
        LiveFrame::Snapshot(job) => Event::default().event(EVENT_SNAPSHOT).json_data(&*job),
        LiveFrame::Event(event) => Event::default().event(event.event_name()).json_data(&event),
        LiveFrame::KeepAlive => Ok(Event::default().comment("keep-alive")),
        LiveFrame::NotFound(job_id) => Event::default()
            .event(EVENT_NOT_FOUND)
            .json_data(json!({ "jobId": job_id })),
    }
}

/// Turn a channel into an SSE response body.
///
/// The channel lives inside the stream, so a client disconnect drops it
/// and releases its subscription. The stream also ends when `shutdown`
/// is cancelled, letting graceful shutdown complete.
pub fn into_sse(
    channel: LiveChannel,
    shutdown: CancellationToken,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = stream::unfold(channel, |mut channel| async move {
        let frame = channel.next_frame().await?;
        Some((frame_to_event(frame), channel))
    })
    .take_until(shutdown.cancelled_owned());
    Sse::new(stream)
}
