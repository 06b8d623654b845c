use std::time::Duration;

use refinery_core::error::CoreError;
use refinery_core::job::Job;
use refinery_core::types::JobId;
use refinery_events::{JobEvent, Subscription};
use refinery_jobs::JobRegistry;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Lifecycle of a Live Channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Opened; nothing delivered yet.
    Connecting,
    /// The job snapshot has been delivered.
    SnapshotSent,
    /// Forwarding live events.
    Streaming,
    /// Subscription released and keep-alive timer stopped.
    Closed,
}

/// One unit delivered to the observer.
#[derive(Debug, Clone)]
pub enum LiveFrame {
    /// Full job state at the moment the channel was opened.
    Snapshot(Box<Job>),
    /// A live event published after the snapshot.
    Event(JobEvent),
    /// Idle marker so intermediaries keep the connection open.
    KeepAlive,
    /// The requested job does not exist; the channel closes after this.
    NotFound(JobId),
}

/// Per-observer stream of [`LiveFrame`]s.
///
/// The snapshot and the subscription are taken atomically through
/// [`JobRegistry::watch`], so every change to the job shows up exactly
/// once: in the snapshot or as a later event. The channel stays open after
/// `finished` so that `artifact-ready` still reaches the observer.
///
/// Closing, explicitly or by dropping the channel, releases the
/// subscription and the keep-alive timer together.
#[derive(Debug)]
pub struct LiveChannel {
    target: Option<JobId>,
    state: ChannelState,
    pending: Option<LiveFrame>,
    subscription: Option<Subscription>,
    keep_alive: Option<Interval>,
}

impl LiveChannel {
    /// Open a channel for one job.
    ///
    /// An unknown job is not an error: the channel yields a single
    /// [`LiveFrame::NotFound`] and ends. A full subscriber table is.
    pub fn open(
        registry: &JobRegistry,
        job_id: &str,
        keep_alive: Duration,
    ) -> Result<Self, CoreError> {
        match registry.watch(job_id) {
            Ok((job, subscription)) => {
                tracing::debug!(job_id, status = job.status.as_str(), "Live channel opened");
                Ok(Self::new(
                    Some(job_id.to_string()),
                    Some(LiveFrame::Snapshot(Box::new(job))),
                    Some(subscription),
                    keep_alive,
                ))
            }
            Err(CoreError::NotFound { .. }) => {
                tracing::debug!(job_id, "Live channel requested for unknown job");
                Ok(Self::new(
                    Some(job_id.to_string()),
                    Some(LiveFrame::NotFound(job_id.to_string())),
                    None,
                    keep_alive,
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Open a channel that carries every job's events, without a snapshot.
    pub fn open_all(registry: &JobRegistry, keep_alive: Duration) -> Self {
        let subscription = registry.subscribe_all();
        let mut channel = Self::new(None, None, Some(subscription), keep_alive);
        channel.state = ChannelState::Streaming;
        channel
    }

    fn new(
        target: Option<JobId>,
        pending: Option<LiveFrame>,
        subscription: Option<Subscription>,
        keep_alive: Duration,
    ) -> Self {
        let keep_alive = subscription.as_ref().map(|_| {
            let mut timer = interval_at(Instant::now() + keep_alive, keep_alive);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            timer
        });
        Self {
            target,
            state: ChannelState::Connecting,
            pending,
            subscription,
            keep_alive,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// The job this channel follows; `None` for the all-jobs channel.
    pub fn job_id(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Wait for the next frame. `None` once the channel is closed.
    pub async fn next_frame(&mut self) -> Option<LiveFrame> {
        if self.state == ChannelState::Closed {
            return None;
        }

        match self.pending.take() {
            Some(LiveFrame::NotFound(id)) => {
                self.close();
                return Some(LiveFrame::NotFound(id));
            }
            Some(frame) => {
                self.state = ChannelState::SnapshotSent;
                return Some(frame);
            }
            None => {}
        }

        let (Some(subscription), Some(timer)) =
            (self.subscription.as_mut(), self.keep_alive.as_mut())
        else {
            self.close();
            return None;
        };
        self.state = ChannelState::Streaming;

        let frame = tokio::select! {
            event = subscription.recv() => event.map(LiveFrame::Event),
            _ = timer.tick() => Some(LiveFrame::KeepAlive),
        };

        match frame {
            Some(LiveFrame::Event(event)) => {
                // Keep-alives are only needed while idle.
                if let Some(timer) = self.keep_alive.as_mut() {
                    timer.reset();
                }
                Some(LiveFrame::Event(event))
            }
            Some(frame) => Some(frame),
            None => {
                self.close();
                None
            }
        }
    }

    /// Release the subscription and stop the keep-alive timer. Idempotent.
    pub fn close(&mut self) {
        if self.state == ChannelState::Closed {
            return;
        }
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.keep_alive = None;
        self.pending = None;
        self.state = ChannelState::Closed;
        tracing::debug!(job_id = ?self.target, "Live channel closed");
    }
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
