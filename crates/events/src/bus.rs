//! In-process event bus keyed by job id.
//!
//! [`EventBus`] fans every published [`JobEvent`] out to the subscribers
//! registered on that job and to every wildcard subscriber. Each
//! subscriber owns an unbounded queue, so a slow consumer never blocks the
//! publisher or its siblings. Delivery happens while the subscriber table
//! is locked, which gives every subscriber of a job the same event order.
//!
//! Events published before a subscription exists are not replayed; live
//! observers close that gap by taking a snapshot of the job when they
//! subscribe.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use refinery_core::error::CoreError;
use refinery_core::types::JobId;
use tokio::sync::mpsc;

use crate::event::JobEvent;

/// Default cap on concurrent subscribers of a single job.
pub const DEFAULT_MAX_SUBSCRIBERS_PER_JOB: usize = 64;

// ---------------------------------------------------------------------------
// Subscriber table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Topic {
    Job(JobId),
    Wildcard,
}

struct Subscriber {
    id: u64,
    sender: mpsc::UnboundedSender<JobEvent>,
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    by_job: HashMap<JobId, Vec<Subscriber>>,
    wildcard: Vec<Subscriber>,
}

impl Subscribers {
    fn remove(&mut self, topic: &Topic, id: u64) -> bool {
        match topic {
            Topic::Wildcard => {
                let before = self.wildcard.len();
                self.wildcard.retain(|s| s.id != id);
                before != self.wildcard.len()
            }
            Topic::Job(job_id) => {
                let Some(list) = self.by_job.get_mut(job_id) else {
                    return false;
                };
                let before = list.len();
                list.retain(|s| s.id != id);
                let removed = before != list.len();
                if list.is_empty() {
                    self.by_job.remove(job_id);
                }
                removed
            }
        }
    }
}

/// Send to every subscriber in `list`, dropping those whose receiver is gone.
fn deliver(list: &mut Vec<Subscriber>, event: &JobEvent) -> usize {
    let mut delivered = 0;
    list.retain(|s| match s.sender.send(event.clone()) {
        Ok(()) => {
            delivered += 1;
            true
        }
        Err(_) => false,
    });
    delivered
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Publish/subscribe hub for job events.
///
/// Shared via `Arc<EventBus>`; construct one per registry.
pub struct EventBus {
    subscribers: Arc<Mutex<Subscribers>>,
    max_subscribers_per_job: usize,
}

impl EventBus {
    /// Create a bus that admits at most `max_subscribers_per_job`
    /// subscribers on any one job. Zero means no limit.
    pub fn new(max_subscribers_per_job: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Subscribers::default())),
            max_subscribers_per_job,
        }
    }

    /// Deliver `event` to its job's subscribers and to wildcard subscribers.
    ///
    /// Returns how many subscribers received it.
    pub fn publish(&self, event: JobEvent) -> usize {
        let mut subs = self.subscribers.lock();
        let mut delivered = 0;
        if let Some(list) = subs.by_job.get_mut(&event.job_id) {
            delivered += deliver(list, &event);
            if list.is_empty() {
                subs.by_job.remove(&event.job_id);
            }
        }
        delivered += deliver(&mut subs.wildcard, &event);
        tracing::trace!(
            job_id = %event.job_id,
            event = event.event_name(),
            delivered,
            "Published job event"
        );
        delivered
    }

    /// Subscribe to every subsequent event of `job_id`.
    ///
    /// Fails with [`CoreError::Capacity`] when the job already has the
    /// maximum number of subscribers.
    pub fn subscribe(&self, job_id: &str) -> Result<Subscription, CoreError> {
        let mut subs = self.subscribers.lock();
        let current = subs.by_job.get(job_id).map_or(0, Vec::len);
        if self.max_subscribers_per_job > 0 && current >= self.max_subscribers_per_job {
            tracing::warn!(
                job_id,
                limit = self.max_subscribers_per_job,
                "Rejected job subscription, subscriber limit reached"
            );
            return Err(CoreError::Capacity(format!(
                "job {job_id} already has {current} subscribers"
            )));
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = subs.next_id;
        subs.next_id += 1;
        subs.by_job
            .entry(job_id.to_string())
            .or_default()
            .push(Subscriber { id, sender });
        Ok(Subscription::new(
            id,
            Topic::Job(job_id.to_string()),
            receiver,
            Arc::downgrade(&self.subscribers),
        ))
    }

    /// Subscribe to every subsequent event of every job.
    pub fn subscribe_all(&self) -> Subscription {
        let mut subs = self.subscribers.lock();
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = subs.next_id;
        subs.next_id += 1;
        subs.wildcard.push(Subscriber { id, sender });
        Subscription::new(id, Topic::Wildcard, receiver, Arc::downgrade(&self.subscribers))
    }

    /// Number of live subscribers registered on `job_id`.
    pub fn subscriber_count(&self, job_id: &str) -> usize {
        self.subscribers.lock().by_job.get(job_id).map_or(0, Vec::len)
    }

    /// Number of live wildcard subscribers.
    pub fn wildcard_count(&self) -> usize {
        self.subscribers.lock().wildcard.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SUBSCRIBERS_PER_JOB)
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Receiving half of a bus subscription.
///
/// Dropping it unsubscribes. [`unsubscribe`](Subscription::unsubscribe)
/// may be called any number of times.
pub struct Subscription {
    id: u64,
    topic: Topic,
    receiver: mpsc::UnboundedReceiver<JobEvent>,
    subscribers: Weak<Mutex<Subscribers>>,
    active: bool,
}

impl Subscription {
    fn new(
        id: u64,
        topic: Topic,
        receiver: mpsc::UnboundedReceiver<JobEvent>,
        subscribers: Weak<Mutex<Subscribers>>,
    ) -> Self {
        Self {
            id,
            topic,
            receiver,
            subscribers,
            active: true,
        }
    }

    /// Wait for the next event. Returns `None` once unsubscribed and
    /// drained, or when the bus is gone.
    pub async fn recv(&mut self) -> Option<JobEvent> {
        self.receiver.recv().await
    }

    /// Take the next already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<JobEvent> {
        self.receiver.try_recv().ok()
    }

    /// Stop receiving new events. Safe to call repeatedly.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        self.receiver.close();
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.lock().remove(&self.topic, self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The job this subscription follows, or `None` for a wildcard one.
    pub fn job_id(&self) -> Option<&str> {
        match &self.topic {
            Topic::Job(id) => Some(id),
            Topic::Wildcard => None,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("active", &self.active)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
