//! Lifecycle event bus
//!
//! Subscribers register for one or more [`Topic`]s and receive matching
//! [`Event`]s on an unbounded channel. Publishing never blocks, so the download
//! manager can publish while holding its queue lock. That keeps admission,
//! slot release and event dispatch in one atomic step.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

use super::item::DownloadItem;

/// Event category subscribers can filter on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Topic {
    Add,
    Progress,
    Interrupted,
    Complete,
    Error,
    /// Failures not tied to a single item (catalog resolution, setup)
    ProcessError,
}

impl Topic {
    pub const ALL: [Topic; 6] = [
        Topic::Add,
        Topic::Progress,
        Topic::Interrupted,
        Topic::Complete,
        Topic::Error,
        Topic::ProcessError,
    ];
}

/// Notification published on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Item was enqueued
    Added(DownloadItem),
    /// Active item received more bytes
    Progress(DownloadItem),
    /// Active item was interrupted
    Interrupted(DownloadItem),
    /// Item was fetched, tagged and stored
    Completed(DownloadItem),
    /// Item failed
    Failed { item: DownloadItem, error: String },
    /// Process-level failure
    ProcessError { error: String },
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Self::Added(_) => Topic::Add,
            Self::Progress(_) => Topic::Progress,
            Self::Interrupted(_) => Topic::Interrupted,
            Self::Completed(_) => Topic::Complete,
            Self::Failed { .. } => Topic::Error,
            Self::ProcessError { .. } => Topic::ProcessError,
        }
    }

    /// Whether the event settles its item for good
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Interrupted(_) | Self::Completed(_) | Self::Failed { .. }
        )
    }

    /// Item the event is about, if any
    pub fn item(&self) -> Option<&DownloadItem> {
        match self {
            Self::Added(item)
            | Self::Progress(item)
            | Self::Interrupted(item)
            | Self::Completed(item)
            | Self::Failed { item, .. } => Some(item),
            Self::ProcessError { .. } => None,
        }
    }
}

/// Handle identifying one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receiving side of a subscription
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: mpsc::UnboundedReceiver<Event>,
}

impl Subscription {
    /// Wait for the next event; `None` once unsubscribed and drained
    pub async fn recv(&mut self) -> Option<Event> {
        self.events.recv().await
    }
}

struct Subscriber {
    id: SubscriptionId,
    topics: HashSet<Topic>,
    tx: mpsc::UnboundedSender<Event>,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

/// Typed publish/subscribe registry, cheap to clone
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a single topic
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        self.subscribe_many([topic])
    }

    /// Subscribe to every topic
    pub fn subscribe_all(&self) -> Subscription {
        self.subscribe_many(Topic::ALL)
    }

    /// Subscribe to a set of topics on one channel
    pub fn subscribe_many(&self, topics: impl IntoIterator<Item = Topic>) -> Subscription {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        let topics: HashSet<Topic> = topics.into_iter().collect();

        debug!(subscription = id.0, ?topics, "Subscriber added");
        self.subscribers().push(Subscriber { id, topics, tx });

        Subscription { id, events: rx }
    }

    /// Remove a subscription
    ///
    /// Returns whether a subscriber was actually removed. Events already
    /// delivered stay readable on the receiver.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        before != subscribers.len()
    }

    /// Deliver an event to every subscriber of its topic
    ///
    /// Subscribers whose receiver has been dropped are pruned.
    pub fn publish(&self, event: Event) {
        let topic = event.topic();
        self.subscribers().retain(|s| {
            if !s.topics.contains(&topic) {
                return !s.tx.is_closed();
            }
            s.tx.send(event.clone()).is_ok()
        });
    }

    /// Publish a process-level error
    pub fn publish_process_error(&self, error: impl Into<String>) {
        self.publish(Event::ProcessError {
            error: error.into(),
        });
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
