// feed.rs
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::{LogEntry, Poll};

pub const DEFAULT_CAPACITY: usize = 256;

/// One state change, delivered to every subscriber in commit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    PollUpdated { poll: Poll },
    PollRemoved { id: String },
    MessageAppended { entry: LogEntry },
}

impl FeedEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FeedEvent::PollUpdated { .. } => "poll_updated",
            FeedEvent::PollRemoved { .. } => "poll_removed",
            FeedEvent::MessageAppended { .. } => "message_appended",
        }
    }
}

/// Fan-out for state changes. Publishing never blocks the mutation path; a
/// subscriber that falls behind the channel capacity is disconnected and
/// reconnects for a fresh snapshot.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<FeedEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: FeedEvent) {
        // Nobody listening is not an error.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
