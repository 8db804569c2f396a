//! In-process event bus for lifecycle notifications
//!
//! Backed by `tokio::sync::broadcast`: any number of subscribers, and emitting
//! never blocks. With no subscribers an event is simply dropped; a lagging
//! subscriber loses the oldest events first.
//!
//! # Example
//!
//! ```no_run
//! use libsocialcast::service::events::{Event, EventBus};
//!
//! # async fn example() {
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus.emit(Event::PostApproved {
//!     post_id: "abc123".to_string(),
//!     scheduled_at: None,
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::publisher::PublicationOutcome;
use crate::scheduler::BatchSummary;

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Per-platform summary carried by [`Event::PublicationFinished`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSummary {
    pub platform: String,
    pub success: bool,
    pub post_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    PostCreated {
        post_id: String,
        account_id: i64,
        platforms: Vec<String>,
    },

    PostApproved {
        post_id: String,
        scheduled_at: Option<i64>,
    },

    /// The post was claimed and its fan-out is about to start
    PublicationStarted {
        post_id: String,
        platforms: Vec<String>,
    },

    PublicationFinished {
        post_id: String,
        success: bool,
        results: Vec<PlatformSummary>,
    },

    BatchCompleted {
        processed: usize,
        published: usize,
        failed: usize,
        skipped: usize,
    },

    ArtifactsSwept {
        removed: usize,
    },
}

impl Event {
    pub fn publication_finished(post_id: &str, outcome: &PublicationOutcome) -> Self {
        Event::PublicationFinished {
            post_id: post_id.to_string(),
            success: outcome.success,
            results: outcome
                .results
                .values()
                .map(|a| PlatformSummary {
                    platform: a.platform.clone(),
                    success: a.success,
                    post_id: a.post_id.clone(),
                    error: a.error.clone(),
                })
                .collect(),
        }
    }

    pub fn batch_completed(summary: &BatchSummary) -> Self {
        Event::BatchCompleted {
            processed: summary.processed,
            published: summary.published,
            failed: summary.failed,
            skipped: summary.skipped,
        }
    }
}
