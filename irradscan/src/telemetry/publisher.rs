//! Bounded, drop-tolerant telemetry fan-out.
//!
//! Built on a `tokio::sync::broadcast` channel: publishing never blocks and
//! never fails the caller. A subscriber that falls more than `capacity`
//! messages behind loses the oldest unread messages and is told how many it
//! missed on its next receive.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::trace;

use super::message::{MessageMeta, TelemetryEvent, TelemetryMessage};
use crate::clock::now_timestamp;

/// Default high-water mark per subscriber.
pub const DEFAULT_TELEMETRY_CAPACITY: usize = 16;

/// Default publisher name in message metadata.
pub const DEFAULT_SENDER_NAME: &str = "irradscan";

/// Fire-and-forget publisher of telemetry records.
///
/// Cheap to clone; clones share the same channel.
#[derive(Clone)]
pub struct TelemetryPublisher {
    sender: broadcast::Sender<TelemetryMessage>,
    name: Arc<str>,
}

impl std::fmt::Debug for TelemetryPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryPublisher")
            .field("name", &self.name)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl TelemetryPublisher {
    /// Creates a publisher with the given per-subscriber capacity.
    ///
    /// The channel rounds `capacity` up to the next power of two; zero is
    /// treated as one.
    pub fn new(capacity: usize, name: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        let name: String = name.into();
        Self {
            sender,
            name: name.into(),
        }
    }

    /// Publisher name written into message metadata.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opens a new subscription that sees every message published from now on.
    pub fn subscribe(&self) -> TelemetrySubscriber {
        TelemetrySubscriber {
            receiver: self.sender.subscribe(),
            dropped: 0,
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publishes a `stage` event.
    pub fn publish(&self, event: TelemetryEvent) {
        self.publish_as("stage", event);
    }

    /// Publishes an event with an explicit source kind.
    ///
    /// Having no subscribers is not an error.
    pub fn publish_as(&self, kind: &str, event: TelemetryEvent) {
        let topic = event.topic();
        let message = TelemetryMessage {
            meta: MessageMeta {
                timestamp: now_timestamp(),
                name: self.name.to_string(),
                kind: kind.to_string(),
            },
            data: event,
        };
        if self.sender.send(message).is_err() {
            trace!(topic, "No telemetry subscribers");
        }
    }
}

impl Default for TelemetryPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_TELEMETRY_CAPACITY, DEFAULT_SENDER_NAME)
    }
}

/// Receiving end of a telemetry subscription.
///
/// Lagging is absorbed: missed messages are counted in [`dropped`](Self::dropped)
/// and reception continues with the oldest retained message.
pub struct TelemetrySubscriber {
    receiver: broadcast::Receiver<TelemetryMessage>,
    dropped: u64,
}

impl TelemetrySubscriber {
    /// Returns the next message if one is ready.
    ///
    /// `None` when nothing is pending or the publisher is gone.
    pub fn try_next(&mut self) -> Option<TelemetryMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) => return Some(message),
                Err(TryRecvError::Lagged(n)) => {
                    trace!(missed = n, "Telemetry subscriber lagged");
                    self.dropped += n;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Blocks the current thread until the next message arrives.
    ///
    /// Returns `None` once every publisher has been dropped. Must not be
    /// called from inside an async runtime.
    pub fn next_blocking(&mut self) -> Option<TelemetryMessage> {
        loop {
            match self.receiver.blocking_recv() {
                Ok(message) => return Some(message),
                Err(RecvError::Lagged(n)) => {
                    trace!(missed = n, "Telemetry subscriber lagged");
                    self.dropped += n;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Drains every pending message.
    pub fn drain(&mut self) -> Vec<TelemetryMessage> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    /// Total number of messages this subscriber missed by lagging.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
