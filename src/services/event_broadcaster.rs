//! Fan-out of outbound pipeline events.
//!
//! Dashboards, analytics and the notification channel subscribe here.
//! Delivery is best effort: a slow subscriber loses the oldest events and
//! the database stays the record of what happened.

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{EventMessage, PipelineEvent};

/// Events buffered per subscriber before the oldest are dropped.
const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Publishes timestamped [`PipelineEvent`]s to every subscriber.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<EventMessage>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventMessage> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Stamp and broadcast an event. Returns how many subscribers got it;
    /// zero subscribers is not an error.
    pub fn publish(&self, event: PipelineEvent) -> usize {
        let message = EventMessage::new(event);
        let delivered = self.sender.send(message).unwrap_or(0);
        debug!(delivered, "Pipeline event published");
        delivered
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Next event on `receiver`, skipping over lag. `None` once the
/// broadcaster is gone.
pub async fn next_event(receiver: &mut broadcast::Receiver<EventMessage>) -> Option<EventMessage> {
    loop {
        match receiver.recv().await {
            Ok(message) => return Some(message),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event subscriber lagged, oldest events dropped");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

/// Next event addressed to `recipient` (ticket owner or notification
/// recipient); broadcast-only events are skipped.
pub async fn next_event_for(
    receiver: &mut broadcast::Receiver<EventMessage>,
    recipient: Uuid,
) -> Option<EventMessage> {
    while let Some(message) = next_event(receiver).await {
        if message.event.recipient() == Some(recipient) {
            return Some(message);
        }
    }
    None
}
