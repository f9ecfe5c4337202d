//! EventBus - broadcast lifecycle events for gateway consumers.
//!
//! The session manager publishes an event on every lifecycle edge; gateway
//! adapters subscribe to refresh canvas messages in-channel. Publishing never
//! blocks: with no subscribers events are dropped, and a subscriber that
//! falls behind misses events (lagged) rather than stalling the core.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Why an edit session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEndReason {
    /// Content was committed
    Saved,
    /// The editor abandoned the session
    Cancelled,
    /// The session expired waiting for activity
    Timeout,
}

impl SessionEndReason {
    /// Get the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Saved => "saved",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for SessionEndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle events emitted by the session manager.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CanvasEvent {
    /// An edit session was opened on a canvas
    SessionStarted {
        /// Session identifier
        session_id: Uuid,
        /// Canvas being edited
        canvas_id: Uuid,
        /// Editing user
        user_id: String,
        /// When the session started
        timestamp: DateTime<Utc>,
    },
    /// An edit session reached a terminal state
    SessionEnded {
        /// Session identifier
        session_id: Uuid,
        /// Canvas that was being edited
        canvas_id: Uuid,
        /// User who was editing
        user_id: String,
        /// How the session ended
        reason: SessionEndReason,
        /// When the session ended
        timestamp: DateTime<Utc>,
    },
    /// Canvas content changed (autosave or commit)
    CanvasUpdated {
        /// Canvas that changed
        canvas_id: Uuid,
        /// User whose edit landed
        user_id: String,
        /// When the change landed
        timestamp: DateTime<Utc>,
    },
}

impl CanvasEvent {
    /// The canvas this event concerns.
    #[must_use]
    pub fn canvas_id(&self) -> Uuid {
        match self {
            Self::SessionStarted { canvas_id, .. }
            | Self::SessionEnded { canvas_id, .. }
            | Self::CanvasUpdated { canvas_id, .. } => *canvas_id,
        }
    }

    /// The user who drove the state change.
    #[must_use]
    pub fn user_id(&self) -> &str {
        match self {
            Self::SessionStarted { user_id, .. }
            | Self::SessionEnded { user_id, .. }
            | Self::CanvasUpdated { user_id, .. } => user_id,
        }
    }

    /// Short event name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::SessionEnded { .. } => "session_ended",
            Self::CanvasUpdated { .. } => "canvas_updated",
        }
    }
}

/// Broadcast-based event bus for canvas lifecycle events.
///
/// Uses `tokio::broadcast` so multiple subscribers can receive the same
/// events. Clone freely; all clones share the channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CanvasEvent>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity.
    ///
    /// Capacity determines how many events can be buffered before slow
    /// subscribers start missing events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events. Returns a receiver that will get all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CanvasEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all active subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// If there are no subscribers, the event is silently dropped.
    pub fn publish(&self, event: CanvasEvent) -> usize {
        // send() returns Err if there are no receivers, which is fine
        self.sender.send(event).unwrap_or(0)
    }

    /// Get the current number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(canvas_id: Uuid) -> CanvasEvent {
        CanvasEvent::SessionStarted {
            session_id: Uuid::new_v4(),
            canvas_id,
            user_id: "alice".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        let canvas_id = Uuid::new_v4();
        let delivered = bus.publish(started(canvas_id));
        assert_eq!(delivered, 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "session_started");
        assert_eq!(event.canvas_id(), canvas_id);
        assert_eq!(event.user_id(), "alice");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let bus = EventBus::new(8);
        assert_eq!(bus.publish(started(Uuid::new_v4())), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_the_event() {
        let bus = EventBus::new(8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(started(Uuid::new_v4()));
        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[test]
    fn test_end_reason_serializes_snake_case() {
        let json = serde_json::to_string(&SessionEndReason::Timeout).unwrap();
        assert_eq!(json, "\"timeout\"");
        assert_eq!(SessionEndReason::Saved.as_str(), "saved");
    }
}
