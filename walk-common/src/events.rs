//! Event types for the walk tracker event system
//!
//! Provides the shared event definitions and the EventBus used to fan state
//! changes out to observers (SSE clients, tests) without polling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Walk session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkState {
    Stopped,
    Running,
}

/// Pipeline stage that produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoStage {
    Search,
    Download,
}

impl std::fmt::Display for PhotoStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhotoStage::Search => write!(f, "search"),
            PhotoStage::Download => write!(f, "download"),
        }
    }
}

/// Walk tracker event types
///
/// Events are broadcast via EventBus and can be serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WalkEvent {
    /// Walk session started or stopped
    SessionStateChanged {
        old_state: WalkState,
        new_state: WalkState,
        timestamp: DateTime<Utc>,
    },

    /// A stable location was recorded as a checkpoint
    CheckpointCreated {
        checkpoint_id: Uuid,
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<Utc>,
    },

    /// Photo search produced a remote URL
    PhotoFound {
        checkpoint_id: Uuid,
        remote_url: String,
        timestamp: DateTime<Utc>,
    },

    /// Photo stored locally; the gallery can show it
    PhotoDownloaded {
        checkpoint_id: Uuid,
        local_ref: String,
        timestamp: DateTime<Utc>,
    },

    /// A stage gave up on a checkpoint
    CheckpointFailed {
        checkpoint_id: Uuid,
        stage: PhotoStage,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A stage cannot run at all (missing credential)
    StageDisabled {
        stage: PhotoStage,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// All checkpoints and stored photos were removed
    PhotosPurged {
        timestamp: DateTime<Utc>,
    },
}

impl WalkEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            WalkEvent::SessionStateChanged { .. } => "SessionStateChanged",
            WalkEvent::CheckpointCreated { .. } => "CheckpointCreated",
            WalkEvent::PhotoFound { .. } => "PhotoFound",
            WalkEvent::PhotoDownloaded { .. } => "PhotoDownloaded",
            WalkEvent::CheckpointFailed { .. } => "CheckpointFailed",
            WalkEvent::StageDisabled { .. } => "StageDisabled",
            WalkEvent::PhotosPurged { .. } => "PhotosPurged",
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use walk_common::events::{EventBus, WalkEvent, WalkState};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(WalkEvent::SessionStateChanged {
///     old_state: WalkState::Stopped,
///     new_state: WalkState::Running,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(WalkEvent::SessionStateChanged { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WalkEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered before the oldest are
    /// dropped for lagging subscribers.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<WalkEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: WalkEvent) -> Result<usize, broadcast::error::SendError<WalkEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: WalkEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::new(10);
        let result = bus.emit(WalkEvent::PhotosPurged {
            timestamp: Utc::now(),
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_all_subscribers_receive_event() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let id = Uuid::new_v4();
        bus.emit_lossy(WalkEvent::PhotoFound {
            checkpoint_id: id,
            remote_url: "https://example.com/a.jpg".to_string(),
            timestamp: Utc::now(),
        });

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                WalkEvent::PhotoFound { checkpoint_id, .. } => assert_eq!(checkpoint_id, id),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = WalkEvent::CheckpointFailed {
            checkpoint_id: Uuid::nil(),
            stage: PhotoStage::Download,
            reason: "HTTP 404".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CheckpointFailed");
        assert_eq!(json["stage"], "download");
        assert_eq!(event.event_type(), "CheckpointFailed");
    }

    #[test]
    fn test_walk_state_serialization() {
        assert_eq!(serde_json::to_string(&WalkState::Running).unwrap(), "\"running\"");
    }
}
