//! Event bus abstraction for pickup notifications.
//!
//! Every committed pickup transition notifies the counterpart party. Delivery is
//! best-effort: a failed publish is logged by the caller and never rolls back the
//! transition. Implementations:
//! - Memory (single process, tokio broadcast channels)

use async_trait::async_trait;
use futures::Stream;
use handover_storage::{PickupId, PickupStatus, UserRef};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

/// Kind of pickup change being announced
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DatesProposed,
    DateConfirmed,
    TokenIssued,
    TokenAccepted,
    Completed,
    Cancelled,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::DatesProposed => "dates_proposed",
            EventType::DateConfirmed => "date_confirmed",
            EventType::TokenIssued => "token_issued",
            EventType::TokenAccepted => "token_accepted",
            EventType::Completed => "completed",
            EventType::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event describing a pickup transition
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PickupEvent {
    pub event_type: EventType,
    pub pickup_id: PickupId,
    /// Pickup status after the transition.
    pub status: PickupStatus,
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
}

/// Error type for event bus operations
#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("backend error: {0}")]
    Backend(String),
}

/// Stream of pickup events for one recipient
pub type EventStream = Pin<Box<dyn Stream<Item = PickupEvent> + Send>>;

/// Event bus trait for publishing and subscribing to pickup events.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Notify a recipient about a pickup event.
    ///
    /// Fire-and-forget: events published while the recipient has no subscriber are dropped.
    async fn publish(&self, recipient: &UserRef, event: PickupEvent)
        -> Result<(), EventBusError>;

    /// Subscribe to events addressed to a recipient.
    ///
    /// Returns a stream that yields events as they occur.
    /// The stream will continue until dropped or the bus is closed.
    async fn subscribe(&self, recipient: &UserRef) -> Result<EventStream, EventBusError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_labels() {
        assert_eq!(EventType::DatesProposed.to_string(), "dates_proposed");
        assert_eq!(EventType::TokenAccepted.to_string(), "token_accepted");
        assert_ne!(EventType::Completed, EventType::Cancelled);
    }

    #[test]
    fn test_pickup_event_serialization() {
        let event = PickupEvent {
            event_type: EventType::TokenIssued,
            pickup_id: PickupId::new(),
            status: PickupStatus::QrRequested,
            timestamp: 1234567890,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "token_issued");
        assert_eq!(json["status"], "qr_requested");

        let deserialized: PickupEvent = serde_json::from_value(json).unwrap();
        assert_eq!(deserialized.event_type, event.event_type);
        assert_eq!(deserialized.pickup_id, event.pickup_id);
        assert_eq!(deserialized.timestamp, event.timestamp);
    }

    #[test]
    fn test_event_bus_error_display() {
        let error = EventBusError::Backend("connection failed".to_string());
        let display = error.to_string();
        assert!(display.contains("backend error"));
        assert!(display.contains("connection failed"));
    }
}
