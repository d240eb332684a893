//! In-memory event bus implementation using tokio broadcast channels.
//!
//! This implementation is suitable for:
//! - Single process deployments
//! - Development and testing
//!
//! Notifications never leave the process.

use async_trait::async_trait;
use dashmap::DashMap;
use handover_events::{EventBus, EventBusError, EventStream, PickupEvent};
use handover_storage::UserRef;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

const CHANNEL_CAPACITY: usize = 100;

/// In-memory event bus using one broadcast channel per recipient.
pub struct MemoryEventBus {
    channels: Arc<DashMap<UserRef, broadcast::Sender<PickupEvent>>>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
        }
    }

    /// Get or create a broadcast channel for a recipient
    fn get_or_create_channel(&self, recipient: &UserRef) -> broadcast::Sender<PickupEvent> {
        self.channels
            .entry(*recipient)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(
        &self,
        recipient: &UserRef,
        event: PickupEvent,
    ) -> Result<(), EventBusError> {
        let Some(tx) = self.channels.get(recipient).map(|tx| tx.clone()) else {
            // Nobody listening
            return Ok(());
        };

        if tx.send(event).is_err() {
            // Every subscriber has gone away; drop the channel unless one just re-subscribed.
            self.channels
                .remove_if(recipient, |_, tx| tx.receiver_count() == 0);
        }

        Ok(())
    }

    async fn subscribe(&self, recipient: &UserRef) -> Result<EventStream, EventBusError> {
        let tx = self.get_or_create_channel(recipient);
        let rx = tx.subscribe();

        // Lagged receivers skip what they missed; the pickup record is the source of truth.
        let stream = BroadcastStream::new(rx).filter_map(|result| result.ok());

        Ok(Box::pin(stream))
    }
}
