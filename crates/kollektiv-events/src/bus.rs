//! Publish/subscribe event bus.
//!
//! The production transport is Redis pub/sub, one channel per source
//! (`sources:{source_id}:events`), so the SSE endpoint only ever hears
//! about the source it asked about. An in-memory `tokio::broadcast`
//! variant backs unit tests that don't want a live Redis instance,
//! following the same zero-copy publish/subscribe shape as the kernel's
//! IPC bus.

use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use kollektiv_core::models::ContentProcessingEvent;
use kollektiv_core::{decode, encode};
use redis::AsyncCommands;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{EventsError, EventsResult};

fn channel_for(source_id: Uuid) -> String {
    format!("sources:{source_id}:events")
}

pub type EventStream = BoxStream<'static, EventsResult<ContentProcessingEvent>>;

#[async_trait::async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: &ContentProcessingEvent) -> EventsResult<()>;
    async fn subscribe(&self, source_id: Uuid) -> EventsResult<EventStream>;
}

/// Redis pub/sub transport, one channel per source id.
pub struct RedisEventBus {
    client: redis::Client,
}

impl RedisEventBus {
    pub fn new(redis_url: &str) -> EventsResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, event: &ContentProcessingEvent) -> EventsResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = encode(event).map_err(EventsError::Core)?;
        let receivers: i64 = conn.publish(channel_for(event.source_id), payload).await?;
        tracing::trace!(source_id = %event.source_id, stage = ?event.stage, receivers, "published processing event");
        Ok(())
    }

    async fn subscribe(&self, source_id: Uuid) -> EventsResult<EventStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel_for(source_id)).await?;

        let stream = pubsub.into_on_message().map(|msg| {
            let payload: Vec<u8> = msg.get_payload().map_err(EventsError::Redis)?;
            decode::<ContentProcessingEvent>(&payload).map_err(EventsError::Core)
        });
        Ok(stream.boxed())
    }
}

/// In-memory transport for tests: a broadcast channel filtered by source
/// id on the receiving side.
#[derive(Clone)]
pub struct InMemoryEventBus {
    sender: broadcast::Sender<ContentProcessingEvent>,
}

impl InMemoryEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait::async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: &ContentProcessingEvent) -> EventsResult<()> {
        let _ = self.sender.send(event.clone());
        Ok(())
    }

    async fn subscribe(&self, source_id: Uuid) -> EventsResult<EventStream> {
        let rx = self.sender.subscribe();
        let stream = tokio_stream::wrappers::BroadcastStream::new(rx).filter_map(move |item| async move {
            match item {
                Ok(event) if event.source_id == source_id => Some(Ok(event)),
                Ok(_) => None,
                Err(_lagged) => None,
            }
        });
        Ok(stream.boxed())
    }
}

/// Drains `stream` until a terminal stage is observed or `inactivity`
/// elapses with no new event, matching the SSE endpoint's termination
/// rule: ends on a terminal stage, or after an hour of inactivity.
pub async fn next_event_or_timeout(
    stream: &mut EventStream,
    inactivity: Duration,
) -> Option<EventsResult<ContentProcessingEvent>> {
    tokio::time::timeout(inactivity, stream.next()).await.ok().flatten()
}

pub const DEFAULT_SSE_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(60 * 60);

#[cfg(test)]
mod tests {
    use super::*;
    use kollektiv_core::models::SourceStage;

    #[tokio::test]
    async fn in_memory_bus_filters_by_source_id() {
        let bus = InMemoryEventBus::default();
        let target = Uuid::new_v4();
        let other = Uuid::new_v4();

        let mut stream = bus.subscribe(target).await.unwrap();

        bus.publish(&ContentProcessingEvent::new(other, SourceStage::CrawlingStarted))
            .await
            .unwrap();
        bus.publish(&ContentProcessingEvent::new(target, SourceStage::CrawlingStarted))
            .await
            .unwrap();

        let received = next_event_or_timeout(&mut stream, Duration::from_secs(1))
            .await
            .expect("event")
            .expect("ok");
        assert_eq!(received.source_id, target);
    }

    #[tokio::test]
    async fn timeout_fires_on_inactivity() {
        let bus = InMemoryEventBus::default();
        let mut stream = bus.subscribe(Uuid::new_v4()).await.unwrap();
        let result = next_event_or_timeout(&mut stream, Duration::from_millis(20)).await;
        assert!(result.is_none());
    }
}
