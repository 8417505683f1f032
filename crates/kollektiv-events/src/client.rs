//! Single handle bundling the pub/sub event bus and the work queue, so
//! callers that need both (the web surface publishing source events while
//! also enqueueing worker jobs) don't juggle two separate Redis pools.

use std::sync::Arc;

use crate::bus::{EventBus, RedisEventBus};
use crate::error::EventsResult;
use crate::queue::TaskQueue;

#[derive(Clone)]
pub struct EventsClient {
    pub bus: Arc<dyn EventBus>,
    pub queue: TaskQueue,
}

impl EventsClient {
    pub fn connect(redis_url: &str) -> EventsResult<Self> {
        let bus = RedisEventBus::new(redis_url)?;
        let queue = TaskQueue::connect(redis_url)?;
        Ok(Self {
            bus: Arc::new(bus),
            queue,
        })
    }

    pub fn with_parts(bus: Arc<dyn EventBus>, queue: TaskQueue) -> Self {
        Self { bus, queue }
    }
}
