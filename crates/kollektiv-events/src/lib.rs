//! Event bus and task queue: the two ways work and state moves between
//! Kollektiv's processes without a direct call.

pub mod bus;
pub mod client;
pub mod error;
pub mod queue;

pub use bus::{
    next_event_or_timeout, EventBus, EventStream, InMemoryEventBus, RedisEventBus,
    DEFAULT_SSE_INACTIVITY_TIMEOUT,
};
pub use client::EventsClient;
pub use error::{EventsError, EventsResult};
pub use queue::TaskQueue;
