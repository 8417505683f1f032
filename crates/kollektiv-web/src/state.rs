//! Dependency-injection container for the HTTP surface, bundling every
//! service handle a route needs behind one `Arc`.

use kollektiv_chat::{ChatService, ConversationManager};
use kollektiv_core::config::AppConfig;
use kollektiv_crawler::{CrawlerAdapter, JobManager};
use kollektiv_events::EventsClient;
use kollektiv_store::DurableRepository;

pub struct Services {
    pub config: AppConfig,
    pub durable: DurableRepository,
    pub events: EventsClient,
    pub crawler: CrawlerAdapter,
    pub jobs: JobManager,
    pub chat: ChatService,
    /// Separate from `chat`'s internal manager: both point at the same
    /// underlying Redis/Postgres pools, but the web surface needs to create
    /// conversations directly rather than through a chat turn.
    pub conversations: ConversationManager,
}
