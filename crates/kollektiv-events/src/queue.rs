//! ARQ-style task queue: a Redis list carrying tagged job payloads,
//! consumed with a blocking pop the way `arq`'s worker polls its queue.
//! Distinct from [`crate::bus`]: the bus fans the same event out to every
//! subscriber, the queue hands each payload to exactly one consumer.

use std::time::Duration;

use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use kollektiv_core::{decode, encode, Tagged};
use redis::AsyncCommands;

use crate::error::{EventsError, EventsResult};

const QUEUE_KEY: &str = "kollektiv:tasks";

#[derive(Clone)]
pub struct TaskQueue {
    pool: Pool,
    key: String,
}

impl TaskQueue {
    pub fn connect(redis_url: &str) -> EventsResult<Self> {
        Self::connect_with_key(redis_url, QUEUE_KEY)
    }

    /// Used by tests to isolate queues from each other without a flush.
    pub fn connect_with_key(redis_url: &str, key: impl Into<String>) -> EventsResult<Self> {
        let cfg = PoolConfig::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| EventsError::Pool(e.to_string()))?;
        Ok(Self {
            pool,
            key: key.into(),
        })
    }

    async fn connection(&self) -> EventsResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| EventsError::Pool(e.to_string()))
    }

    /// `LPUSH`: enqueue a job. New work always enters at the head; workers
    /// pop from the tail, giving FIFO order.
    pub async fn enqueue<T: Tagged>(&self, job: &T) -> EventsResult<()> {
        let mut conn = self.connection().await?;
        let payload = encode(job).map_err(EventsError::Core)?;
        let _: () = conn.lpush(&self.key, payload).await?;
        Ok(())
    }

    /// `BRPOP` with a poll timeout, returning `None` if nothing arrived
    /// before the timeout elapsed (the caller's loop decides whether to
    /// keep waiting or shut down).
    pub async fn dequeue<T: Tagged>(&self, poll_timeout: Duration) -> EventsResult<Option<T>> {
        let mut conn = self.connection().await?;
        let result: Option<(String, Vec<u8>)> = conn
            .brpop(&self.key, poll_timeout.as_secs_f64())
            .await?;
        match result {
            Some((_, payload)) => Ok(Some(decode(&payload).map_err(EventsError::Core)?)),
            None => Ok(None),
        }
    }

    /// Current queue depth, used by the health check and worker metrics.
    pub async fn len(&self) -> EventsResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.llen(&self.key).await?;
        Ok(len)
    }

    pub async fn is_empty(&self) -> EventsResult<bool> {
        Ok(self.len().await? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests require a live Redis instance reachable at REDIS_URL (or
    // localhost:6379) and are skipped otherwise.
    fn test_redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    #[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
    struct Ping {
        n: u32,
    }

    impl Tagged for Ping {
        const TAG: &'static str = "test.Ping";
    }

    #[tokio::test]
    #[ignore = "requires a live redis instance"]
    async fn enqueue_then_dequeue_round_trips() {
        let queue = TaskQueue::connect_with_key(&test_redis_url(), "kollektiv:tasks:test")
            .expect("connect");
        queue.enqueue(&Ping { n: 7 }).await.expect("enqueue");
        let job: Option<Ping> = queue
            .dequeue(Duration::from_secs(1))
            .await
            .expect("dequeue");
        assert_eq!(job, Some(Ping { n: 7 }));
    }
}
