//! Redis-backed working-set storage.
//!
//! Every model that lives here has a key template and a TTL, and the
//! repository knows nothing about what the keys mean beyond that. The
//! `conversation_id`-scoped templates below are the two the rest of the
//! system actually needs today (`ConversationHistory`, pending
//! `ConversationMessage`s); new working-set models add a [`KeyedModel`]
//! impl rather than a new repository method.

use std::time::Duration;

use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use kollektiv_core::models::{ConversationHistory, ConversationMessage};
use kollektiv_core::{decode, encode, Tagged};
use redis::AsyncCommands;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

/// A model that can be addressed in the working-set store by a single
/// scoping id, with a known time-to-live.
pub trait KeyedModel: Tagged {
    fn key(scope: Uuid) -> String;
    fn ttl() -> Duration;
}

impl KeyedModel for ConversationHistory {
    fn key(scope: Uuid) -> String {
        format!("conversations:{scope}:history")
    }

    fn ttl() -> Duration {
        Duration::from_secs(60 * 60 * 24)
    }
}

impl KeyedModel for ConversationMessage {
    fn key(scope: Uuid) -> String {
        format!("conversations:{scope}:pending_messages")
    }

    fn ttl() -> Duration {
        Duration::from_secs(60 * 60)
    }
}

#[derive(Clone)]
pub struct KvRepository {
    pool: Pool,
}

impl KvRepository {
    pub fn connect(redis_url: &str) -> StoreResult<Self> {
        let cfg = PoolConfig::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Pool(e.to_string()))?;
        Ok(Self { pool })
    }

    async fn connection(&self) -> StoreResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }

    /// `SET key value EX ttl`.
    pub async fn set<T: KeyedModel>(&self, scope: Uuid, value: &T) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let key = T::key(scope);
        let payload = encode(value)?;
        let _: () = conn.set_ex(&key, payload, T::ttl().as_secs()).await?;
        tracing::debug!(key, "wrote working-set key");
        Ok(())
    }

    /// `GET key`, returning `None` when the key is absent or expired.
    pub async fn get<T: KeyedModel>(&self, scope: Uuid) -> StoreResult<Option<T>> {
        let mut conn = self.connection().await?;
        let key = T::key(scope);
        let raw: Option<Vec<u8>> = conn.get(&key).await?;
        match raw {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// `RPUSH key value` followed by `EXPIRE key ttl`, matching the
    /// original repository's two-step push-then-refresh-ttl sequence.
    pub async fn rpush<T: KeyedModel>(&self, scope: Uuid, value: &T) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let key = T::key(scope);
        let payload = encode(value)?;
        let _: () = conn.rpush(&key, payload).await?;
        let _: () = conn.expire(&key, T::ttl().as_secs() as i64).await?;
        Ok(())
    }

    /// `LRANGE key start stop`, decoding every element.
    pub async fn lrange<T: KeyedModel>(
        &self,
        scope: Uuid,
        start: isize,
        stop: isize,
    ) -> StoreResult<Vec<T>> {
        let mut conn = self.connection().await?;
        let key = T::key(scope);
        let raw: Vec<Vec<u8>> = conn.lrange(&key, start, stop).await?;
        raw.iter().map(|bytes| decode(bytes).map_err(StoreError::from)).collect()
    }

    /// `DEL key`.
    pub async fn delete<T: KeyedModel>(&self, scope: Uuid) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let key = T::key(scope);
        let _: () = conn.del(&key).await?;
        Ok(())
    }

    /// Atomically fold a list of pending items (`I`) into a scalar value
    /// (`H`), then clear the list, retrying on an optimistic-concurrency
    /// conflict. This is the commit-pending-messages-to-history operation:
    /// `WATCH` both keys, read both values, compute the new `H` with
    /// `fold`, then `MULTI`/`EXEC` the write and the list deletion
    /// together. If another writer touched either key in between, Redis
    /// aborts the transaction and we retry from the top.
    pub async fn watch_fold_and_clear<H, I>(
        &self,
        scope: Uuid,
        fold: impl Fn(Option<H>, Vec<I>) -> StoreResult<H>,
    ) -> StoreResult<(H, Vec<I>)>
    where
        H: KeyedModel,
        I: KeyedModel + Clone,
    {
        let scalar_key = H::key(scope);
        let list_key = I::key(scope);

        loop {
            let mut conn = self.connection().await?;
            redis::cmd("WATCH")
                .arg(&scalar_key)
                .arg(&list_key)
                .query_async::<()>(&mut conn)
                .await?;

            let current: Option<H> = {
                let raw: Option<Vec<u8>> = conn.get(&scalar_key).await?;
                raw.map(|bytes| decode(&bytes)).transpose()?
            };
            let items: Vec<I> = {
                let raw: Vec<Vec<u8>> = conn.lrange(&list_key, 0, -1).await?;
                raw.iter()
                    .map(|bytes| decode(bytes).map_err(StoreError::from))
                    .collect::<StoreResult<Vec<_>>>()?
            };

            let updated = fold(current, items.clone())?;
            let payload = encode(&updated)?;

            let mut pipe = redis::pipe();
            pipe.atomic();
            pipe.set_ex(&scalar_key, payload, H::ttl().as_secs());
            pipe.del(&list_key);

            let result: Option<((), i64)> = pipe.query_async(&mut conn).await?;
            match result {
                Some(_) => return Ok((updated, items)),
                None => {
                    tracing::warn!(scalar_key, list_key, "watch aborted, retrying commit");
                    continue;
                }
            }
        }
    }
}
