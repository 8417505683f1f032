//! Storage layer for Kollektiv: the Redis-backed working set ([`kv`]) and
//! the Postgres system of record ([`durable`]), plus the migrations that
//! keep the latter's schema current.

pub mod durable;
pub mod error;
pub mod kv;
pub mod migrations;

pub use durable::DurableRepository;
pub use error::{StoreError, StoreResult};
pub use kv::{KeyedModel, KvRepository};
