//! Kollektiv core: domain model, wire codec, and ambient services shared by
//! every crate in the workspace.
//!
//! - **[`models`]** -- the record types persisted, queued, and streamed
//!   throughout the system (`Source`, `Job`, `Document`, `Chunk`,
//!   `Conversation`, ...).
//! - **[`serializer`]** -- tagged-variant encode/decode for anything that
//!   crosses a process boundary.
//! - **[`error`]** -- the shared error taxonomy every crate's own errors
//!   bottom out in.
//! - **[`retry`]** -- a data-driven retry policy used by the crawler
//!   adapter and the event bus publisher.
//! - **[`tokenizer`]** -- the process-wide `cl100k_base` token counter.
//! - **[`config`]** -- environment-driven application configuration.

pub mod config;
pub mod error;
pub mod models;
pub mod retry;
pub mod serializer;
pub mod tokenizer;

pub use config::{AppConfig, Environment, LogFormat};
pub use error::{KollektivError, Result};
pub use retry::{Backoff, RetryPolicy};
pub use serializer::{decode, decode_dynamic, encode, DecodedValue, Tagged, Timestamp};
