//! Markdown chunking for Kollektiv's ingestion pipeline.
//!
//! This crate has no failure modes of its own beyond its input's natural
//! shape (an empty document simply yields no chunks), so it has no
//! dedicated error type and works directly on `kollektiv-core` models.

pub mod chunker;

pub use chunker::{ChunkerConfig, MarkdownChunker};
