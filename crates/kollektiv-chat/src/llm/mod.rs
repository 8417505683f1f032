pub mod client;
pub mod streaming;
pub mod types;

pub use client::{AnthropicClient, ChatRequest, LlmClientConfig, ToolDefinition};
pub use streaming::SseParser;
pub use types::{LlmTurn, StreamDelta, StreamEvent, ToolUseRequest, Usage};
