//! Wire-level streaming types for the Anthropic Messages API.
//!
//! These are ephemeral: they exist only to carry SSE deltas from the parser
//! to the accumulator and have no persisted counterpart. Persisted chat
//! state uses `kollektiv_core::models::{ConversationMessage, ContentBlock}`
//! directly.

#[derive(Debug, Clone)]
pub enum StreamEvent {
    MessageStart {
        message_id: String,
        model: String,
        input_tokens: u32,
    },
    ContentBlockStart {
        index: u32,
        content_type: String,
        id: Option<String>,
        name: Option<String>,
    },
    ContentBlockDelta {
        index: u32,
        delta: StreamDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        stop_reason: Option<String>,
        output_tokens: u32,
    },
    MessageStop,
    Ping,
    Error {
        message: String,
    },
}

#[derive(Debug, Clone)]
pub enum StreamDelta {
    TextDelta(String),
    InputJsonDelta(String),
}

#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// The high-level result of one completed model turn.
#[derive(Debug, Clone)]
pub enum LlmTurn {
    Text(String),
    ToolUse(Vec<ToolUseRequest>),
}

#[derive(Debug, Clone)]
pub struct ToolUseRequest {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}
