use kollektiv_core::KollektivError;
use kollektiv_store::StoreError;
use thiserror::Error;

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("kollektiv error: {0}")]
    Core(#[from] KollektivError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("llm request failed: {reason}")]
    LlmRequestFailed { reason: String },

    #[error("llm response parse error: {reason}")]
    LlmParseFailed { reason: String },

    #[error("llm stream error: {reason}")]
    LlmStreamError { reason: String },

    #[error("unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("tool execution failed for `{tool_name}`: {reason}")]
    ToolExecutionFailed { tool_name: String, reason: String },

    #[error("assistant exceeded max tool turns ({max_turns})")]
    MaxTurnsExceeded { max_turns: u32 },
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        Self::LlmRequestFailed { reason: err.to_string() }
    }
}

impl From<ChatError> for KollektivError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Core(inner) => inner,
            ChatError::Store(inner) => inner.into(),
            other => KollektivError::Internal(other.to_string()),
        }
    }
}
