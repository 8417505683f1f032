//! Conversation state, LLM streaming, and RAG tool orchestration.

pub mod assistant;
pub mod chat_service;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod tools;

pub use assistant::LlmAssistant;
pub use chat_service::{ChatService, FrontendChatEvent, FrontendContentBlock};
pub use conversation::ConversationManager;
pub use error::{ChatError, ChatResult};
