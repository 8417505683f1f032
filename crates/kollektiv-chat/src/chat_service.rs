//! Chat Service: runs one chat turn end-to-end, translating provider
//! stream events into frontend events and driving the tool-use loop.

use std::sync::Arc;

use futures::StreamExt;
use kollektiv_core::models::{ContentBlock, ConversationHistory, ConversationMessage, Role};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::assistant::LlmAssistant;
use crate::conversation::ConversationManager;
use crate::error::{ChatError, ChatResult};
use crate::llm::{StreamDelta, StreamEvent, ToolUseRequest};

/// Guards against a model stuck alternating tool calls without ever
/// reaching `end_turn`.
const MAX_TOOL_TURNS: u32 = 8;

#[derive(Debug, Clone)]
pub enum FrontendContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String },
}

#[derive(Debug, Clone)]
pub enum FrontendChatEvent {
    MessageAccepted { conversation_id: Uuid, title: String },
    ContentBlockStart { index: u32, content_block: FrontendContentBlock },
    ContentBlockDelta { index: u32, text_delta: Option<String>, tool_input_json_delta: Option<String> },
    ContentBlockStop { index: u32 },
    MessageStop,
    ToolResultMessage { message: ConversationMessage },
    AssistantMessage { message: ConversationMessage },
    Error { error_message: String },
}

enum PartialBlock {
    Text { text: String },
    ToolUse { id: String, name: String },
}

#[derive(Default)]
struct StreamState {
    current_block: Option<PartialBlock>,
    current_blocks: Vec<ContentBlock>,
    has_tool_use: bool,
    tool_input_buffer: String,
}

pub struct ChatService {
    conversations: Arc<ConversationManager>,
    assistant: Arc<LlmAssistant>,
}

impl ChatService {
    pub fn new(conversations: ConversationManager, assistant: LlmAssistant) -> Self {
        Self { conversations: Arc::new(conversations), assistant: Arc::new(assistant) }
    }

    /// Run a full turn and stream frontend events back. `title` is the
    /// conversation's display title, echoed in `MessageAccepted` so a new
    /// client can render it immediately.
    pub fn get_response(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        user_message: ConversationMessage,
        title: String,
    ) -> UnboundedReceiverStream<FrontendChatEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conversations = self.conversations.clone();
        let assistant = self.assistant.clone();

        tokio::spawn(async move {
            let result = run_turn(&conversations, &assistant, conversation_id, user_id, user_message, &title, &tx).await;
            if let Err(e) = result {
                conversations.clear_pending(conversation_id).await.ok();
                let _ = tx.send(FrontendChatEvent::Error { error_message: e.to_string() });
            }
        });

        UnboundedReceiverStream::new(rx)
    }
}

async fn run_turn(
    conversations: &ConversationManager,
    assistant: &LlmAssistant,
    conversation_id: Uuid,
    user_id: Uuid,
    user_message: ConversationMessage,
    title: &str,
    tx: &mpsc::UnboundedSender<FrontendChatEvent>,
) -> ChatResult<()> {
    let mut messages = conversations.history(conversation_id).await?.messages;
    messages.push(user_message.clone());
    conversations.add_pending_message(user_message).await?;
    let _ = tx.send(FrontendChatEvent::MessageAccepted { conversation_id, title: title.to_string() });

    let mut turn = 0u32;

    loop {
        turn += 1;
        if turn > MAX_TOOL_TURNS {
            conversations.commit_pending(conversation_id).await?;
            return Err(ChatError::MaxTurnsExceeded { max_turns: MAX_TOOL_TURNS });
        }
        let transient = ConversationHistory { conversation_id, user_id, messages: messages.clone(), token_count: 0 };
        let mut stream = assistant.stream_response(&transient).await?;
        let mut state = StreamState::default();

        while let Some(event) = stream.next().await {
            let event = event?;
            match event {
                StreamEvent::MessageStart { .. } | StreamEvent::MessageDelta { .. } | StreamEvent::Ping => {}

                StreamEvent::ContentBlockStart { index, content_type, id, name } => {
                    let (partial, frontend) = if content_type == "tool_use" {
                        state.has_tool_use = true;
                        state.tool_input_buffer.clear();
                        let id = id.unwrap_or_default();
                        let name = name.unwrap_or_default();
                        (
                            PartialBlock::ToolUse { id: id.clone(), name: name.clone() },
                            FrontendContentBlock::ToolUse { id, name },
                        )
                    } else {
                        (PartialBlock::Text { text: String::new() }, FrontendContentBlock::Text { text: String::new() })
                    };
                    state.current_block = Some(partial);
                    let _ = tx.send(FrontendChatEvent::ContentBlockStart { index, content_block: frontend });
                }

                StreamEvent::ContentBlockDelta { index, delta } => match delta {
                    StreamDelta::TextDelta(text) => {
                        if let Some(PartialBlock::Text { text: buf }) = &mut state.current_block {
                            buf.push_str(&text);
                        }
                        let _ = tx.send(FrontendChatEvent::ContentBlockDelta {
                            index,
                            text_delta: Some(text),
                            tool_input_json_delta: None,
                        });
                    }
                    StreamDelta::InputJsonDelta(partial_json) => {
                        state.tool_input_buffer.push_str(&partial_json);
                        let _ = tx.send(FrontendChatEvent::ContentBlockDelta {
                            index,
                            text_delta: None,
                            tool_input_json_delta: Some(partial_json),
                        });
                    }
                },

                StreamEvent::ContentBlockStop { index } => {
                    if let Some(block) = state.current_block.take() {
                        let content_block = match block {
                            PartialBlock::Text { text } => ContentBlock::Text { text },
                            PartialBlock::ToolUse { id, name } => {
                                let input: Value = if state.tool_input_buffer.is_empty() {
                                    Value::Object(Default::default())
                                } else {
                                    serde_json::from_str(&state.tool_input_buffer).unwrap_or_else(|e| {
                                        tracing::warn!(error = %e, "failed to parse tool input json, using empty object");
                                        Value::Object(Default::default())
                                    })
                                };
                                ContentBlock::ToolUse { id, name, input }
                            }
                        };
                        state.current_blocks.push(content_block);
                    }
                    let _ = tx.send(FrontendChatEvent::ContentBlockStop { index });
                }

                StreamEvent::MessageStop => {
                    let assistant_message = ConversationMessage {
                        message_id: Uuid::new_v4(),
                        conversation_id,
                        role: Role::Assistant,
                        content: state.current_blocks.clone(),
                    };
                    messages.push(assistant_message.clone());
                    conversations.add_pending_message(assistant_message.clone()).await?;
                    let _ = tx.send(FrontendChatEvent::MessageStop);
                    let _ = tx.send(FrontendChatEvent::AssistantMessage { message: assistant_message });
                }

                StreamEvent::Error { message } => {
                    let _ = tx.send(FrontendChatEvent::Error { error_message: message.clone() });
                    return Err(ChatError::LlmStreamError { reason: message });
                }
            }
        }

        if !state.has_tool_use {
            conversations.commit_pending(conversation_id).await?;
            return Ok(());
        }

        let tool_use = state.current_blocks.iter().rev().find_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } => {
                Some(ToolUseRequest { id: id.clone(), name: name.clone(), input: input.clone() })
            }
            _ => None,
        });

        let Some(tool_use) = tool_use else {
            conversations.commit_pending(conversation_id).await?;
            return Ok(());
        };

        let tool_result_block = assistant.handle_tool_use(&tool_use, user_id).await?;
        let tool_message = ConversationMessage {
            message_id: Uuid::new_v4(),
            conversation_id,
            role: Role::User,
            content: vec![tool_result_block],
        };
        messages.push(tool_message.clone());
        conversations.add_pending_message(tool_message.clone()).await?;
        let _ = tx.send(FrontendChatEvent::ToolResultMessage { message: tool_message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_block_variants_carry_expected_fields() {
        let text = FrontendContentBlock::Text { text: "hi".into() };
        match text {
            FrontendContentBlock::Text { text } => assert_eq!(text, "hi"),
            _ => panic!("expected text block"),
        }
    }
}
