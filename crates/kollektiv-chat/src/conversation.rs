//! Conversation state management.
//!
//! A user turn's messages land in a pending Redis queue first (so a
//! mid-stream crash never leaves partial state behind), then
//! `commit_pending` atomically folds the queue into the durable
//! conversation history and clears it, via
//! `kollektiv_store::KvRepository::watch_fold_and_clear`.

use kollektiv_core::models::{Conversation, ConversationHistory, ConversationMessage, ContentBlock};
use kollektiv_core::tokenizer;
use kollektiv_store::{DurableRepository, KvRepository};
use uuid::Uuid;

use crate::error::ChatResult;

const DEFAULT_MAX_TOKENS: u32 = 200_000;
const PRUNE_RATIO: f64 = 0.9;

pub struct ConversationManager {
    kv: KvRepository,
    durable: DurableRepository,
    max_tokens: u32,
}

impl ConversationManager {
    pub fn new(kv: KvRepository, durable: DurableRepository) -> Self {
        Self {
            kv,
            durable,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Queue a message for the given conversation. User messages go in
    /// before the stream starts; the assistant's message goes in once the
    /// stream completes.
    pub async fn add_pending_message(&self, message: ConversationMessage) -> ChatResult<ConversationMessage> {
        self.kv.rpush(message.conversation_id, &message).await?;
        tracing::info!(
            conversation_id = %message.conversation_id,
            message_id = %message.message_id,
            role = ?message.role,
            "queued pending message"
        );
        Ok(message)
    }

    pub async fn clear_pending(&self, conversation_id: Uuid) -> ChatResult<()> {
        self.kv.delete::<ConversationMessage>(conversation_id).await?;
        Ok(())
    }

    /// Atomically fold every pending message into the conversation's Redis
    /// history, then persist the pruned history and the newly committed
    /// messages durably.
    pub async fn commit_pending(&self, conversation_id: Uuid) -> ChatResult<()> {
        if self.kv.get::<ConversationHistory>(conversation_id).await?.is_none() {
            self.seed_history(conversation_id).await?;
        }

        let (mut history, pending): (ConversationHistory, Vec<ConversationMessage>) = self
            .kv
            .watch_fold_and_clear(conversation_id, |existing, pending| {
                let mut history = existing.unwrap_or_else(|| ConversationHistory::new(conversation_id, Uuid::nil()));
                history.token_count += estimate_tokens(&pending);
                history.messages.extend(pending);
                Ok(history)
            })
            .await?;

        if pending.is_empty() {
            return Ok(());
        }

        self.prune_history(&mut history);

        self.durable.append_conversation_messages(conversation_id, &pending).await?;
        if let Some(mut conversation) = self.durable.find_conversation(conversation_id).await? {
            conversation.token_count = history.token_count;
            conversation.message_ids.extend(pending.iter().map(|m| m.message_id));
            self.durable.save_conversation(&conversation).await?;
        }

        tracing::info!(
            conversation_id = %conversation_id,
            committed = pending.len(),
            token_count = history.token_count,
            "committed pending messages"
        );
        Ok(())
    }

    async fn seed_history(&self, conversation_id: Uuid) -> ChatResult<()> {
        let user_id = self
            .durable
            .find_conversation(conversation_id)
            .await?
            .map(|c| c.user_id)
            .unwrap_or(Uuid::nil());
        let history = ConversationHistory::new(conversation_id, user_id);
        self.kv.set(conversation_id, &history).await?;
        Ok(())
    }

    pub async fn create_conversation(&self, user_id: Uuid, title: impl Into<String>) -> ChatResult<Conversation> {
        let conversation = Conversation {
            conversation_id: Uuid::new_v4(),
            user_id,
            title: title.into(),
            message_ids: Vec::new(),
            token_count: 0,
            data_sources: Vec::new(),
        };
        self.durable.save_conversation(&conversation).await?;
        Ok(conversation)
    }

    pub async fn history(&self, conversation_id: Uuid) -> ChatResult<ConversationHistory> {
        if let Some(history) = self.kv.get::<ConversationHistory>(conversation_id).await? {
            return Ok(history);
        }
        self.seed_history(conversation_id).await?;
        Ok(self
            .kv
            .get::<ConversationHistory>(conversation_id)
            .await?
            .unwrap_or_else(|| ConversationHistory::new(conversation_id, Uuid::nil())))
    }

    /// Drop the oldest messages until the conversation fits comfortably
    /// under the model's context window.
    fn prune_history(&self, history: &mut ConversationHistory) {
        let ceiling = self.max_tokens as f64 * PRUNE_RATIO;
        while (history.token_count as f64) > ceiling && history.messages.len() > 1 {
            let removed = history.messages.remove(0);
            history.token_count = history.token_count.saturating_sub(estimate_tokens(&[removed]));
        }
    }
}

/// Text blocks count their text, tool_use blocks count their name plus
/// JSON-encoded input, tool_result blocks count their JSON-encoded content.
pub fn estimate_tokens(messages: &[ConversationMessage]) -> u32 {
    let mut total = 0u32;
    for message in messages {
        for block in &message.content {
            match block {
                ContentBlock::Text { text } => total += tokenizer::count_tokens(text),
                ContentBlock::ToolUse { name, input, .. } => {
                    total += tokenizer::count_tokens(name);
                    total += tokenizer::count_tokens(&input.to_string());
                }
                ContentBlock::ToolResult { content, .. } => {
                    total += tokenizer::count_tokens(&content.to_string());
                }
            }
        }
    }
    total
}

pub fn now_title(seed: &str) -> String {
    let trimmed = seed.trim();
    if trimmed.len() <= 60 {
        trimmed.to_string()
    } else {
        format!("{}…", &trimmed[..60])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kollektiv_core::models::Role;

    #[test]
    fn estimate_tokens_counts_text_blocks() {
        let message = ConversationMessage {
            message_id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            role: Role::User,
            content: vec![ContentBlock::Text {
                text: "how does chunking work".into(),
            }],
        };
        assert!(estimate_tokens(&[message]) > 0);
    }

    #[test]
    fn title_truncates_long_seeds() {
        let seed = "a".repeat(100);
        assert_eq!(now_title(&seed).chars().count(), 61);
    }

    #[test]
    fn title_preserved_when_short() {
        assert_eq!(now_title("hello"), "hello");
    }
}
