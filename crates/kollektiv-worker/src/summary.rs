//! Summary Generator: produces a short summary and keyword list for
//! a source's documents via a forced tool-use call, grounded directly on
//! `summary_manager.py`'s sample-then-summarize approach.

use kollektiv_chat::llm::{AnthropicClient, ChatRequest};
use kollektiv_chat::tools::{self, SUMMARY};
use kollektiv_core::models::{ConversationMessage, Document, Role, SourceSummary};
use rand::seq::SliceRandom;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{WorkerError, WorkerResult};

const N_SAMPLES_MAX: usize = 5;
const CONTENT_EXCERPT_CHARS: usize = 500;
const SUMMARY_MAX_TOKENS: u32 = 1024;

const SUMMARY_SYSTEM_PROMPT: &str = "You analyze web content and produce a concise summary and a list of keywords. \
    Always respond by calling the summary_tool with your findings, never as plain text.";

pub struct SummaryGenerator {
    client: AnthropicClient,
    model: String,
    max_samples: usize,
    sample_chars: usize,
}

impl SummaryGenerator {
    pub fn new(client: AnthropicClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            max_samples: N_SAMPLES_MAX,
            sample_chars: CONTENT_EXCERPT_CHARS,
        }
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples;
        self
    }

    pub fn with_sample_chars(mut self, sample_chars: usize) -> Self {
        self.sample_chars = sample_chars;
        self
    }

    pub async fn generate(&self, source_id: Uuid, documents: &[Document]) -> WorkerResult<SourceSummary> {
        let (unique_urls, unique_titles) = unique_urls_and_titles(documents);
        let sample = select_samples(documents, self.max_samples);
        let input_text = format_summary_input(&sample, &unique_urls, &unique_titles, self.sample_chars);

        let request = ChatRequest {
            model: self.model.clone(),
            system: Some(SUMMARY_SYSTEM_PROMPT.into()),
            messages: vec![ConversationMessage {
                message_id: Uuid::new_v4(),
                conversation_id: Uuid::nil(),
                role: Role::User,
                content: vec![kollektiv_core::models::ContentBlock::Text { text: input_text }],
            }],
            tools: vec![tools::summary_tool()],
            tool_choice: Some(tools::force_tool_choice(SUMMARY)),
            max_tokens: SUMMARY_MAX_TOKENS,
        };

        let turn = self.client.chat(&request).await.map_err(|e| WorkerError::SummaryFailed {
            source_id,
            reason: e.to_string(),
        })?;

        parse_summary(turn, source_id)
    }
}

fn unique_urls_and_titles(documents: &[Document]) -> (Vec<String>, Vec<String>) {
    let mut urls: Vec<String> = documents
        .iter()
        .map(|d| d.metadata.source_url.clone())
        .filter(|u| !u.is_empty())
        .collect();
    urls.sort();
    urls.dedup();

    let mut titles: Vec<String> = documents
        .iter()
        .filter_map(|d| d.metadata.title.clone())
        .filter(|t| !t.is_empty())
        .collect();
    titles.sort();
    titles.dedup();

    (urls, titles)
}

fn select_samples(documents: &[Document], n_samples_max: usize) -> Vec<&Document> {
    if documents.len() <= n_samples_max {
        return documents.iter().collect();
    }
    let mut rng = rand::thread_rng();
    let mut all: Vec<&Document> = documents.iter().collect();
    all.shuffle(&mut rng);
    all.truncate(n_samples_max);
    all
}

fn format_summary_input(
    sample: &[&Document],
    unique_urls: &[String],
    unique_titles: &[String],
    sample_chars: usize,
) -> String {
    let samples_json: Vec<Value> = sample
        .iter()
        .map(|doc| {
            let content = if doc.content.len() > sample_chars {
                let mut excerpt: String = doc.content.chars().take(sample_chars).collect();
                excerpt.push_str("...");
                excerpt
            } else {
                doc.content.clone()
            };
            serde_json::json!({
                "title": doc.metadata.title,
                "url": doc.metadata.source_url,
                "content": content,
            })
        })
        .collect();

    format!(
        "Analyze this web content and provide a summary and keywords.\n\n\
        Source URLs ({} total):\n{}\n\n\
        Document Titles ({} total):\n{}\n\n\
        Sample Content ({} documents):\n{}\n\n\
        Generate:\n\
        1. A concise summary (100-150 words) describing the main topics and content type\n\
        2. 5-10 specific keywords that appear in the content\n\n\
        Return as JSON with 'summary' and 'keywords' fields.",
        unique_urls.len(),
        serde_json::to_string_pretty(unique_urls).unwrap_or_default(),
        unique_titles.len(),
        serde_json::to_string_pretty(unique_titles).unwrap_or_default(),
        sample.len(),
        serde_json::to_string_pretty(&samples_json).unwrap_or_default(),
    )
}

fn parse_summary(turn: kollektiv_chat::llm::LlmTurn, source_id: Uuid) -> WorkerResult<SourceSummary> {
    let tool_uses = match turn {
        kollektiv_chat::llm::LlmTurn::ToolUse(uses) => uses,
        kollektiv_chat::llm::LlmTurn::Text(_) => {
            return Err(WorkerError::SummaryFailed {
                source_id,
                reason: "no tool use in response".into(),
            })
        }
    };

    let tool_use = tool_uses.first().ok_or_else(|| WorkerError::SummaryFailed {
        source_id,
        reason: "no tool use in response".into(),
    })?;

    let summary = tool_use
        .input
        .get("summary")
        .and_then(Value::as_str)
        .ok_or_else(|| WorkerError::SummaryFailed { source_id, reason: "missing 'summary' field".into() })?
        .to_string();

    let keywords: Vec<String> = tool_use
        .input
        .get("keywords")
        .and_then(Value::as_array)
        .ok_or_else(|| WorkerError::SummaryFailed { source_id, reason: "missing 'keywords' field".into() })?
        .iter()
        .filter_map(|v| v.as_str().map(String::from))
        .collect();

    Ok(SourceSummary { summary_id: Uuid::new_v4(), source_id, summary, keywords })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kollektiv_core::models::DocumentMetadata;

    fn doc(title: &str, url: &str, content: &str) -> Document {
        Document {
            document_id: Uuid::new_v4(),
            source_id: Uuid::new_v4(),
            content: content.into(),
            metadata: DocumentMetadata {
                title: Some(title.into()),
                description: None,
                source_url: url.into(),
                og_url: None,
            },
        }
    }

    #[test]
    fn select_samples_returns_all_when_under_limit() {
        let docs = vec![doc("a", "u1", "c1"), doc("b", "u2", "c2")];
        let sample = select_samples(&docs, 5);
        assert_eq!(sample.len(), 2);
    }

    #[test]
    fn select_samples_caps_at_n_samples_max() {
        let docs: Vec<Document> = (0..10).map(|i| doc(&format!("t{i}"), &format!("u{i}"), "c")).collect();
        let sample = select_samples(&docs, 5);
        assert_eq!(sample.len(), 5);
    }

    #[test]
    fn unique_urls_and_titles_dedups_and_drops_empty() {
        let docs = vec![doc("a", "u1", "c"), doc("a", "u1", "c"), doc("", "", "c")];
        let (urls, titles) = unique_urls_and_titles(&docs);
        assert_eq!(urls, vec!["u1".to_string()]);
        assert_eq!(titles, vec!["a".to_string()]);
    }

    #[test]
    fn parse_summary_extracts_fields_from_tool_use() {
        let turn = kollektiv_chat::llm::LlmTurn::ToolUse(vec![kollektiv_chat::llm::ToolUseRequest {
            id: "tool_1".into(),
            name: SUMMARY.into(),
            input: serde_json::json!({"summary": "a summary", "keywords": ["rag", "chunking"]}),
        }]);
        let source_id = Uuid::new_v4();
        let summary = parse_summary(turn, source_id).unwrap();
        assert_eq!(summary.summary, "a summary");
        assert_eq!(summary.keywords, vec!["rag".to_string(), "chunking".to_string()]);
        assert_eq!(summary.source_id, source_id);
    }

    #[test]
    fn parse_summary_rejects_text_only_response() {
        let turn = kollektiv_chat::llm::LlmTurn::Text("no tool call".into());
        assert!(parse_summary(turn, Uuid::new_v4()).is_err());
    }
}
