//! LLM Assistant: a "dumb" stream translator plus tool execution.
//!
//! `stream_response` forwards provider events upward without accumulating
//! state — the Chat Service owns assembling blocks from the stream. Tool
//! execution (`rag_search`, `multi_query_tool`) lives here because it needs
//! the Retriever and an extra non-streaming model call.

use kollektiv_core::models::{ContentBlock, ConversationHistory, ConversationMessage, Role};
use kollektiv_retrieval::Retriever;
use serde_json::Value;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::error::{ChatError, ChatResult};
use crate::llm::{AnthropicClient, ChatRequest, StreamEvent, ToolUseRequest};
use crate::tools::{self, MULTI_QUERY, RAG_SEARCH};

const DEFAULT_MAX_TOKENS: u32 = 8192;
const MULTI_QUERY_COUNT: usize = 3;
const RAG_SEARCH_TOP_N: usize = 3;
const MIN_RELEVANCE_FOR_CONTEXT: &str = "No relevant context found for the original request.";

pub struct LlmAssistant {
    client: AnthropicClient,
    retriever: Retriever,
    model: String,
    system_prompt: String,
}

impl LlmAssistant {
    pub fn new(client: AnthropicClient, retriever: Retriever, model: impl Into<String>) -> Self {
        Self {
            client,
            retriever,
            model: model.into(),
            system_prompt: base_system_prompt("NO DOCUMENTS LOADED YET"),
        }
    }

    /// Rebuild the cached system prompt from the summaries of currently
    /// loaded sources.
    pub fn update_system_prompt(&mut self, summaries: &[(String, String, Vec<String>)]) {
        let rendered = summaries
            .iter()
            .map(|(filename, summary, keywords)| {
                format!("* file: {filename}:\n* summary: {summary}\n* keywords: {}\n", keywords.join(", "))
            })
            .collect::<Vec<_>>()
            .join("\n");
        self.system_prompt = base_system_prompt(&rendered);
    }

    /// Stream raw provider events for the given conversation history. This
    /// does not commit anything; the caller drives the tool-use loop.
    pub async fn stream_response(&self, history: &ConversationHistory) -> ChatResult<UnboundedReceiverStream<ChatResult<StreamEvent>>> {
        let request = ChatRequest {
            model: self.model.clone(),
            system: Some(self.system_prompt.clone()),
            messages: history.messages.clone(),
            tools: vec![tools::rag_search_tool()],
            tool_choice: None,
            max_tokens: DEFAULT_MAX_TOKENS,
        };
        self.client.stream_events(&request).await
    }

    /// Execute a tool call the model requested and return the resulting
    /// tool_result content block.
    pub async fn handle_tool_use(&self, tool_use: &ToolUseRequest, user_id: Uuid) -> ChatResult<ContentBlock> {
        match tool_use.name.as_str() {
            RAG_SEARCH => self.use_rag_search(&tool_use.id, &tool_use.input, user_id).await,
            other => Err(ChatError::UnknownTool { tool_name: other.to_string() }),
        }
    }

    async fn use_rag_search(&self, tool_use_id: &str, input: &Value, user_id: Uuid) -> ChatResult<ContentBlock> {
        let rag_query = input.get("rag_query").and_then(Value::as_str).ok_or_else(|| ChatError::ToolExecutionFailed {
            tool_name: RAG_SEARCH.into(),
            reason: "rag_query missing from tool input".into(),
        })?;

        let expanded = self.generate_multi_query(rag_query, MULTI_QUERY_COUNT).await?;
        let mut combined_queries = expanded;
        combined_queries.push(rag_query.to_string());

        let results = self
            .retriever
            .retrieve(rag_query, &combined_queries, Some(RAG_SEARCH_TOP_N), user_id)
            .await?;

        if results.is_empty() {
            return Ok(ContentBlock::ToolResult {
                tool_use_id: tool_use_id.to_string(),
                content: Value::String(MIN_RELEVANCE_FOR_CONTEXT.to_string()),
                is_error: false,
            });
        }

        let mut ordered: Vec<_> = results.into_values().collect();
        ordered.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap_or(std::cmp::Ordering::Equal));

        let formatted: String = ordered
            .iter()
            .map(|doc| format!("Document's relevance score: {}: \nDocument text: {}: \n--------\n", doc.relevance_score, doc.text))
            .collect();

        let content = format!(
            "Here is context retrieved by RAG search: \n\n{formatted}\n\nPlease use this context to answer my original request, if it's relevant."
        );

        Ok(ContentBlock::ToolResult {
            tool_use_id: tool_use_id.to_string(),
            content: Value::String(content),
            is_error: false,
        })
    }

    /// Generate `n` alternative phrasings of `query` via a forced tool-use
    /// call. A missing or malformed `queries` field is a fatal error.
    pub async fn generate_multi_query(&self, query: &str, n: usize) -> ChatResult<Vec<String>> {
        let request = ChatRequest {
            model: self.model.clone(),
            system: None,
            messages: vec![ConversationMessage {
                message_id: Uuid::new_v4(),
                conversation_id: Uuid::nil(),
                role: Role::User,
                content: vec![ContentBlock::Text { text: query_prompt(query, n) }],
            }],
            tools: vec![tools::multi_query_tool()],
            tool_choice: Some(tools::force_tool_choice(MULTI_QUERY)),
            max_tokens: 1024,
        };

        let turn = self.client.chat(&request).await?;
        let tool_calls = match turn {
            crate::llm::LlmTurn::ToolUse(calls) => calls,
            crate::llm::LlmTurn::Text(_) => {
                return Err(ChatError::LlmParseFailed { reason: "model did not use the multi_query tool".into() });
            }
        };

        let call = tool_calls.first().ok_or_else(|| ChatError::LlmParseFailed {
            reason: "no tool use in multi_query response".into(),
        })?;

        parse_queries(&call.input, n)
    }
}

fn query_prompt(query: &str, n: usize) -> String {
    format!("Generate {n} search queries for the following question: {query}")
}

fn parse_queries(input: &Value, n: usize) -> ChatResult<Vec<String>> {
    let queries = input
        .get("queries")
        .and_then(Value::as_array)
        .ok_or_else(|| ChatError::LlmParseFailed { reason: "response missing 'queries' key".into() })?;

    let mut queries: Vec<String> = queries
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| ChatError::LlmParseFailed { reason: "all queries must be strings".into() })?;

    if queries.is_empty() {
        return Err(ChatError::LlmParseFailed { reason: "empty queries list returned".into() });
    }

    if queries.len() > n {
        queries.truncate(n);
    } else {
        while queries.len() < n {
            let last = queries.last().cloned().unwrap_or_default();
            queries.push(last);
        }
    }

    Ok(queries)
}

fn base_system_prompt(document_summaries: &str) -> String {
    format!(
        "You are Kollektiv, an assistant that answers questions using the user's indexed documents. \
        Use the rag_search tool whenever the answer may depend on those documents rather than general knowledge.\n\n\
        Loaded document summaries:\n{document_summaries}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_queries_truncates_to_n() {
        let input = serde_json::json!({"queries": ["a", "b", "c", "d"]});
        let result = parse_queries(&input, 2).unwrap();
        assert_eq!(result, vec!["a", "b"]);
    }

    #[test]
    fn parse_queries_pads_when_short() {
        let input = serde_json::json!({"queries": ["a"]});
        let result = parse_queries(&input, 3).unwrap();
        assert_eq!(result, vec!["a", "a", "a"]);
    }

    #[test]
    fn parse_queries_rejects_missing_key() {
        let input = serde_json::json!({"foo": "bar"});
        assert!(parse_queries(&input, 3).is_err());
    }

    #[test]
    fn parse_queries_rejects_non_string_entries() {
        let input = serde_json::json!({"queries": [1, 2]});
        assert!(parse_queries(&input, 2).is_err());
    }
}
