//! Anthropic Messages API client: streaming and non-streaming chat completions.
//!
//! Conversation state already speaks in `ContentBlock::{Text,ToolUse,ToolResult}`,
//! which lines up with Anthropic's content-block wire shape, so translation is
//! mostly a role/block walk rather than a parallel message model.

use std::sync::Arc;

use futures::StreamExt;
use kollektiv_core::models::{ContentBlock, ConversationMessage, Role};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::{ChatError, ChatResult};
use crate::llm::streaming::SseParser;
use crate::llm::types::{LlmTurn, StreamDelta, StreamEvent, ToolUseRequest, Usage};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<ConversationMessage>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<Value>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub default_model: String,
}

impl LlmClientConfig {
    pub fn anthropic(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: ANTHROPIC_BASE_URL.to_owned(),
            default_model: model.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    config: Arc<LlmClientConfig>,
    http: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(config: LlmClientConfig) -> ChatResult<Self> {
        if config.api_key.is_empty() {
            return Err(ChatError::LlmRequestFailed {
                reason: "missing anthropic api key".into(),
            });
        }
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| ChatError::LlmRequestFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { config: Arc::new(config), http })
    }

    pub async fn chat(&self, request: &ChatRequest) -> ChatResult<LlmTurn> {
        let body = self.build_request_body(request, false);
        let resp = self.send_request(&body).await?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| ChatError::LlmRequestFailed {
            reason: format!("failed to read response body: {e}"),
        })?;
        if !status.is_success() {
            return Err(ChatError::LlmRequestFailed {
                reason: format!("anthropic returned {status}: {text}"),
            });
        }
        let v: Value = serde_json::from_str(&text).map_err(|e| ChatError::LlmParseFailed {
            reason: format!("invalid JSON response: {e}"),
        })?;
        parse_non_streaming_response(&v)
    }

    pub async fn stream_chat_with_callback<F>(&self, request: &ChatRequest, mut on_text: F) -> ChatResult<LlmTurn>
    where
        F: FnMut(&str) + Send,
    {
        let body = self.build_request_body(request, true);
        let resp = self.send_request(&body).await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ChatError::LlmRequestFailed {
                reason: format!("anthropic returned {status}: {text}"),
            });
        }
        consume_stream(resp, &mut on_text).await
    }

    /// Stream raw provider events without accumulating them. Used by the
    /// assistant, which forwards events upward rather than building a final
    /// response itself.
    pub async fn stream_events(&self, request: &ChatRequest) -> ChatResult<UnboundedReceiverStream<ChatResult<StreamEvent>>> {
        let body = self.build_request_body(request, true);
        let resp = self.send_request(&body).await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ChatError::LlmRequestFailed {
                reason: format!("anthropic returned {status}: {text}"),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut parser = SseParser::new();
            let mut byte_stream = resp.bytes_stream();
            let mut line_buffer = String::new();

            loop {
                let chunk = match byte_stream.next().await {
                    Some(Ok(chunk)) => chunk,
                    Some(Err(e)) => {
                        let _ = tx.send(Err(ChatError::LlmStreamError { reason: format!("stream read error: {e}") }));
                        return;
                    }
                    None => return,
                };
                let text = match std::str::from_utf8(&chunk) {
                    Ok(text) => text,
                    Err(e) => {
                        let _ = tx.send(Err(ChatError::LlmStreamError { reason: format!("invalid utf-8 in stream: {e}") }));
                        return;
                    }
                };
                line_buffer.push_str(text);

                while let Some(newline_pos) = line_buffer.find('\n') {
                    let line = line_buffer[..newline_pos].to_owned();
                    line_buffer = line_buffer[newline_pos + 1..].to_owned();

                    match parser.parse_line(&line) {
                        Ok(Some(event)) => {
                            let stop = matches!(event, StreamEvent::MessageStop);
                            if tx.send(Ok(event)).is_err() {
                                return;
                            }
                            if stop {
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            let _ = tx.send(Err(e));
                            return;
                        }
                    }
                }
            }
        });

        Ok(UnboundedReceiverStream::new(rx))
    }

    fn build_request_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let model = if request.model.is_empty() { &self.config.default_model } else { &request.model };
        let mut body = json!({
            "model": model,
            "max_tokens": request.max_tokens,
            "messages": request.messages.iter().map(wire_message).collect::<Vec<_>>(),
        });

        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        if !request.tools.is_empty() {
            body["tools"] = json!(
                request
                    .tools
                    .iter()
                    .map(|t| json!({"name": t.name, "description": t.description, "input_schema": t.input_schema}))
                    .collect::<Vec<_>>()
            );
        }
        if let Some(tool_choice) = &request.tool_choice {
            body["tool_choice"] = tool_choice.clone();
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    async fn send_request(&self, body: &Value) -> ChatResult<reqwest::Response> {
        let url = format!("{}/v1/messages", self.config.base_url);
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.config.api_key)
                .map_err(|e| ChatError::LlmRequestFailed { reason: format!("invalid api key header: {e}") })?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        tracing::debug!(url = %url, model = %body["model"], "sending anthropic request");

        self.http
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(ChatError::from)
    }
}

fn wire_message(message: &ConversationMessage) -> Value {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    json!({
        "role": role,
        "content": message.content.iter().map(wire_content_block).collect::<Vec<_>>(),
    })
}

fn wire_content_block(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => json!({"type": "text", "text": text}),
        ContentBlock::ToolUse { id, name, input } => {
            json!({"type": "tool_use", "id": id, "name": name, "input": input})
        }
        ContentBlock::ToolResult { tool_use_id, content, is_error } => {
            json!({
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": content,
                "is_error": is_error,
            })
        }
    }
}

fn parse_non_streaming_response(v: &Value) -> ChatResult<LlmTurn> {
    let content = v["content"].as_array().ok_or_else(|| ChatError::LlmParseFailed {
        reason: "missing `content` array in response".into(),
    })?;

    let mut text_parts = Vec::new();
    let mut tool_uses = Vec::new();

    for block in content {
        match block["type"].as_str() {
            Some("text") => {
                if let Some(t) = block["text"].as_str() {
                    text_parts.push(t.to_owned());
                }
            }
            Some("tool_use") => tool_uses.push(ToolUseRequest {
                id: block["id"].as_str().unwrap_or_default().to_owned(),
                name: block["name"].as_str().unwrap_or_default().to_owned(),
                input: block["input"].clone(),
            }),
            _ => {}
        }
    }

    if tool_uses.is_empty() {
        Ok(LlmTurn::Text(text_parts.join("")))
    } else {
        Ok(LlmTurn::ToolUse(tool_uses))
    }
}

async fn consume_stream<F>(resp: reqwest::Response, on_text: &mut F) -> ChatResult<LlmTurn>
where
    F: FnMut(&str),
{
    let mut parser = SseParser::new();
    let mut accumulator = StreamAccumulator::default();
    let mut byte_stream = resp.bytes_stream();
    let mut line_buffer = String::new();

    while let Some(chunk_result) = byte_stream.next().await {
        let chunk = chunk_result.map_err(|e| ChatError::LlmStreamError { reason: format!("stream read error: {e}") })?;
        let text = std::str::from_utf8(&chunk)
            .map_err(|e| ChatError::LlmStreamError { reason: format!("invalid utf-8 in stream: {e}") })?;
        line_buffer.push_str(text);

        while let Some(newline_pos) = line_buffer.find('\n') {
            let line = line_buffer[..newline_pos].to_owned();
            line_buffer = line_buffer[newline_pos + 1..].to_owned();

            if let Some(event) = parser.parse_line(&line)? {
                accumulator.apply(&event, on_text);
                if matches!(event, StreamEvent::MessageStop) {
                    return accumulator.into_turn();
                }
            }
        }
    }

    accumulator.into_turn()
}

#[derive(Debug, Default)]
struct StreamAccumulator {
    text: String,
    tool_uses: Vec<ToolUseBuilder>,
    usage: Usage,
}

#[derive(Debug)]
struct ToolUseBuilder {
    id: String,
    name: String,
    input_json: String,
}

impl StreamAccumulator {
    fn apply<F>(&mut self, event: &StreamEvent, on_text: &mut F)
    where
        F: FnMut(&str),
    {
        match event {
            StreamEvent::MessageStart { input_tokens, .. } => {
                self.usage.input_tokens = *input_tokens;
            }
            StreamEvent::ContentBlockStart { content_type, id, name, .. } if content_type == "tool_use" => {
                self.tool_uses.push(ToolUseBuilder {
                    id: id.clone().unwrap_or_default(),
                    name: name.clone().unwrap_or_default(),
                    input_json: String::new(),
                });
            }
            StreamEvent::ContentBlockDelta { delta, .. } => match delta {
                StreamDelta::TextDelta(t) => {
                    self.text.push_str(t);
                    on_text(t);
                }
                StreamDelta::InputJsonDelta(j) => {
                    if let Some(builder) = self.tool_uses.last_mut() {
                        builder.input_json.push_str(j);
                    }
                }
            },
            StreamEvent::MessageDelta { output_tokens, .. } => {
                self.usage.output_tokens = *output_tokens;
            }
            _ => {}
        }
    }

    fn into_turn(self) -> ChatResult<LlmTurn> {
        if self.tool_uses.is_empty() {
            return Ok(LlmTurn::Text(self.text));
        }
        let mut calls = Vec::with_capacity(self.tool_uses.len());
        for builder in self.tool_uses {
            let input: Value = if builder.input_json.is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&builder.input_json).map_err(|e| ChatError::LlmParseFailed {
                    reason: format!("invalid JSON in tool call `{}` input: {e}", builder.name),
                })?
            };
            calls.push(ToolUseRequest { id: builder.id, name: builder.name, input });
        }
        Ok(LlmTurn::ToolUse(calls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user_message(text: &str) -> ConversationMessage {
        ConversationMessage {
            message_id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    #[test]
    fn build_request_body_basic() {
        let config = LlmClientConfig::anthropic("test-key", "claude-sonnet-4-5");
        let client = AnthropicClient::new(config).unwrap();
        let request = ChatRequest {
            model: String::new(),
            system: Some("You are helpful.".into()),
            messages: vec![user_message("Hello")],
            tools: vec![],
            tool_choice: None,
            max_tokens: 1024,
        };

        let body = client.build_request_body(&request, false);
        assert_eq!(body["model"], "claude-sonnet-4-5");
        assert_eq!(body["system"], "You are helpful.");
        assert_eq!(body["max_tokens"], 1024);
        assert!(body.get("stream").is_none());
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"][0]["type"], "text");
    }

    #[test]
    fn build_request_body_with_tool_round_trip() {
        let config = LlmClientConfig::anthropic("test-key", "claude-sonnet-4-5");
        let client = AnthropicClient::new(config).unwrap();
        let assistant = ConversationMessage {
            message_id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            role: Role::Assistant,
            content: vec![ContentBlock::ToolUse {
                id: "tc_01".into(),
                name: "rag_search".into(),
                input: json!({"query": "what is chunking"}),
            }],
        };
        let tool_result = ConversationMessage {
            message_id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            role: Role::User,
            content: vec![ContentBlock::ToolResult {
                tool_use_id: "tc_01".into(),
                content: json!("chunking splits documents"),
                is_error: false,
            }],
        };

        let request = ChatRequest {
            model: "claude-sonnet-4-5".into(),
            system: None,
            messages: vec![user_message("explain chunking"), assistant, tool_result],
            tools: vec![ToolDefinition {
                name: "rag_search".into(),
                description: "search the knowledge base".into(),
                input_schema: json!({"type": "object", "properties": {"query": {"type": "string"}}}),
            }],
            tool_choice: None,
            max_tokens: 1024,
        };

        let body = client.build_request_body(&request, true);
        assert_eq!(body["stream"], true);
        assert_eq!(body["tools"][0]["name"], "rag_search");
        assert_eq!(body["messages"][1]["content"][0]["type"], "tool_use");
        assert_eq!(body["messages"][2]["content"][0]["type"], "tool_result");
        assert_eq!(body["messages"][2]["content"][0]["tool_use_id"], "tc_01");
    }

    #[test]
    fn empty_api_key_rejected() {
        let config = LlmClientConfig::anthropic("", "claude-sonnet-4-5");
        assert!(AnthropicClient::new(config).is_err());
    }

    #[test]
    fn parse_non_streaming_text() {
        let v = json!({
            "content": [{"type": "text", "text": "hello there"}],
        });
        match parse_non_streaming_response(&v).unwrap() {
            LlmTurn::Text(t) => assert_eq!(t, "hello there"),
            other => panic!("unexpected turn: {other:?}"),
        }
    }

    #[test]
    fn parse_non_streaming_tool_use() {
        let v = json!({
            "content": [{"type": "tool_use", "id": "toolu_1", "name": "rag_search", "input": {"query": "x"}}],
        });
        match parse_non_streaming_response(&v).unwrap() {
            LlmTurn::ToolUse(calls) => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "rag_search");
            }
            other => panic!("unexpected turn: {other:?}"),
        }
    }
}
