//! SSE stream parser for the Anthropic Messages API.
//!
//! The wire format sends `event:` then `data:` lines; this parser folds
//! that pair into a single typed [`StreamEvent`].

use serde_json::Value;

use crate::error::{ChatError, ChatResult};
use crate::llm::types::{StreamDelta, StreamEvent};

#[derive(Debug, Default)]
pub struct SseParser {
    current_event_type: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_line(&mut self, line: &str) -> ChatResult<Option<StreamEvent>> {
        let line = line.trim_end();

        if line.starts_with(':') || line.is_empty() {
            return Ok(None);
        }

        if let Some(event_type) = line.strip_prefix("event: ") {
            self.current_event_type = Some(event_type.to_owned());
            return Ok(None);
        }

        if let Some(data) = line.strip_prefix("data: ") {
            let event_type = self.current_event_type.take().unwrap_or_else(|| "unknown".into());
            return self.parse_event(&event_type, data);
        }

        tracing::trace!(line, "ignoring unrecognised SSE line");
        Ok(None)
    }

    fn parse_event(&self, event_type: &str, data: &str) -> ChatResult<Option<StreamEvent>> {
        match event_type {
            "message_start" => {
                let v = parse_json(data)?;
                let message = &v["message"];
                Ok(Some(StreamEvent::MessageStart {
                    message_id: json_string(message, "id"),
                    model: json_string(message, "model"),
                    input_tokens: message["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
                }))
            }

            "content_block_start" => {
                let v = parse_json(data)?;
                let index = v["index"].as_u64().unwrap_or(0) as u32;
                let block = &v["content_block"];
                Ok(Some(StreamEvent::ContentBlockStart {
                    index,
                    content_type: json_string(block, "type"),
                    id: block["id"].as_str().map(String::from),
                    name: block["name"].as_str().map(String::from),
                }))
            }

            "content_block_delta" => {
                let v = parse_json(data)?;
                let index = v["index"].as_u64().unwrap_or(0) as u32;
                let delta_obj = &v["delta"];
                let delta = match json_string(delta_obj, "type").as_str() {
                    "text_delta" => StreamDelta::TextDelta(json_string(delta_obj, "text")),
                    "input_json_delta" => StreamDelta::InputJsonDelta(json_string(delta_obj, "partial_json")),
                    other => {
                        tracing::warn!(delta_type = other, "unknown delta type");
                        return Ok(None);
                    }
                };
                Ok(Some(StreamEvent::ContentBlockDelta { index, delta }))
            }

            "content_block_stop" => {
                let v = parse_json(data)?;
                Ok(Some(StreamEvent::ContentBlockStop {
                    index: v["index"].as_u64().unwrap_or(0) as u32,
                }))
            }

            "message_delta" => {
                let v = parse_json(data)?;
                Ok(Some(StreamEvent::MessageDelta {
                    stop_reason: v["delta"]["stop_reason"].as_str().map(String::from),
                    output_tokens: v["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
                }))
            }

            "message_stop" => Ok(Some(StreamEvent::MessageStop)),
            "ping" => Ok(Some(StreamEvent::Ping)),

            _ => {
                if data.trim() == "[DONE]" {
                    Ok(Some(StreamEvent::MessageStop))
                } else {
                    tracing::trace!(event_type, "ignoring unknown SSE event type");
                    Ok(None)
                }
            }
        }
    }
}

fn parse_json(data: &str) -> ChatResult<Value> {
    serde_json::from_str(data).map_err(|e| ChatError::LlmParseFailed {
        reason: format!("invalid JSON in SSE data: {e}"),
    })
}

fn json_string(v: &Value, field: &str) -> String {
    v[field].as_str().unwrap_or_default().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_message_start() {
        let mut parser = SseParser::new();
        assert!(parser.parse_line("event: message_start").unwrap().is_none());
        let event = parser
            .parse_line(r#"data: {"type":"message_start","message":{"id":"msg_01","model":"claude-sonnet-4-5","role":"assistant","content":[],"stop_reason":null,"usage":{"input_tokens":10,"output_tokens":0}}}"#)
            .unwrap()
            .unwrap();
        match event {
            StreamEvent::MessageStart { message_id, model, input_tokens } => {
                assert_eq!(message_id, "msg_01");
                assert_eq!(model, "claude-sonnet-4-5");
                assert_eq!(input_tokens, 10);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parse_text_delta() {
        let mut parser = SseParser::new();
        parser.parse_line("event: content_block_delta").unwrap();
        let event = parser
            .parse_line(r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#)
            .unwrap()
            .unwrap();
        match event {
            StreamEvent::ContentBlockDelta { index, delta } => {
                assert_eq!(index, 0);
                match delta {
                    StreamDelta::TextDelta(t) => assert_eq!(t, "Hello"),
                    other => panic!("unexpected delta: {other:?}"),
                }
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn parse_input_json_delta() {
        let mut parser = SseParser::new();
        parser.parse_line("event: content_block_delta").unwrap();
        let event = parser
            .parse_line(r#"data: {"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"path\":"}}"#)
            .unwrap()
            .unwrap();
        match event {
            StreamEvent::ContentBlockDelta { delta, .. } => match delta {
                StreamDelta::InputJsonDelta(j) => assert_eq!(j, r#"{"path":"#),
                other => panic!("unexpected delta: {other:?}"),
            },
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn blank_and_comment_lines_ignored() {
        let mut parser = SseParser::new();
        assert!(parser.parse_line("").unwrap().is_none());
        assert!(parser.parse_line(": keepalive").unwrap().is_none());
    }

    #[test]
    fn ping_event() {
        let mut parser = SseParser::new();
        parser.parse_line("event: ping").unwrap();
        let event = parser.parse_line("data: {}").unwrap().unwrap();
        assert!(matches!(event, StreamEvent::Ping));
    }
}
