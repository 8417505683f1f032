//! Tool catalogue for the LLM assistant: `rag_search` and the internal
//! `multi_query` tool used to force deterministic query expansion.

use serde_json::json;

use crate::llm::ToolDefinition;

pub const RAG_SEARCH: &str = "rag_search";
pub const MULTI_QUERY: &str = "multi_query_tool";
pub const SUMMARY: &str = "summary_tool";

pub fn rag_search_tool() -> ToolDefinition {
    ToolDefinition {
        name: RAG_SEARCH.into(),
        description: "Search the user's indexed documents for content relevant to their question. \
            Use this whenever answering requires information from the user's own sources rather than \
            general knowledge."
            .into(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "rag_query": {
                    "type": "string",
                    "description": "The search query to run against the indexed documents",
                }
            },
            "required": ["rag_query"],
        }),
    }
}

pub fn multi_query_tool() -> ToolDefinition {
    ToolDefinition {
        name: MULTI_QUERY.into(),
        description: "Generate a set of alternative phrasings of a search query to widen retrieval recall.".into(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "queries": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Alternative search queries covering the same information need",
                }
            },
            "required": ["queries"],
        }),
    }
}

/// Forces a structured `{summary, keywords}` response when generating a
/// source summary; used by `kollektiv-worker`.
pub fn summary_tool() -> ToolDefinition {
    ToolDefinition {
        name: SUMMARY.into(),
        description: "Record a concise summary and keyword list for a set of indexed documents.".into(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "A 100-150 word summary of the main topics and content type",
                },
                "keywords": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "5-10 specific keywords that appear in the content",
                }
            },
            "required": ["summary", "keywords"],
        }),
    }
}

pub fn force_tool_choice(name: &str) -> serde_json::Value {
    json!({"type": "tool", "name": name})
}
