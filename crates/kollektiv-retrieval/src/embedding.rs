//! Cohere embedding adapter.
//!
//! Kollektiv standardizes on Cohere for both embedding and reranking since
//! that's the one external key `kollektiv-core::config::AppConfig` carries
//! for this purpose.

use std::time::Duration;

use kollektiv_core::{Backoff, KollektivError, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::error::classify_status;

const SERVICE: &str = "cohere-embed";
const DEFAULT_API_BASE: &str = "https://api.cohere.com/v1";

/// Distinguishes indexing-time embeddings from query-time embeddings, which
/// Cohere's embed-v3 models weight differently.
#[derive(Debug, Clone, Copy)]
pub enum InputType {
    SearchDocument,
    SearchQuery,
}

impl InputType {
    fn as_str(self) -> &'static str {
        match self {
            InputType::SearchDocument => "search_document",
            InputType::SearchQuery => "search_query",
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
    model: &'a str,
    input_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

pub struct CohereEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
    retry_policy: RetryPolicy,
}

impl CohereEmbedder {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            api_key,
            model,
            api_base: DEFAULT_API_BASE.to_string(),
            retry_policy: RetryPolicy::new(3, Backoff::new(Duration::from_millis(500), Duration::from_secs(20), 2.0)),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Batch-embed `texts`, tagged with whether they're being indexed or
    /// queried against via Cohere's per-call `input_type`.
    pub async fn embed(&self, texts: &[String], input_type: InputType) -> Result<Vec<Vec<f32>>, KollektivError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbedRequest {
            texts,
            model: &self.model,
            input_type: input_type.as_str(),
        };
        let endpoint = format!("{}/embed", self.api_base);

        self.retry_policy
            .run(|| async {
                let response = self
                    .client
                    .post(&endpoint)
                    .bearer_auth(&self.api_key)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| KollektivError::RetryableExternal {
                        service: SERVICE,
                        reason: e.to_string(),
                        retry_after: None,
                    })?;

                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                if !status.is_success() {
                    return Err(classify_status(SERVICE, status, &text));
                }
                let parsed: EmbedResponse = serde_json::from_str(&text).map_err(|e| {
                    KollektivError::NonRetryableExternal {
                        service: SERVICE,
                        reason: format!("unparseable embed response: {e}"),
                    }
                })?;
                Ok(parsed.embeddings)
            })
            .await
    }
}
