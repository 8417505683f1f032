//! Cohere rerank adapter.

use std::time::Duration;

use kollektiv_core::{Backoff, KollektivError, RetryPolicy};
use serde::{Deserialize, Serialize};

use crate::error::classify_status;

const SERVICE: &str = "cohere-rerank";
const DEFAULT_API_BASE: &str = "https://api.cohere.com/v1";

#[derive(Debug, Clone)]
pub struct RerankedDocument {
    pub index: usize,
    pub text: String,
    pub relevance_score: f32,
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Debug, Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

pub struct CohereReranker {
    client: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
    retry_policy: RetryPolicy,
}

impl CohereReranker {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            api_key,
            model: "rerank-english-v3.0".to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            retry_policy: RetryPolicy::new(3, Backoff::new(Duration::from_millis(500), Duration::from_secs(20), 2.0)),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Rerank `documents` against `query`, returning every document's
    /// original index and relevance score. Filtering and truncation are the
    /// retriever's job, not the adapter's.
    pub async fn rerank(&self, query: &str, documents: &[String]) -> Result<Vec<RerankedDocument>, KollektivError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let body = RerankRequest {
            model: &self.model,
            query,
            documents,
            top_n: documents.len(),
        };
        let endpoint = format!("{}/rerank", self.api_base);

        let parsed: RerankResponse = self
            .retry_policy
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
                serde_json::from_str(&text).map_err(|e| KollektivError::NonRetryableExternal {
                    service: SERVICE,
                    reason: format!("unparseable rerank response: {e}"),
                })
            })
            .await?;

        Ok(parsed
            .results
            .into_iter()
            .map(|r| RerankedDocument {
                index: r.index,
                text: documents[r.index].clone(),
                relevance_score: r.relevance_score,
            })
            .collect())
    }
}
