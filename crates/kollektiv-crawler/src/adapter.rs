//! Crawl submission, webhook wiring, and result pagination.
//!
//! Builds request params (including the webhook URL the crawler will call
//! back), submits with retry on transient failures, then walks the
//! crawler's own `next`-cursor pagination to accumulate every page before
//! handing documents back.

use std::time::Duration;

use kollektiv_core::models::{CrawlConfig, Document, DocumentMetadata};
use kollektiv_core::{Backoff, KollektivError, RetryPolicy};
use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use crate::error::{classify_status, parse_retry_after};

const SERVICE: &str = "firecrawl";
const DEFAULT_API_BASE: &str = "https://api.firecrawl.dev/v1";

/// Extract and parse the `Retry-After` header before the response body is
/// consumed (`reqwest::Response::text` takes the body by value).
fn retry_after_from(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after)
}

pub struct CrawlRequest {
    pub url: Url,
    pub config: CrawlConfig,
    pub webhook_url: String,
}

#[derive(Debug, Clone)]
pub struct CrawlSubmission {
    pub firecrawl_id: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PageResult {
    markdown: Option<String>,
    metadata: PageMetadata,
}

#[derive(Debug, Deserialize, Default)]
struct PageMetadata {
    title: Option<String>,
    description: Option<String>,
    #[serde(rename = "sourceURL")]
    source_url: Option<String>,
    #[serde(rename = "og:url")]
    og_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultsPage {
    data: Vec<PageResult>,
    next: Option<String>,
}

pub struct CrawlerAdapter {
    client: reqwest::Client,
    api_key: String,
    api_base: Url,
    submit_retry_policy: RetryPolicy,
    fetch_retry_policy: RetryPolicy,
}

impl CrawlerAdapter {
    pub fn new(api_key: String) -> Self {
        Self::with_api_base(api_key, Url::parse(DEFAULT_API_BASE).expect("valid default base"))
    }

    pub fn with_api_base(api_key: String, api_base: Url) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("kollektiv/0.1")
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            api_base,
            submit_retry_policy: RetryPolicy::new(5, Backoff::new(Duration::from_secs(30), Duration::from_secs(300), 2.0)),
            fetch_retry_policy: RetryPolicy::new(5, Backoff::new(Duration::from_secs(10), Duration::from_secs(60), 2.0)),
        }
    }

    /// `POST /crawl`: start an asynchronous crawl, retrying connection
    /// resets, timeouts, and 429/5xx responses.
    pub async fn submit_crawl(&self, request: &CrawlRequest) -> Result<CrawlSubmission, KollektivError> {
        let body = serde_json::json!({
            "url": request.url.as_str(),
            "limit": request.config.page_limit,
            "maxDepth": request.config.max_depth,
            "includePaths": request.config.include_patterns,
            "excludePaths": request.config.exclude_patterns,
            "webhook": request.webhook_url,
        });

        let endpoint = self.api_base.join("crawl").expect("valid join");
        self.submit_retry_policy
            .run(|| async {
                let response = self
                    .client
                    .post(endpoint.clone())
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
                let retry_after = retry_after_from(&response);
                let text = response.text().await.unwrap_or_default();
                if !status.is_success() {
                    return Err(classify_status(SERVICE, status, &text, retry_after));
                }
                let parsed: SubmitResponse = serde_json::from_str(&text)
                    .map_err(|e| KollektivError::NonRetryableExternal {
                        service: SERVICE,
                        reason: format!("unparseable submit response: {e}"),
                    })?;
                Ok(CrawlSubmission {
                    firecrawl_id: parsed.id,
                })
            })
            .await
    }

    /// Walk `next`-cursor pagination until the crawler reports no more
    /// pages, accumulating every page into a [`Document`]. Fails with
    /// [`KollektivError::EmptyContent`] if the crawl produced nothing.
    pub async fn fetch_results(
        &self,
        source_id: Uuid,
        firecrawl_id: &str,
    ) -> Result<Vec<Document>, KollektivError> {
        let mut next_url = Some(format!("{}/crawl/{firecrawl_id}", self.api_base.as_str().trim_end_matches('/')));
        let mut documents = Vec::new();

        while let Some(url) = next_url.take() {
            let page = self.fetch_page(&url).await?;
            for result in page.data {
                let Some(markdown) = result.markdown else { continue };
                documents.push(Document {
                    document_id: Uuid::new_v4(),
                    source_id,
                    content: markdown,
                    metadata: DocumentMetadata {
                        title: result.metadata.title,
                        description: result.metadata.description,
                        source_url: result.metadata.source_url.unwrap_or_default(),
                        og_url: result.metadata.og_url,
                    },
                });
            }
            next_url = page.next;
        }

        if documents.is_empty() {
            return Err(KollektivError::EmptyContent { source_id });
        }
        Ok(documents)
    }

    async fn fetch_page(&self, url: &str) -> Result<ResultsPage, KollektivError> {
        let url = url.to_string();
        self.fetch_retry_policy
            .run(|| {
                let url = url.clone();
                async move {
                    let response = self
                        .client
                        .get(&url)
                        .bearer_auth(&self.api_key)
                        .send()
                        .await
                        .map_err(|e| KollektivError::RetryableExternal {
                            service: SERVICE,
                            reason: e.to_string(),
                            retry_after: None,
                        })?;
                    let status = response.status();
                    let retry_after = retry_after_from(&response);
                    let text = response.text().await.unwrap_or_default();
                    if !status.is_success() {
                        return Err(classify_status(SERVICE, status, &text, retry_after));
                    }
                    serde_json::from_str(&text).map_err(|e| KollektivError::NonRetryableExternal {
                        service: SERVICE,
                        reason: format!("unparseable results page: {e}"),
                    })
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_path_matches_api_route() {
        let request = CrawlRequest {
            url: Url::parse("https://docs.example.com").unwrap(),
            config: CrawlConfig {
                page_limit: 10,
                max_depth: 2,
                include_patterns: vec![],
                exclude_patterns: vec![],
            },
            webhook_url: "https://kollektiv.example.com/webhooks/firecrawl".into(),
        };
        assert!(request.webhook_url.ends_with("/webhooks/firecrawl"));
    }
}
