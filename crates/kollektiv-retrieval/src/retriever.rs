//! Retrieval orchestration: multi-query vector search, dedup, rerank,
//! score filter, top-N truncation.
//!
//! Grounded on `llm_assistant.py`'s `use_rag_search` / `preprocess_ranked_documents`:
//! the assistant expands the user's question into several phrasings, the
//! vector store answers all of them at once, and the reranker gets the
//! final say on relevance against the *original* question.

use std::collections::HashMap;
use std::time::Instant;

use kollektiv_core::KollektivError;
use uuid::Uuid;

use crate::reranker::CohereReranker;
use crate::vector_index::VectorIndex;

const MIN_RELEVANCE_SCORE: f32 = 0.1;
const VECTOR_TOP_K: u64 = 20;

#[derive(Debug, Clone)]
pub struct RetrievedDocument {
    pub index: usize,
    pub text: String,
    pub relevance_score: f32,
    pub page_title: String,
    pub page_url: String,
}

pub struct Retriever {
    vector_index: VectorIndex,
    reranker: CohereReranker,
}

impl Retriever {
    pub fn new(vector_index: VectorIndex, reranker: CohereReranker) -> Self {
        Self {
            vector_index,
            reranker,
        }
    }

    /// Search with `combined_queries`, dedup, rerank against `rag_query`,
    /// drop anything below the relevance floor, then keep at most `top_n`.
    pub async fn retrieve(
        &self,
        rag_query: &str,
        combined_queries: &[String],
        top_n: Option<usize>,
        user_id: Uuid,
    ) -> Result<HashMap<usize, RetrievedDocument>, KollektivError> {
        let started = Instant::now();

        let hits = self.vector_index.query(user_id, combined_queries, VECTOR_TOP_K).await?;
        if hits.is_empty() {
            tracing::info!(user_id = %user_id, elapsed_ms = started.elapsed().as_millis() as u64, "retrieval found no candidates");
            return Ok(HashMap::new());
        }

        let texts: Vec<String> = hits.iter().map(|h| h.text.clone()).collect();
        let reranked = self.reranker.rerank(rag_query, &texts).await?;

        let mut filtered: Vec<RetrievedDocument> = reranked
            .into_iter()
            .filter(|r| r.relevance_score >= MIN_RELEVANCE_SCORE)
            .map(|r| {
                let hit = &hits[r.index];
                RetrievedDocument {
                    index: r.index,
                    text: r.text,
                    relevance_score: r.relevance_score,
                    page_title: hit.page_title.clone(),
                    page_url: hit.page_url.clone(),
                }
            })
            .collect();

        if let Some(n) = top_n {
            if n < filtered.len() {
                filtered.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
                filtered.truncate(n);
            }
        }

        tracing::info!(
            user_id = %user_id,
            candidates = hits.len(),
            kept = filtered.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "retrieval search+rerank complete"
        );

        Ok(filtered.into_iter().map(|d| (d.index, d)).collect())
    }
}
