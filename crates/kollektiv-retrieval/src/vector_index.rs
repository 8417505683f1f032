//! Per-user vector collections.
//!
//! One collection per user, created on first use, storing each chunk's
//! embedding alongside enough payload to render a citation (`source_url`,
//! `page_title`) without a round trip back to Postgres.

use std::collections::HashMap;

use kollektiv_core::models::Chunk;
use kollektiv_core::KollektivError;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, GetPointsBuilder, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use uuid::Uuid;

use crate::embedding::{CohereEmbedder, InputType};
use crate::error::RetrievalError;

/// A single retrieved chunk before reranking.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub chunk_id: Uuid,
    pub text: String,
    pub distance: f32,
    pub page_title: String,
    pub page_url: String,
}

pub struct VectorIndex {
    client: Qdrant,
    embedder: CohereEmbedder,
    vector_size: u64,
}

fn collection_for(user_id: Uuid) -> String {
    format!("kollektiv_user_{user_id}")
}

impl VectorIndex {
    pub fn new(client: Qdrant, embedder: CohereEmbedder, vector_size: u64) -> Self {
        Self {
            client,
            embedder,
            vector_size,
        }
    }

    pub async fn connect(qdrant_url: &str, embedder: CohereEmbedder, vector_size: u64) -> Result<Self, KollektivError> {
        let client = Qdrant::from_url(qdrant_url)
            .build()
            .map_err(|e| RetrievalError::VectorStore(e.to_string()))?;
        Ok(Self::new(client, embedder, vector_size))
    }

    async fn ensure_collection(&self, user_id: Uuid) -> Result<(), KollektivError> {
        let name = collection_for(user_id);
        let exists = self
            .client
            .collection_exists(&name)
            .await
            .map_err(|e| RetrievalError::VectorStore(e.to_string()))?;
        if exists {
            return Ok(());
        }
        self.client
            .create_collection(
                CreateCollectionBuilder::new(&name)
                    .vectors_config(VectorParamsBuilder::new(self.vector_size, Distance::Cosine)),
            )
            .await
            .map_err(|e| RetrievalError::VectorStore(e.to_string()))?;
        tracing::info!(user_id = %user_id, collection = %name, "created vector collection");
        Ok(())
    }

    /// Embed `chunks` and add only the ones not already present in the
    /// user's collection, avoiding re-embedding work already paid for.
    pub async fn add_chunks(&self, user_id: Uuid, chunks: &[Chunk]) -> Result<usize, KollektivError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        self.ensure_collection(user_id).await?;
        let name = collection_for(user_id);

        let ids: Vec<_> = chunks.iter().map(|c| c.chunk_id.to_string().into()).collect();
        let existing = self
            .client
            .get_points(GetPointsBuilder::new(&name, ids).with_payload(false).with_vectors(false))
            .await
            .map_err(|e| RetrievalError::VectorStore(e.to_string()))?;
        let existing_ids: std::collections::HashSet<Uuid> = existing
            .result
            .iter()
            .filter_map(|p| point_id_as_uuid(p.id.as_ref()))
            .collect();

        let missing: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| !existing_ids.contains(&c.chunk_id))
            .collect();
        if missing.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = missing.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed(&texts, InputType::SearchDocument).await?;

        let mut points = Vec::with_capacity(missing.len());
        for (chunk, vector) in missing.iter().zip(embeddings) {
            let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
            payload.insert("content".to_string(), chunk.content.clone().into());
            payload.insert("source_url".to_string(), chunk.page_url.clone().into());
            payload.insert("page_title".to_string(), chunk.page_title.clone().into());
            points.push(PointStruct::new(chunk.chunk_id.to_string(), vector, payload));
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(&name, points))
            .await
            .map_err(|e| RetrievalError::VectorStore(e.to_string()))?;
        Ok(missing.len())
    }

    /// Query the user's collection with each of `queries`, then dedup the
    /// combined hits by chunk id keeping the smallest distance.
    pub async fn query(&self, user_id: Uuid, queries: &[String], top_k: u64) -> Result<Vec<VectorHit>, KollektivError> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }
        let name = collection_for(user_id);
        let query_vectors = self.embedder.embed(queries, InputType::SearchQuery).await?;

        let mut best: HashMap<Uuid, VectorHit> = HashMap::new();
        for vector in query_vectors {
            let response = self
                .client
                .search_points(
                    SearchPointsBuilder::new(&name, vector, top_k)
                        .with_payload(true),
                )
                .await
                .map_err(|e| RetrievalError::VectorStore(e.to_string()))?;

            for point in response.result {
                let Some(id) = point_id_as_uuid(point.id.as_ref()) else { continue };
                let distance = 1.0 - point.score;
                let payload = point.payload;
                let text = payload_string(&payload, "content");
                let page_title = payload_string(&payload, "page_title");
                let page_url = payload_string(&payload, "source_url");

                best.entry(id)
                    .and_modify(|hit| {
                        if distance < hit.distance {
                            hit.distance = distance;
                        }
                    })
                    .or_insert(VectorHit {
                        chunk_id: id,
                        text,
                        distance,
                        page_title,
                        page_url,
                    });
            }
        }

        Ok(best.into_values().collect())
    }
}

fn point_id_as_uuid(id: Option<&qdrant_client::qdrant::PointId>) -> Option<Uuid> {
    let id = id?;
    match &id.point_id_options {
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(s)) => Uuid::parse_str(s).ok(),
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(_)) => None,
        None => None,
    }
}

fn payload_string(payload: &HashMap<String, qdrant_client::qdrant::Value>, key: &str) -> String {
    payload
        .get(key)
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .unwrap_or_default()
}
