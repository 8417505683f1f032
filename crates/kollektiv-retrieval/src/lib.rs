//! Embedding, per-user vector indexing, and reranked retrieval.

pub mod embedding;
pub mod error;
pub mod reranker;
pub mod retriever;
pub mod vector_index;

pub use embedding::{CohereEmbedder, InputType};
pub use error::{RetrievalError, RetrievalResult};
pub use reranker::{CohereReranker, RerankedDocument};
pub use retriever::{RetrievedDocument, Retriever};
pub use vector_index::{VectorHit, VectorIndex};
