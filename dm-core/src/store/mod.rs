//! Vector store abstraction.
//!
//! The retrieval engine only needs nearest-neighbour search with metadata
//! filtering plus id lookups, so the store is a trait. [`MemoryVectorStore`]
//! is the bundled implementation.

mod filter;
mod memory;
mod metadata;

pub use filter::MetadataFilter;
pub use memory::MemoryVectorStore;
#[cfg(test)]
pub(crate) use memory::cosine_distance;
pub use metadata::{ChunkMetadata, FUTURE_POSSIBILITIES};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Errors from vector store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Embedding dimension mismatch in {collection}: expected {expected}, found {found}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        found: usize,
    },

    #[error("Unsupported snapshot version {0}")]
    VersionMismatch(u32),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// A stored document with its metadata and optional embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub document: String,
    #[serde(default)]
    pub metadata: ChunkMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Record {
    pub fn new(id: impl Into<String>, document: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self {
            id: id.into(),
            document: document.into(),
            metadata,
            embedding: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// A nearest-neighbour search result. Lower distance is more similar.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub id: String,
    pub document: String,
    pub metadata: ChunkMetadata,
    pub distance: f32,
}

/// Which records a delete applies to.
#[derive(Debug, Clone)]
pub enum Selector {
    Ids(Vec<String>),
    Filter(MetadataFilter),
    /// Every record in the collection.
    All,
}

/// A document collection store with similarity search.
///
/// Querying or reading a collection that does not exist yields no results;
/// writing creates it.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Up to `limit` records nearest to `embedding` that pass `filter`,
    /// ordered by ascending distance.
    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<QueryHit>, StoreError>;

    /// Records with the given ids, in the order requested. Missing ids are skipped.
    async fn get(&self, collection: &str, ids: &[String]) -> Result<Vec<Record>, StoreError>;

    /// Records passing `filter` in insertion order.
    async fn find(
        &self,
        collection: &str,
        filter: &MetadataFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, StoreError>;

    /// Insert or replace records by id.
    async fn add(&self, collection: &str, records: Vec<Record>) -> Result<(), StoreError>;

    /// Remove records, returning how many were deleted.
    async fn delete(&self, collection: &str, selector: &Selector) -> Result<usize, StoreError>;

    async fn count(&self, collection: &str) -> Result<usize, StoreError>;
}

/// Empty each named collection, returning the number of records removed.
pub async fn clear_collections(
    store: &dyn VectorStore,
    collections: &[&str],
) -> Result<usize, StoreError> {
    let mut removed = 0;
    for collection in collections {
        let n = store.delete(collection, &Selector::All).await?;
        info!(%collection, removed = n, "collection cleared");
        removed += n;
    }
    Ok(removed)
}
