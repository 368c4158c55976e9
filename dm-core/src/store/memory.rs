use super::{MetadataFilter, QueryHit, Record, Selector, StoreError, VectorStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Current snapshot file version.
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    collections: BTreeMap<String, Vec<Record>>,
}

/// In-memory vector store using cosine distance.
///
/// When opened with a path, every mutation rewrites a JSON snapshot so the
/// store survives restarts.
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    collections: RwLock<BTreeMap<String, Vec<Record>>>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryVectorStore {
    /// A store that lives only as long as this value.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a persistent store, loading the snapshot at `path` if it exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let collections = if fs::try_exists(&path).await? {
            let content = fs::read_to_string(&path).await?;
            let snapshot: Snapshot = serde_json::from_str(&content)?;
            if snapshot.version != SNAPSHOT_VERSION {
                return Err(StoreError::VersionMismatch(snapshot.version));
            }
            info!(path = %path.display(), collections = snapshot.collections.len(), "loaded vector store");
            snapshot.collections
        } else {
            debug!(path = %path.display(), "starting empty vector store");
            BTreeMap::new()
        };

        Ok(Self {
            collections: RwLock::new(collections),
            snapshot_path: Some(path),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    async fn persist(&self, collections: &BTreeMap<String, Vec<Record>>) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let snapshot = SnapshotRef {
            version: SNAPSHOT_VERSION,
            collections,
        };
        let content = serde_json::to_string(&snapshot)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    collections: &'a BTreeMap<String, Vec<Record>>,
}

/// Cosine distance in `[0, 2]`. A zero vector is treated as unrelated.
pub(crate) fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        filter: Option<&MetadataFilter>,
        limit: usize,
    ) -> Result<Vec<QueryHit>, StoreError> {
        let collections = self.collections.read().await;
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits = Vec::new();
        for record in records {
            let Some(vector) = &record.embedding else {
                continue;
            };
            if filter.is_some_and(|f| !f.matches(&record.metadata)) {
                continue;
            }
            if vector.len() != embedding.len() {
                return Err(StoreError::DimensionMismatch {
                    collection: collection.to_string(),
                    expected: vector.len(),
                    found: embedding.len(),
                });
            }
            hits.push(QueryHit {
                id: record.id.clone(),
                document: record.document.clone(),
                metadata: record.metadata.clone(),
                distance: cosine_distance(vector, embedding),
            });
        }

        hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn get(&self, collection: &str, ids: &[String]) -> Result<Vec<Record>, StoreError> {
        let collections = self.collections.read().await;
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| records.iter().find(|r| &r.id == id).cloned())
            .collect())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &MetadataFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, StoreError> {
        let collections = self.collections.read().await;
        let Some(records) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(records
            .iter()
            .filter(|r| filter.matches(&r.metadata))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn add(&self, collection: &str, records: Vec<Record>) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let existing = collections.entry(collection.to_string()).or_default();

        for record in records {
            match existing.iter_mut().find(|r| r.id == record.id) {
                Some(slot) => *slot = record,
                None => existing.push(record),
            }
        }

        self.persist(&collections).await
    }

    async fn delete(&self, collection: &str, selector: &Selector) -> Result<usize, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(records) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let before = records.len();
        match selector {
            Selector::Ids(ids) => records.retain(|r| !ids.contains(&r.id)),
            Selector::Filter(filter) => records.retain(|r| !filter.matches(&r.metadata)),
            Selector::All => records.clear(),
        }
        let removed = before - records.len();

        if removed > 0 {
            self.persist(&collections).await?;
        }
        Ok(removed)
    }

    async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).map_or(0, Vec::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChunkMetadata;
    use tempfile::TempDir;

    fn record(id: &str, act: &str, embedding: Vec<f32>) -> Record {
        Record::new(
            id,
            format!("document {id}"),
            ChunkMetadata {
                act: Some(act.to_string()),
                ..Default::default()
            },
        )
        .with_embedding(embedding)
    }

    #[test]
    fn test_cosine_distance() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[tokio::test]
    async fn test_query_orders_and_filters() {
        let store = MemoryVectorStore::new();
        store
            .add(
                "campaign",
                vec![
                    record("far", "Act I", vec![0.0, 1.0]),
                    record("near", "Act I", vec![1.0, 0.1]),
                    record("other_act", "Act II", vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store.query("campaign", &[1.0, 0.0], None, 10).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["other_act", "near", "far"]);

        let filter = MetadataFilter::eq("act", "Act I");
        let hits = store
            .query("campaign", &[1.0, 0.0], Some(&filter), 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "near");
    }

    #[tokio::test]
    async fn test_missing_collection_is_empty() {
        let store = MemoryVectorStore::new();
        assert!(store.query("nope", &[1.0], None, 5).await.unwrap().is_empty());
        assert_eq!(store.count("nope").await.unwrap(), 0);
        assert!(store.get("nope", &["a".to_string()]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let store = MemoryVectorStore::new();
        store
            .add("c", vec![record("a", "Act I", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();
        let result = store.query("c", &[1.0, 0.0], None, 5).await;
        assert!(matches!(result, Err(StoreError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn test_upsert_and_delete() {
        let store = MemoryVectorStore::new();
        store.add("c", vec![record("a", "Act I", vec![1.0])]).await.unwrap();
        store.add("c", vec![record("a", "Act II", vec![1.0])]).await.unwrap();
        assert_eq!(store.count("c").await.unwrap(), 1);

        let got = store.get("c", &["a".to_string()]).await.unwrap();
        assert_eq!(got[0].metadata.act.as_deref(), Some("Act II"));

        let removed = store
            .delete("c", &Selector::Filter(MetadataFilter::eq("act", "Act II")))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count("c").await.unwrap(), 0);

        store
            .add(
                "c",
                vec![record("b", "Act I", vec![1.0]), record("c", "Act III", vec![1.0])],
            )
            .await
            .unwrap();
        assert_eq!(store.delete("c", &Selector::All).await.unwrap(), 2);
        assert_eq!(store.count("c").await.unwrap(), 0);
        assert_eq!(store.delete("missing", &Selector::All).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("store").join("vector_store.json");

        {
            let store = MemoryVectorStore::open(&path).await.unwrap();
            store
                .add("world_state", vec![record("current_world_state", "Act I", vec![0.5, 0.5])])
                .await
                .unwrap();
        }

        let reopened = MemoryVectorStore::open(&path).await.unwrap();
        let got = reopened
            .get("world_state", &["current_world_state".to_string()])
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].embedding, Some(vec![0.5, 0.5]));
    }
}
