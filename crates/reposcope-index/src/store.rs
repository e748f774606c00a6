//! Partitioned in-memory vector store.
//!
//! One collection per `(repository, kind)` partition. Reads share an
//! `RwLock` so concurrent queries never block each other; writes touching
//! the same collection serialize on the lock.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use serde_json::Value;

/// Upper bound on `top_k`, capping downstream rendering and token cost.
pub const MAX_TOP_K: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("collection error: {0}")]
    Collection(String),

    #[error("upsert error: {0}")]
    Upsert(String),

    #[error("search error: {0}")]
    Search(String),
}

#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    /// Seconds since epoch of the underlying record, for recency tie-breaks.
    pub timestamp: Option<i64>,
    pub payload: HashMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub timestamp: Option<i64>,
    pub payload: HashMap<String, Value>,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait VectorStore: Send + Sync {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: usize,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Insert or replace points by id; returns the number written.
    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<usize, StoreError>>;

    /// Nearest neighbors by cosine similarity, descending. Ties break on the
    /// most recent timestamp, then on stable insertion order. A collection
    /// that does not exist yields an empty result, not an error.
    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> BoxFuture<'_, Result<Vec<ScoredPoint>, StoreError>>;

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), StoreError>>;

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<usize, StoreError>>;
}

struct StoredPoint {
    vector: Vec<f32>,
    timestamp: Option<i64>,
    payload: HashMap<String, Value>,
    insert_seq: u64,
}

struct Collection {
    points: HashMap<String, StoredPoint>,
    next_seq: u64,
}

pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore").finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        _vector_size: usize,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| StoreError::Collection(e.to_string()))?;
            cols.entry(collection).or_insert_with(|| Collection {
                points: HashMap::new(),
                next_seq: 0,
            });
            Ok(())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<usize, StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| StoreError::Upsert(e.to_string()))?;
            let col = cols
                .get_mut(&collection)
                .ok_or_else(|| StoreError::Upsert(format!("collection {collection} not found")))?;
            let written = points.len();
            for p in points {
                let insert_seq = col.next_seq;
                col.next_seq += 1;
                col.points.insert(
                    p.id,
                    StoredPoint {
                        vector: p.vector,
                        timestamp: p.timestamp,
                        payload: p.payload,
                        insert_seq,
                    },
                );
            }
            Ok(written)
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> BoxFuture<'_, Result<Vec<ScoredPoint>, StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| StoreError::Search(e.to_string()))?;
            let Some(col) = cols.get(&collection) else {
                return Ok(Vec::new());
            };

            let mut scored: Vec<(f32, Option<i64>, u64, &String, &StoredPoint)> = col
                .points
                .iter()
                .map(|(id, sp)| {
                    (
                        cosine_similarity(&vector, &sp.vector),
                        sp.timestamp,
                        sp.insert_seq,
                        id,
                        sp,
                    )
                })
                .collect();

            scored.sort_by(|a, b| {
                b.0.partial_cmp(&a.0)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.1.cmp(&a.1))
                    .then_with(|| a.2.cmp(&b.2))
            });
            scored.truncate(top_k.min(MAX_TOP_K));

            Ok(scored
                .into_iter()
                .map(|(score, timestamp, _, id, sp)| ScoredPoint {
                    id: id.clone(),
                    score,
                    timestamp,
                    payload: sp.payload.clone(),
                })
                .collect())
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| StoreError::Collection(e.to_string()))?;
            cols.remove(&collection);
            Ok(())
        })
    }

    fn count(&self, collection: &str) -> BoxFuture<'_, Result<usize, StoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| StoreError::Collection(e.to_string()))?;
            Ok(cols.get(&collection).map_or(0, |c| c.points.len()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, vector: Vec<f32>, timestamp: Option<i64>) -> VectorPoint {
        VectorPoint {
            id: id.into(),
            vector,
            timestamp,
            payload: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn upsert_and_search_ranks_by_similarity() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("repo::code", 3).await.unwrap();
        store
            .upsert(
                "repo::code",
                vec![
                    point("a", vec![1.0, 0.0, 0.0], None),
                    point("b", vec![0.0, 1.0, 0.0], None),
                ],
            )
            .await
            .unwrap();

        let results = store
            .search("repo::code", vec![1.0, 0.0, 0.0], 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert!((results[0].score - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn missing_collection_searches_empty() {
        let store = InMemoryVectorStore::new();
        let results = store
            .search("nowhere::code", vec![1.0, 0.0], 5)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn ties_break_on_recency_then_insertion() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("repo::commit", 2).await.unwrap();
        // identical vectors → identical scores
        store
            .upsert(
                "repo::commit",
                vec![
                    point("old", vec![1.0, 0.0], Some(100)),
                    point("new", vec![1.0, 0.0], Some(200)),
                    point("first-no-ts", vec![1.0, 0.0], None),
                    point("second-no-ts", vec![1.0, 0.0], None),
                ],
            )
            .await
            .unwrap();

        let results = store
            .search("repo::commit", vec![1.0, 0.0], 10)
            .await
            .unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old", "first-no-ts", "second-no-ts"]);
    }

    #[tokio::test]
    async fn top_k_clamped() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("repo::code", 2).await.unwrap();
        let points: Vec<VectorPoint> = (0..80)
            .map(|i| point(&format!("p{i}"), vec![1.0, 0.0], Some(i)))
            .collect();
        store.upsert("repo::code", points).await.unwrap();

        let results = store
            .search("repo::code", vec![1.0, 0.0], 1000)
            .await
            .unwrap();
        assert_eq!(results.len(), MAX_TOP_K);
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("repo::code", 2).await.unwrap();
        store
            .upsert("repo::code", vec![point("a", vec![1.0, 0.0], None)])
            .await
            .unwrap();
        store
            .upsert("repo::code", vec![point("a", vec![0.0, 1.0], None)])
            .await
            .unwrap();
        assert_eq!(store.count("repo::code").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn partitions_are_isolated() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("repo::code", 2).await.unwrap();
        store.ensure_collection("repo::commit", 2).await.unwrap();
        store
            .upsert("repo::code", vec![point("code-a", vec![1.0, 0.0], None)])
            .await
            .unwrap();

        let commits = store
            .search("repo::commit", vec![1.0, 0.0], 10)
            .await
            .unwrap();
        assert!(commits.is_empty());
        assert_eq!(store.count("repo::code").await.unwrap(), 1);
        assert_eq!(store.count("repo::commit").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_collection_removes() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("repo::code", 2).await.unwrap();
        store
            .upsert("repo::code", vec![point("a", vec![1.0, 0.0], None)])
            .await
            .unwrap();
        store.delete_collection("repo::code").await.unwrap();
        assert_eq!(store.count("repo::code").await.unwrap(), 0);
    }

    #[test]
    fn cosine_similarity_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < f32::EPSILON);
    }

    #[test]
    fn cosine_similarity_zero_vector() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn concurrent_readers_and_writer() {
        let store = std::sync::Arc::new(InMemoryVectorStore::new());
        store.ensure_collection("r::code", 2).await.unwrap();
        store.ensure_collection("other::code", 2).await.unwrap();

        let writer = {
            let store = std::sync::Arc::clone(&store);
            tokio::spawn(async move {
                for i in 0..50 {
                    store
                        .upsert("other::code", vec![point(&format!("p{i}"), vec![1.0, 0.0], None)])
                        .await
                        .unwrap();
                }
            })
        };
        let reader = {
            let store = std::sync::Arc::clone(&store);
            tokio::spawn(async move {
                for _ in 0..50 {
                    store.search("r::code", vec![1.0, 0.0], 5).await.unwrap();
                }
            })
        };
        writer.await.unwrap();
        reader.await.unwrap();
        assert_eq!(store.count("other::code").await.unwrap(), 50);
    }
}
