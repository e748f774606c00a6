//! Indexing pipeline: fetched records → documents → chunks → vectors → store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use reposcope_github::source::FetchedRepo;

use crate::chunker::{Chunk, ChunkerConfig, chunk};
use crate::document::{DocKind, Document, documents_from};
use crate::embed::Embedder;
use crate::error::Result;
use crate::store::{VectorPoint, VectorStore};

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub chunker: ChunkerConfig,
    /// Concurrent embedding calls per document batch.
    pub embed_workers: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            embed_workers: 4,
        }
    }
}

/// Summary of one indexing run. Partial failures accumulate here instead of
/// aborting the run.
#[derive(Debug, Default)]
pub struct IndexReport {
    pub documents: usize,
    pub chunks_indexed: usize,
    pub chunks_failed: usize,
    pub errors: Vec<String>,
    /// Set when the run stopped at a cancellation point; the indexed prefix
    /// is valid but the run must not be reported as complete.
    pub cancelled: bool,
    pub duration_ms: u64,
}

/// Collection name for one `(repository, kind)` partition.
#[must_use]
pub fn partition(repo_id: &str, kind: DocKind) -> String {
    format!("{repo_id}::{kind}")
}

pub struct RepoIndexer<S: VectorStore> {
    store: Arc<S>,
    embedder: Arc<dyn Embedder>,
    config: IndexerConfig,
}

impl<S: VectorStore> RepoIndexer<S> {
    #[must_use]
    pub fn new(store: Arc<S>, embedder: Arc<dyn Embedder>, config: IndexerConfig) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Index everything fetched for one repository.
    ///
    /// Embedding failures skip the offending chunk and continue; the run is
    /// cancellable between documents, never mid-document.
    ///
    /// # Errors
    ///
    /// Returns an error when the chunker configuration is invalid or the
    /// store rejects a write; per-chunk embedding failures do not error.
    pub async fn index_repo(
        &self,
        repo_id: &str,
        fetched: &FetchedRepo,
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        let start = Instant::now();
        self.config.chunker.validate()?;
        let mut report = IndexReport::default();

        let dim = self.embedder.dimension();
        for kind in [DocKind::Code, DocKind::Commit, DocKind::PullRequest] {
            self.store
                .ensure_collection(&partition(repo_id, kind), dim)
                .await?;
        }

        let documents = documents_from(fetched);
        let total = documents.len();
        tracing::info!(repo = repo_id, total, "indexing started");

        for doc in &documents {
            if cancel.is_cancelled() {
                tracing::info!(repo = repo_id, done = report.documents, "indexing cancelled");
                report.cancelled = true;
                break;
            }
            let indexed = self.index_document(repo_id, doc, &mut report).await?;
            report.documents += 1;
            report.chunks_indexed += indexed;
        }

        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        tracing::info!(
            repo = repo_id,
            documents = report.documents,
            chunks = report.chunks_indexed,
            failed = report.chunks_failed,
            "indexing finished"
        );
        Ok(report)
    }

    async fn index_document(
        &self,
        repo_id: &str,
        doc: &Document,
        report: &mut IndexReport,
    ) -> Result<usize> {
        let chunks = chunk(doc, &self.config.chunker)?;
        if chunks.is_empty() {
            return Ok(0);
        }

        let embedded: Vec<(Chunk, std::result::Result<Vec<f32>, crate::embed::EmbedError>)> =
            futures::stream::iter(chunks)
                .map(|chunk| {
                    let embedder = Arc::clone(&self.embedder);
                    async move {
                        let text = chunk.embedding_text();
                        let vector = embedder.embed(&text).await;
                        (chunk, vector)
                    }
                })
                .buffer_unordered(self.config.embed_workers.max(1))
                .collect()
                .await;

        let mut points = Vec::with_capacity(embedded.len());
        for (chunk, outcome) in embedded {
            match outcome {
                Ok(vector) => points.push(chunk_point(doc, &chunk, vector)),
                Err(e) => {
                    report.chunks_failed += 1;
                    report
                        .errors
                        .push(format!("{}#{}: {e}", chunk.doc_ident, chunk.seq));
                }
            }
        }

        if points.is_empty() {
            return Ok(0);
        }
        let written = self
            .store
            .upsert(&partition(repo_id, doc.kind), points)
            .await?;
        Ok(written)
    }
}

fn chunk_point(doc: &Document, chunk: &Chunk, vector: Vec<f32>) -> VectorPoint {
    let mut payload: HashMap<String, serde_json::Value> =
        doc.payload.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    payload.insert("kind".into(), json!(chunk.kind.as_str()));
    payload.insert("ident".into(), json!(chunk.doc_ident));
    payload.insert("seq".into(), json!(chunk.seq));
    payload.insert("text".into(), json!(chunk.text));

    VectorPoint {
        id: format!("{}::{}", chunk.doc_ident, chunk.seq),
        vector,
        timestamp: chunk.timestamp.map(|t| t.timestamp()),
        payload,
    }
}
