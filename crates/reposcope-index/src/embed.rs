//! Embedding capability seam.
//!
//! The index never talks to a model backend directly; it sees only
//! `embed(text) -> vector`, so the numeric model is swappable without
//! touching the chunker or store.

use std::future::Future;
use std::pin::Pin;

use reposcope_llm::provider::LlmProvider;

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("embedding backend: {0}")]
    Backend(String),
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait Embedder: Send + Sync {
    /// Deterministic for a given text: no randomness, no external mutable
    /// state in the embedding step itself.
    fn embed(&self, text: &str) -> BoxFuture<'_, Result<Vec<f32>, EmbedError>>;

    fn dimension(&self) -> usize;
}

/// Local feature-hashing embedder: each lowercase alphanumeric token hashes
/// into a signed bucket, the result is L2-normalized. No model download, no
/// network, fully deterministic — the default and test backend.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dim: 256 }
    }
}

impl HashEmbedder {
    #[must_use]
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut acc = vec![0.0f32; self.dim];
        for token in tokenize(text) {
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let bucket = usize::try_from(u64::from_le_bytes(
                bytes[..8].try_into().expect("blake3 output is 32 bytes"),
            ))
            .unwrap_or(usize::MAX)
                % self.dim;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            acc[bucket] += sign;
        }

        let norm: f32 = acc.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut acc {
                *x /= norm;
            }
        }
        acc
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> BoxFuture<'_, Result<Vec<f32>, EmbedError>> {
        let vector = self.embed_sync(text);
        Box::pin(async move { Ok(vector) })
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

/// Adapter exposing an LLM provider's embedding endpoint as an [`Embedder`].
pub struct ProviderEmbedder<P: LlmProvider> {
    provider: P,
    dimension: usize,
}

impl<P: LlmProvider> ProviderEmbedder<P> {
    #[must_use]
    pub fn new(provider: P, dimension: usize) -> Self {
        Self {
            provider,
            dimension,
        }
    }
}

impl<P: LlmProvider> Embedder for ProviderEmbedder<P> {
    fn embed(&self, text: &str) -> BoxFuture<'_, Result<Vec<f32>, EmbedError>> {
        let text = text.to_owned();
        Box::pin(async move {
            self.provider
                .embed(&text)
                .await
                .map_err(|e| EmbedError::Backend(e.to_string()))
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deterministic_for_same_text() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("fn parse_token(input: &str)").await.unwrap();
        let b = embedder.embed("fn parse_token(input: &str)").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn normalized_output() {
        let embedder = HashEmbedder::default();
        let v = embedder.embed("authentication middleware handler").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn empty_text_is_zero_vector() {
        let embedder = HashEmbedder::default();
        let v = embedder.embed("").await.unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
        assert_eq!(v.len(), 256);
    }

    #[tokio::test]
    async fn similar_texts_closer_than_unrelated() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("database connection pooling logic").await.unwrap();
        let b = embedder.embed("connection pooling for the database").await.unwrap();
        let c = embedder.embed("terminal color rendering widget").await.unwrap();
        let dot = |x: &[f32], y: &[f32]| -> f32 { x.iter().zip(y).map(|(a, b)| a * b).sum() };
        assert!(dot(&a, &b) > dot(&a, &c));
    }

    #[test]
    fn dimension_reported() {
        assert_eq!(HashEmbedder::new(64).dimension(), 64);
        assert_eq!(HashEmbedder::new(0).dimension(), 1);
    }

    #[test]
    fn tokenize_splits_identifiers() {
        let tokens: Vec<String> = tokenize("parse_token(input)").collect();
        assert_eq!(tokens, vec!["parse", "token", "input"]);
    }
}
