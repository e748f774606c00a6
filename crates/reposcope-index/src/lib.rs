//! Chunking, embeddings, and the partitioned in-memory vector index.
//!
//! Indexing pipeline: fetched repository records become [`document::Document`]s,
//! the chunker splits them into bounded overlapping segments, the embedder
//! turns each segment into a vector, and the store keeps one logical
//! partition per `(repository, kind)` so code, commit, and pull-request
//! vectors never score against each other.

pub mod chunker;
pub mod document;
pub mod embed;
pub mod error;
pub mod indexer;
pub mod store;

pub use error::IndexError;
