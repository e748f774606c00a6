//! Repository data source contract and the GitHub REST implementation.
//!
//! The indexing pipeline consumes this crate through the [`source::RepoDataSource`]
//! trait; the REST client is a thin, typed wrapper with the transient/permanent
//! error split the pipeline needs for retry decisions.

pub mod rest;
pub mod source;
pub mod types;

pub use rest::{GitHubClient, extract_repo_name};
pub use source::{FetchLimits, FetchedRepo, RepoDataSource, SourceError, fetch_all};
