//! Raw record snapshot kept beside the vector index.
//!
//! Exact lookups (PR by number, timeline merges, repository stats) read
//! from here; the vector store only answers similarity queries. Populated
//! at index time, refreshed by a re-index.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use reposcope_github::source::FetchedRepo;
use reposcope_github::types::{CommitRecord, PullRequestRecord, RepoInfo};

#[derive(Debug, Clone)]
pub struct RepoMetadata {
    pub info: RepoInfo,
    pub commits: Vec<CommitRecord>,
    pub pull_requests: BTreeMap<u64, PullRequestRecord>,
}

impl RepoMetadata {
    #[must_use]
    pub fn from_fetched(fetched: &FetchedRepo) -> Self {
        Self {
            info: fetched.info.clone(),
            commits: fetched.commits.clone(),
            pull_requests: fetched
                .pull_requests
                .iter()
                .map(|pr| (pr.number, pr.clone()))
                .collect(),
        }
    }

    /// Known PR number range, for error messages.
    #[must_use]
    pub fn pr_range(&self) -> Option<(u64, u64)> {
        let min = self.pull_requests.keys().next()?;
        let max = self.pull_requests.keys().next_back()?;
        Some((*min, *max))
    }
}

/// Shared, read-mostly map of indexed repositories.
#[derive(Debug, Default)]
pub struct MetadataStore {
    inner: RwLock<HashMap<String, Arc<RepoMetadata>>>,
}

impl MetadataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, repo_id: &str, metadata: RepoMetadata) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(repo_id.to_owned(), Arc::new(metadata));
        }
    }

    #[must_use]
    pub fn get(&self, repo_id: &str) -> Option<Arc<RepoMetadata>> {
        self.inner.read().ok()?.get(repo_id).cloned()
    }
}
