use std::future::Future;
use std::pin::Pin;

use crate::types::{CommitRecord, PullRequestRecord, RepoFile, RepoInfo};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("network error: {0}")]
    Network(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication failed")]
    Auth,

    #[error("response decode failed: {0}")]
    Decode(String),
}

impl SourceError {
    /// Transient failures are worth retrying; permanent ones are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network(_))
    }
}

/// Caller-supplied fetch bounds.
#[derive(Debug, Clone, Copy)]
pub struct FetchLimits {
    pub commits: usize,
    pub pull_requests: usize,
    pub files: usize,
    pub max_file_size: u64,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            commits: 50,
            pull_requests: 100,
            files: 500,
            max_file_size: 100_000,
        }
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Paginated, rate-limited supplier of raw repository records.
pub trait RepoDataSource: Send + Sync {
    fn repo_info(&self) -> BoxFuture<'_, Result<RepoInfo, SourceError>>;

    fn list_commits(&self, limit: usize) -> BoxFuture<'_, Result<Vec<CommitRecord>, SourceError>>;

    fn list_pull_requests(
        &self,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<PullRequestRecord>, SourceError>>;

    fn list_files(
        &self,
        limit: usize,
        max_file_size: u64,
    ) -> BoxFuture<'_, Result<Vec<RepoFile>, SourceError>>;
}

/// Snapshot of everything fetched for one repository. Per-kind failures are
/// tolerated: the failing kind comes back empty and the error is recorded in
/// `warnings`, so indexing remains resumable rather than all-or-nothing.
#[derive(Debug)]
pub struct FetchedRepo {
    pub info: RepoInfo,
    pub commits: Vec<CommitRecord>,
    pub pull_requests: Vec<PullRequestRecord>,
    pub files: Vec<RepoFile>,
    pub warnings: Vec<String>,
}

/// Fetch commits, pull requests, and files concurrently.
///
/// # Errors
///
/// Returns an error only when the repository record itself cannot be
/// fetched; list failures degrade to warnings.
pub async fn fetch_all(
    source: &dyn RepoDataSource,
    limits: FetchLimits,
) -> Result<FetchedRepo, SourceError> {
    let info = source.repo_info().await?;

    let (commits, pull_requests, files) = tokio::join!(
        source.list_commits(limits.commits),
        source.list_pull_requests(limits.pull_requests),
        source.list_files(limits.files, limits.max_file_size),
    );

    let mut warnings = Vec::new();
    let commits = commits.unwrap_or_else(|e| {
        tracing::warn!("commit fetch failed: {e}");
        warnings.push(format!("commits: {e}"));
        Vec::new()
    });
    let pull_requests = pull_requests.unwrap_or_else(|e| {
        tracing::warn!("pull request fetch failed: {e}");
        warnings.push(format!("pull_requests: {e}"));
        Vec::new()
    });
    let files = files.unwrap_or_else(|e| {
        tracing::warn!("file fetch failed: {e}");
        warnings.push(format!("files: {e}"));
        Vec::new()
    });

    tracing::info!(
        commits = commits.len(),
        pull_requests = pull_requests.len(),
        files = files.len(),
        "fetched {}",
        info.full_name
    );

    Ok(FetchedRepo {
        info,
        commits,
        pull_requests,
        files,
        warnings,
    })
}

/// Fixed in-memory data source for tests and offline runs.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug, Clone)]
pub struct StaticSource {
    pub info: RepoInfo,
    pub commits: Vec<CommitRecord>,
    pub pull_requests: Vec<PullRequestRecord>,
    pub files: Vec<RepoFile>,
}

#[cfg(any(test, feature = "mock"))]
impl StaticSource {
    #[must_use]
    pub fn new(info: RepoInfo) -> Self {
        Self {
            info,
            commits: Vec::new(),
            pull_requests: Vec::new(),
            files: Vec::new(),
        }
    }
}

#[cfg(any(test, feature = "mock"))]
impl RepoDataSource for StaticSource {
    fn repo_info(&self) -> BoxFuture<'_, Result<RepoInfo, SourceError>> {
        Box::pin(async move { Ok(self.info.clone()) })
    }

    fn list_commits(&self, limit: usize) -> BoxFuture<'_, Result<Vec<CommitRecord>, SourceError>> {
        Box::pin(async move { Ok(self.commits.iter().take(limit).cloned().collect()) })
    }

    fn list_pull_requests(
        &self,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<PullRequestRecord>, SourceError>> {
        Box::pin(async move { Ok(self.pull_requests.iter().take(limit).cloned().collect()) })
    }

    fn list_files(
        &self,
        limit: usize,
        max_file_size: u64,
    ) -> BoxFuture<'_, Result<Vec<RepoFile>, SourceError>> {
        Box::pin(async move {
            Ok(self
                .files
                .iter()
                .filter(|f| f.size <= max_file_size)
                .take(limit)
                .cloned()
                .collect())
        })
    }
}
