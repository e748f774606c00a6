//! Thin GitHub REST v3 client implementing [`RepoDataSource`].

use std::future::Future;
use std::pin::Pin;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::source::{RepoDataSource, SourceError};
use crate::types::{CommitRecord, Contributor, PrState, PullRequestRecord, RepoFile, RepoInfo};

const DEFAULT_API_URL: &str = "https://api.github.com";
const PER_PAGE: usize = 100;
const COMMIT_FILES_CAP: usize = 10;
const PR_FILES_CAP: usize = 30;
const PR_COMMENTS_CAP: usize = 10;
const CONTRIBUTORS_CAP: usize = 10;

/// Extensions skipped during the file walk; everything else is fetched and
/// decoded as UTF-8 (lossy).
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "ico", "pdf", "zip", "gz", "exe", "wasm", "woff", "woff2",
];

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Accept either `owner/name` or a full GitHub URL.
#[must_use]
pub fn extract_repo_name(input: &str) -> String {
    let trimmed = input.trim().trim_matches('/');
    if let Some(idx) = trimmed.find("github.com/") {
        let rest = &trimmed[idx + "github.com/".len()..];
        let mut parts = rest.split('/');
        if let (Some(owner), Some(name)) = (parts.next(), parts.next()) {
            let name = name.strip_suffix(".git").unwrap_or(name);
            return format!("{owner}/{name}");
        }
    }
    trimmed.to_owned()
}

pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    repo: String,
    token: Option<String>,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url)
            .field("repo", &self.repo)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl GitHubClient {
    #[must_use]
    pub fn new(repo: &str, token: Option<String>) -> Self {
        Self::with_base_url(repo, token, DEFAULT_API_URL)
    }

    #[must_use]
    pub fn with_base_url(repo: &str, token: Option<String>, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            repo: extract_repo_name(repo),
            token,
        }
    }

    #[must_use]
    pub fn repo(&self) -> &str {
        &self.repo
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, SourceError> {
        let mut req = self
            .client
            .get(format!("{}{path}", self.base_url))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "reposcope");
        if let Some(ref token) = self.token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }

        let response = req
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let rate_exhausted = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                == Some("0");
            return Err(match status.as_u16() {
                429 => SourceError::RateLimited {
                    retry_after_secs: retry_after,
                },
                403 if rate_exhausted => SourceError::RateLimited {
                    retry_after_secs: retry_after,
                },
                401 | 403 => SourceError::Auth,
                404 => SourceError::NotFound(path.to_owned()),
                _ => SourceError::Network(format!("status {status} for {path}")),
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| SourceError::Decode(e.to_string()))
    }

    async fn fetch_commit_detail(&self, sha: &str) -> Result<CommitRecord, SourceError> {
        let detail: ApiCommitDetail = self
            .get_json(&format!("/repos/{}/commits/{sha}", self.repo))
            .await?;
        Ok(commit_from_detail(detail))
    }

    async fn fetch_pr_files(&self, number: u64) -> Vec<String> {
        let path = format!(
            "/repos/{}/pulls/{number}/files?per_page={PR_FILES_CAP}",
            self.repo
        );
        match self.get_json::<Vec<ApiPrFile>>(&path).await {
            Ok(files) => files.into_iter().map(|f| f.filename).collect(),
            Err(e) => {
                tracing::debug!("skipping files for PR #{number}: {e}");
                Vec::new()
            }
        }
    }

    async fn fetch_pr_comments(&self, number: u64) -> Vec<String> {
        let path = format!(
            "/repos/{}/issues/{number}/comments?per_page={PR_COMMENTS_CAP}",
            self.repo
        );
        match self.get_json::<Vec<ApiComment>>(&path).await {
            Ok(comments) => comments.into_iter().map(|c| c.body).collect(),
            Err(e) => {
                tracing::debug!("skipping comments for PR #{number}: {e}");
                Vec::new()
            }
        }
    }
}

impl RepoDataSource for GitHubClient {
    fn repo_info(&self) -> BoxFuture<'_, Result<RepoInfo, SourceError>> {
        Box::pin(async move {
            let repo: ApiRepo = self.get_json(&format!("/repos/{}", self.repo)).await?;
            let contributors: Vec<ApiContributor> = self
                .get_json(&format!(
                    "/repos/{}/contributors?per_page={CONTRIBUTORS_CAP}",
                    self.repo
                ))
                .await
                .unwrap_or_else(|e| {
                    tracing::debug!("contributor fetch failed: {e}");
                    Vec::new()
                });

            Ok(RepoInfo {
                full_name: repo.full_name,
                description: repo.description,
                language: repo.language,
                stars: repo.stargazers_count,
                forks: repo.forks_count,
                open_issues: repo.open_issues_count,
                created_at: repo.created_at,
                updated_at: repo.updated_at,
                contributors: contributors
                    .into_iter()
                    .map(|c| Contributor {
                        login: c.login,
                        contributions: c.contributions,
                    })
                    .collect(),
            })
        })
    }

    fn list_commits(&self, limit: usize) -> BoxFuture<'_, Result<Vec<CommitRecord>, SourceError>> {
        Box::pin(async move {
            let mut commits = Vec::new();
            let mut page = 1;

            while commits.len() < limit {
                let per_page = PER_PAGE.min(limit - commits.len());
                let path = format!(
                    "/repos/{}/commits?per_page={per_page}&page={page}",
                    self.repo
                );
                let batch: Vec<ApiCommitSummary> = self.get_json(&path).await?;
                if batch.is_empty() {
                    break;
                }
                let done = batch.len() < per_page;
                for summary in batch {
                    // Detail fetch carries files and line stats; a commit
                    // that fails to resolve is skipped, not fatal.
                    match self.fetch_commit_detail(&summary.sha).await {
                        Ok(record) => commits.push(record),
                        Err(e) if e.is_transient() => return Err(e),
                        Err(e) => tracing::debug!("skipping commit {}: {e}", &summary.sha[..7]),
                    }
                }
                if done {
                    break;
                }
                page += 1;
            }

            Ok(commits)
        })
    }

    fn list_pull_requests(
        &self,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<PullRequestRecord>, SourceError>> {
        Box::pin(async move {
            let mut prs = Vec::new();
            let mut page = 1;

            while prs.len() < limit {
                let per_page = PER_PAGE.min(limit - prs.len());
                let path = format!(
                    "/repos/{}/pulls?state=all&sort=created&direction=desc&per_page={per_page}&page={page}",
                    self.repo
                );
                let batch: Vec<ApiPull> = self.get_json(&path).await?;
                if batch.is_empty() {
                    break;
                }
                let done = batch.len() < per_page;
                for pr in batch {
                    let files = self.fetch_pr_files(pr.number).await;
                    let comments = self.fetch_pr_comments(pr.number).await;
                    prs.push(pull_from_api(pr, files, comments));
                }
                if done {
                    break;
                }
                page += 1;
            }

            Ok(prs)
        })
    }

    fn list_files(
        &self,
        limit: usize,
        max_file_size: u64,
    ) -> BoxFuture<'_, Result<Vec<RepoFile>, SourceError>> {
        Box::pin(async move {
            let tree: ApiTree = self
                .get_json(&format!("/repos/{}/git/trees/HEAD?recursive=1", self.repo))
                .await?;
            if tree.truncated {
                tracing::warn!("{}: tree listing truncated by the API", self.repo);
            }

            let mut files = Vec::new();
            for entry in tree.tree {
                if files.len() >= limit {
                    break;
                }
                if entry.r#type != "blob" || is_binary_path(&entry.path) {
                    continue;
                }
                if entry.size.unwrap_or(0) > max_file_size {
                    tracing::debug!("skipping large file {}", entry.path);
                    continue;
                }

                let contents: ApiContents = match self
                    .get_json(&format!("/repos/{}/contents/{}", self.repo, entry.path))
                    .await
                {
                    Ok(c) => c,
                    Err(e) if e.is_transient() => return Err(e),
                    Err(e) => {
                        tracing::debug!("skipping file {}: {e}", entry.path);
                        continue;
                    }
                };
                let raw = contents.content.replace(['\n', '\r'], "");
                let Ok(bytes) = STANDARD.decode(raw) else {
                    tracing::debug!("skipping undecodable file {}", entry.path);
                    continue;
                };
                let content = String::from_utf8_lossy(&bytes).into_owned();
                files.push(RepoFile {
                    path: entry.path,
                    content,
                    size: entry.size.unwrap_or(0),
                });
            }

            Ok(files)
        })
    }
}

fn is_binary_path(path: &str) -> bool {
    path.rsplit('.')
        .next()
        .is_some_and(|ext| BINARY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn commit_from_detail(detail: ApiCommitDetail) -> CommitRecord {
    let author = detail
        .commit
        .author
        .as_ref()
        .map_or_else(|| "Unknown".to_owned(), |a| a.name.clone());
    let date = detail
        .commit
        .author
        .as_ref()
        .map_or_else(Utc::now, |a| a.date);
    CommitRecord {
        sha: detail.sha,
        message: detail.commit.message,
        author,
        date,
        files_changed: detail
            .files
            .unwrap_or_default()
            .into_iter()
            .take(COMMIT_FILES_CAP)
            .map(|f| f.filename)
            .collect(),
        additions: detail.stats.as_ref().map_or(0, |s| s.additions),
        deletions: detail.stats.as_ref().map_or(0, |s| s.deletions),
    }
}

fn pull_from_api(pr: ApiPull, files: Vec<String>, comments: Vec<String>) -> PullRequestRecord {
    let state = if pr.merged_at.is_some() {
        PrState::Merged
    } else if pr.state == "open" {
        PrState::Open
    } else {
        PrState::Closed
    };
    PullRequestRecord {
        number: pr.number,
        title: pr.title,
        body: pr.body.unwrap_or_default(),
        state,
        created_at: pr.created_at,
        merged_at: pr.merged_at,
        author: pr.user.map_or_else(|| "Unknown".to_owned(), |u| u.login),
        files,
        comments,
    }
}

#[derive(Deserialize)]
struct ApiRepo {
    full_name: String,
    description: Option<String>,
    language: Option<String>,
    stargazers_count: u64,
    forks_count: u64,
    open_issues_count: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ApiContributor {
    login: String,
    contributions: u64,
}

#[derive(Deserialize)]
struct ApiCommitSummary {
    sha: String,
}

#[derive(Deserialize)]
struct ApiCommitDetail {
    sha: String,
    commit: ApiCommitInner,
    files: Option<Vec<ApiPrFile>>,
    stats: Option<ApiCommitStats>,
}

#[derive(Deserialize)]
struct ApiCommitInner {
    message: String,
    author: Option<ApiCommitAuthor>,
}

#[derive(Deserialize)]
struct ApiCommitAuthor {
    name: String,
    date: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ApiCommitStats {
    additions: u64,
    deletions: u64,
}

#[derive(Deserialize)]
struct ApiPrFile {
    filename: String,
}

#[derive(Deserialize)]
struct ApiComment {
    body: String,
}

#[derive(Deserialize)]
struct ApiPull {
    number: u64,
    title: String,
    body: Option<String>,
    state: String,
    created_at: DateTime<Utc>,
    merged_at: Option<DateTime<Utc>>,
    user: Option<ApiUser>,
}

#[derive(Deserialize)]
struct ApiUser {
    login: String,
}

#[derive(Deserialize)]
struct ApiContents {
    content: String,
}

#[derive(Deserialize)]
struct ApiTree {
    #[serde(default)]
    truncated: bool,
    tree: Vec<ApiTreeEntry>,
}

#[derive(Deserialize)]
struct ApiTreeEntry {
    path: String,
    r#type: String,
    size: Option<u64>,
}
