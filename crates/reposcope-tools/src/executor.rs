use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use reposcope_github::types::PullRequestRecord;
use reposcope_index::document::DocKind;
use reposcope_index::embed::Embedder;
use reposcope_index::indexer::partition;
use reposcope_index::store::{MAX_TOP_K, ScoredPoint, VectorStore};
use reposcope_llm::provider::{ToolDefinition, estimate_tokens};

use crate::metadata::MetadataStore;
use crate::registry::{
    PrDetailsParams, RepositoryStatsParams, SearchCodeParams, SearchCommitsParams, TimelineParams,
    ToolKind,
};
use crate::render;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Bad arguments from the model; reported back into the conversation so
    /// the model can self-correct, never raised to the caller.
    #[error("invalid tool input: {0}")]
    InvalidInput(String),

    /// Underlying index or data failure during execution.
    #[error("tool execution failed: {0}")]
    Execution(String),
}

/// Result of one tool call: the structured payload for programmatic use and
/// the serialized text the model consumes. Only the text is ever truncated
/// downstream.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub tool_name: String,
    pub payload: Value,
    pub text: String,
    pub token_estimate: usize,
}

impl ToolOutput {
    fn new(kind: ToolKind, payload: Value, text: String) -> Self {
        let token_estimate = estimate_tokens(&text);
        Self {
            tool_name: kind.name().to_owned(),
            payload,
            text,
            token_estimate,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalLimits {
    pub commits_top_k: usize,
    pub code_top_k: usize,
    pub timeline_top_k: usize,
}

impl Default for RetrievalLimits {
    fn default() -> Self {
        Self {
            commits_top_k: 15,
            code_top_k: 8,
            timeline_top_k: 20,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CommitHit {
    pub sha: String,
    pub author: String,
    pub date: String,
    pub additions: u64,
    pub deletions: u64,
    pub files: Vec<String>,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Serialize)]
pub(crate) struct CommitAnalysis {
    pub total_additions: u64,
    pub total_deletions: u64,
    pub authors: Vec<String>,
    pub trend: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct CodeHit {
    pub path: String,
    pub seq: u64,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Serialize)]
pub(crate) struct PrImpact {
    pub scope: &'static str,
    pub file_count: usize,
    pub directories: Vec<String>,
    pub touches_tests: bool,
    pub touches_docs: bool,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct TimelineEvent {
    #[serde(skip)]
    pub sort_key: i64,
    pub date: String,
    pub kind: &'static str,
    pub reference: String,
    pub author: String,
    pub summary: String,
}

/// Executes the five tools against the shared index and metadata snapshot.
/// One instance serves all sessions; it holds only read-mostly state.
pub struct ToolExecutor<S: VectorStore> {
    store: Arc<S>,
    embedder: Arc<dyn Embedder>,
    metadata: Arc<MetadataStore>,
    limits: RetrievalLimits,
}

impl<S: VectorStore> ToolExecutor<S> {
    #[must_use]
    pub fn new(store: Arc<S>, embedder: Arc<dyn Embedder>, metadata: Arc<MetadataStore>) -> Self {
        Self {
            store,
            embedder,
            metadata,
            limits: RetrievalLimits::default(),
        }
    }

    #[must_use]
    pub fn with_limits(mut self, limits: RetrievalLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Tool schemas handed to the model.
    #[must_use]
    pub fn definitions() -> Vec<ToolDefinition> {
        crate::registry::definitions()
    }

    /// Dispatch one tool call.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for unknown tool names or malformed arguments,
    /// `Execution` for underlying index or data failures.
    pub async fn execute(
        &self,
        repo_id: &str,
        name: &str,
        arguments: &Value,
    ) -> Result<ToolOutput, ToolError> {
        let kind = ToolKind::parse(name)
            .ok_or_else(|| ToolError::InvalidInput(format!("unknown tool: {name}")))?;
        tracing::debug!(tool = name, repo = repo_id, "executing tool");

        match kind {
            ToolKind::SearchCommits => {
                let params: SearchCommitsParams = parse_args(arguments)?;
                self.search_commits(repo_id, params).await
            }
            ToolKind::GetPrDetails => {
                let params: PrDetailsParams = parse_args(arguments)?;
                self.get_pr_details(repo_id, params).await
            }
            ToolKind::SearchCode => {
                let params: SearchCodeParams = parse_args(arguments)?;
                self.search_code(repo_id, params).await
            }
            ToolKind::GetTimeline => {
                let params: TimelineParams = parse_args(arguments)?;
                self.get_timeline(repo_id, &params)
            }
            ToolKind::GetRepositoryStats => {
                let _params: RepositoryStatsParams = parse_args(arguments)?;
                self.get_repository_stats(repo_id).await
            }
        }
    }

    async fn semantic_search(
        &self,
        repo_id: &str,
        kind: DocKind,
        query: &str,
        fetch_k: usize,
    ) -> Result<Vec<ScoredPoint>, ToolError> {
        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;
        self.store
            .search(&partition(repo_id, kind), vector, fetch_k.min(MAX_TOP_K))
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))
    }

    async fn search_commits(
        &self,
        repo_id: &str,
        params: SearchCommitsParams,
    ) -> Result<ToolOutput, ToolError> {
        let since = parse_date_bound(params.since.as_deref(), false)?;
        let until = parse_date_bound(params.until.as_deref(), true)?;

        let fetch_k = self.limits.commits_top_k * 2;
        let hits = self
            .semantic_search(repo_id, DocKind::Commit, &params.query, fetch_k)
            .await?;

        let terms: Vec<String> = params
            .query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_owned)
            .collect();

        let mut commits: Vec<CommitHit> = hits
            .into_iter()
            .filter(|p| {
                let author_ok = params.author.as_deref().is_none_or(|wanted| {
                    payload_str(&p.payload, "author")
                        .to_lowercase()
                        .contains(&wanted.to_lowercase())
                });
                author_ok && within_bounds(p.timestamp, since, until)
            })
            .map(|p| {
                let text = payload_str(&p.payload, "text");
                // keyword re-rank on top of the semantic score
                let lowered = text.to_lowercase();
                let matched = terms.iter().filter(|t| lowered.contains(t.as_str())).count();
                #[allow(clippy::cast_precision_loss)]
                let boost = 0.1 * matched as f32 / terms.len().max(1) as f32;
                CommitHit {
                    sha: payload_str(&p.payload, "sha"),
                    author: payload_str(&p.payload, "author"),
                    date: payload_str(&p.payload, "date"),
                    additions: payload_u64(&p.payload, "additions"),
                    deletions: payload_u64(&p.payload, "deletions"),
                    files: payload_str_vec(&p.payload, "files"),
                    text,
                    score: p.score + boost,
                }
            })
            .collect();

        commits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        commits.truncate(self.limits.commits_top_k);

        let analysis = analyze_commits(&commits);
        let text = render::commit_results(&params.query, &analysis, &commits);
        let payload = json!({
            "query": params.query,
            "total": commits.len(),
            "analysis": analysis,
            "commits": commits,
        });
        Ok(ToolOutput::new(ToolKind::SearchCommits, payload, text))
    }

    async fn get_pr_details(
        &self,
        repo_id: &str,
        params: PrDetailsParams,
    ) -> Result<ToolOutput, ToolError> {
        let meta = self
            .metadata
            .get(repo_id)
            .ok_or_else(|| ToolError::Execution(format!("repository {repo_id} is not indexed")))?;

        let pr = meta.pull_requests.get(&params.pr_number).ok_or_else(|| {
            let hint = meta
                .pr_range()
                .map(|(min, max)| format!(" (indexed PRs: #{min}-#{max})"))
                .unwrap_or_default();
            ToolError::InvalidInput(format!("PR #{} not found{hint}", params.pr_number))
        })?;

        // Semantic impact note from the PR partition; absence is not an error.
        let related_query = format!("pull request {} {}", pr.number, pr.title);
        let related: Vec<String> = match self
            .semantic_search(repo_id, DocKind::PullRequest, &related_query, 4)
            .await
        {
            Ok(hits) => hits
                .into_iter()
                .filter(|p| payload_str(&p.payload, "ident") != pr.number.to_string())
                .take(2)
                .map(|p| {
                    let text = payload_str(&p.payload, "text");
                    let end = text.floor_char_boundary(300.min(text.len()));
                    text[..end].to_owned()
                })
                .collect(),
            Err(e) => {
                tracing::debug!("related-context search failed: {e}");
                Vec::new()
            }
        };

        let impact = pr_impact(pr);
        let text = render::pr_details(pr, &impact, &related);
        let payload = json!({"pr": pr, "impact": impact, "related": related});
        Ok(ToolOutput::new(ToolKind::GetPrDetails, payload, text))
    }

    async fn search_code(
        &self,
        repo_id: &str,
        params: SearchCodeParams,
    ) -> Result<ToolOutput, ToolError> {
        let ext = params
            .file_type
            .as_deref()
            .map(|e| e.trim_start_matches('.').to_lowercase());

        let fetch_k = self.limits.code_top_k * 2;
        let hits = self
            .semantic_search(repo_id, DocKind::Code, &params.query, fetch_k)
            .await?;

        let mut code: Vec<CodeHit> = hits
            .into_iter()
            .filter(|p| {
                ext.as_deref().is_none_or(|wanted| {
                    payload_str(&p.payload, "path")
                        .rsplit('.')
                        .next()
                        .is_some_and(|e| e.eq_ignore_ascii_case(wanted))
                })
            })
            .map(|p| CodeHit {
                path: payload_str(&p.payload, "path"),
                seq: payload_u64(&p.payload, "seq"),
                text: payload_str(&p.payload, "text"),
                score: p.score,
            })
            .collect();
        code.truncate(self.limits.code_top_k);

        let files: std::collections::BTreeSet<&str> =
            code.iter().map(|h| h.path.as_str()).collect();
        let text = render::code_results(&params.query, files.len(), &code);
        let payload = json!({
            "query": params.query,
            "total": code.len(),
            "files": files.len(),
            "results": code,
        });
        Ok(ToolOutput::new(ToolKind::SearchCode, payload, text))
    }

    fn get_timeline(&self, repo_id: &str, params: &TimelineParams) -> Result<ToolOutput, ToolError> {
        let meta = self
            .metadata
            .get(repo_id)
            .ok_or_else(|| ToolError::Execution(format!("repository {repo_id} is not indexed")))?;
        let since = parse_date_bound(params.since.as_deref(), false)?;
        let until = parse_date_bound(params.until.as_deref(), true)?;

        let mut events: Vec<TimelineEvent> = Vec::new();
        for commit in &meta.commits {
            events.push(TimelineEvent {
                sort_key: commit.date.timestamp(),
                date: commit.date.format("%Y-%m-%d").to_string(),
                kind: "commit",
                reference: commit.sha.chars().take(7).collect(),
                author: commit.author.clone(),
                summary: format!(
                    "{} (+{} -{})",
                    commit.message.lines().next().unwrap_or(""),
                    commit.additions,
                    commit.deletions
                ),
            });
        }
        for pr in meta.pull_requests.values() {
            events.push(TimelineEvent {
                sort_key: pr.created_at.timestamp(),
                date: pr.created_at.format("%Y-%m-%d").to_string(),
                kind: "pr",
                reference: format!("#{}", pr.number),
                author: pr.author.clone(),
                summary: format!("{} [{}]", pr.title, pr.state),
            });
        }

        events.retain(|e| within_bounds(Some(e.sort_key), since, until));
        events.sort_by(|a, b| b.sort_key.cmp(&a.sort_key));
        events.truncate(self.limits.timeline_top_k);

        let commit_count = events.iter().filter(|e| e.kind == "commit").count();
        let pr_count = events.len() - commit_count;
        let text = render::timeline(&events, commit_count, pr_count);
        let payload = json!({
            "total": events.len(),
            "commits": commit_count,
            "pull_requests": pr_count,
            "events": events,
        });
        Ok(ToolOutput::new(ToolKind::GetTimeline, payload, text))
    }

    async fn get_repository_stats(&self, repo_id: &str) -> Result<ToolOutput, ToolError> {
        let meta = self
            .metadata
            .get(repo_id)
            .ok_or_else(|| ToolError::Execution(format!("repository {repo_id} is not indexed")))?;

        let mut counts = [0usize; 3];
        for (i, kind) in [DocKind::Commit, DocKind::PullRequest, DocKind::Code]
            .into_iter()
            .enumerate()
        {
            counts[i] = self
                .store
                .count(&partition(repo_id, kind))
                .await
                .map_err(|e| ToolError::Execution(e.to_string()))?;
        }

        let text = render::repository_stats(&meta.info, counts[0], counts[1], counts[2]);
        let payload = json!({
            "repository": meta.info,
            "indexed": {
                "commit_chunks": counts[0],
                "pr_chunks": counts[1],
                "code_chunks": counts[2],
            },
        });
        Ok(ToolOutput::new(ToolKind::GetRepositoryStats, payload, text))
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: &Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments.clone()).map_err(|e| ToolError::InvalidInput(e.to_string()))
}

fn payload_str(payload: &std::collections::HashMap<String, Value>, key: &str) -> String {
    payload
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

fn payload_u64(payload: &std::collections::HashMap<String, Value>, key: &str) -> u64 {
    payload.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn payload_str_vec(payload: &std::collections::HashMap<String, Value>, key: &str) -> Vec<String> {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_date_bound(
    input: Option<&str>,
    end_of_day: bool,
) -> Result<Option<i64>, ToolError> {
    let Some(raw) = input else {
        return Ok(None);
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.with_timezone(&Utc).timestamp()));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let time = if end_of_day {
            date.and_hms_opt(23, 59, 59)
        } else {
            date.and_hms_opt(0, 0, 0)
        };
        if let Some(naive) = time {
            return Ok(Some(naive.and_utc().timestamp()));
        }
    }
    Err(ToolError::InvalidInput(format!(
        "unparseable date {raw:?}; use YYYY-MM-DD or RFC 3339"
    )))
}

fn within_bounds(timestamp: Option<i64>, since: Option<i64>, until: Option<i64>) -> bool {
    let Some(ts) = timestamp else {
        // undated entries only match unbounded queries
        return since.is_none() && until.is_none();
    };
    since.is_none_or(|s| ts >= s) && until.is_none_or(|u| ts <= u)
}

fn analyze_commits(commits: &[CommitHit]) -> CommitAnalysis {
    let total_additions: u64 = commits.iter().map(|c| c.additions).sum();
    let total_deletions: u64 = commits.iter().map(|c| c.deletions).sum();
    let mut authors: Vec<String> = Vec::new();
    for commit in commits {
        if !commit.author.is_empty() && !authors.contains(&commit.author) {
            authors.push(commit.author.clone());
        }
    }
    let trend = if total_additions > total_deletions * 2 {
        "primarily adding new code"
    } else if total_deletions > total_additions * 2 {
        "significant cleanup or refactoring"
    } else {
        "balanced mix of additions and removals"
    };
    CommitAnalysis {
        total_additions,
        total_deletions,
        authors,
        trend,
    }
}

fn pr_impact(pr: &PullRequestRecord) -> PrImpact {
    let file_count = pr.files.len();
    let scope = if file_count <= 3 {
        "small"
    } else if file_count <= 15 {
        "medium"
    } else {
        "large"
    };

    let mut directories: Vec<String> = Vec::new();
    for file in &pr.files {
        let dir = file.rsplit_once('/').map_or("root", |(d, _)| d).to_owned();
        if !directories.contains(&dir) {
            directories.push(dir);
        }
    }

    let touches_tests = pr.files.iter().any(|f| f.to_lowercase().contains("test"));
    let touches_docs = pr
        .files
        .iter()
        .any(|f| f.ends_with(".md") || f.ends_with(".txt") || f.ends_with(".rst"));

    let status = match (pr.state, pr.merged_at) {
        (reposcope_github::types::PrState::Merged, Some(at)) => {
            format!("merged {}", at.format("%Y-%m-%d"))
        }
        (state, _) => state.to_string(),
    };

    PrImpact {
        scope,
        file_count,
        directories,
        touches_tests,
        touches_docs,
        status,
    }
}
