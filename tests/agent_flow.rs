//! End-to-end scenarios across the crates: fetch → index → tool-calling
//! agent session, with the mock provider and a static data source.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use reposcope_core::config::Config;
use reposcope_core::session::{AgentSession, SessionState};
use reposcope_github::source::{FetchLimits, StaticSource, fetch_all};
use reposcope_github::types::{CommitRecord, PrState, PullRequestRecord, RepoFile, RepoInfo};
use reposcope_index::embed::{Embedder, HashEmbedder};
use reposcope_index::indexer::{IndexerConfig, RepoIndexer};
use reposcope_index::store::{InMemoryVectorStore, VectorStore};
use reposcope_llm::mock::MockProvider;
use reposcope_llm::provider::ChatResponse;
use reposcope_tools::{MetadataStore, RepoMetadata, ToolExecutor};

fn date(y: i32, m: u32, d: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
}

fn sample_source() -> StaticSource {
    let mut source = StaticSource::new(RepoInfo {
        full_name: "acme/widget".into(),
        description: Some("a widget factory".into()),
        language: Some("Rust".into()),
        stars: 7,
        forks: 1,
        open_issues: 0,
        created_at: date(2023, 1, 1),
        updated_at: date(2024, 6, 1),
        contributors: vec![],
    });
    source.commits = vec![
        CommitRecord {
            sha: "aaa111".into(),
            message: "initial import".into(),
            author: "alice".into(),
            date: date(2024, 1, 10),
            files_changed: vec!["src/lib.rs".into()],
            additions: 100,
            deletions: 0,
        },
        CommitRecord {
            sha: "bbb222".into(),
            message: "add connection pooling".into(),
            author: "bob".into(),
            date: date(2024, 2, 10),
            files_changed: vec!["src/pool.rs".into()],
            additions: 60,
            deletions: 4,
        },
        CommitRecord {
            sha: "ccc333".into(),
            message: "fix pool shutdown race".into(),
            author: "alice".into(),
            date: date(2024, 3, 10),
            files_changed: vec!["src/pool.rs".into()],
            additions: 12,
            deletions: 9,
        },
    ];
    source.pull_requests = vec![PullRequestRecord {
        number: 4,
        title: "Connection pooling".into(),
        body: "Adds a bounded connection pool.".into(),
        state: PrState::Merged,
        created_at: date(2024, 2, 8),
        merged_at: Some(date(2024, 2, 10)),
        author: "bob".into(),
        files: vec!["src/pool.rs".into(), "tests/pool.rs".into()],
        comments: vec!["nice work".into()],
    }];
    source
}

struct Harness {
    tools: Arc<ToolExecutor<InMemoryVectorStore>>,
    store: Arc<InMemoryVectorStore>,
    config: Config,
}

async fn index_source(source: &StaticSource) -> Harness {
    let fetched = fetch_all(source, FetchLimits::default()).await.unwrap();
    let store = Arc::new(InMemoryVectorStore::new());
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());
    let config = Config::default();

    RepoIndexer::new(Arc::clone(&store), Arc::clone(&embedder), IndexerConfig::default())
        .index_repo("acme/widget", &fetched, &CancellationToken::new())
        .await
        .unwrap();

    let metadata = Arc::new(MetadataStore::new());
    metadata.insert("acme/widget", RepoMetadata::from_fetched(&fetched));

    Harness {
        tools: Arc::new(ToolExecutor::new(
            Arc::clone(&store),
            embedder,
            metadata,
        )),
        store,
        config,
    }
}

#[tokio::test]
async fn indexing_three_commits_one_pr_no_files() {
    let harness = index_source(&sample_source()).await;
    assert_eq!(harness.store.count("acme/widget::commit").await.unwrap(), 3);
    assert_eq!(harness.store.count("acme/widget::pr").await.unwrap(), 1);
    assert_eq!(harness.store.count("acme/widget::code").await.unwrap(), 0);
}

#[tokio::test]
async fn full_question_with_tool_round_trip() {
    let harness = index_source(&sample_source()).await;
    let provider = MockProvider::with_responses(vec![
        MockProvider::tool_call("search_commits", serde_json::json!({"query": "connection pooling"})),
        ChatResponse::Text("bob added pooling in bbb222, fixed by alice in ccc333".into()),
    ]);

    let mut session = AgentSession::new(provider, harness.tools, "acme/widget", &harness.config);
    let answer = session.ask("who worked on connection pooling?").await.unwrap();

    assert!(answer.text.contains("bbb222"));
    assert_eq!(answer.trace.len(), 1);
    assert_eq!(answer.trace[0].tool, "search_commits");
    assert_eq!(session.state(), SessionState::Done);
}

#[tokio::test]
async fn pr_lookup_out_of_range_reported_as_tool_error() {
    let harness = index_source(&sample_source()).await;
    let provider = MockProvider::with_responses(vec![
        MockProvider::tool_call("get_pr_details", serde_json::json!({"pr_number": 999})),
        ChatResponse::Text("PR 999 does not exist".into()),
    ]);

    let mut session = AgentSession::new(provider, harness.tools, "acme/widget", &harness.config);
    let answer = session.ask("what is PR 999 about?").await.unwrap();

    assert!(answer.trace[0].is_error);
    assert_eq!(session.state(), SessionState::Done);
}

#[tokio::test]
async fn code_chunks_appear_once_files_exist() {
    let mut source = sample_source();
    source.files = vec![RepoFile {
        path: "src/pool.rs".into(),
        content: "pub struct Pool {\n    size: usize,\n}\n".into(),
        size: 40,
    }];
    let harness = index_source(&source).await;
    assert!(harness.store.count("acme/widget::code").await.unwrap() >= 1);

    let out = harness
        .tools
        .execute(
            "acme/widget",
            "search_code",
            &serde_json::json!({"query": "struct Pool"}),
        )
        .await
        .unwrap();
    assert!(out.text.contains("src/pool.rs"));
}

#[tokio::test]
async fn turn_limited_session_forces_answer() {
    let harness = index_source(&sample_source()).await;
    let provider = MockProvider::with_responses(vec![
        MockProvider::tool_call("get_timeline", serde_json::json!({})),
        MockProvider::tool_call("get_timeline", serde_json::json!({})),
        MockProvider::tool_call("get_timeline", serde_json::json!({})),
        ChatResponse::Text("summary from gathered context".into()),
    ]);
    let mut config = harness.config.clone();
    config.agent.max_turns = 3;

    let mut session = AgentSession::new(provider.clone(), harness.tools, "acme/widget", &config);
    let answer = session.ask("summarize recent activity").await.unwrap();

    assert!(answer.forced);
    assert_eq!(answer.model_calls, 4);
    assert_eq!(provider.calls(), 4);
}
