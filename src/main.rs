use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use reposcope_core::config::{self, Config};
use reposcope_core::session::AgentSession;
use reposcope_github::rest::{GitHubClient, extract_repo_name};
use reposcope_github::source::fetch_all;
use reposcope_index::embed::{Embedder, HashEmbedder, ProviderEmbedder};
use reposcope_index::indexer::{IndexReport, RepoIndexer};
use reposcope_index::store::InMemoryVectorStore;
use reposcope_llm::openai::OpenAiProvider;
use reposcope_tools::{MetadataStore, RepoMetadata, ToolExecutor};

#[derive(Parser)]
#[command(name = "reposcope", version, about = "Semantic repository history search and Q&A")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "reposcope.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch a repository and build the in-memory index.
    Index {
        /// Repository as owner/name or a GitHub URL.
        repo: String,
    },
    /// Index a repository, then answer a question about it.
    Ask {
        /// Repository as owner/name or a GitHub URL.
        repo: String,
        /// Natural-language question.
        question: String,
        /// Print the tool trace after the answer.
        #[arg(long)]
        trace: bool,
    },
}

struct IndexedRepo {
    repo_id: String,
    store: Arc<InMemoryVectorStore>,
    embedder: Arc<dyn Embedder>,
    metadata: Arc<MetadataStore>,
    report: IndexReport,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    config.validate()?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, stopping at the next safe point");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Command::Index { repo } => {
            let indexed = build_index(&config, &repo, &cancel).await?;
            print_report(&indexed);
        }
        Command::Ask {
            repo,
            question,
            trace,
        } => {
            let api_key = config::api_key()
                .context("REPOSCOPE_OPENAI_API_KEY is not set; the ask command needs a model backend")?;
            let indexed = build_index(&config, &repo, &cancel).await?;
            print_report(&indexed);

            let provider = OpenAiProvider::new(
                api_key,
                config.llm.base_url.clone(),
                config.llm.model.clone(),
                config.llm.max_tokens,
                config.llm.embedding_model.clone(),
            );
            let tools = Arc::new(
                ToolExecutor::new(indexed.store, indexed.embedder, indexed.metadata)
                    .with_limits(config.retrieval_limits()),
            );
            let mut session = AgentSession::new(provider, tools, &indexed.repo_id, &config)
                .with_cancellation(cancel);

            let answer = session.ask(&question).await?;
            println!("{}", answer.text);
            if answer.forced {
                eprintln!("(turn limit reached; this is a best-effort answer)");
            }
            if trace {
                for entry in &answer.trace {
                    eprintln!(
                        "tool {} args {} (~{} tokens{})",
                        entry.tool,
                        entry.arguments,
                        entry.token_estimate,
                        if entry.is_error { ", error" } else { "" }
                    );
                }
            }
        }
    }

    Ok(())
}

async fn build_index(
    config: &Config,
    repo: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<IndexedRepo> {
    let repo_id = extract_repo_name(repo);
    let client = GitHubClient::new(repo, config::github_token());
    let fetched = fetch_all(&client, config.fetch_limits())
        .await
        .with_context(|| format!("fetching {repo_id}"))?;
    for warning in &fetched.warnings {
        eprintln!("warning: {warning}");
    }

    let embedder = make_embedder(config);
    let store = Arc::new(InMemoryVectorStore::new());
    let indexer = RepoIndexer::new(
        Arc::clone(&store),
        Arc::clone(&embedder),
        config.indexer_config(),
    );
    let report = indexer.index_repo(&repo_id, &fetched, cancel).await?;

    let metadata = Arc::new(MetadataStore::new());
    metadata.insert(&repo_id, RepoMetadata::from_fetched(&fetched));

    Ok(IndexedRepo {
        repo_id,
        store,
        embedder,
        metadata,
        report,
    })
}

fn make_embedder(config: &Config) -> Arc<dyn Embedder> {
    match (config.llm.embedding_model.as_ref(), config::api_key()) {
        (Some(model), Some(key)) => {
            let provider = OpenAiProvider::new(
                key,
                config.llm.base_url.clone(),
                config.llm.model.clone(),
                config.llm.max_tokens,
                Some(model.clone()),
            );
            Arc::new(ProviderEmbedder::new(provider, config.llm.embedding_dimension))
        }
        _ => Arc::new(HashEmbedder::default()),
    }
}

fn print_report(indexed: &IndexedRepo) {
    let report = &indexed.report;
    eprintln!(
        "indexed {}: {} documents, {} chunks ({} failed) in {}ms{}",
        indexed.repo_id,
        report.documents,
        report.chunks_indexed,
        report.chunks_failed,
        report.duration_ms,
        if report.cancelled { " [cancelled]" } else { "" }
    );
    for error in &report.errors {
        eprintln!("  skipped: {error}");
    }
}
