use std::path::Path;

use serde::{Deserialize, Serialize};

use reposcope_github::source::FetchLimits;
use reposcope_index::chunker::ChunkerConfig;
use reposcope_index::indexer::IndexerConfig;
use reposcope_tools::RetrievalLimits;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse failed: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Embedding model name; unset means the local hashing embedder.
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            embedding_model: None,
            embedding_dimension: default_embedding_dimension(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_embedding_dimension() -> usize {
    1536
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_commits")]
    pub commits: usize,
    #[serde(default = "default_fetch_pull_requests")]
    pub pull_requests: usize,
    #[serde(default = "default_fetch_files")]
    pub files: usize,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            commits: default_fetch_commits(),
            pull_requests: default_fetch_pull_requests(),
            files: default_fetch_files(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_fetch_commits() -> usize {
    50
}

fn default_fetch_pull_requests() -> usize {
    100
}

fn default_fetch_files() -> usize {
    500
}

fn default_max_file_size() -> u64 {
    100_000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_chunk_size: default_max_chunk_size(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_max_chunk_size() -> usize {
    1500
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContextConfig {
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
    #[serde(default = "default_conversation_tail")]
    pub conversation_tail: usize,
    #[serde(default = "default_tool_result_token_cap")]
    pub tool_result_token_cap: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            conversation_tail: default_conversation_tail(),
            tool_result_token_cap: default_tool_result_token_cap(),
        }
    }
}

fn default_max_context_tokens() -> usize {
    120_000
}

fn default_conversation_tail() -> usize {
    8
}

fn default_tool_result_token_cap() -> usize {
    15_000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_commits_top_k")]
    pub commits_top_k: usize,
    #[serde(default = "default_code_top_k")]
    pub code_top_k: usize,
    #[serde(default = "default_timeline_top_k")]
    pub timeline_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            commits_top_k: default_commits_top_k(),
            code_top_k: default_code_top_k(),
            timeline_top_k: default_timeline_top_k(),
        }
    }
}

fn default_commits_top_k() -> usize {
    15
}

fn default_code_top_k() -> usize {
    8
}

fn default_timeline_top_k() -> usize {
    20
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_embed_workers")]
    pub embed_workers: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            embed_workers: default_embed_workers(),
        }
    }
}

fn default_max_turns() -> usize {
    10
}

fn default_embed_workers() -> usize {
    4
}

impl Config {
    /// Load a TOML config; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Rejects configurations the pipeline could not run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunker_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.context.conversation_tail == 0 {
            return Err(ConfigError::Invalid(
                "context.conversation_tail must be at least 1".into(),
            ));
        }
        if self.context.tool_result_token_cap == 0 {
            return Err(ConfigError::Invalid(
                "context.tool_result_token_cap must be positive".into(),
            ));
        }
        if self.agent.max_turns == 0 {
            return Err(ConfigError::Invalid("agent.max_turns must be at least 1".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            chunk_size: self.chunking.chunk_size,
            chunk_overlap: self.chunking.chunk_overlap,
            max_chunk_size: self.chunking.max_chunk_size,
        }
    }

    #[must_use]
    pub fn indexer_config(&self) -> IndexerConfig {
        IndexerConfig {
            chunker: self.chunker_config(),
            embed_workers: self.agent.embed_workers,
        }
    }

    #[must_use]
    pub fn fetch_limits(&self) -> FetchLimits {
        FetchLimits {
            commits: self.fetch.commits,
            pull_requests: self.fetch.pull_requests,
            files: self.fetch.files,
            max_file_size: self.fetch.max_file_size,
        }
    }

    #[must_use]
    pub fn retrieval_limits(&self) -> RetrievalLimits {
        RetrievalLimits {
            commits_top_k: self.retrieval.commits_top_k,
            code_top_k: self.retrieval.code_top_k,
            timeline_top_k: self.retrieval.timeline_top_k,
        }
    }
}

/// Secrets come from the environment, never from the config file.
#[must_use]
pub fn github_token() -> Option<String> {
    std::env::var("REPOSCOPE_GITHUB_TOKEN").ok()
}

#[must_use]
pub fn api_key() -> Option<String> {
    std::env::var("REPOSCOPE_OPENAI_API_KEY").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_values() {
        let config = Config::default();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert_eq!(config.chunking.max_chunk_size, 1500);
        assert_eq!(config.context.max_context_tokens, 120_000);
        assert_eq!(config.context.conversation_tail, 8);
        assert_eq!(config.context.tool_result_token_cap, 15_000);
        assert_eq!(config.fetch.commits, 50);
        assert_eq!(config.fetch.pull_requests, 100);
        assert_eq!(config.fetch.files, 500);
        assert_eq!(config.fetch.max_file_size, 100_000);
        assert_eq!(config.agent.max_turns, 10);
        config.validate().unwrap();
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = Config::load(Path::new("/nonexistent/reposcope.toml")).unwrap();
        assert_eq!(config.agent.max_turns, 10);
    }

    #[test]
    fn partial_file_overrides_some_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[context]\nmax_context_tokens = 8000\n\n[agent]\nmax_turns = 3"
        )
        .unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.context.max_context_tokens, 8000);
        assert_eq!(config.agent.max_turns, 3);
        // untouched sections keep their defaults
        assert_eq!(config.chunking.chunk_size, 1000);
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[context\nbroken").unwrap();
        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn overlap_at_least_chunk_size_rejected() {
        let mut config = Config::default();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_turns_rejected() {
        let mut config = Config::default();
        config.agent.max_turns = 0;
        assert!(config.validate().is_err());
    }
}
