use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One commit as fetched from the data source. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub date: DateTime<Utc>,
    /// Files touched, capped by the fetcher (first 10).
    pub files_changed: Vec<String>,
    pub additions: u64,
    pub deletions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

impl PrState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Merged => "merged",
        }
    }
}

impl std::fmt::Display for PrState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestRecord {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub state: PrState,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub author: String,
    /// Files touched, capped by the fetcher (first 30).
    pub files: Vec<String>,
    /// Review comment bodies, capped by the fetcher (first 10).
    pub comments: Vec<String>,
}

/// A text file at the repository head, size-capped and binary-filtered
/// by the fetcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoFile {
    pub path: String,
    pub content: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contributor {
    pub login: String,
    pub contributions: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoInfo {
    pub full_name: String,
    pub description: Option<String>,
    pub language: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub open_issues: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub contributors: Vec<Contributor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pr_state_display() {
        assert_eq!(PrState::Open.to_string(), "open");
        assert_eq!(PrState::Merged.to_string(), "merged");
    }

    #[test]
    fn pr_state_serde_lowercase() {
        assert_eq!(serde_json::to_string(&PrState::Closed).unwrap(), "\"closed\"");
        let parsed: PrState = serde_json::from_str("\"merged\"").unwrap();
        assert_eq!(parsed, PrState::Merged);
    }

    #[test]
    fn commit_record_round_trips() {
        let c = CommitRecord {
            sha: "abc1234".into(),
            message: "fix parser".into(),
            author: "alice".into(),
            date: Utc::now(),
            files_changed: vec!["src/parser.rs".into()],
            additions: 10,
            deletions: 2,
        };
        let json = serde_json::to_string(&c).unwrap();
        let back: CommitRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sha, "abc1234");
        assert_eq!(back.additions, 10);
    }
}
