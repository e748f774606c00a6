//! Logical indexing units built from fetched repository records.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};

use reposcope_github::source::FetchedRepo;
use reposcope_github::types::{CommitRecord, PullRequestRecord, RepoFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocKind {
    Code,
    Commit,
    PullRequest,
}

impl DocKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Commit => "commit",
            Self::PullRequest => "pr",
        }
    }
}

impl std::fmt::Display for DocKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable unit from the source repository, owned by the indexing
/// pipeline for its lifetime.
#[derive(Debug, Clone)]
pub struct Document {
    pub kind: DocKind,
    pub ident: String,
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub payload: Map<String, Value>,
}

impl Document {
    #[must_use]
    pub fn from_commit(commit: &CommitRecord) -> Self {
        let text = format!(
            "Commit: {}\nAuthor: {}\nFiles: {}",
            commit.message,
            commit.author,
            commit.files_changed.join(", ")
        );
        let mut payload = Map::new();
        payload.insert("sha".into(), json!(commit.sha));
        payload.insert("author".into(), json!(commit.author));
        payload.insert("date".into(), json!(commit.date.to_rfc3339()));
        payload.insert("additions".into(), json!(commit.additions));
        payload.insert("deletions".into(), json!(commit.deletions));
        payload.insert("files".into(), json!(commit.files_changed));
        Self {
            kind: DocKind::Commit,
            ident: commit.sha.clone(),
            text,
            timestamp: Some(commit.date),
            payload,
        }
    }

    #[must_use]
    pub fn from_pull_request(pr: &PullRequestRecord) -> Self {
        let text = format!(
            "PR #{}: {}\n{}\nFiles changed: {}",
            pr.number,
            pr.title,
            pr.body,
            pr.files.join(", ")
        );
        let mut payload = Map::new();
        payload.insert("number".into(), json!(pr.number));
        payload.insert("title".into(), json!(pr.title));
        payload.insert("state".into(), json!(pr.state.as_str()));
        payload.insert("author".into(), json!(pr.author));
        payload.insert("date".into(), json!(pr.created_at.to_rfc3339()));
        Self {
            kind: DocKind::PullRequest,
            ident: pr.number.to_string(),
            text,
            timestamp: Some(pr.created_at),
            payload,
        }
    }

    #[must_use]
    pub fn from_file(file: &RepoFile) -> Self {
        let mut payload = Map::new();
        payload.insert("path".into(), json!(file.path));
        payload.insert("size".into(), json!(file.size));
        Self {
            kind: DocKind::Code,
            ident: file.path.clone(),
            text: file.content.clone(),
            timestamp: None,
            payload,
        }
    }

    /// Synthetic header making each chunk self-describing once separated
    /// from its document.
    #[must_use]
    pub fn header(&self) -> String {
        match self.kind {
            DocKind::Code => format!("file: {}", self.ident),
            DocKind::Commit => format!("commit {}", self.ident),
            DocKind::PullRequest => format!("PR #{}", self.ident),
        }
    }
}

/// All documents for one fetched repository: commits, then pull requests,
/// then code files.
#[must_use]
pub fn documents_from(fetched: &FetchedRepo) -> Vec<Document> {
    let mut docs =
        Vec::with_capacity(fetched.commits.len() + fetched.pull_requests.len() + fetched.files.len());
    docs.extend(fetched.commits.iter().map(Document::from_commit));
    docs.extend(fetched.pull_requests.iter().map(Document::from_pull_request));
    docs.extend(fetched.files.iter().map(Document::from_file));
    docs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reposcope_github::types::PrState;

    fn sample_commit() -> CommitRecord {
        CommitRecord {
            sha: "abc1234def".into(),
            message: "fix token refresh".into(),
            author: "alice".into(),
            date: Utc::now(),
            files_changed: vec!["src/auth.rs".into(), "src/lib.rs".into()],
            additions: 20,
            deletions: 5,
        }
    }

    #[test]
    fn commit_document_text() {
        let doc = Document::from_commit(&sample_commit());
        assert_eq!(doc.kind, DocKind::Commit);
        assert!(doc.text.starts_with("Commit: fix token refresh"));
        assert!(doc.text.contains("Author: alice"));
        assert!(doc.text.contains("src/auth.rs, src/lib.rs"));
        assert_eq!(doc.payload["sha"], "abc1234def");
    }

    #[test]
    fn pr_document_text() {
        let pr = PullRequestRecord {
            number: 7,
            title: "Add retry logic".into(),
            body: "Retries transient failures.".into(),
            state: PrState::Merged,
            created_at: Utc::now(),
            merged_at: Some(Utc::now()),
            author: "bob".into(),
            files: vec!["src/retry.rs".into()],
            comments: vec![],
        };
        let doc = Document::from_pull_request(&pr);
        assert!(doc.text.starts_with("PR #7: Add retry logic"));
        assert_eq!(doc.ident, "7");
        assert_eq!(doc.payload["state"], "merged");
    }

    #[test]
    fn file_document_verbatim() {
        let file = RepoFile {
            path: "src/main.rs".into(),
            content: "fn main() {}".into(),
            size: 12,
        };
        let doc = Document::from_file(&file);
        assert_eq!(doc.text, "fn main() {}");
        assert_eq!(doc.header(), "file: src/main.rs");
        assert!(doc.timestamp.is_none());
    }

    #[test]
    fn headers_by_kind() {
        assert_eq!(Document::from_commit(&sample_commit()).header(), "commit abc1234def");
    }

    #[test]
    fn kind_as_str_matches_partition_names() {
        assert_eq!(DocKind::Code.as_str(), "code");
        assert_eq!(DocKind::Commit.as_str(), "commit");
        assert_eq!(DocKind::PullRequest.as_str(), "pr");
    }
}
