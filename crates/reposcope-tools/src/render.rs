//! Plain-text renderings of tool results for model consumption.

use std::fmt::Write;

use reposcope_github::types::{PullRequestRecord, RepoInfo};

use crate::executor::{CodeHit, CommitAnalysis, CommitHit, PrImpact, TimelineEvent};

const RULE: &str = "============================================================";

fn size_label(changes: u64) -> &'static str {
    if changes < 10 {
        "small change"
    } else if changes < 100 {
        "medium change"
    } else {
        "large change"
    }
}

pub(crate) fn commit_results(query: &str, analysis: &CommitAnalysis, hits: &[CommitHit]) -> String {
    if hits.is_empty() {
        return "No commits found matching the query.".to_owned();
    }

    let mut out = String::new();
    let _ = writeln!(out, "=== COMMIT SEARCH RESULTS ===");
    let _ = writeln!(out, "Query: {query:?}");
    let _ = writeln!(out, "Found {} relevant commits", hits.len());
    let _ = writeln!(out);
    let _ = writeln!(out, "=== COMMIT ANALYSIS ===");
    let _ = writeln!(
        out,
        "Total changes: +{} additions, -{} deletions",
        analysis.total_additions, analysis.total_deletions
    );
    let _ = writeln!(out, "Contributors: {}", analysis.authors.join(", "));
    let _ = writeln!(out, "Trend: {}", analysis.trend);
    let _ = writeln!(out);

    for (i, hit) in hits.iter().enumerate() {
        let _ = writeln!(out, "{RULE}");
        let _ = writeln!(out, "COMMIT #{}", i + 1);
        let _ = writeln!(out, "SHA: {}", hit.sha.chars().take(7).collect::<String>());
        let _ = writeln!(out, "Author: {}", hit.author);
        let _ = writeln!(out, "Date: {}", &hit.date[..hit.date.len().min(10)]);
        let changes = hit.additions + hit.deletions;
        let _ = writeln!(
            out,
            "Changes: +{} -{} ({})",
            hit.additions,
            hit.deletions,
            size_label(changes)
        );
        if !hit.files.is_empty() {
            let _ = writeln!(out, "Files: {}", hit.files.join(", "));
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", hit.text);
    }
    out
}

pub(crate) fn pr_details(pr: &PullRequestRecord, impact: &PrImpact, related: &[String]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "PULL REQUEST #{}: {}", pr.number, pr.title);
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Author: {}", pr.author);
    let _ = writeln!(out, "Created: {}", pr.created_at.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(out, "Status: {}", impact.status);
    let _ = writeln!(out);
    let _ = writeln!(out, "=== IMPACT ANALYSIS ===");
    let _ = writeln!(out, "Scope: {} ({} files)", impact.scope, impact.file_count);
    let _ = writeln!(
        out,
        "tests touched: {}",
        if impact.touches_tests { "yes" } else { "no" }
    );
    let _ = writeln!(
        out,
        "docs touched: {}",
        if impact.touches_docs { "yes" } else { "no" }
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "DESCRIPTION");
    if pr.body.trim().is_empty() {
        let _ = writeln!(out, "No description provided.");
    } else {
        let _ = writeln!(out, "{}", pr.body);
    }

    if !pr.files.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "FILES CHANGED ({})", pr.files.len());
        for dir in &impact.directories {
            let _ = writeln!(out, "  {dir}/");
            for file in pr.files.iter().filter(|f| {
                f.rsplit_once('/').map_or("root", |(d, _)| d) == dir.as_str()
            }) {
                let name = file.rsplit_once('/').map_or(file.as_str(), |(_, n)| n);
                let _ = writeln!(out, "    - {name}");
            }
        }
    }

    if !pr.comments.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "REVIEW DISCUSSION ({} comments)", pr.comments.len());
        for (i, comment) in pr.comments.iter().enumerate() {
            let end = comment.floor_char_boundary(500.min(comment.len()));
            let _ = writeln!(out, "  [{}] {}", i + 1, &comment[..end]);
        }
    }

    if !related.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "RELATED CONTEXT FROM REPOSITORY");
        for excerpt in related {
            let _ = writeln!(out, "  - {excerpt}");
        }
    }
    out
}

pub(crate) fn code_results(query: &str, file_count: usize, hits: &[CodeHit]) -> String {
    if hits.is_empty() {
        return "No code found matching the query.".to_owned();
    }

    let mut out = String::new();
    let _ = writeln!(out, "=== CODE SEARCH RESULTS ===");
    let _ = writeln!(out, "Query: {query:?}");
    let _ = writeln!(out, "Found {} code spans across {} files", hits.len(), file_count);
    let _ = writeln!(out);

    for (i, hit) in hits.iter().enumerate() {
        let _ = writeln!(out, "{RULE}");
        let _ = writeln!(out, "RESULT #{}", i + 1);
        let _ = writeln!(out, "File: {} (chunk {})", hit.path, hit.seq + 1);
        let _ = writeln!(out, "```");
        let _ = writeln!(out, "{}", hit.text);
        let _ = writeln!(out, "```");
    }
    out
}

pub(crate) fn timeline(events: &[TimelineEvent], commits: usize, pull_requests: usize) -> String {
    if events.is_empty() {
        return "No timeline events in the requested range.".to_owned();
    }

    let mut out = String::new();
    let _ = writeln!(out, "=== REPOSITORY TIMELINE ===");
    let _ = writeln!(
        out,
        "Showing {} events: {commits} commits, {pull_requests} pull requests",
        events.len()
    );
    let _ = writeln!(out);

    for event in events {
        let _ = writeln!(
            out,
            "[{}] {} {} by {} - {}",
            event.date, event.kind, event.reference, event.author, event.summary
        );
    }
    out
}

pub(crate) fn repository_stats(
    info: &RepoInfo,
    commit_chunks: usize,
    pr_chunks: usize,
    code_chunks: usize,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "REPOSITORY OVERVIEW: {}", info.full_name);
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(
        out,
        "Description: {}",
        info.description.as_deref().unwrap_or("No description")
    );
    if let Some(ref language) = info.language {
        let _ = writeln!(out, "Primary language: {language}");
    }
    let _ = writeln!(out, "Created: {}", info.created_at.format("%Y-%m-%d"));
    let _ = writeln!(out, "Last updated: {}", info.updated_at.format("%Y-%m-%d"));
    let _ = writeln!(out, "Stars: {} | Forks: {} | Open issues: {}", info.stars, info.forks, info.open_issues);

    if !info.contributors.is_empty() {
        let total: u64 = info.contributors.iter().map(|c| c.contributions).sum();
        let _ = writeln!(out);
        let _ = writeln!(out, "TOP CONTRIBUTORS");
        for (i, c) in info.contributors.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let pct = if total > 0 {
                c.contributions as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            let _ = writeln!(
                out,
                "{:2}. {} - {} commits ({pct:.1}%)",
                i + 1,
                c.login,
                c.contributions
            );
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "INDEXED DATA");
    let _ = writeln!(out, "Commit chunks: {commit_chunks}");
    let _ = writeln!(out, "Pull request chunks: {pr_chunks}");
    let _ = writeln!(out, "Code chunks: {code_chunks}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_commit_results_message() {
        let analysis = CommitAnalysis {
            total_additions: 0,
            total_deletions: 0,
            authors: vec![],
            trend: "balanced mix of additions and removals",
        };
        let text = commit_results("anything", &analysis, &[]);
        assert_eq!(text, "No commits found matching the query.");
    }

    #[test]
    fn commit_results_include_size_label() {
        let analysis = CommitAnalysis {
            total_additions: 500,
            total_deletions: 3,
            authors: vec!["alice".into()],
            trend: "primarily adding new code",
        };
        let hits = vec![CommitHit {
            sha: "abcdef1234".into(),
            author: "alice".into(),
            date: "2024-03-01T12:00:00+00:00".into(),
            additions: 500,
            deletions: 3,
            files: vec!["src/big.rs".into()],
            text: "Commit: big feature".into(),
            score: 0.9,
        }];
        let text = commit_results("feature", &analysis, &hits);
        assert!(text.contains("abcdef1"));
        assert!(text.contains("large change"));
        assert!(text.contains("Trend: primarily adding new code"));
    }

    #[test]
    fn size_labels() {
        assert_eq!(size_label(5), "small change");
        assert_eq!(size_label(50), "medium change");
        assert_eq!(size_label(5000), "large change");
    }

    #[test]
    fn timeline_empty_message() {
        assert!(timeline(&[], 0, 0).contains("No timeline events"));
    }
}
