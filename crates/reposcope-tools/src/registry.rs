use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Deserializer};

use reposcope_llm::provider::ToolDefinition;

/// The fixed tool surface. Every variant maps 1:1 to a parameter struct and
/// an executor operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    SearchCommits,
    GetPrDetails,
    SearchCode,
    GetTimeline,
    GetRepositoryStats,
}

impl ToolKind {
    pub const ALL: [Self; 5] = [
        Self::SearchCommits,
        Self::GetPrDetails,
        Self::SearchCode,
        Self::GetTimeline,
        Self::GetRepositoryStats,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::SearchCommits => "search_commits",
            Self::GetPrDetails => "get_pr_details",
            Self::SearchCode => "search_code",
            Self::GetTimeline => "get_timeline",
            Self::GetRepositoryStats => "get_repository_stats",
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::SearchCommits => {
                "Search commit history semantically. Returns matching commits with \
                 author, date, line-change stats, and a pattern rollup. Use for \
                 finding when changes were made and who made them."
            }
            Self::GetPrDetails => {
                "Get one pull request by number: description, state, files grouped \
                 by directory, impact analysis, and related indexed context. Input \
                 is the PR number only."
            }
            Self::SearchCode => {
                "Search file contents semantically. Returns code spans with file \
                 path and position, even when exact keywords do not match."
            }
            Self::GetTimeline => {
                "Chronological timeline of commit and pull-request events, newest \
                 first, with rollup counts. Optionally bounded by a date range."
            }
            Self::GetRepositoryStats => {
                "Repository overview: description, language, popularity counters, \
                 top contributors, and indexed-data statistics."
            }
        }
    }

    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    #[must_use]
    pub fn parameters(self) -> serde_json::Value {
        let schema = match self {
            Self::SearchCommits => schema_for!(SearchCommitsParams),
            Self::GetPrDetails => schema_for!(PrDetailsParams),
            Self::SearchCode => schema_for!(SearchCodeParams),
            Self::GetTimeline => schema_for!(TimelineParams),
            Self::GetRepositoryStats => schema_for!(RepositoryStatsParams),
        };
        serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
    }

    #[must_use]
    pub fn definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_owned(),
            description: self.description().to_owned(),
            parameters: self.parameters(),
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Schemas for all five tools, in registry order.
#[must_use]
pub fn definitions() -> Vec<ToolDefinition> {
    ToolKind::ALL.iter().map(|k| k.definition()).collect()
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchCommitsParams {
    /// Natural-language query, e.g. "authentication changes" or "bug fixes".
    pub query: String,
    /// Only commits whose author contains this substring.
    #[serde(default)]
    pub author: Option<String>,
    /// Inclusive lower date bound, YYYY-MM-DD or RFC 3339.
    #[serde(default)]
    pub since: Option<String>,
    /// Inclusive upper date bound, YYYY-MM-DD or RFC 3339.
    #[serde(default)]
    pub until: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PrDetailsParams {
    /// The pull request number, just the number.
    #[serde(deserialize_with = "de_flexible_number")]
    #[schemars(with = "u64")]
    pub pr_number: u64,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchCodeParams {
    /// Natural-language query, e.g. "database connection logic".
    pub query: String,
    /// Only files with this extension, e.g. "rs" or ".py".
    #[serde(default)]
    pub file_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct TimelineParams {
    /// Inclusive lower date bound, YYYY-MM-DD or RFC 3339.
    #[serde(default)]
    pub since: Option<String>,
    /// Inclusive upper date bound, YYYY-MM-DD or RFC 3339.
    #[serde(default)]
    pub until: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct RepositoryStatsParams {}

/// Models pass numbers as numbers, quoted strings, or strings with stray
/// punctuation ("#43"). Accept any of those; reject everything else.
fn de_flexible_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom("expected a non-negative integer")),
        serde_json::Value::String(s) => {
            let digits: String = s.chars().filter(char::is_ascii_digit).collect();
            digits
                .parse::<u64>()
                .map_err(|_| serde::de::Error::custom(format!("no number found in {s:?}")))
        }
        other => Err(serde::de::Error::custom(format!(
            "expected a number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_all_names() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::parse(kind.name()), Some(kind));
        }
        assert_eq!(ToolKind::parse("delete_everything"), None);
    }

    #[test]
    fn definitions_cover_all_tools() {
        let defs = definitions();
        assert_eq!(defs.len(), 5);
        assert_eq!(defs[0].name, "search_commits");
        assert!(defs.iter().all(|d| !d.description.is_empty()));
        assert!(defs.iter().all(|d| d.parameters.is_object()));
    }

    #[test]
    fn search_commits_schema_lists_query() {
        let params = ToolKind::SearchCommits.parameters();
        let props = params.get("properties").unwrap();
        assert!(props.get("query").is_some());
        assert!(props.get("author").is_some());
    }

    #[test]
    fn pr_number_accepts_integer() {
        let p: PrDetailsParams = serde_json::from_value(serde_json::json!({"pr_number": 43})).unwrap();
        assert_eq!(p.pr_number, 43);
    }

    #[test]
    fn pr_number_accepts_decorated_string() {
        let p: PrDetailsParams =
            serde_json::from_value(serde_json::json!({"pr_number": "#43"})).unwrap();
        assert_eq!(p.pr_number, 43);
        let p: PrDetailsParams =
            serde_json::from_value(serde_json::json!({"pr_number": "'7'"})).unwrap();
        assert_eq!(p.pr_number, 7);
    }

    #[test]
    fn pr_number_rejects_garbage() {
        assert!(
            serde_json::from_value::<PrDetailsParams>(serde_json::json!({"pr_number": "latest"}))
                .is_err()
        );
        assert!(
            serde_json::from_value::<PrDetailsParams>(serde_json::json!({"pr_number": true}))
                .is_err()
        );
    }

    #[test]
    fn optional_filters_default_to_none() {
        let p: SearchCommitsParams =
            serde_json::from_value(serde_json::json!({"query": "auth"})).unwrap();
        assert!(p.author.is_none());
        assert!(p.since.is_none());
    }
}
