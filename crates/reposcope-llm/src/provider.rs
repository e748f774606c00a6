use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Structured segments of a message. Plain conversation messages carry no
/// parts; tool round trips are expressed as `ToolUse` on the assistant
/// message and `ToolResult` on the following user message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MessagePart {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub parts: Vec<MessagePart>,
}

impl Message {
    #[must_use]
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            parts: vec![],
        }
    }

    /// Build a message from structured parts; `content` is the flattened
    /// text rendering used for token estimation and plain-chat fallbacks.
    #[must_use]
    pub fn from_parts(role: Role, parts: Vec<MessagePart>) -> Self {
        let content = flatten_parts(&parts);
        Self {
            role,
            content,
            parts,
        }
    }
}

fn flatten_parts(parts: &[MessagePart]) -> String {
    let mut out = String::new();
    for part in parts {
        if !out.is_empty() {
            out.push('\n');
        }
        match part {
            MessagePart::Text { text } => out.push_str(text),
            MessagePart::ToolUse { name, input, .. } => {
                out.push_str(&format!("[tool call: {name} {input}]"));
            }
            MessagePart::ToolResult {
                tool_name, content, ..
            } => {
                out.push_str(&format!("[tool result: {tool_name}]\n{content}"));
            }
        }
    }
    out
}

/// Estimate token count using the chars/4 heuristic. Any monotonic proxy
/// works here; the backend remains the final arbiter of hard limits.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Schema-described tool surfaced to the model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool invocation requested by the model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolUseRequest {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Outcome of a model call with tools attached.
#[derive(Clone, Debug)]
pub enum ChatResponse {
    Text(String),
    ToolUse {
        text: Option<String>,
        tool_calls: Vec<ToolUseRequest>,
    },
}

pub trait LlmProvider: Send + Sync {
    /// Send messages to the LLM and return the assistant text.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response
    /// is invalid.
    fn chat(&self, messages: &[Message])
    -> impl Future<Output = Result<String, LlmError>> + Send;

    /// Send messages plus tool schemas; the model answers with either final
    /// text or one or more tool invocations.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response
    /// is invalid.
    fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> impl Future<Output = Result<ChatResponse, LlmError>> + Send;

    /// Embed a text into a fixed-dimension vector.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::EmbedUnsupported` when the backend has no
    /// embedding model configured.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    fn supports_embeddings(&self) -> bool;

    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_message_has_no_parts() {
        let msg = Message::text(Role::User, "hello");
        assert_eq!(msg.content, "hello");
        assert!(msg.parts.is_empty());
    }

    #[test]
    fn from_parts_flattens_text() {
        let msg = Message::from_parts(
            Role::Assistant,
            vec![
                MessagePart::Text {
                    text: "looking".into(),
                },
                MessagePart::ToolUse {
                    id: "call_1".into(),
                    name: "search_code".into(),
                    input: serde_json::json!({"query": "auth"}),
                },
            ],
        );
        assert!(msg.content.contains("looking"));
        assert!(msg.content.contains("search_code"));
    }

    #[test]
    fn from_parts_tool_result() {
        let msg = Message::from_parts(
            Role::User,
            vec![MessagePart::ToolResult {
                tool_use_id: "call_1".into(),
                tool_name: "search_code".into(),
                content: "3 hits".into(),
                is_error: false,
            }],
        );
        assert!(msg.content.contains("[tool result: search_code]"));
        assert!(msg.content.contains("3 hits"));
    }

    #[test]
    fn estimate_tokens_basic() {
        assert_eq!(estimate_tokens("Hello world"), 2);
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn estimate_tokens_monotonic() {
        let short = estimate_tokens("abcd");
        let long = estimate_tokens(&"abcd".repeat(100));
        assert!(long > short);
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }
}
