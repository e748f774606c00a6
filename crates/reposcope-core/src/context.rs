//! Token budget enforcement for every request sent to the model backend.

use reposcope_llm::provider::{Message, Role, estimate_tokens};

use crate::config::ContextConfig;

/// Flat allowance for the tool schema block attached to each request.
const TOOL_SCHEMA_ALLOWANCE: usize = 2000;
/// Per-message overhead for role and framing.
const MESSAGE_OVERHEAD: usize = 4;

const TRUNCATION_MARKER: &str = "\n\n[truncated]";

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// Even maximal trimming leaves the request over the ceiling; terminal
    /// for the turn, never a silent wrong answer.
    #[error("conversation cannot fit the token ceiling ({estimated} estimated > {ceiling})")]
    BudgetExceeded { estimated: usize, ceiling: usize },
}

/// Keeps the running conversation under the model token ceiling. Owned by
/// exactly one session; no state is shared across queries.
#[derive(Debug, Clone)]
pub struct ContextManager {
    max_context_tokens: usize,
    conversation_tail: usize,
    tool_result_token_cap: usize,
}

impl ContextManager {
    #[must_use]
    pub fn new(config: &ContextConfig) -> Self {
        Self {
            max_context_tokens: config.max_context_tokens,
            conversation_tail: config.conversation_tail,
            tool_result_token_cap: config.tool_result_token_cap,
        }
    }

    #[must_use]
    pub fn message_tokens(message: &Message) -> usize {
        MESSAGE_OVERHEAD + estimate_tokens(&message.content)
    }

    /// Estimated request size for the whole conversation, tool schemas
    /// included.
    #[must_use]
    pub fn conversation_tokens(&self, messages: &[Message]) -> usize {
        messages.iter().map(Self::message_tokens).sum::<usize>() + TOOL_SCHEMA_ALLOWANCE
    }

    /// Cap one tool result's serialized text. The structured payload is
    /// never touched; only the text the model reads is cut.
    #[must_use]
    pub fn truncate_tool_result(&self, text: &str) -> (String, bool) {
        if estimate_tokens(text) <= self.tool_result_token_cap {
            return (text.to_owned(), false);
        }
        let max_bytes = text.floor_char_boundary(self.tool_result_token_cap * 4);
        let mut truncated = text[..max_bytes].to_owned();
        truncated.push_str(TRUNCATION_MARKER);
        (truncated, true)
    }

    /// Drop history until the conversation fits the ceiling.
    ///
    /// Preserves the leading system message and the most recent
    /// `conversation_tail` messages; everything between goes oldest-first,
    /// removed outright rather than summarized. When the preserved set alone
    /// is still over, its oldest messages go too, down to the final message.
    ///
    /// Returns the number of messages dropped.
    ///
    /// # Errors
    ///
    /// `BudgetExceeded` when even the final message alone is over the
    /// ceiling.
    pub fn trim(&self, messages: &mut Vec<Message>) -> Result<usize, ContextError> {
        let ceiling = self.max_context_tokens;
        let mut dropped = 0;

        while self.conversation_tokens(messages) > ceiling {
            let head = usize::from(messages.first().is_some_and(|m| m.role == Role::System));
            let tail_start = messages.len().saturating_sub(self.conversation_tail);
            if tail_start > head {
                messages.remove(head);
                dropped += 1;
            } else {
                break;
            }
        }

        // Best effort on the preserved set itself; the final message stays.
        while self.conversation_tokens(messages) > ceiling && messages.len() > 1 {
            messages.remove(0);
            dropped += 1;
        }

        let estimated = self.conversation_tokens(messages);
        if estimated > ceiling {
            return Err(ContextError::BudgetExceeded { estimated, ceiling });
        }
        if dropped > 0 {
            tracing::info!(dropped, estimated, ceiling, "trimmed conversation history");
        }
        Ok(dropped)
    }
}
