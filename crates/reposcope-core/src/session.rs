//! The per-query agent loop.
//!
//! One session owns one conversation. Each turn sends the conversation plus
//! the tool schemas to the model; a tool request is executed (one call at a
//! time, in request order) and fed back, a plain answer finishes the query.
//! Hitting the turn limit forces a final best-effort call with tools
//! disabled.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use reposcope_index::store::VectorStore;
use reposcope_llm::LlmError;
use reposcope_llm::provider::{
    ChatResponse, LlmProvider, Message, MessagePart, Role, estimate_tokens,
};
use reposcope_tools::{ToolError, ToolExecutor};

use crate::config::Config;
use crate::context::{ContextError, ContextManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingModel,
    ExecutingTool,
    Done,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("query cancelled")]
    Cancelled,
}

/// One executed tool call, kept for the answer's trace.
#[derive(Debug, Clone, Serialize)]
pub struct ToolTraceEntry {
    pub tool: String,
    pub arguments: Value,
    pub token_estimate: usize,
    pub is_error: bool,
}

#[derive(Debug)]
pub struct AgentAnswer {
    pub text: String,
    pub model_calls: usize,
    /// True when the answer came from the forced best-effort call after the
    /// turn limit.
    pub forced: bool,
    pub trace: Vec<ToolTraceEntry>,
}

pub struct AgentSession<P: LlmProvider, S: VectorStore> {
    provider: P,
    tools: Arc<ToolExecutor<S>>,
    repo_id: String,
    context: ContextManager,
    messages: Vec<Message>,
    state: SessionState,
    max_turns: usize,
    cancel: CancellationToken,
    trace: Vec<ToolTraceEntry>,
}

fn build_system_prompt(repo_id: &str) -> String {
    format!(
        "You are a repository analysis assistant for {repo_id}. Answer questions \
         about the repository's history, code, and pull requests using the \
         provided tools. Ground every claim in tool results; when a tool returns \
         nothing, say so instead of guessing. Cite commits by short SHA and pull \
         requests by number."
    )
}

impl<P: LlmProvider, S: VectorStore> AgentSession<P, S> {
    #[must_use]
    pub fn new(provider: P, tools: Arc<ToolExecutor<S>>, repo_id: &str, config: &Config) -> Self {
        Self {
            provider,
            tools,
            repo_id: repo_id.to_owned(),
            context: ContextManager::new(&config.context),
            messages: vec![Message::text(Role::System, build_system_prompt(repo_id))],
            state: SessionState::AwaitingModel,
            max_turns: config.agent.max_turns,
            cancel: CancellationToken::new(),
            trace: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the loop for one question until a final answer, the turn limit's
    /// forced answer, or failure.
    ///
    /// # Errors
    ///
    /// Fails on unrecoverable backend errors, an untrimmable conversation,
    /// or cancellation between turns. Tool-level problems are reported back
    /// to the model instead of failing the query.
    pub async fn ask(&mut self, question: &str) -> Result<AgentAnswer, SessionError> {
        self.messages.push(Message::text(Role::User, question));
        let definitions = ToolExecutor::<S>::definitions();
        let mut model_calls = 0;

        for turn in 0..self.max_turns {
            if self.cancel.is_cancelled() {
                self.state = SessionState::Failed;
                return Err(SessionError::Cancelled);
            }

            self.state = SessionState::AwaitingModel;
            let trimmed = self.context.trim(&mut self.messages).map(|_| ());
            self.guard(trimmed)?;

            let response = self
                .provider
                .chat_with_tools(&self.messages, &definitions)
                .await;
            let response = self.guard(response)?;
            model_calls += 1;

            match response {
                ChatResponse::Text(text) => {
                    self.messages.push(Message::text(Role::Assistant, text.clone()));
                    self.state = SessionState::Done;
                    return Ok(AgentAnswer {
                        text,
                        model_calls,
                        forced: false,
                        trace: std::mem::take(&mut self.trace),
                    });
                }
                ChatResponse::ToolUse { text, tool_calls } => {
                    tracing::debug!(turn, requests = tool_calls.len(), "model requested tools");
                    let mut parts = Vec::new();
                    if let Some(text) = text {
                        parts.push(MessagePart::Text { text });
                    }
                    parts.extend(tool_calls.iter().map(|call| MessagePart::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.input.clone(),
                    }));
                    self.messages.push(Message::from_parts(Role::Assistant, parts));

                    self.state = SessionState::ExecutingTool;
                    for call in tool_calls {
                        self.run_tool(&call.id, &call.name, &call.input).await;
                    }
                }
            }
        }

        // Turn limit reached: one last call, tools disabled, answer with
        // whatever was gathered.
        tracing::info!(max_turns = self.max_turns, "turn limit reached, forcing final answer");
        if self.cancel.is_cancelled() {
            self.state = SessionState::Failed;
            return Err(SessionError::Cancelled);
        }
        self.messages.push(Message::text(
            Role::User,
            "Turn limit reached. Answer the original question now using the \
             information gathered so far; no further tool calls are available.",
        ));
        let trimmed = self.context.trim(&mut self.messages).map(|_| ());
        self.guard(trimmed)?;
        let final_text = self.provider.chat(&self.messages).await;
        let text = self.guard(final_text)?;
        self.state = SessionState::Done;
        Ok(AgentAnswer {
            text,
            model_calls: model_calls + 1,
            forced: true,
            trace: std::mem::take(&mut self.trace),
        })
    }

    /// Execute one requested tool and append its (possibly truncated) result
    /// to the conversation. Tool failures become error-flagged results, not
    /// session failures.
    async fn run_tool(&mut self, call_id: &str, name: &str, arguments: &Value) {
        let (content, is_error) = match self.tools.execute(&self.repo_id, name, arguments).await {
            Ok(output) => {
                let (text, truncated) = self.context.truncate_tool_result(&output.text);
                if truncated {
                    tracing::debug!(tool = name, "tool result truncated to cap");
                }
                (text, false)
            }
            Err(e @ ToolError::InvalidInput(_)) => {
                tracing::debug!(tool = name, "invalid tool input: {e}");
                (format!("Error: {e}"), true)
            }
            Err(e @ ToolError::Execution(_)) => {
                tracing::warn!(tool = name, "tool execution failed: {e}");
                (format!("Error: {e}"), true)
            }
        };

        self.trace.push(ToolTraceEntry {
            tool: name.to_owned(),
            arguments: arguments.clone(),
            token_estimate: estimate_tokens(&content),
            is_error,
        });
        self.messages.push(Message::from_parts(
            Role::User,
            vec![MessagePart::ToolResult {
                tool_use_id: call_id.to_owned(),
                tool_name: name.to_owned(),
                content,
                is_error,
            }],
        ));
    }

    fn guard<T, E: Into<SessionError>>(&mut self, result: Result<T, E>) -> Result<T, SessionError> {
        result.map_err(|e| {
            self.state = SessionState::Failed;
            e.into()
        })
    }
}
