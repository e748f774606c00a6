//! Test-only mock LLM provider with scripted responses.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::LlmError;
use crate::provider::{ChatResponse, LlmProvider, Message, ToolDefinition, ToolUseRequest};

#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<ChatResponse>>>,
    calls: Arc<AtomicUsize>,
    pub default_response: String,
    pub embedding: Vec<f32>,
    pub supports_embeddings: bool,
    pub fail_chat: bool,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
            default_response: "mock response".into(),
            embedding: vec![0.0; 16],
            supports_embeddings: false,
            fail_chat: false,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<ChatResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_chat: true,
            ..Self::default()
        }
    }

    /// Scripted tool invocation response.
    #[must_use]
    pub fn tool_call(name: &str, input: serde_json::Value) -> ChatResponse {
        ChatResponse::ToolUse {
            text: None,
            tool_calls: vec![ToolUseRequest {
                id: format!("call_{name}"),
                name: name.to_owned(),
                input,
            }],
        }
    }

    /// Number of chat calls made so far (plain and tool-enabled combined).
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> Result<ChatResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_chat {
            return Err(LlmError::Other("mock LLM error".into()));
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(ChatResponse::Text(self.default_response.clone()))
        } else {
            Ok(responses.remove(0))
        }
    }
}

impl LlmProvider for MockProvider {
    async fn chat(&self, _messages: &[Message]) -> Result<String, LlmError> {
        match self.next_response()? {
            ChatResponse::Text(text) => Ok(text),
            ChatResponse::ToolUse { text, .. } => {
                Ok(text.unwrap_or_else(|| self.default_response.clone()))
            }
        }
    }

    async fn chat_with_tools(
        &self,
        _messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<ChatResponse, LlmError> {
        self.next_response()
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        if self.supports_embeddings {
            Ok(self.embedding.clone())
        } else {
            Err(LlmError::EmbedUnsupported { provider: "mock" })
        }
    }

    fn supports_embeddings(&self) -> bool {
        self.supports_embeddings
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Role;

    #[tokio::test]
    async fn scripted_responses_in_order() {
        let provider = MockProvider::with_responses(vec![
            ChatResponse::Text("first".into()),
            ChatResponse::Text("second".into()),
        ]);
        let msgs = [Message::text(Role::User, "q")];
        assert_eq!(provider.chat(&msgs).await.unwrap(), "first");
        assert_eq!(provider.chat(&msgs).await.unwrap(), "second");
        assert_eq!(provider.chat(&msgs).await.unwrap(), "mock response");
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn tool_call_helper_round_trips() {
        let provider = MockProvider::with_responses(vec![MockProvider::tool_call(
            "search_code",
            serde_json::json!({"query": "parser"}),
        )]);
        let out = provider
            .chat_with_tools(&[Message::text(Role::User, "q")], &[])
            .await
            .unwrap();
        match out {
            ChatResponse::ToolUse { tool_calls, .. } => {
                assert_eq!(tool_calls[0].name, "search_code");
            }
            ChatResponse::Text(_) => panic!("expected tool use"),
        }
    }

    #[tokio::test]
    async fn failing_provider_errors() {
        let provider = MockProvider::failing();
        assert!(provider.chat(&[]).await.is_err());
    }

    #[tokio::test]
    async fn embed_when_enabled() {
        let provider = MockProvider {
            supports_embeddings: true,
            embedding: vec![1.0, 0.0],
            ..MockProvider::default()
        };
        assert_eq!(provider.embed("x").await.unwrap(), vec![1.0, 0.0]);
    }
}
