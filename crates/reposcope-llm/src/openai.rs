use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{
    ChatResponse, LlmProvider, Message, MessagePart, Role, ToolDefinition, ToolUseRequest,
};

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_SECS: u64 = 1;

/// Client for any OpenAI-compatible chat completions endpoint.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    embedding_model: Option<String>,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

impl Clone for OpenAiProvider {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            embedding_model: self.embedding_model.clone(),
        }
    }
}

impl OpenAiProvider {
    #[must_use]
    pub fn new(
        api_key: String,
        mut base_url: String,
        model: String,
        max_tokens: u32,
        embedding_model: Option<String>,
    ) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model,
            max_tokens,
            embedding_model,
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{path}", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
    }

    async fn send_chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse, LlmError> {
        let api_messages = convert_messages(messages);
        let api_tools: Vec<OpenAiTool> = tools
            .iter()
            .map(|t| OpenAiTool {
                r#type: "function",
                function: OpenAiFunction {
                    name: &t.name,
                    description: &t.description,
                    parameters: &t.parameters,
                },
            })
            .collect();

        for attempt in 0..=MAX_RETRIES {
            let body = ChatRequest {
                model: &self.model,
                messages: &api_messages,
                max_tokens: self.max_tokens,
                tools: if api_tools.is_empty() {
                    None
                } else {
                    Some(&api_tools)
                },
            };
            let response = self.post("/chat/completions").json(&body).send().await?;
            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if attempt == MAX_RETRIES {
                    return Err(LlmError::RateLimited);
                }
                let delay = retry_delay(&response, attempt);
                tracing::warn!(
                    "rate limited, retrying in {}s (attempt {}/{})",
                    delay.as_secs(),
                    attempt + 1,
                    MAX_RETRIES
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let text = response.text().await.map_err(LlmError::Http)?;

            if !status.is_success() {
                tracing::error!("chat API error {status}: {text}");
                return Err(LlmError::Other(format!(
                    "chat request failed (status {status})"
                )));
            }

            let resp: OpenAiChatResponse = serde_json::from_str(&text)?;
            let choice = resp
                .choices
                .into_iter()
                .next()
                .ok_or(LlmError::EmptyResponse { provider: "openai" })?;

            if let Some(tool_calls) = choice.message.tool_calls
                && !tool_calls.is_empty()
            {
                let text = if choice.message.content.is_empty() {
                    None
                } else {
                    Some(choice.message.content)
                };
                let calls = tool_calls
                    .into_iter()
                    .map(|tc| {
                        let input = serde_json::from_str(&tc.function.arguments)
                            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));
                        ToolUseRequest {
                            id: tc.id,
                            name: tc.function.name,
                            input,
                        }
                    })
                    .collect();
                return Ok(ChatResponse::ToolUse { text, tool_calls: calls });
            }

            return Ok(ChatResponse::Text(choice.message.content));
        }

        Err(LlmError::RateLimited)
    }
}

fn retry_delay(response: &reqwest::Response, attempt: u32) -> Duration {
    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    match retry_after {
        Some(secs) => Duration::from_secs(secs),
        None => Duration::from_secs(BASE_BACKOFF_SECS << attempt),
    }
}

impl LlmProvider for OpenAiProvider {
    async fn chat(&self, messages: &[Message]) -> Result<String, LlmError> {
        match self.send_chat(messages, &[]).await? {
            ChatResponse::Text(text) => Ok(text),
            ChatResponse::ToolUse { text, .. } => {
                // No tools were offered, so a tool-use answer is malformed;
                // salvage any text the model produced.
                text.ok_or(LlmError::EmptyResponse { provider: "openai" })
            }
        }
    }

    async fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse, LlmError> {
        self.send_chat(messages, tools).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let model = self
            .embedding_model
            .as_deref()
            .ok_or(LlmError::EmbedUnsupported { provider: "openai" })?;

        let body = EmbeddingRequest { input: text, model };
        let response = self.post("/embeddings").json(&body).send().await?;
        let status = response.status();
        let text = response.text().await.map_err(LlmError::Http)?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            tracing::error!("embedding API error {status}: {text}");
            return Err(LlmError::Other(format!(
                "embedding request failed (status {status})"
            )));
        }

        let resp: EmbeddingResponse = serde_json::from_str(&text)?;
        resp.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(LlmError::EmptyResponse { provider: "openai" })
    }

    fn supports_embeddings(&self) -> bool {
        self.embedding_model.is_some()
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [OpenAiTool<'a>]>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCallOut>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize)]
struct OpenAiToolCallOut {
    id: String,
    r#type: String,
    function: OpenAiFunctionCall,
}

#[derive(Serialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct OpenAiTool<'a> {
    r#type: &'a str,
    function: OpenAiFunction<'a>,
}

#[derive(Serialize)]
struct OpenAiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiToolCall {
    id: String,
    function: OpenAiToolCallFunction,
}

#[derive(Deserialize)]
struct OpenAiToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Convert internal messages to the wire format. Assistant `ToolUse` parts
/// become `tool_calls`; `ToolResult` parts become role "tool" messages with
/// the matching `tool_call_id`.
fn convert_messages(messages: &[Message]) -> Vec<ApiMessage> {
    let mut result = Vec::new();

    for msg in messages {
        let has_tool_parts = msg.parts.iter().any(|p| {
            matches!(
                p,
                MessagePart::ToolUse { .. } | MessagePart::ToolResult { .. }
            )
        });

        if has_tool_parts {
            if msg.role == Role::Assistant {
                let text_content: String = msg
                    .parts
                    .iter()
                    .filter_map(|p| match p {
                        MessagePart::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("");

                let tool_calls: Vec<OpenAiToolCallOut> = msg
                    .parts
                    .iter()
                    .filter_map(|p| match p {
                        MessagePart::ToolUse { id, name, input } => Some(OpenAiToolCallOut {
                            id: id.clone(),
                            r#type: "function".to_owned(),
                            function: OpenAiFunctionCall {
                                name: name.clone(),
                                arguments: serde_json::to_string(input).unwrap_or_default(),
                            },
                        }),
                        _ => None,
                    })
                    .collect();

                result.push(ApiMessage {
                    role: "assistant".to_owned(),
                    content: text_content,
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(tool_calls)
                    },
                    tool_call_id: None,
                });
            } else {
                for part in &msg.parts {
                    match part {
                        MessagePart::ToolResult {
                            tool_use_id,
                            content,
                            ..
                        } => {
                            result.push(ApiMessage {
                                role: "tool".to_owned(),
                                content: content.clone(),
                                tool_calls: None,
                                tool_call_id: Some(tool_use_id.clone()),
                            });
                        }
                        MessagePart::Text { text } if !text.is_empty() => {
                            result.push(ApiMessage {
                                role: "user".to_owned(),
                                content: text.clone(),
                                tool_calls: None,
                                tool_call_id: None,
                            });
                        }
                        _ => {}
                    }
                }
            }
        } else {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            result.push(ApiMessage {
                role: role.to_owned(),
                content: msg.content.clone(),
                tool_calls: None,
                tool_call_id: None,
            });
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_provider(base_url: &str) -> OpenAiProvider {
        OpenAiProvider::new(
            "sk-test-key".into(),
            base_url.into(),
            "gpt-4o-mini".into(),
            4096,
            Some("text-embedding-3-small".into()),
        )
    }

    #[test]
    fn new_strips_trailing_slash() {
        let p = OpenAiProvider::new(
            "k".into(),
            "https://api.openai.com/v1/".into(),
            "m".into(),
            100,
            None,
        );
        assert_eq!(p.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn debug_redacts_api_key() {
        let p = test_provider("https://api.openai.com/v1");
        let debug = format!("{p:?}");
        assert!(!debug.contains("sk-test-key"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn supports_embeddings_follows_model() {
        assert!(test_provider("http://x").supports_embeddings());
        let p = OpenAiProvider::new("k".into(), "http://x".into(), "m".into(), 100, None);
        assert!(!p.supports_embeddings());
    }

    #[test]
    fn convert_messages_maps_roles() {
        let messages = vec![
            Message::text(Role::System, "system prompt"),
            Message::text(Role::User, "question"),
            Message::text(Role::Assistant, "reply"),
        ];
        let api = convert_messages(&messages);
        assert_eq!(api.len(), 3);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "user");
        assert_eq!(api[2].role, "assistant");
    }

    #[test]
    fn convert_messages_tool_round_trip() {
        let messages = vec![
            Message::from_parts(
                Role::Assistant,
                vec![MessagePart::ToolUse {
                    id: "call_1".into(),
                    name: "search_code".into(),
                    input: serde_json::json!({"query": "auth"}),
                }],
            ),
            Message::from_parts(
                Role::User,
                vec![MessagePart::ToolResult {
                    tool_use_id: "call_1".into(),
                    tool_name: "search_code".into(),
                    content: "no results".into(),
                    is_error: false,
                }],
            ),
        ];
        let api = convert_messages(&messages);
        assert_eq!(api.len(), 2);
        assert_eq!(api[0].role, "assistant");
        assert!(api[0].tool_calls.is_some());
        assert_eq!(api[1].role, "tool");
        assert_eq!(api[1].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn parse_tool_call_response() {
        let json = r#"{
            "choices": [{
                "message": {
                    "content": "",
                    "tool_calls": [{
                        "id": "call_123",
                        "type": "function",
                        "function": {
                            "name": "search_commits",
                            "arguments": "{\"query\":\"auth\"}"
                        }
                    }]
                }
            }]
        }"#;
        let resp: OpenAiChatResponse = serde_json::from_str(json).unwrap();
        let tc = resp.choices[0].message.tool_calls.as_ref().unwrap();
        assert_eq!(tc[0].id, "call_123");
        assert_eq!(tc[0].function.name, "search_commits");
    }

    #[tokio::test]
    async fn chat_returns_final_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "the answer"}}]
            })))
            .mount(&server)
            .await;

        let p = test_provider(&server.uri());
        let out = p.chat(&[Message::text(Role::User, "q")]).await.unwrap();
        assert_eq!(out, "the answer");
    }

    #[tokio::test]
    async fn chat_with_tools_parses_tool_use() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {
                    "content": "",
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "get_timeline", "arguments": "{}"}
                    }]
                }}]
            })))
            .mount(&server)
            .await;

        let p = test_provider(&server.uri());
        let tools = vec![ToolDefinition {
            name: "get_timeline".into(),
            description: "timeline".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }];
        let out = p
            .chat_with_tools(&[Message::text(Role::User, "q")], &tools)
            .await
            .unwrap();
        match out {
            ChatResponse::ToolUse { tool_calls, .. } => {
                assert_eq!(tool_calls.len(), 1);
                assert_eq!(tool_calls[0].name, "get_timeline");
            }
            ChatResponse::Text(_) => panic!("expected tool use"),
        }
    }

    #[tokio::test]
    async fn rate_limit_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "recovered"}}]
            })))
            .mount(&server)
            .await;

        let p = test_provider(&server.uri());
        let out = p.chat(&[Message::text(Role::User, "q")]).await.unwrap();
        assert_eq!(out, "recovered");
    }

    #[tokio::test]
    async fn embed_parses_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.1, 0.2, 0.3]}]
            })))
            .mount(&server)
            .await;

        let p = test_provider(&server.uri());
        let v = p.embed("hello").await.unwrap();
        assert_eq!(v, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn embed_without_model_errors() {
        let p = OpenAiProvider::new("k".into(), "http://127.0.0.1:1".into(), "m".into(), 100, None);
        let err = p.embed("test").await.unwrap_err();
        assert!(err.to_string().contains("embedding not supported"));
    }

    #[tokio::test]
    async fn chat_unreachable_endpoint_errors() {
        let p = OpenAiProvider::new("k".into(), "http://127.0.0.1:1".into(), "m".into(), 100, None);
        assert!(p.chat(&[Message::text(Role::User, "q")]).await.is_err());
    }
}
