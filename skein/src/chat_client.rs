//! `ChatClient` contract for agent executors: the seam where an external
//! model provider plugs in, using the richer named-options call shape chat
//! completion and responses APIs share rather than a single fixed turn call.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tool::Tool;

/// One message in a chat history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A model's request to invoke a locally-registered `Tool::Function`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

/// Named call options. Unrecognized entries round-trip through `extra`
/// rather than being silently dropped, matching a passthrough contract the
/// pack's options-map callers rely on.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatResponseChunk {
    pub delta: String,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatClientError {
    #[error("chat client transport error: {0}")]
    Transport(String),
    #[error("chat client returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// The seam an agent executor calls through; real providers (OpenAI-style
/// chat/responses APIs, local models) implement this, tests use `MockChatClient`.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn get_response(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatResponse, ChatClientError>;

    async fn get_streaming_response(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<BoxStream<'static, ChatResponseChunk>, ChatClientError>;
}

/// A fixed-response `ChatClient`, useful for tests and sample workflows.
pub struct MockChatClient {
    pub response: ChatResponse,
}

impl MockChatClient {
    pub fn text(content: impl Into<String>) -> Self {
        Self { response: ChatResponse { content: content.into(), tool_calls: Vec::new() } }
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn get_response(
        &self,
        _messages: &[ChatMessage],
        _options: &ChatOptions,
    ) -> Result<ChatResponse, ChatClientError> {
        Ok(self.response.clone())
    }

    async fn get_streaming_response(
        &self,
        _messages: &[ChatMessage],
        _options: &ChatOptions,
    ) -> Result<BoxStream<'static, ChatResponseChunk>, ChatClientError> {
        let chunk = ChatResponseChunk { delta: self.response.content.clone(), done: true };
        Ok(Box::pin(futures::stream::once(async move { chunk })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_chat_client_echoes_fixed_response() {
        let client = MockChatClient::text("hello there");
        let response = client
            .get_response(&[], &ChatOptions::default())
            .await
            .unwrap();
        assert_eq!(response.content, "hello there");
    }

    #[test]
    fn chat_options_extra_round_trips_unknown_keys() {
        let json = serde_json::json!({"instructions": "be terse", "custom_key": 42});
        let options: ChatOptions = serde_json::from_value(json).unwrap();
        assert_eq!(options.instructions.as_deref(), Some("be terse"));
        assert_eq!(options.extra.get("custom_key"), Some(&Value::from(42)));
    }
}
