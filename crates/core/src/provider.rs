//! Provider trait — the abstraction over LLM backends.
//!
//! A Provider knows how to send an assembled conversation to an LLM and get a
//! response back, either as a complete message or as a stream of chunks. The
//! HTTP client behind this trait is an external collaborator; the core only
//! names the contract it consumes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{Message, MessageToolCall};

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "anthropic/claude-sonnet-4", "gpt-4o")
    pub model: String,

    /// The assembled input messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling cutoff
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Request reasoning tokens when the model supports them (advisory)
    #[serde(default)]
    pub reasoning_enabled: bool,

    /// Reasoning token cap (advisory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reasoning_tokens: Option<u32>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    1.0
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information for one model call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u32>,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens + self.reasoning_tokens.unwrap_or(0)
    }
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Partial reasoning delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,

    /// Tool call deltas
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Model capability info surfaced through `GET /models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub context_window: Option<usize>,
    #[serde(default)]
    pub supports_tools: bool,
    #[serde(default)]
    pub supports_reasoning: bool,
}

/// The core Provider trait.
///
/// The reasoning loop calls `complete()` or `stream()` without knowing which
/// backend is being used — pure polymorphism.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider.
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as a
    /// single chunk.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let response = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(response.message.content),
                thinking: response.message.thinking,
                tool_calls: response.message.tool_calls,
                done: true,
                usage: response.usage,
            }))
            .await;
        Ok(rx)
    }

    /// List available models and their capabilities.
    async fn list_models(&self) -> std::result::Result<Vec<ModelInfo>, ProviderError> {
        Ok(Vec::new())
    }

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SessionId;

    #[test]
    fn usage_totals_include_reasoning() {
        let usage = Usage { prompt_tokens: 100, completion_tokens: 50, reasoning_tokens: Some(25) };
        assert_eq!(usage.total_tokens(), 175);

        let usage = Usage { prompt_tokens: 100, completion_tokens: 50, reasoning_tokens: None };
        assert_eq!(usage.total_tokens(), 150);
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "archival_memory_search".into(),
            description: "Search long-term memory".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "The search query" }
                },
                "required": ["query"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("archival_memory_search"));
        assert!(json.contains("query"));
    }

    #[tokio::test]
    async fn default_stream_wraps_complete() {
        struct OneShot;

        #[async_trait]
        impl Provider for OneShot {
            fn name(&self) -> &str {
                "oneshot"
            }

            async fn complete(
                &self,
                request: ProviderRequest,
            ) -> std::result::Result<ProviderResponse, ProviderError> {
                let session = SessionId::from("s");
                Ok(ProviderResponse {
                    message: Message::assistant(&session, "hi"),
                    usage: Some(Usage { prompt_tokens: 1, completion_tokens: 1, reasoning_tokens: None }),
                    model: request.model,
                })
            }
        }

        let provider = OneShot;
        let mut rx = provider
            .stream(ProviderRequest {
                model: "m".into(),
                messages: vec![],
                temperature: 0.7,
                top_p: 1.0,
                max_tokens: None,
                tools: vec![],
                reasoning_enabled: false,
                max_reasoning_tokens: None,
                stream: true,
            })
            .await
            .unwrap();

        let chunk = rx.recv().await.unwrap().unwrap();
        assert!(chunk.done);
        assert_eq!(chunk.content.as_deref(), Some("hi"));
    }
}
