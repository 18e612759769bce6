//! Agent-level streaming events.
//!
//! `AgentStreamEvent` wraps the reasoning loop's progress into frames the
//! gateway forwards to clients over SSE:
//!
//! - `thinking_delta` — model reasoning text
//! - `content_delta`  — assistant text
//! - `tool_call`      — the loop is dispatching a tool
//! - `tool_result`    — tool execution completed
//! - `done`           — turn complete, carries final usage
//! - `error`          — turn failed, carries `{kind, message}`

use serde::{Deserialize, Serialize};

use mnemon_core::error::ErrorKind;
use mnemon_core::provider::Usage;

/// Events emitted by the reasoning loop during a streamed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// Model reasoning text.
    ThinkingDelta { content: String },

    /// Assistant text.
    ContentDelta { content: String },

    /// The loop is dispatching a tool.
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },

    /// Tool execution completed.
    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// The turn is complete — final usage and counters.
    Done {
        usage: Option<Usage>,
        cost_usd: f64,
        steps: u32,
        tool_calls_made: u32,
    },

    /// The turn failed.
    Error { kind: ErrorKind, message: String },
}

impl AgentStreamEvent {
    /// SSE event name for this frame.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ThinkingDelta { .. } => "thinking_delta",
            Self::ContentDelta { .. } => "content_delta",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_delta_serialization() {
        let event = AgentStreamEvent::ContentDelta { content: "Hello".into() };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"content_delta""#));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn tool_call_serialization() {
        let event = AgentStreamEvent::ToolCall {
            id: "call_1".into(),
            name: "archival_memory_search".into(),
            arguments: serde_json::json!({"query": "tea"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_call""#));
        assert!(json.contains("archival_memory_search"));
    }

    #[test]
    fn done_carries_usage() {
        let event = AgentStreamEvent::Done {
            usage: Some(Usage { prompt_tokens: 10, completion_tokens: 20, reasoning_tokens: None }),
            cost_usd: 0.003,
            steps: 2,
            tool_calls_made: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"done""#));
        assert!(json.contains(r#""steps":2"#));
        assert!(json.contains(r#""prompt_tokens":10"#));
    }

    #[test]
    fn error_carries_kind() {
        let event =
            AgentStreamEvent::Error { kind: ErrorKind::StepLimit, message: "too many".into() };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains("step_limit"));
    }

    #[test]
    fn event_type_names_match_frames() {
        assert_eq!(
            AgentStreamEvent::ThinkingDelta { content: String::new() }.event_type(),
            "thinking_delta"
        );
        assert_eq!(
            AgentStreamEvent::ContentDelta { content: String::new() }.event_type(),
            "content_delta"
        );
        assert_eq!(
            AgentStreamEvent::Done { usage: None, cost_usd: 0.0, steps: 0, tool_calls_made: 0 }
                .event_type(),
            "done"
        );
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"content_delta","content":"hi"}"#;
        let event: AgentStreamEvent = serde_json::from_str(json).unwrap();
        match event {
            AgentStreamEvent::ContentDelta { content } => assert_eq!(content, "hi"),
            _ => panic!("Wrong variant"),
        }
    }
}
