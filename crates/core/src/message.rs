//! Message domain types.
//!
//! These are the core value objects that flow through the entire system:
//! a user message enters a session, the reasoning loop processes it, and the
//! conversation store appends the resulting messages in `seq` order.

use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions or summaries
    System,
    /// Tool execution result
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }
}

/// Whether a message came through the normal inbox or was injected by the
/// system (heartbeats, summaries).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Inbox,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::System => "system",
        }
    }
}

/// A single message in a session.
///
/// `seq` is assigned by the conversation store on append and is strictly
/// increasing per session. Messages constructed in-process carry `seq = 0`
/// until persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Which session this message belongs to
    pub session_id: SessionId,

    /// Monotonic per-session sequence number (0 until persisted)
    #[serde(default)]
    pub seq: i64,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Inbox vs system-injected
    #[serde(default)]
    pub kind: MessageKind,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Model reasoning text, when the provider exposes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,

    /// Wall-clock reasoning time for this message, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_time_ms: Option<u64>,

    /// Set when this assistant message records a failed turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    /// Timestamp
    pub created_at: DateTime<Utc>,

    /// Optional metadata
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn base(session_id: &SessionId, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.clone(),
            seq: 0,
            role,
            content: content.into(),
            kind: MessageKind::Inbox,
            tool_calls: Vec::new(),
            tool_call_id: None,
            thinking: None,
            reasoning_time_ms: None,
            error_kind: None,
            created_at: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user message.
    pub fn user(session_id: &SessionId, content: impl Into<String>) -> Self {
        Self::base(session_id, Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(session_id: &SessionId, content: impl Into<String>) -> Self {
        Self::base(session_id, Role::Assistant, content)
    }

    /// Create an assistant message that records a failed turn.
    pub fn assistant_error(
        session_id: &SessionId,
        kind: ErrorKind,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::base(session_id, Role::Assistant, content);
        msg.error_kind = Some(kind);
        msg
    }

    /// Create a system message (summaries, injected context).
    pub fn system(session_id: &SessionId, content: impl Into<String>) -> Self {
        let mut msg = Self::base(session_id, Role::System, content);
        msg.kind = MessageKind::System;
        msg
    }

    /// Create a tool result message.
    pub fn tool_result(
        session_id: &SessionId,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::base(session_id, Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Attach tool calls to an assistant message.
    pub fn with_tool_calls(mut self, calls: Vec<MessageToolCall>) -> Self {
        self.tool_calls = calls;
        self
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call (unique within its message)
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON object
    pub arguments: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let session = SessionId::from("s1");
        let msg = Message::user(&session, "Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
        assert_eq!(msg.seq, 0);
        assert_eq!(msg.kind, MessageKind::Inbox);
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn system_messages_are_system_kind() {
        let session = SessionId::from("s1");
        let msg = Message::system(&session, "Summary of earlier conversation");
        assert_eq!(msg.role, Role::System);
        assert_eq!(msg.kind, MessageKind::System);
    }

    #[test]
    fn error_message_carries_kind() {
        let session = SessionId::from("s1");
        let msg = Message::assistant_error(&session, ErrorKind::StepLimit, "step limit reached");
        assert_eq!(msg.error_kind, Some(ErrorKind::StepLimit));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("step_limit"));
    }

    #[test]
    fn message_serialization_roundtrip() {
        let session = SessionId::from("s1");
        let msg = Message::assistant(&session, "Test message").with_tool_calls(vec![
            MessageToolCall {
                id: "call_1".into(),
                name: "archival_memory_search".into(),
                arguments: serde_json::json!({"query": "coffee"}),
            },
        ]);
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content, "Test message");
        assert_eq!(back.tool_calls.len(), 1);
        assert_eq!(back.tool_calls[0].name, "archival_memory_search");
    }

    #[test]
    fn tool_result_links_call_id() {
        let session = SessionId::from("s1");
        let msg = Message::tool_result(&session, "call_9", "ok");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_9"));
    }
}
