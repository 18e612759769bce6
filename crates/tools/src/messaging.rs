//! Conversation-control tools.
//!
//! `send_message` is the terminal tool: invoking it ends the turn and its
//! `message` argument becomes the final assistant output. `request_heartbeat`
//! keeps the loop alive for another thinking step without terminating.

use async_trait::async_trait;

use mnemon_core::error::ToolError;
use mnemon_core::tool::{SideEffectClass, Tool, ToolResult};

/// The terminal tool — sends the final reply to the user.
pub struct SendMessageTool;

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        "send_message"
    }

    fn description(&self) -> &str {
        "Send your final reply to the user. This ends the current turn."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": { "type": "string", "description": "The reply to deliver" }
            },
            "required": ["message"]
        })
    }

    fn side_effect_class(&self) -> SideEffectClass {
        SideEffectClass::Pure
    }

    fn is_terminal(&self) -> bool {
        true
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolResult, ToolError> {
        // The reasoning loop reads the message argument directly; this
        // handler only runs when a caller dispatches it out of band.
        Ok(ToolResult::ok("pending", args["message"].as_str().unwrap_or_default()))
    }
}

/// Non-terminal keep-alive — grants the model another step.
pub struct RequestHeartbeatTool;

#[async_trait]
impl Tool for RequestHeartbeatTool {
    fn name(&self) -> &str {
        "request_heartbeat"
    }

    fn description(&self) -> &str {
        "Request another reasoning step before replying. Use when you need to \
         inspect tool results or think further."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "reason": { "type": "string", "description": "Why another step is needed" }
            }
        })
    }

    fn side_effect_class(&self) -> SideEffectClass {
        SideEffectClass::Pure
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolResult, ToolError> {
        let reason = args["reason"].as_str().unwrap_or("continuing");
        Ok(ToolResult::ok("pending", format!("Heartbeat acknowledged ({reason}).")))
    }
}
