//! Core-memory tools — let the agent edit its own identity blocks.
//!
//! Block constraints (read-only flag, character limit) are enforced by the
//! version store; violations come back to the model as structured errors it
//! can recover from.

use async_trait::async_trait;
use std::sync::Arc;

use mnemon_core::error::ToolError;
use mnemon_core::tool::{SideEffectClass, Tool, ToolResult};
use mnemon_store::VersionStore;

fn required_str<'a>(
    args: &'a serde_json::Value,
    key: &str,
    tool: &str,
) -> Result<&'a str, ToolError> {
    args[key].as_str().ok_or_else(|| ToolError::InvalidArguments {
        tool_name: tool.into(),
        reason: format!("missing '{key}'"),
    })
}

/// Append a line to one of the agent's memory blocks.
pub struct CoreMemoryAppendTool {
    agent_id: String,
    versions: Arc<VersionStore>,
}

impl CoreMemoryAppendTool {
    pub fn new(agent_id: impl Into<String>, versions: Arc<VersionStore>) -> Self {
        Self { agent_id: agent_id.into(), versions }
    }
}

#[async_trait]
impl Tool for CoreMemoryAppendTool {
    fn name(&self) -> &str {
        "core_memory_append"
    }

    fn description(&self) -> &str {
        "Append a new line to one of your core memory blocks (e.g. 'persona', 'human'). \
         Use this to record durable facts about yourself or the user."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "label": { "type": "string", "description": "The block to append to" },
                "text": { "type": "string", "description": "The line to append" }
            },
            "required": ["label", "text"]
        })
    }

    fn side_effect_class(&self) -> SideEffectClass {
        SideEffectClass::Write
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolResult, ToolError> {
        let label = required_str(&args, "label", self.name())?;
        let text = required_str(&args, "text", self.name())?;

        let block = self
            .versions
            .append_block_value(&self.agent_id, label, text)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;

        Ok(ToolResult::ok(
            "pending",
            format!("Appended to '{}' ({} / {} chars used).", label, block.value.len(), block.limit_chars),
        ))
    }
}

/// Replace content inside one of the agent's memory blocks.
pub struct CoreMemoryReplaceTool {
    agent_id: String,
    versions: Arc<VersionStore>,
}

impl CoreMemoryReplaceTool {
    pub fn new(agent_id: impl Into<String>, versions: Arc<VersionStore>) -> Self {
        Self { agent_id: agent_id.into(), versions }
    }
}

#[async_trait]
impl Tool for CoreMemoryReplaceTool {
    fn name(&self) -> &str {
        "core_memory_replace"
    }

    fn description(&self) -> &str {
        "Replace existing content in a core memory block with new content. \
         The old content must match exactly."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "label": { "type": "string", "description": "The block to edit" },
                "old_content": { "type": "string", "description": "Exact text to replace" },
                "new_content": { "type": "string", "description": "Replacement text" }
            },
            "required": ["label", "old_content", "new_content"]
        })
    }

    fn side_effect_class(&self) -> SideEffectClass {
        SideEffectClass::Write
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolResult, ToolError> {
        let label = required_str(&args, "label", self.name())?;
        let old = required_str(&args, "old_content", self.name())?;
        let new = required_str(&args, "new_content", self.name())?;

        self.versions
            .replace_block_content(&self.agent_id, label, old, new)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;

        Ok(ToolResult::ok("pending", format!("Updated block '{label}'.")))
    }
}
