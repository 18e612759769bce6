//! Feedback tool — lets the agent grade its own recalled memories so the
//! learner can adjust importance over time.

use async_trait::async_trait;
use std::sync::Arc;

use mnemon_core::error::ToolError;
use mnemon_core::tool::{SideEffectClass, Tool, ToolResult};
use mnemon_memory::{FeedbackKind, HierarchicalMemory};

/// Record feedback on a memory item by id.
pub struct RecordFeedbackTool {
    memory: Arc<HierarchicalMemory>,
}

impl RecordFeedbackTool {
    pub fn new(memory: Arc<HierarchicalMemory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for RecordFeedbackTool {
    fn name(&self) -> &str {
        "record_feedback"
    }

    fn description(&self) -> &str {
        "Record feedback on a recalled memory: was it helpful, unhelpful, incorrect, \
         outdated, or redundant? This tunes what gets recalled in the future."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "memory_id": { "type": "string", "description": "Id of the memory" },
                "feedback": {
                    "type": "string",
                    "enum": ["helpful", "not_helpful", "incorrect", "outdated", "redundant"]
                }
            },
            "required": ["memory_id", "feedback"]
        })
    }

    fn side_effect_class(&self) -> SideEffectClass {
        SideEffectClass::Write
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolResult, ToolError> {
        let memory_id = args["memory_id"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            tool_name: self.name().into(),
            reason: "missing 'memory_id'".into(),
        })?;
        let kind: FeedbackKind = args["feedback"]
            .as_str()
            .unwrap_or_default()
            .parse()
            .map_err(|reason| ToolError::InvalidArguments {
                tool_name: self.name().into(),
                reason,
            })?;

        let new_importance = self
            .memory
            .record_feedback(memory_id, kind)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;

        Ok(ToolResult::ok(
            "pending",
            format!("Feedback recorded; importance is now {new_importance:.1}."),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemon_core::memory::{MemoryCategory, MemoryItem};
    use mnemon_memory::hierarchy::{ConsolidationPolicy, HierarchyConfig};
    use mnemon_memory::InMemoryStore;

    async fn memory_with_item() -> (Arc<HierarchicalMemory>, String) {
        let mem = Arc::new(HierarchicalMemory::new(
            "agent-1",
            Arc::new(InMemoryStore::new()),
            HierarchyConfig::default(),
            ConsolidationPolicy::default(),
        ));
        let item = MemoryItem::new("agent-1", "the user dislikes cilantro", 6.0, MemoryCategory::Preference);
        let stored = mem.store("s1", item).await.unwrap();
        (mem, stored.id)
    }

    #[tokio::test]
    async fn helpful_raises_importance() {
        let (mem, id) = memory_with_item().await;
        let tool = RecordFeedbackTool::new(mem);

        let result = tool
            .execute(serde_json::json!({"memory_id": id, "feedback": "helpful"}))
            .await
            .unwrap();
        assert!(result.output.contains("6.5"));
    }

    #[tokio::test]
    async fn incorrect_lowers_and_flags() {
        let (mem, id) = memory_with_item().await;
        let tool = RecordFeedbackTool::new(mem.clone());

        tool.execute(serde_json::json!({"memory_id": id, "feedback": "incorrect"}))
            .await
            .unwrap();

        // Flag is visible on the stored item.
        let results = mem.search("s1", "cilantro", 5, None, None).await.unwrap();
        let item = &results[0].item;
        assert!((item.importance - 5.0).abs() < 1e-6);
        assert_eq!(item.metadata["flagged"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn unknown_feedback_kind_rejected() {
        let (mem, id) = memory_with_item().await;
        let tool = RecordFeedbackTool::new(mem);

        let err = tool
            .execute(serde_json::json!({"memory_id": id, "feedback": "amazing"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn unknown_memory_id_fails() {
        let (mem, _) = memory_with_item().await;
        let tool = RecordFeedbackTool::new(mem);

        let err = tool
            .execute(serde_json::json!({"memory_id": "ghost", "feedback": "helpful"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }
}
