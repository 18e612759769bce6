//! Archival-memory tools — long-term storage and retrieval through the
//! hierarchical memory engine.

use async_trait::async_trait;
use std::sync::Arc;

use mnemon_core::error::ToolError;
use mnemon_core::memory::{MemoryCategory, MemoryItem};
use mnemon_core::tool::{SideEffectClass, Tool, ToolResult};
use mnemon_memory::HierarchicalMemory;

/// Session tag for tool-originated writes; archival inserts are persisted,
/// not recalled through the working tier.
const ARCHIVAL_SESSION: &str = "archival";

/// Insert a memory into archival storage.
pub struct ArchivalMemoryInsertTool {
    memory: Arc<HierarchicalMemory>,
}

impl ArchivalMemoryInsertTool {
    pub fn new(memory: Arc<HierarchicalMemory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for ArchivalMemoryInsertTool {
    fn name(&self) -> &str {
        "archival_memory_insert"
    }

    fn description(&self) -> &str {
        "Store a memory in long-term archival storage. Use for facts, preferences, \
         events, emotions, and insights worth keeping across sessions."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "The memory content" },
                "importance": {
                    "type": "number",
                    "minimum": 0,
                    "maximum": 10,
                    "description": "Importance 0-10 (default 5)"
                },
                "category": {
                    "type": "string",
                    "enum": ["fact", "preference", "event", "emotion", "insight", "relationship_moment"],
                    "description": "Memory category (default 'fact')"
                }
            },
            "required": ["content"]
        })
    }

    fn side_effect_class(&self) -> SideEffectClass {
        SideEffectClass::Write
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolResult, ToolError> {
        let content = args["content"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            tool_name: self.name().into(),
            reason: "missing 'content'".into(),
        })?;
        // Archival implies persistence: clamp up to the episodic floor.
        let importance = (args["importance"].as_f64().unwrap_or(5.0) as f32).max(5.0);
        let category: MemoryCategory =
            args["category"].as_str().unwrap_or("fact").parse().unwrap_or(MemoryCategory::Fact);

        let item = MemoryItem::new(self.memory.agent_id(), content, importance, category);
        let stored = self
            .memory
            .store(ARCHIVAL_SESSION, item)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;

        Ok(ToolResult::ok(
            "pending",
            format!("Stored memory {} in the {} tier.", stored.id, stored.tier.as_str()),
        ))
    }
}

/// Search archival memory via attentional retrieval.
pub struct ArchivalMemorySearchTool {
    memory: Arc<HierarchicalMemory>,
}

impl ArchivalMemorySearchTool {
    pub fn new(memory: Arc<HierarchicalMemory>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for ArchivalMemorySearchTool {
    fn name(&self) -> &str {
        "archival_memory_search"
    }

    fn description(&self) -> &str {
        "Search your long-term archival memory for relevant facts and experiences. \
         Returns the most relevant memories with their ids, so you can record \
         feedback on them."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "What to look for" },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": 25,
                    "description": "Maximum results (default 5)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = args["query"].as_str().ok_or_else(|| ToolError::InvalidArguments {
            tool_name: self.name().into(),
            reason: "missing 'query'".into(),
        })?;
        let limit = args["limit"].as_u64().unwrap_or(5).min(25) as usize;

        let results = self
            .memory
            .search(ARCHIVAL_SESSION, query, limit, None, None)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;

        if results.is_empty() {
            return Ok(ToolResult::ok("pending", format!("No memories found for '{query}'.")));
        }

        let listing: Vec<serde_json::Value> = results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.item.id,
                    "content": r.item.content,
                    "tier": r.item.tier.as_str(),
                    "category": r.item.category.as_str(),
                    "score": (r.score * 100.0).round() / 100.0,
                })
            })
            .collect();

        Ok(ToolResult::ok(
            "pending",
            serde_json::to_string_pretty(&listing).unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemon_core::memory::MemoryTier;
    use mnemon_memory::hierarchy::{ConsolidationPolicy, HierarchyConfig};
    use mnemon_memory::InMemoryStore;

    fn memory() -> Arc<HierarchicalMemory> {
        Arc::new(HierarchicalMemory::new(
            "agent-1",
            Arc::new(InMemoryStore::new()),
            HierarchyConfig::default(),
            ConsolidationPolicy::default(),
        ))
    }

    #[tokio::test]
    async fn insert_persists_memory() {
        let mem = memory();
        let tool = ArchivalMemoryInsertTool::new(mem.clone());

        let result = tool
            .execute(serde_json::json!({
                "content": "the user's sister is called Lena",
                "importance": 7,
                "category": "fact"
            }))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("episodic"));
    }

    #[tokio::test]
    async fn low_importance_is_raised_to_persistence_floor() {
        let mem = memory();
        let tool = ArchivalMemoryInsertTool::new(mem.clone());

        let result = tool
            .execute(serde_json::json!({"content": "minor detail", "importance": 1}))
            .await
            .unwrap();
        // Clamped to the episodic floor rather than silently staying volatile.
        assert!(result.output.contains(MemoryTier::Episodic.as_str()));
    }

    #[tokio::test]
    async fn high_importance_insight_lands_in_semantic() {
        let mem = memory();
        let tool = ArchivalMemoryInsertTool::new(mem);

        let result = tool
            .execute(serde_json::json!({
                "content": "the user opens up when asked indirect questions",
                "importance": 9,
                "category": "insight"
            }))
            .await
            .unwrap();
        assert!(result.output.contains("semantic"));
    }

    #[tokio::test]
    async fn search_returns_ranked_listing() {
        let mem = memory();
        let insert = ArchivalMemoryInsertTool::new(mem.clone());
        insert
            .execute(serde_json::json!({"content": "the user drinks oat milk", "importance": 6}))
            .await
            .unwrap();
        insert
            .execute(serde_json::json!({"content": "the user runs on Sundays", "importance": 6}))
            .await
            .unwrap();

        let search = ArchivalMemorySearchTool::new(mem);
        let result = search
            .execute(serde_json::json!({"query": "what does the user drink", "limit": 2}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("oat milk"));
        assert!(result.output.contains("\"id\""));
    }

    #[tokio::test]
    async fn search_empty_store_reports_nothing_found() {
        let search = ArchivalMemorySearchTool::new(memory());
        let result = search.execute(serde_json::json!({"query": "anything"})).await.unwrap();
        assert!(result.output.contains("No memories found"));
    }
}
