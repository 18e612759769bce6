//! Built-in tool implementations for Mnemon.
//!
//! These are the capabilities the model can call during a turn:
//! editing its identity blocks, writing and searching archival memory,
//! recording feedback on recalled memories, and ending the turn with
//! `send_message`.

pub mod archival;
pub mod core_memory;
pub mod feedback;
pub mod messaging;

use std::sync::Arc;

use mnemon_core::error::ToolError;
use mnemon_core::tool::ToolRegistry;
use mnemon_memory::HierarchicalMemory;
use mnemon_store::VersionStore;

pub use archival::{ArchivalMemoryInsertTool, ArchivalMemorySearchTool};
pub use core_memory::{CoreMemoryAppendTool, CoreMemoryReplaceTool};
pub use feedback::RecordFeedbackTool;
pub use messaging::{RequestHeartbeatTool, SendMessageTool};

/// Create the default tool registry for one agent, wired to its stores.
pub fn default_registry(
    agent_id: &str,
    versions: Arc<VersionStore>,
    memory: Arc<HierarchicalMemory>,
) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(CoreMemoryAppendTool::new(agent_id, versions.clone())))?;
    registry.register(Box::new(CoreMemoryReplaceTool::new(agent_id, versions)))?;
    registry.register(Box::new(ArchivalMemoryInsertTool::new(memory.clone())))?;
    registry.register(Box::new(ArchivalMemorySearchTool::new(memory.clone())))?;
    registry.register(Box::new(RecordFeedbackTool::new(memory)))?;
    registry.register(Box::new(SendMessageTool))?;
    registry.register(Box::new(RequestHeartbeatTool))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemon_core::agent::AgentConfig;
    use mnemon_memory::hierarchy::{ConsolidationPolicy, HierarchyConfig};
    use mnemon_memory::InMemoryStore;

    #[tokio::test]
    async fn default_registry_has_all_builtins() {
        let pool = mnemon_store::open_pool("sqlite::memory:").await.unwrap();
        let versions = Arc::new(VersionStore::new(pool).await.unwrap());
        versions
            .create_agent("agent-1", "Test", AgentConfig::initial("m", "p"))
            .await
            .unwrap();
        let memory = Arc::new(HierarchicalMemory::new(
            "agent-1",
            Arc::new(InMemoryStore::new()),
            HierarchyConfig::default(),
            ConsolidationPolicy::default(),
        ));

        let registry = default_registry("agent-1", versions, memory).unwrap();
        let mut names = registry.names();
        names.sort();
        assert_eq!(
            names,
            vec![
                "archival_memory_insert",
                "archival_memory_search",
                "core_memory_append",
                "core_memory_replace",
                "record_feedback",
                "request_heartbeat",
                "send_message",
            ]
        );
        assert!(registry.is_terminal("send_message"));
        assert!(!registry.is_terminal("request_heartbeat"));
    }
}
