//! Tool trait and registry — the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act: edit its memory blocks,
//! search archival memory, record feedback, or end the turn with a message.
//! The registry validates arguments against each tool's JSON Schema at
//! registration and again at dispatch, and bounds every handler with a
//! per-tool timeout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// How a tool touches the world. Used for tracing and policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SideEffectClass {
    /// No observable effect
    Pure,
    /// Reads agent or memory state
    Read,
    /// Mutates agent or memory state
    Write,
    /// Touches something outside the process
    External,
}

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON object
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content (fed back to the model)
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Wall-clock execution time
    #[serde(default)]
    pub duration_ms: u64,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: true,
            output: output.into(),
            data: None,
            duration_ms: 0,
        }
    }
}

/// The core Tool trait.
///
/// Each tool implements this trait and is registered in the `ToolRegistry`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "core_memory_append").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// How this tool touches the world.
    fn side_effect_class(&self) -> SideEffectClass {
        SideEffectClass::Read
    }

    /// Per-tool execution timeout.
    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    /// Terminal tools end the reasoning loop when invoked (`send_message`).
    fn is_terminal(&self) -> bool {
        false
    }

    /// Execute the tool with validated arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registered tool with its compiled schema validator.
struct RegisteredTool {
    tool: Box<dyn Tool>,
    validator: jsonschema::Validator,
}

/// A registry of available tools.
///
/// Registration is idempotent by name: registering a tool with an existing
/// name replaces it. The registry is read-mostly; it is built once at startup
/// and shared behind an `Arc`.
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Register a tool, compiling its parameter schema. Replaces any existing
    /// tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> std::result::Result<(), ToolError> {
        let name = tool.name().to_string();
        let schema = tool.parameters_schema();
        let validator = jsonschema::draft202012::new(&schema).map_err(|e| {
            ToolError::InvalidSchema { tool_name: name.clone(), reason: e.to_string() }
        })?;
        self.tools.insert(name, RegisteredTool { tool, validator });
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|r| r.tool.as_ref())
    }

    /// Whether the named tool ends the turn when invoked.
    pub fn is_terminal(&self, name: &str) -> bool {
        self.tools.get(name).map(|r| r.tool.is_terminal()).unwrap_or(false)
    }

    /// Get all tool definitions (for sending to the LLM), sorted by name so
    /// the serialized schema block is deterministic.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|r| r.tool.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Validate a call's arguments against the registered schema.
    pub fn validate(&self, call: &ToolCall) -> std::result::Result<(), ToolError> {
        let registered = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        registered.validator.validate(&call.arguments).map_err(|e| {
            ToolError::InvalidArguments { tool_name: call.name.clone(), reason: e.to_string() }
        })
    }

    /// Dispatch a tool call: validate arguments, run the handler under its
    /// timeout, and capture failure as a structured error. Every invocation
    /// is traced with `(name, duration_ms, status)`.
    pub async fn dispatch(&self, call: &ToolCall) -> std::result::Result<ToolResult, ToolError> {
        let registered = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        registered.validator.validate(&call.arguments).map_err(|e| {
            ToolError::InvalidArguments { tool_name: call.name.clone(), reason: e.to_string() }
        })?;

        let timeout = registered.tool.timeout();
        let start = std::time::Instant::now();

        let outcome =
            tokio::time::timeout(timeout, registered.tool.execute(call.arguments.clone())).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(mut result)) => {
                result.call_id = call.id.clone();
                result.duration_ms = duration_ms;
                debug!(tool = %call.name, duration_ms, status = "ok", "Tool dispatched");
                Ok(result)
            }
            Ok(Err(e)) => {
                warn!(tool = %call.name, duration_ms, status = "error", error = %e, "Tool failed");
                Err(e)
            }
            Err(_) => {
                warn!(tool = %call.name, duration_ms, status = "timeout", "Tool timed out");
                Err(ToolError::Timeout {
                    tool_name: call.name.clone(),
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        fn side_effect_class(&self) -> SideEffectClass {
            SideEffectClass::Pure
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
        ) -> std::result::Result<ToolResult, ToolError> {
            let text = arguments["text"].as_str().unwrap_or("").to_string();
            Ok(ToolResult::ok("pending", text))
        }
    }

    /// A tool that sleeps longer than its timeout.
    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Sleeps"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        fn timeout(&self) -> Duration {
            Duration::from_millis(20)
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
        ) -> std::result::Result<ToolResult, ToolError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ToolResult::ok("pending", "never"))
        }
    }

    fn registry_with_echo() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        registry
    }

    #[test]
    fn registry_register_and_lookup() {
        let registry = registry_with_echo();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn registration_is_idempotent_by_name() {
        let mut registry = registry_with_echo();
        registry.register(Box::new(EchoTool)).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_definitions_sorted() {
        let mut registry = registry_with_echo();
        registry.register(Box::new(SlowTool)).unwrap();
        let defs = registry.definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[1].name, "slow");
    }

    #[tokio::test]
    async fn dispatch_executes_tool() {
        let registry = registry_with_echo();
        let call = ToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: serde_json::json!({"text": "hello world"}),
        };
        let result = registry.dispatch(&call).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "hello world");
        assert_eq!(result.call_id, "call_1");
    }

    #[tokio::test]
    async fn dispatch_rejects_invalid_arguments() {
        let registry = registry_with_echo();
        let call = ToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: serde_json::json!({"text": 42}),
        };
        let err = registry.dispatch(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn dispatch_rejects_missing_required() {
        let registry = registry_with_echo();
        let call = ToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: serde_json::json!({}),
        };
        let err = registry.dispatch(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn dispatch_missing_tool() {
        let registry = ToolRegistry::new();
        let call = ToolCall {
            id: "call_1".into(),
            name: "nonexistent".into(),
            arguments: serde_json::json!({}),
        };
        let err = registry.dispatch(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn dispatch_times_out_slow_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SlowTool)).unwrap();
        let call = ToolCall {
            id: "call_1".into(),
            name: "slow".into(),
            arguments: serde_json::json!({}),
        };
        let err = registry.dispatch(&call).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }

    #[test]
    fn terminal_flag_defaults_false() {
        let registry = registry_with_echo();
        assert!(!registry.is_terminal("echo"));
        assert!(!registry.is_terminal("missing"));
    }
}
