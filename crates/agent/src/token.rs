//! Deterministic token estimation.
//!
//! Uses a character-based heuristic tuned per model family. Unknown models
//! fall back to the most conservative ratio, over-counting rather than
//! blowing the context window. All arithmetic is integer, so the same input
//! always yields the same count.

use mnemon_core::message::Message;
use mnemon_core::provider::ToolDefinition;

/// Model families with distinct tokenizer densities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelFamily {
    Claude,
    Gpt,
    Gemini,
    /// Conservative default for unknown models.
    Fallback,
}

impl ModelFamily {
    fn for_model(model: &str) -> Self {
        let m = model.to_lowercase();
        if m.contains("claude") {
            Self::Claude
        } else if m.contains("gpt") || m.contains("/o1") || m.contains("/o3") {
            Self::Gpt
        } else if m.contains("gemini") {
            Self::Gemini
        } else {
            Self::Fallback
        }
    }

    /// Characters per token, scaled by 10 to stay in integer math.
    fn chars_per_token_x10(&self) -> usize {
        match self {
            Self::Claude => 38,
            Self::Gpt => 40,
            Self::Gemini => 40,
            Self::Fallback => 35,
        }
    }

    /// Fixed per-message overhead for role and formatting markers.
    fn message_overhead(&self) -> usize {
        4
    }
}

/// Deterministic token counter for a specific model.
#[derive(Debug, Clone)]
pub struct TokenCounter {
    family: ModelFamily,
}

impl TokenCounter {
    pub fn for_model(model: &str) -> Self {
        Self { family: ModelFamily::for_model(model) }
    }

    /// Estimate the token count for a string. Rounds up.
    pub fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        let x10 = self.family.chars_per_token_x10();
        (text.len() * 10).div_ceil(x10)
    }

    /// Estimate tokens for a single message including per-message overhead
    /// and any serialized tool calls.
    pub fn count_message(&self, message: &Message) -> usize {
        let mut tokens = self.family.message_overhead() + self.count(&message.content);
        if !message.tool_calls.is_empty() {
            let serialized = serde_json::to_string(&message.tool_calls).unwrap_or_default();
            tokens += self.count(&serialized);
        }
        tokens
    }

    /// Estimate tokens for a slice of messages.
    pub fn count_messages(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.count_message(m)).sum()
    }

    /// Estimate tokens for a tool definition (serialized as JSON).
    pub fn count_tool(&self, tool: &ToolDefinition) -> usize {
        let json = serde_json::to_string(tool).unwrap_or_default();
        self.count(&json)
    }

    /// Estimate tokens for a slice of tool definitions.
    pub fn count_tools(&self, tools: &[ToolDefinition]) -> usize {
        tools.iter().map(|t| self.count_tool(t)).sum()
    }
}
