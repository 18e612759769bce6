//! Context assembly — deterministic construction of the LLM input under an
//! explicit token budget.
//!
//! Layers, in final order: system prompt, memory blocks, tool schemas (sent
//! as the request's tool list but counted here), recalled-memory context,
//! then the conversation slice oldest → newest with the current user message
//! last. History is filled newest → oldest until the budget is spent, so the
//! newest messages always survive.
//!
//! # Determinism
//!
//! Assembly is a pure function of its inputs and the token counter: no
//! randomness, no clock reads.

use serde::{Deserialize, Serialize};

use mnemon_core::agent::{AgentConfig, MemoryBlock};
use mnemon_core::error::Error;
use mnemon_core::message::Message;
use mnemon_core::provider::ToolDefinition;
use mnemon_memory::hierarchy::ScoredMemory;

use crate::token::TokenCounter;

/// Assembler tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblerConfig {
    /// `needs_summarization` trips at this fraction of the window.
    pub summarization_threshold: f32,
    /// Fail fast when fixed cost alone exceeds this fraction of the window.
    pub fixed_overflow_ratio: f32,
    /// How many memories to recall per turn.
    pub recall_k: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self { summarization_threshold: 0.80, fixed_overflow_ratio: 0.90, recall_k: 5 }
    }
}

/// All inputs required for one assembly.
pub struct AssemblyInput<'a> {
    /// Config snapshot for this turn (model, window, system prompt).
    pub config: &'a AgentConfig,
    /// The agent's identity blocks.
    pub blocks: &'a [MemoryBlock],
    /// Tool definitions that will ride on the request.
    pub tool_definitions: &'a [ToolDefinition],
    /// Recalled memories, highest score first.
    pub recalled: &'a [ScoredMemory],
    /// The session log so far, oldest → newest, current user message last.
    pub history: &'a [Message],
}

/// Token usage breakdown for one assembled context.
///
/// `memory_blocks` covers the identity blocks plus the recalled-memory
/// context; the four components sum exactly to `total`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextUsage {
    pub system: usize,
    pub memory_blocks: usize,
    pub tool_schemas: usize,
    pub conversation: usize,
    pub total: usize,
    pub max: usize,
    pub percent_used: f32,
    pub needs_summarization: bool,
    pub remaining: usize,
}

/// The assembled context, ready for a provider call.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    /// `[system, history slice…, current user message]`
    pub messages: Vec<Message>,
    pub tool_definitions: Vec<ToolDefinition>,
    pub usage: ContextUsage,
    /// History messages that did not fit the budget.
    pub dropped_messages: usize,
}

/// The context assembler. Stateless — create one and reuse it.
#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    config: AssemblerConfig,
}

impl ContextAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Assemble the LLM input.
    ///
    /// Fails with `ContextOverflowFixed` when system prompt + blocks + tool
    /// schemas alone exceed the configured fraction of the window; no model
    /// call may be made in that case.
    pub fn assemble(&self, input: &AssemblyInput<'_>) -> Result<AssembledContext, Error> {
        let counter = TokenCounter::for_model(&input.config.model);
        let max = input.config.context_window;

        // ── Fixed cost: system prompt + blocks + tool schemas ──────────
        let system_tokens = counter.count(&input.config.system_prompt);
        let blocks_section = render_blocks(input.blocks);
        let blocks_tokens = counter.count(&blocks_section);
        let tool_tokens = counter.count_tools(input.tool_definitions);

        let fixed = system_tokens + blocks_tokens + tool_tokens;
        let fixed_limit = (max as f32 * self.config.fixed_overflow_ratio) as usize;
        if fixed > fixed_limit {
            return Err(Error::ContextOverflowFixed { fixed_tokens: fixed, window: max });
        }

        // ── Recalled-memory context ────────────────────────────────────
        let memory_section = render_recalled(input.recalled);
        let memory_tokens = counter.count(&memory_section);

        // ── Conversation slice, newest → oldest until the budget is hit ─
        let conversation_budget = max.saturating_sub(fixed + memory_tokens);
        let mut slice: Vec<Message> = Vec::new();
        let mut conversation_tokens = 0usize;
        let mut dropped = 0usize;

        for msg in input.history.iter().rev() {
            let msg_tokens = counter.count_message(msg);
            if conversation_tokens + msg_tokens <= conversation_budget {
                slice.push(msg.clone());
                conversation_tokens += msg_tokens;
            } else {
                dropped += 1;
            }
        }
        slice.reverse();

        // ── Compose the system message ─────────────────────────────────
        let mut system_text = input.config.system_prompt.clone();
        if !blocks_section.is_empty() {
            system_text.push_str("\n\n");
            system_text.push_str(&blocks_section);
        }
        if !memory_section.is_empty() {
            system_text.push_str("\n\n");
            system_text.push_str(&memory_section);
        }

        let session = input
            .history
            .last()
            .map(|m| m.session_id.clone())
            .unwrap_or_default();
        let mut messages = Vec::with_capacity(slice.len() + 1);
        messages.push(Message::system(&session, system_text));
        messages.extend(slice);

        // ── Usage breakdown ────────────────────────────────────────────
        let memory_blocks_component = blocks_tokens + memory_tokens;
        let total = system_tokens + memory_blocks_component + tool_tokens + conversation_tokens;
        let percent_used = if max == 0 { 100.0 } else { (total as f32 / max as f32) * 100.0 };

        let usage = ContextUsage {
            system: system_tokens,
            memory_blocks: memory_blocks_component,
            tool_schemas: tool_tokens,
            conversation: conversation_tokens,
            total,
            max,
            percent_used,
            needs_summarization: percent_used >= self.config.summarization_threshold * 100.0,
            remaining: max.saturating_sub(total),
        };

        Ok(AssembledContext {
            messages,
            tool_definitions: input.tool_definitions.to_vec(),
            usage,
            dropped_messages: dropped,
        })
    }
}

fn render_blocks(blocks: &[MemoryBlock]) -> String {
    let filled: Vec<&MemoryBlock> = blocks.iter().filter(|b| !b.value.is_empty()).collect();
    if filled.is_empty() {
        return String::new();
    }
    let mut out = String::from("[Core Memory]");
    for block in filled {
        out.push_str(&format!("\n<{label}>\n{value}\n</{label}>", label = block.label, value = block.value));
    }
    out
}

fn render_recalled(recalled: &[ScoredMemory]) -> String {
    if recalled.is_empty() {
        return String::new();
    }
    let mut out = String::from("[Recalled Memories]");
    for (i, mem) in recalled.iter().enumerate() {
        out.push_str(&format!(
            "\n{}. [{} | score={:.2}] {}",
            i + 1,
            mem.item.tier.as_str(),
            mem.score,
            mem.item.content
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemon_core::memory::{MemoryCategory, MemoryItem, MemoryTier};
    use mnemon_core::message::{Role, SessionId};
    use mnemon_memory::attention::AttentionMode;

    fn config(window: usize) -> AgentConfig {
        let mut cfg = AgentConfig::initial("openai/gpt-4o", "You are Mnemon, a careful assistant.");
        cfg.context_window = window;
        cfg
    }

    fn history(session: &SessionId, turns: usize) -> Vec<Message> {
        let mut msgs = Vec::new();
        for i in 0..turns {
            msgs.push(Message::user(session, format!("question number {i}")));
            msgs.push(Message::assistant(session, format!("answer number {i}")));
        }
        msgs.push(Message::user(session, "current question"));
        msgs
    }

    fn recalled(content: &str, score: f64) -> ScoredMemory {
        ScoredMemory {
            item: MemoryItem::new("agent-1", content, 6.0, MemoryCategory::Fact)
                .with_tier(MemoryTier::Episodic),
            score,
            mode: AttentionMode::Standard,
        }
    }

    fn tool(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: format!("The {name} tool"),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    #[test]
    fn components_sum_to_total() {
        let asm = ContextAssembler::default();
        let cfg = config(8192);
        let session = SessionId::from("s1");
        let hist = history(&session, 3);
        let blocks = vec![MemoryBlock::new("human", "name: Alice", 4000)];
        let tools = vec![tool("send_message")];
        let memories = vec![recalled("likes tea", 0.8)];

        let out = asm
            .assemble(&AssemblyInput {
                config: &cfg,
                blocks: &blocks,
                tool_definitions: &tools,
                recalled: &memories,
                history: &hist,
            })
            .unwrap();

        let u = &out.usage;
        assert_eq!(u.total, u.system + u.memory_blocks + u.tool_schemas + u.conversation);
        assert!(u.total <= u.max);
        assert_eq!(u.remaining, u.max - u.total);
        assert!(u.percent_used > 0.0);
    }

    #[test]
    fn final_ordering_system_then_history_then_user() {
        let asm = ContextAssembler::default();
        let cfg = config(8192);
        let session = SessionId::from("s1");
        let hist = history(&session, 2);

        let out = asm
            .assemble(&AssemblyInput {
                config: &cfg,
                blocks: &[],
                tool_definitions: &[],
                recalled: &[],
                history: &hist,
            })
            .unwrap();

        assert_eq!(out.messages[0].role, Role::System);
        assert_eq!(out.messages.last().unwrap().content, "current question");
        // Interior slice preserves chronological order.
        let contents: Vec<&str> =
            out.messages[1..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "question number 0",
                "answer number 0",
                "question number 1",
                "answer number 1",
                "current question"
            ]
        );
    }

    #[test]
    fn blocks_and_memories_injected_into_system_message() {
        let asm = ContextAssembler::default();
        let cfg = config(8192);
        let session = SessionId::from("s1");
        let hist = history(&session, 0);
        let blocks = vec![MemoryBlock::new("human", "favourite language: Python", 4000)];
        let memories = vec![recalled("prefers short answers", 0.9)];

        let out = asm
            .assemble(&AssemblyInput {
                config: &cfg,
                blocks: &blocks,
                tool_definitions: &[],
                recalled: &memories,
                history: &hist,
            })
            .unwrap();

        let system = &out.messages[0].content;
        assert!(system.contains("[Core Memory]"));
        assert!(system.contains("favourite language: Python"));
        assert!(system.contains("[Recalled Memories]"));
        assert!(system.contains("prefers short answers"));
        assert!(system.contains("episodic"));
    }

    #[test]
    fn empty_blocks_produce_no_sections() {
        let asm = ContextAssembler::default();
        let cfg = config(8192);
        let session = SessionId::from("s1");
        let hist = history(&session, 0);
        let blocks = vec![MemoryBlock::new("human", "", 4000)];

        let out = asm
            .assemble(&AssemblyInput {
                config: &cfg,
                blocks: &blocks,
                tool_definitions: &[],
                recalled: &[],
                history: &hist,
            })
            .unwrap();

        assert!(!out.messages[0].content.contains("[Core Memory]"));
        assert!(!out.messages[0].content.contains("[Recalled Memories]"));
    }

    #[test]
    fn fixed_overflow_fails_fast() {
        let asm = ContextAssembler::default();
        let mut cfg = config(100);
        cfg.system_prompt = "long prompt ".repeat(200);
        let session = SessionId::from("s1");
        let hist = history(&session, 0);

        let err = asm
            .assemble(&AssemblyInput {
                config: &cfg,
                blocks: &[],
                tool_definitions: &[],
                recalled: &[],
                history: &hist,
            })
            .unwrap_err();

        assert!(matches!(err, Error::ContextOverflowFixed { .. }));
    }

    #[test]
    fn newest_messages_survive_tight_budget() {
        let asm = ContextAssembler::default();
        let cfg = config(160);
        let session = SessionId::from("s1");
        let hist = history(&session, 20);

        let out = asm
            .assemble(&AssemblyInput {
                config: &cfg,
                blocks: &[],
                tool_definitions: &[],
                recalled: &[],
                history: &hist,
            })
            .unwrap();

        assert!(out.dropped_messages > 0);
        // The current user message is the newest and must be present.
        assert_eq!(out.messages.last().unwrap().content, "current question");
        assert!(out.usage.total <= out.usage.max);
    }

    #[test]
    fn summarization_trigger_at_threshold() {
        let asm = ContextAssembler::default();
        // A window sized so the history fills right past 80%.
        let cfg = config(120);
        let session = SessionId::from("s1");
        let hist = history(&session, 8);

        let out = asm
            .assemble(&AssemblyInput {
                config: &cfg,
                blocks: &[],
                tool_definitions: &[],
                recalled: &[],
                history: &hist,
            })
            .unwrap();

        assert!(out.usage.percent_used >= 80.0);
        assert!(out.usage.needs_summarization);

        // A roomy window does not trigger.
        let cfg = config(32_768);
        let out = asm
            .assemble(&AssemblyInput {
                config: &cfg,
                blocks: &[],
                tool_definitions: &[],
                recalled: &[],
                history: &hist,
            })
            .unwrap();
        assert!(!out.usage.needs_summarization);
    }

    #[test]
    fn assembly_is_deterministic() {
        let asm = ContextAssembler::default();
        let cfg = config(4096);
        let session = SessionId::from("s1");
        let hist = history(&session, 5);
        let blocks = vec![MemoryBlock::new("persona", "patient and curious", 4000)];
        let memories = vec![recalled("fact one", 0.9), recalled("fact two", 0.7)];
        let tools = vec![tool("send_message"), tool("archival_memory_search")];

        let input = AssemblyInput {
            config: &cfg,
            blocks: &blocks,
            tool_definitions: &tools,
            recalled: &memories,
            history: &hist,
        };

        let a = asm.assemble(&input).unwrap();
        let b = asm.assemble(&input).unwrap();

        assert_eq!(a.messages[0].content, b.messages[0].content);
        assert_eq!(a.usage.total, b.usage.total);
        assert_eq!(a.usage.conversation, b.usage.conversation);
        assert_eq!(a.dropped_messages, b.dropped_messages);
    }

    #[test]
    fn tool_schemas_counted_but_not_rendered() {
        let asm = ContextAssembler::default();
        let cfg = config(8192);
        let session = SessionId::from("s1");
        let hist = history(&session, 0);
        let tools = vec![tool("archival_memory_search")];

        let out = asm
            .assemble(&AssemblyInput {
                config: &cfg,
                blocks: &[],
                tool_definitions: &tools,
                recalled: &[],
                history: &hist,
            })
            .unwrap();

        assert!(out.usage.tool_schemas > 0);
        assert!(!out.messages[0].content.contains("archival_memory_search"));
        assert_eq!(out.tool_definitions.len(), 1);
    }
}
