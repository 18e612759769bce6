//! Agent runtime for Mnemon: deterministic token counting, context assembly
//! under an explicit budget, the bounded tool-calling reasoning loop, and
//! history summarization.
//!
//! The hot path is `TurnRunner::run_turn` → `ContextAssembler::assemble` →
//! `HierarchicalMemory::search` → `ToolRegistry::dispatch`.

pub mod assembler;
pub mod loop_runner;
pub mod stream_event;
pub mod summarizer;
pub mod token;

pub use assembler::{AssembledContext, AssemblerConfig, AssemblyInput, ContextAssembler, ContextUsage};
pub use loop_runner::{TurnBounds, TurnOutcome, TurnRunner};
pub use stream_event::AgentStreamEvent;
pub use summarizer::Summarizer;
pub use token::TokenCounter;
