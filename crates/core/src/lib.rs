//! # Mnemon Core
//!
//! Domain types, traits, and error definitions for the Mnemon conversational
//! agent server. This crate has **zero storage or HTTP dependencies** — it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod agent;
pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{Agent, AgentConfig, ConfigPatch, MemoryBlock};
pub use error::{Error, ErrorKind, Result};
pub use event::{DomainEvent, EventBus};
pub use memory::{MemoryCategory, MemoryFilter, MemoryItem, MemoryStore, MemoryTier};
pub use message::{Message, MessageKind, MessageToolCall, Role, SessionId};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolDefinition, Usage};
pub use tool::{SideEffectClass, Tool, ToolCall, ToolRegistry, ToolResult};
