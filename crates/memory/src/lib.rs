//! Hierarchical memory engine for Mnemon.
//!
//! Three tiers with distinct contracts:
//! - **Working**: fixed-capacity LRU, process-local, no durability.
//! - **Episodic**: persisted, retention-gated; periodic sweeps archive and
//!   decay items.
//! - **Semantic**: persisted, effectively permanent.
//!
//! The engine layers a retention gate (what to keep), an attentional bias
//! (what to retrieve), and a Hebbian learner (what belongs together) over a
//! durable key-value + vector store.

pub mod attention;
pub mod hierarchy;
pub mod in_memory;
pub mod learner;
pub mod retention;
pub mod sqlite;
pub mod vector;

pub use attention::{AttentionMode, AttentionWeights, AttentionalBias, QueryAnalyzer};
pub use hierarchy::{
    ConsolidationPolicy, ConsolidationReport, HierarchicalMemory, HierarchyConfig, ScoredMemory,
    WorkingMemory,
};
pub use in_memory::InMemoryStore;
pub use learner::{FeedbackKind, LearnerConfig, MemoryLearner};
pub use retention::{RetentionAction, RetentionConfig, RetentionGate};
pub use sqlite::SqliteMemoryStore;
