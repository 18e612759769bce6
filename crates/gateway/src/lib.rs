//! HTTP API gateway for Mnemon.
//!
//! Exposes REST endpoints for agents, configuration versions, memory blocks,
//! chat (plain and SSE-streamed), conversation management, context usage,
//! and cost statistics.
//!
//! Built on Axum. One process-scoped `AppState` owns the stores and engines,
//! constructed at startup and injected into the handlers.

pub mod api;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::info;

use mnemon_agent::{AssemblerConfig, ContextAssembler, Summarizer, TurnBounds, TurnRunner};
use mnemon_config::AppConfig;
use mnemon_core::error::ToolError;
use mnemon_core::event::EventBus;
use mnemon_core::memory::MemoryStore;
use mnemon_core::provider::Provider;
use mnemon_core::tool::ToolRegistry;
use mnemon_memory::hierarchy::{ConsolidationPolicy, HierarchicalMemory, HierarchyConfig};
use mnemon_store::{ConversationStore, VersionStore};
use mnemon_telemetry::{CostTracker, RemoteBalance};

/// Process-scoped shared state for the gateway.
pub struct AppState {
    pub config: AppConfig,
    pub provider: Arc<dyn Provider>,
    pub versions: Arc<VersionStore>,
    pub conversations: Arc<ConversationStore>,
    pub tracker: Arc<CostTracker>,
    pub event_bus: Arc<EventBus>,
    pub memory_store: Arc<dyn MemoryStore>,
    /// Optional provider-native balance, refreshed by an external poller.
    pub remote_balance: RwLock<Option<RemoteBalance>>,

    /// Per-agent memory engines, built lazily.
    memories: RwLock<HashMap<String, Arc<HierarchicalMemory>>>,
    /// Per-agent tool registries, built lazily.
    registries: RwLock<HashMap<String, Arc<ToolRegistry>>>,
    /// Per-session turn locks: turns on one session run FIFO.
    session_locks: tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        config: AppConfig,
        provider: Arc<dyn Provider>,
        versions: Arc<VersionStore>,
        conversations: Arc<ConversationStore>,
        memory_store: Arc<dyn MemoryStore>,
        tracker: Arc<CostTracker>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            provider,
            versions,
            conversations,
            tracker,
            event_bus,
            memory_store,
            remote_balance: RwLock::new(None),
            memories: RwLock::new(HashMap::new()),
            registries: RwLock::new(HashMap::new()),
            session_locks: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// The hierarchical memory engine for one agent.
    pub async fn memory_for(&self, agent_id: &str) -> Arc<HierarchicalMemory> {
        if let Some(memory) = self.memories.read().await.get(agent_id) {
            return memory.clone();
        }
        let mut memories = self.memories.write().await;
        memories
            .entry(agent_id.to_string())
            .or_insert_with(|| {
                Arc::new(HierarchicalMemory::new(
                    agent_id,
                    self.memory_store.clone(),
                    HierarchyConfig {
                        working_capacity: self.config.memory.working_capacity,
                        ..Default::default()
                    },
                    ConsolidationPolicy {
                        episodic_every: self.config.memory.consolidate_episodic_every,
                        semantic_every: self.config.memory.consolidate_semantic_every,
                    },
                ))
            })
            .clone()
    }

    /// The tool registry for one agent.
    pub async fn registry_for(&self, agent_id: &str) -> Result<Arc<ToolRegistry>, ToolError> {
        if let Some(registry) = self.registries.read().await.get(agent_id) {
            return Ok(registry.clone());
        }
        let memory = self.memory_for(agent_id).await;
        let registry =
            Arc::new(mnemon_tools::default_registry(agent_id, self.versions.clone(), memory)?);
        self.registries.write().await.insert(agent_id.to_string(), registry.clone());
        Ok(registry)
    }

    /// The FIFO lock for one session.
    pub async fn session_lock(&self, session: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        locks
            .entry(session.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    pub fn bounds(&self) -> TurnBounds {
        let limits = &self.config.limits;
        TurnBounds {
            max_steps: limits.max_steps,
            max_tool_calls: limits.max_tool_calls,
            max_turn_duration: Duration::from_secs(limits.max_turn_seconds),
            max_turn_cost: limits.max_turn_cost_usd,
            llm_timeout: Duration::from_secs(limits.llm_timeout_seconds),
            max_retries: limits.max_retries,
            retry_base_delay: Duration::from_millis(200),
        }
    }

    pub fn assembler(&self) -> ContextAssembler {
        ContextAssembler::new(AssemblerConfig {
            summarization_threshold: self.config.context.summarization_threshold,
            recall_k: self.config.context.recall_k,
            ..Default::default()
        })
    }

    /// Build a turn runner for one agent.
    pub async fn runner_for(&self, agent_id: &str) -> Result<TurnRunner, ToolError> {
        let registry = self.registry_for(agent_id).await?;
        let memory = self.memory_for(agent_id).await;
        let mut runner = TurnRunner::new(
            self.provider.clone(),
            registry,
            memory,
            self.conversations.clone(),
            self.versions.clone(),
            self.tracker.clone(),
            self.event_bus.clone(),
            self.assembler(),
            self.bounds(),
        );
        if self.config.context.auto_summarize {
            runner = runner.with_summarizer(Arc::new(
                Summarizer::new(self.provider.clone())
                    .with_max_summary_tokens(self.config.context.max_summary_tokens),
            ));
        }
        Ok(runner)
    }

    pub fn summarizer(&self) -> Summarizer {
        Summarizer::new(self.provider.clone())
            .with_max_summary_tokens(self.config.context.max_summary_tokens)
    }
}

/// Build the full router.
pub fn build_router(state: SharedState) -> axum::Router {
    api::api_router(state).layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server. Runs until the process is stopped.
pub async fn serve(state: SharedState) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", state.config.gateway.host, state.config.gateway.port);
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
