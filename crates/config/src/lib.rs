//! Configuration loading and validation for Mnemon.
//!
//! Loads configuration from an optional TOML file with environment variable
//! overrides (the deployment dotfile exports `MNEMON_*` variables).
//! Validates all settings at startup; a missing provider API key is fatal
//! unless the local-provider flag is set.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Provider API key. Required unless `local_provider` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Run against a local provider that needs no API key.
    #[serde(default)]
    pub local_provider: bool,

    /// Default model for new agents.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// All persisted state (databases, logs) lives under this directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub memory: MemoryConfig,
}

fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("local_provider", &self.local_provider)
            .field("default_model", &self.default_model)
            .field("data_dir", &self.data_dir)
            .field("gateway", &self.gateway)
            .field("limits", &self.limits)
            .field("context", &self.context)
            .field("memory", &self.memory)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8283
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

/// Reasoning-loop bounds. The tightest budget wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: u32,

    #[serde(default = "default_max_turn_seconds")]
    pub max_turn_seconds: u64,

    #[serde(default = "default_max_turn_cost")]
    pub max_turn_cost_usd: f64,

    #[serde(default = "default_llm_timeout")]
    pub llm_timeout_seconds: u64,

    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_seconds: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_steps() -> u32 {
    20
}
fn default_max_tool_calls() -> u32 {
    30
}
fn default_max_turn_seconds() -> u64 {
    120
}
fn default_max_turn_cost() -> f64 {
    1.0
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_tool_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_tool_calls: default_max_tool_calls(),
            max_turn_seconds: default_max_turn_seconds(),
            max_turn_cost_usd: default_max_turn_cost(),
            llm_timeout_seconds: default_llm_timeout(),
            tool_timeout_seconds: default_tool_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Summarization trigger as a fraction of the window.
    #[serde(default = "default_summarization_threshold")]
    pub summarization_threshold: f32,

    /// Memories recalled per turn.
    #[serde(default = "default_recall_k")]
    pub recall_k: usize,

    /// Summarize automatically when the assembler asks for it.
    #[serde(default = "default_true")]
    pub auto_summarize: bool,

    /// Token budget for generated summaries.
    #[serde(default = "default_summary_tokens")]
    pub max_summary_tokens: u32,
}

fn default_summarization_threshold() -> f32 {
    0.80
}
fn default_recall_k() -> usize {
    5
}
fn default_true() -> bool {
    true
}
fn default_summary_tokens() -> u32 {
    1_500
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            summarization_threshold: default_summarization_threshold(),
            recall_k: default_recall_k(),
            auto_summarize: true,
            max_summary_tokens: default_summary_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Working-tier capacity.
    #[serde(default = "default_working_capacity")]
    pub working_capacity: usize,

    /// Episodic consolidation cadence, in turns.
    #[serde(default = "default_episodic_every")]
    pub consolidate_episodic_every: u64,

    /// Semantic promotion cadence, in turns.
    #[serde(default = "default_semantic_every")]
    pub consolidate_semantic_every: u64,
}

fn default_working_capacity() -> usize {
    100
}
fn default_episodic_every() -> u64 {
    10
}
fn default_semantic_every() -> u64 {
    100
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            working_capacity: default_working_capacity(),
            consolidate_episodic_every: default_episodic_every(),
            consolidate_semantic_every: default_semantic_every(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            local_provider: false,
            default_model: default_model(),
            data_dir: default_data_dir(),
            gateway: GatewayConfig::default(),
            limits: LimitsConfig::default(),
            context: ContextConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .map_err(|e| format!("cannot read config file {}: {e}", p.display()))?;
                toml::from_str(&raw).map_err(|e| format!("invalid config file: {e}"))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Environment overrides from the deployment dotfile.
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("MNEMON_API_KEY") {
            if !key.is_empty() {
                self.api_key = Some(key);
            }
        }
        if let Ok(v) = std::env::var("MNEMON_LOCAL_PROVIDER") {
            self.local_provider = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("MNEMON_MODEL") {
            if !v.is_empty() {
                self.default_model = v;
            }
        }
        if let Ok(v) = std::env::var("MNEMON_DATA_DIR") {
            if !v.is_empty() {
                self.data_dir = PathBuf::from(v);
            }
        }
        if let Ok(v) = std::env::var("MNEMON_PORT") {
            if let Ok(port) = v.parse() {
                self.gateway.port = port;
            }
        }
    }

    /// Validate the configuration. Called once at startup.
    pub fn validate(&self) -> Result<(), String> {
        if self.api_key.is_none() && !self.local_provider {
            return Err(
                "no provider API key configured; set MNEMON_API_KEY or enable local_provider"
                    .into(),
            );
        }
        if self.limits.max_steps == 0 {
            return Err("limits.max_steps must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.context.summarization_threshold) {
            return Err("context.summarization_threshold must be within [0, 1]".into());
        }
        if self.memory.working_capacity == 0 {
            return Err("memory.working_capacity must be at least 1".into());
        }
        Ok(())
    }

    /// SQLite path for the conversation/version store.
    pub fn store_db_path(&self) -> String {
        format!("sqlite://{}", self.data_dir.join("mnemon.db").display())
    }

    /// SQLite path for the memory store.
    pub fn memory_db_path(&self) -> String {
        format!("sqlite://{}", self.data_dir.join("memory.db").display())
    }
}
