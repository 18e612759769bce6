//! Agent identity, versioned configuration, and memory blocks.
//!
//! An agent owns a pointer to its current configuration version. Versions are
//! immutable; every change (including rollback) appends a new version whose
//! `parent_version` links back, forming an acyclic chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;

/// A named conversational identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique agent ID
    pub id: String,

    /// Display name
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Inactive agents reject chat turns
    pub active: bool,

    /// Pointer to the current configuration version
    pub current_version: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One immutable configuration version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique version ID
    pub version_id: String,

    /// The version this one was derived from (None for the first)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_version: Option<String>,

    /// When this version was created
    pub created_at: DateTime<Utc>,

    /// Why this version exists
    #[serde(default)]
    pub change_description: String,

    /// Model identifier (e.g. "anthropic/claude-sonnet-4")
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Nucleus sampling cutoff
    pub top_p: f32,

    /// Maximum tokens per model response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Context window size in tokens
    pub context_window: usize,

    /// Whether to request reasoning tokens (advisory when unsupported)
    #[serde(default)]
    pub reasoning_enabled: bool,

    /// Reasoning token cap (advisory when unsupported)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reasoning_tokens: Option<u32>,

    /// The system prompt
    pub system_prompt: String,
}

impl AgentConfig {
    /// A fresh first version with sensible defaults.
    pub fn initial(model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            version_id: Uuid::new_v4().to_string(),
            parent_version: None,
            created_at: Utc::now(),
            change_description: "initial version".into(),
            model: model.into(),
            temperature: 0.7,
            top_p: 1.0,
            max_tokens: None,
            context_window: 32_768,
            reasoning_enabled: false,
            max_reasoning_tokens: None,
            system_prompt: system_prompt.into(),
        }
    }

    /// Derive a new version by applying a patch. The result gets a fresh
    /// `version_id` and points back at this version.
    pub fn derive(&self, patch: &ConfigPatch, description: impl Into<String>) -> Self {
        Self {
            version_id: Uuid::new_v4().to_string(),
            parent_version: Some(self.version_id.clone()),
            created_at: Utc::now(),
            change_description: description.into(),
            model: patch.model.clone().unwrap_or_else(|| self.model.clone()),
            temperature: patch.temperature.unwrap_or(self.temperature),
            top_p: patch.top_p.unwrap_or(self.top_p),
            max_tokens: patch.max_tokens.or(self.max_tokens),
            context_window: patch.context_window.unwrap_or(self.context_window),
            reasoning_enabled: patch.reasoning_enabled.unwrap_or(self.reasoning_enabled),
            max_reasoning_tokens: patch.max_reasoning_tokens.or(self.max_reasoning_tokens),
            system_prompt: patch
                .system_prompt
                .clone()
                .unwrap_or_else(|| self.system_prompt.clone()),
        }
    }

    /// Derive a rollback version: the content of `target` under a fresh
    /// `version_id` whose parent is the target itself. History is untouched.
    pub fn rollback_from(target: &AgentConfig) -> Self {
        Self {
            version_id: Uuid::new_v4().to_string(),
            parent_version: Some(target.version_id.clone()),
            created_at: Utc::now(),
            change_description: format!("rollback to {}", target.version_id),
            ..target.clone()
        }
    }

    /// Compare configuration content, ignoring identity fields
    /// (`version_id`, `parent_version`, `created_at`, `change_description`).
    pub fn content_eq(&self, other: &AgentConfig) -> bool {
        self.model == other.model
            && self.temperature == other.temperature
            && self.top_p == other.top_p
            && self.max_tokens == other.max_tokens
            && self.context_window == other.context_window
            && self.reasoning_enabled == other.reasoning_enabled
            && self.max_reasoning_tokens == other.max_reasoning_tokens
            && self.system_prompt == other.system_prompt
    }
}

/// A partial configuration overlay. `None` fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reasoning_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        self.model.is_none()
            && self.temperature.is_none()
            && self.top_p.is_none()
            && self.max_tokens.is_none()
            && self.context_window.is_none()
            && self.reasoning_enabled.is_none()
            && self.max_reasoning_tokens.is_none()
            && self.system_prompt.is_none()
    }
}

/// A named mutable text slot in the agent's identity (`persona`, `human`, …).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryBlock {
    pub label: String,
    pub value: String,
    pub limit_chars: usize,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl MemoryBlock {
    pub fn new(label: impl Into<String>, value: impl Into<String>, limit_chars: usize) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            limit_chars,
            description: String::new(),
            read_only: false,
            metadata: serde_json::Map::new(),
        }
    }

    /// Replace the block value, enforcing the read-only flag and character
    /// limit. On rejection the block is unchanged.
    pub fn apply_value(&mut self, value: &str) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::ReadOnlyBlock { label: self.label.clone() });
        }
        let len = value.chars().count();
        if len > self.limit_chars {
            return Err(StorageError::BlockOverLimit {
                label: self.label.clone(),
                len,
                limit: self.limit_chars,
            });
        }
        self.value = value.to_string();
        Ok(())
    }

    /// Append text to the block value (newline-separated when non-empty).
    pub fn apply_append(&mut self, text: &str) -> Result<(), StorageError> {
        let combined = if self.value.is_empty() {
            text.to_string()
        } else {
            format!("{}\n{}", self.value, text)
        };
        self.apply_value(&combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_applies_patch_and_links_parent() {
        let v1 = AgentConfig::initial("anthropic/claude-sonnet-4", "You are helpful.");
        let patch = ConfigPatch { temperature: Some(0.2), ..Default::default() };
        let v2 = v1.derive(&patch, "lower temperature");

        assert_eq!(v2.parent_version.as_deref(), Some(v1.version_id.as_str()));
        assert!((v2.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(v2.model, v1.model);
        assert_ne!(v2.version_id, v1.version_id);
    }

    #[test]
    fn rollback_copies_content_with_new_identity() {
        let v1 = AgentConfig::initial("anthropic/claude-sonnet-4", "Prompt A");
        let patch = ConfigPatch { system_prompt: Some("Prompt B".into()), ..Default::default() };
        let v2 = v1.derive(&patch, "change prompt");

        let v3 = AgentConfig::rollback_from(&v1);
        assert!(v3.content_eq(&v1));
        assert!(!v3.content_eq(&v2));
        assert_eq!(v3.parent_version.as_deref(), Some(v1.version_id.as_str()));
        assert_ne!(v3.version_id, v1.version_id);
    }

    #[test]
    fn content_eq_ignores_identity_fields() {
        let v1 = AgentConfig::initial("m", "p");
        let v2 = AgentConfig { version_id: "other".into(), change_description: "x".into(), ..v1.clone() };
        assert!(v1.content_eq(&v2));
    }

    #[test]
    fn block_rejects_over_limit() {
        let mut block = MemoryBlock::new("human", "", 10);
        let err = block.apply_value("this is far too long for the block").unwrap_err();
        assert!(matches!(err, StorageError::BlockOverLimit { .. }));
        assert_eq!(block.value, "");
    }

    #[test]
    fn block_rejects_read_only() {
        let mut block = MemoryBlock::new("system_context", "fixed", 100);
        block.read_only = true;
        let err = block.apply_value("changed").unwrap_err();
        assert!(matches!(err, StorageError::ReadOnlyBlock { .. }));
        assert_eq!(block.value, "fixed");
    }

    #[test]
    fn block_append_joins_with_newline() {
        let mut block = MemoryBlock::new("human", "name: Alice", 100);
        block.apply_append("favourite language: Python").unwrap();
        assert_eq!(block.value, "name: Alice\nfavourite language: Python");
        assert!(block.value.ends_with("favourite language: Python"));
    }

    #[test]
    fn empty_patch_detected() {
        assert!(ConfigPatch::default().is_empty());
        let patch = ConfigPatch { model: Some("x".into()), ..Default::default() };
        assert!(!patch.is_empty());
    }
}
