//! Memory item model and the `MemoryStore` trait.
//!
//! Memory items live in one of three tiers. The store is a durable
//! key-value + vector surface; tier orchestration (retention, attention,
//! consolidation) lives above it in the memory engine crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MemoryError;

/// Memory tier identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTier {
    /// Fast, volatile, process-local
    Working,
    /// Persisted, retention-gated
    Episodic,
    /// Persisted, effectively permanent
    Semantic,
}

impl MemoryTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Working => "working",
            Self::Episodic => "episodic",
            Self::Semantic => "semantic",
        }
    }
}

impl std::str::FromStr for MemoryTier {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "working" => Ok(Self::Working),
            "episodic" => Ok(Self::Episodic),
            "semantic" => Ok(Self::Semantic),
            other => Err(MemoryError::QueryFailed(format!("unknown tier: {other}"))),
        }
    }
}

/// Memory categories. Retention and attention treat these differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Fact,
    Preference,
    Event,
    Emotion,
    Insight,
    RelationshipMoment,
    Custom,
}

impl MemoryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Preference => "preference",
            Self::Event => "event",
            Self::Emotion => "emotion",
            Self::Insight => "insight",
            Self::RelationshipMoment => "relationship_moment",
            Self::Custom => "custom",
        }
    }

    pub fn all() -> [MemoryCategory; 7] {
        [
            Self::Fact,
            Self::Preference,
            Self::Event,
            Self::Emotion,
            Self::Insight,
            Self::RelationshipMoment,
            Self::Custom,
        ]
    }
}

impl std::str::FromStr for MemoryCategory {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fact" => Ok(Self::Fact),
            "preference" => Ok(Self::Preference),
            "event" => Ok(Self::Event),
            "emotion" => Ok(Self::Emotion),
            "insight" => Ok(Self::Insight),
            "relationship_moment" => Ok(Self::RelationshipMoment),
            _ => Ok(Self::Custom),
        }
    }
}

/// A single memory item.
///
/// Only `importance`, `access_count`, `last_accessed_at`, and `metadata`
/// mutate in place after creation; content is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Unique ID
    pub id: String,

    /// Owning agent
    pub agent_id: String,

    /// Which tier this item currently lives in
    pub tier: MemoryTier,

    /// The memory content
    pub content: String,

    /// Optional embedding vector
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,

    /// Importance in [0, 10]
    pub importance: f32,

    /// Category
    pub category: MemoryCategory,

    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,

    /// Number of times this item was retrieved (≥ 1)
    pub access_count: u32,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl MemoryItem {
    pub fn new(
        agent_id: impl Into<String>,
        content: impl Into<String>,
        importance: f32,
        category: MemoryCategory,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            tier: MemoryTier::Working,
            content: content.into(),
            embedding: None,
            importance: clamp_importance(importance),
            category,
            created_at: now,
            last_accessed_at: now,
            access_count: 1,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_tier(mut self, tier: MemoryTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Record an access: bump the counter and refresh the access time.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed_at = now;
    }

    /// Age in whole-ish days at `now`.
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_seconds().max(0) as f64 / 86_400.0
    }

    /// Age in hours at `now`.
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_seconds().max(0) as f64 / 3_600.0
    }

    /// Hours since the last access at `now`.
    pub fn hours_since_access(&self, now: DateTime<Utc>) -> f64 {
        (now - self.last_accessed_at).num_seconds().max(0) as f64 / 3_600.0
    }
}

/// Clamp an importance value into the valid [0, 10] range.
pub fn clamp_importance(value: f32) -> f32 {
    value.clamp(0.0, 10.0)
}

/// Filter for list and vector-search operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<MemoryTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<MemoryCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_importance: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_importance: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_after: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_before: Option<DateTime<Utc>>,
}

impl MemoryFilter {
    pub fn tier(tier: MemoryTier) -> Self {
        Self { tier: Some(tier), ..Default::default() }
    }

    /// Apply this filter to an item in memory. Backends that can push the
    /// filter into SQL do so; this is the reference semantics.
    pub fn matches(&self, item: &MemoryItem) -> bool {
        if let Some(tier) = self.tier {
            if item.tier != tier {
                return false;
            }
        }
        if let Some(category) = self.category {
            if item.category != category {
                return false;
            }
        }
        if let Some(min) = self.min_importance {
            if item.importance < min {
                return false;
            }
        }
        if let Some(max) = self.max_importance {
            if item.importance > max {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if item.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if item.created_at > before {
                return false;
            }
        }
        true
    }
}

/// The durable memory store.
///
/// Implementations: SQLite, in-memory (for testing). Reads observe prior
/// writes from the same agent.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Store (upsert) an item. Returns its ID.
    async fn put(&self, item: MemoryItem) -> Result<String, MemoryError>;

    /// Fetch an item by ID.
    async fn get(&self, id: &str) -> Result<Option<MemoryItem>, MemoryError>;

    /// Delete an item. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool, MemoryError>;

    /// Record an access: bump `access_count`, set `last_accessed_at`.
    async fn update_access(&self, id: &str, now: DateTime<Utc>) -> Result<(), MemoryError>;

    /// Overwrite the importance (clamped to [0, 10]).
    async fn set_importance(&self, id: &str, importance: f32) -> Result<(), MemoryError>;

    /// Merge keys into the item metadata.
    async fn merge_metadata(
        &self,
        id: &str,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), MemoryError>;

    /// Rank stored items for an agent by cosine similarity to `embedding`.
    async fn vector_search(
        &self,
        agent_id: &str,
        embedding: &[f32],
        k: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<MemoryItem>, MemoryError>;

    /// List items for an agent matching the filter, newest first.
    async fn list(&self, agent_id: &str, filter: &MemoryFilter)
        -> Result<Vec<MemoryItem>, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn importance_is_clamped() {
        let item = MemoryItem::new("a1", "content", 15.0, MemoryCategory::Fact);
        assert!((item.importance - 10.0).abs() < f32::EPSILON);
        let item = MemoryItem::new("a1", "content", -3.0, MemoryCategory::Fact);
        assert_eq!(item.importance, 0.0);
    }

    #[test]
    fn new_item_invariants() {
        let item = MemoryItem::new("a1", "content", 5.0, MemoryCategory::Preference);
        assert_eq!(item.access_count, 1);
        assert!(item.importance >= 0.0 && item.importance <= 10.0);
        assert_eq!(item.tier, MemoryTier::Working);
    }

    #[test]
    fn touch_bumps_access() {
        let mut item = MemoryItem::new("a1", "content", 5.0, MemoryCategory::Fact);
        let later = item.created_at + chrono::Duration::hours(2);
        item.touch(later);
        assert_eq!(item.access_count, 2);
        assert_eq!(item.last_accessed_at, later);
        assert!((item.hours_since_access(later + chrono::Duration::hours(3)) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn filter_matches_tier_and_importance() {
        let item = MemoryItem::new("a1", "content", 6.0, MemoryCategory::Fact)
            .with_tier(MemoryTier::Episodic);

        assert!(MemoryFilter::tier(MemoryTier::Episodic).matches(&item));
        assert!(!MemoryFilter::tier(MemoryTier::Semantic).matches(&item));

        let filter = MemoryFilter { min_importance: Some(7.0), ..Default::default() };
        assert!(!filter.matches(&item));

        let filter = MemoryFilter {
            min_importance: Some(5.0),
            max_importance: Some(7.0),
            ..Default::default()
        };
        assert!(filter.matches(&item));
    }

    #[test]
    fn filter_matches_time_range() {
        let item = MemoryItem::new("a1", "content", 5.0, MemoryCategory::Event);
        let before = item.created_at - chrono::Duration::days(1);
        let after = item.created_at + chrono::Duration::days(1);

        let filter = MemoryFilter { created_after: Some(before), ..Default::default() };
        assert!(filter.matches(&item));

        let filter = MemoryFilter { created_after: Some(after), ..Default::default() };
        assert!(!filter.matches(&item));
    }

    #[test]
    fn category_parse_falls_back_to_custom() {
        let cat: MemoryCategory = "relationship_moment".parse().unwrap();
        assert_eq!(cat, MemoryCategory::RelationshipMoment);
        let cat: MemoryCategory = "something_new".parse().unwrap();
        assert_eq!(cat, MemoryCategory::Custom);
    }

    #[test]
    fn tier_roundtrip() {
        for tier in [MemoryTier::Working, MemoryTier::Episodic, MemoryTier::Semantic] {
            let parsed: MemoryTier = tier.as_str().parse().unwrap();
            assert_eq!(parsed, tier);
        }
    }
}
