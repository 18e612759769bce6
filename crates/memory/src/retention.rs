//! Retention gate — maps a memory item to a keep/forget decision.
//!
//! Forgetting is treated as optimization, not data loss: every episodic item
//! gets a scalar retention score combining importance, access frequency, and
//! temporal decay, boosted by category. The score maps monotonically to an
//! action; ties break toward the stronger action.

use chrono::{DateTime, Utc};
use mnemon_core::memory::{MemoryCategory, MemoryItem};
use serde::{Deserialize, Serialize};

/// Possible actions for a memory based on its retention score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionAction {
    /// Very high retention — increase importance
    Boost,
    /// High retention — keep as is
    Keep,
    /// Medium retention — candidate for merging with similar items
    Consolidate,
    /// Low retention — reduce importance by 1
    Decay,
    /// Very low retention — eligible for removal from episodic
    Archive,
}

/// Configuration for the retention gate. Weights and thresholds are tunable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Weight of normalized importance
    pub importance_weight: f64,
    /// Weight of log-scaled access frequency
    pub access_weight: f64,
    /// Weight of temporal decay
    pub temporal_weight: f64,
    /// Floor so nothing is forgotten purely for being unscored
    pub base_retention: f64,

    /// Daily decay multiplier for the temporal factor
    pub decay_base: f64,

    /// Score thresholds, strongest first
    pub boost_threshold: f64,
    pub keep_threshold: f64,
    pub consolidate_threshold: f64,
    pub archive_threshold: f64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            importance_weight: 0.35,
            access_weight: 0.30,
            temporal_weight: 0.25,
            base_retention: 0.10,
            decay_base: 0.995,
            boost_threshold: 0.85,
            keep_threshold: 0.60,
            consolidate_threshold: 0.40,
            archive_threshold: 0.20,
        }
    }
}

impl RetentionConfig {
    /// Category boost multipliers. Relationship moments and emotional
    /// memories are protected; plain events fade fastest.
    pub fn category_boost(&self, category: MemoryCategory) -> f64 {
        match category {
            MemoryCategory::RelationshipMoment => 1.5,
            MemoryCategory::Emotion => 1.3,
            MemoryCategory::Insight => 1.2,
            MemoryCategory::Preference => 1.0,
            MemoryCategory::Fact => 0.9,
            MemoryCategory::Event => 0.8,
            MemoryCategory::Custom => 0.9,
        }
    }
}

/// The retention gate.
#[derive(Debug, Clone, Default)]
pub struct RetentionGate {
    config: RetentionConfig,
}

impl RetentionGate {
    pub fn new(config: RetentionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Compute the retention score `r ∈ [0, 1]` for an item at `now`.
    pub fn score(&self, item: &MemoryItem, now: DateTime<Utc>) -> f64 {
        let c = &self.config;

        let imp = (item.importance as f64 / 10.0).clamp(0.0, 1.0);
        let acc = (((item.access_count as f64) + 1.0).ln() / 5.0).min(1.0);
        let temp = c.decay_base.powf(item.age_days(now));
        let boost = c.category_boost(item.category);

        let raw = (c.importance_weight * imp
            + c.access_weight * acc
            + c.temporal_weight * temp
            + c.base_retention)
            * boost;

        raw.clamp(0.0, 1.0)
    }

    /// Map a retention score to an action. Boundary values take the stronger
    /// action.
    pub fn action_for(&self, score: f64) -> RetentionAction {
        let c = &self.config;
        if score >= c.boost_threshold {
            RetentionAction::Boost
        } else if score >= c.keep_threshold {
            RetentionAction::Keep
        } else if score >= c.consolidate_threshold {
            RetentionAction::Consolidate
        } else if score >= c.archive_threshold {
            RetentionAction::Decay
        } else {
            RetentionAction::Archive
        }
    }

    /// Score an item and return the resulting action in one step.
    pub fn evaluate(&self, item: &MemoryItem, now: DateTime<Utc>) -> (f64, RetentionAction) {
        let score = self.score(item, now);
        (score, self.action_for(score))
    }

    /// Access-time reinforcement: bump the access counters, and when the
    /// item already scores in the boost band, raise importance by one.
    /// Returns the new importance if it changed.
    pub fn on_accessed(&self, item: &mut MemoryItem, now: DateTime<Utc>) -> Option<f32> {
        item.touch(now);
        let (_, action) = self.evaluate(item, now);
        if action == RetentionAction::Boost && item.importance < 10.0 {
            item.importance = (item.importance + 1.0).min(10.0);
            return Some(item.importance);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use mnemon_core::memory::MemoryCategory;

    fn item(importance: f32, access_count: u32, age_days: i64, category: MemoryCategory) -> MemoryItem {
        let mut item = MemoryItem::new("agent-1", "test memory", importance, category);
        item.access_count = access_count;
        item.created_at = Utc::now() - Duration::days(age_days);
        item.last_accessed_at = item.created_at;
        item
    }

    #[test]
    fn worthless_fresh_item_decays_or_archives() {
        let gate = RetentionGate::default();
        let m = item(0.0, 1, 0, MemoryCategory::Fact);
        let (score, action) = gate.evaluate(&m, Utc::now());
        assert!(score < 0.4, "score was {score}");
        assert!(matches!(action, RetentionAction::Decay | RetentionAction::Archive));
    }

    #[test]
    fn cherished_moment_boosts() {
        let gate = RetentionGate::default();
        let m = item(10.0, 100, 0, MemoryCategory::RelationshipMoment);
        let (score, action) = gate.evaluate(&m, Utc::now());
        assert!(score >= 0.85, "score was {score}");
        assert_eq!(action, RetentionAction::Boost);
    }

    #[test]
    fn old_unaccessed_item_archives() {
        let gate = RetentionGate::default();
        let m = item(1.0, 1, 400, MemoryCategory::Fact);
        let (score, action) = gate.evaluate(&m, Utc::now());
        assert!(score < 0.2, "score was {score}");
        assert_eq!(action, RetentionAction::Archive);
    }

    #[test]
    fn action_mapping_is_monotone() {
        let gate = RetentionGate::default();
        let ordered = [
            (0.90, RetentionAction::Boost),
            (0.85, RetentionAction::Boost),
            (0.70, RetentionAction::Keep),
            (0.60, RetentionAction::Keep),
            (0.50, RetentionAction::Consolidate),
            (0.40, RetentionAction::Consolidate),
            (0.30, RetentionAction::Decay),
            (0.20, RetentionAction::Decay),
            (0.10, RetentionAction::Archive),
        ];
        for (score, expected) in ordered {
            assert_eq!(gate.action_for(score), expected, "at score {score}");
        }
    }

    #[test]
    fn category_boost_protects_relationships() {
        let gate = RetentionGate::default();
        let now = Utc::now();
        let plain = item(5.0, 5, 30, MemoryCategory::Event);
        let moment = item(5.0, 5, 30, MemoryCategory::RelationshipMoment);
        assert!(gate.score(&moment, now) > gate.score(&plain, now));
    }

    #[test]
    fn temporal_factor_decays_with_age() {
        let gate = RetentionGate::default();
        let now = Utc::now();
        let fresh = item(5.0, 5, 0, MemoryCategory::Fact);
        let stale = item(5.0, 5, 200, MemoryCategory::Fact);
        assert!(gate.score(&fresh, now) > gate.score(&stale, now));
    }

    #[test]
    fn score_is_clamped() {
        let gate = RetentionGate::default();
        let m = item(10.0, 10_000, 0, MemoryCategory::RelationshipMoment);
        let score = gate.score(&m, Utc::now());
        assert!(score <= 1.0);
    }

    #[test]
    fn access_reinforcement_boosts_importance() {
        let gate = RetentionGate::default();
        let now = Utc::now();
        let mut m = item(9.0, 80, 0, MemoryCategory::RelationshipMoment);

        let new_importance = gate.on_accessed(&mut m, now);
        assert_eq!(new_importance, Some(10.0));
        assert_eq!(m.access_count, 81);
    }

    #[test]
    fn access_reinforcement_leaves_weak_items() {
        let gate = RetentionGate::default();
        let now = Utc::now();
        let mut m = item(2.0, 1, 100, MemoryCategory::Fact);

        let new_importance = gate.on_accessed(&mut m, now);
        assert!(new_importance.is_none());
        assert_eq!(m.importance, 2.0);
        assert_eq!(m.access_count, 2);
    }
}
