//! Memory learner — Hebbian association graph and feedback-driven
//! importance updates.
//!
//! Memories retrieved together in the same turn become associated; the
//! association strengthens on co-access and decays with time. User or agent
//! feedback adjusts item importance directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Feedback signals the agent or an external endpoint can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Helpful,
    NotHelpful,
    Incorrect,
    Outdated,
    Redundant,
}

impl std::str::FromStr for FeedbackKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "helpful" => Ok(Self::Helpful),
            "not_helpful" => Ok(Self::NotHelpful),
            "incorrect" => Ok(Self::Incorrect),
            "outdated" => Ok(Self::Outdated),
            "redundant" => Ok(Self::Redundant),
            other => Err(format!("unknown feedback kind: {other}")),
        }
    }
}

/// The effect of one feedback signal.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackEffect {
    /// Signed importance delta to apply (importance stays clamped to [0, 10])
    pub importance_delta: f32,
    /// Metadata keys to set on the item
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Whether the item should be considered for consolidation
    pub consolidation_candidate: bool,
}

impl FeedbackKind {
    /// The importance delta and side effects for this signal.
    pub fn effect(&self) -> FeedbackEffect {
        let mut metadata = serde_json::Map::new();
        let (delta, candidate) = match self {
            Self::Helpful => (0.5, false),
            Self::NotHelpful => (-0.2, false),
            Self::Incorrect => {
                metadata.insert("flagged".into(), serde_json::json!(true));
                (-1.0, false)
            }
            Self::Outdated => {
                metadata.insert("outdated".into(), serde_json::json!(true));
                (-0.2, false)
            }
            Self::Redundant => (-0.2, true),
        };
        FeedbackEffect { importance_delta: delta, metadata, consolidation_candidate: candidate }
    }
}

/// An undirected association between two memory items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Association {
    pub a_id: String,
    pub b_id: String,
    pub strength: f64,
    pub co_access_count: u32,
    pub last_reinforced_at: DateTime<Utc>,
}

/// Normalized (sorted) pair key so `(a, b)` and `(b, a)` are one edge.
fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Learner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerConfig {
    /// Reinforcement rate η: `s' = min(1, s + η(1 - s))`
    pub reinforcement_rate: f64,
    /// Decay time constant λ in days: `s' = s · exp(-Δt/λ)` when touched
    pub decay_lambda_days: f64,
    /// Edges below this strength are pruned when touched
    pub prune_threshold: f64,
    /// Minimum strength for `get_associated` results
    pub min_association_strength: f64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            reinforcement_rate: 0.1,
            decay_lambda_days: 30.0,
            prune_threshold: 0.05,
            min_association_strength: 0.15,
        }
    }
}

/// The association graph. Single writer per agent: callers hold this behind
/// a mutex (the hierarchy does).
pub struct MemoryLearner {
    config: LearnerConfig,
    associations: HashMap<(String, String), Association>,
}

impl MemoryLearner {
    pub fn new(config: LearnerConfig) -> Self {
        Self { config, associations: HashMap::new() }
    }

    pub fn association_count(&self) -> usize {
        self.associations.len()
    }

    /// Apply touch-time decay to an edge, in place.
    fn decay(&self, assoc: &mut Association, now: DateTime<Utc>) {
        let dt_days =
            (now - assoc.last_reinforced_at).num_seconds().max(0) as f64 / 86_400.0;
        assoc.strength *= (-dt_days / self.config.decay_lambda_days).exp();
    }

    /// Reinforce the edge between two items: decay first, then
    /// `s' = min(1, s + η(1 - s))`.
    pub fn reinforce(&mut self, a: &str, b: &str, now: DateTime<Utc>) {
        if a == b {
            return;
        }
        let key = pair_key(a, b);
        let eta = self.config.reinforcement_rate;

        let assoc = self.associations.entry(key.clone()).or_insert_with(|| Association {
            a_id: key.0.clone(),
            b_id: key.1.clone(),
            strength: 0.0,
            co_access_count: 0,
            last_reinforced_at: now,
        });

        let dt_days = (now - assoc.last_reinforced_at).num_seconds().max(0) as f64 / 86_400.0;
        assoc.strength *= (-dt_days / self.config.decay_lambda_days).exp();

        assoc.strength = (assoc.strength + eta * (1.0 - assoc.strength)).min(1.0);
        assoc.co_access_count += 1;
        assoc.last_reinforced_at = now;
    }

    /// Record that a set of items was referenced together in one turn:
    /// every pair is reinforced.
    pub fn on_co_access(&mut self, ids: &[String], now: DateTime<Utc>) {
        for (i, a) in ids.iter().enumerate() {
            for b in ids.iter().skip(i + 1) {
                self.reinforce(a, b, now);
            }
        }
    }

    /// Top-k neighbours of an item by strength, after decay, above the
    /// configured minimum.
    pub fn get_associated(&mut self, item_id: &str, k: usize, now: DateTime<Utc>) -> Vec<(String, f64)> {
        let config_min = self.config.min_association_strength;
        let prune = self.config.prune_threshold;
        let lambda = self.config.decay_lambda_days;

        // Decay touched edges and drop the ones that faded out.
        let mut results: Vec<(String, f64)> = Vec::new();
        self.associations.retain(|_, assoc| {
            if assoc.a_id != item_id && assoc.b_id != item_id {
                return true;
            }
            let dt_days =
                (now - assoc.last_reinforced_at).num_seconds().max(0) as f64 / 86_400.0;
            assoc.strength *= (-dt_days / lambda).exp();
            assoc.last_reinforced_at = now;
            if assoc.strength < prune {
                return false;
            }
            if assoc.strength >= config_min {
                let other = if assoc.a_id == item_id { &assoc.b_id } else { &assoc.a_id };
                results.push((other.clone(), assoc.strength));
            }
            true
        });

        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(k);
        results
    }

    /// All current edges (for inspection).
    pub fn associations(&self) -> impl Iterator<Item = &Association> {
        self.associations.values()
    }

    /// Look up the current strength of an edge without touching it.
    pub fn strength(&self, a: &str, b: &str) -> Option<f64> {
        self.associations.get(&pair_key(a, b)).map(|assoc| assoc.strength)
    }
}

impl Default for MemoryLearner {
    fn default() -> Self {
        Self::new(LearnerConfig::default())
    }
}
