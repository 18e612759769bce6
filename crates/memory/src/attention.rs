//! Attentional bias — multi-factor relevance scoring for retrieval.
//!
//! Goes beyond plain cosine similarity: each candidate is scored on five
//! factors (semantic, temporal, importance, access, category) whose weights
//! depend on the attention mode. A query analyzer picks the mode from the
//! query text; the user base is bilingual, so the keyword sets cover English
//! and German.

use chrono::{DateTime, Utc};
use mnemon_core::memory::{MemoryCategory, MemoryItem};
use serde::{Deserialize, Serialize};

use crate::vector::cosine_similarity;

/// Attention modes for different query contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttentionMode {
    /// Balanced multi-factor scoring
    #[default]
    Standard,
    /// Prioritize meaning
    SemanticHeavy,
    /// Prioritize recency
    TemporalHeavy,
    /// Prioritize high-value items
    ImportanceHeavy,
    /// Prioritize emotional memories
    Emotional,
}

/// Per-factor weights. The presets sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AttentionWeights {
    pub semantic: f64,
    pub temporal: f64,
    pub importance: f64,
    pub access: f64,
    pub category: f64,
}

impl AttentionWeights {
    /// Preset weights for a mode.
    pub fn for_mode(mode: AttentionMode) -> Self {
        match mode {
            AttentionMode::Standard => Self {
                semantic: 0.40,
                temporal: 0.15,
                importance: 0.20,
                access: 0.15,
                category: 0.10,
            },
            AttentionMode::SemanticHeavy => Self {
                semantic: 0.65,
                temporal: 0.05,
                importance: 0.15,
                access: 0.10,
                category: 0.05,
            },
            AttentionMode::TemporalHeavy => Self {
                semantic: 0.25,
                temporal: 0.45,
                importance: 0.10,
                access: 0.15,
                category: 0.05,
            },
            AttentionMode::ImportanceHeavy => Self {
                semantic: 0.25,
                temporal: 0.10,
                importance: 0.45,
                access: 0.10,
                category: 0.10,
            },
            AttentionMode::Emotional => Self {
                semantic: 0.30,
                temporal: 0.10,
                importance: 0.15,
                access: 0.15,
                category: 0.30,
            },
        }
    }
}

/// Time constants per mode: how fast the temporal and access factors fall.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AttentionTimeConstants {
    /// Temporal half-scale in hours (τ)
    pub temporal_tau_hours: f64,
    /// Access recency half-scale in hours (σ)
    pub access_sigma_hours: f64,
}

impl AttentionTimeConstants {
    pub fn for_mode(mode: AttentionMode) -> Self {
        match mode {
            AttentionMode::TemporalHeavy => {
                Self { temporal_tau_hours: 48.0, access_sigma_hours: 48.0 }
            }
            _ => Self { temporal_tau_hours: 168.0, access_sigma_hours: 72.0 },
        }
    }
}

/// The scored breakdown for one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionScore {
    pub final_score: f64,
    pub semantic: f64,
    pub temporal: f64,
    pub importance: f64,
    pub access: f64,
    pub category: f64,
}

/// Multi-factor attentional bias scorer.
#[derive(Debug, Clone)]
pub struct AttentionalBias {
    mode: AttentionMode,
    weights: AttentionWeights,
    time: AttentionTimeConstants,
}

impl AttentionalBias {
    pub fn new(mode: AttentionMode) -> Self {
        Self {
            mode,
            weights: AttentionWeights::for_mode(mode),
            time: AttentionTimeConstants::for_mode(mode),
        }
    }

    pub fn mode(&self) -> AttentionMode {
        self.mode
    }

    /// Score one candidate against the query.
    ///
    /// `query_embedding` may be absent (no embedding backend configured);
    /// the semantic factor is then zero and the other factors carry the
    /// ranking.
    pub fn score(
        &self,
        item: &MemoryItem,
        query_embedding: Option<&[f32]>,
        now: DateTime<Utc>,
    ) -> AttentionScore {
        let semantic = match (query_embedding, item.embedding.as_deref()) {
            (Some(q), Some(e)) => cosine_similarity(q, e).clamp(0.0, 1.0) as f64,
            _ => 0.0,
        };

        let temporal = (-item.age_hours(now) / self.time.temporal_tau_hours).exp();
        let importance = (item.importance as f64 / 10.0).clamp(0.0, 1.0);
        let access = (-item.hours_since_access(now) / self.time.access_sigma_hours).exp();
        let category = self.category_affinity(item.category);

        let w = &self.weights;
        let final_score = w.semantic * semantic
            + w.temporal * temporal
            + w.importance * importance
            + w.access * access
            + w.category * category;

        AttentionScore { final_score, semantic, temporal, importance, access, category }
    }

    /// Category affinity in [0, 1] for the current mode.
    fn category_affinity(&self, category: MemoryCategory) -> f64 {
        match self.mode {
            AttentionMode::Emotional => match category {
                MemoryCategory::Emotion => 1.0,
                MemoryCategory::RelationshipMoment => 0.9,
                MemoryCategory::Insight => 0.6,
                MemoryCategory::Preference => 0.4,
                _ => 0.2,
            },
            AttentionMode::ImportanceHeavy => match category {
                MemoryCategory::Insight | MemoryCategory::RelationshipMoment => 0.8,
                MemoryCategory::Preference => 0.6,
                _ => 0.5,
            },
            _ => match category {
                MemoryCategory::Preference | MemoryCategory::Insight => 0.6,
                MemoryCategory::Event => 0.4,
                _ => 0.5,
            },
        }
    }
}

impl Default for AttentionalBias {
    fn default() -> Self {
        Self::new(AttentionMode::Standard)
    }
}

/// Picks an attention mode from the query text.
///
/// Precedence: temporal markers, then emotional markers, then superlative /
/// critical markers; anything else is standard.
pub struct QueryAnalyzer;

impl QueryAnalyzer {
    const TEMPORAL: &'static [&'static str] = &[
        "when", "last time", "yesterday", "recently", "how long ago", "wann", "letztes mal",
        "gestern", "neulich", "damals",
    ];

    const EMOTIONAL: &'static [&'static str] = &[
        "feel", "felt", "feeling", "happy", "sad", "angry", "love", "miss", "scared", "anxious",
        "excited", "worried", "fühle", "gefühl", "traurig", "glücklich", "liebe", "angst",
        "vermisse",
    ];

    const IMPORTANCE: &'static [&'static str] = &[
        "most important", "critical", "crucial", "essential", "never forget", "best", "favourite",
        "favorite", "wichtigste", "entscheidend", "am besten", "lieblings",
    ];

    /// Pick the attention mode for a query.
    pub fn analyze(query: &str) -> AttentionMode {
        let q = query.to_lowercase();

        if Self::TEMPORAL.iter().any(|kw| q.contains(kw)) {
            AttentionMode::TemporalHeavy
        } else if Self::EMOTIONAL.iter().any(|kw| q.contains(kw)) {
            AttentionMode::Emotional
        } else if Self::IMPORTANCE.iter().any(|kw| q.contains(kw)) {
            AttentionMode::ImportanceHeavy
        } else {
            AttentionMode::Standard
        }
    }
}
