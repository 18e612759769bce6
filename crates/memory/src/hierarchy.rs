//! Three-tier hierarchical memory orchestration.
//!
//! - **Working**: fixed-capacity ordered buffer with LRU eviction, scoped to
//!   the process. Candidates for retrieval are limited to the current
//!   session.
//! - **Episodic**: persisted, retention-gated. Sweeps archive weak items and
//!   decay fading ones.
//! - **Semantic**: persisted, effectively permanent; never auto-demoted.
//!
//! Consolidation is driven by the reasoning loop's turn counter, not a
//! wall-clock schedule; nothing wakes the engine.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use mnemon_core::error::MemoryError;
use mnemon_core::memory::{
    clamp_importance, MemoryCategory, MemoryFilter, MemoryItem, MemoryStore, MemoryTier,
};

use crate::attention::{AttentionMode, AttentionalBias, QueryAnalyzer};
use crate::learner::{FeedbackKind, MemoryLearner};
use crate::retention::{RetentionAction, RetentionGate};
use crate::vector::cosine_similarity;

// ── Working memory ────────────────────────────────────────────────────────

/// Fast, volatile working memory with LRU eviction.
pub struct WorkingMemory {
    capacity: usize,
    /// Ordered oldest → newest; access moves an entry to the back.
    entries: Vec<(String, MemoryItem)>,
}

/// Working-memory occupancy, surfaced on the context usage endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingStats {
    pub count: usize,
    pub capacity: usize,
    pub utilization: f32,
}

impl WorkingMemory {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: Vec::new() }
    }

    /// Store an item tagged with its session. Existing entries with the same
    /// id are refreshed and moved to the most-recent slot.
    pub fn store(&mut self, session: &str, item: MemoryItem) {
        if let Some(pos) = self.entries.iter().position(|(_, i)| i.id == item.id) {
            self.entries.remove(pos);
        }
        while self.entries.len() >= self.capacity {
            self.entries.remove(0);
        }
        self.entries.push((session.to_string(), item));
    }

    /// All items stored under the given session, newest first.
    pub fn items_for_session(&self, session: &str) -> Vec<MemoryItem> {
        self.entries
            .iter()
            .rev()
            .filter(|(s, _)| s == session)
            .map(|(_, i)| i.clone())
            .collect()
    }

    /// Record an access: bump counters and move to the most-recent slot.
    pub fn touch(&mut self, id: &str) {
        if let Some(pos) = self.entries.iter().position(|(_, i)| i.id == id) {
            let (session, mut item) = self.entries.remove(pos);
            item.touch(Utc::now());
            self.entries.push((session, item));
        }
    }

    /// Items accessed more than once — candidates for episodic promotion.
    pub fn reinforced(&self) -> Vec<MemoryItem> {
        self.entries.iter().filter(|(_, i)| i.access_count > 1).map(|(_, i)| i.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> WorkingStats {
        WorkingStats {
            count: self.entries.len(),
            capacity: self.capacity,
            utilization: if self.capacity == 0 {
                0.0
            } else {
                self.entries.len() as f32 / self.capacity as f32
            },
        }
    }
}

// ── Configuration ─────────────────────────────────────────────────────────

/// Tunables for tier routing, promotion, and duplicate merging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// Working-tier capacity (LRU)
    pub working_capacity: usize,
    /// Minimum importance for episodic persistence
    pub episodic_min_importance: f32,
    /// Minimum importance for direct/promoted semantic storage
    pub semantic_min_importance: f32,
    /// Access count needed for episodic → semantic promotion
    pub semantic_promotion_access: u32,
    /// Cosine similarity at which two items are merged as near-duplicates
    pub duplicate_similarity: f32,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            working_capacity: 100,
            episodic_min_importance: 5.0,
            semantic_min_importance: 8.0,
            semantic_promotion_access: 10,
            duplicate_similarity: 0.97,
        }
    }
}

/// How often each consolidation pass runs, in reasoning-loop turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidationPolicy {
    pub episodic_every: u64,
    pub semantic_every: u64,
}

impl Default for ConsolidationPolicy {
    fn default() -> Self {
        Self { episodic_every: 10, semantic_every: 100 }
    }
}

impl ConsolidationPolicy {
    /// Which passes are due at the given turn number (1-based).
    pub fn due_passes(&self, turn: u64) -> (bool, bool) {
        let episodic = self.episodic_every > 0 && turn % self.episodic_every == 0;
        let semantic = self.semantic_every > 0 && turn % self.semantic_every == 0;
        (episodic, semantic)
    }
}

/// What a consolidation run did.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsolidationReport {
    pub promoted_from_working: usize,
    pub archived: usize,
    pub decayed: usize,
    pub boosted: usize,
    pub promoted_to_semantic: usize,
    pub merged: usize,
}

/// A retrieval result with its attention score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub item: MemoryItem,
    pub score: f64,
    pub mode: AttentionMode,
}

// ── Hierarchical memory ───────────────────────────────────────────────────

/// Three-tier orchestration over a durable store, a retention gate, an
/// attentional bias, and the association learner.
pub struct HierarchicalMemory {
    agent_id: String,
    store: Arc<dyn MemoryStore>,
    working: Mutex<WorkingMemory>,
    gate: RetentionGate,
    learner: Mutex<MemoryLearner>,
    config: HierarchyConfig,
    policy: ConsolidationPolicy,
    turn_counter: AtomicU64,
    /// Consolidation for one agent never runs concurrently with itself.
    consolidation_lock: tokio::sync::Mutex<()>,
}

impl HierarchicalMemory {
    pub fn new(
        agent_id: impl Into<String>,
        store: Arc<dyn MemoryStore>,
        config: HierarchyConfig,
        policy: ConsolidationPolicy,
    ) -> Self {
        let working = WorkingMemory::new(config.working_capacity);
        Self {
            agent_id: agent_id.into(),
            store,
            working: Mutex::new(working),
            gate: RetentionGate::default(),
            learner: Mutex::new(MemoryLearner::default()),
            config,
            policy,
            turn_counter: AtomicU64::new(0),
            consolidation_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn working_stats(&self) -> WorkingStats {
        self.working.lock().unwrap_or_else(|e| e.into_inner()).stats()
    }

    /// Route an item by `(importance, category)` and persist it.
    ///
    /// Importance ≥ 8 with category insight/relationship_moment goes to
    /// semantic; importance ≥ 5 goes to episodic; everything is also written
    /// to working for immediate recall.
    pub async fn store(
        &self,
        session: &str,
        mut item: MemoryItem,
    ) -> Result<MemoryItem, MemoryError> {
        item.agent_id = self.agent_id.clone();
        item.importance = clamp_importance(item.importance);

        let tier = if item.importance >= self.config.semantic_min_importance
            && matches!(
                item.category,
                MemoryCategory::Insight | MemoryCategory::RelationshipMoment
            ) {
            MemoryTier::Semantic
        } else if item.importance >= self.config.episodic_min_importance {
            MemoryTier::Episodic
        } else {
            MemoryTier::Working
        };
        item.tier = tier;

        if tier != MemoryTier::Working {
            self.store.put(item.clone()).await?;
        }

        self.working.lock().unwrap_or_else(|e| e.into_inner()).store(session, item.clone());

        debug!(agent = %self.agent_id, tier = tier.as_str(), "Stored memory item");
        Ok(item)
    }

    /// Retrieve the top-k most relevant items for a query across
    /// working (current session) ∪ episodic ∪ semantic.
    ///
    /// Returned items have their access recorded, access-time reinforcement
    /// applied, and their co-access association reinforced.
    pub async fn search(
        &self,
        session: &str,
        query: &str,
        k: usize,
        mode: Option<AttentionMode>,
        query_embedding: Option<&[f32]>,
    ) -> Result<Vec<ScoredMemory>, MemoryError> {
        let mode = mode.unwrap_or_else(|| QueryAnalyzer::analyze(query));
        let bias = AttentionalBias::new(mode);
        let now = Utc::now();

        // Gather candidates, deduplicating by id (persisted copy wins).
        let mut candidates: HashMap<String, MemoryItem> = HashMap::new();
        for item in self.working.lock().unwrap_or_else(|e| e.into_inner()).items_for_session(session)
        {
            candidates.insert(item.id.clone(), item);
        }
        for tier in [MemoryTier::Episodic, MemoryTier::Semantic] {
            for item in self.store.list(&self.agent_id, &MemoryFilter::tier(tier)).await? {
                candidates.insert(item.id.clone(), item);
            }
        }

        let mut scored: Vec<ScoredMemory> = candidates
            .into_values()
            .map(|item| {
                let score = bias.score(&item, query_embedding, now).final_score;
                ScoredMemory { item, score, mode }
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        // Access bookkeeping on the winners.
        let mut accessed_ids = Vec::with_capacity(scored.len());
        for entry in &mut scored {
            accessed_ids.push(entry.item.id.clone());

            if entry.item.tier == MemoryTier::Working {
                self.working.lock().unwrap_or_else(|e| e.into_inner()).touch(&entry.item.id);
                entry.item.touch(now);
            } else {
                self.store.update_access(&entry.item.id, now).await?;
                if let Some(new_importance) = self.gate.on_accessed(&mut entry.item, now) {
                    self.store.set_importance(&entry.item.id, new_importance).await?;
                }
            }
        }

        self.learner.lock().unwrap_or_else(|e| e.into_inner()).on_co_access(&accessed_ids, now);

        Ok(scored)
    }

    /// Record feedback on an item: adjust importance and metadata per the
    /// feedback table.
    pub async fn record_feedback(
        &self,
        item_id: &str,
        kind: FeedbackKind,
    ) -> Result<f32, MemoryError> {
        let item = self
            .store
            .get(item_id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(item_id.to_string()))?;

        let effect = kind.effect();
        let new_importance = clamp_importance(item.importance + effect.importance_delta);
        self.store.set_importance(item_id, new_importance).await?;
        if !effect.metadata.is_empty() {
            self.store.merge_metadata(item_id, effect.metadata).await?;
        }
        Ok(new_importance)
    }

    /// Top-k association-graph neighbours of an item.
    pub fn get_associated(&self, item_id: &str, k: usize) -> Vec<(String, f64)> {
        self.learner.lock().unwrap_or_else(|e| e.into_inner()).get_associated(item_id, k, Utc::now())
    }

    /// Called by the reasoning loop after each persisted turn. Runs whatever
    /// consolidation passes are due at this turn count.
    pub async fn note_turn(&self) -> Result<Option<ConsolidationReport>, MemoryError> {
        let turn = self.turn_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let (episodic_due, semantic_due) = self.policy.due_passes(turn);
        if !episodic_due && !semantic_due {
            return Ok(None);
        }
        let report = self.consolidate_passes(episodic_due, semantic_due).await?;
        Ok(Some(report))
    }

    /// Run a full consolidation: working promotion, episodic retention
    /// sweep, semantic promotion, and near-duplicate merging.
    pub async fn consolidate(&self) -> Result<ConsolidationReport, MemoryError> {
        self.consolidate_passes(true, true).await
    }

    async fn consolidate_passes(
        &self,
        episodic: bool,
        semantic: bool,
    ) -> Result<ConsolidationReport, MemoryError> {
        let _guard = self.consolidation_lock.lock().await;
        let now = Utc::now();
        let mut report = ConsolidationReport::default();

        // (a) Promote reinforced working items into episodic.
        if episodic {
            let reinforced = self.working.lock().unwrap_or_else(|e| e.into_inner()).reinforced();
            for mut item in reinforced {
                if item.tier != MemoryTier::Working {
                    continue; // already persisted
                }
                if item.importance < self.config.episodic_min_importance {
                    continue;
                }
                item.tier = MemoryTier::Episodic;
                self.store.put(item).await?;
                report.promoted_from_working += 1;
            }
        }

        // (b) Retention sweep over episodic.
        if episodic {
            let items =
                self.store.list(&self.agent_id, &MemoryFilter::tier(MemoryTier::Episodic)).await?;
            for item in &items {
                match self.gate.evaluate(item, now).1 {
                    RetentionAction::Archive => {
                        self.store.delete(&item.id).await?;
                        report.archived += 1;
                    }
                    RetentionAction::Decay => {
                        self.store
                            .set_importance(&item.id, clamp_importance(item.importance - 1.0))
                            .await?;
                        report.decayed += 1;
                    }
                    RetentionAction::Boost => {
                        self.store
                            .set_importance(&item.id, clamp_importance(item.importance + 1.0))
                            .await?;
                        report.boosted += 1;
                    }
                    RetentionAction::Keep | RetentionAction::Consolidate => {}
                }
            }
        }

        // (c) Promote heavily-accessed important episodic items to semantic.
        if semantic {
            let items =
                self.store.list(&self.agent_id, &MemoryFilter::tier(MemoryTier::Episodic)).await?;
            for mut item in items {
                if item.importance >= self.config.semantic_min_importance
                    && item.access_count >= self.config.semantic_promotion_access
                {
                    item.tier = MemoryTier::Semantic;
                    self.store.put(item).await?;
                    report.promoted_to_semantic += 1;
                }
            }
        }

        // (d) Merge near-duplicates across the persisted tiers.
        if episodic || semantic {
            report.merged = self.merge_duplicates().await?;
        }

        info!(
            agent = %self.agent_id,
            archived = report.archived,
            decayed = report.decayed,
            promoted = report.promoted_to_semantic,
            merged = report.merged,
            "Consolidation pass complete"
        );
        Ok(report)
    }

    /// Merge pairs of persisted items whose embeddings are nearly identical.
    /// The survivor keeps the max importance and the summed access count.
    async fn merge_duplicates(&self) -> Result<usize, MemoryError> {
        let mut items = Vec::new();
        for tier in [MemoryTier::Episodic, MemoryTier::Semantic] {
            items.extend(self.store.list(&self.agent_id, &MemoryFilter::tier(tier)).await?);
        }
        let with_embeddings: Vec<&MemoryItem> =
            items.iter().filter(|i| i.embedding.is_some()).collect();

        let mut removed: HashSet<String> = HashSet::new();
        let mut merged = 0usize;

        for i in 0..with_embeddings.len() {
            for j in (i + 1)..with_embeddings.len() {
                let a = with_embeddings[i];
                let b = with_embeddings[j];
                if removed.contains(&a.id) || removed.contains(&b.id) {
                    continue;
                }
                let sim = cosine_similarity(
                    a.embedding.as_deref().unwrap_or_default(),
                    b.embedding.as_deref().unwrap_or_default(),
                );
                if sim < self.config.duplicate_similarity {
                    continue;
                }

                // Survivor: higher importance wins, ties favour the older item.
                let (survivor, casualty) = if (a.importance, b.created_at) >= (b.importance, a.created_at)
                {
                    (a, b)
                } else {
                    (b, a)
                };

                let mut kept = survivor.clone();
                kept.importance = clamp_importance(survivor.importance.max(casualty.importance));
                kept.access_count = survivor.access_count.saturating_add(casualty.access_count);
                self.store.put(kept).await?;
                self.store.delete(&casualty.id).await?;
                removed.insert(casualty.id.clone());
                merged += 1;
            }
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryStore;
    use chrono::Duration;

    fn engine() -> HierarchicalMemory {
        HierarchicalMemory::new(
            "agent-1",
            Arc::new(InMemoryStore::new()),
            HierarchyConfig::default(),
            ConsolidationPolicy::default(),
        )
    }

    fn engine_with_store(store: Arc<InMemoryStore>) -> HierarchicalMemory {
        HierarchicalMemory::new(
            "agent-1",
            store,
            HierarchyConfig::default(),
            ConsolidationPolicy::default(),
        )
    }

    fn item(content: &str, importance: f32, category: MemoryCategory) -> MemoryItem {
        MemoryItem::new("agent-1", content, importance, category)
    }

    // ── Routing ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn high_importance_insight_goes_semantic() {
        let mem = engine();
        let stored =
            mem.store("s1", item("the user trusts me with hard news", 9.0, MemoryCategory::Insight))
                .await
                .unwrap();
        assert_eq!(stored.tier, MemoryTier::Semantic);
    }

    #[tokio::test]
    async fn high_importance_fact_stays_episodic() {
        let mem = engine();
        let stored = mem
            .store("s1", item("the user was born in 1990", 9.0, MemoryCategory::Fact))
            .await
            .unwrap();
        assert_eq!(stored.tier, MemoryTier::Episodic);
    }

    #[tokio::test]
    async fn mid_importance_goes_episodic() {
        let mem = engine();
        let stored = mem
            .store("s1", item("the user likes espresso", 6.0, MemoryCategory::Preference))
            .await
            .unwrap();
        assert_eq!(stored.tier, MemoryTier::Episodic);
    }

    #[tokio::test]
    async fn low_importance_stays_working_only() {
        let mem = engine();
        let stored =
            mem.store("s1", item("small talk about weather", 2.0, MemoryCategory::Event)).await.unwrap();
        assert_eq!(stored.tier, MemoryTier::Working);

        // Not persisted.
        let persisted = mem.store.list("agent-1", &MemoryFilter::default()).await.unwrap();
        assert!(persisted.is_empty());
        assert_eq!(mem.working_stats().count, 1);
    }

    // ── Search ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn search_returns_top_k_with_tier_tags() {
        let mem = engine();
        for i in 0..5 {
            mem.store("s1", item(&format!("memory {i}"), 6.0, MemoryCategory::Fact)).await.unwrap();
        }
        let results = mem.search("s1", "memory", 3, None, None).await.unwrap();
        assert_eq!(results.len(), 3);
        for r in &results {
            assert_eq!(r.item.tier, MemoryTier::Episodic);
            assert!(r.score > 0.0);
        }
    }

    #[tokio::test]
    async fn search_records_access() {
        let mem = engine();
        let stored =
            mem.store("s1", item("the user's cat is called Miso", 7.0, MemoryCategory::Fact)).await.unwrap();

        mem.search("s1", "cat", 5, None, None).await.unwrap();
        let fetched = mem.store.get(&stored.id).await.unwrap().unwrap();
        assert!(fetched.access_count >= 2);
    }

    #[tokio::test]
    async fn search_excludes_other_sessions_working_items() {
        let mem = engine();
        mem.store("s1", item("session one only", 2.0, MemoryCategory::Event)).await.unwrap();

        // Working-only item from s1 must not appear in an s2 search.
        let results = mem.search("s2", "session", 5, None, None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn search_reinforces_associations() {
        let mem = engine();
        let a = mem.store("s1", item("likes hiking", 7.0, MemoryCategory::Preference)).await.unwrap();
        let b = mem.store("s1", item("lives near mountains", 7.0, MemoryCategory::Fact)).await.unwrap();

        mem.search("s1", "outdoors", 5, None, None).await.unwrap();

        let neighbours = mem.get_associated(&a.id, 5);
        // One co-access yields strength 0.1, below the 0.15 retrieval floor.
        assert!(neighbours.is_empty());

        mem.search("s1", "outdoors", 5, None, None).await.unwrap();
        let neighbours = mem.get_associated(&a.id, 5);
        assert_eq!(neighbours.len(), 1);
        assert_eq!(neighbours[0].0, b.id);
    }

    #[tokio::test]
    async fn explicit_mode_overrides_analyzer() {
        let mem = engine();
        mem.store("s1", item("anything", 6.0, MemoryCategory::Fact)).await.unwrap();
        let results =
            mem.search("s1", "neutral query", 5, Some(AttentionMode::Emotional), None).await.unwrap();
        assert_eq!(results[0].mode, AttentionMode::Emotional);
    }

    // ── Feedback ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn feedback_adjusts_importance_and_metadata() {
        let mem = engine();
        let stored = mem.store("s1", item("wrong fact", 5.0, MemoryCategory::Fact)).await.unwrap();

        let new_importance = mem.record_feedback(&stored.id, FeedbackKind::Incorrect).await.unwrap();
        assert!((new_importance - 4.0).abs() < 1e-6);

        let fetched = mem.store.get(&stored.id).await.unwrap().unwrap();
        assert_eq!(fetched.metadata["flagged"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn feedback_clamps_importance() {
        let mem = engine();
        let stored = mem.store("s1", item("good", 9.8, MemoryCategory::Fact)).await.unwrap();
        let new_importance = mem.record_feedback(&stored.id, FeedbackKind::Helpful).await.unwrap();
        assert!((new_importance - 10.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn feedback_on_missing_item_errors() {
        let mem = engine();
        let err = mem.record_feedback("ghost", FeedbackKind::Helpful).await.unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(_)));
    }

    // ── Consolidation ──────────────────────────────────────────────────

    #[tokio::test]
    async fn retention_sweep_archives_stale_items() {
        let store = Arc::new(InMemoryStore::new());
        let mem = engine_with_store(store.clone());

        // Seven healthy items, three stale ones.
        for i in 0..7 {
            let it = item(&format!("healthy {i}"), 5.0, MemoryCategory::Fact)
                .with_tier(MemoryTier::Episodic);
            store.put(it).await.unwrap();
        }
        for i in 0..3 {
            let mut it = item(&format!("stale {i}"), 1.0, MemoryCategory::Fact)
                .with_tier(MemoryTier::Episodic);
            it.created_at = Utc::now() - Duration::days(400);
            it.last_accessed_at = it.created_at;
            store.put(it).await.unwrap();
        }

        let report = mem.consolidate().await.unwrap();
        assert_eq!(report.archived, 3);

        let remaining =
            store.list("agent-1", &MemoryFilter::tier(MemoryTier::Episodic)).await.unwrap();
        assert_eq!(remaining.len(), 7);
        assert!(remaining.iter().all(|i| i.content.starts_with("healthy")));
    }

    #[tokio::test]
    async fn consolidation_promotes_reinforced_working_items() {
        let mem = engine();
        let stored = mem.store("s1", item("repeated topic", 6.0, MemoryCategory::Fact)).await.unwrap();
        // It went to episodic already (importance 6), so craft a working-only one:
        assert_eq!(stored.tier, MemoryTier::Episodic);

        let mut low = item("recurring small thing", 4.0, MemoryCategory::Event);
        low.access_count = 3;
        low.importance = 6.0; // reinforced enough to matter now
        low.tier = MemoryTier::Working;
        mem.working.lock().unwrap().store("s1", low.clone());

        let report = mem.consolidate().await.unwrap();
        assert_eq!(report.promoted_from_working, 1);
        let fetched = mem.store.get(&low.id).await.unwrap().unwrap();
        assert_eq!(fetched.tier, MemoryTier::Episodic);
    }

    #[tokio::test]
    async fn consolidation_promotes_to_semantic() {
        let store = Arc::new(InMemoryStore::new());
        let mem = engine_with_store(store.clone());

        let mut hot = item("defining memory", 9.0, MemoryCategory::Fact)
            .with_tier(MemoryTier::Episodic);
        hot.access_count = 25;
        store.put(hot.clone()).await.unwrap();

        let report = mem.consolidate().await.unwrap();
        assert_eq!(report.promoted_to_semantic, 1);
        let fetched = store.get(&hot.id).await.unwrap().unwrap();
        assert_eq!(fetched.tier, MemoryTier::Semantic);
    }

    #[tokio::test]
    async fn consolidation_merges_near_duplicates() {
        let store = Arc::new(InMemoryStore::new());
        let mem = engine_with_store(store.clone());

        let mut a = item("likes dark roast coffee", 6.0, MemoryCategory::Preference)
            .with_tier(MemoryTier::Episodic)
            .with_embedding(vec![1.0, 0.0, 0.01]);
        a.access_count = 4;
        let mut b = item("prefers dark roast", 8.0, MemoryCategory::Preference)
            .with_tier(MemoryTier::Episodic)
            .with_embedding(vec![1.0, 0.0, 0.0]);
        b.access_count = 3;
        store.put(a.clone()).await.unwrap();
        store.put(b.clone()).await.unwrap();

        let report = mem.consolidate().await.unwrap();
        assert_eq!(report.merged, 1);

        // Survivor is the higher-importance item with summed access counts.
        let survivor = store.get(&b.id).await.unwrap().unwrap();
        assert!((survivor.importance - 8.0).abs() < 1e-6);
        assert_eq!(survivor.access_count, 7);
        assert!(store.get(&a.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn distinct_embeddings_are_not_merged() {
        let store = Arc::new(InMemoryStore::new());
        let mem = engine_with_store(store.clone());

        store
            .put(
                item("topic one", 6.0, MemoryCategory::Fact)
                    .with_tier(MemoryTier::Episodic)
                    .with_embedding(vec![1.0, 0.0]),
            )
            .await
            .unwrap();
        store
            .put(
                item("topic two", 6.0, MemoryCategory::Fact)
                    .with_tier(MemoryTier::Episodic)
                    .with_embedding(vec![0.0, 1.0]),
            )
            .await
            .unwrap();

        let report = mem.consolidate().await.unwrap();
        assert_eq!(report.merged, 0);
    }

    // ── Policy ─────────────────────────────────────────────────────────

    #[test]
    fn policy_schedules_passes_by_turn() {
        let policy = ConsolidationPolicy::default();
        assert_eq!(policy.due_passes(1), (false, false));
        assert_eq!(policy.due_passes(10), (true, false));
        assert_eq!(policy.due_passes(30), (true, false));
        assert_eq!(policy.due_passes(100), (true, true));
    }

    #[tokio::test]
    async fn note_turn_runs_passes_on_schedule() {
        let mem = engine();
        for _ in 0..9 {
            assert!(mem.note_turn().await.unwrap().is_none());
        }
        // Turn 10 triggers the episodic pass.
        assert!(mem.note_turn().await.unwrap().is_some());
        assert!(mem.note_turn().await.unwrap().is_none());
    }

    // ── Working memory ─────────────────────────────────────────────────

    #[test]
    fn working_memory_lru_eviction() {
        let mut wm = WorkingMemory::new(3);
        for i in 0..5 {
            wm.store("s1", item(&format!("m{i}"), 3.0, MemoryCategory::Fact));
        }
        assert_eq!(wm.len(), 3);
        let contents: Vec<String> =
            wm.items_for_session("s1").iter().map(|i| i.content.clone()).collect();
        assert_eq!(contents, vec!["m4", "m3", "m2"]);
    }

    #[test]
    fn working_memory_touch_moves_to_back() {
        let mut wm = WorkingMemory::new(3);
        let a = item("a", 3.0, MemoryCategory::Fact);
        let a_id = a.id.clone();
        wm.store("s1", a);
        wm.store("s1", item("b", 3.0, MemoryCategory::Fact));
        wm.store("s1", item("c", 3.0, MemoryCategory::Fact));

        wm.touch(&a_id);
        wm.store("s1", item("d", 3.0, MemoryCategory::Fact));

        // "b" was oldest after the touch, so it got evicted.
        let contents: Vec<String> =
            wm.items_for_session("s1").iter().map(|i| i.content.clone()).collect();
        assert!(contents.contains(&"a".to_string()));
        assert!(!contents.contains(&"b".to_string()));
    }

    #[test]
    fn working_stats_reports_utilization() {
        let mut wm = WorkingMemory::new(4);
        wm.store("s1", item("one", 3.0, MemoryCategory::Fact));
        let stats = wm.stats();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.capacity, 4);
        assert!((stats.utilization - 0.25).abs() < 1e-6);
    }
}
