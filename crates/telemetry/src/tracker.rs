//! Thread-safe cost tracker — accumulates usage records and serves
//! aggregated statistics.

use chrono::{DateTime, Datelike, Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

use crate::model::{CostStatistics, ModelUsage, UsageRecord, WindowTotals};
use crate::pricing::PricingTable;

/// The local cost tracker.
///
/// Thread-safe via `RwLock`. One `UsageRecord` is appended per model call;
/// aggregates are computed on demand over the record log.
pub struct CostTracker {
    pricing: PricingTable,
    records: RwLock<Vec<UsageRecord>>,
}

impl CostTracker {
    pub fn new() -> Self {
        Self { pricing: PricingTable::with_defaults(), records: RwLock::new(Vec::new()) }
    }

    pub fn with_pricing(pricing: PricingTable) -> Self {
        Self { pricing, records: RwLock::new(Vec::new()) }
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Compute cost for a model call using the pricing table. Reasoning
    /// tokens bill at the output rate.
    pub fn compute_cost(
        &self,
        model: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
        reasoning_tokens: Option<u32>,
    ) -> f64 {
        self.pricing.compute_cost(
            model,
            prompt_tokens,
            completion_tokens + reasoning_tokens.unwrap_or(0),
        )
    }

    /// Append one usage record.
    pub fn record(&self, record: UsageRecord) {
        debug!(
            model = %record.model,
            session = %record.session_id,
            tokens = record.total_tokens(),
            cost = record.cost,
            "Usage recorded"
        );
        self.records.write().unwrap_or_else(|e| e.into_inner()).push(record);
    }

    /// Number of records held.
    pub fn record_count(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Total accumulated cost for one session.
    pub fn session_cost(&self, session_id: &str) -> f64 {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.session_id == session_id)
            .map(|r| r.cost)
            .sum()
    }

    /// Aggregate statistics: day/week/month/total windows plus a by-model
    /// breakdown sorted by descending cost.
    pub fn statistics(&self, now: DateTime<Utc>) -> CostStatistics {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());

        let day_start = now.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc();
        let week_start = day_start - Duration::days(now.weekday().num_days_from_monday() as i64);
        let month_start = now
            .date_naive()
            .with_day(1)
            .unwrap_or(now.date_naive())
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();

        let mut today = WindowTotals::default();
        let mut this_week = WindowTotals::default();
        let mut this_month = WindowTotals::default();
        let mut total = WindowTotals::default();
        let mut by_model: HashMap<String, ModelUsage> = HashMap::new();

        for record in records.iter() {
            total.add(record);
            if record.timestamp >= day_start {
                today.add(record);
            }
            if record.timestamp >= week_start {
                this_week.add(record);
            }
            if record.timestamp >= month_start {
                this_month.add(record);
            }

            let entry = by_model.entry(record.model.clone()).or_insert_with(|| ModelUsage {
                model: record.model.clone(),
                cost_usd: 0.0,
                prompt_tokens: 0,
                completion_tokens: 0,
                calls: 0,
            });
            entry.cost_usd += record.cost;
            entry.prompt_tokens += record.prompt_tokens as u64;
            entry.completion_tokens += record.completion_tokens as u64;
            entry.calls += 1;
        }

        let mut by_model: Vec<ModelUsage> = by_model.into_values().collect();
        by_model.sort_by(|a, b| {
            b.cost_usd.partial_cmp(&a.cost_usd).unwrap_or(std::cmp::Ordering::Equal)
        });

        CostStatistics { today, this_week, this_month, total, by_model }
    }
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_at(ts: DateTime<Utc>, model: &str, session: &str, cost: f64) -> UsageRecord {
        UsageRecord {
            timestamp: ts,
            session_id: session.into(),
            model: model.into(),
            prompt_tokens: 1000,
            completion_tokens: 200,
            reasoning_tokens: None,
            cost,
            tool_calls_made: 1,
        }
    }

    #[test]
    fn compute_cost_uses_pricing_table() {
        let tracker = CostTracker::new();
        let cost = tracker.compute_cost("anthropic/claude-sonnet-4", 1000, 500, None);
        assert!((cost - 0.0105).abs() < 1e-10);
    }

    #[test]
    fn reasoning_tokens_bill_as_output() {
        let tracker = CostTracker::new();
        let without = tracker.compute_cost("anthropic/claude-sonnet-4", 1000, 500, None);
        let with = tracker.compute_cost("anthropic/claude-sonnet-4", 1000, 500, Some(100));
        assert!(with > without);
    }

    #[test]
    fn statistics_accumulate_windows() {
        let tracker = CostTracker::new();
        let now = Utc::now();

        tracker.record(record_at(now, "openai/gpt-4o", "s1", 0.01));
        tracker.record(record_at(now - Duration::days(40), "openai/gpt-4o", "s1", 0.05));

        let stats = tracker.statistics(now);
        assert_eq!(stats.total.requests, 2);
        assert!((stats.total.cost_usd - 0.06).abs() < 1e-10);
        assert_eq!(stats.today.requests, 1);
        assert!((stats.today.cost_usd - 0.01).abs() < 1e-10);
        // The 40-day-old record is outside this month's window.
        assert_eq!(stats.this_month.requests, 1);
    }

    #[test]
    fn statistics_by_model_sorted_by_cost() {
        let tracker = CostTracker::new();
        let now = Utc::now();

        tracker.record(record_at(now, "cheap/model", "s1", 0.001));
        tracker.record(record_at(now, "dear/model", "s1", 0.5));
        tracker.record(record_at(now, "cheap/model", "s2", 0.001));

        let stats = tracker.statistics(now);
        assert_eq!(stats.by_model.len(), 2);
        assert_eq!(stats.by_model[0].model, "dear/model");
        assert_eq!(stats.by_model[1].calls, 2);
    }

    #[test]
    fn session_cost_filters_by_session() {
        let tracker = CostTracker::new();
        let now = Utc::now();
        tracker.record(record_at(now, "m", "s1", 0.02));
        tracker.record(record_at(now, "m", "s2", 0.07));
        tracker.record(record_at(now, "m", "s1", 0.03));

        assert!((tracker.session_cost("s1") - 0.05).abs() < 1e-10);
        assert!((tracker.session_cost("s2") - 0.07).abs() < 1e-10);
        assert_eq!(tracker.session_cost("s3"), 0.0);
    }
}
