//! Data model for usage records and aggregated cost views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One record per model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u32>,
    /// Cost in USD, computed locally from the pricing table.
    pub cost: f64,
    /// Tool calls dispatched while producing this call's response.
    pub tool_calls_made: u32,
}

impl UsageRecord {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens + self.reasoning_tokens.unwrap_or(0)
    }
}

/// Totals over one time window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowTotals {
    pub cost_usd: f64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub reasoning_tokens: u64,
    pub requests: u64,
}

impl WindowTotals {
    pub fn add(&mut self, record: &UsageRecord) {
        self.cost_usd += record.cost;
        self.prompt_tokens += record.prompt_tokens as u64;
        self.completion_tokens += record.completion_tokens as u64;
        self.reasoning_tokens += record.reasoning_tokens.unwrap_or(0) as u64;
        self.requests += 1;
    }
}

/// Per-model accumulations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelUsage {
    pub model: String,
    pub cost_usd: f64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub calls: u64,
}

/// The full local statistics payload for `GET /costs/statistics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostStatistics {
    pub today: WindowTotals,
    pub this_week: WindowTotals,
    pub this_month: WindowTotals,
    pub total: WindowTotals,
    /// Sorted by descending cost.
    pub by_model: Vec<ModelUsage>,
}

/// Provider-native account totals. Kept distinct from local accumulations:
/// this value is authoritative for balance, the local tracker for
/// per-request cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteBalance {
    pub total_credits_usd: f64,
    pub total_usage_usd: f64,
    pub as_of: DateTime<Utc>,
}
