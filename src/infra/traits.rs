use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One model call as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    /// `classifier` or `responder`
    pub role: String,
    pub provider: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum UsagePeriod {
    Hour,
    Day,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_requests: u64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub period: UsagePeriod,
}

impl UsageSummary {
    pub fn total_tokens(&self) -> u64 {
        self.total_input_tokens + self.total_output_tokens
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageBreakdown {
    pub role: String,
    pub model: String,
    pub requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Accumulates token usage across model calls. Shared by every user session.
#[async_trait]
pub trait UsageTracker: Send + Sync {
    async fn record(&self, event: UsageEvent) -> anyhow::Result<()>;
    async fn summary(&self, period: &UsagePeriod) -> anyhow::Result<UsageSummary>;
    async fn breakdown(&self, period: &UsagePeriod) -> anyhow::Result<Vec<UsageBreakdown>>;
    fn name(&self) -> &str;
}
