use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;

use super::traits::{UsageBreakdown, UsageEvent, UsagePeriod, UsageSummary, UsageTracker};

/// In-memory usage tracker backed by a `parking_lot::Mutex<Vec<UsageEvent>>`.
/// Lives for the process; nothing is persisted.
#[derive(Default)]
pub struct InMemoryUsageTracker {
    events: Mutex<Vec<UsageEvent>>,
}

impl InMemoryUsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cutoff timestamp for the given period, or `None` for `All`.
    fn cutoff(period: &UsagePeriod) -> Option<chrono::DateTime<Utc>> {
        let now = Utc::now();
        match period {
            UsagePeriod::Hour => Some(now - chrono::Duration::hours(1)),
            UsagePeriod::Day => Some(now - chrono::Duration::days(1)),
            UsagePeriod::All => None,
        }
    }

    fn in_period<'a>(
        events: &'a [UsageEvent],
        period: &UsagePeriod,
    ) -> impl Iterator<Item = &'a UsageEvent> {
        let cutoff = Self::cutoff(period);
        events
            .iter()
            .filter(move |e| cutoff.map_or(true, |c| e.timestamp >= c))
    }
}

#[async_trait]
impl UsageTracker for InMemoryUsageTracker {
    async fn record(&self, event: UsageEvent) -> anyhow::Result<()> {
        tracing::debug!(
            role = %event.role,
            model = %event.model,
            input_tokens = event.input_tokens,
            output_tokens = event.output_tokens,
            "Usage recorded"
        );
        self.events.lock().push(event);
        Ok(())
    }

    async fn summary(&self, period: &UsagePeriod) -> anyhow::Result<UsageSummary> {
        let events = self.events.lock();
        let mut summary = UsageSummary {
            total_requests: 0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            period: period.clone(),
        };

        for e in Self::in_period(&events, period) {
            summary.total_requests += 1;
            summary.total_input_tokens += e.input_tokens;
            summary.total_output_tokens += e.output_tokens;
        }

        Ok(summary)
    }

    async fn breakdown(&self, period: &UsagePeriod) -> anyhow::Result<Vec<UsageBreakdown>> {
        let events = self.events.lock();

        // Aggregate by (role, model); BTreeMap keeps the listing stable
        let mut map: BTreeMap<(String, String), (u64, u64, u64)> = BTreeMap::new();

        for e in Self::in_period(&events, period) {
            let entry = map
                .entry((e.role.clone(), e.model.clone()))
                .or_insert((0, 0, 0));
            entry.0 += 1;
            entry.1 += e.input_tokens;
            entry.2 += e.output_tokens;
        }

        Ok(map
            .into_iter()
            .map(
                |((role, model), (requests, input_tokens, output_tokens))| UsageBreakdown {
                    role,
                    model,
                    requests,
                    input_tokens,
                    output_tokens,
                },
            )
            .collect())
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(role: &str, model: &str, input: u64, output: u64) -> UsageEvent {
        UsageEvent {
            role: role.to_string(),
            provider: "openai".to_string(),
            model: model.to_string(),
            input_tokens: input,
            output_tokens: output,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn record_and_summary() {
        let tracker = InMemoryUsageTracker::new();
        tracker
            .record(sample_event("classifier", "gpt-4o-mini", 100, 50))
            .await
            .unwrap();
        tracker
            .record(sample_event("classifier", "gpt-4o-mini", 200, 100))
            .await
            .unwrap();

        let summary = tracker.summary(&UsagePeriod::All).await.unwrap();
        assert_eq!(summary.total_requests, 2);
        assert_eq!(summary.total_input_tokens, 300);
        assert_eq!(summary.total_output_tokens, 150);
        assert_eq!(summary.total_tokens(), 450);
    }

    #[tokio::test]
    async fn breakdown_groups_by_role_and_model() {
        let tracker = InMemoryUsageTracker::new();
        tracker
            .record(sample_event("classifier", "gpt-4o-mini", 100, 50))
            .await
            .unwrap();
        tracker
            .record(sample_event("responder", "sonar-pro", 200, 100))
            .await
            .unwrap();
        tracker
            .record(sample_event("responder", "sonar-pro", 10, 10))
            .await
            .unwrap();

        let bd = tracker.breakdown(&UsagePeriod::All).await.unwrap();
        assert_eq!(bd.len(), 2);
        assert_eq!(bd[0].role, "classifier");
        assert_eq!(bd[1].role, "responder");
        assert_eq!(bd[1].requests, 2);
        assert_eq!(bd[1].input_tokens, 210);
    }

    #[tokio::test]
    async fn old_events_fall_outside_short_periods() {
        let tracker = InMemoryUsageTracker::new();
        let mut old = sample_event("responder", "sonar-pro", 500, 500);
        old.timestamp = Utc::now() - chrono::Duration::days(2);
        tracker.record(old).await.unwrap();
        tracker
            .record(sample_event("responder", "sonar-pro", 1, 1))
            .await
            .unwrap();

        assert_eq!(
            tracker.summary(&UsagePeriod::Day).await.unwrap().total_requests,
            1
        );
        assert_eq!(
            tracker.summary(&UsagePeriod::All).await.unwrap().total_requests,
            2
        );
    }

    #[tokio::test]
    async fn empty_tracker_returns_zero_summary() {
        let tracker = InMemoryUsageTracker::new();
        let summary = tracker.summary(&UsagePeriod::All).await.unwrap();
        assert_eq!(summary.total_requests, 0);
        assert!(tracker.breakdown(&UsagePeriod::All).await.unwrap().is_empty());
    }
}
