//! Token-usage accounting shared by both model roles.

pub mod traits;
pub mod usage;

pub use traits::{UsageBreakdown, UsageEvent, UsagePeriod, UsageSummary, UsageTracker};
pub use usage::InMemoryUsageTracker;

pub fn create_usage_tracker() -> Box<dyn UsageTracker> {
    Box::new(InMemoryUsageTracker::new())
}
