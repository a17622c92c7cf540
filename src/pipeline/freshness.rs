//! Boot freshness filter: drops backlog replayed after a cold restart.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Default window before boot that still counts as fresh.
pub const DEFAULT_STARTUP_GRACE: Duration = Duration::from_secs(15 * 60);

/// Accepts events newer than `boot - grace`.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessFilter {
    boot: DateTime<Utc>,
    grace: Duration,
}

impl FreshnessFilter {
    pub fn new(boot: DateTime<Utc>, grace: Duration) -> Self {
        Self { boot, grace }
    }

    /// Boot time is now, with the default grace window.
    pub fn at_startup() -> Self {
        Self::new(Utc::now(), DEFAULT_STARTUP_GRACE)
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn boot(&self) -> DateTime<Utc> {
        self.boot
    }

    /// Oldest timestamp that is still rejected.
    pub fn cutoff(&self) -> DateTime<Utc> {
        let grace = chrono::Duration::from_std(self.grace).unwrap_or(chrono::Duration::MAX);
        self.boot
            .checked_sub_signed(grace)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// True iff `timestamp` is strictly after `boot - grace`.
    pub fn is_fresh(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp > self.cutoff()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn boot() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 8, 27, 16, 0, 0).unwrap()
    }

    #[test]
    fn message_after_boot_is_fresh() {
        let f = FreshnessFilter::new(boot(), DEFAULT_STARTUP_GRACE);
        assert!(f.is_fresh(boot() + chrono::Duration::seconds(5)));
    }

    #[test]
    fn message_inside_grace_is_fresh() {
        let f = FreshnessFilter::new(boot(), DEFAULT_STARTUP_GRACE);
        assert!(f.is_fresh(boot() - chrono::Duration::minutes(14)));
    }

    #[test]
    fn message_exactly_at_cutoff_is_stale() {
        let f = FreshnessFilter::new(boot(), DEFAULT_STARTUP_GRACE);
        assert!(!f.is_fresh(boot() - chrono::Duration::minutes(15)));
        assert!(f.is_fresh(boot() - chrono::Duration::minutes(15) + chrono::Duration::seconds(1)));
    }

    #[test]
    fn hour_old_message_is_stale() {
        let f = FreshnessFilter::new(boot(), DEFAULT_STARTUP_GRACE);
        assert!(!f.is_fresh(boot() - chrono::Duration::hours(1)));
    }

    #[test]
    fn grace_is_configurable() {
        let f = FreshnessFilter::new(boot(), DEFAULT_STARTUP_GRACE).with_grace(Duration::ZERO);
        assert!(!f.is_fresh(boot()));
        assert!(f.is_fresh(boot() + chrono::Duration::seconds(1)));
    }
}
