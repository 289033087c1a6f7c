//! Health verdicts derived from engine state.
//!
//! The checker is pure: it reads an [`EngineStats`] sample and applies
//! three thresholds. Unhealthy states accumulate human-readable issues
//! rather than failing fast, so operators see every violated condition
//! at once.

use std::time::Duration;

use chrono::Utc;

use crate::collector::EngineStats;

// ═══════════════════════════════════════════════════════════════════════════════
// THRESHOLDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Health thresholds.
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    /// Longest tolerated gap since the last collection.
    ///
    /// Default: 5 minutes.
    pub staleness_limit: Duration,

    /// Highest tolerated `errors / collections` ratio.
    ///
    /// Default: 0.10.
    pub error_rate_limit: f64,

    /// Deepest tolerated task queue.
    ///
    /// Default: 800.
    pub queue_depth_limit: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            staleness_limit: Duration::from_secs(300),
            error_rate_limit: 0.10,
            queue_depth_limit: 800,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HEALTH REPORT
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of one health check.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Whether every condition held.
    pub healthy: bool,
    /// Human-readable reasons for an unhealthy verdict.
    pub issues: Vec<String>,
    /// When the engine last collected.
    pub last_collection_at: Option<chrono::DateTime<Utc>>,
    /// Engine error count at check time.
    pub errors_count: u64,
    /// Task queue depth at check time.
    pub queue_depth: usize,
    /// Monitored validator count at check time.
    pub validators_monitored: usize,
}

// ═══════════════════════════════════════════════════════════════════════════════
// HEALTH CHECKER
// ═══════════════════════════════════════════════════════════════════════════════

/// Threshold-based health checker.
#[derive(Debug, Clone, Default)]
pub struct HealthChecker {
    thresholds: HealthThresholds,
}

impl HealthChecker {
    /// Create a checker with the given thresholds.
    #[must_use]
    pub const fn new(thresholds: HealthThresholds) -> Self {
        Self { thresholds }
    }

    /// Evaluate a stats sample.
    ///
    /// Healthy iff the last collection is fresh, the error rate is at or
    /// below the limit (once any collections ran), and the queue depth
    /// is within bounds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn check(&self, stats: &EngineStats) -> HealthReport {
        let mut issues = Vec::new();

        match stats.last_collection_at {
            Some(last) => {
                let age = Utc::now().signed_duration_since(last);
                let limit = chrono::Duration::from_std(self.thresholds.staleness_limit)
                    .unwrap_or_else(|_| chrono::Duration::minutes(5));
                if age > limit {
                    issues.push(format!(
                        "last collection {}s ago exceeds staleness limit of {}s",
                        age.num_seconds(),
                        limit.num_seconds()
                    ));
                }
            }
            None => issues.push("no collection has completed yet".to_string()),
        }

        if stats.collections_count > 0 {
            let error_rate = stats.errors_count as f64 / stats.collections_count as f64;
            if error_rate > self.thresholds.error_rate_limit {
                issues.push(format!(
                    "error rate {:.2} exceeds limit {:.2} ({} errors / {} collections)",
                    error_rate,
                    self.thresholds.error_rate_limit,
                    stats.errors_count,
                    stats.collections_count
                ));
            }
        }

        if stats.queue_depth > self.thresholds.queue_depth_limit {
            issues.push(format!(
                "queue depth {} exceeds limit {}",
                stats.queue_depth, self.thresholds.queue_depth_limit
            ));
        }

        HealthReport {
            healthy: issues.is_empty(),
            issues,
            last_collection_at: stats.last_collection_at,
            errors_count: stats.errors_count,
            queue_depth: stats.queue_depth,
            validators_monitored: stats.validators_monitored,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn stats(
        last_secs_ago: Option<i64>,
        errors: u64,
        collections: u64,
        queue_depth: usize,
    ) -> EngineStats {
        EngineStats {
            last_collection_at: last_secs_ago
                .map(|secs| Utc::now() - chrono::Duration::seconds(secs)),
            errors_count: errors,
            collections_count: collections,
            queue_depth,
            validators_monitored: 3,
            current_head_slot: 160,
        }
    }

    #[test]
    fn fresh_engine_with_low_errors_is_healthy() {
        let checker = HealthChecker::default();
        let report = checker.check(&stats(Some(10), 5, 100, 40));

        assert!(report.healthy, "issues: {:?}", report.issues);
        assert!(report.issues.is_empty());
        assert_eq!(report.validators_monitored, 3);
    }

    #[test]
    fn stale_collection_is_unhealthy() {
        let checker = HealthChecker::default();
        let report = checker.check(&stats(Some(400), 0, 100, 0));

        assert!(!report.healthy);
        assert!(report.issues[0].contains("staleness"));
    }

    #[test]
    fn never_collected_is_unhealthy() {
        let checker = HealthChecker::default();
        let report = checker.check(&stats(None, 0, 0, 0));

        assert!(!report.healthy);
        assert!(report.issues[0].contains("no collection"));
    }

    #[rstest]
    #[case(10, 100, true)] // exactly at the 0.10 limit
    #[case(11, 100, false)] // just above
    #[case(0, 0, true)] // no collections: rate not evaluated
    fn error_rate_threshold(#[case] errors: u64, #[case] collections: u64, #[case] healthy: bool) {
        let checker = HealthChecker::default();
        let report = checker.check(&stats(Some(1), errors, collections, 0));
        assert_eq!(report.healthy, healthy, "issues: {:?}", report.issues);
    }

    #[rstest]
    #[case(800, true)]
    #[case(801, false)]
    fn queue_depth_threshold(#[case] depth: usize, #[case] healthy: bool) {
        let checker = HealthChecker::default();
        let report = checker.check(&stats(Some(1), 0, 10, depth));
        assert_eq!(report.healthy, healthy);
    }

    #[test]
    fn multiple_violations_all_reported() {
        let checker = HealthChecker::default();
        let report = checker.check(&stats(Some(400), 50, 100, 900));

        assert!(!report.healthy);
        assert_eq!(report.issues.len(), 3);
    }
}
