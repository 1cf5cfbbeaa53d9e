//! Per-user rolling bandwidth status.

use super::{BandwidthReport, BandwidthStatus, MeasurementTrigger, ReportOutcome};
use crate::config::BandwidthConfig;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;

/// Users beyond this count are pruned once their history goes stale.
const MAX_TRACKED_USERS: usize = 4096;

/// One recorded measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub mbps: f64,
    pub duration_ms: Option<u64>,
    pub trigger: MeasurementTrigger,
    pub reliable: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Thread-safe store of recent samples per user.
#[derive(Clone)]
pub struct BandwidthMonitor {
    users: Arc<DashMap<String, VecDeque<Sample>>>,
    config: BandwidthConfig,
}

impl BandwidthMonitor {
    pub fn new(config: BandwidthConfig) -> Self {
        Self {
            users: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Whether a sample of this duration can be trusted.
    pub fn is_reliable(&self, duration_ms: Option<u64>) -> bool {
        duration_ms.is_some_and(|d| d >= self.config.min_reliable_duration_ms)
    }

    /// Record a report for `user`.
    ///
    /// # Returns
    /// `recorded = false` when the measurement is not a positive finite number;
    /// the history is left untouched in that case.
    pub fn record(&self, user: &str, report: &BandwidthReport) -> ReportOutcome {
        self.record_at(user, report, Utc::now())
    }

    pub fn record_at(
        &self,
        user: &str,
        report: &BandwidthReport,
        now: DateTime<Utc>,
    ) -> ReportOutcome {
        if !report.measured_mbps.is_finite() || report.measured_mbps <= 0.0 {
            tracing::warn!(
                user = %user,
                mbps = report.measured_mbps,
                "Ignoring invalid bandwidth report"
            );
            let status = self.status_at(user, now);
            return ReportOutcome {
                recorded: false,
                reliable: false,
                needs_test: status.needs_test,
                suggest_retest: status.suggest_retest,
            };
        }

        let sample = Sample {
            mbps: report.measured_mbps,
            duration_ms: report.duration_ms,
            trigger: report.trigger.unwrap_or_default(),
            reliable: self.is_reliable(report.duration_ms),
            recorded_at: now,
        };
        let reliable = sample.reliable;

        tracing::info!(
            user = %user,
            mbps = sample.mbps,
            duration_ms = ?sample.duration_ms,
            trigger = %sample.trigger,
            reliable,
            "Recorded bandwidth sample"
        );

        self.prune_stale(user, now);
        let status = {
            let mut history = self.users.entry(user.to_string()).or_default();
            history.push_back(sample);
            while history.len() > self.config.history_size.max(1) {
                history.pop_front();
            }
            self.evaluate(&history, now)
        };

        ReportOutcome {
            recorded: true,
            reliable,
            needs_test: status.needs_test,
            suggest_retest: status.suggest_retest,
        }
    }

    /// Forget users whose newest sample is past `stale_after_hours`, once
    /// more than [`MAX_TRACKED_USERS`] are held. Their status would read
    /// `needs_test` either way.
    fn prune_stale(&self, user: &str, now: DateTime<Utc>) {
        if self.users.len() < MAX_TRACKED_USERS || self.users.contains_key(user) {
            return;
        }
        let cutoff = now - Duration::hours(self.config.stale_after_hours as i64);
        let before = self.users.len();
        self.users
            .retain(|_, history| history.back().is_some_and(|s| s.recorded_at > cutoff));
        tracing::debug!(pruned = before - self.users.len(), "Pruned stale bandwidth users");
    }

    pub fn tracked_users(&self) -> usize {
        self.users.len()
    }

    /// Current status for `user`. Unknown users need a test.
    pub fn status(&self, user: &str) -> BandwidthStatus {
        self.status_at(user, Utc::now())
    }

    pub fn status_at(&self, user: &str, now: DateTime<Utc>) -> BandwidthStatus {
        match self.users.get(user) {
            Some(history) => self.evaluate(&history, now),
            None => self.evaluate(&VecDeque::new(), now),
        }
    }

    fn evaluate(&self, history: &VecDeque<Sample>, now: DateTime<Utc>) -> BandwidthStatus {
        let stale_after = Duration::hours(self.config.stale_after_hours as i64);
        let retest_after = Duration::hours(self.config.retest_after_hours as i64);

        let latest = history.back();
        let reliable: Vec<&Sample> = history.iter().filter(|s| s.reliable).collect();
        let newest_reliable = reliable.last().copied();

        let needs_test = newest_reliable.map_or(true, |s| now - s.recorded_at > stale_after);

        let suggest_retest = !needs_test
            && (latest.is_some_and(|s| !s.reliable)
                || newest_reliable.is_some_and(|s| now - s.recorded_at > retest_after)
                || self.dropped(&reliable));

        let average_mbps = (!reliable.is_empty())
            .then(|| reliable.iter().map(|s| s.mbps).sum::<f64>() / reliable.len() as f64);

        BandwidthStatus {
            needs_test,
            suggest_retest,
            latest_mbps: latest.map(|s| s.mbps),
            average_mbps,
            sample_count: history.len(),
            last_tested_at: latest.map(|s| s.recorded_at),
            last_trigger: latest.map(|s| s.trigger),
        }
    }

    /// Newest reliable sample fell well below the mean of the earlier ones.
    fn dropped(&self, reliable: &[&Sample]) -> bool {
        let Some((newest, earlier)) = reliable.split_last() else {
            return false;
        };
        if earlier.is_empty() {
            return false;
        }
        let mean = earlier.iter().map(|s| s.mbps).sum::<f64>() / earlier.len() as f64;
        newest.mbps < self.config.drop_ratio * mean
    }
}

impl Default for BandwidthMonitor {
    fn default() -> Self {
        Self::new(BandwidthConfig::default())
    }
}
