//! Buffering-event window.

use crate::config::PlaybackConfig;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Thresholds for [`StutterWindow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StutterConfig {
    /// Events inside the window that trigger a fallback.
    pub low_threshold: usize,
    /// Size of the burst checked against `window / 3`.
    pub consecutive_threshold: usize,
    pub window: Duration,
}

impl Default for StutterConfig {
    fn default() -> Self {
        Self {
            low_threshold: 3,
            consecutive_threshold: 2,
            window: Duration::from_millis(30_000),
        }
    }
}

impl From<&PlaybackConfig> for StutterConfig {
    fn from(config: &PlaybackConfig) -> Self {
        Self {
            low_threshold: config.low_threshold,
            consecutive_threshold: config.consecutive_threshold,
            window: Duration::from_millis(config.window_ms),
        }
    }
}

/// Recent buffering events for one playback session.
///
/// A fallback is due when the window holds at least `low_threshold` events,
/// or when the last `consecutive_threshold` events happened within a third
/// of the window.
#[derive(Debug, Clone)]
pub struct StutterWindow {
    events: VecDeque<Instant>,
    config: StutterConfig,
}

impl StutterWindow {
    pub fn new(config: StutterConfig) -> Self {
        Self {
            events: VecDeque::new(),
            config,
        }
    }

    /// Record a buffering event now. Returns whether fallback should trigger.
    pub fn record_buffering(&mut self) -> bool {
        self.record_buffering_at(Instant::now())
    }

    pub fn record_buffering_at(&mut self, now: Instant) -> bool {
        self.events.push_back(now);
        self.prune(now);

        let by_count = self.events.len() >= self.config.low_threshold;
        let by_burst = self.is_burst();
        if by_count || by_burst {
            tracing::debug!(
                events = self.events.len(),
                by_count,
                by_burst,
                "Stutter threshold reached"
            );
        }
        by_count || by_burst
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.events.front() {
            if now.saturating_duration_since(oldest) > self.config.window {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_burst(&self) -> bool {
        let n = self.config.consecutive_threshold;
        if n == 0 || self.events.len() < n {
            return false;
        }
        let first = self.events[self.events.len() - n];
        let last = self.events[self.events.len() - 1];
        last.saturating_duration_since(first) < self.config.window / 3
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn reset(&mut self) {
        self.events.clear();
    }
}

impl Default for StutterWindow {
    fn default() -> Self {
        Self::new(StutterConfig::default())
    }
}
