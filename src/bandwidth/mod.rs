//! Bandwidth reporting.
//!
//! Clients measure their throughput against [`test_stream`] and report the
//! result. The [`BandwidthMonitor`] keeps a short per-user history and tells
//! clients when a fresh measurement is worthwhile.

pub mod monitor;
pub mod test_stream;

pub use monitor::BandwidthMonitor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User id applied when a request carries no `X-User-Id` header.
pub const DEFAULT_USER_ID: &str = "00000000-0000-0000-0000-000000000001";

/// Why a measurement was taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeasurementTrigger {
    Startup,
    EpisodeEnd,
    BandwidthRetest,
    #[default]
    Manual,
}

impl MeasurementTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementTrigger::Startup => "startup",
            MeasurementTrigger::EpisodeEnd => "episode-end",
            MeasurementTrigger::BandwidthRetest => "bandwidth-retest",
            MeasurementTrigger::Manual => "manual",
        }
    }
}

impl fmt::Display for MeasurementTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasurementTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "startup" => Ok(MeasurementTrigger::Startup),
            "episode-end" => Ok(MeasurementTrigger::EpisodeEnd),
            "bandwidth-retest" => Ok(MeasurementTrigger::BandwidthRetest),
            "manual" => Ok(MeasurementTrigger::Manual),
            _ => Err(format!("Unknown trigger: {}", s)),
        }
    }
}

/// A client's measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandwidthReport {
    pub measured_mbps: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<MeasurementTrigger>,
}

/// Response to a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOutcome {
    pub recorded: bool,
    pub reliable: bool,
    pub needs_test: bool,
    pub suggest_retest: bool,
}

/// Rolling bandwidth status for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandwidthStatus {
    pub needs_test: bool,
    pub suggest_retest: bool,
    pub latest_mbps: Option<f64>,
    /// Mean of the reliable samples.
    pub average_mbps: Option<f64>,
    pub sample_count: usize,
    pub last_tested_at: Option<DateTime<Utc>>,
    pub last_trigger: Option<MeasurementTrigger>,
}
