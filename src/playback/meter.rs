//! Client-side throughput measurement against the bandwidth test stream.

use crate::bandwidth::{BandwidthReport, MeasurementTrigger};
use futures::StreamExt;
use reelhunt_common::{Error, Result};
use reqwest::Client;
use std::time::Duration;
use tokio::time::Instant;

/// Extra time allowed beyond the requested duration before giving up.
pub const TIMEOUT_GRACE: Duration = Duration::from_secs(10);

/// A completed measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub bytes: u64,
    /// First byte to last byte.
    pub elapsed: Duration,
    pub mbps: f64,
    pub reliable: bool,
}

impl Measurement {
    pub fn duration_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }

    pub fn report(&self, trigger: MeasurementTrigger) -> BandwidthReport {
        BandwidthReport {
            measured_mbps: self.mbps,
            duration_ms: Some(self.duration_ms()),
            trigger: Some(trigger),
        }
    }
}

/// Megabits per second for `bytes` over `elapsed`.
pub fn compute_mbps(bytes: u64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    if bytes == 0 || secs <= 0.0 {
        return None;
    }
    Some(bytes as f64 * 8.0 / secs / 1_000_000.0)
}

/// Stream `{base_url}/api/bandwidth/test` for `duration_secs` and time it.
///
/// The clock starts when the first chunk arrives so connection setup is not
/// counted. The whole exchange is bounded by `duration_secs + 10s`.
pub async fn measure(
    client: &Client,
    base_url: &str,
    duration_secs: u64,
    min_reliable_bytes: u64,
) -> Result<Measurement> {
    let url = format!(
        "{}/api/bandwidth/test?duration={}",
        base_url.trim_end_matches('/'),
        duration_secs
    );
    let limit = Duration::from_secs(duration_secs) + TIMEOUT_GRACE;

    let (bytes, elapsed) = tokio::time::timeout(limit, async {
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::transient(format!("bandwidth test request failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::transient(format!(
                "bandwidth test returned {}",
                response.status()
            )));
        }

        let mut stream = response.bytes_stream();
        let mut bytes = 0u64;
        let mut first: Option<Instant> = None;
        let mut last: Option<Instant> = None;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| Error::transient(format!("bandwidth test interrupted: {}", e)))?;
            if chunk.is_empty() {
                continue;
            }
            let now = Instant::now();
            first.get_or_insert(now);
            last = Some(now);
            bytes += chunk.len() as u64;
        }

        let elapsed = match (first, last) {
            (Some(first), Some(last)) => last.duration_since(first),
            _ => Duration::ZERO,
        };
        Ok::<_, Error>((bytes, elapsed))
    })
    .await
    .map_err(|_| Error::transient(format!("bandwidth test timed out after {:?}", limit)))??;

    let mbps = compute_mbps(bytes, elapsed).ok_or_else(|| {
        Error::transient(format!(
            "bandwidth test received {} bytes in {:?}",
            bytes, elapsed
        ))
    })?;

    let measurement = Measurement {
        bytes,
        elapsed,
        mbps,
        reliable: bytes >= min_reliable_bytes,
    };
    tracing::info!(
        mbps = measurement.mbps,
        bytes,
        duration_ms = measurement.duration_ms(),
        reliable = measurement.reliable,
        "Measured bandwidth"
    );
    Ok(measurement)
}
