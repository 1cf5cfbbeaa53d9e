//! Timed byte stream for throughput measurement.

use bytes::Bytes;
use futures::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::time::Instant;

pub const CHUNK_SIZE: usize = 64 * 1024;
pub const MIN_DURATION_SECS: u64 = 1;
pub const MAX_DURATION_SECS: u64 = 10;
pub const DEFAULT_DURATION_SECS: u64 = 5;

static CHUNK: [u8; CHUNK_SIZE] = [0; CHUNK_SIZE];

/// Requested duration clamped into the accepted range.
pub fn clamp_duration(requested: Option<u64>) -> Duration {
    let secs = requested
        .unwrap_or(DEFAULT_DURATION_SECS)
        .clamp(MIN_DURATION_SECS, MAX_DURATION_SECS);
    Duration::from_secs(secs)
}

/// Emit fixed-size chunks until `duration` has elapsed.
///
/// The deadline is checked before each chunk, so the stream ends on the
/// first poll after the deadline passes.
pub fn test_stream(duration: Duration) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    let deadline = Instant::now() + duration;
    futures::stream::unfold(deadline, |deadline| async move {
        if Instant::now() >= deadline {
            return None;
        }
        tokio::task::yield_now().await;
        Some((Ok(Bytes::from_static(&CHUNK)), deadline))
    })
}
