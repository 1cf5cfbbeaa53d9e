//! Resolution classification and the size-density quality gate.
//!
//! A release claiming 2160p that weighs 50MB for a two hour film is fake or
//! mislabeled. The gate compares megabytes per minute of runtime against a
//! per-tier floor. Missing size or runtime always passes: rejecting a playable
//! file is worse than accepting a doubtful one.

use regex::Regex;
use reelhunt_common::ResolutionTier;
use std::sync::LazyLock;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Case-insensitive markers per tier, checked highest tier first.
static TIER_PATTERNS: LazyLock<Vec<(ResolutionTier, Regex)>> = LazyLock::new(|| {
    [
        (ResolutionTier::P2160, r"2160p|4k|uhd"),
        (ResolutionTier::P1080, r"1080p|1080i|fhd"),
        (ResolutionTier::P720, r"720p"),
        (ResolutionTier::P480, r"480p|sd"),
        (ResolutionTier::P360, r"360p"),
    ]
    .into_iter()
    .map(|(tier, markers)| {
        let pattern = format!(r"(?i)(?:^|[^a-z0-9])(?:{markers})(?:[^a-z]|$)");
        (tier, Regex::new(&pattern).expect("valid tier pattern"))
    })
    .collect()
});

/// Infer the resolution tier from a file or release name.
///
/// # Examples
///
/// ```
/// use reelhunt_parser::quality::classify_resolution;
/// use reelhunt_common::ResolutionTier;
///
/// assert_eq!(classify_resolution("Movie.2019.UHD.BluRay.mkv"), ResolutionTier::P2160);
/// assert_eq!(classify_resolution("Show_S01E01_720p_WEB.mkv"), ResolutionTier::P720);
/// assert_eq!(classify_resolution("home_video.mkv"), ResolutionTier::Unknown);
/// ```
pub fn classify_resolution(name: &str) -> ResolutionTier {
    TIER_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(name))
        .map(|(tier, _)| *tier)
        .unwrap_or(ResolutionTier::Unknown)
}

/// Minimum plausible megabytes per minute for a tier.
pub fn min_mb_per_minute(tier: ResolutionTier) -> f64 {
    match tier {
        ResolutionTier::P2160 => 15.0,
        ResolutionTier::P1080 => 5.0,
        ResolutionTier::P720 => 2.0,
        ResolutionTier::P480 => 1.0,
        ResolutionTier::P360 => 0.5,
        ResolutionTier::Unknown => 0.5,
    }
}

/// Megabytes per minute of runtime, when both inputs are known and non-zero.
pub fn mb_per_minute(size_bytes: Option<u64>, runtime_minutes: Option<u32>) -> Option<f64> {
    match (size_bytes, runtime_minutes) {
        (Some(size), Some(runtime)) if runtime > 0 => {
            Some(size as f64 / BYTES_PER_MB / f64::from(runtime))
        }
        _ => None,
    }
}

/// Average bitrate in bits per second implied by size and runtime.
pub fn estimated_bitrate(size_bytes: Option<u64>, runtime_minutes: Option<u32>) -> Option<u64> {
    match (size_bytes, runtime_minutes) {
        (Some(size), Some(runtime)) if runtime > 0 => {
            Some(size.saturating_mul(8) / (u64::from(runtime) * 60))
        }
        _ => None,
    }
}

/// Whether a file's size is plausible for its tier and runtime.
///
/// Returns `false` only when both size and runtime are known and the density
/// is below the tier floor.
pub fn is_valid_source(
    size_bytes: Option<u64>,
    tier: ResolutionTier,
    runtime_minutes: Option<u32>,
) -> bool {
    match mb_per_minute(size_bytes, runtime_minutes) {
        Some(density) => density >= min_mb_per_minute(tier),
        None => true,
    }
}
