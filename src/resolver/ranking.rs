//! Candidate gating and ranking.
//!
//! Candidates that fail the size-density gate are dropped. The rest are
//! ordered by audio score, then resolution tier, then file size, then the
//! order they were discovered in. The ordering is total so the same inputs
//! always pick the same file.

use reelhunt_common::{ResolutionTier, SourceKind};
use reelhunt_parser::{audio, quality};
use std::cmp::Ordering;

/// A file that might satisfy a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Backend-specific handle: a library-relative path or a cloud file id.
    pub identifier: String,
    pub file_name: String,
    pub size_bytes: Option<u64>,
    pub tier: ResolutionTier,
    pub audio_score: i32,
    pub source_kind: SourceKind,
    /// Position in the backend's listing.
    pub discovery_index: usize,
}

impl Candidate {
    /// Build a candidate, classifying tier and audio score from the name.
    pub fn new(
        identifier: impl Into<String>,
        file_name: impl Into<String>,
        size_bytes: Option<u64>,
        source_kind: SourceKind,
        discovery_index: usize,
    ) -> Self {
        let file_name = file_name.into();
        Self {
            identifier: identifier.into(),
            tier: quality::classify_resolution(&file_name),
            audio_score: audio::score(&file_name),
            file_name,
            size_bytes,
            source_kind,
            discovery_index,
        }
    }

    /// Whether the file's size is plausible for its tier.
    pub fn is_valid(&self, runtime_minutes: Option<u32>) -> bool {
        quality::is_valid_source(self.size_bytes, self.tier, runtime_minutes)
    }

    /// Estimated average bitrate in bits per second.
    pub fn estimated_bitrate(&self, runtime_minutes: Option<u32>) -> Option<u64> {
        quality::estimated_bitrate(self.size_bytes, runtime_minutes)
    }
}

/// Best-first ordering.
pub fn compare(a: &Candidate, b: &Candidate) -> Ordering {
    b.audio_score
        .cmp(&a.audio_score)
        .then_with(|| b.tier.cmp(&a.tier))
        .then_with(|| b.size_bytes.unwrap_or(0).cmp(&a.size_bytes.unwrap_or(0)))
        .then_with(|| a.discovery_index.cmp(&b.discovery_index))
}

/// Sort candidates best first.
pub fn rank(candidates: &mut [Candidate]) {
    candidates.sort_by(compare);
}

/// Outcome of gating and ranking a candidate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranked {
    /// Valid candidates, best first.
    pub accepted: Vec<Candidate>,
    /// How many candidates failed the gate.
    pub rejected: usize,
}

impl Ranked {
    pub fn best(&self) -> Option<&Candidate> {
        self.accepted.first()
    }

    /// No candidates at all were supplied.
    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty() && self.rejected == 0
    }
}

/// Drop candidates that fail the quality gate and rank the rest.
pub fn gate_and_rank(candidates: Vec<Candidate>, runtime_minutes: Option<u32>) -> Ranked {
    let total = candidates.len();
    let mut accepted: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| {
            let valid = c.is_valid(runtime_minutes);
            if !valid {
                tracing::debug!(
                    file_name = %c.file_name,
                    tier = %c.tier,
                    size_bytes = ?c.size_bytes,
                    runtime_minutes = ?runtime_minutes,
                    "Rejected implausibly small file"
                );
            }
            valid
        })
        .collect();
    let rejected = total - accepted.len();
    rank(&mut accepted);

    if let Some(best) = accepted.first() {
        tracing::debug!(
            file_name = %best.file_name,
            tier = %best.tier,
            audio_score = best.audio_score,
            accepted = accepted.len(),
            rejected,
            "Ranked candidates"
        );
    }

    Ranked { accepted, rejected }
}
