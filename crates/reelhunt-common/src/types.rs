//! Core type definitions shared by the resolver, cache and HTTP layer.
//!
//! Enums serialize the way clients see them on the wire: media types in
//! lowercase, source kinds in camelCase, resolution tiers as bare numbers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of content being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// A feature film.
    Movie,
    /// A single episode of a series.
    Episode,
}

impl MediaType {
    /// Stable string form used in the database and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Episode => "episode",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "movie" => Ok(Self::Movie),
            "episode" => Ok(Self::Episode),
            other => Err(format!("unknown media type: {other}")),
        }
    }
}

/// Coarse video resolution bucket inferred from a file name.
///
/// Ordering follows picture height, so `Unknown` sorts below every known tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResolutionTier {
    /// Unrecognised resolution.
    Unknown,
    /// 360p.
    P360,
    /// 480p / SD.
    P480,
    /// 720p.
    P720,
    /// 1080p / 1080i / FHD.
    P1080,
    /// 2160p / 4K / UHD.
    P2160,
}

impl ResolutionTier {
    /// Nominal picture height, `0` for unknown.
    pub fn height(&self) -> u32 {
        match self {
            Self::Unknown => 0,
            Self::P360 => 360,
            Self::P480 => 480,
            Self::P720 => 720,
            Self::P1080 => 1080,
            Self::P2160 => 2160,
        }
    }

    /// Map a nominal height back to a tier. Unlisted heights are `Unknown`.
    pub fn from_height(height: u32) -> Self {
        match height {
            2160 => Self::P2160,
            1080 => Self::P1080,
            720 => Self::P720,
            480 => Self::P480,
            360 => Self::P360,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            other => write!(f, "{}p", other.height()),
        }
    }
}

impl Serialize for ResolutionTier {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.height())
    }
}

impl<'de> Deserialize<'de> for ResolutionTier {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let height = u32::deserialize(deserializer)?;
        Ok(Self::from_height(height))
    }
}

/// Backend a candidate file was discovered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    /// The fast local file index.
    LocalIndex,
    /// The slow remote resolution service.
    CloudBackend,
}

impl SourceKind {
    /// Stable string form used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalIndex => "localIndex",
            Self::CloudBackend => "cloudBackend",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "localIndex" => Ok(Self::LocalIndex),
            "cloudBackend" => Ok(Self::CloudBackend),
            other => Err(format!("unknown source kind: {other}")),
        }
    }
}

/// Cache key identifying one playable piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentKey {
    pub content_id: String,
    pub media_type: MediaType,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl ContentKey {
    /// Key for a movie.
    pub fn movie(content_id: impl Into<String>) -> Self {
        Self {
            content_id: content_id.into(),
            media_type: MediaType::Movie,
            season: None,
            episode: None,
        }
    }

    /// Key for a single episode.
    pub fn episode(content_id: impl Into<String>, season: u32, episode: u32) -> Self {
        Self {
            content_id: content_id.into(),
            media_type: MediaType::Episode,
            season: Some(season),
            episode: Some(episode),
        }
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.season, self.episode) {
            (Some(s), Some(e)) => write!(
                f,
                "{}:{}:S{:02}E{:02}",
                self.media_type, self.content_id, s, e
            ),
            _ => write!(f, "{}:{}", self.media_type, self.content_id),
        }
    }
}
