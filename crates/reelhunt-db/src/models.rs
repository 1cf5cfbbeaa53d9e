//! Rust models matching the database schema.

use chrono::{DateTime, Utc};
use reelhunt_common::{ContentKey, SourceKind};
use serde::{Deserialize, Serialize};

/// A cached, playable stream link for one piece of content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLink {
    pub id: i64,
    #[serde(flatten)]
    pub key: ContentKey,
    pub stream_url: String,
    pub file_name: String,
    pub source_kind: SourceKind,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl ResolvedLink {
    /// Whether the link is still usable at `now`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Fields supplied when recording a new resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewResolvedLink {
    pub key: ContentKey,
    pub stream_url: String,
    pub file_name: String,
    pub source_kind: SourceKind,
}
