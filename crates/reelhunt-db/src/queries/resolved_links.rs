//! Resolved link queries.
//!
//! Rows are never updated except for `last_accessed_at`. Concurrent writers
//! for the same key add competing rows and readers take the freshest one.

use chrono::{DateTime, Utc};
use reelhunt_common::{ContentKey, Error, MediaType, Result, SourceKind};
use rusqlite::{params, Connection, Row};

use crate::format_timestamp;
use crate::models::{NewResolvedLink, ResolvedLink};

const COLUMNS: &str = "id, content_id, media_type, season, episode, stream_url, file_name,
     source_kind, created_at, expires_at, last_accessed_at";

fn parse_timestamp(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_enum<T: std::str::FromStr<Err = String>>(idx: usize, raw: String) -> rusqlite::Result<T> {
    raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

fn row_to_link(row: &Row<'_>) -> rusqlite::Result<ResolvedLink> {
    let media_type: MediaType = parse_enum(2, row.get(2)?)?;
    let source_kind: SourceKind = parse_enum(7, row.get(7)?)?;
    Ok(ResolvedLink {
        id: row.get(0)?,
        key: ContentKey {
            content_id: row.get(1)?,
            media_type,
            season: row.get(3)?,
            episode: row.get(4)?,
        },
        stream_url: row.get(5)?,
        file_name: row.get(6)?,
        source_kind,
        created_at: parse_timestamp(8, row.get(8)?)?,
        expires_at: parse_timestamp(9, row.get(9)?)?,
        last_accessed_at: parse_timestamp(10, row.get(10)?)?,
    })
}

/// Append a new link row.
pub fn insert(
    conn: &Connection,
    link: &NewResolvedLink,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<ResolvedLink> {
    conn.execute(
        "INSERT INTO resolved_links (content_id, media_type, season, episode, stream_url,
            file_name, source_kind, created_at, expires_at, last_accessed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?8)",
        params![
            link.key.content_id,
            link.key.media_type.as_str(),
            link.key.season,
            link.key.episode,
            link.stream_url,
            link.file_name,
            link.source_kind.as_str(),
            format_timestamp(created_at),
            format_timestamp(expires_at),
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(ResolvedLink {
        id: conn.last_insert_rowid(),
        key: link.key.clone(),
        stream_url: link.stream_url.clone(),
        file_name: link.file_name.clone(),
        source_kind: link.source_kind,
        created_at,
        expires_at,
        last_accessed_at: created_at,
    })
}

/// Freshest row for `key` whose `expires_at` is after `now`.
pub fn find_fresh(
    conn: &Connection,
    key: &ContentKey,
    now: DateTime<Utc>,
) -> Result<Option<ResolvedLink>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM resolved_links
         WHERE content_id = ?1 AND media_type = ?2 AND season IS ?3 AND episode IS ?4
           AND expires_at > ?5
         ORDER BY created_at DESC, id DESC
         LIMIT 1"
    );
    match conn.query_row(
        &sql,
        params![
            key.content_id,
            key.media_type.as_str(),
            key.season,
            key.episode,
            format_timestamp(now),
        ],
        row_to_link,
    ) {
        Ok(link) => Ok(Some(link)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Record a read of the row.
pub fn touch(conn: &Connection, id: i64, now: DateTime<Utc>) -> Result<bool> {
    let affected = conn
        .execute(
            "UPDATE resolved_links SET last_accessed_at = ?1 WHERE id = ?2",
            params![format_timestamp(now), id],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(affected > 0)
}

/// Delete up to `batch_size` rows that expired before `now`.
///
/// Returns the number removed; callers loop until it is below `batch_size`
/// so no single statement holds the write lock for long.
pub fn delete_expired_batch(
    conn: &Connection,
    now: DateTime<Utc>,
    batch_size: usize,
) -> Result<usize> {
    conn.execute(
        "DELETE FROM resolved_links WHERE id IN (
            SELECT id FROM resolved_links WHERE expires_at < ?1 LIMIT ?2
         )",
        params![format_timestamp(now), batch_size as i64],
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Number of rows stored for a key, expired or not.
pub fn count_for_key(conn: &Connection, key: &ContentKey) -> Result<usize> {
    conn.query_row(
        "SELECT COUNT(*) FROM resolved_links
         WHERE content_id = ?1 AND media_type = ?2 AND season IS ?3 AND episode IS ?4",
        params![key.content_id, key.media_type.as_str(), key.season, key.episode],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n as usize)
    .map_err(|e| Error::database(e.to_string()))
}
