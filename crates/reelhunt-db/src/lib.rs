//! Reelhunt-DB: Database schema, migrations, and query operations
//!
//! Persists resolved stream links in SQLite using rusqlite with r2d2
//! connection pooling.
//!
//! # Modules
//!
//! - `migrations` - Embedded schema migrations
//! - `pool` - Connection pool management
//! - `models` - Rust models matching the database schema
//! - `queries` - Query operations
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use reelhunt_common::{ContentKey, SourceKind};
//! use reelhunt_db::models::NewResolvedLink;
//! use reelhunt_db::pool::{get_conn, init_memory_pool};
//! use reelhunt_db::queries::resolved_links;
//!
//! let pool = init_memory_pool().unwrap();
//! let conn = get_conn(&pool).unwrap();
//!
//! let now = Utc::now();
//! let link = NewResolvedLink {
//!     key: ContentKey::movie("tt1160419"),
//!     stream_url: "http://localhost:8080/media/movies/Dune.2021.mkv".into(),
//!     file_name: "Dune.2021.mkv".into(),
//!     source_kind: SourceKind::LocalIndex,
//! };
//! resolved_links::insert(&conn, &link, now, now + chrono::Duration::hours(48)).unwrap();
//!
//! let hit = resolved_links::find_fresh(&conn, &link.key, now).unwrap();
//! assert!(hit.is_some());
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;

/// Timestamp format used for every stored datetime: RFC3339 UTC with
/// millisecond precision, so text comparison matches time order.
pub fn format_timestamp(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
