//! Resolution cache.
//!
//! Wraps the `resolved_links` table with a TTL. The cache is an optimization
//! only: every failure is logged and reported as a miss (reads) or ignored
//! (writes), so a broken database never fails a resolve.

use chrono::{DateTime, Utc};
use reelhunt_common::{ContentKey, Error, Result};
use reelhunt_db::models::{NewResolvedLink, ResolvedLink};
use reelhunt_db::pool::{get_conn, DbPool};
use reelhunt_db::queries::resolved_links;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Rows deleted per statement during a sweep.
const SWEEP_BATCH_SIZE: usize = 500;

/// TTL-keyed store of resolved stream links.
#[derive(Clone)]
pub struct ResolutionCache {
    pool: Option<DbPool>,
    ttl: chrono::Duration,
}

impl ResolutionCache {
    /// Cache backed by `pool`, keeping links for `ttl`.
    pub fn new(pool: DbPool, ttl: Duration) -> Self {
        Self {
            pool: Some(pool),
            ttl: to_chrono(ttl),
        }
    }

    /// Cache with no backing store. Every read misses.
    pub fn unavailable(ttl: Duration) -> Self {
        Self {
            pool: None,
            ttl: to_chrono(ttl),
        }
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Freshest unexpired link for `key`, bumping its last access time.
    pub fn get(&self, key: &ContentKey) -> Option<ResolvedLink> {
        self.get_at(key, Utc::now())
    }

    /// [`get`](Self::get) evaluated at `now`.
    pub fn get_at(&self, key: &ContentKey, now: DateTime<Utc>) -> Option<ResolvedLink> {
        match self.try_get(key, now) {
            Ok(hit) => {
                tracing::debug!(key = %key, hit = hit.is_some(), "Cache lookup");
                hit
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, resolving fresh");
                None
            }
        }
    }

    fn try_get(&self, key: &ContentKey, now: DateTime<Utc>) -> Result<Option<ResolvedLink>> {
        let conn = get_conn(self.pool()?)?;
        let Some(mut link) = resolved_links::find_fresh(&conn, key, now)? else {
            return Ok(None);
        };
        resolved_links::touch(&conn, link.id, now)?;
        link.last_accessed_at = now;
        Ok(Some(link))
    }

    /// Record a new resolution expiring one TTL from now.
    pub fn put(&self, link: &NewResolvedLink) -> Option<ResolvedLink> {
        self.put_at(link, Utc::now())
    }

    /// [`put`](Self::put) as of `now`.
    pub fn put_at(&self, link: &NewResolvedLink, now: DateTime<Utc>) -> Option<ResolvedLink> {
        let result = self.pool().and_then(|pool| {
            let conn = get_conn(pool)?;
            resolved_links::insert(&conn, link, now, now + self.ttl)
        });

        match result {
            Ok(stored) => {
                tracing::debug!(
                    key = %link.key,
                    file_name = %link.file_name,
                    expires_at = %stored.expires_at,
                    "Cached resolved link"
                );
                Some(stored)
            }
            Err(e) => {
                tracing::warn!(key = %link.key, error = %e, "Cache write failed");
                None
            }
        }
    }

    /// Delete expired rows. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// [`sweep`](Self::sweep) as of `now`, one batch per statement.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        loop {
            let batch = self.pool().and_then(|pool| {
                let conn = get_conn(pool)?;
                resolved_links::delete_expired_batch(&conn, now, SWEEP_BATCH_SIZE)
            });
            match batch {
                Ok(n) => {
                    removed += n;
                    if n < SWEEP_BATCH_SIZE {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Cache sweep failed");
                    break;
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, "Swept expired cache entries");
        }
        removed
    }

    fn pool(&self) -> Result<&DbPool> {
        self.pool
            .as_ref()
            .ok_or_else(|| Error::CacheUnavailable("no cache store configured".into()))
    }
}

fn to_chrono(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(48))
}

/// Start a background task that sweeps expired entries every `interval`
/// until `shutdown` fires.
pub fn start_sweep_task(
    cache: ResolutionCache,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let cache = cache.clone();
                    if let Err(e) = tokio::task::spawn_blocking(move || cache.sweep()).await {
                        tracing::error!("Cache sweep task panicked: {}", e);
                    }
                }
            }
        }
        tracing::debug!("Cache sweeper stopped");
    })
}
