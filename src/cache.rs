use std::path::Path;

use rusqlite::{Connection, params};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// On-disk cache of raw API responses, keyed by `"{endpoint}:{id}"`.
/// Replaces the original tool's implicit framework memoization with an
/// explicit store: entries expire after a TTL and can be bypassed with
/// `--refresh` or dropped wholesale with `cache --clear`.
pub struct ResponseCache {
    pub conn: Connection,
}

impl ResponseCache {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let cache = Self { conn };
        cache.init()?;
        Ok(cache)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Self { conn };
        cache.init()?;
        Ok(cache)
    }

    fn init(&self) -> Result<()> {
        // WAL mode for better concurrent read performance
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS api_responses (
                cache_key   TEXT PRIMARY KEY,
                payload     TEXT NOT NULL,
                fetched_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );
            ",
        )?;
        Ok(())
    }

    /// Look up a cached payload no older than `ttl_days`.
    pub fn get(&self, cache_key: &str, ttl_days: i64) -> Result<Option<String>> {
        let result = self.conn.query_row(
            "SELECT payload FROM api_responses
             WHERE cache_key = ?1
               AND fetched_at > datetime('now', '-' || ?2 || ' days')",
            params![cache_key, ttl_days],
            |row| row.get(0),
        );

        match result {
            Ok(payload) => Ok(Some(payload)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store or refresh a payload under its key.
    pub fn put(&self, cache_key: &str, payload: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO api_responses (cache_key, payload, fetched_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(cache_key) DO UPDATE SET
                payload = excluded.payload,
                fetched_at = excluded.fetched_at",
            params![cache_key, payload],
        )?;
        Ok(())
    }

    /// Number of cached responses.
    pub fn len(&self) -> Result<i64> {
        let count =
            self.conn
                .query_row("SELECT COUNT(*) FROM api_responses", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Drop every cached response. Returns the number removed.
    pub fn clear(&self) -> Result<usize> {
        let removed = self.conn.execute("DELETE FROM api_responses", [])?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let cache = ResponseCache::open_in_memory().unwrap();
        cache.put("audio_features:abc", r#"{"tempo": 120.0}"#).unwrap();

        let hit = cache.get("audio_features:abc", 30).unwrap();
        assert_eq!(hit.as_deref(), Some(r#"{"tempo": 120.0}"#));

        assert!(cache.get("audio_features:missing", 30).unwrap().is_none());
    }

    #[test]
    fn test_put_overwrites() {
        let cache = ResponseCache::open_in_memory().unwrap();
        cache.put("k", "old").unwrap();
        cache.put("k", "new").unwrap();
        assert_eq!(cache.get("k", 30).unwrap().as_deref(), Some("new"));
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn test_expired_entry_misses() {
        let cache = ResponseCache::open_in_memory().unwrap();
        cache.put("k", "v").unwrap();
        // Backdate the entry past any TTL
        cache
            .conn
            .execute(
                "UPDATE api_responses SET fetched_at = datetime('now', '-90 days')",
                [],
            )
            .unwrap();
        assert!(cache.get("k", 30).unwrap().is_none());
        // Still present, just stale
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn test_clear() {
        let cache = ResponseCache::open_in_memory().unwrap();
        cache.put("a", "1").unwrap();
        cache.put("b", "2").unwrap();
        assert_eq!(cache.clear().unwrap(), 2);
        assert_eq!(cache.len().unwrap(), 0);
    }
}
