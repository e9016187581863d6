//! Persistent catalog cache.
//!
//! Keeps loaded schema catalogs so reselecting a connection does not repeat
//! the metadata round trip. The database lives at
//! `<cache_dir>/tessera/catalog.db` and holds one row per connection:
//!
//! ```text
//! catalogs(connection_hash PK, connection_id, field_count, payload, loaded_at)
//! ```
//!
//! Entries never expire on their own; a refresh replaces them. The layout
//! version is tracked in `PRAGMA user_version` and a mismatch drops every
//! stored catalog.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::catalog::SchemaCatalog;

/// Bump when the stored catalog layout changes.
const LAYOUT_VERSION: i64 = 2;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("catalog cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("catalog payload is not valid: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("no per-user cache directory on this platform")]
    NoCacheDir,

    #[error("cannot create cache directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// One stored catalog, as listed by [`CatalogCache::entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCatalog {
    pub connection_id: String,
    pub field_count: usize,
    /// Seconds since the Unix epoch.
    pub loaded_at: i64,
}

pub struct CatalogCache {
    conn: Connection,
}

impl CatalogCache {
    /// Open the cache at the platform default location.
    pub fn open() -> CacheResult<Self> {
        Self::open_at(&Self::default_path()?)
    }

    pub fn open_at(path: &Path) -> CacheResult<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        Self::prepare(Connection::open(path)?)
    }

    pub fn open_in_memory() -> CacheResult<Self> {
        Self::prepare(Connection::open_in_memory()?)
    }

    pub fn default_path() -> CacheResult<PathBuf> {
        dirs::cache_dir()
            .map(|base| base.join("tessera").join("catalog.db"))
            .ok_or(CacheError::NoCacheDir)
    }

    fn prepare(conn: Connection) -> CacheResult<Self> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version != LAYOUT_VERSION {
            if version != 0 {
                tracing::info!(stored = version, current = LAYOUT_VERSION, "catalog cache layout changed, dropping entries");
            }
            conn.execute_batch("DROP TABLE IF EXISTS catalogs;")?;
            conn.pragma_update(None, "user_version", LAYOUT_VERSION)?;
        }
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS catalogs (
                connection_hash TEXT PRIMARY KEY,
                connection_id   TEXT NOT NULL,
                field_count     INTEGER NOT NULL,
                payload         TEXT NOT NULL,
                loaded_at       INTEGER NOT NULL
            );",
        )?;
        Ok(Self { conn })
    }

    pub fn get_catalog(&self, connection_id: &str) -> CacheResult<Option<SchemaCatalog>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM catalogs WHERE connection_hash = ?1",
                params![connection_key(connection_id)],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p))
            .transpose()
            .map_err(CacheError::from)
    }

    /// Store or replace the catalog for its connection.
    pub fn put_catalog(&self, catalog: &SchemaCatalog) -> CacheResult<()> {
        let payload = serde_json::to_string(catalog)?;
        self.conn.execute(
            "INSERT INTO catalogs (connection_hash, connection_id, field_count, payload, loaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(connection_hash) DO UPDATE SET
                field_count = excluded.field_count,
                payload = excluded.payload,
                loaded_at = excluded.loaded_at",
            params![
                connection_key(catalog.connection_id()),
                catalog.connection_id(),
                catalog.len() as i64,
                payload,
                unix_now(),
            ],
        )?;
        Ok(())
    }

    /// Returns true if a catalog was stored for the connection.
    pub fn invalidate(&self, connection_id: &str) -> CacheResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM catalogs WHERE connection_hash = ?1",
            params![connection_key(connection_id)],
        )?;
        Ok(removed > 0)
    }

    pub fn clear(&self) -> CacheResult<usize> {
        Ok(self.conn.execute("DELETE FROM catalogs", [])?)
    }

    /// Stored catalogs ordered by connection id.
    pub fn entries(&self) -> CacheResult<Vec<CachedCatalog>> {
        let mut stmt = self.conn.prepare(
            "SELECT connection_id, field_count, loaded_at FROM catalogs ORDER BY connection_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CachedCatalog {
                connection_id: row.get(0)?,
                field_count: row.get::<_, i64>(1)? as usize,
                loaded_at: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

/// Hex SHA-256 of the connection id. Connection ids may carry credentials
/// so they are never used as the key directly.
pub fn connection_key(connection_id: &str) -> String {
    format!("{:x}", Sha256::digest(connection_id.as_bytes()))
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
