//! SQLite document store for reports, share grants and dashboards.
//!
//! # Tables
//!
//! ```text
//! reports        id, name, description, owner_id, definition (JSON)
//! report_grants  report_id, grantee_id, tier
//! dashboards     id, document (JSON), revision
//! meta           key, value   ('version')
//! ```

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{DashboardConfigStore, PersistenceError, PersistenceResult};
use crate::dashboard::DashboardDocument;
use crate::reports::{PermissionTier, ReportRecord, ReportStore, ShareGrant};

/// Current store schema version.
const STORE_VERSION: i32 = 1;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the store at `path`.
    pub fn open(path: &Path) -> PersistenceResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        }
        let store = Self {
            conn: Mutex::new(Connection::open(path)?),
        };
        store.init()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> PersistenceResult<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init()?;
        Ok(store)
    }

    fn lock(&self) -> PersistenceResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PersistenceError::Storage("store lock poisoned".to_string()))
    }

    fn init(&self) -> PersistenceResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reports (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                owner_id TEXT NOT NULL,
                definition TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS reports_owner ON reports (owner_id);

            CREATE TABLE IF NOT EXISTS report_grants (
                report_id TEXT NOT NULL REFERENCES reports (id) ON DELETE CASCADE,
                grantee_id TEXT NOT NULL,
                tier TEXT NOT NULL,
                PRIMARY KEY (report_id, grantee_id)
            );

            CREATE TABLE IF NOT EXISTS dashboards (
                id TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                revision INTEGER NOT NULL
            );
            ",
        )?;

        let stored_version: Option<i32> = conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                let s: String = row.get(0)?;
                Ok(s.parse().unwrap_or(0))
            })
            .optional()?;

        match stored_version {
            Some(v) if v == STORE_VERSION => Ok(()),
            Some(v) => Err(PersistenceError::Storage(format!(
                "store version {} is not supported (expected {})",
                v, STORE_VERSION
            ))),
            None => {
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES ('version', ?)",
                    params![STORE_VERSION.to_string()],
                )?;
                Ok(())
            }
        }
    }

    fn report_from_row(row: &Row<'_>) -> rusqlite::Result<(ReportRecord, String)> {
        let definition: String = row.get(4)?;
        Ok((
            ReportRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                owner_id: row.get(3)?,
                definition: Default::default(),
            },
            definition,
        ))
    }

    fn decode_report((mut record, definition): (ReportRecord, String)) -> PersistenceResult<ReportRecord> {
        record.definition = serde_json::from_str(&definition)?;
        Ok(record)
    }

    fn grant_from_row(row: &Row<'_>) -> rusqlite::Result<(String, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
    }

    fn decode_grant((report_id, grantee_id, tier): (String, String, String)) -> PersistenceResult<ShareGrant> {
        let tier = PermissionTier::parse(&tier)
            .ok_or_else(|| PersistenceError::Serialization(format!("unknown tier '{}'", tier)))?;
        Ok(ShareGrant {
            report_id,
            grantee_id,
            tier,
        })
    }

    fn query_grants(&self, sql: &str, key: &str) -> PersistenceResult<Vec<ShareGrant>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![key], Self::grant_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(Self::decode_grant).collect()
    }

    /// Number of stored dashboards.
    pub fn dashboard_count(&self) -> PersistenceResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM dashboards", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl ReportStore for SqliteStore {
    async fn insert(&self, report: &ReportRecord) -> PersistenceResult<()> {
        let definition = serde_json::to_string(&report.definition)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO reports (id, name, description, owner_id, definition) VALUES (?, ?, ?, ?, ?)",
            params![report.id, report.name, report.description, report.owner_id, definition],
        )?;
        Ok(())
    }

    async fn update(&self, report: &ReportRecord) -> PersistenceResult<()> {
        let definition = serde_json::to_string(&report.definition)?;
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE reports SET name = ?, description = ?, definition = ? WHERE id = ?",
            params![report.name, report.description, definition, report.id],
        )?;
        if rows == 0 {
            return Err(PersistenceError::NotFound(format!("report {}", report.id)));
        }
        Ok(())
    }

    async fn get(&self, report_id: &str) -> PersistenceResult<Option<ReportRecord>> {
        let row = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT id, name, description, owner_id, definition FROM reports WHERE id = ?",
                params![report_id],
                Self::report_from_row,
            )
            .optional()?
        };
        row.map(Self::decode_report).transpose()
    }

    async fn delete(&self, report_id: &str) -> PersistenceResult<bool> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM reports WHERE id = ?", params![report_id])?;
        Ok(rows > 0)
    }

    async fn list_owned(&self, owner_id: &str) -> PersistenceResult<Vec<ReportRecord>> {
        let rows = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(
                "SELECT id, name, description, owner_id, definition FROM reports
                 WHERE owner_id = ? ORDER BY name, id",
            )?;
            let rows = stmt
                .query_map(params![owner_id], Self::report_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        rows.into_iter().map(Self::decode_report).collect()
    }

    async fn grant(&self, grant: &ShareGrant) -> PersistenceResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO report_grants (report_id, grantee_id, tier) VALUES (?, ?, ?)",
            params![grant.report_id, grant.grantee_id, grant.tier.as_str()],
        )?;
        Ok(())
    }

    async fn grants_for_report(&self, report_id: &str) -> PersistenceResult<Vec<ShareGrant>> {
        self.query_grants(
            "SELECT report_id, grantee_id, tier FROM report_grants WHERE report_id = ? ORDER BY grantee_id",
            report_id,
        )
    }

    async fn shared_with(&self, user_id: &str) -> PersistenceResult<Vec<ShareGrant>> {
        self.query_grants(
            "SELECT report_id, grantee_id, tier FROM report_grants WHERE grantee_id = ? ORDER BY report_id",
            user_id,
        )
    }
}

#[async_trait]
impl DashboardConfigStore for SqliteStore {
    async fn load(&self, dashboard_id: &str) -> PersistenceResult<DashboardDocument> {
        let json: Option<String> = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT document FROM dashboards WHERE id = ?",
                params![dashboard_id],
                |row| row.get(0),
            )
            .optional()?
        };
        match json {
            Some(s) => Ok(serde_json::from_str(&s)?),
            None => Err(PersistenceError::NotFound(format!("dashboard {}", dashboard_id))),
        }
    }

    async fn save(&self, document: &DashboardDocument) -> PersistenceResult<u64> {
        let json = serde_json::to_string(document)?;
        let conn = self.lock()?;
        let revision: i64 = conn.query_row(
            "INSERT INTO dashboards (id, document, revision) VALUES (?1, ?2, 1)
             ON CONFLICT (id) DO UPDATE SET document = excluded.document, revision = revision + 1
             RETURNING revision",
            params![document.id, json],
            |row| row.get(0),
        )?;
        Ok(revision as u64)
    }
}
