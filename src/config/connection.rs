//! Connection registry.
//!
//! Lists and describes the data connections a user can pick from. Secrets
//! never leave this module: [`ConnectionInfo`] carries no connection string.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::settings::Settings;

/// Error type for connection configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Unsupported driver: {0}. Supported: postgres, mysql, mssql, duckdb, sqlite")]
    UnsupportedDriver(String),
}

/// Supported database drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Postgres,
    MySql,
    /// Microsoft SQL Server
    MsSql,
    DuckDb,
    Sqlite,
}

impl FromStr for Driver {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Driver::Postgres),
            "mysql" | "mariadb" => Ok(Driver::MySql),
            "mssql" | "sqlserver" | "sql_server" => Ok(Driver::MsSql),
            "duckdb" | "duck" => Ok(Driver::DuckDb),
            "sqlite" | "sqlite3" => Ok(Driver::Sqlite),
            other => Err(ConnectionError::UnsupportedDriver(other.to_string())),
        }
    }
}

impl Driver {
    /// Driver name understood by the worker.
    pub fn as_str(&self) -> &'static str {
        match self {
            Driver::Postgres => "postgres",
            Driver::MySql => "mysql",
            Driver::MsSql => "mssql",
            Driver::DuckDb => "duckdb",
            Driver::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public description of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub id: String,
    pub driver: Driver,
    pub display_name: String,
    pub default_schema: Option<String>,
}

/// Lists and describes available data connections.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// All connections the user may select, ordered by id.
    async fn list(&self) -> Vec<ConnectionInfo>;

    /// Describe a single connection.
    async fn describe(&self, id: &str) -> Option<ConnectionInfo>;
}

/// Registry backed by the `[connections]` table of the settings.
#[derive(Debug, Clone, Default)]
pub struct SettingsRegistry {
    connections: Vec<ConnectionInfo>,
}

impl SettingsRegistry {
    /// Build the registry, skipping entries with an unsupported driver.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut connections: Vec<ConnectionInfo> = settings
            .connections
            .iter()
            .filter_map(|(id, conn)| match conn.driver_type() {
                Ok(driver) => Some(ConnectionInfo {
                    id: id.clone(),
                    driver,
                    display_name: conn.display_name.clone().unwrap_or_else(|| id.clone()),
                    default_schema: conn.default_schema.clone(),
                }),
                Err(e) => {
                    tracing::warn!(connection = %id, error = %e, "skipping connection");
                    None
                }
            })
            .collect();
        connections.sort_by(|a, b| a.id.cmp(&b.id));
        Self { connections }
    }
}

#[async_trait]
impl ConnectionRegistry for SettingsRegistry {
    async fn list(&self) -> Vec<ConnectionInfo> {
        self.connections.clone()
    }

    async fn describe(&self, id: &str) -> Option<ConnectionInfo> {
        self.connections.iter().find(|c| c.id == id).cloned()
    }
}
