//! TOML-based configuration for Tessera.
//!
//! Supports a config file (tessera.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [connections.sales]
//! driver = "postgres"
//! connection_string = "${SALES_DB_URL}"
//! display_name = "Sales warehouse"
//!
//! [worker]
//! path = "./tessera-worker"
//! timeout_secs = 30
//!
//! [query]
//! default_page_size = 50
//!
//! [dashboard]
//! autosave_delay_ms = 1500
//! palette = ["#4e79a7", "#f28e2b", "#e15759"]
//!
//! [export]
//! delimiter = ";"
//!
//! [logging]
//! filter = "tessera=debug"
//! ```

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::connection::Driver;

/// Environment override for the settings file location.
pub const CONFIG_ENV: &str = "TESSERA_CONFIG";

static ENV_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:\{([^}]*)\}|([A-Za-z0-9_]+))").expect("valid variable pattern")
});

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings file {} does not exist", .0.display())]
    FileNotFound(PathBuf),

    #[error("cannot read settings file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("settings file is not valid TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("environment variable {0} is referenced but not set")]
    MissingEnvVar(String),

    #[error("no connection named '{0}'")]
    ConnectionNotFound(String),

    #[error("driver '{0}' is not supported")]
    UnsupportedDriver(String),

    #[error("{0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Named data connections.
    pub connections: HashMap<String, ConnectionSettings>,

    /// External executor worker.
    pub worker: WorkerSettings,

    /// Report builder defaults.
    pub query: QuerySettings,

    /// Dashboard behavior.
    pub dashboard: DashboardSettings,

    /// Export options.
    pub export: ExportSettings,

    /// Document store location.
    pub storage: StorageSettings,

    /// Schema catalog caching.
    pub catalog: CatalogSettings,

    /// Log filter for the binary.
    pub logging: LoggingSettings,
}

/// A configured data connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionSettings {
    /// Driver name (postgres, mysql, mssql, duckdb, sqlite).
    pub driver: String,

    /// May reference `${VAR}` or `$VAR`; resolved when the connection is used.
    pub connection_string: String,

    /// Name shown in the connection selector.
    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub default_schema: Option<String>,
}

impl ConnectionSettings {
    pub fn driver_type(&self) -> Result<Driver, SettingsError> {
        self.driver
            .parse()
            .map_err(|_| SettingsError::UnsupportedDriver(self.driver.clone()))
    }

    pub fn resolved_connection_string(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.connection_string)
    }
}

/// Worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Path to the executor worker binary.
    pub path: Option<String>,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            path: None,
            timeout_secs: 30,
        }
    }
}

/// Report builder defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Rows per result page.
    pub default_page_size: u32,

    /// Pages shown on each side of the current page in pagination links.
    pub page_window: u32,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_page_size: 25,
            page_window: 2,
        }
    }
}

/// Dashboard configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DashboardSettings {
    /// Debounce delay before a layout change is saved.
    pub autosave_delay_ms: u64,

    /// Number of grid columns.
    pub grid_columns: u32,

    /// Chart colors, assigned cyclically.
    pub palette: Vec<String>,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            autosave_delay_ms: 1500,
            grid_columns: 12,
            palette: default_palette(),
        }
    }
}

impl DashboardSettings {
    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_delay_ms)
    }
}

/// The built-in chart palette.
pub fn default_palette() -> Vec<String> {
    [
        "#4e79a7", "#f28e2b", "#e15759", "#76b7b2", "#59a14f", "#edc948", "#b07aa1", "#ff9da7",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

/// Export configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Field delimiter for data export (single ASCII character).
    pub delimiter: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            delimiter: ",".to_string(),
        }
    }
}

impl ExportSettings {
    /// The delimiter as a byte, as required by the CSV writer.
    pub fn delimiter_byte(&self) -> Result<u8, SettingsError> {
        match self.delimiter.as_bytes() {
            [b] if b.is_ascii() => Ok(*b),
            _ => Err(SettingsError::InvalidConfig(format!(
                "export.delimiter must be a single ASCII character, got '{}'",
                self.delimiter
            ))),
        }
    }
}

/// Document store configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Path of the SQLite document store.
    pub path: Option<String>,
}

impl StorageSettings {
    /// Resolve the store path, defaulting to the user's data directory.
    pub fn database_path(&self) -> Result<PathBuf, SettingsError> {
        if let Some(path) = &self.path {
            return Ok(PathBuf::from(expand_env_vars(path)?));
        }
        dirs::data_dir()
            .map(|dir| dir.join("tessera").join("tessera.db"))
            .ok_or_else(|| SettingsError::InvalidConfig("no data directory available".into()))
    }
}

/// Catalog cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// Cache schema catalogs between sessions.
    pub cache_enabled: bool,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing-subscriber` env-filter directive.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SettingsError::FileNotFound(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parse settings from TOML text and check cross-field constraints.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.export.delimiter_byte()?;
        if settings.query.default_page_size == 0 {
            return Err(SettingsError::InvalidConfig(
                "query.default_page_size must be positive".into(),
            ));
        }
        Ok(settings)
    }

    /// Load from `$TESSERA_CONFIG`, else the first existing of
    /// `./tessera.toml` and `<config dir>/tessera/config.toml`, else defaults.
    /// An explicit `$TESSERA_CONFIG` must exist.
    pub fn load() -> Result<Self, SettingsError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }
        let user = dirs::config_dir().map(|dir| dir.join("tessera").join("config.toml"));
        match std::iter::once(PathBuf::from("tessera.toml"))
            .chain(user)
            .find(|candidate| candidate.is_file())
        {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading settings");
                Self::from_file(path)
            }
            None => Ok(Settings::default()),
        }
    }

    /// Get a connection by id.
    pub fn get_connection(&self, id: &str) -> Result<&ConnectionSettings, SettingsError> {
        self.connections
            .get(id)
            .ok_or_else(|| SettingsError::ConnectionNotFound(id.to_string()))
    }

    /// The connection named "default" if there is one, otherwise the
    /// lowest id.
    pub fn default_connection(&self) -> Option<(&str, &ConnectionSettings)> {
        self.connections
            .get_key_value("default")
            .or_else(|| self.connections.iter().min_by_key(|(id, _)| id.as_str()))
            .map(|(id, conn)| (id.as_str(), conn))
    }

    /// Locate the worker binary: configured path first, then well-known names.
    pub fn worker_path(&self) -> Option<PathBuf> {
        if let Some(configured) = &self.worker.path {
            return expand_env_vars(configured).ok().map(PathBuf::from);
        }

        ["./tessera-worker", "./worker/tessera-worker"]
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_secs(self.worker.timeout_secs)
    }
}

/// Substitute `${VAR}` and `$VAR` references from the environment.
/// A `$` not followed by a name is kept.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    if s.match_indices("${").any(|(open, _)| !s[open..].contains('}')) {
        return Err(SettingsError::InvalidConfig(format!(
            "unterminated variable reference in '{}'",
            s
        )));
    }

    let mut expanded = String::with_capacity(s.len());
    let mut last = 0;
    for caps in ENV_REFERENCE.captures_iter(s) {
        let Some(whole) = caps.get(0) else { continue };
        let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        expanded.push_str(&s[last..whole.start()]);
        if name.is_empty() {
            expanded.push_str(whole.as_str());
        } else {
            let value = env::var(name).map_err(|_| SettingsError::MissingEnvVar(name.to_string()))?;
            expanded.push_str(&value);
        }
        last = whole.end();
    }
    expanded.push_str(&s[last..]);
    Ok(expanded)
}
