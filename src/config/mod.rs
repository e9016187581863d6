//! Configuration module for Tessera.
//!
//! Handles the TOML settings file and the connection registry built from it.

mod connection;
mod settings;

pub use connection::{ConnectionError, ConnectionInfo, ConnectionRegistry, Driver, SettingsRegistry};
pub use settings::{
    default_palette, expand_env_vars, CatalogSettings, ConnectionSettings, DashboardSettings,
    ExportSettings, LoggingSettings, QuerySettings, Settings, SettingsError, StorageSettings,
    WorkerSettings,
};
