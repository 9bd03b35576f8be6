//! Handles settings for the application. Configuration is written in
//! `budget_zen.toml` next to the working directory.

use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct App {
    pub level: String,
    /// Currency code for new entries (single-currency install).
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct Database {
    pub path: String,
}

/// Remote store wiring; absent means this install never syncs.
#[derive(Debug, Deserialize)]
pub struct Remote {
    pub base_url: String,
    /// Bearer token from the identity provider.
    pub token: String,
    /// Opaque authenticated user id namespacing remote data.
    pub user_id: String,
    pub device_id: String,
    pub timeout_secs: Option<u64>,
    /// Seconds between cycles in watch mode.
    pub period_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: App,
    pub database: Database,
    pub remote: Option<Remote>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .set_default("app.level", "info")?
            .set_default("app.currency", "USD")?
            .set_default("database.path", "./budget_zen.db")?
            .add_source(File::with_name("budget_zen").required(false))
            .build()?;

        settings.try_deserialize()
    }
}
