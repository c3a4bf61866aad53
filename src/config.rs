use anyhow::Context;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Names the TOML file read on top of the defaults.
pub const CONFIG_PATH_VAR: &str = "MULTISITE_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "multisite.toml";
const ENV_PREFIX: &str = "MULTISITE_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite catalog database.
    pub database_path: PathBuf,
    /// User the hooks act for; actions only answer this user's events.
    pub api_user: String,
    /// YAML template declaring disk locations.
    pub locations_config: PathBuf,
    /// Directory appended to the event plugin path of launched processes.
    pub plugin_path: PathBuf,
    /// `.env` file at the plugin root, loaded before the S3 settings are read.
    pub env_file: PathBuf,
    /// Re-read every copied resource and compare hashes.
    pub verify_transfers: bool,
    pub verbose: bool,
    pub json_logs: bool,
    /// Use a seeded in-memory catalog and scratch disk locations.
    pub simulation: bool,
}

fn app_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(|| PathBuf::from(".")).join("multisite")
}

impl Default for AppConfig {
    fn default() -> Self {
        let data = app_dir(dirs::data_dir());
        let config = app_dir(dirs::config_dir());
        Self {
            database_path: data.join("catalog.db"),
            api_user: whoami::username(),
            locations_config: config.join("disk_locations.yaml"),
            plugin_path: data.join("hook").join("locations"),
            env_file: data.join(".env"),
            verify_transfers: true,
            verbose: false,
            json_logs: false,
            simulation: false,
        }
    }
}

impl AppConfig {
    /// Layer defaults, the TOML file, `MULTISITE_*` variables and finally
    /// whatever the command line set.
    pub fn new<T: Serialize>(args: Option<&T>) -> anyhow::Result<Self> {
        Self::figment(args)
            .extract()
            .context("Failed to load configuration")
    }

    pub fn figment<T: Serialize>(args: Option<&T>) -> Figment {
        let file = std::env::var(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["CONFIG"]));

        match args {
            Some(args) => figment.merge(Serialized::defaults(args)),
            None => figment,
        }
    }
}
