// Layered configuration: mactrack.toml, then MACTRACK_* environment
// variables, then command line flags.

use std::time::Duration;

use clap::{Args, ValueEnum};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::TrackerError;
use crate::inventory::Switch;

pub(crate) const CONFIG_FILE: &str = "mactrack.toml";
pub(crate) const ENV_PREFIX: &str = "MACTRACK_";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// sea-orm over SQLite or PostgreSQL
    #[default]
    Relational,
    /// MongoDB
    Document,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub backend: Backend,
    pub database_url: String,
    pub mongo_uri: Option<String>,
    pub mongo_database: String,
    pub log_file: String,
    pub log_level: log::LevelFilter,
    pub snmp_community: String,
    pub snmp_timeout_secs: u64,
    pub snmp_command: String,
    pub workers: usize,
    pub netbox_url: Option<String>,
    pub netbox_token: Option<String>,
    pub switches: Vec<Switch>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: Backend::Relational,
            database_url: "sqlite://mactrack.db?mode=rwc".to_string(),
            mongo_uri: None,
            mongo_database: "mactrack".to_string(),
            log_file: "mactrack.log".to_string(),
            log_level: log::LevelFilter::Info,
            snmp_community: "public".to_string(),
            snmp_timeout_secs: 30,
            snmp_command: "snmpbulkwalk".to_string(),
            workers: 4,
            netbox_url: None,
            netbox_token: None,
            switches: Vec::new(),
        }
    }
}

/// Flags that override the file and environment.
#[derive(Clone, Debug, Default, Args, Serialize, Deserialize)]
pub struct Overrides {
    /// Storage backend
    #[arg(long, value_enum)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,

    /// sea-orm database URL (sqlite:// or postgres://)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// MongoDB connection string
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mongo_uri: Option<String>,

    /// Path of the append-only run log
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,

    /// Maximum concurrent switch scans
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

impl Config {
    pub fn load(overrides: &Overrides) -> Result<Config, TrackerError> {
        Self::figment(overrides)
            .extract::<Config>()
            .map_err(|e| TrackerError::Config(e.to_string()))?
            .validated()
    }

    fn figment(overrides: &Overrides) -> Figment {
        // Start with defaults, then the toml configuration file.
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(CONFIG_FILE))
            // Override with anything set in environment variables.
            .merge(Env::prefixed(ENV_PREFIX))
            // Override with anything set via flags.
            .merge(Serialized::defaults(overrides))
    }

    fn validated(self) -> Result<Config, TrackerError> {
        if self.backend == Backend::Document && self.mongo_uri.is_none() {
            return Err(TrackerError::Config(
                "backend \"document\" requires mongo_uri".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(TrackerError::Config("workers must be at least 1".to_string()));
        }
        if self.netbox_url.is_some() != self.netbox_token.is_some() {
            return Err(TrackerError::Config(
                "netbox_url and netbox_token must be set together".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.snmp_timeout_secs)
    }
}
