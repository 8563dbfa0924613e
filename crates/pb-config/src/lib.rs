//! # pb-config
//!
//! Process-level settings for the pressure-bot binary.
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. `config/default.*` then `config/local.*` (any format `config` understands)
//! 3. `PRESSURE_BOT__SECTION__KEY` environment variables (a `.env` file is
//!    loaded into the environment first)
//!
//! Per-community pressure coefficients are not here; they live in the
//! configuration store.

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

pub const ENV_PREFIX: &str = "PRESSURE_BOT";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting {0}: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub ledger: LedgerSettings,
    pub dispatch: DispatchSettings,
    pub intake: IntakeSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    /// Communities registered with default settings at startup
    pub seed_communities: Vec<u64>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite:pressure_bot.db".to_string(),
            max_connections: 5,
            seed_communities: Vec::new(),
        }
    }
}

/// Eviction of idle per-user pressure state.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    pub idle_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 3600,
            sweep_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Notices beyond this many undelivered ones are dropped
    pub queue_capacity: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self { queue_capacity: 1024 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntakeSettings {
    /// Parallel event-processing workers
    pub shards: usize,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self { shards: 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directives, overridden by `RUST_LOG`
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Settings {
    /// Loads `.env`, the config directory and the environment.
    pub fn load() -> Result<Self, SettingsError> {
        dotenvy::dotenv().ok();

        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("database.seed_communities"),
            );

        Self::from_config(builder.build()?)
    }

    pub fn from_config(config: Config) -> Result<Self, SettingsError> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.database.max_connections == 0 {
            return Err(SettingsError::Invalid("database.max_connections", "must be at least 1".into()));
        }
        if self.ledger.idle_ttl_secs == 0 {
            return Err(SettingsError::Invalid("ledger.idle_ttl_secs", "must be at least 1".into()));
        }
        if self.ledger.sweep_interval_secs == 0 {
            return Err(SettingsError::Invalid("ledger.sweep_interval_secs", "must be at least 1".into()));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(SettingsError::Invalid("dispatch.queue_capacity", "must be at least 1".into()));
        }
        if self.intake.shards == 0 {
            return Err(SettingsError::Invalid("intake.shards", "must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<Settings, SettingsError> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Settings::from_config(config)
    }

    #[test]
    fn test_empty_sources_yield_defaults() {
        let settings = from_toml("").unwrap();
        assert_eq!(settings.database.url, "sqlite:pressure_bot.db");
        assert_eq!(settings.ledger.idle_ttl_secs, 3600);
        assert_eq!(settings.dispatch.queue_capacity, 1024);
        assert_eq!(settings.intake.shards, 1);
        assert_eq!(settings.log.format, LogFormat::Pretty);
    }

    #[test]
    fn test_partial_override() {
        let settings = from_toml(
            r#"
            [database]
            url = "sqlite::memory:"
            seed_communities = [1, 2]

            [log]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(settings.database.url, "sqlite::memory:");
        assert_eq!(settings.database.max_connections, 5);
        assert_eq!(settings.database.seed_communities, vec![1, 2]);
        assert_eq!(settings.log.format, LogFormat::Json);
        assert_eq!(settings.log.filter, "info");
    }

    #[test]
    fn test_zero_shards_rejected() {
        let err = from_toml("[intake]\nshards = 0").unwrap_err();
        assert!(matches!(err, SettingsError::Invalid("intake.shards", _)));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let err = from_toml("[ledger]\nidle_ttl_secs = 0").unwrap_err();
        assert!(matches!(err, SettingsError::Invalid("ledger.idle_ttl_secs", _)));
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        assert!(matches!(
            from_toml("[log]\nformat = \"xml\"").unwrap_err(),
            SettingsError::Load(_)
        ));
    }
}
