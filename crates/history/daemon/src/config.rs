//! Configuration for historyd

use history_engine::HistoryConfig;
use serde::{Deserialize, Serialize};

/// Main daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Shard served by this process
    #[serde(default = "default_shard_id")]
    pub shard_id: u32,

    /// Identity written into the shard row on acquisition
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Engine configuration
    #[serde(default)]
    pub history: HistoryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            shard_id: default_shard_id(),
            owner: default_owner(),
            history: HistoryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_shard_id() -> u32 {
    1
}

fn default_owner() -> String {
    "historyd".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from defaults, an optional file and `HISTORY_` variables.
    ///
    /// Nested keys use a double underscore:
    /// `HISTORY_HISTORY__TRANSFER__BATCH_SIZE=50`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("HISTORY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.shard_id, 1);
        assert_eq!(config.owner, "historyd");
        assert_eq!(config.logging.level, "info");
        assert!(config.history.transfer.worker_count > 0);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = DaemonConfig::load(None).unwrap();
        assert_eq!(config.history.retry.max_attempts, HistoryConfig::default().retry.max_attempts);
    }

    #[test]
    fn test_file_overrides_nested_values() {
        let dir = std::env::temp_dir().join(format!("historyd-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("historyd.json");
        std::fs::write(
            &path,
            r#"{ "shard_id": 7, "history": { "transfer": { "batch_size": 5 } } }"#,
        )
        .unwrap();

        let config = DaemonConfig::load(path.to_str()).unwrap();
        assert_eq!(config.shard_id, 7);
        assert_eq!(config.history.transfer.batch_size, 5);
        assert_eq!(
            config.history.timer.batch_size,
            HistoryConfig::default().timer.batch_size
        );
        std::fs::remove_dir_all(&dir).ok();
    }
}
