use std::path::{Path, PathBuf};
use std::str::FromStr;

use common::anchor::AnchorConfig;
use common::jobs::OrchestratorConfig;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // misc
    /// default log level, `RUST_LOG` takes precedence when set
    pub log_level: String,

    // identity
    /// on system file path to the PEM encoded account key,
    ///  if not set then a new key will be generated
    pub key_path: Option<PathBuf>,

    // job workers
    pub jobs: OrchestratorConfig,

    // signature rounds and ledger confirmation
    pub anchor: AnchorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            key_path: None,
            jobs: OrchestratorConfig::default(),
            anchor: AnchorConfig::default(),
        }
    }
}

impl Config {
    /// Read a config file; missing settings take their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config_toml = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&config_toml)?;
        config.level()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let config_toml = toml::to_string_pretty(self)?;
        std::fs::write(path, config_toml)?;
        Ok(())
    }

    pub fn level(&self) -> Result<tracing::Level, ConfigError> {
        tracing::Level::from_str(&self.log_level)
            .map_err(|_| ConfigError::InvalidLogLevel(self.log_level.clone()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let mut config = Config::default();
        config.key_path = Some(dir.path().join("key.pem"));
        config.jobs.worker_count = 8;
        config.anchor.quorum = Some(2);
        config.anchor.peer_timeout = Duration::from_millis(1500);
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "log_level = \"debug\"\n\n[anchor]\nquorum = 2\nround_timeout = 5000\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.level().unwrap(), tracing::Level::DEBUG);
        assert_eq!(config.jobs, OrchestratorConfig::default());
        assert_eq!(config.anchor.quorum, Some(2));
        assert_eq!(config.anchor.round_timeout, Duration::from_secs(5));
        assert_eq!(config.anchor.peer_attempts, AnchorConfig::default().peer_attempts);
    }

    #[test]
    fn test_invalid_log_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "log_level = \"loud\"\n").unwrap();

        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::InvalidLogLevel(level)) if level == "loud"
        ));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::load(&dir.path().join(CONFIG_FILE_NAME)),
            Err(ConfigError::Io(_))
        ));
    }
}
