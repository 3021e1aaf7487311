use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Session persistence configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Whether sessions are backed up and restored at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between periodic backup cycles
    #[serde(default = "default_backup_interval_secs")]
    pub backup_interval_secs: u64,

    /// Key under which the manifest is kept in the session store
    #[serde(default = "default_session_key")]
    pub session_key: String,

    /// Name of the backup folder inside the data directory
    #[serde(default = "default_backup_dir_name")]
    pub backup_dir_name: String,
}

fn default_true() -> bool {
    true
}

fn default_backup_interval_secs() -> u64 {
    7
}

fn default_session_key() -> String {
    "session".to_string()
}

fn default_backup_dir_name() -> String {
    "backups".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            backup_interval_secs: default_backup_interval_secs(),
            session_key: default_session_key(),
            backup_dir_name: default_backup_dir_name(),
        }
    }
}

impl SessionConfig {
    pub fn backup_interval(&self) -> Duration {
        Duration::from_secs(self.backup_interval_secs)
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: SessionConfig =
            serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path.as_ref(), contents).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backup_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "backup_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.session_key.is_empty() {
            return Err(ConfigError::ValidationError(
                "session_key must not be empty".to_string(),
            ));
        }

        if self.backup_dir_name.is_empty()
            || self.backup_dir_name.contains(['/', '\\'])
            || self.backup_dir_name == ".."
        {
            return Err(ConfigError::ValidationError(format!(
                "backup_dir_name must be a plain folder name, got {:?}",
                self.backup_dir_name
            )));
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(msg) => write!(f, "IO error: {msg}"),
            ConfigError::ParseError(msg) => write!(f, "Parse error: {msg}"),
            ConfigError::SerializeError(msg) => write!(f, "Serialize error: {msg}"),
            ConfigError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
