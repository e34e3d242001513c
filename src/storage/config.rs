use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Unknown time zone: {0}")]
    InvalidTimeZone(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub google: GoogleConfig,
    pub sync: SyncConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub api_base_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub scope: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    pub time_zone: String,
    pub check_conflicts: bool,
}

/// Event writes, plus read access for `calendars.get` (primary identity) and
/// `freeBusy.query` (conflict checks), which `calendar.events` alone does not grant.
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/calendar.events https://www.googleapis.com/auth/calendar.readonly";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl SyncConfig {
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.time_zone
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimeZone(self.time_zone.clone()))
    }
}

impl GoogleConfig {
    pub fn has_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.sync.tz()?;
        Ok(config)
    }

    pub fn load_or_create() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)
        } else {
            let config = Self::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("exec-schedule")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            google: GoogleConfig {
                client_id: String::new(),
                client_secret: String::new(),
                redirect_uri: "http://localhost:8080".to_string(),
                api_base_url: "https://www.googleapis.com/calendar/v3".to_string(),
                auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_url: "https://oauth2.googleapis.com/token".to_string(),
                scope: DEFAULT_SCOPE.to_string(),
            },
            sync: SyncConfig {
                time_zone: "Asia/Tokyo".to_string(),
                check_conflicts: true,
            },
            storage: StorageConfig {
                database_path: Self::config_dir().join("schedule.db"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_uses_tokyo_time_zone() {
        let config = Config::default();
        assert_eq!(config.sync.tz().unwrap(), chrono_tz::Asia::Tokyo);
    }

    #[test]
    fn default_config_checks_conflicts() {
        assert!(Config::default().sync.check_conflicts);
    }

    #[test]
    fn default_scope_covers_identity_and_free_busy_reads() {
        let binding = Config::default();
        let scopes: Vec<&str> = binding.google.scope.split(' ').map(str::trim).collect();

        assert_eq!(
            scopes,
            vec![
                "https://www.googleapis.com/auth/calendar.events",
                "https://www.googleapis.com/auth/calendar.readonly",
            ]
        );
    }

    #[test]
    fn default_config_has_no_credentials() {
        assert!(!Config::default().google.has_credentials());
    }

    #[test]
    fn parse_valid_toml_config() {
        let toml_content = r#"
            [google]
            client_id = "test_client_id"
            client_secret = "test_secret"
            redirect_uri = "http://localhost:9000"
            api_base_url = "http://localhost:9001"
            auth_url = "http://localhost:9002/auth"
            token_url = "http://localhost:9002/token"
            scope = "calendar"

            [sync]
            time_zone = "Europe/Berlin"
            check_conflicts = false

            [storage]
            database_path = "/tmp/schedule.db"
        "#;

        let config = Config::from_toml(toml_content).unwrap();

        assert_eq!(config.google.client_id, "test_client_id");
        assert_eq!(config.google.api_base_url, "http://localhost:9001");
        assert_eq!(config.sync.tz().unwrap(), chrono_tz::Europe::Berlin);
        assert!(!config.sync.check_conflicts);
        assert_eq!(config.storage.database_path, PathBuf::from("/tmp/schedule.db"));
    }

    #[test]
    fn parse_invalid_toml_returns_error() {
        let result = Config::from_toml("this is not valid toml");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_time_zone_is_rejected() {
        let mut config = Config::default();
        config.sync.time_zone = "Mars/Olympus".to_string();
        let content = toml::to_string_pretty(&config).unwrap();

        let result = Config::from_toml(&content);

        assert!(matches!(result, Err(ConfigError::InvalidTimeZone(_))));
    }

    #[test]
    fn saved_config_can_be_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");
        let config = Config::default();

        config.save_to(&path).unwrap();
        let loaded = Config::from_toml(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(loaded, config);
    }
}
