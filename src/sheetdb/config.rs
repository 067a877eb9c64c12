use crate::error::{Result, SheetDbError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILENAME: &str = "sheetdb.json";
const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// Client configuration, stored in `sheetdb.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SheetDbConfig {
    /// Concurrent row writes per batch
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,

    /// Age after which cached responses are refetched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl_secs: Option<u64>,

    /// Spreadsheet file used by the local backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

fn default_max_in_flight() -> usize {
    DEFAULT_MAX_IN_FLIGHT
}

fn default_cache_enabled() -> bool {
    true
}

impl Default for SheetDbConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            cache_enabled: true,
            cache_ttl_secs: None,
            data_file: None,
            access_token: None,
        }
    }
}

impl SheetDbConfig {
    /// Load config from the given directory, or return defaults if not found
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILENAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).map_err(SheetDbError::Io)?;
        let config: SheetDbConfig =
            serde_json::from_str(&content).map_err(SheetDbError::Serialization)?;
        Ok(config)
    }

    /// Writes allowed in flight at once; never less than one.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.max(1)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = SheetDbConfig::default();
        assert_eq!(config.max_in_flight(), 4);
        assert!(config.cache_enabled);
        assert_eq!(config.cache_ttl(), None);
    }

    #[test]
    fn test_zero_in_flight_means_one() {
        let config = SheetDbConfig {
            max_in_flight: 0,
            ..SheetDbConfig::default()
        };
        assert_eq!(config.max_in_flight(), 1);
    }

    #[test]
    fn test_load_missing_config() {
        let dir = tempdir().unwrap();
        let config = SheetDbConfig::load(dir.path().join("absent")).unwrap();
        assert_eq!(config, SheetDbConfig::default());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILENAME),
            r#"{"cache_ttl_secs": 30}"#,
        )
        .unwrap();
        let config = SheetDbConfig::load(dir.path()).unwrap();
        assert_eq!(config.max_in_flight, 4);
        assert!(config.cache_enabled);
        assert_eq!(config.cache_ttl(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_load_full_config() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILENAME),
            r#"{
                "max_in_flight": 8,
                "cache_enabled": false,
                "cache_ttl_secs": 5,
                "data_file": "/tmp/sheets.json",
                "access_token": "token"
            }"#,
        )
        .unwrap();
        let config = SheetDbConfig::load(dir.path()).unwrap();
        assert_eq!(
            config,
            SheetDbConfig {
                max_in_flight: 8,
                cache_enabled: false,
                cache_ttl_secs: Some(5),
                data_file: Some(PathBuf::from("/tmp/sheets.json")),
                access_token: Some("token".to_string()),
            }
        );
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILENAME), "not json").unwrap();
        assert!(matches!(
            SheetDbConfig::load(dir.path()),
            Err(SheetDbError::Serialization(_))
        ));
    }
}
