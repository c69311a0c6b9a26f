//! Server configuration

use eis_analysis::AnalyticsConfig;
use eis_core::{EisError, EisResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::session::DEFAULT_MAX_ACCEPTED_SAMPLES;

/// Top-level configuration of the `eis-server` binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Analyzer thresholds
    pub analytics: AnalyticsConfig,
    /// Root directory of the per-session output tree
    pub data_root: PathBuf,
    /// Accepted-sample cap per session
    pub max_accepted_samples: usize,
    /// Capacity of the event broadcast channel
    pub event_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            analytics: AnalyticsConfig::default(),
            data_root: PathBuf::from("./data"),
            max_accepted_samples: DEFAULT_MAX_ACCEPTED_SAMPLES,
            event_buffer: 256,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> EisResult<()> {
        self.analytics.validate()?;

        if self.max_accepted_samples == 0 {
            return Err(EisError::Configuration {
                message: "max_accepted_samples must be greater than 0".to_string(),
            });
        }

        if self.event_buffer == 0 {
            return Err(EisError::Configuration {
                message: "event_buffer must be greater than 0".to_string(),
            });
        }

        if self.data_root.as_os_str().is_empty() {
            return Err(EisError::Configuration {
                message: "data_root must not be empty".to_string(),
            });
        }

        Ok(())
    }

    pub fn to_json(&self) -> EisResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| EisError::Configuration {
            message: format!("Failed to serialize configuration: {}", e),
        })
    }

    pub fn from_json(json: &str) -> EisResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| EisError::Configuration {
            message: format!("Failed to deserialize configuration: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults when no path is given; a given path must be readable and valid
    pub fn load(path: Option<&Path>) -> EisResult<Self> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .map_err(|e| EisError::io(format!("reading {}", path.display()), &e))?;
                Self::from_json(&json)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_accepted_samples, 28);
        assert_eq!(config.data_root, PathBuf::from("./data"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ServerConfig::default();
        config.max_accepted_samples = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.analytics.deviation_percent = 0.0;
        assert_eq!(config.validate().unwrap_err().code(), "invalid-configuration");
    }

    #[test]
    fn test_json_serialization() {
        let config = ServerConfig::default();
        let json = config.to_json().unwrap();
        assert_eq!(ServerConfig::from_json(&json).unwrap(), config);

        let partial = ServerConfig::from_json(
            r#"{"data_root": "/srv/eis", "analytics": {"V_threshold": 0.005}}"#,
        )
        .unwrap();
        assert_eq!(partial.data_root, PathBuf::from("/srv/eis"));
        assert_eq!(partial.analytics.voltage_threshold, 0.005);
        assert_eq!(partial.analytics.impedance_threshold, 0.01);
        assert_eq!(partial.event_buffer, 256);
    }

    #[test]
    fn test_load() {
        assert_eq!(ServerConfig::load(None).unwrap(), ServerConfig::default());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        std::fs::write(&path, r#"{"max_accepted_samples": 10}"#).unwrap();
        assert_eq!(ServerConfig::load(Some(&path)).unwrap().max_accepted_samples, 10);

        let err = ServerConfig::load(Some(&dir.path().join("missing.json"))).unwrap_err();
        assert_eq!(err.code(), "io-error");
    }
}
