//! Configuration for the streaming analyzers

use eis_core::{EisError, EisResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Default |ΔV| threshold in volts
pub const DEFAULT_VOLTAGE_THRESHOLD: f64 = 0.001;
/// Default |ΔZ| threshold in ohm
pub const DEFAULT_IMPEDANCE_THRESHOLD: f64 = 0.01;
/// Default half-width of the out-of-band window, percent of the running mean
pub const DEFAULT_DEVIATION_PERCENT: f64 = 25.0;

/// Thresholds shared by the voltage and impedance analyzers
///
/// The keys of the legacy application settings (`V_threshold`,
/// `Z_threshold`, `DeviationPercent`) are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Voltage spike threshold (V)
    #[serde(alias = "V_threshold")]
    pub voltage_threshold: f64,
    /// Impedance jump threshold (Ω)
    #[serde(alias = "Z_threshold")]
    pub impedance_threshold: f64,
    /// Out-of-band window around the running mean (%)
    #[serde(alias = "DeviationPercent")]
    pub deviation_percent: f64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            voltage_threshold: DEFAULT_VOLTAGE_THRESHOLD,
            impedance_threshold: DEFAULT_IMPEDANCE_THRESHOLD,
            deviation_percent: DEFAULT_DEVIATION_PERCENT,
        }
    }
}

impl AnalyticsConfig {
    pub fn with_voltage_threshold(mut self, threshold: f64) -> Self {
        self.voltage_threshold = threshold;
        self
    }

    pub fn with_impedance_threshold(mut self, threshold: f64) -> Self {
        self.impedance_threshold = threshold;
        self
    }

    pub fn with_deviation_percent(mut self, percent: f64) -> Self {
        self.deviation_percent = percent;
        self
    }

    /// `(1 - d, 1 + d)` multipliers applied to the running mean
    pub fn band_factors(&self) -> (f64, f64) {
        let d = self.deviation_percent / 100.0;
        (1.0 - d, 1.0 + d)
    }

    /// Validate thresholds
    pub fn validate(&self) -> EisResult<()> {
        if !self.voltage_threshold.is_finite() || self.voltage_threshold < 0.0 {
            return Err(EisError::Configuration {
                message: format!(
                    "Voltage threshold must be a non-negative number, got {}",
                    self.voltage_threshold
                ),
            });
        }

        if !self.impedance_threshold.is_finite() || self.impedance_threshold < 0.0 {
            return Err(EisError::Configuration {
                message: format!(
                    "Impedance threshold must be a non-negative number, got {}",
                    self.impedance_threshold
                ),
            });
        }

        if !(self.deviation_percent > 0.0 && self.deviation_percent < 100.0) {
            return Err(EisError::Configuration {
                message: format!(
                    "Deviation percent must be in (0, 100), got {}",
                    self.deviation_percent
                ),
            });
        }

        Ok(())
    }

    /// Export configuration to JSON
    pub fn to_json(&self) -> EisResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| EisError::Configuration {
            message: format!("Failed to serialize configuration: {}", e),
        })
    }

    /// Import and validate configuration from JSON
    pub fn from_json(json: &str) -> EisResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| EisError::Configuration {
            message: format!("Failed to deserialize configuration: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> EisResult<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| EisError::io(format!("reading {}", path.display()), &e))?;
        Self::from_json(&json)
    }

    /// Load from `path` when given, falling back to defaults on any error
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match Self::from_json_file(path) {
            Ok(config) => {
                info!(
                    voltage_threshold = config.voltage_threshold,
                    impedance_threshold = config.impedance_threshold,
                    deviation_percent = config.deviation_percent,
                    "analytics configuration loaded"
                );
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "using default analytics configuration");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AnalyticsConfig::default();
        assert_eq!(config.voltage_threshold, 0.001);
        assert_eq!(config.impedance_threshold, 0.01);
        assert_eq!(config.band_factors(), (0.75, 1.25));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = AnalyticsConfig::default().with_voltage_threshold(-1.0);
        assert!(config.validate().is_err());

        let config = AnalyticsConfig::default().with_impedance_threshold(f64::NAN);
        assert!(config.validate().is_err());

        let config = AnalyticsConfig::default().with_deviation_percent(100.0);
        assert!(config.validate().is_err());

        let config = AnalyticsConfig::default().with_voltage_threshold(0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_legacy_keys_and_partial_json() {
        let config = AnalyticsConfig::from_json(r#"{"V_threshold": 0.1, "Z_threshold": 5.0}"#).unwrap();
        assert_eq!(config.voltage_threshold, 0.1);
        assert_eq!(config.impedance_threshold, 5.0);
        assert_eq!(config.deviation_percent, DEFAULT_DEVIATION_PERCENT);

        let err = AnalyticsConfig::from_json(r#"{"voltage_threshold": -0.5}"#).unwrap_err();
        assert_eq!(err.code(), "invalid-configuration");
    }

    #[test]
    fn test_load_or_default() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"deviation_percent": 10.0}}"#).unwrap();
        let config = AnalyticsConfig::load_or_default(Some(file.path()));
        let (lower, upper) = config.band_factors();
        assert!((lower - 0.9).abs() < 1e-12);
        assert!((upper - 1.1).abs() < 1e-12);

        let missing = file.path().with_extension("missing");
        assert_eq!(AnalyticsConfig::load_or_default(Some(&missing)), AnalyticsConfig::default());
        assert_eq!(AnalyticsConfig::load_or_default(None), AnalyticsConfig::default());
    }
}
