//! Synthetic EIS sweep generator based on a Randles equivalent circuit

use eis_core::{EisError, EisResult, Sample, SessionMetadata};
use num_complex::Complex64;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

use crate::anomaly::InjectedAnomaly;

/// Rows in one SoC-level measurement file
pub const ROWS_PER_SWEEP: usize = 28;

/// Equivalent circuit of the simulated cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellModel {
    /// Ohmic (series) resistance in ohm
    pub ohmic_resistance: f64,
    /// Charge-transfer resistance in ohm
    pub charge_transfer_resistance: f64,
    /// Double-layer capacitance in farad
    pub double_layer_capacitance: f64,
}

impl CellModel {
    /// Complex impedance at `frequency_hz`
    pub fn impedance(&self, frequency_hz: f64) -> Complex64 {
        let omega = 2.0 * PI * frequency_hz;
        let rct = self.charge_transfer_resistance;
        let parallel = rct / Complex64::new(1.0, omega * rct * self.double_layer_capacitance);
        Complex64::new(self.ohmic_resistance, 0.0) + parallel
    }
}

impl Default for CellModel {
    fn default() -> Self {
        Self {
            ohmic_resistance: 0.08,
            charge_transfer_resistance: 0.04,
            double_layer_capacitance: 1.5,
        }
    }
}

/// Measurement noise
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Relative standard deviation applied to R and X
    pub impedance_relative_std: f64,
    /// Absolute voltage noise in V
    pub voltage_std: f64,
    /// Absolute temperature noise in °C
    pub temperature_std: f64,
}

impl NoiseConfig {
    pub fn none() -> Self {
        Self {
            impedance_relative_std: 0.0,
            voltage_std: 0.0,
            temperature_std: 0.0,
        }
    }
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            impedance_relative_std: 0.002,
            voltage_std: 0.0001,
            temperature_std: 0.05,
        }
    }
}

/// Configuration for sweep generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// First (highest) frequency in Hz
    pub start_frequency_hz: f64,
    /// Last (lowest) frequency in Hz
    pub end_frequency_hz: f64,
    /// Rows per sweep
    pub rows: usize,
    pub cell: CellModel,
    pub noise: NoiseConfig,
    /// Cell temperature in °C
    pub temperature_c: f64,
    /// Instrument range in ohm
    pub range_ohm: f64,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            start_frequency_hz: 10_000.0,
            end_frequency_hz: 0.1,
            rows: ROWS_PER_SWEEP,
            cell: CellModel::default(),
            noise: NoiseConfig::default(),
            temperature_c: 25.0,
            range_ohm: 1000.0,
            seed: None,
        }
    }
}

impl SweepConfig {
    pub fn validate(&self) -> EisResult<()> {
        if !(self.start_frequency_hz > 0.0 && self.end_frequency_hz > 0.0) {
            return Err(EisError::Configuration {
                message: format!(
                    "Sweep frequencies must be positive, got {} to {}",
                    self.start_frequency_hz, self.end_frequency_hz
                ),
            });
        }

        if self.rows < 2 {
            return Err(EisError::Configuration {
                message: format!("A sweep needs at least 2 rows, got {}", self.rows),
            });
        }

        if self.range_ohm <= 0.0 {
            return Err(EisError::Configuration {
                message: format!("Instrument range must be positive, got {}", self.range_ohm),
            });
        }

        Ok(())
    }

    /// Log-spaced frequencies from start to end
    pub fn frequencies(&self) -> Vec<f64> {
        let steps = (self.rows - 1) as f64;
        let ratio = (self.end_frequency_hz / self.start_frequency_hz).powf(1.0 / steps);
        (0..self.rows)
            .map(|i| self.start_frequency_hz * ratio.powi(i as i32))
            .collect()
    }
}

/// Open-circuit voltage of a Li-ion cell at the given state of charge
pub fn open_circuit_voltage(soc: i32) -> f64 {
    3.0 + 1.2 * f64::from(soc.clamp(0, 100)) / 100.0
}

/// Generated session ready to be pushed
#[derive(Debug, Clone)]
pub struct SimulatedSession {
    pub metadata: SessionMetadata,
    pub samples: Vec<Sample>,
}

/// Seeded EIS sweep generator
pub struct EisGenerator {
    config: SweepConfig,
    rng: rand::rngs::StdRng,
    unit_normal: Normal<f64>,
}

impl EisGenerator {
    pub fn new(config: SweepConfig) -> EisResult<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_entropy(),
        };
        let unit_normal = Normal::new(0.0, 1.0).map_err(|e| EisError::Configuration {
            message: format!("Failed to create normal distribution: {}", e),
        })?;

        Ok(EisGenerator {
            config,
            rng,
            unit_normal,
        })
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// One sweep at `soc`, then anomalies applied in order
    pub fn generate_sweep(&mut self, soc: i32, anomalies: &[InjectedAnomaly]) -> Vec<Sample> {
        let voltage = open_circuit_voltage(soc);
        let frequencies = self.config.frequencies();
        let noise = self.config.noise;

        let mut samples = Vec::with_capacity(frequencies.len());
        for (row, frequency) in frequencies.into_iter().enumerate() {
            let z = self.config.cell.impedance(frequency);
            let r = z.re * (1.0 + noise.impedance_relative_std * self.gaussian());
            let x = -z.im.abs() * (1.0 + noise.impedance_relative_std * self.gaussian());
            let v = (voltage + noise.voltage_std * self.gaussian()).max(0.0);
            let t = self.config.temperature_c + noise.temperature_std * self.gaussian();

            let mut sample = Sample::new(frequency, r, x, v, t, self.config.range_ohm, row as i64);
            let keep = anomalies.iter().all(|anomaly| anomaly.apply(&mut sample));
            if keep {
                samples.push(sample);
            } else {
                debug!(row, "row skipped by injected anomaly");
            }
        }

        samples
    }

    /// Metadata plus sweep; `TotalRows` is the configured row count even when
    /// rows were skipped
    pub fn generate_session(
        &mut self,
        battery_id: &str,
        test_id: &str,
        soc: i32,
        anomalies: &[InjectedAnomaly],
    ) -> SimulatedSession {
        let samples = self.generate_sweep(soc, anomalies);
        let metadata = SessionMetadata::new(
            battery_id,
            test_id,
            soc,
            format!("{}.csv", soc),
            self.config.rows as i64,
        );
        SimulatedSession { metadata, samples }
    }

    fn gaussian(&mut self) -> f64 {
        self.unit_normal.sample(&mut self.rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::CorruptedField;
    use eis_core::{validate_metadata, validate_sample};

    fn quiet_config() -> SweepConfig {
        SweepConfig {
            noise: NoiseConfig::none(),
            seed: Some(7),
            ..SweepConfig::default()
        }
    }

    #[test]
    fn test_sweep_shape() {
        let mut generator = EisGenerator::new(SweepConfig {
            seed: Some(42),
            ..SweepConfig::default()
        })
        .unwrap();
        let samples = generator.generate_sweep(50, &[]);

        assert_eq!(samples.len(), ROWS_PER_SWEEP);
        for (i, s) in samples.iter().enumerate() {
            assert_eq!(s.row_index, i as i64);
            assert!(validate_sample(Some(s)).is_ok());
        }
        assert!((samples[0].frequency_hz - 10_000.0).abs() < 1e-6);
        assert!((samples[ROWS_PER_SWEEP - 1].frequency_hz - 0.1).abs() < 1e-9);
        assert!(samples.windows(2).all(|w| w[1].frequency_hz < w[0].frequency_hz));
    }

    #[test]
    fn test_seed_is_reproducible() {
        let config = SweepConfig {
            seed: Some(1234),
            ..SweepConfig::default()
        };
        let a = EisGenerator::new(config.clone()).unwrap().generate_sweep(80, &[]);
        let b = EisGenerator::new(config).unwrap().generate_sweep(80, &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_randles_limits() {
        let cell = CellModel::default();
        let high = cell.impedance(1e9);
        let low = cell.impedance(1e-9);
        assert!((high.re - cell.ohmic_resistance).abs() < 1e-6);
        assert!((low.re - (cell.ohmic_resistance + cell.charge_transfer_resistance)).abs() < 1e-6);
        assert!(cell.impedance(1.0).im < 0.0);
    }

    #[test]
    fn test_quiet_sweep_has_flat_voltage() {
        let mut generator = EisGenerator::new(quiet_config()).unwrap();
        let samples = generator.generate_sweep(50, &[]);
        assert!(samples.iter().all(|s| (s.voltage - 3.6).abs() < 1e-12));
    }

    #[test]
    fn test_session_with_anomalies() {
        let mut generator = EisGenerator::new(quiet_config()).unwrap();
        let session = generator.generate_session(
            "B04",
            "Test_2",
            25,
            &[
                InjectedAnomaly::SkipRow { row: 3 },
                InjectedAnomaly::CorruptField { row: 5, field: CorruptedField::Frequency },
            ],
        );

        assert!(validate_metadata(Some(&session.metadata)).is_ok());
        assert_eq!(session.metadata.total_rows, ROWS_PER_SWEEP as i64);
        assert_eq!(session.metadata.file_name, "25.csv");
        assert_eq!(session.samples.len(), ROWS_PER_SWEEP - 1);
        assert!(session.samples.iter().all(|s| s.row_index != 3));

        let corrupted = session.samples.iter().find(|s| s.row_index == 5).unwrap();
        assert!(validate_sample(Some(corrupted)).is_err());
    }

    #[test]
    fn test_invalid_config() {
        let config = SweepConfig {
            rows: 1,
            ..SweepConfig::default()
        };
        let err = EisGenerator::new(config).err().unwrap();
        assert_eq!(err.code(), "invalid-configuration");
    }
}
