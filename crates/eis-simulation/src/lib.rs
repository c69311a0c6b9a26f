//! EIS-Simulation: Sample sources for impedance sessions
//!
//! Synthetic sweeps with injectable faults for testing and development, and
//! a loader for recorded datasets.

pub mod anomaly;
pub mod dataset;
pub mod generator;

pub use anomaly::{CorruptedField, InjectedAnomaly};
pub use dataset::{DatasetFile, DatasetLoader, DatasetScan};
pub use generator::{
    open_circuit_voltage, CellModel, EisGenerator, NoiseConfig, SimulatedSession, SweepConfig,
    ROWS_PER_SWEEP,
};
