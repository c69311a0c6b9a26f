//! EIS-Analysis: Streaming anomaly detection for impedance sessions
//!
//! Voltage spike detection, impedance jump and out-of-band detection, and the
//! chain that feeds every accepted sample to each analyzer.

pub mod analyzer;
pub mod config;
pub mod impedance;
pub mod voltage;

pub use analyzer::{AnalysisChain, SampleAnalyzer};
pub use config::AnalyticsConfig;
pub use impedance::{ImpedanceAnalyzer, ImpedanceBatchReport, ImpedanceFindings, ImpedanceReading};
pub use voltage::{VoltageAnalyzer, VoltageBatchReport, VoltageReading};
