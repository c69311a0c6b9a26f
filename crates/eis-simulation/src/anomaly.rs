//! Faults that can be injected into a generated sweep

use eis_core::Sample;
use serde::{Deserialize, Serialize};

/// Sample field targeted by [`InjectedAnomaly::CorruptField`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorruptedField {
    Frequency,
    Real,
    Imaginary,
    Voltage,
    Temperature,
    Range,
}

impl CorruptedField {
    /// Overwrite the field with a value the validator rejects
    pub fn corrupt(&self, sample: &mut Sample) {
        match self {
            CorruptedField::Frequency => sample.frequency_hz = 0.0,
            CorruptedField::Real => sample.r_ohm = f64::NAN,
            CorruptedField::Imaginary => sample.x_ohm = f64::INFINITY,
            CorruptedField::Voltage => sample.voltage = -sample.voltage.abs() - 0.1,
            CorruptedField::Temperature => sample.temperature_c = f64::NAN,
            CorruptedField::Range => sample.range_ohm = 0.0,
        }
    }
}

/// Predefined faults, each anchored at a row index
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InjectedAnomaly {
    /// Voltage shifted by `delta` volts from `row` onwards
    VoltageStep { row: i64, delta: f64 },
    /// Impedance at `row` scaled by `factor` (both components)
    ImpedanceOutlier { row: i64, factor: f64 },
    /// Field at `row` made invalid
    CorruptField { row: i64, field: CorruptedField },
    /// Row dropped from the output; later rows keep their indices
    SkipRow { row: i64 },
}

impl InjectedAnomaly {
    pub fn row(&self) -> i64 {
        match self {
            InjectedAnomaly::VoltageStep { row, .. }
            | InjectedAnomaly::ImpedanceOutlier { row, .. }
            | InjectedAnomaly::CorruptField { row, .. }
            | InjectedAnomaly::SkipRow { row } => *row,
        }
    }

    /// Apply to `sample`; returns `false` when the sample must be dropped
    pub fn apply(&self, sample: &mut Sample) -> bool {
        match *self {
            InjectedAnomaly::VoltageStep { row, delta } => {
                if sample.row_index >= row {
                    sample.voltage += delta;
                }
                true
            }
            InjectedAnomaly::ImpedanceOutlier { row, factor } => {
                if sample.row_index == row {
                    sample.r_ohm *= factor;
                    sample.x_ohm *= factor;
                }
                true
            }
            InjectedAnomaly::CorruptField { row, field } => {
                if sample.row_index == row {
                    field.corrupt(sample);
                }
                true
            }
            InjectedAnomaly::SkipRow { row } => sample.row_index != row,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            InjectedAnomaly::VoltageStep { .. } => "Voltage step",
            InjectedAnomaly::ImpedanceOutlier { .. } => "Impedance outlier",
            InjectedAnomaly::CorruptField { .. } => "Corrupted field",
            InjectedAnomaly::SkipRow { .. } => "Skipped row",
        }
    }

    /// Common fault scenarios for a sweep of `rows` samples
    pub fn presets(rows: i64) -> Vec<(&'static str, InjectedAnomaly)> {
        let mid = rows / 2;
        vec![
            ("Contact bounce", InjectedAnomaly::VoltageStep { row: mid, delta: 0.005 }),
            ("Loose lead", InjectedAnomaly::ImpedanceOutlier { row: mid, factor: 1.6 }),
            (
                "Instrument overflow",
                InjectedAnomaly::CorruptField { row: mid, field: CorruptedField::Range },
            ),
            ("Dropped packet", InjectedAnomaly::SkipRow { row: mid }),
        ]
    }
}
