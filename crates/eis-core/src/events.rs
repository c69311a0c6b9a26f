//! Notifications emitted while a session runs
//!
//! Events are plain values; who receives them is decided by the listener
//! registry of the session state machine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::model::{Sample, SessionKey, SessionMetadata};
use crate::stats::SeriesStats;

/// Whether a detection came from live ingestion or the end-of-session pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisMode {
    Streaming,
    Batch,
}

/// Sign of a voltage delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoltageSpikeDirection {
    Above,
    Below,
    NoChange,
}

impl VoltageSpikeDirection {
    pub fn from_delta(delta: f64) -> Self {
        if delta > 0.0 {
            VoltageSpikeDirection::Above
        } else if delta < 0.0 {
            VoltageSpikeDirection::Below
        } else {
            VoltageSpikeDirection::NoChange
        }
    }
}

impl fmt::Display for VoltageSpikeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoltageSpikeDirection::Above => write!(f, "above"),
            VoltageSpikeDirection::Below => write!(f, "below"),
            VoltageSpikeDirection::NoChange => write!(f, "no-change"),
        }
    }
}

/// Sign of an impedance-magnitude delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImpedanceJumpDirection {
    Increase,
    Decrease,
    NoChange,
}

impl ImpedanceJumpDirection {
    pub fn from_delta(delta: f64) -> Self {
        if delta > 0.0 {
            ImpedanceJumpDirection::Increase
        } else if delta < 0.0 {
            ImpedanceJumpDirection::Decrease
        } else {
            ImpedanceJumpDirection::NoChange
        }
    }
}

impl fmt::Display for ImpedanceJumpDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImpedanceJumpDirection::Increase => write!(f, "increase"),
            ImpedanceJumpDirection::Decrease => write!(f, "decrease"),
            ImpedanceJumpDirection::NoChange => write!(f, "no-change"),
        }
    }
}

/// Side of the expected band a magnitude fell on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutOfBandDirection {
    BelowExpected,
    AboveExpected,
}

impl fmt::Display for OutOfBandDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutOfBandDirection::BelowExpected => write!(f, "below-expected"),
            OutOfBandDirection::AboveExpected => write!(f, "above-expected"),
        }
    }
}

/// Session start / completion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferEvent {
    pub session_id: Uuid,
    pub key: SessionKey,
    /// Declared rows at start, accepted rows at completion
    pub total_samples: i64,
    pub timestamp: DateTime<Utc>,
}

/// A sample was accepted into the session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleEvent {
    pub session_id: Uuid,
    pub sample: Sample,
    /// Rows consumed so far, including this one
    pub sample_number: i64,
    /// Rows declared by the caller
    pub total_samples: i64,
    pub timestamp: DateTime<Utc>,
}

/// A pushed sample was rejected
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarningEvent {
    pub session_id: Uuid,
    /// Result code of the rejection (`invalid-field`, `row-sequence-violation`, ...)
    pub code: &'static str,
    pub field: Option<&'static str>,
    pub message: String,
    /// `None` when the sample itself was absent
    pub sample: Option<Sample>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoltageSpikeEvent {
    pub previous: Sample,
    pub current: Sample,
    /// `current.voltage - previous.voltage`
    pub delta_v: f64,
    pub abs_delta_v: f64,
    pub direction: VoltageSpikeDirection,
    pub threshold: f64,
    pub session: SessionMetadata,
    pub mode: AnalysisMode,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpedanceJumpEvent {
    pub previous: Sample,
    pub current: Sample,
    pub previous_z: f64,
    pub current_z: f64,
    /// `current_z - previous_z`
    pub delta_z: f64,
    pub abs_delta_z: f64,
    pub direction: ImpedanceJumpDirection,
    pub threshold: f64,
    pub session: SessionMetadata,
    pub mode: AnalysisMode,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutOfBandEvent {
    pub sample: Sample,
    pub current_z: f64,
    pub running_mean: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub direction: OutOfBandDirection,
    /// Distance past the violated bound, in percent of the running mean
    pub deviation_percent: f64,
    pub session: SessionMetadata,
    pub mode: AnalysisMode,
    pub detected_at: DateTime<Utc>,
}

/// Post-pass voltage statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoltageSummary {
    pub key: SessionKey,
    pub sample_count: usize,
    pub stats: SeriesStats,
    pub threshold: f64,
}

/// Post-pass impedance statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpedanceSummary {
    pub key: SessionKey,
    pub sample_count: usize,
    pub stats: SeriesStats,
    pub running_mean: f64,
    /// Magnitudes outside the band around the final running mean
    pub out_of_band_count: usize,
    pub threshold: f64,
}

/// Everything a session can notify about
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum EisEvent {
    TransferStarted(TransferEvent),
    SampleReceived(SampleEvent),
    TransferCompleted(TransferEvent),
    ValidationWarning(WarningEvent),
    VoltageSpike(VoltageSpikeEvent),
    ImpedanceJump(ImpedanceJumpEvent),
    OutOfBand(OutOfBandEvent),
    VoltageSummary(VoltageSummary),
    ImpedanceSummary(ImpedanceSummary),
}

impl EisEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EisEvent::TransferStarted(_) => "transfer-started",
            EisEvent::SampleReceived(_) => "sample-received",
            EisEvent::TransferCompleted(_) => "transfer-completed",
            EisEvent::ValidationWarning(_) => "validation-warning",
            EisEvent::VoltageSpike(_) => "voltage-spike",
            EisEvent::ImpedanceJump(_) => "impedance-jump",
            EisEvent::OutOfBand(_) => "out-of-band-warning",
            EisEvent::VoltageSummary(_) => "voltage-summary",
            EisEvent::ImpedanceSummary(_) => "impedance-summary",
        }
    }

    /// Spike, jump or out-of-band detection
    pub fn is_anomaly(&self) -> bool {
        matches!(
            self,
            EisEvent::VoltageSpike(_) | EisEvent::ImpedanceJump(_) | EisEvent::OutOfBand(_)
        )
    }
}
