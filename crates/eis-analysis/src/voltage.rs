//! Voltage spike detection

use chrono::{DateTime, Utc};
use eis_core::{
    AnalysisMode, EisEvent, Sample, SeriesStats, SessionKey, SessionMetadata, VoltageSpikeDirection,
    VoltageSpikeEvent, VoltageSummary,
};
use tracing::{debug, info};

use crate::analyzer::SampleAnalyzer;
use crate::config::{AnalyticsConfig, DEFAULT_VOLTAGE_THRESHOLD};

/// One recorded voltage reading
#[derive(Debug, Clone, PartialEq)]
pub struct VoltageReading {
    pub sample: Sample,
    pub key: SessionKey,
    pub recorded_at: DateTime<Utc>,
}

/// Result of a whole-session pass
#[derive(Debug, Clone, Default)]
pub struct VoltageBatchReport {
    pub spikes: Vec<VoltageSpikeEvent>,
    /// `None` when fewer than two samples were given
    pub summary: Option<VoltageSummary>,
}

/// Flags consecutive voltage deltas larger than a fixed threshold
#[derive(Debug, Clone)]
pub struct VoltageAnalyzer {
    threshold: f64,
    history: Vec<VoltageReading>,
}

impl VoltageAnalyzer {
    pub fn new(threshold: f64) -> Self {
        VoltageAnalyzer {
            threshold,
            history: Vec::new(),
        }
    }

    pub fn from_config(config: &AnalyticsConfig) -> Self {
        Self::new(config.voltage_threshold)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn history(&self) -> &[VoltageReading] {
        &self.history
    }

    /// Compare against the latest reading of the same (battery, test, SoC)
    /// session, then record the sample
    pub fn analyze_single_sample(
        &mut self,
        sample: &Sample,
        session: &SessionMetadata,
    ) -> Option<VoltageSpikeEvent> {
        let spike = self
            .history
            .iter()
            .rev()
            .find(|reading| session.matches(&reading.key))
            .and_then(|previous| {
                self.detect(&previous.sample, sample, session, AnalysisMode::Streaming)
            });

        self.record(sample, session);
        spike
    }

    /// Sort by row index, clear history and walk consecutive pairs
    pub fn analyze_batch(&mut self, samples: &[Sample], session: &SessionMetadata) -> VoltageBatchReport {
        let mut ordered = samples.to_vec();
        ordered.sort_by_key(|s| s.row_index);

        self.history.clear();
        let mut report = VoltageBatchReport::default();

        let Some(first) = ordered.first() else {
            return report;
        };
        debug!(
            session = %session.key(),
            row = first.row_index,
            voltage = first.voltage,
            "voltage baseline"
        );
        self.record(first, session);

        for pair in ordered.windows(2) {
            if let Some(spike) = self.detect(&pair[0], &pair[1], session, AnalysisMode::Batch) {
                report.spikes.push(spike);
            }
            self.record(&pair[1], session);
        }

        let voltages: Vec<f64> = ordered.iter().map(|s| s.voltage).collect();
        report.summary = SeriesStats::calculate(&voltages, self.threshold).map(|stats| {
            info!(
                session = %session.key(),
                min = stats.min,
                max = stats.max,
                max_abs_delta = stats.max_abs_delta,
                spikes = stats.deltas_over_threshold,
                "voltage summary"
            );
            VoltageSummary {
                key: session.key(),
                sample_count: ordered.len(),
                stats,
                threshold: self.threshold,
            }
        });

        report
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    fn record(&mut self, sample: &Sample, session: &SessionMetadata) {
        self.history.push(VoltageReading {
            sample: *sample,
            key: session.key(),
            recorded_at: Utc::now(),
        });
    }

    fn detect(
        &self,
        previous: &Sample,
        current: &Sample,
        session: &SessionMetadata,
        mode: AnalysisMode,
    ) -> Option<VoltageSpikeEvent> {
        let delta_v = current.voltage - previous.voltage;
        let abs_delta_v = delta_v.abs();
        if abs_delta_v <= self.threshold {
            return None;
        }

        let direction = VoltageSpikeDirection::from_delta(delta_v);
        debug!(
            row = current.row_index,
            delta_v,
            %direction,
            "voltage spike"
        );

        Some(VoltageSpikeEvent {
            previous: *previous,
            current: *current,
            delta_v,
            abs_delta_v,
            direction,
            threshold: self.threshold,
            session: session.clone(),
            mode,
            detected_at: Utc::now(),
        })
    }
}

impl Default for VoltageAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_VOLTAGE_THRESHOLD)
    }
}

impl SampleAnalyzer for VoltageAnalyzer {
    fn name(&self) -> &str {
        "voltage"
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn analyze_sample(&mut self, sample: &Sample, session: &SessionMetadata) -> Vec<EisEvent> {
        self.analyze_single_sample(sample, session)
            .map(EisEvent::VoltageSpike)
            .into_iter()
            .collect()
    }

    fn analyze_batch(&mut self, samples: &[Sample], session: &SessionMetadata) -> Vec<EisEvent> {
        let report = VoltageAnalyzer::analyze_batch(self, samples, session);
        report
            .spikes
            .into_iter()
            .map(EisEvent::VoltageSpike)
            .chain(report.summary.map(EisEvent::VoltageSummary))
            .collect()
    }

    fn clear_history(&mut self) {
        VoltageAnalyzer::clear_history(self);
    }

    fn history_len(&self) -> usize {
        self.history.len()
    }
}
