//! Impedance-magnitude jump and out-of-band detection

use chrono::{DateTime, Utc};
use eis_core::{
    AnalysisMode, EisEvent, ImpedanceJumpDirection, ImpedanceJumpEvent, ImpedanceSummary,
    OutOfBandDirection, OutOfBandEvent, RunningMean, Sample, SeriesStats, SessionKey,
    SessionMetadata,
};
use tracing::{debug, info};

use crate::analyzer::SampleAnalyzer;
use crate::config::{AnalyticsConfig, DEFAULT_DEVIATION_PERCENT, DEFAULT_IMPEDANCE_THRESHOLD};

/// Out-of-band checks start once this many magnitudes are in the running mean
pub const MIN_SAMPLES_FOR_BAND: usize = 2;

/// One recorded impedance reading
#[derive(Debug, Clone, PartialEq)]
pub struct ImpedanceReading {
    pub sample: Sample,
    pub magnitude: f64,
    pub key: SessionKey,
    pub recorded_at: DateTime<Utc>,
}

/// Detections for a single streamed sample
#[derive(Debug, Clone, Default)]
pub struct ImpedanceFindings {
    pub jump: Option<ImpedanceJumpEvent>,
    pub out_of_band: Option<OutOfBandEvent>,
}

/// Result of a whole-session pass
#[derive(Debug, Clone, Default)]
pub struct ImpedanceBatchReport {
    pub jumps: Vec<ImpedanceJumpEvent>,
    pub out_of_band: Vec<OutOfBandEvent>,
    /// `None` when fewer than two samples were given
    pub summary: Option<ImpedanceSummary>,
}

/// Flags magnitude jumps and magnitudes outside a band around the running mean
#[derive(Debug, Clone)]
pub struct ImpedanceAnalyzer {
    threshold: f64,
    lower_factor: f64,
    upper_factor: f64,
    running: RunningMean,
    history: Vec<ImpedanceReading>,
}

impl ImpedanceAnalyzer {
    pub fn new(threshold: f64) -> Self {
        Self::with_deviation(threshold, DEFAULT_DEVIATION_PERCENT)
    }

    /// `deviation_percent` sets the band half-width around the running mean
    pub fn with_deviation(threshold: f64, deviation_percent: f64) -> Self {
        let d = deviation_percent / 100.0;
        ImpedanceAnalyzer {
            threshold,
            lower_factor: 1.0 - d,
            upper_factor: 1.0 + d,
            running: RunningMean::new(),
            history: Vec::new(),
        }
    }

    pub fn from_config(config: &AnalyticsConfig) -> Self {
        Self::with_deviation(config.impedance_threshold, config.deviation_percent)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn running_mean(&self) -> &RunningMean {
        &self.running
    }

    pub fn history(&self) -> &[ImpedanceReading] {
        &self.history
    }

    /// `(lower, upper)` bounds around `mean`
    pub fn band(&self, mean: f64) -> (f64, f64) {
        (mean * self.lower_factor, mean * self.upper_factor)
    }

    /// Jump check against the latest reading of the same session, then
    /// running-mean update and out-of-band check
    pub fn analyze_single_sample(
        &mut self,
        sample: &Sample,
        session: &SessionMetadata,
    ) -> ImpedanceFindings {
        let magnitude = sample.impedance_magnitude();

        let jump = self
            .history
            .iter()
            .rev()
            .find(|reading| session.matches(&reading.key))
            .and_then(|previous| {
                self.detect_jump(
                    &previous.sample,
                    previous.magnitude,
                    sample,
                    magnitude,
                    session,
                    AnalysisMode::Streaming,
                )
            });

        self.running.update(magnitude);
        let out_of_band = self.detect_out_of_band(sample, magnitude, session, AnalysisMode::Streaming);

        self.record(sample, magnitude, session);
        ImpedanceFindings { jump, out_of_band }
    }

    /// Sort by row index, reset history and running mean, then replay the
    /// session through both checks
    pub fn analyze_batch(
        &mut self,
        samples: &[Sample],
        session: &SessionMetadata,
    ) -> ImpedanceBatchReport {
        let mut ordered = samples.to_vec();
        ordered.sort_by_key(|s| s.row_index);

        self.clear_history();
        let mut report = ImpedanceBatchReport::default();
        let magnitudes: Vec<f64> = ordered.iter().map(|s| s.impedance_magnitude()).collect();

        for (i, (sample, &magnitude)) in ordered.iter().zip(&magnitudes).enumerate() {
            if i == 0 {
                debug!(
                    session = %session.key(),
                    row = sample.row_index,
                    magnitude,
                    "impedance baseline"
                );
            } else if let Some(jump) = self.detect_jump(
                &ordered[i - 1],
                magnitudes[i - 1],
                sample,
                magnitude,
                session,
                AnalysisMode::Batch,
            ) {
                report.jumps.push(jump);
            }

            self.running.update(magnitude);
            if let Some(event) = self.detect_out_of_band(sample, magnitude, session, AnalysisMode::Batch) {
                report.out_of_band.push(event);
            }
            self.record(sample, magnitude, session);
        }

        let final_mean = self.running.mean();
        let (lower, upper) = self.band(final_mean);
        let out_of_band_count = magnitudes
            .iter()
            .filter(|&&z| z < lower || z > upper)
            .count();

        report.summary = SeriesStats::calculate(&magnitudes, self.threshold).map(|stats| {
            info!(
                session = %session.key(),
                min = stats.min,
                max = stats.max,
                running_mean = final_mean,
                jumps = stats.deltas_over_threshold,
                out_of_band = out_of_band_count,
                "impedance summary"
            );
            ImpedanceSummary {
                key: session.key(),
                sample_count: ordered.len(),
                stats,
                running_mean: final_mean,
                out_of_band_count,
                threshold: self.threshold,
            }
        });

        report
    }

    /// Clears readings and resets the running mean
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.running.reset();
    }

    fn record(&mut self, sample: &Sample, magnitude: f64, session: &SessionMetadata) {
        self.history.push(ImpedanceReading {
            sample: *sample,
            magnitude,
            key: session.key(),
            recorded_at: Utc::now(),
        });
    }

    fn detect_jump(
        &self,
        previous: &Sample,
        previous_z: f64,
        current: &Sample,
        current_z: f64,
        session: &SessionMetadata,
        mode: AnalysisMode,
    ) -> Option<ImpedanceJumpEvent> {
        let delta_z = current_z - previous_z;
        let abs_delta_z = delta_z.abs();
        if abs_delta_z <= self.threshold {
            return None;
        }

        let direction = ImpedanceJumpDirection::from_delta(delta_z);
        debug!(row = current.row_index, delta_z, %direction, "impedance jump");

        Some(ImpedanceJumpEvent {
            previous: *previous,
            current: *current,
            previous_z,
            current_z,
            delta_z,
            abs_delta_z,
            direction,
            threshold: self.threshold,
            session: session.clone(),
            mode,
            detected_at: Utc::now(),
        })
    }

    /// Expects the running mean to already include `magnitude`
    fn detect_out_of_band(
        &self,
        sample: &Sample,
        magnitude: f64,
        session: &SessionMetadata,
        mode: AnalysisMode,
    ) -> Option<OutOfBandEvent> {
        if self.running.count() < MIN_SAMPLES_FOR_BAND {
            return None;
        }

        let mean = self.running.mean();
        let (lower_bound, upper_bound) = self.band(mean);

        let (direction, boundary) = if magnitude < lower_bound {
            (OutOfBandDirection::BelowExpected, lower_bound)
        } else if magnitude > upper_bound {
            (OutOfBandDirection::AboveExpected, upper_bound)
        } else {
            return None;
        };

        let deviation_percent = (boundary - magnitude).abs() / mean * 100.0;
        debug!(
            row = sample.row_index,
            magnitude,
            mean,
            deviation_percent,
            %direction,
            "impedance out of band"
        );

        Some(OutOfBandEvent {
            sample: *sample,
            current_z: magnitude,
            running_mean: mean,
            lower_bound,
            upper_bound,
            direction,
            deviation_percent,
            session: session.clone(),
            mode,
            detected_at: Utc::now(),
        })
    }
}

impl Default for ImpedanceAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_IMPEDANCE_THRESHOLD)
    }
}

impl SampleAnalyzer for ImpedanceAnalyzer {
    fn name(&self) -> &str {
        "impedance"
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn analyze_sample(&mut self, sample: &Sample, session: &SessionMetadata) -> Vec<EisEvent> {
        let findings = self.analyze_single_sample(sample, session);
        findings
            .jump
            .map(EisEvent::ImpedanceJump)
            .into_iter()
            .chain(findings.out_of_band.map(EisEvent::OutOfBand))
            .collect()
    }

    fn analyze_batch(&mut self, samples: &[Sample], session: &SessionMetadata) -> Vec<EisEvent> {
        let report = ImpedanceAnalyzer::analyze_batch(self, samples, session);
        report
            .jumps
            .into_iter()
            .map(EisEvent::ImpedanceJump)
            .chain(report.out_of_band.into_iter().map(EisEvent::OutOfBand))
            .chain(report.summary.map(EisEvent::ImpedanceSummary))
            .collect()
    }

    fn clear_history(&mut self) {
        ImpedanceAnalyzer::clear_history(self);
    }

    fn history_len(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> SessionMetadata {
        SessionMetadata::new("B03", "Test_2", 80, "80.csv", 12)
    }

    /// Sample whose impedance magnitude is exactly `5 * scale` (3-4-5 triangle)
    fn sample_with_magnitude(scale: f64, row: i64) -> Sample {
        Sample::new(1000.0, 3.0 * scale, -4.0 * scale, 3.7, 25.0, 1000.0, row)
    }

    #[test]
    fn test_running_mean_tracks_magnitudes() {
        let mut analyzer = ImpedanceAnalyzer::new(10.0);
        let meta = meta();
        let scales = [0.1, 0.2, 0.3];
        for (row, scale) in scales.iter().enumerate() {
            analyzer.analyze_single_sample(&sample_with_magnitude(*scale, row as i64), &meta);
        }
        let expected = (0.5 + 1.0 + 1.5) / 3.0;
        assert!((analyzer.running_mean().mean() - expected).abs() < 1e-12);
        assert_eq!(analyzer.running_mean().count(), 3);
    }

    #[test]
    fn test_out_of_band_skipped_for_first_sample() {
        let mut analyzer = ImpedanceAnalyzer::new(0.01);
        let findings = analyzer.analyze_single_sample(&sample_with_magnitude(100.0, 0), &meta());
        assert!(findings.jump.is_none());
        assert!(findings.out_of_band.is_none());
    }

    #[test]
    fn test_jump_direction() {
        let mut analyzer = ImpedanceAnalyzer::new(0.01);
        let meta = meta();
        analyzer.analyze_single_sample(&sample_with_magnitude(0.1, 0), &meta);

        let findings = analyzer.analyze_single_sample(&sample_with_magnitude(0.09, 1), &meta);
        let jump = findings.jump.unwrap();
        assert_eq!(jump.direction, ImpedanceJumpDirection::Decrease);
        assert!((jump.previous_z - 0.5).abs() < 1e-12);
        assert!((jump.delta_z + 0.05).abs() < 1e-12);

        // within threshold
        let findings = analyzer.analyze_single_sample(&sample_with_magnitude(0.091, 2), &meta);
        assert!(findings.jump.is_none());
    }

    #[test]
    fn test_outlier_above_expected_band() {
        let mut analyzer = ImpedanceAnalyzer::new(0.01);
        let meta = meta();

        // eight steady magnitudes of 0.5, then a 40% outlier at index 8
        let mut magnitudes = vec![0.5; 12];
        let baseline: f64 = magnitudes[..8].iter().sum::<f64>() / 8.0;
        magnitudes[8] = baseline * 1.4;

        let mut band_events = Vec::new();
        for (row, z) in magnitudes.iter().enumerate() {
            let findings = analyzer.analyze_single_sample(&sample_with_magnitude(z / 5.0, row as i64), &meta);
            band_events.extend(findings.out_of_band);
        }

        assert_eq!(band_events.len(), 1);
        let event = &band_events[0];
        assert_eq!(event.sample.row_index, 8);
        assert_eq!(event.direction, OutOfBandDirection::AboveExpected);
        assert!(event.current_z > event.upper_bound);

        let expected_mean = (8.0 * 0.5 + 0.7) / 9.0;
        assert!((event.running_mean - expected_mean).abs() < 1e-9);
        assert!((event.upper_bound - expected_mean * 1.25).abs() < 1e-9);
        assert!((event.lower_bound - expected_mean * 0.75).abs() < 1e-9);

        let expected_deviation = (event.current_z - event.upper_bound) / event.running_mean * 100.0;
        assert!((event.deviation_percent - expected_deviation).abs() < 1e-9);
        assert_eq!(event.mode, AnalysisMode::Streaming);
    }

    #[test]
    fn test_below_expected_band() {
        let mut analyzer = ImpedanceAnalyzer::new(0.01);
        let meta = meta();
        analyzer.analyze_single_sample(&sample_with_magnitude(0.2, 0), &meta);
        analyzer.analyze_single_sample(&sample_with_magnitude(0.2, 1), &meta);
        analyzer.analyze_single_sample(&sample_with_magnitude(0.2, 2), &meta);

        let findings = analyzer.analyze_single_sample(&sample_with_magnitude(0.1, 3), &meta);
        let event = findings.out_of_band.unwrap();
        assert_eq!(event.direction, OutOfBandDirection::BelowExpected);
        let expected = (event.lower_bound - event.current_z) / event.running_mean * 100.0;
        assert!((event.deviation_percent - expected).abs() < 1e-9);
    }

    #[test]
    fn test_configured_deviation() {
        let config = AnalyticsConfig::default().with_deviation_percent(10.0);
        let analyzer = ImpedanceAnalyzer::from_config(&config);
        let (lower, upper) = analyzer.band(2.0);
        assert!((lower - 1.8).abs() < 1e-12);
        assert!((upper - 2.2).abs() < 1e-12);
    }

    #[test]
    fn test_batch_resets_running_mean_and_counts_against_final_mean() {
        let mut analyzer = ImpedanceAnalyzer::new(0.01);
        let meta = meta();
        // stale state from streaming must not leak into the batch pass
        analyzer.analyze_single_sample(&sample_with_magnitude(40.0, 0), &meta);

        let mut samples: Vec<Sample> = (0..12)
            .map(|row| sample_with_magnitude(0.1, row))
            .collect();
        samples[8] = sample_with_magnitude(0.14, 8);
        samples.reverse();

        let report = analyzer.analyze_batch(&samples, &meta);
        assert_eq!(report.out_of_band.len(), 1);
        assert_eq!(report.out_of_band[0].sample.row_index, 8);
        assert_eq!(report.out_of_band[0].mode, AnalysisMode::Batch);
        // 0.5 -> 0.7 and 0.7 -> 0.5
        assert_eq!(report.jumps.len(), 2);

        let summary = report.summary.unwrap();
        assert_eq!(summary.sample_count, 12);
        assert!((summary.running_mean - (11.0 * 0.5 + 0.7) / 12.0).abs() < 1e-9);
        assert_eq!(summary.out_of_band_count, 1);
        assert_eq!(summary.stats.deltas_over_threshold, 2);
        assert_eq!(analyzer.running_mean().count(), 12);
    }

    #[test]
    fn test_clear_history_resets_running_mean() {
        let mut analyzer = ImpedanceAnalyzer::new(0.02);
        analyzer.analyze_single_sample(&sample_with_magnitude(0.1, 0), &meta());
        analyzer.clear_history();
        assert!(analyzer.history().is_empty());
        assert_eq!(analyzer.running_mean().count(), 0);
        assert_eq!(analyzer.threshold(), 0.02);
    }
}
