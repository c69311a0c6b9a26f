//! Common analyzer trait and the chain that fans samples out to analyzers

use eis_core::{EisEvent, Sample, SessionMetadata};
use tracing::debug;

use crate::config::AnalyticsConfig;
use crate::impedance::ImpedanceAnalyzer;
use crate::voltage::VoltageAnalyzer;

/// Core trait for per-session anomaly detectors
pub trait SampleAnalyzer: Send {
    /// Analyzer name/identifier
    fn name(&self) -> &str;

    /// Delta threshold fixed at construction
    fn threshold(&self) -> f64;

    /// Compare one accepted sample against the previous reading of the same session
    fn analyze_sample(&mut self, sample: &Sample, session: &SessionMetadata) -> Vec<EisEvent>;

    /// Re-walk a whole session in row order; emits detections plus a summary
    fn analyze_batch(&mut self, samples: &[Sample], session: &SessionMetadata) -> Vec<EisEvent>;

    /// Forget stored readings and any running state
    fn clear_history(&mut self);

    /// Number of stored readings
    fn history_len(&self) -> usize;
}

/// Ordered set of analyzers fed with every accepted sample
pub struct AnalysisChain {
    analyzers: Vec<Box<dyn SampleAnalyzer>>,
}

impl AnalysisChain {
    pub fn new() -> Self {
        AnalysisChain {
            analyzers: Vec::new(),
        }
    }

    /// Voltage and impedance analyzers built from `config`
    pub fn standard(config: &AnalyticsConfig) -> Self {
        let mut chain = Self::new();
        chain.add_analyzer(Box::new(VoltageAnalyzer::from_config(config)));
        chain.add_analyzer(Box::new(ImpedanceAnalyzer::from_config(config)));
        chain
    }

    pub fn add_analyzer(&mut self, analyzer: Box<dyn SampleAnalyzer>) {
        self.analyzers.push(analyzer);
    }

    pub fn analyze_sample(&mut self, sample: &Sample, session: &SessionMetadata) -> Vec<EisEvent> {
        self.analyzers
            .iter_mut()
            .flat_map(|analyzer| analyzer.analyze_sample(sample, session))
            .collect()
    }

    pub fn analyze_batch(&mut self, samples: &[Sample], session: &SessionMetadata) -> Vec<EisEvent> {
        let mut events = Vec::new();
        for analyzer in &mut self.analyzers {
            let produced = analyzer.analyze_batch(samples, session);
            debug!(analyzer = analyzer.name(), events = produced.len(), "batch pass finished");
            events.extend(produced);
        }
        events
    }

    pub fn clear_history(&mut self) {
        for analyzer in &mut self.analyzers {
            analyzer.clear_history();
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.analyzers.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    /// Largest history held by any analyzer
    pub fn history_len(&self) -> usize {
        self.analyzers
            .iter()
            .map(|a| a.history_len())
            .max()
            .unwrap_or(0)
    }
}

impl Default for AnalysisChain {
    fn default() -> Self {
        Self::standard(&AnalyticsConfig::default())
    }
}
