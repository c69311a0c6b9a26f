//! Paced replay of a whole session through a [`SessionHandle`]

use eis_core::{EisError, EisResult, ErrorKind, Sample, SessionMetadata};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::service::SessionHandle;
use crate::sink::SessionSummary;

/// A push the service refused
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayRejection {
    pub row_index: i64,
    pub error: EisError,
}

/// Outcome of [`replay_session`]
#[derive(Debug, Clone)]
pub struct ReplayReport {
    /// Pushes answered with an acknowledgment
    pub acknowledged: usize,
    pub rejected: Vec<ReplayRejection>,
    pub summary: SessionSummary,
}

/// Start, push every sample in order, end
///
/// Sample-level rejections are collected in the report. Session-level
/// failures (bad metadata, a session already open, a stopped service) end the
/// replay with an error.
pub async fn replay_session(
    handle: &SessionHandle,
    metadata: SessionMetadata,
    samples: &[Sample],
    pace: Option<Duration>,
) -> EisResult<ReplayReport> {
    let key = metadata.key();
    handle.start_session(metadata).await?;
    info!(session = %key, samples = samples.len(), "replay started");

    let mut ticker = pace.filter(|p| !p.is_zero()).map(|p| {
        let mut ticker = interval(p);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    let mut acknowledged = 0;
    let mut rejected = Vec::new();

    for sample in samples {
        if let Some(ticker) = ticker.as_mut() {
            ticker.tick().await;
        }

        match handle.push_sample(*sample).await {
            Ok(_) => acknowledged += 1,
            Err(error) if is_sample_level(&error) => {
                debug!(row = sample.row_index, code = error.code(), "replayed sample rejected");
                rejected.push(ReplayRejection {
                    row_index: sample.row_index,
                    error,
                });
            }
            Err(error) => return Err(error),
        }
    }

    let summary = handle.end_session().await?;
    info!(
        session = %key,
        acknowledged,
        rejected = rejected.len(),
        "replay finished"
    );

    Ok(ReplayReport {
        acknowledged,
        rejected,
        summary,
    })
}

fn is_sample_level(error: &EisError) -> bool {
    matches!(
        error.kind(),
        ErrorKind::Format | ErrorKind::Validation | ErrorKind::Capacity
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::SessionService;
    use crate::session::SessionStateMachine;
    use crate::sink::MemorySink;
    use eis_analysis::AnalyticsConfig;

    fn spawn() -> (SessionHandle, MemorySink) {
        let sink = MemorySink::new();
        let machine =
            SessionStateMachine::with_config(Box::new(sink.clone()), &AnalyticsConfig::default());
        (SessionService::spawn(machine, 256), sink)
    }

    fn sweep(rows: i64) -> Vec<Sample> {
        (0..rows)
            .map(|row| Sample::new(1000.0 / (row + 1) as f64, 0.1, -0.05, 3.7, 25.0, 1000.0, row))
            .collect()
    }

    #[tokio::test]
    async fn test_replay_counts_rejections() {
        let (handle, sink) = spawn();
        let mut samples = sweep(5);
        samples[2].range_ohm = 0.0;
        samples.remove(3);

        let report = replay_session(
            &handle,
            SessionMetadata::new("B01", "Test_1", 50, "50.csv", 5),
            &samples,
            None,
        )
        .await
        .unwrap();

        // row 2 bad field, row 4 arrives where 3 was expected
        assert_eq!(report.acknowledged, 2);
        let codes: Vec<_> = report.rejected.iter().map(|r| r.error.code()).collect();
        assert_eq!(codes, vec!["invalid-field", "row-sequence-violation"]);
        assert_eq!(report.summary.rejected, 2);
        assert_eq!(sink.record().rejected.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paced_replay() {
        let (handle, _) = spawn();
        let started = tokio::time::Instant::now();
        let report = replay_session(
            &handle,
            SessionMetadata::new("B01", "Test_1", 50, "50.csv", 4),
            &sweep(4),
            Some(Duration::from_millis(100)),
        )
        .await
        .unwrap();
        assert_eq!(report.acknowledged, 4);
        // first tick is immediate
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_session_level_failure_aborts() {
        let (handle, _) = spawn();
        let err = replay_session(
            &handle,
            SessionMetadata::new("B01", "Test_3", 50, "50.csv", 4),
            &sweep(4),
            None,
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "invalid-test-id");
    }
}
