//! Session state machine: start, push, end
//!
//! One instance serves one session at a time. Per-session state lives in
//! [`ActiveSession`], which only exists between a successful start and the
//! matching end, so nothing can leak from one session into the next.

use chrono::{DateTime, Utc};
use eis_analysis::{AnalysisChain, AnalyticsConfig};
use eis_core::{
    rejected_csv_row, validate_metadata, validate_row_sequence, validate_sample, EisError,
    EisEvent, EisResult, Sample, SampleEvent, SessionKey, SessionMetadata, TransferEvent,
    WarningEvent,
};
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::listener::{EventListener, ListenerRegistry};
use crate::sink::{PersistenceSink, RowWriter, SessionSummary};

/// Accepted samples per session, one SoC-level file
pub const DEFAULT_MAX_ACCEPTED_SAMPLES: usize = 28;

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionState {
    Idle,
    Active,
}

/// Successful outcome of a start or push
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ack {
    /// Session started and is receiving samples
    InProgress { session_id: Uuid },
    /// Sample stored
    Accepted { row_index: i64, accepted: usize },
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ack::InProgress { .. } => write!(f, "ACK IN_PROGRESS"),
            Ack::Accepted { .. } => write!(f, "ACK"),
        }
    }
}

/// Point-in-time view of the state machine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session_id: Option<Uuid>,
    pub key: Option<SessionKey>,
    pub expected_row: i64,
    pub accepted: usize,
    pub rejected: usize,
}

impl SessionSnapshot {
    fn idle() -> Self {
        SessionSnapshot {
            state: SessionState::Idle,
            session_id: None,
            key: None,
            expected_row: 0,
            accepted: 0,
            rejected: 0,
        }
    }
}

/// State of the session between start and end
struct ActiveSession {
    id: Uuid,
    metadata: SessionMetadata,
    history: Vec<Sample>,
    expected_row: i64,
    rejected: usize,
    accepted_writer: Box<dyn RowWriter>,
    rejected_writer: Box<dyn RowWriter>,
    started_at: DateTime<Utc>,
}

impl ActiveSession {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: SessionState::Active,
            session_id: Some(self.id),
            key: Some(self.metadata.key()),
            expected_row: self.expected_row,
            accepted: self.history.len(),
            rejected: self.rejected,
        }
    }

    /// Record a rejected push in the rejects file and notify listeners
    fn reject(&mut self, listeners: &mut ListenerRegistry, sample: Option<Sample>, reason: &EisError) {
        self.rejected += 1;
        let message = reason.to_string();
        if let Err(e) = self
            .rejected_writer
            .write_line(&rejected_csv_row(sample.as_ref(), &message))
        {
            error!(error = %e, "rejected row not persisted");
        }
        debug!(
            code = reason.code(),
            row = sample.map(|s| s.row_index),
            rejected = self.rejected,
            "sample rejected"
        );

        listeners.emit(&EisEvent::ValidationWarning(WarningEvent {
            session_id: self.id,
            code: reason.code(),
            field: reason.field(),
            message,
            sample,
            timestamp: Utc::now(),
        }));
    }
}

/// Validates, persists and analyzes one session's samples
pub struct SessionStateMachine {
    sink: Box<dyn PersistenceSink>,
    analyzers: AnalysisChain,
    listeners: ListenerRegistry,
    max_accepted: usize,
    active: Option<ActiveSession>,
}

impl SessionStateMachine {
    pub fn new(sink: Box<dyn PersistenceSink>, analyzers: AnalysisChain) -> Self {
        SessionStateMachine {
            sink,
            analyzers,
            listeners: ListenerRegistry::new(),
            max_accepted: DEFAULT_MAX_ACCEPTED_SAMPLES,
            active: None,
        }
    }

    /// Standard voltage and impedance analyzers from `config`
    pub fn with_config(sink: Box<dyn PersistenceSink>, config: &AnalyticsConfig) -> Self {
        Self::new(sink, AnalysisChain::standard(config))
    }

    pub fn with_max_accepted(mut self, max_accepted: usize) -> Self {
        self.max_accepted = max_accepted;
        self
    }

    pub fn add_listener(&mut self, listener: Box<dyn EventListener>) {
        self.listeners.register(listener);
    }

    pub fn state(&self) -> SessionState {
        if self.active.is_some() {
            SessionState::Active
        } else {
            SessionState::Idle
        }
    }

    pub fn max_accepted(&self) -> usize {
        self.max_accepted
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.active
            .as_ref()
            .map_or_else(SessionSnapshot::idle, ActiveSession::snapshot)
    }

    /// Open a session; `None` metadata is a format error
    pub fn start_session(&mut self, metadata: impl Into<Option<SessionMetadata>>) -> EisResult<Ack> {
        if let Some(active) = &self.active {
            warn!(session = %active.metadata.key(), "start requested while a session is active");
            return Err(EisError::already_active());
        }

        let Some(metadata) = metadata.into() else {
            warn!("session start without metadata");
            return Err(EisError::metadata_absent());
        };
        if let Err(e) = validate_metadata(Some(&metadata)) {
            warn!(code = e.code(), "session metadata rejected: {}", e);
            return Err(e);
        }

        let (accepted_writer, rejected_writer) = self.open_writers(&metadata)?;
        self.analyzers.clear_history();

        let session = ActiveSession {
            id: Uuid::new_v4(),
            metadata,
            history: Vec::new(),
            expected_row: 0,
            rejected: 0,
            accepted_writer,
            rejected_writer,
            started_at: Utc::now(),
        };
        let session_id = session.id;
        let key = session.metadata.key();
        let declared = session.metadata.total_rows;
        self.active = Some(session);

        info!(session = %key, id = %session_id, declared, "session started");
        self.listeners.emit(&EisEvent::TransferStarted(TransferEvent {
            session_id,
            key,
            total_samples: declared,
            timestamp: Utc::now(),
        }));

        Ok(Ack::InProgress { session_id })
    }

    /// Validate and store one sample; `None` is a format error
    ///
    /// Every call with an active session consumes one row position, whether
    /// the sample is accepted or not.
    pub fn push_sample(&mut self, sample: impl Into<Option<Sample>>) -> EisResult<Ack> {
        let Some(active) = self.active.as_mut() else {
            return Err(EisError::no_active_session());
        };
        let expected = active.expected_row;
        active.expected_row += 1;

        let sample = sample.into();
        let sample = match check_sample(sample, expected) {
            Ok(sample) => sample,
            Err(e) => {
                active.reject(&mut self.listeners, sample, &e);
                return Err(e);
            }
        };

        if active.history.len() >= self.max_accepted {
            let e = EisError::CapacityExceeded {
                capacity: self.max_accepted,
            };
            active.reject(&mut self.listeners, Some(sample), &e);
            return Err(e);
        }

        active.history.push(sample);
        if let Err(e) = active.accepted_writer.write_line(&sample.to_csv_row()) {
            error!(row = sample.row_index, error = %e, "accepted row not persisted");
        }

        let accepted = active.history.len();
        let event = EisEvent::SampleReceived(SampleEvent {
            session_id: active.id,
            sample,
            sample_number: active.expected_row,
            total_samples: active.metadata.total_rows,
            timestamp: Utc::now(),
        });
        let detections = self.analyzers.analyze_sample(&sample, &active.metadata);

        for detection in &detections {
            self.listeners.emit(detection);
        }
        self.listeners.emit(&event);

        Ok(Ack::Accepted {
            row_index: sample.row_index,
            accepted,
        })
    }

    /// Run the final analysis pass, write the summary and return to idle
    ///
    /// The returned summary is the completion acknowledgment.
    pub fn end_session(&mut self) -> EisResult<SessionSummary> {
        let Some(mut session) = self.active.take() else {
            return Err(EisError::no_active_session());
        };

        if session.history.len() > 1 {
            for event in self.analyzers.analyze_batch(&session.history, &session.metadata) {
                self.listeners.emit(&event);
            }
        }

        let summary = SessionSummary::new(&session.metadata, session.history.len(), session.rejected);
        if let Err(e) = self.sink.write_summary(&summary) {
            warn!(session = %summary.key, error = %e, "session summary not written");
        }

        // closes both files
        session.history.clear();
        drop(session.accepted_writer);
        drop(session.rejected_writer);

        info!(
            session = %summary.key,
            accepted = summary.accepted,
            rejected = summary.rejected,
            success_rate = format_args!("{:.1}%", summary.success_rate()),
            elapsed_ms = (Utc::now() - session.started_at).num_milliseconds(),
            "session completed"
        );
        self.listeners.emit(&EisEvent::TransferCompleted(TransferEvent {
            session_id: session.id,
            key: summary.key.clone(),
            total_samples: summary.accepted as i64,
            timestamp: Utc::now(),
        }));

        Ok(summary)
    }

    /// Drop an open session without a summary
    pub fn abandon(&mut self) -> Option<SessionKey> {
        let session = self.active.take()?;
        let key = session.metadata.key();
        warn!(
            session = %key,
            accepted = session.history.len(),
            rejected = session.rejected,
            "session abandoned"
        );
        Some(key)
    }

    fn open_writers(
        &mut self,
        metadata: &SessionMetadata,
    ) -> EisResult<(Box<dyn RowWriter>, Box<dyn RowWriter>)> {
        let accepted = self
            .sink
            .accepted_writer(metadata)
            .map_err(|e| setup_failed(metadata, e))?;

        match self.sink.rejected_writer(metadata) {
            Ok(rejected) => Ok((accepted, rejected)),
            Err(e) => {
                drop(accepted);
                Err(setup_failed(metadata, e))
            }
        }
    }
}

/// Row position first, then field checks
fn check_sample(sample: Option<Sample>, expected: i64) -> EisResult<Sample> {
    let sample = sample.ok_or_else(EisError::sample_absent)?;
    validate_row_sequence(sample.row_index, expected)?;
    validate_sample(Some(&sample))?;
    Ok(sample)
}

fn setup_failed(metadata: &SessionMetadata, cause: EisError) -> EisError {
    error!(session = %metadata.key(), error = %cause, "persistence setup failed");
    match cause {
        e @ EisError::SetupFailed { .. } => e,
        other => EisError::SetupFailed {
            reason: other.to_string(),
        },
    }
}
