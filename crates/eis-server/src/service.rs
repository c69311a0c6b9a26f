//! Session service: one tokio task owning one state machine
//!
//! Callers talk to the task through a cloneable [`SessionHandle`]; commands
//! are processed strictly in arrival order, so concurrent callers never
//! interleave inside the state machine.

use eis_core::{EisError, EisEvent, EisResult, Sample, SessionMetadata};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

use crate::listener::BroadcastListener;
use crate::session::{Ack, SessionSnapshot, SessionStateMachine};
use crate::sink::SessionSummary;

/// Pending commands per service
const COMMAND_BUFFER: usize = 32;

/// Requests handled by the service task
#[derive(Debug)]
pub enum SessionCommand {
    Start {
        metadata: Option<SessionMetadata>,
        reply: oneshot::Sender<EisResult<Ack>>,
    },
    Push {
        sample: Option<Sample>,
        reply: oneshot::Sender<EisResult<Ack>>,
    },
    End {
        reply: oneshot::Sender<EisResult<SessionSummary>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Task body; use [`SessionService::spawn`] to start one
pub struct SessionService {
    machine: SessionStateMachine,
    commands: mpsc::Receiver<SessionCommand>,
}

impl SessionService {
    /// Spawn the task on the current runtime and return its handle
    ///
    /// Every event of the machine is also published on a broadcast channel
    /// of `event_buffer` entries.
    pub fn spawn(mut machine: SessionStateMachine, event_buffer: usize) -> SessionHandle {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        machine.add_listener(Box::new(BroadcastListener::new(events.clone())));

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let service = SessionService {
            machine,
            commands: commands_rx,
        };
        tokio::spawn(service.run());

        SessionHandle {
            commands: commands_tx,
            events,
        }
    }

    /// Process commands until every handle is dropped
    pub async fn run(mut self) {
        info!("session service started");

        while let Some(command) = self.commands.recv().await {
            match command {
                SessionCommand::Start { metadata, reply } => {
                    let _ = reply.send(self.machine.start_session(metadata));
                }
                SessionCommand::Push { sample, reply } => {
                    let _ = reply.send(self.machine.push_sample(sample));
                }
                SessionCommand::End { reply } => {
                    let _ = reply.send(self.machine.end_session());
                }
                SessionCommand::Snapshot { reply } => {
                    let _ = reply.send(self.machine.snapshot());
                }
            }
        }

        if let Some(key) = self.machine.abandon() {
            debug!(session = %key, "open session dropped with the service");
        }
        info!("session service stopped");
    }
}

/// Cloneable client of a running [`SessionService`]
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<EisEvent>,
}

impl SessionHandle {
    pub async fn start_session(&self, metadata: impl Into<Option<SessionMetadata>>) -> EisResult<Ack> {
        let metadata = metadata.into();
        self.request(|reply| SessionCommand::Start { metadata, reply })
            .await?
    }

    pub async fn push_sample(&self, sample: impl Into<Option<Sample>>) -> EisResult<Ack> {
        let sample = sample.into();
        self.request(|reply| SessionCommand::Push { sample, reply })
            .await?
    }

    pub async fn end_session(&self) -> EisResult<SessionSummary> {
        self.request(|reply| SessionCommand::End { reply }).await?
    }

    pub async fn snapshot(&self) -> EisResult<SessionSnapshot> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EisEvent> {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> EisResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| EisError::ServiceStopped)?;
        response.await.map_err(|_| EisError::ServiceStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use eis_analysis::AnalyticsConfig;
    use crate::session::SessionState;

    fn spawn() -> (SessionHandle, MemorySink) {
        let sink = MemorySink::new();
        let machine =
            SessionStateMachine::with_config(Box::new(sink.clone()), &AnalyticsConfig::default());
        (SessionService::spawn(machine, 64), sink)
    }

    fn sample(row: i64, voltage: f64) -> Sample {
        Sample::new(1000.0, 0.1, -0.05, voltage, 25.0, 1000.0, row)
    }

    #[tokio::test]
    async fn test_round_trip_through_service() {
        let (handle, sink) = spawn();
        let mut events = handle.subscribe();

        let ack = handle
            .start_session(SessionMetadata::new("B01", "Test_1", 50, "f.csv", 2))
            .await
            .unwrap();
        assert!(matches!(ack, Ack::InProgress { .. }));

        handle.push_sample(sample(0, 3.700)).await.unwrap();
        handle.push_sample(sample(1, 3.702)).await.unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.state, SessionState::Active);
        assert_eq!(snapshot.accepted, 2);

        let summary = handle.end_session().await.unwrap();
        assert_eq!(summary.accepted, 2);
        assert_eq!(sink.record().summaries.len(), 1);

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.push(event.name());
        }
        assert_eq!(names.first(), Some(&"transfer-started"));
        assert!(names.contains(&"voltage-spike"));
        assert_eq!(names.last(), Some(&"transfer-completed"));
    }

    #[tokio::test]
    async fn test_errors_are_returned_to_caller() {
        let (handle, _) = spawn();
        let err = handle.push_sample(sample(0, 3.7)).await.unwrap_err();
        assert_eq!(err.code(), "no-active-session");
        let err = handle.start_session(None).await.unwrap_err();
        assert_eq!(err.code(), "metadata-absent");
    }

    #[tokio::test]
    async fn test_clones_share_one_session() {
        let (handle, _) = spawn();
        let other = handle.clone();
        handle
            .start_session(SessionMetadata::new("B02", "Test_2", 20, "20.csv", 28))
            .await
            .unwrap();
        let err = other
            .start_session(SessionMetadata::new("B03", "Test_2", 20, "20.csv", 28))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "already-active");
        assert!(!other.is_closed());
    }

    #[tokio::test]
    async fn test_dropping_handles_abandons_session() {
        let (handle, sink) = spawn();
        handle
            .start_session(SessionMetadata::new("B01", "Test_1", 50, "f.csv", 2))
            .await
            .unwrap();
        assert_eq!(sink.record().open_writers, 2);
        drop(handle);

        for _ in 0..100 {
            if sink.record().open_writers == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(sink.record().open_writers, 0);
        assert!(sink.record().summaries.is_empty());
    }
}
