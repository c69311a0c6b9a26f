//! EIS-Server: session ingestion service
//!
//! A per-connection state machine that accepts a declared session, validates
//! each streamed sample, persists accepted and rejected rows, runs the
//! analyzers and notifies listeners. The service module wraps one machine in
//! a tokio task.

pub mod config;
pub mod listener;
pub mod logging;
pub mod replay;
pub mod service;
pub mod session;
pub mod sink;

pub use config::ServerConfig;
pub use listener::{BroadcastListener, EventListener, ListenerRegistry, LoggingListener};
pub use replay::{replay_session, ReplayRejection, ReplayReport};
pub use service::{SessionCommand, SessionHandle, SessionService};
pub use session::{
    Ack, SessionSnapshot, SessionState, SessionStateMachine, DEFAULT_MAX_ACCEPTED_SAMPLES,
};
pub use sink::{
    CsvDirectorySink, CsvRowWriter, MemoryRecord, MemorySink, PersistenceSink, RowWriter,
    SessionSummary, ACCEPTED_FILE, REJECTED_FILE, SUMMARY_FILE,
};
