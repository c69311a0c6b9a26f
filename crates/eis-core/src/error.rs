//! Error handling for the EIS ingestion workspace
//!
//! Input problems come in two recoverable families: format errors (a value is
//! structurally absent) and validation errors (a value is present but outside
//! its domain). Misuse of the session lifecycle is reported separately so a
//! caller can tell "your sample is bad" from "you called the wrong operation".

use core::fmt;
use thiserror::Error;

use crate::model::field;

/// Result type alias for EIS operations
pub type EisResult<T> = Result<T, EisError>;

/// Lifecycle rule broken by a session operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStateViolation {
    /// PushSample / EndSession without a started session
    NoActiveSession,
    /// StartSession while another session is still open
    AlreadyActive,
}

impl fmt::Display for SessionStateViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStateViolation::NoActiveSession => write!(f, "no active session"),
            SessionStateViolation::AlreadyActive => write!(f, "session already active"),
        }
    }
}

/// Coarse classification of an [`EisError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Format,
    Validation,
    SessionState,
    Capacity,
    Setup,
    Configuration,
    Io,
    Service,
}

/// Error type for all EIS operations
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum EisError {
    /// Input is structurally absent or malformed
    #[error("Format error in {field}: expected {expected_format}")]
    Format {
        /// Name of the missing/malformed input
        field: &'static str,
        /// What a well-formed value looks like
        expected_format: &'static str,
    },

    /// Input is well-formed but outside its allowed domain
    #[error("Invalid {field}: actual value {actual}, allowed {allowed_range}")]
    Validation {
        /// Offending field (wire name)
        field: &'static str,
        /// Rendered actual value
        actual: String,
        /// Human-readable allowed range
        allowed_range: String,
    },

    /// Row index does not continue the session sequence
    #[error("Row index is not monotonically increasing: got {actual}, expected {expected}")]
    RowSequence {
        /// Row index carried by the sample
        actual: i64,
        /// Row index the session expected next
        expected: i64,
    },

    /// Accepted-sample cap for the session is reached
    #[error("Exceeded allowed samples ({capacity})")]
    CapacityExceeded {
        /// Maximum number of accepted samples per session
        capacity: usize,
    },

    /// Operation not permitted in the current session state
    #[error("Invalid session state: {state}")]
    InvalidSessionState {
        /// Which lifecycle rule was broken
        state: SessionStateViolation,
    },

    /// Persistence targets for a new session could not be opened
    #[error("Session setup failed: {reason}")]
    SetupFailed {
        /// Underlying cause
        reason: String,
    },

    /// Invalid or unreadable configuration
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem
        message: String,
    },

    /// The task owning the session is gone
    #[error("Session service stopped")]
    ServiceStopped,

    /// I/O failure outside session setup
    #[error("I/O error while {context}: {message}")]
    Io {
        /// What was being attempted
        context: String,
        /// Rendered io::Error
        message: String,
    },
}

impl EisError {
    /// Build a validation error from any displayable actual value
    pub fn validation(
        field: &'static str,
        actual: impl fmt::Display,
        allowed_range: impl Into<String>,
    ) -> Self {
        EisError::Validation {
            field,
            actual: actual.to_string(),
            allowed_range: allowed_range.into(),
        }
    }

    /// Wrap an `std::io::Error` with a short description of the operation
    pub fn io(context: impl Into<String>, error: &std::io::Error) -> Self {
        EisError::Io {
            context: context.into(),
            message: error.to_string(),
        }
    }

    /// Session metadata was not supplied
    pub fn metadata_absent() -> Self {
        EisError::Format {
            field: field::METADATA,
            expected_format: "Valid EisMeta object",
        }
    }

    /// Sample was not supplied
    pub fn sample_absent() -> Self {
        EisError::Format {
            field: field::SAMPLE,
            expected_format: "Valid EisSample object",
        }
    }

    pub fn no_active_session() -> Self {
        EisError::InvalidSessionState {
            state: SessionStateViolation::NoActiveSession,
        }
    }

    pub fn already_active() -> Self {
        EisError::InvalidSessionState {
            state: SessionStateViolation::AlreadyActive,
        }
    }

    /// Error classification
    pub fn kind(&self) -> ErrorKind {
        match self {
            EisError::Format { .. } => ErrorKind::Format,
            EisError::Validation { .. } | EisError::RowSequence { .. } => ErrorKind::Validation,
            EisError::CapacityExceeded { .. } => ErrorKind::Capacity,
            EisError::InvalidSessionState { .. } => ErrorKind::SessionState,
            EisError::SetupFailed { .. } => ErrorKind::Setup,
            EisError::Configuration { .. } => ErrorKind::Configuration,
            EisError::Io { .. } => ErrorKind::Io,
            EisError::ServiceStopped => ErrorKind::Service,
        }
    }

    /// Field the error refers to, if any
    pub fn field(&self) -> Option<&'static str> {
        match self {
            EisError::Format { field: name, .. } | EisError::Validation { field: name, .. } => {
                Some(*name)
            }
            EisError::RowSequence { .. } => Some(field::ROW_INDEX),
            _ => None,
        }
    }

    /// Stable result code reported to remote callers
    pub fn code(&self) -> &'static str {
        match self {
            EisError::Format { field: name, .. } => match *name {
                field::METADATA => "metadata-absent",
                field::SAMPLE => "sample-absent",
                _ => "format-error",
            },
            EisError::Validation { field: name, .. } => match *name {
                field::BATTERY_ID => "invalid-battery-id",
                field::TEST_ID => "invalid-test-id",
                field::SOC => "invalid-soc",
                field::FILE_NAME => "missing-filename",
                field::TOTAL_ROWS => "invalid-total-rows",
                _ => "invalid-field",
            },
            EisError::RowSequence { .. } => "row-sequence-violation",
            EisError::CapacityExceeded { .. } => "capacity-exceeded",
            EisError::InvalidSessionState { state } => match state {
                SessionStateViolation::NoActiveSession => "no-active-session",
                SessionStateViolation::AlreadyActive => "already-active",
            },
            EisError::SetupFailed { .. } => "setup-failed",
            EisError::Configuration { .. } => "invalid-configuration",
            EisError::Io { .. } => "io-error",
            EisError::ServiceStopped => "service-stopped",
        }
    }
}
