//! EIS-Core: Foundation types for battery impedance ingestion
//!
//! Measurement records, session metadata, validation rules, running
//! statistics and the notification vocabulary shared by the other crates.

pub mod error;
pub mod events;
pub mod model;
pub mod stats;
pub mod validation;

pub use error::{EisError, EisResult, ErrorKind, SessionStateViolation};
pub use events::*;
pub use model::{
    field, rejected_csv_row, Sample, SessionKey, SessionMetadata, TestId, ACCEPTED_CSV_HEADER,
    REJECTED_CSV_HEADER,
};
pub use stats::{RunningMean, SeriesStats};
pub use validation::{validate_metadata, validate_row_sequence, validate_sample};
