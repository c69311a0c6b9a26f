//! Persistence of accepted rows, rejected rows and session summaries

use chrono::{DateTime, Utc};
use eis_core::{
    EisError, EisResult, SessionKey, SessionMetadata, ACCEPTED_CSV_HEADER, REJECTED_CSV_HEADER,
};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

pub const ACCEPTED_FILE: &str = "session.csv";
pub const REJECTED_FILE: &str = "rejects.csv";
pub const SUMMARY_FILE: &str = "session_summary.txt";

/// Line-oriented writer owned by one active session; closes on drop
pub trait RowWriter: Send {
    /// Append one CSV line (without trailing newline)
    fn write_line(&mut self, line: &str) -> EisResult<()>;
}

/// Storage collaborator of the session state machine
pub trait PersistenceSink: Send {
    fn accepted_writer(&mut self, session: &SessionMetadata) -> EisResult<Box<dyn RowWriter>>;

    fn rejected_writer(&mut self, session: &SessionMetadata) -> EisResult<Box<dyn RowWriter>>;

    fn write_summary(&mut self, summary: &SessionSummary) -> EisResult<()>;
}

/// Final counts of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub key: SessionKey,
    pub file_name: String,
    /// Rows announced by the caller
    pub declared: i64,
    pub accepted: usize,
    pub rejected: usize,
    pub generated_at: DateTime<Utc>,
}

impl SessionSummary {
    pub fn new(session: &SessionMetadata, accepted: usize, rejected: usize) -> Self {
        SessionSummary {
            key: session.key(),
            file_name: session.file_name.clone(),
            declared: session.total_rows,
            accepted,
            rejected,
            generated_at: Utc::now(),
        }
    }

    /// `accepted * 100 / declared`, 0 when nothing was declared
    pub fn success_rate(&self) -> f64 {
        if self.declared > 0 {
            self.accepted as f64 * 100.0 / self.declared as f64
        } else {
            0.0
        }
    }

    /// Plain-text report written next to the session CSVs
    pub fn render(&self) -> String {
        let mut lines = vec![
            "Battery Analysis Session Summary".to_string(),
            format!("Generated: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")),
            String::new(),
            format!("Battery ID: {}", self.key.battery_id),
            format!("Test ID: {}", self.key.test_id),
            format!("State of Charge: {}%", self.key.soc),
            format!("Original File: {}", self.file_name),
            String::new(),
            format!("Declared (client) Samples: {}", self.declared),
            format!("Accepted (success) Samples: {}", self.accepted),
            format!("Rejected Samples: {}", self.rejected),
            format!("Success Rate: {:.1}%", self.success_rate()),
        ];
        lines.push(String::new());
        lines.join("\n")
    }
}

/// Writes every session into `<root>/<battery>/<test>/<soc>%/`
#[derive(Debug, Clone)]
pub struct CsvDirectorySink {
    root: PathBuf,
}

impl CsvDirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        CsvDirectorySink { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, key: &SessionKey) -> PathBuf {
        self.root.join(key.relative_dir())
    }

    fn open(&self, session: &SessionMetadata, file: &str, header: &str) -> EisResult<Box<dyn RowWriter>> {
        let dir = self.session_dir(&session.key());
        fs::create_dir_all(&dir).map_err(|e| EisError::SetupFailed {
            reason: format!("creating {}: {}", dir.display(), e),
        })?;

        let path = dir.join(file);
        let mut writer = CsvRowWriter::create(&path).map_err(|e| EisError::SetupFailed {
            reason: format!("opening {}: {}", path.display(), e),
        })?;
        writer.write_line(header).map_err(|e| EisError::SetupFailed {
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), "session file opened");
        Ok(Box::new(writer))
    }
}

impl PersistenceSink for CsvDirectorySink {
    fn accepted_writer(&mut self, session: &SessionMetadata) -> EisResult<Box<dyn RowWriter>> {
        self.open(session, ACCEPTED_FILE, ACCEPTED_CSV_HEADER)
    }

    fn rejected_writer(&mut self, session: &SessionMetadata) -> EisResult<Box<dyn RowWriter>> {
        self.open(session, REJECTED_FILE, REJECTED_CSV_HEADER)
    }

    fn write_summary(&mut self, summary: &SessionSummary) -> EisResult<()> {
        let dir = self.session_dir(&summary.key);
        fs::create_dir_all(&dir)
            .map_err(|e| EisError::io(format!("creating {}", dir.display()), &e))?;
        let path = dir.join(SUMMARY_FILE);
        fs::write(&path, summary.render())
            .map_err(|e| EisError::io(format!("writing {}", path.display()), &e))
    }
}

/// File-backed row writer; each line is flushed as it is written
pub struct CsvRowWriter {
    path: PathBuf,
    file: LineWriter<File>,
}

impl CsvRowWriter {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(CsvRowWriter {
            path: path.to_path_buf(),
            file: LineWriter::new(file),
        })
    }
}

impl RowWriter for CsvRowWriter {
    fn write_line(&mut self, line: &str) -> EisResult<()> {
        writeln!(self.file, "{}", line)
            .and_then(|_| self.file.flush())
            .map_err(|e| EisError::io(format!("writing {}", self.path.display()), &e))
    }
}

impl Drop for CsvRowWriter {
    fn drop(&mut self) {
        if let Err(e) = self.file.flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "flush on close failed");
        }
    }
}

/// Everything a [`MemorySink`] has received
#[derive(Debug, Clone, Default)]
pub struct MemoryRecord {
    pub accepted: Vec<String>,
    pub rejected: Vec<String>,
    pub summaries: Vec<SessionSummary>,
    /// Writers opened and not yet dropped
    pub open_writers: usize,
}

/// In-memory sink; clones share the same record
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    record: Arc<Mutex<MemoryRecord>>,
    fail_rejected_writer: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `rejected_writer` request fail
    pub fn failing_rejected_writer(mut self) -> Self {
        self.fail_rejected_writer = true;
        self
    }

    pub fn record(&self) -> MemoryRecord {
        lock(&self.record).clone()
    }

    fn writer(&self, target: MemoryTarget) -> Box<dyn RowWriter> {
        lock(&self.record).open_writers += 1;
        Box::new(MemoryRowWriter {
            record: Arc::clone(&self.record),
            target,
        })
    }
}

impl PersistenceSink for MemorySink {
    fn accepted_writer(&mut self, _session: &SessionMetadata) -> EisResult<Box<dyn RowWriter>> {
        Ok(self.writer(MemoryTarget::Accepted))
    }

    fn rejected_writer(&mut self, session: &SessionMetadata) -> EisResult<Box<dyn RowWriter>> {
        if self.fail_rejected_writer {
            return Err(EisError::SetupFailed {
                reason: format!("rejected writer unavailable for {}", session.key()),
            });
        }
        Ok(self.writer(MemoryTarget::Rejected))
    }

    fn write_summary(&mut self, summary: &SessionSummary) -> EisResult<()> {
        lock(&self.record).summaries.push(summary.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum MemoryTarget {
    Accepted,
    Rejected,
}

struct MemoryRowWriter {
    record: Arc<Mutex<MemoryRecord>>,
    target: MemoryTarget,
}

impl RowWriter for MemoryRowWriter {
    fn write_line(&mut self, line: &str) -> EisResult<()> {
        let mut record = lock(&self.record);
        match self.target {
            MemoryTarget::Accepted => record.accepted.push(line.to_string()),
            MemoryTarget::Rejected => record.rejected.push(line.to_string()),
        }
        Ok(())
    }
}

impl Drop for MemoryRowWriter {
    fn drop(&mut self) {
        let mut record = lock(&self.record);
        record.open_writers = record.open_writers.saturating_sub(1);
    }
}

fn lock(record: &Mutex<MemoryRecord>) -> MutexGuard<'_, MemoryRecord> {
    record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use eis_core::{rejected_csv_row, Sample};

    fn meta() -> SessionMetadata {
        SessionMetadata::new("B01", "Test_1", 50, "f.csv", 2)
    }

    #[test]
    fn test_summary_render() {
        let mut summary = SessionSummary::new(&meta(), 1, 1);
        summary.declared = 3;
        let text = summary.render();
        assert!(text.starts_with("Battery Analysis Session Summary\n"));
        assert!(text.contains("Battery ID: B01"));
        assert!(text.contains("State of Charge: 50%"));
        assert!(text.contains("Original File: f.csv"));
        assert!(text.contains("Declared (client) Samples: 3"));
        assert!(text.contains("Success Rate: 33.3%"));
    }

    #[test]
    fn test_success_rate_without_declared_rows() {
        let mut summary = SessionSummary::new(&meta(), 0, 0);
        summary.declared = 0;
        assert_eq!(summary.success_rate(), 0.0);
    }

    #[test]
    fn test_csv_directory_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvDirectorySink::new(dir.path());
        let meta = meta();

        {
            let mut accepted = sink.accepted_writer(&meta).unwrap();
            let mut rejected = sink.rejected_writer(&meta).unwrap();
            let sample = Sample::new(1000.0, 0.1, -0.05, 3.7, 25.0, 1000.0, 0);
            accepted.write_line(&sample.to_csv_row()).unwrap();
            rejected.write_line(&rejected_csv_row(None, "Sample cannot be null")).unwrap();
        }
        sink.write_summary(&SessionSummary::new(&meta, 1, 1)).unwrap();

        let session_dir = dir.path().join("B01").join("Test_1").join("50%");
        let accepted = fs::read_to_string(session_dir.join(ACCEPTED_FILE)).unwrap();
        assert_eq!(accepted, format!("{}\n1000,0.1,-0.05,3.7,25,1000,0\n", ACCEPTED_CSV_HEADER));

        let rejected = fs::read_to_string(session_dir.join(REJECTED_FILE)).unwrap();
        let lines: Vec<_> = rejected.lines().collect();
        assert_eq!(lines, vec![REJECTED_CSV_HEADER, ",,,,,,,\"Sample cannot be null\""]);

        let summary = fs::read_to_string(session_dir.join(SUMMARY_FILE)).unwrap();
        assert!(summary.contains("Success Rate: 50.0%"));
    }

    #[test]
    fn test_csv_setup_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let mut sink = CsvDirectorySink::new(&blocker);
        let err = sink.accepted_writer(&meta()).err().unwrap();
        assert_eq!(err.code(), "setup-failed");
    }

    #[test]
    fn test_memory_sink_tracks_writers() {
        let sink = MemorySink::new();
        let mut handle = sink.clone();
        {
            let mut writer = handle.accepted_writer(&meta()).unwrap();
            writer.write_line("a").unwrap();
            assert_eq!(sink.record().open_writers, 1);
        }
        let record = sink.record();
        assert_eq!(record.accepted, vec!["a".to_string()]);
        assert_eq!(record.open_writers, 0);

        let mut failing = MemorySink::new().failing_rejected_writer();
        assert!(failing.rejected_writer(&meta()).is_err());
    }
}
