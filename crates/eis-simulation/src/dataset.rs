//! Loader for the on-disk EIS dataset
//!
//! Expected layout: `<root>/Bxx/<EIS measurement dir>/Test_1|Test_2/*.csv`,
//! one CSV per state of charge with the SoC somewhere in the file name.

use eis_core::{EisError, EisResult, Sample, SessionMetadata};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::generator::ROWS_PER_SWEEP;

/// Column count of a data row
const FIELDS_PER_ROW: usize = 6;

const HEADER_KEYWORDS: [&str; 5] = ["frequency", "impedance", "voltage", "temperature", "range"];

/// One fully parsed SoC file
#[derive(Debug, Clone)]
pub struct DatasetFile {
    pub metadata: SessionMetadata,
    pub samples: Vec<Sample>,
    pub path: PathBuf,
}

/// Result of a dataset walk
#[derive(Debug, Clone, Default)]
pub struct DatasetScan {
    pub files: Vec<DatasetFile>,
    /// Human-readable notes about skipped files and rows
    pub warnings: Vec<String>,
}

impl DatasetScan {
    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Walks a dataset tree and parses every SoC file
#[derive(Debug, Clone)]
pub struct DatasetLoader {
    root: PathBuf,
    expected_rows: usize,
}

impl DatasetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DatasetLoader {
            root: root.into(),
            expected_rows: ROWS_PER_SWEEP,
        }
    }

    /// Files whose row count differs are skipped
    pub fn with_expected_rows(mut self, rows: usize) -> Self {
        self.expected_rows = rows;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load(&self) -> EisResult<DatasetScan> {
        let mut scan = DatasetScan::default();

        for battery_dir in sorted_dirs(&self.root, is_battery_dir)? {
            let battery_id = dir_name(&battery_dir).to_ascii_uppercase();

            let Some(eis_dir) = find_eis_dir(&battery_dir)? else {
                scan.warn(format!("No EIS measurement directory found in {}", battery_id));
                continue;
            };

            for test_dir in sorted_dirs(&eis_dir, is_test_dir)? {
                let test_id = normalize_test_id(dir_name(&test_dir));
                self.load_test_dir(&test_dir, &battery_id, &test_id, &mut scan)?;
            }
        }

        info!(
            root = %self.root.display(),
            files = scan.files.len(),
            warnings = scan.warnings.len(),
            "dataset scanned"
        );
        Ok(scan)
    }

    fn load_test_dir(
        &self,
        test_dir: &Path,
        battery_id: &str,
        test_id: &str,
        scan: &mut DatasetScan,
    ) -> EisResult<()> {
        let mut csv_files: Vec<PathBuf> = fs::read_dir(test_dir)
            .map_err(|e| EisError::io(format!("listing {}", test_dir.display()), &e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .map_or(false, |ext| ext.eq_ignore_ascii_case("csv"))
            })
            .collect();
        csv_files.sort();

        let mut loaded = Vec::new();
        for path in csv_files {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();

            let Some(soc) = soc_from_file_name(&stem) else {
                scan.warn(format!("Could not extract SoC from file name: {}", stem));
                continue;
            };

            let samples = match parse_csv(&path, scan) {
                Ok(samples) => samples,
                Err(e) => {
                    scan.warn(format!("Failed to read {}: {}", path.display(), e));
                    continue;
                }
            };

            if samples.is_empty() {
                scan.warn(format!("No valid samples found in: {}", stem));
                continue;
            }

            if samples.len() != self.expected_rows {
                scan.warn(format!(
                    "Expected {} rows but found {} in {}",
                    self.expected_rows,
                    samples.len(),
                    stem
                ));
                continue;
            }

            let file_name = path
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let metadata =
                SessionMetadata::new(battery_id, test_id, soc, file_name, samples.len() as i64);
            info!(session = %metadata.key(), rows = samples.len(), "dataset file loaded");

            loaded.push(DatasetFile {
                metadata,
                samples,
                path,
            });
        }

        loaded.sort_by_key(|f| f.metadata.soc);
        scan.files.extend(loaded);
        Ok(())
    }
}

/// First run of digits that is a valid SoC level (5, 10, ..., 100)
pub fn soc_from_file_name(stem: &str) -> Option<i32> {
    stem.split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty())
        .filter_map(|run| run.parse::<i32>().ok())
        .find(|soc| (5..=100).contains(soc) && soc % 5 == 0)
}

/// Parse one data row; `None` for anything malformed
pub fn parse_row(line: &str, row_index: i64) -> Option<Sample> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < FIELDS_PER_ROW {
        return None;
    }

    let mut values = [0.0f64; FIELDS_PER_ROW];
    for (slot, raw) in values.iter_mut().zip(&fields) {
        *slot = raw.parse().ok()?;
    }

    let [frequency, r, x, v, t, range] = values;
    if frequency <= 0.0 {
        return None;
    }

    Some(Sample::new(frequency, r, x, v, t, range, row_index))
}

fn is_header_line(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    HEADER_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn parse_csv(path: &Path, scan: &mut DatasetScan) -> std::io::Result<Vec<Sample>> {
    let content = fs::read_to_string(path)?;
    let file_name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();

    let mut samples = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        if line_no == 0 && is_header_line(line) {
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        match parse_row(line, samples.len() as i64) {
            Some(sample) => samples.push(sample),
            None => scan.warn(format!(
                "Invalid row in {}, line {}: {}",
                file_name,
                line_no + 1,
                line
            )),
        }
    }

    Ok(samples)
}

fn sorted_dirs(parent: &Path, accept: fn(&str) -> bool) -> EisResult<Vec<PathBuf>> {
    let entries = fs::read_dir(parent)
        .map_err(|e| EisError::io(format!("listing {}", parent.display()), &e))?;

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir() && accept(dir_name(path)))
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn find_eis_dir(battery_dir: &Path) -> EisResult<Option<PathBuf>> {
    let preferred = battery_dir.join("EIS Measurement");
    if preferred.is_dir() {
        return Ok(Some(preferred));
    }
    let candidates = sorted_dirs(battery_dir, |name| name.to_ascii_lowercase().contains("eis"))?;
    Ok(candidates.into_iter().next())
}

fn dir_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

fn is_battery_dir(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == 3
        && bytes[0].eq_ignore_ascii_case(&b'B')
        && bytes[1..].iter().all(|b| b.is_ascii_digit())
}

fn is_test_dir(name: &str) -> bool {
    name.eq_ignore_ascii_case("Test_1") || name.eq_ignore_ascii_case("Test_2")
}

fn normalize_test_id(name: &str) -> String {
    if name.eq_ignore_ascii_case("Test_1") {
        "Test_1".to_string()
    } else if name.eq_ignore_ascii_case("Test_2") {
        "Test_2".to_string()
    } else {
        name.to_string()
    }
}
