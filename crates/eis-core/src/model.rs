//! EIS measurement records and session metadata

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{EisError, EisResult};

/// Wire names of every validated field
pub mod field {
    pub const METADATA: &str = "EisMeta";
    pub const BATTERY_ID: &str = "BatteryId";
    pub const TEST_ID: &str = "TestId";
    pub const SOC: &str = "SoC";
    pub const FILE_NAME: &str = "FileName";
    pub const TOTAL_ROWS: &str = "TotalRows";

    pub const SAMPLE: &str = "EisSample";
    pub const FREQUENCY: &str = "FrequencyHz";
    pub const REAL: &str = "R_ohm";
    pub const IMAGINARY: &str = "X_ohm";
    pub const VOLTAGE: &str = "V";
    pub const TEMPERATURE: &str = "T_degC";
    pub const RANGE: &str = "Range_ohm";
    pub const ROW_INDEX: &str = "RowIndex";
}

/// Header of the accepted-rows CSV
pub const ACCEPTED_CSV_HEADER: &str = "FrequencyHz,R_ohm,X_ohm,V,T_degC,Range_ohm,RowIndex";

/// Header of the rejected-rows CSV
pub const REJECTED_CSV_HEADER: &str =
    "FrequencyHz,R_ohm,X_ohm,V,T_degC,Range_ohm,RowIndex,RejectReason";

/// Test procedure identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestId {
    #[serde(rename = "Test_1")]
    Test1,
    #[serde(rename = "Test_2")]
    Test2,
}

impl TestId {
    pub const ALL: [TestId; 2] = [TestId::Test1, TestId::Test2];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestId::Test1 => "Test_1",
            TestId::Test2 => "Test_2",
        }
    }
}

impl FromStr for TestId {
    type Err = EisError;

    fn from_str(s: &str) -> EisResult<Self> {
        TestId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| EisError::validation(field::TEST_ID, s, "Test_1 or Test_2"))
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of one test session, declared by the caller at start
///
/// Fields stay raw (strings/integers) so that validation can report exactly
/// what the caller sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Battery under test, `B` followed by two digits
    #[serde(rename = "BatteryId")]
    pub battery_id: String,
    /// Test procedure, `Test_1` or `Test_2`
    #[serde(rename = "TestId")]
    pub test_id: String,
    /// State of charge in percent (multiple of 5, 5..=100)
    #[serde(rename = "SoC")]
    pub soc: i32,
    /// Source file the samples were read from
    #[serde(rename = "FileName")]
    pub file_name: String,
    /// Number of rows the caller intends to send
    #[serde(rename = "TotalRows")]
    pub total_rows: i64,
}

impl SessionMetadata {
    pub fn new(
        battery_id: impl Into<String>,
        test_id: impl Into<String>,
        soc: i32,
        file_name: impl Into<String>,
        total_rows: i64,
    ) -> Self {
        SessionMetadata {
            battery_id: battery_id.into(),
            test_id: test_id.into(),
            soc,
            file_name: file_name.into(),
            total_rows,
        }
    }

    /// Identifying (battery, test, SoC) triple
    pub fn key(&self) -> SessionKey {
        SessionKey {
            battery_id: self.battery_id.clone(),
            test_id: self.test_id.clone(),
            soc: self.soc,
        }
    }

    pub fn parsed_test_id(&self) -> EisResult<TestId> {
        self.test_id.parse()
    }

    /// Whether a reading recorded under `key` belongs to this session
    pub fn matches(&self, key: &SessionKey) -> bool {
        key.battery_id == self.battery_id && key.test_id == self.test_id && key.soc == self.soc
    }
}

/// Identity of a session: battery, test and state of charge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub battery_id: String,
    pub test_id: String,
    pub soc: i32,
}

impl SessionKey {
    /// `B01/Test_1/50%` as a relative directory
    pub fn relative_dir(&self) -> PathBuf {
        PathBuf::from(&self.battery_id)
            .join(&self.test_id)
            .join(format!("{}%", self.soc))
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}%", self.battery_id, self.test_id, self.soc)
    }
}

/// One electrochemical impedance measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Excitation frequency in Hz
    #[serde(rename = "FrequencyHz")]
    pub frequency_hz: f64,
    /// Real impedance component in ohm
    #[serde(rename = "R_ohm")]
    pub r_ohm: f64,
    /// Imaginary impedance component in ohm
    #[serde(rename = "X_ohm")]
    pub x_ohm: f64,
    /// Cell voltage in V
    #[serde(rename = "V")]
    pub voltage: f64,
    /// Cell temperature in °C
    #[serde(rename = "T_degC")]
    pub temperature_c: f64,
    /// Instrument measurement range in ohm
    #[serde(rename = "Range_ohm")]
    pub range_ohm: f64,
    /// Zero-based position in the session sequence
    #[serde(rename = "RowIndex")]
    pub row_index: i64,
}

impl Sample {
    pub fn new(
        frequency_hz: f64,
        r_ohm: f64,
        x_ohm: f64,
        voltage: f64,
        temperature_c: f64,
        range_ohm: f64,
        row_index: i64,
    ) -> Self {
        Sample {
            frequency_hz,
            r_ohm,
            x_ohm,
            voltage,
            temperature_c,
            range_ohm,
            row_index,
        }
    }

    pub fn with_row_index(mut self, row_index: i64) -> Self {
        self.row_index = row_index;
        self
    }

    /// Complex impedance `R + jX`
    pub fn impedance(&self) -> Complex64 {
        Complex64::new(self.r_ohm, self.x_ohm)
    }

    /// `sqrt(R² + X²)`
    pub fn impedance_magnitude(&self) -> f64 {
        self.impedance().norm()
    }

    /// Accepted-rows CSV line (no trailing newline)
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.frequency_hz,
            self.r_ohm,
            self.x_ohm,
            self.voltage,
            self.temperature_c,
            self.range_ohm,
            self.row_index
        )
    }
}

/// Rejected-rows CSV line; an absent sample leaves the seven value columns empty
pub fn rejected_csv_row(sample: Option<&Sample>, reason: &str) -> String {
    let reason = reason.replace('"', "\"\"");
    match sample {
        Some(sample) => format!("{},\"{}\"", sample.to_csv_row(), reason),
        None => format!(",,,,,,,\"{}\"", reason),
    }
}
