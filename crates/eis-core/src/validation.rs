//! Stateless domain checks for session metadata and samples
//!
//! Each check reports the first failing field only; callers decide what to do
//! with the rejected input.

use crate::error::{EisError, EisResult};
use crate::model::{field, Sample, SessionMetadata, TestId};

/// Lowest accepted state of charge
pub const MIN_SOC: i32 = 5;
/// Highest accepted state of charge
pub const MAX_SOC: i32 = 100;
/// Granularity of the state-of-charge ladder
pub const SOC_STEP: i32 = 5;

/// Validate session metadata; `None` is a format error
pub fn validate_metadata(meta: Option<&SessionMetadata>) -> EisResult<()> {
    let meta = meta.ok_or_else(EisError::metadata_absent)?;

    validate_battery_id(&meta.battery_id)?;

    if meta.test_id.trim().is_empty() || meta.parsed_test_id().is_err() {
        return Err(EisError::validation(
            field::TEST_ID,
            &meta.test_id,
            TestId::ALL.map(|id| id.as_str()).join(" or "),
        ));
    }

    validate_soc(meta.soc)?;

    if meta.file_name.trim().is_empty() {
        return Err(EisError::validation(
            field::FILE_NAME,
            &meta.file_name,
            "Non-empty string",
        ));
    }

    if meta.total_rows <= 0 {
        return Err(EisError::validation(
            field::TOTAL_ROWS,
            meta.total_rows,
            "Expected: > 0",
        ));
    }

    Ok(())
}

/// `B` followed by exactly two ASCII digits
pub fn validate_battery_id(battery_id: &str) -> EisResult<()> {
    let bytes = battery_id.as_bytes();
    let well_formed = bytes.len() == 3
        && bytes[0] == b'B'
        && bytes[1..].iter().all(|b| b.is_ascii_digit());

    if well_formed {
        Ok(())
    } else {
        Err(EisError::validation(
            field::BATTERY_ID,
            battery_id,
            "B followed by two digits (B01-B99)",
        ))
    }
}

/// State of charge on the 5% ladder
pub fn validate_soc(soc: i32) -> EisResult<()> {
    if (MIN_SOC..=MAX_SOC).contains(&soc) && soc % SOC_STEP == 0 {
        Ok(())
    } else {
        Err(EisError::validation(
            field::SOC,
            soc,
            "5, 10, 15, ..., 100 (multiples of 5)",
        ))
    }
}

/// Validate one sample's fields; `None` is a format error
pub fn validate_sample(sample: Option<&Sample>) -> EisResult<()> {
    let sample = sample.ok_or_else(EisError::sample_absent)?;

    if !sample.frequency_hz.is_finite() || sample.frequency_hz <= 0.0 {
        return Err(EisError::validation(
            field::FREQUENCY,
            sample.frequency_hz,
            "Positive real number > 0",
        ));
    }

    require_finite(field::REAL, sample.r_ohm)?;
    require_finite(field::IMAGINARY, sample.x_ohm)?;

    if !sample.voltage.is_finite() || sample.voltage < 0.0 {
        return Err(EisError::validation(
            field::VOLTAGE,
            sample.voltage,
            "Non-negative real number",
        ));
    }

    require_finite(field::TEMPERATURE, sample.temperature_c)?;

    if !sample.range_ohm.is_finite() || sample.range_ohm <= 0.0 {
        return Err(EisError::validation(
            field::RANGE,
            sample.range_ohm,
            "Positive real number > 0",
        ));
    }

    if sample.row_index < 0 {
        return Err(EisError::validation(
            field::ROW_INDEX,
            sample.row_index,
            "Non-negative integer >= 0",
        ));
    }

    Ok(())
}

/// Row index must equal the next expected position
pub fn validate_row_sequence(row_index: i64, expected: i64) -> EisResult<()> {
    if row_index == expected {
        Ok(())
    } else {
        Err(EisError::RowSequence {
            actual: row_index,
            expected,
        })
    }
}

fn require_finite(name: &'static str, value: f64) -> EisResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(EisError::validation(name, value, "Valid real number"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_meta() -> SessionMetadata {
        SessionMetadata::new("B01", "Test_1", 50, "f.csv", 2)
    }

    fn valid_sample() -> Sample {
        Sample::new(1000.0, 0.1, -0.05, 3.70, 25.0, 1000.0, 0)
    }

    #[test]
    fn test_valid_metadata() {
        assert!(validate_metadata(Some(&valid_meta())).is_ok());

        for soc in (5..=100).step_by(5) {
            let mut meta = valid_meta();
            meta.soc = soc;
            assert!(validate_metadata(Some(&meta)).is_ok(), "SoC {} rejected", soc);
        }
    }

    #[test]
    fn test_absent_metadata() {
        let err = validate_metadata(None).unwrap_err();
        assert_eq!(err.code(), "metadata-absent");
    }

    #[test]
    fn test_battery_id_pattern() {
        for bad in ["", "B1", "B001", "C01", "b01", "BAB", "B0x"] {
            let mut meta = valid_meta();
            meta.battery_id = bad.to_string();
            let err = validate_metadata(Some(&meta)).unwrap_err();
            assert_eq!(err.code(), "invalid-battery-id", "{:?} accepted", bad);
        }
        assert!(validate_battery_id("B11").is_ok());
    }

    #[test]
    fn test_metadata_check_order() {
        // Several bad fields: the first one in check order wins
        let meta = SessionMetadata::new("B01", "Test_9", 7, "", 0);
        let err = validate_metadata(Some(&meta)).unwrap_err();
        assert_eq!(err.code(), "invalid-test-id");

        let meta = SessionMetadata::new("B01", "Test_2", 7, "", 0);
        assert_eq!(validate_metadata(Some(&meta)).unwrap_err().code(), "invalid-soc");

        let meta = SessionMetadata::new("B01", "Test_2", 10, "  ", 0);
        assert_eq!(validate_metadata(Some(&meta)).unwrap_err().code(), "missing-filename");

        let meta = SessionMetadata::new("B01", "Test_2", 10, "10.csv", 0);
        let err = validate_metadata(Some(&meta)).unwrap_err();
        assert_eq!(err.code(), "invalid-total-rows");
        match err {
            EisError::Validation { actual, allowed_range, .. } => {
                assert_eq!(actual, "0");
                assert_eq!(allowed_range, "Expected: > 0");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_soc_bounds() {
        for bad in [0, 3, 101, 105, -5, 52] {
            assert!(validate_soc(bad).is_err(), "SoC {} accepted", bad);
        }
    }

    #[test]
    fn test_valid_sample_with_any_sign_components() {
        let mut sample = valid_sample();
        sample.r_ohm = -0.2;
        sample.x_ohm = 0.3;
        sample.temperature_c = -10.0;
        sample.voltage = 0.0;
        assert!(validate_sample(Some(&sample)).is_ok());
    }

    #[test]
    fn test_sample_field_failures() {
        let cases: [(fn(&mut Sample), &str); 8] = [
            (|s| s.frequency_hz = 0.0, field::FREQUENCY),
            (|s| s.frequency_hz = f64::INFINITY, field::FREQUENCY),
            (|s| s.r_ohm = f64::NAN, field::REAL),
            (|s| s.x_ohm = f64::NEG_INFINITY, field::IMAGINARY),
            (|s| s.voltage = -0.01, field::VOLTAGE),
            (|s| s.temperature_c = f64::NAN, field::TEMPERATURE),
            (|s| s.range_ohm = 0.0, field::RANGE),
            (|s| s.row_index = -1, field::ROW_INDEX),
        ];

        for (mutate, expected_field) in cases {
            let mut sample = valid_sample();
            mutate(&mut sample);
            let err = validate_sample(Some(&sample)).unwrap_err();
            assert_eq!(err.field(), Some(expected_field));
            assert_eq!(err.code(), "invalid-field");
        }
    }

    #[test]
    fn test_absent_sample() {
        assert_eq!(validate_sample(None).unwrap_err().code(), "sample-absent");
    }

    #[test]
    fn test_row_sequence() {
        assert!(validate_row_sequence(3, 3).is_ok());
        let err = validate_row_sequence(2, 1).unwrap_err();
        assert_eq!(err, EisError::RowSequence { actual: 2, expected: 1 });
        assert_eq!(err.code(), "row-sequence-violation");
    }
}
