//! Shared utilities for the pipeline.
//!
//! This module contains helpers used across the loader, the classifier and
//! the join so that type checks and text handling stay consistent.

use crate::config::SourceEncoding;
use polars::prelude::*;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Read a column as owned optional strings, casting when needed.
pub fn string_values(df: &DataFrame, column: &str) -> PolarsResult<Vec<Option<String>>> {
    let series = df.column(column)?.as_materialized_series().cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Read a numeric column as optional `f64` values.
pub fn f64_values(df: &DataFrame, column: &str) -> PolarsResult<Vec<Option<f64>>> {
    let series = df.column(column)?.as_materialized_series().cast(&DataType::Float64)?;
    Ok(series.f64()?.into_iter().collect())
}

// =============================================================================
// Text Utilities
// =============================================================================

/// Parse an indicator cell. Surrounding whitespace is ignored; NaN counts as missing.
///
/// # Example
///
/// ```rust,ignore
/// use pcn_pipeline::utils::parse_indicator_value;
///
/// assert_eq!(parse_indicator_value(" 87.5 "), Some(87.5));
/// assert_eq!(parse_indicator_value("87%"), None);
/// ```
pub fn parse_indicator_value(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(v) if !v.is_nan() => Some(v),
        _ => None,
    }
}

/// Decode raw source bytes.
///
/// Latin-1 maps every byte to the code point of the same value, so it never
/// fails. `Auto` prefers UTF-8 and falls back to Latin-1.
pub fn decode_text(bytes: &[u8], encoding: SourceEncoding) -> Result<String, std::str::Utf8Error> {
    match encoding {
        SourceEncoding::Utf8 => std::str::from_utf8(bytes).map(str::to_string),
        SourceEncoding::Latin1 => Ok(decode_latin1(bytes)),
        SourceEncoding::Auto => Ok(match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => decode_latin1(bytes),
        }),
    }
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Strip a UTF-8 byte order mark if present.
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_numeric_dtype() {
        assert!(is_numeric_dtype(&DataType::Int64));
        assert!(is_numeric_dtype(&DataType::Float64));
        assert!(!is_numeric_dtype(&DataType::String));
        assert!(!is_numeric_dtype(&DataType::Boolean));
    }

    #[test]
    fn test_parse_indicator_value() {
        assert_eq!(parse_indicator_value("42"), Some(42.0));
        assert_eq!(parse_indicator_value(" -3.5 "), Some(-3.5));
        assert_eq!(parse_indicator_value("1e2"), Some(100.0));
        assert_eq!(parse_indicator_value(""), None);
        assert_eq!(parse_indicator_value("NaN"), None);
        assert_eq!(parse_indicator_value("75%"), None);
        assert_eq!(parse_indicator_value("1,234"), None);
    }

    #[test]
    fn test_decode_latin1() {
        let bytes = b"Murang\xe1";
        assert_eq!(decode_text(bytes, SourceEncoding::Latin1).unwrap(), "Murangá");
        assert_eq!(decode_text(bytes, SourceEncoding::Auto).unwrap(), "Murangá");
        assert!(decode_text(bytes, SourceEncoding::Utf8).is_err());
    }

    #[test]
    fn test_decode_auto_prefers_utf8() {
        let bytes = "Murangá".as_bytes();
        assert_eq!(decode_text(bytes, SourceEncoding::Auto).unwrap(), "Murangá");
    }

    #[test]
    fn test_strip_bom() {
        assert_eq!(strip_bom("\u{feff}County,Score"), "County,Score");
        assert_eq!(strip_bom("County"), "County");
    }

    #[test]
    fn test_string_and_f64_values() {
        let df = df![
            "a" => [Some("x"), None],
            "b" => [Some(1.0), None],
        ]
        .unwrap();
        assert_eq!(string_values(&df, "a").unwrap(), vec![Some("x".to_string()), None]);
        assert_eq!(f64_values(&df, "b").unwrap(), vec![Some(1.0), None]);
    }
}
