//! Cleaning stage for raw survey tables.
//!
//! This module provides:
//! - Header repair (line breaks, stray and repeated whitespace)
//! - Column-name disambiguation for repaired headers
//! - Numeric coercion of indicator columns with sentinel handling

mod coercion;
mod headers;

pub use coercion::{CellValue, CoercionStats, ColumnCoercion, IndicatorCoercer};
pub use headers::{clean_header, clean_headers, disambiguate_headers};
