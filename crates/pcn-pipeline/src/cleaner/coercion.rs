//! Numeric coercion of indicator columns.
//!
//! Order matters: sentinels become missing, the rest is parsed, rows with no
//! indicator data at all are dropped, and only then are the remaining gaps
//! filled. Filling earlier would turn blank trailing rows into real regions
//! with all-zero scores.

use crate::config::LoaderConfig;
use crate::utils::{is_numeric_dtype, parse_indicator_value};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Outcome of coercing one raw cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellValue {
    /// Parsed numeric value
    Number(f64),
    /// Null in the source
    Null,
    /// Matched a configured sentinel token
    Sentinel,
    /// Non-numeric text
    Unparseable,
}

impl CellValue {
    pub fn number(&self) -> Option<f64> {
        match self {
            CellValue::Number(v) => Some(*v),
            _ => None,
        }
    }
}

/// Per-column coercion counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnCoercion {
    pub column: String,
    pub parsed: usize,
    pub sentinels: usize,
    pub unparseable: usize,
    pub filled: usize,
}

/// Summary of a coercion pass over a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoercionStats {
    pub rows_before: usize,
    pub rows_dropped: usize,
    pub sentinels_replaced: usize,
    pub unparseable_cells: usize,
    pub cells_filled: usize,
    pub columns: Vec<ColumnCoercion>,
}

impl CoercionStats {
    pub fn rows_after(&self) -> usize {
        self.rows_before - self.rows_dropped
    }
}

/// Converts indicator columns from text to `Float64`.
#[derive(Debug, Clone)]
pub struct IndicatorCoercer {
    sentinels: HashSet<String>,
    fill_value: f64,
}

impl IndicatorCoercer {
    pub fn new<I, S>(sentinels: I, fill_value: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sentinels: sentinels.into_iter().map(Into::into).collect(),
            fill_value,
        }
    }

    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(config.sentinels.iter().cloned(), config.fill_value)
    }

    pub fn fill_value(&self) -> f64 {
        self.fill_value
    }

    /// Classify a single raw cell.
    pub fn coerce_value(&self, raw: Option<&str>) -> CellValue {
        match raw {
            None => CellValue::Null,
            Some(text) if self.sentinels.contains(text) => CellValue::Sentinel,
            Some(text) => match parse_indicator_value(text) {
                Some(value) => CellValue::Number(value),
                None => CellValue::Unparseable,
            },
        }
    }

    /// Coerce one column to optional numbers without filling.
    pub fn coerce_column(&self, series: &Series) -> PolarsResult<(Vec<Option<f64>>, ColumnCoercion)> {
        let mut stats = ColumnCoercion {
            column: series.name().to_string(),
            ..ColumnCoercion::default()
        };

        let cells: Vec<CellValue> = if is_numeric_dtype(series.dtype()) {
            let floats = series.cast(&DataType::Float64)?;
            floats
                .f64()?
                .into_iter()
                .map(|v| match v {
                    Some(v) if !v.is_nan() => CellValue::Number(v),
                    _ => CellValue::Null,
                })
                .collect()
        } else {
            let text = series.cast(&DataType::String)?;
            text.str()?
                .into_iter()
                .map(|v| self.coerce_value(v))
                .collect()
        };

        let mut values = Vec::with_capacity(cells.len());
        for cell in cells {
            match cell {
                CellValue::Number(_) => stats.parsed += 1,
                CellValue::Sentinel => stats.sentinels += 1,
                CellValue::Unparseable => stats.unparseable += 1,
                CellValue::Null => {}
            }
            values.push(cell.number());
        }

        Ok((values, stats))
    }

    /// Coerce `indicator_columns` of `df`, drop all-missing rows and fill gaps.
    ///
    /// Columns not listed are carried through untouched. A table without
    /// indicator columns keeps all of its rows.
    pub fn coerce(
        &self,
        df: DataFrame,
        indicator_columns: &[String],
    ) -> PolarsResult<(DataFrame, CoercionStats)> {
        let mut stats = CoercionStats {
            rows_before: df.height(),
            ..CoercionStats::default()
        };

        let mut coerced = Vec::with_capacity(indicator_columns.len());
        for name in indicator_columns {
            let series = df.column(name)?.as_materialized_series();
            let (values, column_stats) = self.coerce_column(series)?;
            stats.sentinels_replaced += column_stats.sentinels;
            stats.unparseable_cells += column_stats.unparseable;
            coerced.push((values, column_stats));
        }

        let keep: Vec<bool> = (0..df.height())
            .map(|row| {
                indicator_columns.is_empty()
                    || coerced.iter().any(|(values, _)| values[row].is_some())
            })
            .collect();

        stats.rows_dropped = keep.iter().filter(|k| !**k).count();
        if stats.rows_dropped > 0 {
            debug!("Dropping {} rows with no indicator data", stats.rows_dropped);
        }

        let mask = BooleanChunked::from_slice("keep".into(), &keep);
        let mut df = df.filter(&mask)?;

        for (name, (values, mut column_stats)) in indicator_columns.iter().zip(coerced) {
            let filled: Vec<f64> = values
                .iter()
                .zip(&keep)
                .filter(|(_, keep)| **keep)
                .map(|(value, _)| match value {
                    Some(v) => *v,
                    None => {
                        column_stats.filled += 1;
                        self.fill_value
                    }
                })
                .collect();

            stats.cells_filled += column_stats.filled;
            df.replace(name, Series::new(name.as_str().into(), filled))?;
            stats.columns.push(column_stats);
        }

        Ok((df, stats))
    }
}
