//! Loading and normalizing a survey export.
//!
//! A source is read into a raw all-text table, its headers are cleaned,
//! summary rows are filtered, indicator columns are coerced to numbers and the
//! key columns are canonicalized. The result is a [`NormalizedTable`].

use crate::cleaner::{CoercionStats, IndicatorCoercer, clean_headers, disambiguate_headers};
use crate::config::{LoaderConfig, RowFilter};
use crate::error::{PipelineError, Result, ResultExt};
use crate::names::RegionNameCanonicalizer;
use crate::utils::{decode_text, string_values, strip_bom};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info, warn};

/// A cleaned table with its column roles.
#[derive(Debug, Clone)]
pub struct NormalizedTable {
    df: DataFrame,
    key_column: String,
    sub_key_column: Option<String>,
    indicator_columns: Vec<String>,
    passthrough_columns: Vec<String>,
}

impl NormalizedTable {
    pub fn df(&self) -> &DataFrame {
        &self.df
    }

    pub fn into_df(self) -> DataFrame {
        self.df
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    /// Sub-region key, if the source carried one.
    pub fn sub_key_column(&self) -> Option<&str> {
        self.sub_key_column.as_deref()
    }

    /// Numeric columns, in source order.
    pub fn indicator_columns(&self) -> &[String] {
        &self.indicator_columns
    }

    pub fn passthrough_columns(&self) -> &[String] {
        &self.passthrough_columns
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    /// Key columns that every projection of this table keeps.
    pub fn key_columns(&self) -> Vec<&str> {
        let mut keys = vec![self.key_column.as_str()];
        if let Some(sub) = &self.sub_key_column {
            keys.push(sub.as_str());
        }
        keys
    }

    /// Distinct canonical region names, sorted.
    pub fn regions(&self) -> Result<Vec<String>> {
        let mut regions: Vec<String> = string_values(&self.df, &self.key_column)?
            .into_iter()
            .flatten()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        regions.sort();
        Ok(regions)
    }
}

/// Counts collected while loading one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStats {
    pub source: String,
    pub raw_rows: usize,
    pub raw_columns: usize,
    pub rows_filtered: usize,
    pub rows_loaded: usize,
    pub indicator_columns: usize,
    pub sub_key_present: bool,
    pub coercion: CoercionStats,
}

/// Reads and normalizes tabular sources according to a [`LoaderConfig`].
#[derive(Debug, Clone)]
pub struct TableLoader {
    config: LoaderConfig,
    canonicalizer: RegionNameCanonicalizer,
    coercer: IndicatorCoercer,
}

impl TableLoader {
    pub fn new(config: LoaderConfig, canonicalizer: RegionNameCanonicalizer) -> Result<Self> {
        config.validate()?;
        let coercer = IndicatorCoercer::from_config(&config);
        Ok(Self {
            config,
            canonicalizer,
            coercer,
        })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn canonicalizer(&self) -> &RegionNameCanonicalizer {
        &self.canonicalizer
    }

    /// Load and normalize a CSV file.
    pub fn load_path(&self, path: &Path) -> Result<(NormalizedTable, LoadStats)> {
        info!("Loading {}", path.display());
        let bytes = std::fs::read(path).map_err(|e| PipelineError::unreadable(path, e))?;
        let raw = self
            .read_raw(&bytes)
            .map_err(|e| PipelineError::unreadable(path, e))?;
        self.normalize(raw, &path.display().to_string())
    }

    /// Load and normalize CSV content already in memory.
    pub fn load_bytes(&self, bytes: &[u8], source: &str) -> Result<(NormalizedTable, LoadStats)> {
        let raw = self
            .read_raw(bytes)
            .map_err(|e| PipelineError::unreadable(Path::new(source), e))?;
        self.normalize(raw, source)
    }

    /// Parse bytes into an all-text table with cleaned, unique headers.
    pub fn read_raw(&self, bytes: &[u8]) -> Result<DataFrame> {
        let text = decode_text(bytes, self.config.encoding)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let text = strip_bom(&text);
        if text.trim().is_empty() {
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "source is empty").into());
        }

        // Headers are read as an ordinary record so they reach the cleaner untouched.
        let df = CsvReadOptions::default()
            .with_has_header(false)
            .with_infer_schema_length(Some(0))
            .with_parse_options(
                CsvParseOptions::default()
                    .with_quote_char(Some(b'"'))
                    .with_separator(self.config.delimiter)
                    .with_truncate_ragged_lines(true),
            )
            .into_reader_with_file_handle(Cursor::new(text.as_bytes().to_vec()))
            .finish()?;

        let raw_headers: Vec<String> = df
            .get_columns()
            .iter()
            .map(|column| {
                column
                    .as_materialized_series()
                    .str()
                    .ok()
                    .and_then(|values| values.get(0))
                    .unwrap_or_default()
                    .to_string()
            })
            .collect();

        let headers = disambiguate_headers(clean_headers(&raw_headers));
        let mut data = df.slice(1, df.height().saturating_sub(1));
        data.set_column_names(headers.iter().map(String::as_str))?;

        debug!(
            "Read raw table: {} rows x {} columns",
            data.height(),
            data.width()
        );
        Ok(data)
    }

    /// Normalize a raw table: filter summary rows, coerce, canonicalize keys.
    pub fn normalize(&self, raw: DataFrame, source: &str) -> Result<(NormalizedTable, LoadStats)> {
        let mut stats = LoadStats {
            source: source.to_string(),
            raw_rows: raw.height(),
            raw_columns: raw.width(),
            ..LoadStats::default()
        };

        let present: HashSet<String> = raw
            .get_column_names()
            .iter()
            .map(|c| c.to_string())
            .collect();

        let key_column = self.config.key_column.clone();
        if !present.contains(&key_column) {
            return Err(PipelineError::ColumnNotFound(key_column).with_context(source));
        }

        let sub_key_column = match &self.config.sub_key_column {
            Some(sub) if present.contains(sub) => Some(sub.clone()),
            Some(sub) => {
                warn!("Sub-region column '{}' not found in {}", sub, source);
                None
            }
            None => None,
        };
        stats.sub_key_present = sub_key_column.is_some();

        let passthrough_columns: Vec<String> = self
            .config
            .passthrough_columns
            .iter()
            .filter(|c| present.contains(*c))
            .cloned()
            .collect();

        let reserved: HashSet<&str> = self.config.reserved_columns().into_iter().collect();
        let indicator_columns: Vec<String> = raw
            .get_column_names()
            .iter()
            .map(|c| c.to_string())
            .filter(|c| !reserved.contains(c.as_str()))
            .collect();

        let filtered = self.apply_row_filter(raw, &key_column)?;
        stats.rows_filtered = stats.raw_rows - filtered.height();

        let (mut df, coercion) = self
            .coercer
            .coerce(filtered, &indicator_columns)
            .context(format!("coercing indicators of {}", source))?;

        self.canonicalizer.canonicalize_column(&mut df, &key_column)?;
        if let Some(sub) = &sub_key_column {
            self.canonicalizer.canonicalize_column(&mut df, sub)?;
        }

        stats.rows_loaded = df.height();
        stats.indicator_columns = indicator_columns.len();
        stats.coercion = coercion;

        info!(
            "Loaded {}: {} rows, {} indicator columns ({} rows filtered, {} without data)",
            source,
            stats.rows_loaded,
            stats.indicator_columns,
            stats.rows_filtered,
            stats.coercion.rows_dropped
        );

        Ok((
            NormalizedTable {
                df,
                key_column,
                sub_key_column,
                indicator_columns,
                passthrough_columns,
            },
            stats,
        ))
    }

    fn apply_row_filter(&self, df: DataFrame, key_column: &str) -> Result<DataFrame> {
        match &self.config.row_filter {
            RowFilter::None => Ok(df),
            RowFilter::Head(n) => Ok(df.head(Some(*n))),
            RowFilter::ExcludeKeys(keys) => {
                let excluded: HashSet<String> =
                    keys.iter().map(|k| k.trim().to_lowercase()).collect();
                let keep: Vec<bool> = string_values(&df, key_column)?
                    .iter()
                    .map(|v| match v {
                        Some(v) => !excluded.contains(&v.trim().to_lowercase()),
                        None => true,
                    })
                    .collect();
                let mask = BooleanChunked::from_slice("keep".into(), &keep);
                Ok(df.filter(&mask)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatasetLevel;
    use crate::utils::f64_values;
    use pretty_assertions::assert_eq;

    fn loader(config: LoaderConfig) -> TableLoader {
        TableLoader::new(config, RegionNameCanonicalizer::default()).unwrap()
    }

    #[test]
    fn test_read_raw_cleans_headers() {
        let csv = "County,\"  Governance Score \n\",HRH  Score\nMombasa,80,70\n";
        let df = loader(LoaderConfig::default()).read_raw(csv.as_bytes()).unwrap();
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(names, vec!["County", "Governance Score", "HRH Score"]);
        assert_eq!(df.height(), 1);
    }

    #[test]
    fn test_load_county_example() {
        let csv = "County,HRH Score\nNairobi City County,N/A\n  Mombasa,75\nKwale,\n";
        let (table, stats) = loader(LoaderConfig::default())
            .load_bytes(csv.as_bytes(), "county.csv")
            .unwrap();

        assert_eq!(table.height(), 1);
        assert_eq!(stats.coercion.rows_dropped, 2);
        assert_eq!(
            string_values(table.df(), "County").unwrap(),
            vec![Some("Mombasa".to_string())]
        );
        assert_eq!(f64_values(table.df(), "HRH Score").unwrap(), vec![Some(75.0)]);
    }

    #[test]
    fn test_partial_row_is_filled() {
        let csv = "County,Governance Score,HRH Score\nNairobi City County,N/A,60\n";
        let (table, _) = loader(LoaderConfig::default())
            .load_bytes(csv.as_bytes(), "county.csv")
            .unwrap();
        assert_eq!(
            string_values(table.df(), "County").unwrap(),
            vec![Some("Nairobi".to_string())]
        );
        assert_eq!(f64_values(table.df(), "Governance Score").unwrap(), vec![Some(0.0)]);
    }

    #[test]
    fn test_head_filter_drops_summary_rows() {
        let csv = "County,Score\nA,1\nB,2\nNational Average,1.5\n";
        let config = LoaderConfig::builder()
            .row_filter(RowFilter::Head(2))
            .build()
            .unwrap();
        let (table, stats) = loader(config).load_bytes(csv.as_bytes(), "t.csv").unwrap();
        assert_eq!(table.height(), 2);
        assert_eq!(stats.rows_filtered, 1);
    }

    #[test]
    fn test_exclude_keys_filter() {
        let csv = "County,Score\nA,1\n national average ,1.5\nB,2\n";
        let config = LoaderConfig::builder()
            .row_filter(RowFilter::ExcludeKeys(vec!["National Average".to_string()]))
            .build()
            .unwrap();
        let (table, _) = loader(config).load_bytes(csv.as_bytes(), "t.csv").unwrap();
        assert_eq!(table.regions().unwrap(), vec!["A", "B"]);
    }

    #[test]
    fn test_missing_key_column_is_fatal() {
        let csv = "Region,Score\nA,1\n";
        let err = loader(LoaderConfig::default())
            .load_bytes(csv.as_bytes(), "t.csv")
            .unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
    }

    #[test]
    fn test_pcn_level_roles() {
        let csv = "County,Sub county,Pillar,HRH Score\nKisumu County,kisumu-east,HRH,40\n";
        let (table, stats) = loader(LoaderConfig::for_level(DatasetLevel::Pcn))
            .load_bytes(csv.as_bytes(), "pcn.csv")
            .unwrap();
        assert!(stats.sub_key_present);
        assert_eq!(table.sub_key_column(), Some("Sub county"));
        assert_eq!(table.indicator_columns(), &["HRH Score".to_string()]);
        assert_eq!(table.passthrough_columns(), &["Pillar".to_string()]);
        assert_eq!(
            string_values(table.df(), "Sub county").unwrap(),
            vec![Some("Kisumu East".to_string())]
        );
        assert_eq!(
            string_values(table.df(), "Pillar").unwrap(),
            vec![Some("HRH".to_string())]
        );
    }

    #[test]
    fn test_missing_sub_key_is_tolerated() {
        let csv = "County,HRH Score\nKisumu,40\n";
        let (table, stats) = loader(LoaderConfig::for_level(DatasetLevel::Pcn))
            .load_bytes(csv.as_bytes(), "pcn.csv")
            .unwrap();
        assert!(!stats.sub_key_present);
        assert_eq!(table.sub_key_column(), None);
    }

    #[test]
    fn test_latin1_source() {
        let mut bytes = b"County,Score\nMurang".to_vec();
        bytes.push(0xe1);
        bytes.extend_from_slice(b",5\n");
        let (table, _) = loader(LoaderConfig::default())
            .load_bytes(&bytes, "latin1.csv")
            .unwrap();
        assert_eq!(table.regions().unwrap(), vec!["Murangá"]);
    }

    #[test]
    fn test_empty_source_is_unreadable() {
        let err = loader(LoaderConfig::default())
            .load_bytes(b"", "empty.csv")
            .unwrap_err();
        assert!(err.is_source_error());
    }
}
