//! Configuration types for loading and reconciling survey tables.
//!
//! [`LoaderConfig`] describes the expected shape of one tabular source and is
//! built with a validating builder. The policy enums used by the boundary
//! projector and the region-set join live here as well so that a whole run
//! can be described by one serializable value.

use serde::{Deserialize, Serialize};

/// Missing-value tokens observed in the survey exports.
pub const DEFAULT_SENTINELS: [&str; 5] = ["N/A", "N\\A", "#DIV/0!", "", " "];

/// Number of county rows in the county-level export; rows below are summaries.
pub const COUNTY_ROW_LIMIT: usize = 47;

/// Text encoding of a tabular source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SourceEncoding {
    /// Decode as UTF-8, falling back to Latin-1 if the bytes are not valid UTF-8
    #[default]
    Auto,
    /// Strict UTF-8
    Utf8,
    /// ISO-8859-1, every byte maps to one code point
    Latin1,
}

/// Filter that removes aggregate/summary rows before coercion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RowFilter {
    /// Keep every row
    #[default]
    None,
    /// Keep only the first `n` data rows
    Head(usize),
    /// Drop rows whose raw key value matches one of these (case-insensitive, trimmed)
    ExcludeKeys(Vec<String>),
}

/// How a region with no survey row is represented after the join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MissingValuePolicy {
    /// Fill the indicator with zero
    #[default]
    FillZero,
    /// Leave the indicator null so it renders as "no data"
    NoData,
}

/// How repeated keys on the table side of the join are collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DuplicateRowPolicy {
    /// Keep the first row for a key
    #[default]
    First,
    /// Average all rows for a key
    Mean,
}

/// What to do when two boundary features canonicalize to the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DuplicateNamePolicy {
    /// Fail the load
    #[default]
    Reject,
    /// Merge the geometries into one multi-polygon feature
    Merge,
}

/// Which key column of a pillar table is joined to the boundary names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum JoinKey {
    /// The region (county) key
    #[default]
    Region,
    /// The sub-region (sub-county) key
    SubRegion,
}

/// Granularity of a survey export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DatasetLevel {
    /// One row per county
    #[default]
    County,
    /// One row per primary care network, keyed by county and sub-county
    Pcn,
}

impl DatasetLevel {
    /// Default name-bearing attribute of the matching boundary layer.
    pub fn boundary_attribute(&self) -> &'static str {
        match self {
            DatasetLevel::County => "ADM1_EN",
            DatasetLevel::Pcn => "ADM2_EN",
        }
    }

    /// Feature property holding the canonical name in rendered GeoJSON.
    pub fn geojson_key_property(&self) -> &'static str {
        match self {
            DatasetLevel::County => "County_Name_Key",
            DatasetLevel::Pcn => "Subcounty_Name_Key",
        }
    }

    /// How boundary regions without survey rows are shown on this level's map.
    pub fn missing_policy(&self) -> MissingValuePolicy {
        match self {
            DatasetLevel::County => MissingValuePolicy::FillZero,
            DatasetLevel::Pcn => MissingValuePolicy::NoData,
        }
    }

    /// Key joined against the boundary layer of this level.
    pub fn join_key(&self) -> JoinKey {
        match self {
            DatasetLevel::County => JoinKey::Region,
            DatasetLevel::Pcn => JoinKey::SubRegion,
        }
    }
}

/// Options for the region-set join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JoinOptions {
    pub key: JoinKey,
    pub missing: MissingValuePolicy,
    pub duplicates: DuplicateRowPolicy,
}

/// Configuration for loading one tabular source.
///
/// Use [`LoaderConfig::builder()`] or [`LoaderConfig::for_level()`].
///
/// # Example
///
/// ```rust,ignore
/// use pcn_pipeline::config::{LoaderConfig, RowFilter};
///
/// let config = LoaderConfig::builder()
///     .key_column("County")
///     .row_filter(RowFilter::Head(47))
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Name of the region key column after header cleaning.
    /// Default: "County"
    pub key_column: String,

    /// Optional sub-region key column, retained in every pillar table.
    /// Default: None
    pub sub_key_column: Option<String>,

    /// Text columns that are neither keys nor indicators.
    /// Default: empty
    pub passthrough_columns: Vec<String>,

    /// Exact cell values treated as missing before numeric parsing.
    /// Default: [`DEFAULT_SENTINELS`]
    pub sentinels: Vec<String>,

    /// Value written into missing cells of surviving rows.
    /// Default: 0.0
    pub fill_value: f64,

    /// Summary-row filter.
    /// Default: [`RowFilter::None`]
    pub row_filter: RowFilter,

    /// Text encoding of the source.
    /// Default: [`SourceEncoding::Auto`]
    pub encoding: SourceEncoding,

    /// Field delimiter.
    /// Default: b','
    pub delimiter: u8,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            key_column: "County".to_string(),
            sub_key_column: None,
            passthrough_columns: Vec::new(),
            sentinels: DEFAULT_SENTINELS.iter().map(|s| s.to_string()).collect(),
            fill_value: 0.0,
            row_filter: RowFilter::None,
            encoding: SourceEncoding::Auto,
            delimiter: b',',
        }
    }
}

impl LoaderConfig {
    /// Create a new configuration builder.
    pub fn builder() -> LoaderConfigBuilder {
        LoaderConfigBuilder::default()
    }

    /// Preset matching the county-level or PCN-level survey export.
    pub fn for_level(level: DatasetLevel) -> Self {
        match level {
            DatasetLevel::County => Self {
                row_filter: RowFilter::Head(COUNTY_ROW_LIMIT),
                ..Self::default()
            },
            DatasetLevel::Pcn => Self {
                sub_key_column: Some("Sub county".to_string()),
                passthrough_columns: vec!["Pillar".to_string(), "Indicator".to_string()],
                ..Self::default()
            },
        }
    }

    /// Names of every non-indicator column this config knows about.
    pub fn reserved_columns(&self) -> Vec<&str> {
        let mut reserved = vec![self.key_column.as_str()];
        if let Some(sub) = &self.sub_key_column {
            reserved.push(sub.as_str());
        }
        reserved.extend(self.passthrough_columns.iter().map(String::as_str));
        reserved
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.key_column.trim().is_empty() {
            return Err(ConfigValidationError::EmptyKeyColumn);
        }

        if let Some(sub) = &self.sub_key_column {
            if sub == &self.key_column {
                return Err(ConfigValidationError::KeyCollision(sub.clone()));
            }
        }

        if let Some(column) = self
            .passthrough_columns
            .iter()
            .find(|c| **c == self.key_column || Some(*c) == self.sub_key_column.as_ref())
        {
            return Err(ConfigValidationError::KeyCollision(column.clone()));
        }

        if !self.fill_value.is_finite() {
            return Err(ConfigValidationError::InvalidFillValue(self.fill_value));
        }

        if let RowFilter::Head(0) = self.row_filter {
            return Err(ConfigValidationError::EmptyRowLimit);
        }

        if !self.delimiter.is_ascii() || self.delimiter == b'"' || self.delimiter == b'\n' {
            return Err(ConfigValidationError::InvalidDelimiter(self.delimiter as char));
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Key column name must not be empty")]
    EmptyKeyColumn,

    #[error("Column '{0}' is used for more than one role")]
    KeyCollision(String),

    #[error("Invalid fill value: {0} (must be finite)")]
    InvalidFillValue(f64),

    #[error("Row limit must be at least 1")]
    EmptyRowLimit,

    #[error("Invalid delimiter: {0:?}")]
    InvalidDelimiter(char),
}

/// Builder for [`LoaderConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct LoaderConfigBuilder {
    key_column: Option<String>,
    sub_key_column: Option<String>,
    passthrough_columns: Option<Vec<String>>,
    sentinels: Option<Vec<String>>,
    fill_value: Option<f64>,
    row_filter: Option<RowFilter>,
    encoding: Option<SourceEncoding>,
    delimiter: Option<u8>,
}

impl LoaderConfigBuilder {
    /// Start from a level preset instead of the defaults.
    pub fn level(mut self, level: DatasetLevel) -> Self {
        let preset = LoaderConfig::for_level(level);
        self.sub_key_column = preset.sub_key_column;
        self.passthrough_columns = Some(preset.passthrough_columns);
        self.row_filter = Some(preset.row_filter);
        self
    }

    /// Set the region key column.
    pub fn key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = Some(column.into());
        self
    }

    /// Set the sub-region key column.
    pub fn sub_key_column(mut self, column: impl Into<String>) -> Self {
        self.sub_key_column = Some(column.into());
        self
    }

    /// Set the text columns carried through without coercion.
    pub fn passthrough_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.passthrough_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the missing-value sentinel set.
    pub fn sentinels<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sentinels = Some(tokens.into_iter().map(Into::into).collect());
        self
    }

    /// Set the fill value for missing indicator cells.
    pub fn fill_value(mut self, value: f64) -> Self {
        self.fill_value = Some(value);
        self
    }

    /// Set the summary-row filter.
    pub fn row_filter(mut self, filter: RowFilter) -> Self {
        self.row_filter = Some(filter);
        self
    }

    /// Set the source text encoding.
    pub fn encoding(mut self, encoding: SourceEncoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Set the field delimiter.
    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `LoaderConfig` or an error if validation fails.
    pub fn build(self) -> Result<LoaderConfig, ConfigValidationError> {
        let defaults = LoaderConfig::default();
        let config = LoaderConfig {
            key_column: self.key_column.unwrap_or(defaults.key_column),
            sub_key_column: self.sub_key_column,
            passthrough_columns: self.passthrough_columns.unwrap_or_default(),
            sentinels: self.sentinels.unwrap_or(defaults.sentinels),
            fill_value: self.fill_value.unwrap_or(defaults.fill_value),
            row_filter: self.row_filter.unwrap_or_default(),
            encoding: self.encoding.unwrap_or_default(),
            delimiter: self.delimiter.unwrap_or(defaults.delimiter),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoaderConfig::default();
        assert_eq!(config.key_column, "County");
        assert_eq!(config.fill_value, 0.0);
        assert_eq!(config.sentinels.len(), 5);
        assert!(config.sentinels.contains(&"#DIV/0!".to_string()));
        assert_eq!(config.row_filter, RowFilter::None);
    }

    #[test]
    fn test_level_presets() {
        let county = LoaderConfig::for_level(DatasetLevel::County);
        assert_eq!(county.row_filter, RowFilter::Head(47));
        assert!(county.sub_key_column.is_none());

        let pcn = LoaderConfig::for_level(DatasetLevel::Pcn);
        assert_eq!(pcn.sub_key_column.as_deref(), Some("Sub county"));
        assert_eq!(pcn.reserved_columns(), vec!["County", "Sub county", "Pillar", "Indicator"]);
        assert_eq!(DatasetLevel::Pcn.join_key(), JoinKey::SubRegion);
    }

    #[test]
    fn test_builder_custom_values() {
        let config = LoaderConfig::builder()
            .key_column("Region")
            .sub_key_column("District")
            .fill_value(-1.0)
            .sentinels(["NA"])
            .encoding(SourceEncoding::Latin1)
            .build()
            .unwrap();

        assert_eq!(config.key_column, "Region");
        assert_eq!(config.sub_key_column.as_deref(), Some("District"));
        assert_eq!(config.fill_value, -1.0);
        assert_eq!(config.sentinels, vec!["NA".to_string()]);
        assert_eq!(config.encoding, SourceEncoding::Latin1);
    }

    #[test]
    fn test_builder_level_then_override() {
        let config = LoaderConfig::builder()
            .level(DatasetLevel::Pcn)
            .sub_key_column("Subcounty")
            .build()
            .unwrap();
        assert_eq!(config.sub_key_column.as_deref(), Some("Subcounty"));
        assert_eq!(config.passthrough_columns.len(), 2);
    }

    #[test]
    fn test_validation_key_collision() {
        let result = LoaderConfig::builder()
            .key_column("County")
            .sub_key_column("County")
            .build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::KeyCollision(_)
        ));
    }

    #[test]
    fn test_validation_fill_value() {
        let result = LoaderConfig::builder().fill_value(f64::NAN).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidFillValue(_)
        ));
    }

    #[test]
    fn test_validation_empty_head() {
        let result = LoaderConfig::builder().row_filter(RowFilter::Head(0)).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::EmptyRowLimit
        ));
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "key_column": "County",
            "sub_key_column": "Subcounty",
            "passthrough_columns": ["Pillar"],
            "sentinels": ["N/A", ""],
            "fill_value": 0.0,
            "row_filter": { "ExcludeKeys": ["National Average"] },
            "encoding": "Latin1",
            "delimiter": 59
        }"#;

        let config: LoaderConfig = serde_json::from_str(json).expect("valid loader config");
        assert_eq!(config.sub_key_column.as_deref(), Some("Subcounty"));
        assert_eq!(
            config.row_filter,
            RowFilter::ExcludeKeys(vec!["National Average".to_string()])
        );
        assert_eq!(config.delimiter, b';');
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_join_options_default() {
        let options = JoinOptions::default();
        assert_eq!(options.key, JoinKey::Region);
        assert_eq!(options.missing, MissingValuePolicy::FillZero);
        assert_eq!(options.duplicates, DuplicateRowPolicy::First);
    }
}
