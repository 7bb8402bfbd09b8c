//! Error types for the reconciliation pipeline.
//!
//! Source-level failures (unreadable CSV, malformed boundary file, unknown
//! CRS) are fatal and carry the identity of the offending file. Cell-level
//! parse failures never reach this type; they are absorbed by indicator
//! coercion and only show up in its statistics.
//!
//! Errors are serializable so a presentation layer can display them.

use serde::Serialize;
use serde::ser::SerializeStruct;
use std::path::Path;
use thiserror::Error;

/// The main error type for the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A source file could not be read or parsed.
    #[error("Failed to read source '{path}': {reason}")]
    SourceUnreadable { path: String, reason: String },

    /// A required column is missing from the cleaned table.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// The requested indicator is not part of the pillar table.
    #[error("Indicator '{indicator}' not found in pillar '{pillar}'")]
    IndicatorNotFound { pillar: String, indicator: String },

    /// The requested pillar was not produced by classification.
    #[error("Pillar '{0}' not found")]
    PillarNotFound(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The keyword taxonomy is malformed.
    #[error("Invalid taxonomy: {0}")]
    InvalidTaxonomy(String),

    /// The boundary source uses a coordinate reference system we cannot reproject.
    #[error("Unsupported coordinate reference system '{0}'")]
    UnsupportedCrs(String),

    /// A boundary feature carries geometry that cannot be processed.
    #[error("Invalid geometry in feature {feature}: {reason}")]
    InvalidGeometry { feature: usize, reason: String },

    /// Two boundary features canonicalize to the same region name.
    #[error("Duplicate boundary region '{name}' (features {first} and {second})")]
    DuplicateBoundaryName {
        name: String,
        first: usize,
        second: usize,
    },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Build a [`PipelineError::SourceUnreadable`] for `path`.
    pub fn unreadable(path: &Path, reason: impl ToString) -> Self {
        PipelineError::SourceUnreadable {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get error code for frontend handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SourceUnreadable { .. } => "SOURCE_UNREADABLE",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::IndicatorNotFound { .. } => "INDICATOR_NOT_FOUND",
            Self::PillarNotFound(_) => "PILLAR_NOT_FOUND",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::InvalidTaxonomy(_) => "INVALID_TAXONOMY",
            Self::UnsupportedCrs(_) => "UNSUPPORTED_CRS",
            Self::InvalidGeometry { .. } => "INVALID_GEOMETRY",
            Self::DuplicateBoundaryName { .. } => "DUPLICATE_BOUNDARY_NAME",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error is caused by an unreadable source file.
    pub fn is_source_error(&self) -> bool {
        match self {
            Self::SourceUnreadable { .. } | Self::UnsupportedCrs(_) | Self::Io(_) => true,
            Self::WithContext { source, .. } => source.is_source_error(),
            _ => false,
        }
    }
}

impl Serialize for PipelineError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("PipelineError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

impl From<crate::config::ConfigValidationError> for PipelineError {
    fn from(err: crate::config::ConfigValidationError) -> Self {
        PipelineError::InvalidConfig(err.to_string())
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Polars(e).with_context(context))
    }
}
