//! PCN Dashboard Reconciliation Pipeline
//!
//! Turns messy survey exports of primary care network establishment into
//! tables and boundary layers a health dashboard can render.
//!
//! # Overview
//!
//! - **Loading**: header repair, sentinel handling and numeric coercion of
//!   county-level and PCN-level CSV exports
//! - **Name Canonicalization**: one canonical spelling per administrative
//!   region, shared by the survey tables and the boundary layer
//! - **Pillar Classification**: keyword-driven grouping of indicator columns
//!   into thematic pillars
//! - **Boundary Projection**: GeoJSON boundaries reprojected to WGS84 and
//!   keyed by canonical name
//! - **Reconciliation**: left join of one indicator onto the boundary regions,
//!   with an explicit "no data" state
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use pcn_pipeline::{DashboardPipeline, DashboardRequest, DatasetLevel};
//!
//! let pipeline = DashboardPipeline::builder()
//!     .level(DatasetLevel::County)
//!     .build()?;
//!
//! let output = pipeline.run(&DashboardRequest {
//!     csv: "data/county.csv".into(),
//!     boundary: Some("data/ken_adm1.geojson".into()),
//!     pillar: Some("2. HRH".to_string()),
//!     ..DashboardRequest::default()
//! })?;
//!
//! for entry in &output.ranking {
//!     println!("{}: {}", entry.label, entry.value);
//! }
//! ```
//!
//! # Lower-level API
//!
//! Each stage is usable on its own:
//!
//! ```rust,ignore
//! use pcn_pipeline::{LoaderConfig, PillarClassifier, RegionNameCanonicalizer, TableLoader, Taxonomy};
//!
//! let loader = TableLoader::new(LoaderConfig::default(), RegionNameCanonicalizer::default())?;
//! let (table, stats) = loader.load_path("data/county.csv".as_ref())?;
//! let classification = PillarClassifier::new(Taxonomy::county()).classify(&table)?;
//! assert!(classification.report.is_clean());
//! ```

pub mod cache;
pub mod classifier;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod geo;
pub mod join;
pub mod loader;
pub mod names;
pub mod pipeline;
pub mod reporting;
pub mod taxonomy;
pub mod utils;

// Re-exports for convenient access
pub use cache::{SourceCache, SourceKey};
pub use classifier::{
    Classification, ClassificationReport, PillarClassifier, PillarSet, PillarTable, RankedEntry,
    SharedColumn, UnmatchedKeyword,
};
pub use cleaner::{CoercionStats, ColumnCoercion, IndicatorCoercer, clean_header, clean_headers};
pub use config::{
    ConfigValidationError, DatasetLevel, DuplicateNamePolicy, DuplicateRowPolicy, JoinKey,
    JoinOptions, LoaderConfig, LoaderConfigBuilder, MissingValuePolicy, RowFilter, SourceEncoding,
};
pub use error::{PipelineError, Result as PipelineResult, ResultExt};
pub use geo::{BoundaryFeature, BoundaryKeySet, BoundaryLoader, BoundaryOptions, BoundarySummary, Crs};
pub use join::{HAS_DATA_COLUMN, ReconciledRow, ReconciledTable, ReconciliationSummary, reconcile};
pub use loader::{LoadStats, NormalizedTable, TableLoader};
pub use names::{NameOverrides, RegionNameCanonicalizer};
pub use pipeline::{
    ALL_SUB_REGIONS, DashboardOutput, DashboardPipeline, DashboardPipelineBuilder,
    DashboardRequest, LoadedSource, Selection,
};
pub use reporting::{DashboardReport, PillarSummary, ReportWriter};
pub use taxonomy::{Pillar, Taxonomy};
