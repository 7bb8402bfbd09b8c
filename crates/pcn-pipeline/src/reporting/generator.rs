use crate::classifier::{ClassificationReport, PillarSet, RankedEntry};
use crate::config::DatasetLevel;
use crate::error::Result;
use crate::geo::{BoundaryKeySet, BoundarySummary};
use crate::join::{HAS_DATA_COLUMN, ReconciledRow, ReconciledTable, ReconciliationSummary};
use crate::loader::LoadStats;
use crate::pipeline::{DashboardOutput, Selection};
use chrono::Local;
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

static NON_ALNUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("Invalid regex: file slug"));

// ============================================================================
// Report Types
// ============================================================================

/// Shape of one pillar table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PillarSummary {
    pub label: String,
    pub indicators: Vec<String>,
    pub rows: usize,
}

/// Everything that happened while building one dashboard section.
///
/// Used for both `--json` output and `--emit-report` files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardReport {
    /// Timestamp when the report was generated
    pub generated_at: String,
    pub level: DatasetLevel,
    pub input_file: String,
    pub boundary_file: Option<String>,

    /// Loader counts, including per-column coercion stats
    pub load: LoadStats,
    /// Taxonomy/schema mismatches
    pub classification: ClassificationReport,
    pub pillars: Vec<PillarSummary>,

    pub boundary: Option<BoundarySummary>,
    pub selection: Option<Selection>,
    /// Bar-chart order, highest first
    pub ranking: Vec<RankedEntry>,
    pub reconciliation: Option<ReconciliationSummary>,
}

impl DashboardReport {
    pub fn from_output(
        output: &DashboardOutput,
        input_file: &str,
        boundary_file: Option<&str>,
    ) -> Self {
        let pillars = output
            .source
            .classification
            .pillars
            .iter()
            .map(|table| PillarSummary {
                label: table.label().to_string(),
                indicators: table.indicators().to_vec(),
                rows: table.height(),
            })
            .collect();

        Self {
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            level: output.level,
            input_file: input_file.to_string(),
            boundary_file: boundary_file.map(String::from),
            load: output.source.stats.clone(),
            classification: output.source.classification.report.clone(),
            pillars,
            boundary: output.boundary.as_ref().map(|b| b.summary().clone()),
            selection: output.selection.clone(),
            ranking: output.ranking.clone(),
            reconciliation: output.reconciled.as_ref().map(|r| r.summary().clone()),
        }
    }
}

// ============================================================================
// Writers
// ============================================================================

/// Lower-case file-name fragment for a pillar label or indicator.
///
/// `"1. Governance"` becomes `"1_governance"`.
pub fn file_slug(label: &str) -> String {
    let lowered = label.to_lowercase();
    let slug = NON_ALNUM.replace_all(&lowered, "_");
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug.to_string()
    }
}

/// Boundary features carrying the key, the indicator value and the data flag.
///
/// Features are matched to reconciled rows by canonical name; a feature with
/// no row gets a null value and `has_data: false`.
pub fn choropleth_collection(
    boundary: &BoundaryKeySet,
    reconciled: &ReconciledTable,
    key_property: &str,
) -> Value {
    let rows: HashMap<&str, &ReconciledRow> = reconciled
        .rows()
        .iter()
        .map(|row| (row.region.as_str(), row))
        .collect();

    let mut collection = boundary.to_feature_collection(key_property);
    if let Some(features) = collection.get_mut("features").and_then(Value::as_array_mut) {
        for (feature, source) in features.iter_mut().zip(boundary.features()) {
            let row = rows.get(source.name.as_str());
            let Some(properties) = feature.get_mut("properties").and_then(Value::as_object_mut)
            else {
                continue;
            };
            properties.insert(
                reconciled.indicator().to_string(),
                row.and_then(|r| r.value).map_or(Value::Null, Value::from),
            );
            properties.insert(
                HAS_DATA_COLUMN.to_string(),
                Value::from(row.is_some_and(|r| r.has_data)),
            );
        }
    }
    collection
}

/// Writes reports, tables and layers under one output directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write the report as `<base>_report.json`.
    pub fn write_report(&self, report: &DashboardReport, base: &str) -> Result<PathBuf> {
        let report_path = self.output_dir.join(format!("{}_report.json", base));
        self.write_json(&report_path, &serde_json::to_value(report)?)?;
        info!("Report saved: {}", report_path.display());
        Ok(report_path)
    }

    /// Write every pillar table as `<base>_<pillar>.csv`.
    pub fn write_pillar_tables(&self, pillars: &PillarSet, base: &str) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(pillars.len());
        for table in pillars.iter() {
            let path = self
                .output_dir
                .join(format!("{}_{}.csv", base, file_slug(table.label())));
            let mut df = table.df().clone();
            self.write_csv(&path, &mut df)?;
            paths.push(path);
        }
        info!("Wrote {} pillar tables to {}", paths.len(), self.output_dir.display());
        Ok(paths)
    }

    /// Write the reconciled selection as `<base>_<indicator>_reconciled.csv`.
    pub fn write_reconciled(&self, reconciled: &ReconciledTable, base: &str) -> Result<PathBuf> {
        let path = self.output_dir.join(format!(
            "{}_{}_reconciled.csv",
            base,
            file_slug(reconciled.indicator())
        ));
        let mut df = reconciled.df().clone();
        self.write_csv(&path, &mut df)?;
        info!("Reconciled table saved: {}", path.display());
        Ok(path)
    }

    /// Write the choropleth layer as `<base>_<indicator>.geojson`.
    pub fn write_choropleth(
        &self,
        boundary: &BoundaryKeySet,
        reconciled: &ReconciledTable,
        key_property: &str,
        base: &str,
    ) -> Result<PathBuf> {
        let path = self.output_dir.join(format!(
            "{}_{}.geojson",
            base,
            file_slug(reconciled.indicator())
        ));
        self.write_json(&path, &choropleth_collection(boundary, reconciled, key_property))?;
        info!("Choropleth layer saved: {}", path.display());
        Ok(path)
    }

    /// Write the canonical boundary layer without indicator values.
    pub fn write_boundary(
        &self,
        boundary: &BoundaryKeySet,
        key_property: &str,
        base: &str,
    ) -> Result<PathBuf> {
        let path = self.output_dir.join(format!("{}_boundary.geojson", base));
        self.write_json(&path, &boundary.to_feature_collection(key_property))?;
        info!("Boundary layer saved: {}", path.display());
        Ok(path)
    }

    /// Write every artifact of one run: pillar tables, then either the
    /// reconciled table and choropleth layer or, with no selection, the bare
    /// boundary layer.
    pub fn write_artifacts(&self, output: &DashboardOutput, base: &str) -> Result<Vec<PathBuf>> {
        let mut written = self.write_pillar_tables(&output.source.classification.pillars, base)?;
        let key_property = output.level.geojson_key_property();

        match (&output.boundary, &output.reconciled) {
            (Some(boundary), Some(reconciled)) => {
                written.push(self.write_reconciled(reconciled, base)?);
                written.push(self.write_choropleth(boundary, reconciled, key_property, base)?);
            }
            (Some(boundary), None) => {
                written.push(self.write_boundary(boundary, key_property, base)?);
            }
            (None, _) => {}
        }

        Ok(written)
    }

    fn write_json(&self, path: &Path, value: &Value) -> Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        let mut file = File::create(path)?;
        file.write_all(serde_json::to_string_pretty(value)?.as_bytes())?;
        Ok(())
    }

    fn write_csv(&self, path: &Path, df: &mut DataFrame) -> Result<()> {
        fs::create_dir_all(&self.output_dir)?;
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .with_quote_char(b'"')
            .finish(df)?;
        debug!("Wrote {} rows to {}", df.height(), path.display());
        Ok(())
    }
}

impl Default for ReportWriter {
    fn default() -> Self {
        Self::new("./outputs")
    }
}
