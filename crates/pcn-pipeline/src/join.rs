//! Region-set reconciliation.
//!
//! A left join from the boundary key set onto one indicator of a pillar
//! table. Every boundary region appears exactly once, in boundary order,
//! whether or not the survey has a row for it.

use crate::classifier::PillarTable;
use crate::config::{DuplicateRowPolicy, JoinKey, JoinOptions, MissingValuePolicy};
use crate::error::{PipelineError, Result};
use crate::geo::BoundaryKeySet;
use crate::utils::string_values;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

/// Name of the flag column marking regions backed by survey data.
pub const HAS_DATA_COLUMN: &str = "has_data";

/// Diagnostics of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub pillar: String,
    pub indicator: String,
    pub boundary_regions: usize,
    pub matched_regions: usize,
    /// Boundary regions with no survey row.
    pub regions_without_data: Vec<String>,
    /// Survey regions that matched no boundary feature.
    pub unmatched_table_regions: Vec<String>,
    /// Survey keys that appeared on more than one row.
    pub duplicate_keys: usize,
    pub missing: MissingValuePolicy,
}

/// One row of a reconciled table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledRow {
    pub region: String,
    pub value: Option<f64>,
    pub has_data: bool,
}

/// Boundary-aligned indicator values ready for a choropleth.
#[derive(Debug, Clone)]
pub struct ReconciledTable {
    df: DataFrame,
    key_column: String,
    indicator: String,
    rows: Vec<ReconciledRow>,
    summary: ReconciliationSummary,
}

impl ReconciledTable {
    /// Columns: key, indicator (`Float64`), `has_data` (`Boolean`).
    pub fn df(&self) -> &DataFrame {
        &self.df
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn indicator(&self) -> &str {
        &self.indicator
    }

    pub fn rows(&self) -> &[ReconciledRow] {
        &self.rows
    }

    pub fn summary(&self) -> &ReconciliationSummary {
        &self.summary
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }
}

/// Join `indicator` of `table` onto the regions of `boundary`.
pub fn reconcile(
    boundary: &BoundaryKeySet,
    table: &PillarTable,
    indicator: &str,
    options: &JoinOptions,
) -> Result<ReconciledTable> {
    let key_column = match options.key {
        JoinKey::Region => table.key_column().to_string(),
        JoinKey::SubRegion => table
            .sub_key_column()
            .ok_or_else(|| PipelineError::ColumnNotFound("sub-region key".to_string()))?
            .to_string(),
    };

    let keys = string_values(table.df(), &key_column)?;
    let values = table.values(indicator)?;

    let mut grouped: HashMap<String, Vec<f64>> = HashMap::new();
    let mut row_counts: HashMap<&str, usize> = HashMap::new();
    for (key, value) in keys.iter().zip(&values) {
        let Some(key) = key else { continue };
        *row_counts.entry(key.as_str()).or_default() += 1;
        let entry = grouped.entry(key.clone()).or_default();
        if let Some(value) = value {
            entry.push(*value);
        }
    }
    let duplicate_keys = row_counts.values().filter(|n| **n > 1).count();
    if duplicate_keys > 0 {
        warn!(
            "{} region keys appear on more than one row; using {:?}",
            duplicate_keys, options.duplicates
        );
    }

    let collapsed: HashMap<&str, Option<f64>> = grouped
        .iter()
        .map(|(key, values)| (key.as_str(), collapse(values, options.duplicates)))
        .collect();

    let mut rows = Vec::with_capacity(boundary.len());
    let mut regions_without_data = Vec::new();
    for feature in boundary.features() {
        let found = collapsed.get(feature.name.as_str()).copied().flatten();
        let value = match (found, options.missing) {
            (Some(v), _) => Some(v),
            (None, MissingValuePolicy::FillZero) => Some(0.0),
            (None, MissingValuePolicy::NoData) => None,
        };
        if found.is_none() {
            regions_without_data.push(feature.name.clone());
        }
        rows.push(ReconciledRow {
            region: feature.name.clone(),
            value,
            has_data: found.is_some(),
        });
    }

    let boundary_names: BTreeSet<&str> = boundary.names().into_iter().collect();
    let unmatched_table_regions: Vec<String> = grouped
        .keys()
        .filter(|k| !boundary_names.contains(k.as_str()))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if !unmatched_table_regions.is_empty() {
        warn!(
            "{} survey regions match no boundary feature: {:?}",
            unmatched_table_regions.len(),
            unmatched_table_regions
        );
    }

    let df = DataFrame::new(vec![
        Column::new(
            key_column.as_str().into(),
            rows.iter().map(|r| r.region.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            indicator.into(),
            rows.iter().map(|r| r.value).collect::<Vec<_>>(),
        ),
        Column::new(
            HAS_DATA_COLUMN.into(),
            rows.iter().map(|r| r.has_data).collect::<Vec<_>>(),
        ),
    ])?;

    let summary = ReconciliationSummary {
        pillar: table.label().to_string(),
        indicator: indicator.to_string(),
        boundary_regions: boundary.len(),
        matched_regions: boundary.len() - regions_without_data.len(),
        regions_without_data,
        unmatched_table_regions,
        duplicate_keys,
        missing: options.missing,
    };

    info!(
        "Reconciled '{}': {}/{} boundary regions have data",
        indicator, summary.matched_regions, summary.boundary_regions
    );

    Ok(ReconciledTable {
        df,
        key_column,
        indicator: indicator.to_string(),
        rows,
        summary,
    })
}

fn collapse(values: &[f64], policy: DuplicateRowPolicy) -> Option<f64> {
    match policy {
        DuplicateRowPolicy::First => values.first().copied(),
        DuplicateRowPolicy::Mean if values.is_empty() => None,
        DuplicateRowPolicy::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
    }
}
