//! Keyword-driven grouping of indicator columns into pillars.
//!
//! Each pillar of the [`Taxonomy`] becomes a [`PillarTable`]: the key columns
//! plus every indicator column whose cleaned header contains one of the
//! pillar's keywords, compared case-insensitively. Pillars that match nothing
//! are omitted. A column may land in several pillars.

use crate::cleaner::clean_header;
use crate::error::{PipelineError, Result};
use crate::loader::NormalizedTable;
use crate::taxonomy::Taxonomy;
use crate::utils::{f64_values, string_values};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// One entry of a ranked indicator, in bar-chart order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub label: String,
    pub value: f64,
}

/// A projection of a normalized table onto one pillar.
#[derive(Debug, Clone)]
pub struct PillarTable {
    label: String,
    df: DataFrame,
    key_column: String,
    sub_key_column: Option<String>,
    indicator_columns: Vec<String>,
}

impl PillarTable {
    /// Wrap an existing frame. Key and indicator columns must be present and
    /// at least one indicator is required.
    pub fn new(
        label: impl Into<String>,
        df: DataFrame,
        key_column: impl Into<String>,
        sub_key_column: Option<String>,
        indicator_columns: Vec<String>,
    ) -> Result<Self> {
        let label = label.into();
        let key_column = key_column.into();
        if indicator_columns.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "pillar '{}' has no indicator columns",
                label
            )));
        }
        for column in std::iter::once(&key_column)
            .chain(sub_key_column.iter())
            .chain(indicator_columns.iter())
        {
            if df.column(column).is_err() {
                return Err(PipelineError::ColumnNotFound(column.clone()));
            }
        }

        Ok(Self {
            label,
            df,
            key_column,
            sub_key_column,
            indicator_columns,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn df(&self) -> &DataFrame {
        &self.df
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn sub_key_column(&self) -> Option<&str> {
        self.sub_key_column.as_deref()
    }

    /// Indicator columns of this pillar, in source order.
    pub fn indicators(&self) -> &[String] {
        &self.indicator_columns
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    fn require(&self, indicator: &str) -> Result<()> {
        if self.indicator_columns.iter().any(|c| c == indicator) {
            Ok(())
        } else {
            Err(PipelineError::IndicatorNotFound {
                pillar: self.label.clone(),
                indicator: indicator.to_string(),
            })
        }
    }

    /// Values of one indicator, row-aligned with the key column.
    pub fn values(&self, indicator: &str) -> Result<Vec<Option<f64>>> {
        self.require(indicator)?;
        Ok(f64_values(&self.df, indicator)?)
    }

    /// Rows as `(label, value)` sorted by value, highest first.
    ///
    /// The label is the sub-region name when the table has one. Rows without
    /// a label are skipped. Ties keep source order.
    pub fn ranked(&self, indicator: &str) -> Result<Vec<RankedEntry>> {
        let values = self.values(indicator)?;
        let label_column = self.sub_key_column.as_deref().unwrap_or(&self.key_column);
        let labels = string_values(&self.df, label_column)?;

        let mut ranked: Vec<RankedEntry> = labels
            .into_iter()
            .zip(values)
            .filter_map(|(label, value)| {
                Some(RankedEntry {
                    label: label?,
                    value: value?,
                })
            })
            .collect();

        ranked.sort_by(|a, b| b.value.total_cmp(&a.value));
        Ok(ranked)
    }

    /// Rows belonging to one canonical region (drill-down).
    pub fn filter_by_region(&self, region: &str) -> Result<PillarTable> {
        self.filter_by_key(&self.key_column, region)
    }

    /// Rows belonging to one canonical sub-region.
    pub fn filter_by_sub_region(&self, sub_region: &str) -> Result<PillarTable> {
        let column = self
            .sub_key_column
            .as_deref()
            .ok_or_else(|| PipelineError::ColumnNotFound("sub-region key".to_string()))?;
        self.filter_by_key(column, sub_region)
    }

    fn filter_by_key(&self, column: &str, value: &str) -> Result<PillarTable> {
        let keep: Vec<bool> = string_values(&self.df, column)?
            .iter()
            .map(|v| v.as_deref() == Some(value))
            .collect();
        let mask = BooleanChunked::from_slice("keep".into(), &keep);

        Ok(PillarTable {
            label: self.label.clone(),
            df: self.df.filter(&mask)?,
            key_column: self.key_column.clone(),
            sub_key_column: self.sub_key_column.clone(),
            indicator_columns: self.indicator_columns.clone(),
        })
    }

    /// Distinct sub-region names of one region, sorted.
    pub fn sub_regions(&self, region: &str) -> Result<Vec<String>> {
        let Some(sub) = &self.sub_key_column else {
            return Ok(Vec::new());
        };
        let regions = string_values(&self.df, &self.key_column)?;
        let subs = string_values(&self.df, sub)?;

        let mut names: Vec<String> = regions
            .into_iter()
            .zip(subs)
            .filter(|(r, _)| r.as_deref() == Some(region))
            .filter_map(|(_, s)| s)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Pillar tables in taxonomy order.
#[derive(Debug, Clone, Default)]
pub struct PillarSet {
    pillars: Vec<PillarTable>,
}

impl PillarSet {
    pub fn get(&self, label: &str) -> Result<&PillarTable> {
        self.pillars
            .iter()
            .find(|p| p.label == label)
            .ok_or_else(|| PipelineError::PillarNotFound(label.to_string()))
    }

    pub fn labels(&self) -> Vec<&str> {
        self.pillars.iter().map(|p| p.label.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PillarTable> {
        self.pillars.iter()
    }

    pub fn len(&self) -> usize {
        self.pillars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pillars.is_empty()
    }

    pub fn first(&self) -> Option<&PillarTable> {
        self.pillars.first()
    }
}

/// A keyword that matched no column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedKeyword {
    pub pillar: String,
    pub keyword: String,
}

/// A column claimed by more than one pillar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedColumn {
    pub column: String,
    pub pillars: Vec<String>,
}

/// Mismatches between the taxonomy and the table schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub unmatched_keywords: Vec<UnmatchedKeyword>,
    pub unclassified_columns: Vec<String>,
    pub omitted_pillars: Vec<String>,
    pub shared_columns: Vec<SharedColumn>,
}

impl ClassificationReport {
    /// True when every keyword and every indicator column found a partner.
    pub fn is_clean(&self) -> bool {
        self.unmatched_keywords.is_empty()
            && self.unclassified_columns.is_empty()
            && self.omitted_pillars.is_empty()
    }
}

/// Output of [`PillarClassifier::classify`].
#[derive(Debug, Clone)]
pub struct Classification {
    pub pillars: PillarSet,
    pub report: ClassificationReport,
}

/// Groups the indicator columns of a table by taxonomy keywords.
#[derive(Debug, Clone)]
pub struct PillarClassifier {
    taxonomy: Taxonomy,
}

impl PillarClassifier {
    pub fn new(taxonomy: Taxonomy) -> Self {
        Self { taxonomy }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Does `keyword` identify `header`?
    ///
    /// Both sides get the header cleaning treatment, then a case-insensitive
    /// substring test.
    pub fn matches(header: &str, keyword: &str) -> bool {
        let keyword = clean_header(keyword).to_lowercase();
        !keyword.is_empty() && clean_header(header).to_lowercase().contains(&keyword)
    }

    pub fn classify(&self, table: &NormalizedTable) -> Result<Classification> {
        let keys: Vec<String> = table.key_columns().iter().map(|k| k.to_string()).collect();
        let mut pillars = Vec::new();
        let mut report = ClassificationReport::default();
        let mut claimed: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for pillar in self.taxonomy.pillars() {
            let matched: Vec<String> = table
                .indicator_columns()
                .iter()
                .filter(|column| pillar.keywords.iter().any(|k| Self::matches(column, k)))
                .cloned()
                .collect();

            for keyword in &pillar.keywords {
                if !table
                    .indicator_columns()
                    .iter()
                    .any(|column| Self::matches(column, keyword))
                {
                    report.unmatched_keywords.push(UnmatchedKeyword {
                        pillar: pillar.label.clone(),
                        keyword: keyword.clone(),
                    });
                }
            }

            if matched.is_empty() {
                debug!("Pillar '{}' matched no columns", pillar.label);
                report.omitted_pillars.push(pillar.label.clone());
                continue;
            }

            for column in &matched {
                claimed
                    .entry(column.clone())
                    .or_default()
                    .push(pillar.label.clone());
            }

            let selection: Vec<String> = keys.iter().chain(matched.iter()).cloned().collect();
            let df = table.df().select(selection)?;

            pillars.push(PillarTable {
                label: pillar.label.clone(),
                df,
                key_column: table.key_column().to_string(),
                sub_key_column: table.sub_key_column().map(str::to_string),
                indicator_columns: matched,
            });
        }

        report.unclassified_columns = table
            .indicator_columns()
            .iter()
            .filter(|c| !claimed.contains_key(c.as_str()))
            .cloned()
            .collect();

        report.shared_columns = claimed
            .into_iter()
            .filter(|(_, labels)| labels.len() > 1)
            .map(|(column, pillars)| SharedColumn { column, pillars })
            .collect();

        if !report.unmatched_keywords.is_empty() {
            warn!(
                "{} taxonomy keywords matched no column",
                report.unmatched_keywords.len()
            );
        }
        if !report.unclassified_columns.is_empty() {
            warn!(
                "{} indicator columns matched no pillar: {:?}",
                report.unclassified_columns.len(),
                report.unclassified_columns
            );
        }
        if !report.omitted_pillars.is_empty() {
            warn!("Pillars omitted: {:?}", report.omitted_pillars);
        }

        info!(
            "Classified {} indicator columns into {} pillars",
            table.indicator_columns().len(),
            pillars.len()
        );

        Ok(Classification {
            pillars: PillarSet { pillars },
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatasetLevel, LoaderConfig};
    use crate::loader::TableLoader;
    use crate::names::RegionNameCanonicalizer;
    use crate::taxonomy::Pillar;
    use pretty_assertions::assert_eq;

    fn load(csv: &str, config: LoaderConfig) -> NormalizedTable {
        TableLoader::new(config, RegionNameCanonicalizer::default())
            .unwrap()
            .load_bytes(csv.as_bytes(), "test.csv")
            .unwrap()
            .0
    }

    fn hrh_taxonomy() -> Taxonomy {
        Taxonomy::new(vec![
            Pillar::new("HRH", ["HRH Score"]),
            Pillar::new("Innovation", ["Number of PHC related innovations"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_keyword_matches_case_insensitively() {
        let csv = "County,HRH Score,hrh score (weighted),Governance Score\nA,1,2,3\n";
        let table = load(csv, LoaderConfig::default());
        let result = PillarClassifier::new(hrh_taxonomy()).classify(&table).unwrap();

        let hrh = result.pillars.get("HRH").unwrap();
        let columns: Vec<String> = hrh
            .df()
            .get_column_names()
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(columns, vec!["County", "HRH Score", "hrh score (weighted)"]);
        assert_eq!(result.pillars.len(), 1);
        assert_eq!(result.report.omitted_pillars, vec!["Innovation".to_string()]);
        assert_eq!(
            result.report.unclassified_columns,
            vec!["Governance Score".to_string()]
        );
        assert_eq!(result.report.unmatched_keywords.len(), 1);
    }

    #[test]
    fn test_pillar_columns_are_bounded() {
        let csv = "County,Governance Score,HRH Score,HRH Weighted Score,Unknown\nA,1,2,3,4\n";
        let table = load(csv, LoaderConfig::default());
        let result = PillarClassifier::new(Taxonomy::county()).classify(&table).unwrap();

        let source: HashSet<String> = table
            .df()
            .get_column_names()
            .iter()
            .map(|c| c.to_string())
            .collect();
        for pillar in result.pillars.iter() {
            let columns: Vec<String> = pillar
                .df()
                .get_column_names()
                .iter()
                .map(|c| c.to_string())
                .collect();
            assert!(columns.len() >= 2);
            assert_eq!(columns[0], "County");
            assert!(columns.iter().all(|c| source.contains(c)));
        }
    }

    #[test]
    fn test_shared_columns_are_reported() {
        let taxonomy = Taxonomy::new(vec![
            Pillar::new("Weighted", ["Weighted Score"]),
            Pillar::new("HRH", ["HRH"]),
        ])
        .unwrap();
        let csv = "County,HRH Weighted Score\nA,1\n";
        let table = load(csv, LoaderConfig::default());
        let result = PillarClassifier::new(taxonomy).classify(&table).unwrap();

        assert_eq!(result.pillars.labels(), vec!["Weighted", "HRH"]);
        assert_eq!(result.report.shared_columns.len(), 1);
        assert_eq!(result.report.shared_columns[0].pillars.len(), 2);
    }

    #[test]
    fn test_keyword_spacing_is_normalized() {
        assert!(PillarClassifier::matches(
            "Clinical officer to population ratio",
            "Clinical officer to  population ratio"
        ));
        assert!(!PillarClassifier::matches("HRH Score", "HPT"));
    }

    #[test]
    fn test_ranked_and_drill_down() {
        let csv = "County,Sub county,HRH Score\n\
                   Kisumu,Kisumu East,40\n\
                   Kisumu,Kisumu West,70\n\
                   Siaya,Alego,55\n";
        let table = load(csv, LoaderConfig::for_level(DatasetLevel::Pcn));
        let result = PillarClassifier::new(hrh_taxonomy()).classify(&table).unwrap();
        let hrh = result.pillars.get("HRH").unwrap();

        let ranked = hrh.ranked("HRH Score").unwrap();
        let labels: Vec<&str> = ranked.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["Kisumu West", "Alego", "Kisumu East"]);

        let kisumu = hrh.filter_by_region("Kisumu").unwrap();
        assert_eq!(kisumu.height(), 2);
        assert_eq!(
            hrh.sub_regions("Kisumu").unwrap(),
            vec!["Kisumu East".to_string(), "Kisumu West".to_string()]
        );
    }

    #[test]
    fn test_sub_region_filter() {
        let csv = "County,Sub county,HRH Score\n\
                   Kisumu,Kisumu East,40\n\
                   Kisumu,Kisumu West,70\n";
        let table = load(csv, LoaderConfig::for_level(DatasetLevel::Pcn));
        let result = PillarClassifier::new(hrh_taxonomy()).classify(&table).unwrap();
        let hrh = result.pillars.get("HRH").unwrap();

        let west = hrh.filter_by_sub_region("Kisumu West").unwrap();
        let ranked = west.ranked("HRH Score").unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].label, "Kisumu West");
        assert_eq!(ranked[0].value, 70.0);
        assert_eq!(hrh.filter_by_sub_region("Nyando").unwrap().height(), 0);

        let county = load("County,HRH Score\nA,1\n", LoaderConfig::default());
        let result = PillarClassifier::new(hrh_taxonomy()).classify(&county).unwrap();
        let err = result
            .pillars
            .get("HRH")
            .unwrap()
            .filter_by_sub_region("A")
            .unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
    }

    #[test]
    fn test_unknown_indicator_and_pillar() {
        let csv = "County,HRH Score\nA,1\n";
        let table = load(csv, LoaderConfig::default());
        let result = PillarClassifier::new(hrh_taxonomy()).classify(&table).unwrap();

        let err = result.pillars.get("HRH").unwrap().ranked("Nope").unwrap_err();
        assert_eq!(err.error_code(), "INDICATOR_NOT_FOUND");
        assert_eq!(
            result.pillars.get("Nope").unwrap_err().error_code(),
            "PILLAR_NOT_FOUND"
        );
    }
}
