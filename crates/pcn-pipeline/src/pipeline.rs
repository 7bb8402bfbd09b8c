//! End-to-end wiring of one dashboard section.
//!
//! [`DashboardPipeline`] owns the loader, the classifier, the boundary
//! projector and the join options for one [`DatasetLevel`]. Parsed sources
//! are memoised per file so repeated selections do not re-read anything.

use crate::cache::SourceCache;
use crate::classifier::{Classification, PillarClassifier, PillarTable, RankedEntry};
use crate::config::{DatasetLevel, DuplicateNamePolicy, JoinOptions, LoaderConfig};
use crate::error::{PipelineError, Result};
use crate::geo::{BoundaryKeySet, BoundaryLoader, BoundaryOptions};
use crate::join::{ReconciledTable, reconcile};
use crate::loader::{LoadStats, NormalizedTable, TableLoader};
use crate::names::{NameOverrides, RegionNameCanonicalizer};
use crate::taxonomy::Taxonomy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Sub-region selection meaning "every sub-region of the region".
pub const ALL_SUB_REGIONS: &str = "All";

/// A loaded and classified survey source.
#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub table: NormalizedTable,
    pub stats: LoadStats,
    pub classification: Classification,
}

/// What to render.
#[derive(Debug, Clone, Default)]
pub struct DashboardRequest {
    pub csv: PathBuf,
    pub boundary: Option<PathBuf>,
    /// Pillar label; the first pillar when absent.
    pub pillar: Option<String>,
    /// Indicator column; the first indicator of the pillar when absent.
    pub indicator: Option<String>,
    /// Restrict to one region before ranking and joining; canonicalized first.
    pub region: Option<String>,
    /// Restrict the ranking (not the join) to one sub-region; `"All"` means no filter.
    pub sub_region: Option<String>,
}

/// The chosen pillar/indicator pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub pillar: String,
    pub indicator: String,
    pub region: Option<String>,
    pub sub_region: Option<String>,
}

/// Result of [`DashboardPipeline::run`].
#[derive(Debug, Clone)]
pub struct DashboardOutput {
    pub level: DatasetLevel,
    pub source: Arc<LoadedSource>,
    pub boundary: Option<Arc<BoundaryKeySet>>,
    /// `None` when no pillar could be formed from the source.
    pub selection: Option<Selection>,
    pub ranking: Vec<RankedEntry>,
    pub reconciled: Option<ReconciledTable>,
}

/// Loader, classifier and projector for one dataset level.
#[derive(Debug)]
pub struct DashboardPipeline {
    level: DatasetLevel,
    loader: TableLoader,
    classifier: PillarClassifier,
    boundary_loader: BoundaryLoader,
    join: JoinOptions,
    sources: SourceCache<LoadedSource>,
    boundaries: SourceCache<BoundaryKeySet>,
}

impl DashboardPipeline {
    pub fn builder() -> DashboardPipelineBuilder {
        DashboardPipelineBuilder::default()
    }

    pub fn level(&self) -> DatasetLevel {
        self.level
    }

    pub fn join_options(&self) -> &JoinOptions {
        &self.join
    }

    /// Load, normalize and classify a survey CSV (memoised per file).
    pub fn load_source(&self, path: &Path) -> Result<Arc<LoadedSource>> {
        self.sources.get_or_load(path, |path| {
            let (table, stats) = self.loader.load_path(path)?;
            let classification = self.classifier.classify(&table)?;
            Ok(LoadedSource {
                table,
                stats,
                classification,
            })
        })
    }

    /// Load and project a boundary layer (memoised per file).
    pub fn load_boundary(&self, path: &Path) -> Result<Arc<BoundaryKeySet>> {
        self.boundaries
            .get_or_load(path, |path| self.boundary_loader.load_path(path))
    }

    /// Resolve the requested pillar and indicator, falling back to the first of each.
    pub fn select<'a>(
        &self,
        source: &'a LoadedSource,
        pillar: Option<&str>,
        indicator: Option<&str>,
    ) -> Result<Option<(&'a PillarTable, String)>> {
        let pillars = &source.classification.pillars;
        let table = match pillar {
            Some(label) => pillars.get(label)?,
            None => match pillars.first() {
                Some(table) => table,
                None => return Ok(None),
            },
        };

        let indicator = match indicator {
            Some(name) if table.indicators().iter().any(|c| c == name) => name.to_string(),
            Some(name) => {
                return Err(PipelineError::IndicatorNotFound {
                    pillar: table.label().to_string(),
                    indicator: name.to_string(),
                });
            }
            // A pillar table always has at least one indicator.
            None => match table.indicators().first() {
                Some(first) => first.clone(),
                None => return Ok(None),
            },
        };

        Ok(Some((table, indicator)))
    }

    /// Run one section: load, classify, select, rank and optionally join.
    pub fn run(&self, request: &DashboardRequest) -> Result<DashboardOutput> {
        let source = self.load_source(&request.csv)?;
        let boundary = request
            .boundary
            .as_deref()
            .map(|path| self.load_boundary(path))
            .transpose()?;

        let Some((table, indicator)) =
            self.select(&source, request.pillar.as_deref(), request.indicator.as_deref())?
        else {
            info!("No pillars could be formed from {}", request.csv.display());
            return Ok(DashboardOutput {
                level: self.level,
                source: Arc::clone(&source),
                boundary,
                selection: None,
                ranking: Vec::new(),
                reconciled: None,
            });
        };

        let region = request
            .region
            .as_deref()
            .map(|name| self.loader.canonicalizer().canonicalize_str(name));
        let scoped = match &region {
            Some(region) => table.filter_by_region(region)?,
            None => table.clone(),
        };

        let sub_region = request
            .sub_region
            .as_deref()
            .filter(|name| !name.trim().eq_ignore_ascii_case(ALL_SUB_REGIONS))
            .map(|name| self.loader.canonicalizer().canonicalize_str(name));
        let ranking = match &sub_region {
            Some(sub_region) => scoped.filter_by_sub_region(sub_region)?.ranked(&indicator)?,
            None => scoped.ranked(&indicator)?,
        };
        let reconciled = boundary
            .as_deref()
            .map(|boundary| reconcile(boundary, &scoped, &indicator, &self.join))
            .transpose()?;

        let selection = Selection {
            pillar: scoped.label().to_string(),
            indicator,
            region,
            sub_region,
        };

        Ok(DashboardOutput {
            level: self.level,
            source: Arc::clone(&source),
            boundary,
            selection: Some(selection),
            ranking,
            reconciled,
        })
    }
}

/// Builder for [`DashboardPipeline`].
#[derive(Debug, Default)]
pub struct DashboardPipelineBuilder {
    level: DatasetLevel,
    loader_config: Option<LoaderConfig>,
    taxonomy: Option<Taxonomy>,
    overrides: Option<NameOverrides>,
    name_attribute: Option<String>,
    detect_name_attribute: bool,
    duplicate_names: DuplicateNamePolicy,
    join: Option<JoinOptions>,
}

impl DashboardPipelineBuilder {
    /// Dataset level; selects the default loader config, taxonomy, boundary attribute and join key.
    pub fn level(mut self, level: DatasetLevel) -> Self {
        self.level = level;
        self
    }

    pub fn loader_config(mut self, config: LoaderConfig) -> Self {
        self.loader_config = Some(config);
        self
    }

    pub fn taxonomy(mut self, taxonomy: Taxonomy) -> Self {
        self.taxonomy = Some(taxonomy);
        self
    }

    pub fn name_overrides(mut self, overrides: NameOverrides) -> Self {
        self.overrides = Some(overrides);
        self
    }

    /// Boundary attribute holding region names.
    pub fn name_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.name_attribute = Some(attribute.into());
        self
    }

    /// Pick the boundary name attribute from the data instead of the level default.
    pub fn detect_name_attribute(mut self) -> Self {
        self.detect_name_attribute = true;
        self
    }

    pub fn duplicate_names(mut self, policy: DuplicateNamePolicy) -> Self {
        self.duplicate_names = policy;
        self
    }

    pub fn join_options(mut self, options: JoinOptions) -> Self {
        self.join = Some(options);
        self
    }

    pub fn build(self) -> Result<DashboardPipeline> {
        let level = self.level;
        let canonicalizer = match self.overrides {
            Some(overrides) => RegionNameCanonicalizer::new(overrides)?,
            None => RegionNameCanonicalizer::default(),
        };

        let loader_config = self
            .loader_config
            .unwrap_or_else(|| LoaderConfig::for_level(level));
        let loader = TableLoader::new(loader_config, canonicalizer.clone())?;

        let taxonomy = self.taxonomy.unwrap_or_else(|| Taxonomy::for_level(level));
        taxonomy.validate()?;

        let name_attribute = match (self.name_attribute, self.detect_name_attribute) {
            (Some(attribute), _) => Some(attribute),
            (None, true) => None,
            (None, false) => Some(level.boundary_attribute().to_string()),
        };
        let boundary_options = BoundaryOptions {
            name_attribute,
            duplicates: self.duplicate_names,
        };

        let join = self.join.unwrap_or(JoinOptions {
            key: level.join_key(),
            missing: level.missing_policy(),
            ..JoinOptions::default()
        });

        Ok(DashboardPipeline {
            level,
            loader,
            classifier: PillarClassifier::new(taxonomy),
            boundary_loader: BoundaryLoader::new(boundary_options, canonicalizer),
            join,
            sources: SourceCache::new(),
            boundaries: SourceCache::new(),
        })
    }
}
