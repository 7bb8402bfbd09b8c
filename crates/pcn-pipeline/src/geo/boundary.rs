//! Boundary layers reduced to `(canonical name, geometry)` pairs.

use super::crs::Crs;
use crate::config::DuplicateNamePolicy;
use crate::error::{PipelineError, Result};
use crate::names::RegionNameCanonicalizer;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Attribute names never taken as the region name.
const NON_NAME_ATTRIBUTES: [&str; 3] = ["geometry", "objectid", "fid"];

/// Options for reading a boundary layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryOptions {
    /// Attribute carrying the region name. Detected when absent.
    pub name_attribute: Option<String>,
    /// Handling of features whose names canonicalize to the same value.
    pub duplicates: DuplicateNamePolicy,
}

/// One region of a boundary layer.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryFeature {
    pub name: String,
    /// GeoJSON geometry object in WGS84 longitude/latitude.
    pub geometry: Value,
}

/// What happened while reading a boundary layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundarySummary {
    pub source: String,
    pub source_crs: String,
    pub name_attribute: String,
    pub features_read: usize,
    pub features_kept: usize,
    pub unnamed_skipped: usize,
    pub duplicates_merged: usize,
}

/// Boundary features keyed by unique canonical name, in source order.
#[derive(Debug, Clone)]
pub struct BoundaryKeySet {
    features: Vec<BoundaryFeature>,
    summary: BoundarySummary,
}

impl BoundaryKeySet {
    pub fn features(&self) -> &[BoundaryFeature] {
        &self.features
    }

    pub fn summary(&self) -> &BoundarySummary {
        &self.summary
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&BoundaryFeature> {
        self.features.iter().find(|f| f.name == name)
    }

    /// Render as a GeoJSON FeatureCollection whose only property is the key.
    pub fn to_feature_collection(&self, key_property: &str) -> Value {
        let features: Vec<Value> = self
            .features
            .iter()
            .map(|feature| {
                let mut properties = Map::new();
                properties.insert(key_property.to_string(), Value::from(feature.name.clone()));
                json!({
                    "type": "Feature",
                    "properties": properties,
                    "geometry": feature.geometry,
                })
            })
            .collect();

        json!({
            "type": "FeatureCollection",
            "features": features,
        })
    }

    /// The ordered key list as a one-column frame.
    pub fn to_frame(&self, key_column: &str) -> Result<DataFrame> {
        let names: Vec<&str> = self.names();
        Ok(DataFrame::new(vec![Column::new(key_column.into(), names)])?)
    }
}

/// Reads GeoJSON boundary layers.
#[derive(Debug, Clone)]
pub struct BoundaryLoader {
    options: BoundaryOptions,
    canonicalizer: RegionNameCanonicalizer,
}

impl BoundaryLoader {
    pub fn new(options: BoundaryOptions, canonicalizer: RegionNameCanonicalizer) -> Self {
        Self {
            options,
            canonicalizer,
        }
    }

    pub fn options(&self) -> &BoundaryOptions {
        &self.options
    }

    /// Read a GeoJSON file. Any failure names the file.
    pub fn load_path(&self, path: &Path) -> Result<BoundaryKeySet> {
        info!("Loading boundaries from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::unreadable(path, e))?;
        self.load_str(&text, &path.display().to_string())
            .map_err(|e| match e {
                PipelineError::Json(_) => PipelineError::unreadable(path, e),
                other => other.with_context(format!("boundary {}", path.display())),
            })
    }

    pub fn load_str(&self, text: &str, source: &str) -> Result<BoundaryKeySet> {
        let doc: Value = serde_json::from_str(text)?;
        self.project(doc, source)
    }

    /// Project a parsed GeoJSON document to canonical names and WGS84 geometry.
    pub fn project(&self, mut doc: Value, source: &str) -> Result<BoundaryKeySet> {
        let crs = Crs::from_geojson(&doc)?;

        let raw_features = match doc.get_mut("features").map(Value::take) {
            Some(Value::Array(features)) => features,
            _ => match doc.get("type").and_then(Value::as_str) {
                Some("Feature") => vec![doc.clone()],
                _ => {
                    return Err(PipelineError::InvalidGeometry {
                        feature: 0,
                        reason: "document is not a FeatureCollection".to_string(),
                    });
                }
            },
        };

        let name_attribute = match &self.options.name_attribute {
            Some(attribute) => attribute.clone(),
            None => detect_name_attribute(&raw_features).ok_or_else(|| {
                PipelineError::ColumnNotFound("boundary name attribute".to_string())
            })?,
        };

        let attribute_seen = raw_features
            .iter()
            .any(|f| f.get("properties").and_then(|p| p.get(&name_attribute)).is_some());
        if !raw_features.is_empty() && !attribute_seen {
            return Err(PipelineError::ColumnNotFound(name_attribute));
        }
        debug!("Using boundary attribute '{}' ({})", name_attribute, crs);

        let mut summary = BoundarySummary {
            source: source.to_string(),
            source_crs: crs.to_string(),
            name_attribute: name_attribute.clone(),
            features_read: raw_features.len(),
            ..BoundarySummary::default()
        };

        let mut features: Vec<BoundaryFeature> = Vec::with_capacity(raw_features.len());
        let mut positions: HashMap<String, (usize, usize)> = HashMap::new();

        for (index, mut feature) in raw_features.into_iter().enumerate() {
            let name = feature
                .get("properties")
                .and_then(|p| p.get(&name_attribute))
                .and_then(attribute_text)
                .and_then(|raw| self.canonicalizer.canonicalize(Some(raw.as_str())))
                .filter(|name| !name.is_empty());

            let Some(name) = name else {
                summary.unnamed_skipped += 1;
                continue;
            };

            let mut geometry = feature
                .get_mut("geometry")
                .map(Value::take)
                .unwrap_or(Value::Null);
            crs.reproject_geometry(&mut geometry, index)?;

            match positions.get(&name) {
                None => {
                    positions.insert(name.clone(), (features.len(), index));
                    features.push(BoundaryFeature { name, geometry });
                }
                Some(&(slot, first)) => match self.options.duplicates {
                    DuplicateNamePolicy::Reject => {
                        return Err(PipelineError::DuplicateBoundaryName {
                            name,
                            first,
                            second: index,
                        });
                    }
                    DuplicateNamePolicy::Merge => {
                        debug!("Merging duplicate boundary region '{}'", name);
                        let existing = features[slot].geometry.take();
                        features[slot].geometry = merge_geometries(existing, geometry);
                        summary.duplicates_merged += 1;
                    }
                },
            }
        }

        if summary.unnamed_skipped > 0 {
            warn!(
                "{} boundary features without a '{}' value were skipped",
                summary.unnamed_skipped, name_attribute
            );
        }

        summary.features_kept = features.len();
        info!(
            "Loaded {} boundary regions from {} ({})",
            summary.features_kept, source, summary.source_crs
        );

        Ok(BoundaryKeySet { features, summary })
    }
}

/// First attribute whose name mentions `sub` or `name`, else the first attribute.
fn detect_name_attribute(features: &[Value]) -> Option<String> {
    let properties = features
        .iter()
        .find_map(|f| f.get("properties").and_then(Value::as_object))?;

    let candidates: Vec<&String> = properties
        .keys()
        .filter(|k| !NON_NAME_ATTRIBUTES.contains(&k.to_lowercase().as_str()))
        .collect();

    candidates
        .iter()
        .find(|k| {
            let lower = k.to_lowercase();
            lower.contains("sub") || lower.contains("name")
        })
        .or_else(|| candidates.first())
        .map(|k| k.to_string())
}

fn attribute_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn polygons_of(geometry: &Value) -> Option<Vec<Value>> {
    match geometry.get("type").and_then(Value::as_str)? {
        "Polygon" => Some(vec![geometry.get("coordinates")?.clone()]),
        "MultiPolygon" => geometry.get("coordinates")?.as_array().cloned(),
        _ => None,
    }
}

fn members_of(geometry: Value) -> Vec<Value> {
    if geometry.get("type").and_then(Value::as_str) == Some("GeometryCollection") {
        if let Some(Value::Array(members)) = geometry.get("geometries") {
            return members.clone();
        }
    }
    if geometry.is_null() {
        Vec::new()
    } else {
        vec![geometry]
    }
}

/// Union two geometries into one MultiPolygon, or a GeometryCollection when
/// either side is not areal.
fn merge_geometries(first: Value, second: Value) -> Value {
    if first.is_null() {
        return second;
    }
    if second.is_null() {
        return first;
    }

    match (polygons_of(&first), polygons_of(&second)) {
        (Some(mut a), Some(b)) => {
            a.extend(b);
            json!({"type": "MultiPolygon", "coordinates": a})
        }
        _ => {
            let mut members = members_of(first);
            members.extend(members_of(second));
            json!({"type": "GeometryCollection", "geometries": members})
        }
    }
}
