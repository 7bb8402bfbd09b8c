//! Geographic key projection.
//!
//! Boundary layers are read from GeoJSON, reprojected to WGS84 and reduced
//! to canonical region names so that they can be joined against survey data.

mod boundary;
mod crs;

pub use boundary::{BoundaryFeature, BoundaryKeySet, BoundaryLoader, BoundaryOptions, BoundarySummary};
pub use crs::Crs;
