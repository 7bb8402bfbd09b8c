//! Report generation module.
//!
//! Turns a [`DashboardOutput`](crate::pipeline::DashboardOutput) into
//! artifacts a dashboard front end can consume:
//! - a [`DashboardReport`] for `--json` on stdout or `--emit-report` on disk
//! - one CSV per pillar table and one for the reconciled selection
//! - a choropleth-ready GeoJSON layer
//!
//! # Example
//!
//! ```rust,ignore
//! use pcn_pipeline::reporting::{DashboardReport, ReportWriter};
//!
//! let report = DashboardReport::from_output(&output, "county.csv", Some("adm1.geojson"));
//! println!("{}", serde_json::to_string_pretty(&report)?);
//!
//! let writer = ReportWriter::new("outputs");
//! writer.write_report(&report, "county")?;
//! ```

mod generator;

pub use generator::{DashboardReport, PillarSummary, ReportWriter, choropleth_collection, file_slug};
