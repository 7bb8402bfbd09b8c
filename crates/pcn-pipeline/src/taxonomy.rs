//! Keyword taxonomies that group survey columns into pillars.
//!
//! A [`Taxonomy`] is an ordered list of pillars, each with a list of keyword
//! phrases. It is an immutable value handed to the classifier, versioned
//! together with the CSV schema it describes. Two presets ship with the
//! crate; others can be loaded from JSON.

use crate::config::DatasetLevel;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One pillar: a display label and the phrases that identify its columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pillar {
    pub label: String,
    pub keywords: Vec<String>,
}

impl Pillar {
    pub fn new<I, S>(label: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label: label.into(),
            keywords: keywords.into_iter().map(Into::into).collect(),
        }
    }
}

/// Ordered pillar definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    pillars: Vec<Pillar>,
}

static_assertions::assert_impl_all!(Taxonomy: Send, Sync);

impl Taxonomy {
    /// Build and validate a taxonomy.
    pub fn new(pillars: Vec<Pillar>) -> Result<Self> {
        let taxonomy = Self { pillars };
        taxonomy.validate()?;
        Ok(taxonomy)
    }

    /// Preset for a dataset level.
    pub fn for_level(level: DatasetLevel) -> Self {
        match level {
            DatasetLevel::County => Self::county(),
            DatasetLevel::Pcn => Self::pcn(),
        }
    }

    /// Load a taxonomy from a JSON file.
    ///
    /// Accepts either `{"pillars": [{"label": .., "keywords": [..]}]}` or a
    /// plain ordered array of pillars.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::unreadable(path, e))?;
        Self::from_json(&text).map_err(|e| e.with_context(format!("taxonomy {}", path.display())))
    }

    /// Parse a taxonomy from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Wrapped { pillars: Vec<Pillar> },
            Bare(Vec<Pillar>),
        }

        let pillars = match serde_json::from_str::<Repr>(text)? {
            Repr::Wrapped { pillars } | Repr::Bare(pillars) => pillars,
        };
        Self::new(pillars)
    }

    pub fn pillars(&self) -> &[Pillar] {
        &self.pillars
    }

    pub fn len(&self) -> usize {
        self.pillars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pillars.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<&Pillar> {
        self.pillars.iter().find(|p| p.label == label)
    }

    /// Check labels are non-empty and unique and every keyword has text.
    pub fn validate(&self) -> Result<()> {
        if self.pillars.is_empty() {
            return Err(PipelineError::InvalidTaxonomy(
                "taxonomy has no pillars".to_string(),
            ));
        }

        let mut labels = HashSet::new();
        for pillar in &self.pillars {
            if pillar.label.trim().is_empty() {
                return Err(PipelineError::InvalidTaxonomy(
                    "pillar with empty label".to_string(),
                ));
            }
            if !labels.insert(pillar.label.as_str()) {
                return Err(PipelineError::InvalidTaxonomy(format!(
                    "duplicate pillar label '{}'",
                    pillar.label
                )));
            }
            if pillar.keywords.is_empty() {
                return Err(PipelineError::InvalidTaxonomy(format!(
                    "pillar '{}' has no keywords",
                    pillar.label
                )));
            }
            // An empty keyword would be a substring of every header.
            if pillar.keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(PipelineError::InvalidTaxonomy(format!(
                    "pillar '{}' has an empty keyword",
                    pillar.label
                )));
            }
        }

        Ok(())
    }

    /// Pillars of the county-level survey export.
    pub fn county() -> Self {
        Self {
            pillars: vec![
                Pillar::new(
                    "1. Governance",
                    [
                        "Proportion of functional PHC advisory Committees in Place",
                        "Proportion of PCNs Established",
                        "Proportion of PCNs Gazetted",
                        "Availability of a Functional PCN management committee",
                        "Proportion of Hospital management boards appointed/gazetted:",
                        "Proportion of Health Facilities (level 2&3) with Health Facility Management Committee Appointed/Gazetted",
                        "Availability of a functional PHC TWG Score",
                        "Proportion of PCNs with an operational budget for the MDT activities:",
                        "Perfomance Review Score",
                        "CHMT Support Supervision Score",
                        "Governance Score",
                        "Governance Weighted Score",
                    ],
                ),
                Pillar::new(
                    "2. Human Resources for Health (HRH)",
                    [
                        "Does the County have a mechanism to enhance health workers skills",
                        "HRH Score",
                        "HRH Weighted Score",
                    ],
                ),
                Pillar::new(
                    "3. Health Product Technologies (HPT)",
                    [
                        "Proportion of county health budget allocated to drugs and supplies",
                        "Proportion of county HPT budget allocated to levels 2&3 :",
                        "HPT Score",
                        "HPT Weighted Score",
                    ],
                ),
                Pillar::new(
                    "4. Service Delivery Systems",
                    [
                        "PCNs with functional refferal mechanisms",
                        "Service Delivery Systems Score",
                        "Service Delivery Systems Weighted Score",
                    ],
                ),
                Pillar::new(
                    "5. Healthcare Financing",
                    [
                        "Proportion of households registered on SHA within the County",
                        "Healthcare Financing Score",
                        "Healthcare Financing Weighted Score",
                    ],
                ),
                Pillar::new(
                    "6. HMIS/Digital Health",
                    [
                        "Proportion of SMART PCNs in the County",
                        "HMIS Score",
                        "HMIS Weighted Score",
                    ],
                ),
                Pillar::new(
                    "7. Quality of Care (QoC) - Management Systems",
                    [
                        "Mechanism to Coordinate Quality Improvement Score",
                        "Mechanism for Implementation of Support Supervision in Health Facilities Score",
                        "Presence of an Infection Prevention Control (IPC) committee Score",
                        "QoC Management Systems Score",
                        "QoC Management Systems Weighted Score",
                    ],
                ),
                Pillar::new(
                    "8. Multisectoral Partnerships and Coordination",
                    [
                        "Number of bi-annual multisectoral stakeholder forums Score",
                        "Proportion of MOUs and partnership agreements aligned to PHC signed",
                        "Research studies done on PCN implementation Score",
                        "Multisectoral Partnerships and Coordination Score",
                        "Multisectoral Partnerships and Coordination Weighted Score",
                    ],
                ),
                Pillar::new(
                    "9. Innovations and Learning",
                    [
                        "Number of knowledge management and learning forums conducted Score:",
                        "No. of research studies done on PCN implementation Score",
                        "Innovations and Learning Score",
                        "Innovations and Learning Weighted Score",
                    ],
                ),
                Pillar::new(
                    "10. Overall Score",
                    ["Total County Score (Total Weighted Score)"],
                ),
            ],
        }
    }

    /// Pillars of the PCN-level survey export.
    pub fn pcn() -> Self {
        Self {
            pillars: vec![
                Pillar::new(
                    "1. Governance",
                    [
                        "Proportion of functional Community Health Committees",
                        "Proportion of Health facilities that have received supportive supervision",
                        "Functional PCN Management committee",
                        "Functionallity of MDTs",
                        "Governance Score",
                        "Governance Weighted Score",
                    ],
                ),
                Pillar::new(
                    "2. Population Health Needs",
                    [
                        "Number of population profiling assessments conducted",
                        "Proportion of population health needs that have been addressed",
                        "Number of wellness activities conducted",
                        "Population Needs Score",
                        "Population Needs Weighted Score",
                    ],
                ),
                Pillar::new(
                    "3. Capacity Readiness",
                    [
                        "Proportion of facilities in the PCN that had all 22 tracer pharmaceuticals",
                        "Proportion of facilities in the PCN that have all 23 tracer non-pharmaceuticals",
                        "Availability of the whole blood and blood components",
                        "Percentage of Health facilities with stock out on any of the 22 tracer pharmaceuticals",
                        "Percentage of Health facilities with stock out on any of the 22 tracer non-pharmaceuticals",
                        "Proportion of hospitals with comprehensive lab services",
                        "Proportion of spokes with basic lab services",
                        "Proportion of Facilities within the PCN with all basic tracer equipment",
                        "Capacity Readiness Score",
                        "Capacity Readiness Weighted Score",
                    ],
                ),
                Pillar::new(
                    "4. Healthcare Financing",
                    [
                        "Proportion of clients accessing Health Services using SHIF",
                        "Proportion of the target Health Facilities empanneled on SHA",
                        "Proportion of Health Facilities in the PCN making SHA claims",
                        "Proportion of claims reimbursed to HFs within the PCN",
                        "Proportion of FIF collected rolled back to the facilities within PCN",
                        "Number of people waived for user fees",
                        "Total amount of user fees waived",
                        "Healthcare Financing Score",
                        "Healthcare Financing Weighted Score",
                    ],
                ),
                Pillar::new(
                    "5. Health Infrastructure",
                    [
                        "Proportion of health facilities with accessible road network",
                        "Proportion of facilities with the appropriate WASH facilities",
                        "Proportion of facilities with the tracer list of infrastructure",
                        "Proportion of facilties with a reliable power source",
                        "PCN access to adequate ambulance services",
                        "Ambulance request Score",
                        "Health infrastructure Score",
                        "Health infrastructure Weighted Score",
                    ],
                ),
                Pillar::new(
                    "6. HMIS/Digital Health",
                    [
                        "Proprtion of facilties with reliable internet connection",
                        "Proportion of facilities in the PCN with the key OPD reporting tools",
                        "No of performance and data quality review meetings held quarterly",
                        "Proportion of facilities with ICT infrastructure",
                        "Proportion of facilities in a PCN with an integrated functional EMR",
                        "Proportion of CHUs within the PCN reporting monthly",
                        "HMIS Score",
                        "HMIS Weighted Score",
                    ],
                ),
                Pillar::new(
                    "7. Human Resources for Health (HRH)",
                    [
                        "Core HRH density",
                        "Doctor to population ratio",
                        "Clinical officer to  population ratio",
                        "Nurse to population ratio",
                        "CHA/CHO  to population ratio",
                        "Proportion of CHPs trained on basic modules",
                        "Health care workers sensitized on PHC /PCN",
                        "Does the PCN have a mechanism to enhance health workers skills",
                        "Proportion of health workers who have undergone a skills/ competency buliding course",
                        "HRH Score",
                        "HRH Weighted Score",
                    ],
                ),
                Pillar::new(
                    "8. Service Delivery",
                    [
                        "Number of outreaches conducted by the MDT",
                        "Number of in-reaches conducted within the PCN",
                        "Service Delivery Score",
                        "Service Delivery Weighted Score",
                    ],
                ),
                Pillar::new(
                    "9. Quality of Care - Management Systems",
                    [
                        "Proportion of hospitals with functional facility quality improvement teams",
                        "Proportion of spokes with functional facility work improvement teams",
                        "Average availability of selected IPC items",
                        "QoC Management Systems Score",
                        "QoC Management Systems Weighted Score",
                    ],
                ),
                Pillar::new(
                    "10. Quality of Care - PHC Core Systems",
                    [
                        "Adherence to clinical guidelines",
                        "Provider Availability (absenteeism)",
                        "QoC PHC Core Systems Score",
                    ],
                ),
                Pillar::new(
                    "11. Quality of Care - Outcomes",
                    [
                        "Proportion of facilities conducting MPDSR",
                        "Fresh Stillbirth rate",
                        "Number of maternal deaths",
                        "Proportion of maternal deaths Audited",
                        "Number of neonatal deaths",
                        "Proportion of neonatal deaths audited",
                        "TB Treatment Success Rate",
                        "QoC Outcomes Score",
                    ],
                ),
                Pillar::new(
                    "12. Social Accountability",
                    [
                        "Proportion of facilities which have conducted a client satisfaction survey",
                        "No. of MDT engagements with the community",
                        "No. of health facilities with functional GRMs",
                        "Social Accountability Score",
                    ],
                ),
                Pillar::new(
                    "13. Multisectoral Partnerships and Coordination",
                    [
                        "Proportion of multi-sectoral actions implemented",
                        "Number of inter- PCN peer to peer learning sessions held",
                        "Multisectoral Partnerships and Coordination Score",
                    ],
                ),
                Pillar::new(
                    "14. Innovations and Learning",
                    [
                        "Number of PHC related innovations",
                        "Innovations and Learning Score",
                        "Innovations and Learning Weighted Score",
                    ],
                ),
                Pillar::new(
                    "15. Overall PCN Score",
                    ["Total PCN Score", "Total PCN Score (Total Weighted Score)"],
                ),
            ],
        }
    }
}
