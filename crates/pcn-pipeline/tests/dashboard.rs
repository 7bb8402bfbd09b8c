use pcn_pipeline::{
    DashboardPipeline, DashboardReport, DashboardRequest, DatasetLevel, NameOverrides,
    ReportWriter, Taxonomy,
};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use tempfile::tempdir;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn county_pipeline() -> DashboardPipeline {
    DashboardPipeline::builder()
        .level(DatasetLevel::County)
        .build()
        .unwrap()
}

fn pcn_pipeline() -> DashboardPipeline {
    DashboardPipeline::builder()
        .level(DatasetLevel::Pcn)
        .build()
        .unwrap()
}

#[test]
fn test_county_export_is_normalized() {
    let pipeline = county_pipeline();
    let source = pipeline.load_source(&fixture("county_survey.csv")).unwrap();

    // 47 counties plus the Total and Average rows.
    assert_eq!(source.stats.raw_rows, 49);
    assert_eq!(source.stats.rows_filtered, 2);
    // Kwale carries no indicator values at all.
    assert_eq!(source.stats.coercion.rows_dropped, 1);
    assert_eq!(source.stats.rows_loaded, 46);
    assert_eq!(source.stats.coercion.sentinels_replaced, 2);
    assert_eq!(source.stats.coercion.unparseable_cells, 46 + 1);

    let columns = source.table.indicator_columns();
    assert!(columns.contains(&"Proportion of PCNs Established".to_string()));
    assert!(columns.contains(&"Governance Score".to_string()));
    assert_eq!(columns.len(), 9);

    let regions = source.table.regions().unwrap();
    for expected in ["Nairobi", "Mombasa", "Homa Bay", "Elgeyo Marakwet", "Tharaka Nithi"] {
        assert!(regions.contains(&expected.to_string()), "missing {expected}");
    }
    assert!(!regions.contains(&"Kwale".to_string()));
    assert!(!regions.contains(&"Total".to_string()));
}

#[test]
fn test_county_pillars_and_schema_report() {
    let pipeline = county_pipeline();
    let source = pipeline.load_source(&fixture("county_survey.csv")).unwrap();
    let classification = &source.classification;

    assert_eq!(
        classification.pillars.labels(),
        vec![
            "1. Governance",
            "2. Human Resources for Health (HRH)",
            "6. HMIS/Digital Health",
            "10. Overall Score",
        ]
    );

    let governance = classification.pillars.get("1. Governance").unwrap();
    assert_eq!(
        governance.indicators(),
        &[
            "Proportion of PCNs Established".to_string(),
            "Governance Score".to_string(),
            "Governance Weighted Score".to_string(),
        ]
    );
    for table in classification.pillars.iter() {
        assert!(table.df().width() >= 2);
        assert!(table.df().width() <= 1 + source.table.indicator_columns().len());
        assert_eq!(table.height(), 46);
    }

    let report = &classification.report;
    assert_eq!(report.unclassified_columns, vec!["Data Collector Code".to_string()]);
    assert_eq!(report.omitted_pillars.len(), 6);
    assert!(report.shared_columns.is_empty());
    assert!(
        report
            .unmatched_keywords
            .iter()
            .any(|m| m.keyword == "Perfomance Review Score")
    );
}

#[test]
fn test_county_hrh_choropleth() {
    let pipeline = county_pipeline();
    let output = pipeline
        .run(&DashboardRequest {
            csv: fixture("county_survey.csv"),
            boundary: Some(fixture("ken_adm1.geojson")),
            pillar: Some("2. Human Resources for Health (HRH)".to_string()),
            indicator: Some("HRH Score".to_string()),
            ..DashboardRequest::default()
        })
        .unwrap();

    assert_eq!(output.ranking.len(), 46);
    assert_eq!(output.ranking[0].label, "Nairobi");
    assert_eq!(output.ranking[0].value, 56.0);
    assert_eq!(output.ranking.last().unwrap().label, "Mombasa");

    let reconciled = output.reconciled.unwrap();
    let rows: Vec<(&str, Option<f64>, bool)> = reconciled
        .rows()
        .iter()
        .map(|r| (r.region.as_str(), r.value, r.has_data))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("Nairobi", Some(56.0), true),
            ("Mombasa", Some(0.0), true),
            ("Kwale", Some(0.0), false),
            ("Kisumu", Some(51.0), true),
            ("Tharaka Nithi", Some(22.0), true),
        ]
    );

    let summary = reconciled.summary();
    assert_eq!(summary.boundary_regions, 5);
    assert_eq!(summary.matched_regions, 4);
    assert_eq!(summary.regions_without_data, vec!["Kwale".to_string()]);
    assert_eq!(summary.unmatched_table_regions.len(), 46 - 4);
}

#[test]
fn test_web_mercator_boundary_matches_wgs84() {
    let pipeline = county_pipeline();
    let wgs84 = pipeline.load_boundary(&fixture("ken_adm1.geojson")).unwrap();
    let mercator = pipeline.load_boundary(&fixture("ken_adm1_3857.geojson")).unwrap();

    assert_eq!(wgs84.names(), mercator.names());
    assert_eq!(mercator.summary().source_crs, "EPSG:3857");

    for (a, b) in wgs84.features().iter().zip(mercator.features()) {
        let ring_a = a.geometry["coordinates"][0].as_array().unwrap();
        let ring_b = b.geometry["coordinates"][0].as_array().unwrap();
        assert_eq!(ring_a.len(), ring_b.len());
        for (pa, pb) in ring_a.iter().zip(ring_b) {
            for axis in 0..2 {
                let delta = pa[axis].as_f64().unwrap() - pb[axis].as_f64().unwrap();
                assert!(delta.abs() < 1e-6, "{} drifted by {delta}", a.name);
            }
        }
    }
}

#[test]
fn test_pcn_drill_down_by_county() {
    let pipeline = pcn_pipeline();
    let output = pipeline
        .run(&DashboardRequest {
            csv: fixture("pcn_survey.csv"),
            boundary: Some(fixture("ken_adm2_kisumu.geojson")),
            pillar: Some("7. Human Resources for Health (HRH)".to_string()),
            indicator: Some("HRH Score".to_string()),
            region: Some("kisumu county".to_string()),
            sub_region: None,
        })
        .unwrap();

    assert_eq!(output.selection.as_ref().unwrap().region.as_deref(), Some("Kisumu"));

    let ranked: Vec<(&str, f64)> = output
        .ranking
        .iter()
        .map(|r| (r.label.as_str(), r.value))
        .collect();
    assert_eq!(
        ranked,
        vec![("Kisumu West", 90.0), ("Kisumu East", 70.0), ("Nyando", 65.0)]
    );

    let reconciled = output.reconciled.unwrap();
    let values: Vec<Option<f64>> = reconciled.rows().iter().map(|r| r.value).collect();
    assert_eq!(values, vec![Some(70.0), Some(90.0), Some(65.0), None]);
    assert_eq!(reconciled.summary().regions_without_data, vec!["Seme".to_string()]);

    let source = &output.source;
    assert_eq!(source.table.passthrough_columns(), &["Pillar".to_string(), "Indicator".to_string()]);
    let governance = source.classification.pillars.get("1. Governance").unwrap();
    assert_eq!(
        governance.sub_regions("Nairobi").unwrap(),
        vec!["Embakasi East".to_string(), "Westlands".to_string()]
    );
}

#[test]
fn test_pcn_sub_county_ranking_keeps_county_map() {
    let pipeline = pcn_pipeline();
    let request = DashboardRequest {
        csv: fixture("pcn_survey.csv"),
        boundary: Some(fixture("ken_adm2_kisumu.geojson")),
        pillar: Some("7. Human Resources for Health (HRH)".to_string()),
        indicator: Some("HRH Score".to_string()),
        region: Some("Kisumu".to_string()),
        sub_region: Some("kisumu west".to_string()),
    };
    let output = pipeline.run(&request).unwrap();

    let selection = output.selection.as_ref().unwrap();
    assert_eq!(selection.sub_region.as_deref(), Some("Kisumu West"));
    let ranked: Vec<(&str, f64)> = output
        .ranking
        .iter()
        .map(|r| (r.label.as_str(), r.value))
        .collect();
    assert_eq!(ranked, vec![("Kisumu West", 90.0)]);

    let reconciled = output.reconciled.unwrap();
    let values: Vec<Option<f64>> = reconciled.rows().iter().map(|r| r.value).collect();
    assert_eq!(values, vec![Some(70.0), Some(90.0), Some(65.0), None]);

    let all = pipeline
        .run(&DashboardRequest {
            sub_region: Some("All".to_string()),
            ..request
        })
        .unwrap();
    assert_eq!(all.ranking.len(), 3);
    assert_eq!(all.selection.unwrap().sub_region, None);
}

#[test]
fn test_boundary_layer_written_without_selection() {
    let tmp = tempdir().unwrap();
    let taxonomy = Taxonomy::new(vec![pcn_pipeline::Pillar::new(
        "Finance",
        ["SHA claims"],
    )])
    .unwrap();
    let pipeline = DashboardPipeline::builder()
        .taxonomy(taxonomy)
        .build()
        .unwrap();
    let output = pipeline
        .run(&DashboardRequest {
            csv: fixture("county_survey.csv"),
            boundary: Some(fixture("ken_adm1.geojson")),
            ..DashboardRequest::default()
        })
        .unwrap();
    assert!(output.selection.is_none());

    let written = ReportWriter::new(tmp.path())
        .write_artifacts(&output, "county_survey")
        .unwrap();
    assert_eq!(written.len(), 1);
    assert!(written[0].ends_with("county_survey_boundary.geojson"));

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&written[0]).unwrap()).unwrap();
    let features = parsed["features"].as_array().unwrap();
    assert_eq!(features.len(), 5);
    assert_eq!(features[0]["properties"]["County_Name_Key"], "Nairobi");
}

#[test]
fn test_custom_taxonomy_and_overrides() {
    let pipeline = DashboardPipeline::builder()
        .taxonomy(Taxonomy::from_path(&fixture("taxonomy.json")).unwrap())
        .name_overrides(NameOverrides::from_json_file(&fixture("name_overrides.json")).unwrap())
        .build()
        .unwrap();

    let source = pipeline.load_source(&fixture("county_survey.csv")).unwrap();
    let pillars = &source.classification.pillars;
    assert_eq!(pillars.labels(), vec!["Scores", "Weighted"]);
    assert_eq!(pillars.get("Weighted").unwrap().indicators().len(), 4);
    assert_eq!(source.classification.report.omitted_pillars, vec!["Finance".to_string()]);
    assert_eq!(pillars.get("Finance").unwrap_err().error_code(), "PILLAR_NOT_FOUND");
}

#[test]
fn test_missing_source_names_the_file() {
    let pipeline = county_pipeline();
    let err = pipeline
        .run(&DashboardRequest {
            csv: fixture("does_not_exist.csv"),
            ..DashboardRequest::default()
        })
        .unwrap_err();
    assert!(err.is_source_error());
    assert!(err.to_string().contains("does_not_exist.csv"));
}

#[test]
fn test_report_and_artifacts_are_written() {
    let tmp = tempdir().unwrap();
    let pipeline = county_pipeline();
    let output = pipeline
        .run(&DashboardRequest {
            csv: fixture("county_survey.csv"),
            boundary: Some(fixture("ken_adm1.geojson")),
            ..DashboardRequest::default()
        })
        .unwrap();

    let report = DashboardReport::from_output(&output, "county_survey.csv", Some("ken_adm1.geojson"));
    assert_eq!(report.pillars.len(), 4);
    assert_eq!(report.selection.as_ref().unwrap().pillar, "1. Governance");
    assert_eq!(
        report.selection.as_ref().unwrap().indicator,
        "Proportion of PCNs Established"
    );

    let writer = ReportWriter::new(tmp.path());
    let report_path = writer.write_report(&report, "county_survey").unwrap();
    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(report_path).unwrap()).unwrap();
    assert_eq!(parsed["level"], "County");
    assert_eq!(parsed["reconciliation"]["boundary_regions"], 5);

    let written = writer.write_artifacts(&output, "county_survey").unwrap();
    assert_eq!(written.len(), 4 + 2);
    assert!(written[4].ends_with("county_survey_proportion_of_pcns_established_reconciled.csv"));
    assert!(written[5].ends_with("county_survey_proportion_of_pcns_established.geojson"));

    let tables = &written[..4];
    assert!(tables[0].ends_with("county_survey_1_governance.csv"));
    let text = std::fs::read_to_string(&tables[1]).unwrap();
    assert_eq!(text.lines().next(), Some("County,HRH Score,HRH Weighted Score"));
    assert_eq!(text.lines().count(), 47);

    let boundary = output.boundary.as_ref().unwrap();
    let reconciled = output.reconciled.as_ref().unwrap();
    let layer = writer
        .write_choropleth(boundary, reconciled, DatasetLevel::County.geojson_key_property(), "county_survey")
        .unwrap();
    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(layer).unwrap()).unwrap();
    let features = parsed["features"].as_array().unwrap();
    assert_eq!(features.len(), 5);
    assert_eq!(features[2]["properties"]["County_Name_Key"], "Kwale");
    assert_eq!(features[2]["properties"]["has_data"], false);
}
