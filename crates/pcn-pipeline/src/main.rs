//! CLI entry point for the PCN dashboard reconciliation pipeline.

use anyhow::{Result, anyhow};
use clap::{Parser, ValueEnum};
use dotenv::dotenv;
use pcn_pipeline::{
    DashboardOutput, DashboardPipeline, DashboardReport, DashboardRequest, DatasetLevel,
    DuplicateNamePolicy, DuplicateRowPolicy, JoinOptions, LoaderConfig, MissingValuePolicy,
    NameOverrides, ReportWriter, Taxonomy,
};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// CLI-compatible dataset level enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLevel {
    /// One row per county, joined to ADM1 boundaries
    County,
    /// One row per primary care network, joined to ADM2 boundaries
    Pcn,
}

impl From<CliLevel> for DatasetLevel {
    fn from(cli: CliLevel) -> Self {
        match cli {
            CliLevel::County => DatasetLevel::County,
            CliLevel::Pcn => DatasetLevel::Pcn,
        }
    }
}

/// CLI-compatible missing-value policy enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMissing {
    /// Boundary regions without survey rows get 0
    FillZero,
    /// Boundary regions without survey rows stay empty
    NoData,
}

impl From<CliMissing> for MissingValuePolicy {
    fn from(cli: CliMissing) -> Self {
        match cli {
            CliMissing::FillZero => MissingValuePolicy::FillZero,
            CliMissing::NoData => MissingValuePolicy::NoData,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "PCN establishment dashboard reconciliation pipeline",
    long_about = "Normalizes survey exports, groups indicators into pillars and joins them onto \
                  administrative boundaries.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  PCN_COUNTY_CSV        Default county-level survey export\n  \
                  PCN_BOUNDARY          Default boundary GeoJSON\n  \
                  RUST_LOG              Overrides --log-level\n\n\
                  EXAMPLES:\n  \
                  # County section with a choropleth layer\n  \
                  pcn-pipeline --csv county.csv --boundary ken_adm1.geojson\n\n  \
                  # PCN section drilled down to one county\n  \
                  pcn-pipeline --level pcn --csv pcn.csv --boundary ken_adm2.geojson --region Kisumu\n\n  \
                  # Rank one sub-county while the map keeps the whole county\n  \
                  pcn-pipeline --level pcn --csv pcn.csv --region Kisumu --sub-region \"Kisumu West\"\n\n  \
                  # Preview pillars without writing anything\n  \
                  pcn-pipeline --csv county.csv --dry-run"
)]
struct Args {
    /// Path to the survey CSV export
    #[arg(short, long, env = "PCN_COUNTY_CSV")]
    csv: PathBuf,

    /// Dataset level of the export
    #[arg(long, value_enum, default_value = "county")]
    level: CliLevel,

    /// Boundary layer (GeoJSON) to join the selected indicator onto
    #[arg(short, long, env = "PCN_BOUNDARY")]
    boundary: Option<PathBuf>,

    /// Boundary attribute holding region names
    ///
    /// Defaults to ADM1_EN (county) or ADM2_EN (pcn). Use "auto" to pick
    /// the first attribute that looks like a name.
    #[arg(long)]
    name_attribute: Option<String>,

    /// Pillar taxonomy JSON replacing the built-in preset
    #[arg(long)]
    taxonomy: Option<PathBuf>,

    /// Region-name override map JSON (raw name -> canonical name)
    #[arg(long)]
    name_overrides: Option<PathBuf>,

    /// Loader configuration JSON replacing the level preset
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pillar to select (defaults to the first pillar)
    #[arg(short, long)]
    pillar: Option<String>,

    /// Indicator to select (defaults to the first indicator of the pillar)
    #[arg(short, long)]
    indicator: Option<String>,

    /// Restrict ranking and join to one region
    #[arg(long)]
    region: Option<String>,

    /// Restrict the ranking to one sub-region ("All" for every sub-region)
    ///
    /// The join still covers the whole region.
    #[arg(long)]
    sub_region: Option<String>,

    /// Value for boundary regions without survey rows
    ///
    /// Defaults to fill-zero (county) or no-data (pcn).
    #[arg(long, value_enum)]
    missing: Option<CliMissing>,

    /// Average repeated survey keys instead of keeping the first row
    #[arg(long)]
    mean_duplicates: bool,

    /// Merge boundary features sharing a canonical name instead of failing
    #[arg(long)]
    merge_duplicates: bool,

    /// Output directory for tables and layers
    #[arg(short, long, default_value = "./outputs")]
    output: PathBuf,

    /// Preview pillars and schema mismatches without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Output JSON to stdout instead of human-readable summary
    ///
    /// Disables all progress logs; only outputs the final JSON report.
    #[arg(long)]
    json: bool,

    /// Write a detailed JSON report to the output directory
    ///
    /// The report will be saved as <input_name>_report.json
    #[arg(short = 'r', long)]
    emit_report: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long)]
    quiet: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is disabled so stdout carries only JSON.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    // .env first so env-backed arguments can come from it
    dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level, args.quiet, args.json);

    if !args.csv.exists() {
        return Err(anyhow!("Input file not found: {}", args.csv.display()));
    }

    let pipeline = build_pipeline(&args)?;

    if args.dry_run {
        return run_dry_run(&args, &pipeline);
    }

    let request = DashboardRequest {
        csv: args.csv.clone(),
        boundary: args.boundary.clone(),
        pillar: args.pillar.clone(),
        indicator: args.indicator.clone(),
        region: args.region.clone(),
        sub_region: args.sub_region.clone(),
    };

    let output = pipeline.run(&request).map_err(|e| {
        error!("Pipeline failed: {}", e);
        anyhow!("Pipeline failed: {}", e)
    })?;

    handle_output(&output, &args)
}

fn build_pipeline(args: &Args) -> Result<DashboardPipeline> {
    let level: DatasetLevel = args.level.into();
    let join = JoinOptions {
        key: level.join_key(),
        missing: args
            .missing
            .map(MissingValuePolicy::from)
            .unwrap_or_else(|| level.missing_policy()),
        duplicates: if args.mean_duplicates {
            DuplicateRowPolicy::Mean
        } else {
            DuplicateRowPolicy::First
        },
    };

    let mut builder = DashboardPipeline::builder().level(level).join_options(join);

    if args.merge_duplicates {
        builder = builder.duplicate_names(DuplicateNamePolicy::Merge);
    }

    match args.name_attribute.as_deref() {
        Some("auto") => builder = builder.detect_name_attribute(),
        Some(attribute) => builder = builder.name_attribute(attribute),
        None => {}
    }

    if let Some(ref path) = args.config {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config {}: {}", path.display(), e))?;
        let config: LoaderConfig = serde_json::from_str(&text)?;
        builder = builder.loader_config(config);
    }

    if let Some(ref path) = args.taxonomy {
        builder = builder.taxonomy(Taxonomy::from_path(path)?);
    }

    if let Some(ref path) = args.name_overrides {
        builder = builder.name_overrides(NameOverrides::from_json_file(path)?);
    }

    Ok(builder.build()?)
}

/// Load and classify only; prints what a full run would produce.
///
/// Uses `println!` intentionally: this output is the purpose of --dry-run.
fn run_dry_run(args: &Args, pipeline: &DashboardPipeline) -> Result<()> {
    let source = pipeline.load_source(&args.csv)?;

    println!("\n{}", "=".repeat(80));
    println!("DRY RUN - Preview of dashboard tables");
    println!("{}\n", "=".repeat(80));

    println!("SOURCE");
    println!("{}", "-".repeat(40));
    println!("  File: {}", args.csv.display());
    println!("  Level: {:?}", pipeline.level());
    println!("  Rows loaded: {}", source.stats.rows_loaded);
    println!("  Indicator columns: {}", source.stats.indicator_columns);
    println!();

    println!("PILLARS");
    println!("{}", "-".repeat(40));
    if source.classification.pillars.is_empty() {
        println!("  No pillar matched any column");
    }
    for table in source.classification.pillars.iter() {
        println!("  {:<32} {} indicators", truncate_str(table.label(), 31), table.indicators().len());
    }
    println!();

    print_classification_issues(&source.classification.report);

    println!("OUTPUT FILES (will be created)");
    println!("{}", "-".repeat(40));
    let stem = extract_file_stem(&args.csv);
    println!("  - {}/{}_<pillar>.csv", args.output.display(), stem);
    if args.boundary.is_some() {
        println!("  - {}/{}_<indicator>_reconciled.csv", args.output.display(), stem);
        println!("  - {}/{}_<indicator>.geojson", args.output.display(), stem);
    }
    if args.emit_report {
        println!("  - {}/{}_report.json", args.output.display(), stem);
    }
    println!();

    println!("{}", "=".repeat(80));
    println!("To write these files, run without --dry-run");
    println!("{}", "=".repeat(80));

    Ok(())
}

/// Handle pipeline output based on CLI flags.
///
/// - Default: write tables and layers, print a human-readable summary
/// - `--json`: print the report as JSON to stdout only
/// - `--emit-report`: also write the JSON report to the output directory
fn handle_output(output: &DashboardOutput, args: &Args) -> Result<()> {
    let input = args.csv.display().to_string();
    let boundary = args.boundary.as_ref().map(|p| p.display().to_string());
    let report = DashboardReport::from_output(output, &input, boundary.as_deref());

    let stem = extract_file_stem(&args.csv);
    let writer = ReportWriter::new(&args.output);
    let written = writer.write_artifacts(output, &stem)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if args.emit_report {
        let path = writer.write_report(&report, &stem)?;
        info!("Report written to: {}", path.display());
    }

    print_human_readable_summary(&report, &written);
    Ok(())
}

fn print_classification_issues(report: &pcn_pipeline::ClassificationReport) {
    if report.is_clean() {
        return;
    }

    println!("SCHEMA MISMATCHES");
    println!("{}", "-".repeat(40));
    for missing in &report.unmatched_keywords {
        println!("  - [{}] keyword '{}' matched no column", missing.pillar, missing.keyword);
    }
    for pillar in &report.omitted_pillars {
        println!("  - pillar '{}' omitted (no indicator matched)", pillar);
    }
    for shared in &report.shared_columns {
        println!("  - column '{}' claimed by {}", shared.column, shared.pillars.join(", "));
    }
    if !report.unclassified_columns.is_empty() {
        println!("  - {} columns in no pillar", report.unclassified_columns.len());
    }
    println!();
}

/// Print a human-readable summary of the run.
fn print_human_readable_summary(report: &DashboardReport, written: &[PathBuf]) {
    println!("\n{}", "=".repeat(80));
    println!("DASHBOARD TABLES READY");
    println!("{}", "=".repeat(80));

    println!("\nSOURCE");
    println!("  File: {}", report.input_file);
    println!("  Level: {:?}", report.level);
    println!(
        "  Rows: {} loaded ({} filtered, {} dropped as empty)",
        report.load.rows_loaded, report.load.rows_filtered, report.load.coercion.rows_dropped
    );
    println!(
        "  Cells: {} sentinels replaced, {} unparseable, {} filled",
        report.load.coercion.sentinels_replaced,
        report.load.coercion.unparseable_cells,
        report.load.coercion.cells_filled
    );

    println!("\nPILLARS ({})", report.pillars.len());
    for pillar in &report.pillars {
        println!("  {:<32} {} indicators", truncate_str(&pillar.label, 31), pillar.indicators.len());
    }
    if !report.classification.is_clean() {
        println!();
        print_classification_issues(&report.classification);
    }

    if let Some(ref selection) = report.selection {
        println!("\nSELECTION");
        println!("  Pillar: {}", selection.pillar);
        println!("  Indicator: {}", selection.indicator);
        if let Some(ref region) = selection.region {
            println!("  Region: {}", region);
        }
        if let Some(ref sub_region) = selection.sub_region {
            println!("  Sub-region: {}", sub_region);
        }
        for (rank, entry) in report.ranking.iter().take(10).enumerate() {
            println!("  {:>3}. {:<28} {:>10.2}", rank + 1, truncate_str(&entry.label, 27), entry.value);
        }
        if report.ranking.len() > 10 {
            println!("       ... and {} more", report.ranking.len() - 10);
        }
    }

    if let Some(ref summary) = report.reconciliation {
        println!("\nBOUNDARY JOIN");
        println!(
            "  Regions with data: {}/{}",
            summary.matched_regions, summary.boundary_regions
        );
        if !summary.regions_without_data.is_empty() {
            println!("  No data: {}", summary.regions_without_data.join(", "));
        }
        if !summary.unmatched_table_regions.is_empty() {
            println!("  Unmatched survey regions: {}", summary.unmatched_table_regions.join(", "));
        }
    }

    if !written.is_empty() {
        println!("\nOUTPUT FILES");
        for path in written {
            println!("  - {}", path.display());
        }
    }

    println!("\n{}", "=".repeat(80));
    println!("Use --json for machine-readable output");
    println!("{}", "=".repeat(80));
}

/// Extract the file stem (name without extension) from a path.
fn extract_file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string()
}

/// Truncate a string to max length with ellipsis
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
