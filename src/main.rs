//! Energy Finance CLI
//!
//! Runs the source pipeline against a scenario file and writes the results.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use std::path::{Path, PathBuf};

use energy_finance::audit::AuditConfig;
use energy_finance::export;
use energy_finance::pipeline::{lint, PipelineOutput};
use energy_finance::{CustomPercentiles, PipelineConfig, ScenarioRunner, SourceRegistry};

#[derive(Debug, Parser)]
#[command(
    name = "energy-finance",
    version,
    about = "Percentile source pipeline for power project financials"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the pipeline for a scenario and export the processed sources.
    Run(RunArgs),
    /// Check that every source runs after the sources it reads.
    Lint {
        /// Registry JSON file (defaults to the built-in registry).
        #[arg(long)]
        registry: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Json,
}

#[derive(Debug, clap::Args)]
struct RunArgs {
    /// Scenario configuration tree (JSON).
    #[arg(short, long)]
    scenario: PathBuf,

    /// Registry JSON file (defaults to the built-in registry).
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Percentiles to produce.
    #[arg(short, long, value_delimiter = ',', default_values_t = [10, 50, 90])]
    percentiles: Vec<u32>,

    /// Custom percentile for one source, as `sourceId=percentile`. Repeatable.
    #[arg(short, long = "custom", value_parser = parse_custom)]
    custom: Vec<(String, u32)>,

    /// Output file; only the summary is printed when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = Format::Csv)]
    format: Format,

    /// Also write the per-percentile summary metrics as CSV.
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Attach data samples to audit entries.
    #[arg(long)]
    sample_audit: bool,
}

fn parse_custom(raw: &str) -> Result<(String, u32)> {
    let Some((id, percentile)) = raw.split_once('=') else {
        bail!("expected `sourceId=percentile`, got `{}`", raw);
    };
    let percentile: u32 = percentile
        .trim()
        .parse()
        .with_context(|| format!("invalid percentile in `{}`", raw))?;
    if percentile == 0 || percentile > 100 {
        bail!("percentile must be between 1 and 100, got {}", percentile);
    }
    Ok((id.trim().to_string(), percentile))
}

fn load_registry(path: Option<&Path>) -> Result<SourceRegistry> {
    match path {
        Some(path) => SourceRegistry::from_json_path(path)
            .with_context(|| format!("loading registry {}", path.display())),
        None => Ok(SourceRegistry::standard()),
    }
}

fn print_summary(output: &PipelineOutput) {
    println!("Sources processed: {}", output.stats.processed);
    println!("Sources skipped:   {}", output.stats.errors);
    println!("Missing references: {}", output.stats.reference_errors);
    println!("Skipped multipliers: {}", output.stats.skipped_multipliers);
    println!("Elapsed: {} ms", output.stats.elapsed_ms);

    for failure in &output.stats.failures {
        println!("  ! {} [{}]: {}", failure.source_id, failure.stage, failure.message);
    }

    println!();
    println!("Discount rate: {:.2}%", output.summary.discount_rate * 100.0);
    println!(
        "{:>6} {:>16} {:>16} {:>16} {:>8} {:>8}",
        "Pctl", "Revenue", "Cost", "NPV", "IRR", "MinDSCR"
    );
    let fmt = |v: Option<f64>| v.map(|v| format!("{:.0}", v)).unwrap_or_else(|| "-".into());
    for s in &output.summary.percentiles {
        let label = if s.percentile == 0 {
            "custom".to_string()
        } else {
            format!("P{}", s.percentile)
        };
        println!(
            "{:>6} {:>16} {:>16} {:>16} {:>8} {:>8}",
            label,
            fmt(s.total_revenue),
            fmt(s.total_cost),
            fmt(s.npv),
            s.irr.map(|r| format!("{:.2}%", r * 100.0)).unwrap_or_else(|| "-".into()),
            s.min_dscr.map(|d| format!("{:.2}", d)).unwrap_or_else(|| "-".into()),
        );
    }
}

fn run(args: RunArgs) -> Result<()> {
    let registry = load_registry(args.registry.as_deref())?;
    let custom: CustomPercentiles = args.custom.into_iter().collect();

    let config = PipelineConfig {
        audit: AuditConfig {
            sample_data: args.sample_audit,
            ..AuditConfig::default()
        },
        ..PipelineConfig::default()
    }
    .with_percentiles(args.percentiles)
    .with_custom_percentiles(custom);

    let runner = ScenarioRunner::from_scenario_file(registry, &args.scenario)
        .with_context(|| format!("loading scenario {}", args.scenario.display()))?
        .with_config(config);
    let output = runner.run();

    print_summary(&output);

    if let Some(path) = args.output {
        match args.format {
            Format::Csv => {
                let rows = export::write_csv_file(&output.sources, &path)
                    .with_context(|| format!("writing {}", path.display()))?;
                info!("wrote {} rows to {}", rows, path.display());
            }
            Format::Json => export::write_json_file(&output, &path)
                .with_context(|| format!("writing {}", path.display()))?,
        }
        println!("\nOutput written to {}", path.display());
    }

    if let Some(path) = args.summary {
        export::write_summary_csv_file(&output.summary, &path)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Summary written to {}", path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    match Cli::parse().command {
        Command::Run(args) => run(args),
        Command::Lint { registry } => {
            let registry = load_registry(registry.as_deref())?;
            let violations = lint(&registry);
            if violations.is_empty() {
                println!("{} sources, no ordering violations", registry.sources.len());
                return Ok(());
            }
            for violation in &violations {
                println!("{}", violation);
            }
            bail!("{} ordering violations", violations.len())
        }
    }
}
