use anyhow::Context;
use clap::{Parser, Subcommand};
use iped_salesforce::app::ports::DeliveryPort;
use iped_salesforce::common::constants::{DEFAULT_CONFIG_PATH, DEFAULT_CSV_DELIMITER};
use iped_salesforce::config::{Config, TransformConfig};
use iped_salesforce::infra::http_client::ReqwestHttp;
use iped_salesforce::infra::salesforce_client::{DryRunDelivery, SalesforceDelivery};
use iped_salesforce::observability::logging::init_logging;
use iped_salesforce::pipeline::{transform_file, Integrator, RunReport, TransformReport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "iped_salesforce")]
#[command(about = "Sends IPED users, trails and courses to Salesforce data extensions")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Directory for the rolling JSON log
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull every user from IPED and send them to Salesforce
    Run {
        /// Log batches instead of sending them
        #[arg(long)]
        dry_run: bool,
    },
    /// Download the CSV export, clean it and send its rows to Salesforce
    Export {
        /// Log batches instead of sending them
        #[arg(long)]
        dry_run: bool,
    },
    /// Clean a local CSV export and write the result; no network access
    Transform {
        /// CSV file to read
        #[arg(long)]
        input: PathBuf,
        /// Where to write the cleaned CSV
        #[arg(long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    dotenv::dotenv().ok();
    let _log_guard = init_logging(&cli.log_dir);

    match cli.command {
        Commands::Run { dry_run } => {
            let mut integrator = build_integrator(&cli.config, dry_run)?;
            info!(run_id = %integrator.run_id(), dry_run, "Starting API run");
            let report = integrator.run().await.context("API run failed")?;
            print_report(&report);
        }
        Commands::Export { dry_run } => {
            let mut integrator = build_integrator(&cli.config, dry_run)?;
            info!(run_id = %integrator.run_id(), dry_run, "Starting export run");
            let (report, transform) = integrator.run_export().await.context("Export run failed")?;
            print_transform_report(&transform);
            print_report(&report);
        }
        Commands::Transform { input, output } => {
            let (transform, delimiter) = offline_transform_config(&cli.config)?;
            let report = transform_file(&input, &output, &transform, delimiter)
                .with_context(|| format!("Failed to transform {}", input.display()))?;
            print_transform_report(&report);
            println!("✅ Wrote {}", output.display());
        }
    }

    Ok(())
}

fn build_integrator(config_path: &Path, dry_run: bool) -> anyhow::Result<Integrator> {
    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let http = Arc::new(ReqwestHttp::new(
        config.http.timeout(),
        config.iped.requests_per_min,
    )?);
    let delivery: Arc<dyn DeliveryPort> = if dry_run {
        Arc::new(DryRunDelivery)
    } else {
        Arc::new(SalesforceDelivery::new(
            config.salesforce.clone(),
            config.http.timeout(),
        )?)
    };

    Ok(Integrator::new(config, http, delivery))
}

/// The transform command only needs the `[transform]` and `[export]`
/// sections, so a missing config file falls back to the defaults.
fn offline_transform_config(config_path: &Path) -> anyhow::Result<(TransformConfig, char)> {
    if !config_path.exists() {
        warn!(
            path = %config_path.display(),
            "Config file not found, using default transform settings"
        );
        return Ok((TransformConfig::default(), DEFAULT_CSV_DELIMITER));
    }

    let config = Config::load(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let delimiter = config
        .export
        .as_ref()
        .map(|e| e.delimiter)
        .unwrap_or(DEFAULT_CSV_DELIMITER);
    Ok((config.transform, delimiter))
}

fn print_report(report: &RunReport) {
    println!("Run {}", report.run_id);
    println!(
        "   {} records, {} sent in {} batches, {} skipped",
        report.records_total,
        report.records_sent,
        report.batches_sent,
        report.skipped.len()
    );
    for (id, error) in report.skipped.iter().zip(&report.errors) {
        println!("   ⚠️  {id}: {error}");
    }
}

fn print_transform_report(report: &TransformReport) {
    for (stage, elapsed) in &report.timings {
        println!("   {:<24} {:.3}s", stage.name(), elapsed.as_secs_f64());
    }
    for failure in &report.failures {
        println!("   ⚠️  {failure}");
    }
}
