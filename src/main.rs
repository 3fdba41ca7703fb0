// main.rs
// Command line runner: one pipeline pass per configured year

use anyhow::{Context, Result};
use clap::Parser;
use community_boundaries::config::AppConfig;
use community_boundaries::pipeline::ingest::JsonFeatureSource;
use community_boundaries::pipeline::{Pipeline, PipelineOutcome};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "community-boundaries")]
#[command(about = "Detect data-driven neighborhood communities and weak boundaries")]
struct Cli {
    /// TOML configuration file; defaults are used when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Analysis years, overriding the config
    #[arg(short, long, value_delimiter = ',')]
    years: Option<Vec<u16>>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let level = cli.log_level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AppConfig::default(),
    };
    if let Some(years) = cli.years {
        config.years = years;
    }
    config.validate()?;

    info!("Census community boundary detection");
    info!("Years: {:?}", config.years);

    let source = JsonFeatureSource::new(&config.data_dir, config.features.clone());
    let pipeline = Pipeline::new(source, config.detection.clone())?;

    let output_dir = Path::new(&config.output_dir);
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    let mut failed = 0;
    for report in pipeline.run_all(&config.years) {
        match report.outcome {
            Ok(PipelineOutcome::Completed(result)) => {
                let path = output_dir.join(format!("results_{}.json", report.year));
                result.save_to_file(&path)?;
                info!(
                    "[{}] {} regions | {} communities (A) | {} communities (B) | {} weak boundaries -> {}",
                    report.year,
                    result.regions.len(),
                    result.community_count_a(),
                    result.community_count_b(),
                    result.weak_boundaries.len(),
                    path.display()
                );
                for warning in &result.warnings {
                    warn!("[{}] {:?}", report.year, warning);
                }
            }
            Ok(PipelineOutcome::Skipped { year, reason }) => {
                warn!("[{}] skipped: {}", year, reason);
            }
            Err(e) => {
                error!("[{}] failed: {}", report.year, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} years failed", failed, config.years.len());
    }
    info!("Done");
    Ok(())
}
