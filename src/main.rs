use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cradle_guard::config::GuardConfig;
use cradle_guard::growth::{
    from_metric, percentile_for, GrowthMetric, GrowthPoint, Sex, TrendEstimator, UnitSystem,
};
use cradle_guard::UsageGuard;

#[derive(Parser, Debug)]
#[command(name = "cradle-guard", version, about = "Usage diagnostics and growth tools")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Directory holding persisted usage state
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the usage report
    Report,
    /// Print the persisted call history as JSON
    Export,
    /// Delete the persisted call history
    Clear,
    /// Place a measurement against the WHO reference tables
    Percentile {
        #[arg(long)]
        sex: Sex,
        #[arg(long)]
        metric: GrowthMetric,
        #[arg(long)]
        age_months: f64,
        #[arg(long)]
        value: f64,
        /// Value is in lb or inches
        #[arg(long)]
        imperial: bool,
    },
    /// Project a measurement series forward
    Project {
        #[arg(long)]
        metric: GrowthMetric,
        /// Measurement as DATE=VALUE, e.g. 2024-03-01=6.2
        #[arg(long = "point", value_parser = parse_point, required = true)]
        points: Vec<GrowthPoint>,
        #[arg(long)]
        imperial: bool,
    },
}

fn parse_point(raw: &str) -> Result<GrowthPoint, String> {
    let (date, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected DATE=VALUE, got {:?}", raw))?;
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|e| e.to_string())?;
    let value = value.trim().parse::<f64>().map_err(|e| e.to_string())?;
    Ok(GrowthPoint::new(date, value))
}

fn units(imperial: bool) -> UnitSystem {
    if imperial {
        UnitSystem::Imperial
    } else {
        UnitSystem::Metric
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let mut config = GuardConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }
    info!(data_dir = %config.storage.data_dir.display(), "Configuration loaded");

    match cli.command {
        Command::Report => {
            let guard = UsageGuard::from_config(config).await;
            print!("{}", guard.get_formatted_report());
        }
        Command::Export => {
            let guard = UsageGuard::from_config(config).await;
            println!("{}", guard.recorder().export_as_json()?);
        }
        Command::Clear => {
            let guard = UsageGuard::from_config(config).await;
            guard.recorder().clear_all_records().await;
        }
        Command::Percentile {
            sex,
            metric,
            age_months,
            value,
            imperial,
        } => {
            let units = units(imperial);
            let result = percentile_for(sex, metric, age_months, value, units)?;
            println!(
                "{} {:.2} {} at {:.1} months: {} (~{:.0}th), reference median {:.2} {} at {} months",
                metric,
                value,
                metric.unit(units),
                age_months,
                result.band,
                result.approximate_percentile,
                from_metric(metric, result.median, units),
                metric.unit(units),
                result.age_bracket_months,
            );
        }
        Command::Project {
            metric,
            points,
            imperial,
        } => {
            let unit = metric.unit(units(imperial));
            let projection = TrendEstimator::default().project(&points)?;
            println!(
                "{} trend: {:+.3} {}/day",
                metric, projection.line.slope_per_day, unit
            );
            for point in &projection.points {
                println!(
                    "  {}: {:.2} {} ({:.2}-{:.2})",
                    point.date, point.value, unit, point.lower, point.upper
                );
            }
        }
    }

    Ok(())
}
