use anyhow::{anyhow, Context};
use clap::{Parser, ValueEnum};
use std::{process::ExitCode, time::Duration};
use tracing_subscriber::EnvFilter;

use loadgate::{JsonReporter, Orchestrator, Preset, PresetKind, Reporter, Settings, TextReporter};

/// Staged synthetic load against an API gateway, gated on thresholds.
///
/// Exit status: 0 when every threshold passed, 1 when any failed, 2 on a
/// configuration or setup error.
#[derive(Parser, Debug)]
#[command(name = "loadgate")]
#[command(version)]
struct Cli {
    /// Which run to perform
    preset: PresetKind,

    /// Base seed for think times, probabilistic steps and random ids
    #[arg(long)]
    seed: Option<u64>,

    /// Compress the preset's stages to this many seconds
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,

    /// Summary format written to stdout
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so `--format json` keeps stdout machine-readable.
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::from(2)
        }
    }
}

/// Returns whether every threshold passed.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut settings = Settings::from_env().context("invalid configuration")?;
    settings.seed = cli.seed.or(settings.seed);
    settings.log_defaults();

    let mut preset = Preset::new(cli.preset).context("invalid preset thresholds")?;
    if let Some(secs) = cli.duration {
        if secs == 0 {
            return Err(anyhow!("--duration must be positive"));
        }
        preset = preset.with_duration(Duration::from_secs(secs));
    }

    tracing::info!(
        preset = %cli.preset,
        gateway = %settings.api_gateway_url,
        users = preset.profile.max_users(),
        duration = ?preset.profile.total_duration(),
        seed = ?settings.seed,
        "loadgate starting"
    );

    let mut orchestrator = Orchestrator::from_settings(&settings)?;
    orchestrator.setup().await;

    let stop = orchestrator.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping run");
            stop.stop();
        }
    });

    let Preset {
        profile,
        scenario,
        thresholds,
        advisories,
        ..
    } = preset;
    let outcome = orchestrator.run(&profile, scenario).await;
    let report = orchestrator.report(&outcome, &thresholds, &advisories);

    match cli.format {
        Format::Text => TextReporter.report(&report).await,
        Format::Json => JsonReporter.report(&report).await,
    }
    .map_err(|e| anyhow!("failed to write report: {e}"))?;

    Ok(report.passed())
}
