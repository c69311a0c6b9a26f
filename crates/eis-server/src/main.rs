//! EIS Server - battery impedance session ingestion
//!
//! Replays recorded datasets or generated sweeps through one session service
//! and writes accepted rows, rejected rows and summaries under the data root.

use anyhow::{bail, Context, Result};
use clap::Parser;
use eis_core::{Sample, SessionMetadata};
use eis_server::logging::{init_subscriber, Verbosity};
use eis_server::{
    replay_session, CsvDirectorySink, LoggingListener, ReplayReport, ServerConfig, SessionHandle,
    SessionService, SessionStateMachine,
};
use eis_simulation::{DatasetLoader, EisGenerator, InjectedAnomaly, SweepConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// EIS Server CLI
#[derive(Parser)]
#[command(name = "eis-server")]
#[command(about = "Battery EIS session ingestion and analysis", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, env = "EIS_CONFIG")]
    config: Option<PathBuf>,

    /// Output directory for session files (overrides the configuration)
    #[arg(long, env = "EIS_DATA_ROOT")]
    data_root: Option<PathBuf>,

    /// Replay every SoC file of a recorded dataset tree
    #[arg(long, conflicts_with = "simulate")]
    dataset: Option<PathBuf>,

    /// Generate and replay this many synthetic sessions
    #[arg(long)]
    simulate: Option<usize>,

    /// Seed for the synthetic generator
    #[arg(long)]
    seed: Option<u64>,

    /// Delay between pushed samples in milliseconds
    #[arg(long, default_value_t = 0)]
    pace_ms: u64,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Errors only
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_subscriber(Verbosity::from_flags(cli.verbose, cli.quiet));

    let mut config = ServerConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(root) = &cli.data_root {
        config.data_root = root.clone();
    }
    config.validate().context("validating configuration")?;

    info!(
        data_root = %config.data_root.display(),
        voltage_threshold = config.analytics.voltage_threshold,
        impedance_threshold = config.analytics.impedance_threshold,
        max_accepted = config.max_accepted_samples,
        "configuration loaded"
    );

    let sessions = match (&cli.dataset, cli.simulate) {
        (Some(dataset), _) => load_dataset(dataset)?,
        (None, Some(count)) => simulate(count, cli.seed)?,
        (None, None) => bail!("nothing to replay: pass --dataset <dir> or --simulate <n>"),
    };

    let mut machine = SessionStateMachine::with_config(
        Box::new(CsvDirectorySink::new(config.data_root.clone())),
        &config.analytics,
    )
    .with_max_accepted(config.max_accepted_samples);
    machine.add_listener(Box::new(LoggingListener));
    let handle = SessionService::spawn(machine, config.event_buffer);

    let pace = Some(Duration::from_millis(cli.pace_ms));
    let failures = run_sessions(&handle, sessions, pace).await;

    if failures > 0 {
        bail!("{} session(s) could not be completed", failures);
    }
    Ok(())
}

/// Replay every session in order; returns how many failed at session level
async fn run_sessions(
    handle: &SessionHandle,
    sessions: Vec<(SessionMetadata, Vec<Sample>)>,
    pace: Option<Duration>,
) -> usize {
    let mut failures = 0;

    for (metadata, samples) in sessions {
        let key = metadata.key();
        match replay_session(handle, metadata, &samples, pace).await {
            Ok(report) => print_report(&report),
            Err(error) => {
                failures += 1;
                warn!(session = %key, code = error.code(), "session failed: {}", error);
                println!("FAILED {} {}", key, error.code());
            }
        }
    }

    failures
}

fn print_report(report: &ReplayReport) {
    let summary = &report.summary;
    println!(
        "COMPLETED {} declared={} accepted={} rejected={} success={:.1}%",
        summary.key,
        summary.declared,
        summary.accepted,
        summary.rejected,
        summary.success_rate()
    );
    for rejection in &report.rejected {
        println!(
            "  row {}: {} ({})",
            rejection.row_index,
            rejection.error.code(),
            rejection.error
        );
    }
}

fn load_dataset(root: &std::path::Path) -> Result<Vec<(SessionMetadata, Vec<Sample>)>> {
    let scan = DatasetLoader::new(root)
        .load()
        .with_context(|| format!("scanning dataset {}", root.display()))?;

    info!(
        files = scan.files.len(),
        warnings = scan.warnings.len(),
        "dataset loaded"
    );

    Ok(scan
        .files
        .into_iter()
        .map(|file| (file.metadata, file.samples))
        .collect())
}

/// SoC levels in 5% steps, highest first
fn soc_ladder() -> impl Iterator<Item = i32> + Clone {
    (1..=20).rev().map(|step| step * 5)
}

fn simulate(count: usize, seed: Option<u64>) -> Result<Vec<(SessionMetadata, Vec<Sample>)>> {
    let config = SweepConfig {
        seed,
        ..SweepConfig::default()
    };
    let rows = config.rows as i64;
    let mut generator = EisGenerator::new(config).context("creating sweep generator")?;
    let presets = InjectedAnomaly::presets(rows);

    let mut sessions = Vec::with_capacity(count);
    for (index, soc) in soc_ladder().cycle().take(count).enumerate() {
        let test_id = if (index / 20) % 2 == 0 { "Test_1" } else { "Test_2" };

        // Every other session carries one injected fault
        let anomalies: Vec<InjectedAnomaly> = if index % 2 == 1 {
            let (name, anomaly) = &presets[(index / 2) % presets.len()];
            info!(soc, test = test_id, anomaly = *name, "injecting anomaly");
            vec![*anomaly]
        } else {
            Vec::new()
        };

        let session = generator.generate_session("B01", test_id, soc, &anomalies);
        sessions.push((session.metadata, session.samples));
    }

    Ok(sessions)
}
