use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;

use flight_logger_rs::airport::AirportIndex;
use flight_logger_rs::config::LoggerConfig;
use flight_logger_rs::monitor::FlightMonitor;
use flight_logger_rs::notifier::LogNotifier;
use flight_logger_rs::prompt::DeclinePrompt;
use flight_logger_rs::report::FlightIdentity;
use flight_logger_rs::runner::{RunStats, Runner};
use flight_logger_rs::storage::MemoryStore;
use flight_logger_rs::telemetry::{load_recording, ReplaySource};

#[derive(Parser, Debug)]
struct Args {
    /// Path to a telemetry recording (.json / .jsonl, optionally .gz)
    #[arg(long, conflicts_with = "dir")]
    log: Option<PathBuf>,

    /// Directory of recordings to batch replay
    #[arg(long)]
    dir: Option<PathBuf>,

    /// airports.json (optionally .gz)
    #[arg(long)]
    airports: Option<PathBuf>,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "Unknown")]
    callsign: String,

    #[arg(long, default_value = "Unknown")]
    aircraft: String,

    #[arg(long, default_value = "GFS")]
    airline_icao: String,
}

fn is_recording(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.ends_with(".json")
        || name.ends_with(".jsonl")
        || name.ends_with(".json.gz")
        || name.ends_with(".jsonl.gz")
}

#[derive(Default)]
struct ReplayTotals {
    files: usize,
    flights: usize,
    failures: usize,
}

async fn replay_one(
    path: &Path,
    config: &LoggerConfig,
    airports: &Arc<AirportIndex>,
    identity: &FlightIdentity,
) -> Result<RunStats> {
    let samples = load_recording(path).with_context(|| format!("loading {}", path.display()))?;
    println!("\n=== {} ({} samples) ===", path.display(), samples.len());

    let monitor = FlightMonitor::new(
        config.clone(),
        airports.clone(),
        Box::new(DeclinePrompt),
        identity.clone(),
    );
    // samples are pushed through `feed`, so the runner's own source stays empty
    let mut runner = Runner::new(monitor, ReplaySource::new(Vec::new()), MemoryStore::new(), LogNotifier);

    let mut last_report_time = None;
    for sample in &samples {
        runner.feed(sample).await;
        if runner.is_stopped() {
            let report = runner.monitor().last_report();
            let landed_at = report.map(|r| r.landing_time);
            if landed_at.is_some() && landed_at != last_report_time {
                if let Some(report) = report {
                    println!("  {}", report.summary());
                }
                last_report_time = landed_at;
            } else {
                println!("  flight voided at t={:.1}", sample.timestamp);
            }
            // keep going: a recording may hold several flights
            runner.rearm();
        }
    }

    println!("  final phase: {}", runner.monitor().phase());
    if let Some(raw) = runner.store().raw() {
        println!("  unfinished flight left in store ({} bytes)", raw.len());
    }
    Ok(runner.stats())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => LoggerConfig::from_path(path)?,
        None => LoggerConfig::default(),
    };
    let airports = match &args.airports {
        Some(path) => AirportIndex::from_path(path)?.with_radius_km(config.airport_radius_km),
        None => AirportIndex::empty(),
    };
    let airports = Arc::new(airports);
    let identity = FlightIdentity {
        callsign: args.callsign.clone(),
        aircraft: args.aircraft.clone(),
        airline_icao: args.airline_icao.to_uppercase(),
        ..FlightIdentity::default()
    };

    let paths: Vec<PathBuf> = match (&args.log, &args.dir) {
        (Some(log), _) => vec![log.clone()],
        (None, Some(dir)) => {
            let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| is_recording(p))
                .collect();
            paths.sort();
            paths
        }
        (None, None) => bail!("pass --log <file> or --dir <directory>"),
    };

    let mut totals = ReplayTotals::default();
    for path in &paths {
        match replay_one(path, &config, &airports, &identity).await {
            Ok(stats) => {
                totals.files += 1;
                totals.flights += stats.reports_sent as usize;
                totals.failures += stats.delivery_failures as usize;
                println!(
                    "  ticks: {} coarse / {} fast, {} reports",
                    stats.coarse_ticks, stats.fast_ticks, stats.reports_sent
                );
            }
            Err(e) => eprintln!("  skipped {}: {:#}", path.display(), e),
        }
    }

    println!(
        "\nReplayed {} file(s), {} report(s) filed, {} failed deliveries",
        totals.files, totals.flights, totals.failures
    );
    Ok(())
}
