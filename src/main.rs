use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio::io::BufReader;

use flight_logger_rs::airline::{Airline, AirlineRegistry};
use flight_logger_rs::airport::AirportIndex;
use flight_logger_rs::config::LoggerConfig;
use flight_logger_rs::monitor::FlightMonitor;
use flight_logger_rs::notifier::{LogNotifier, Notifier, WebhookNotifier};
use flight_logger_rs::prompt::{DeclinePrompt, StdinPrompt, UserPrompt};
use flight_logger_rs::report::{format_duration, format_utc, FlightIdentity};
use flight_logger_rs::runner::Runner;
use flight_logger_rs::storage::{JsonFileStore, SessionStore};
use flight_logger_rs::telemetry::{bridge_lines, WatchSource};

#[derive(Parser, Debug)]
#[command(name = "flight_logger", about = "Flight logger for simulator telemetry")]
struct Args {
    /// JSON config file (missing keys use defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Where the in-progress flight is kept for resume
    #[arg(long, global = true, default_value = "flight_logger_session.json")]
    session_file: PathBuf,

    /// Airline registry file
    #[arg(long, global = true, default_value = "flight_logger_airlines.json")]
    airlines_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monitor live telemetry and file reports
    Run(RunArgs),
    /// Show the stored in-progress flight, if any
    ResumeStatus,
    /// Manage airlines and their webhooks
    Airline {
        #[command(subcommand)]
        action: AirlineAction,
    },
}

#[derive(ClapArgs, Debug)]
struct RunArgs {
    /// airports.json (optionally .gz)
    #[arg(long)]
    airports: Option<PathBuf>,

    /// Airline to fly for (remembered for next time)
    #[arg(long)]
    airline: Option<String>,

    #[arg(long, default_value = "Unknown")]
    callsign: String,

    /// Pilot name shown on reports
    #[arg(long, default_value = "Unknown")]
    pilot: String,

    #[arg(long, default_value = "Unknown")]
    aircraft: String,

    /// JSON-lines telemetry: a path (FIFO or pipe) or "-" for stdin
    #[arg(long, default_value = "-")]
    telemetry: String,

    /// Never ask for ICAO codes; unresolved airports become UNKNOWN
    #[arg(long)]
    no_prompt: bool,

    /// Log reports instead of posting them
    #[arg(long)]
    dry_run: bool,

    /// Keep monitoring for the next flight after one completes
    #[arg(long)]
    repeat: bool,
}

#[derive(Subcommand, Debug)]
enum AirlineAction {
    List,
    Add {
        name: String,
        #[arg(long)]
        icao: String,
        #[arg(long)]
        iata: String,
        #[arg(long)]
        webhook: String,
    },
    /// Change an airline; omitted fields keep their current value
    Edit {
        name: String,
        #[arg(long)]
        rename: Option<String>,
        #[arg(long)]
        icao: Option<String>,
        #[arg(long)]
        iata: Option<String>,
        #[arg(long)]
        webhook: Option<String>,
    },
    Remove {
        name: String,
    },
    /// Make an airline the default for `run`
    Select {
        name: String,
    },
}

fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => LoggerConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => LoggerConfig::default(),
    };

    match args.command {
        Command::Run(run) => run_monitor(config, args.session_file, args.airlines_file, run).await,
        Command::ResumeStatus => {
            resume_status(&args.session_file);
            Ok(())
        }
        Command::Airline { action } => manage_airlines(&args.airlines_file, action),
    }
}

async fn run_monitor(
    config: LoggerConfig,
    session_file: PathBuf,
    airlines_file: PathBuf,
    run: RunArgs,
) -> Result<()> {
    let airports = match &run.airports {
        Some(path) => AirportIndex::from_path(path)
            .with_context(|| format!("loading airports {}", path.display()))?
            .with_radius_km(config.airport_radius_km),
        None => {
            log::warn!("No airport database given; every airport will need manual entry");
            AirportIndex::empty()
        }
    };

    let mut registry = AirlineRegistry::load(&airlines_file)?;
    let (airline_name, airline) = match &run.airline {
        Some(name) => {
            let airline = registry.select(name)?.clone();
            registry.save(&airlines_file)?;
            (name.clone(), airline)
        }
        None => registry
            .current()
            .map(|(name, airline)| (name.to_string(), airline.clone()))
            .context("airline registry is empty")?,
    };

    let identity = FlightIdentity {
        callsign: run.callsign.clone(),
        pilot_name: run.pilot.clone(),
        aircraft: run.aircraft.clone(),
        airline_icao: airline.icao.clone(),
    };
    log::info!(
        "Flying {} for {} ({}/{})",
        identity.flight_number(),
        airline_name,
        airline.icao,
        airline.iata
    );

    // stdin cannot carry both telemetry and prompt answers
    let prompt: Box<dyn UserPrompt + Send> = if run.no_prompt || run.telemetry == "-" {
        Box::new(DeclinePrompt)
    } else {
        Box::new(StdinPrompt)
    };

    let (tx, source) = WatchSource::channel();
    let input = run.telemetry.clone();
    tokio::spawn(async move {
        let count = if input == "-" {
            bridge_lines(BufReader::new(tokio::io::stdin()), tx).await
        } else {
            match tokio::fs::File::open(&input).await {
                Ok(file) => bridge_lines(BufReader::new(file), tx).await,
                Err(e) => {
                    log::error!("Cannot open telemetry input {}: {}", input, e);
                    0
                }
            }
        };
        log::info!("Telemetry bridge finished ({} samples)", count);
    });

    let monitor = FlightMonitor::new(config, Arc::new(airports), prompt, identity);
    let store = JsonFileStore::new(session_file);

    if run.dry_run || !airline.has_webhook() {
        if !run.dry_run {
            log::warn!("Airline {} has no webhook configured; reports will only be logged", airline_name);
        }
        drive(Runner::new(monitor, source, store, LogNotifier), run.repeat).await;
    } else {
        let notifier = WebhookNotifier::new(&airline.webhook)?;
        drive(Runner::new(monitor, source, store, notifier), run.repeat).await;
    }
    Ok(())
}

async fn drive<N: Notifier>(mut runner: Runner<WatchSource, JsonFileStore, N>, repeat: bool) {
    if runner.resume_stored(now_secs()).await {
        log::info!("Resumed stored flight");
    }

    loop {
        let stats = runner.run().await;
        log::info!(
            "Monitor stopped: {} coarse ticks, {} fast ticks, {} idle, {} reports sent, {} delivery failures",
            stats.coarse_ticks,
            stats.fast_ticks,
            stats.idle_ticks,
            stats.reports_sent,
            stats.delivery_failures
        );
        if repeat && runner.is_stopped() {
            log::info!("Waiting for the next departure");
            runner.rearm();
            continue;
        }
        break;
    }
}

fn resume_status(session_file: &Path) {
    let store = JsonFileStore::new(session_file);
    match store.load() {
        Some(snapshot) if snapshot.flight_started => {
            println!("Resumable flight from {}", snapshot.departure_icao);
            println!("  Callsign: {}", snapshot.callsign);
            println!("  Aircraft: {}", snapshot.aircraft);
            println!("  Takeoff: {}", format_utc(snapshot.start_time));
            println!("  Elapsed: {}", format_duration(now_secs() - snapshot.start_time));
            println!("  Path points: {}", snapshot.path.len());
            println!("  Teleport warnings: {}", snapshot.teleport_warnings);
        }
        _ => println!("No resumable session in {}", store.path().display()),
    }
}

fn manage_airlines(path: &Path, action: AirlineAction) -> Result<()> {
    let mut registry = AirlineRegistry::load(path)?;

    match action {
        AirlineAction::List => {
            let current = registry.current().map(|(name, _)| name.to_string());
            for (name, airline) in registry.list() {
                let marker = if current.as_deref() == Some(name) { "*" } else { " " };
                let hook = if airline.has_webhook() { "webhook set" } else { "no webhook" };
                println!("{} {} ({}/{}) {}", marker, name, airline.icao, airline.iata, hook);
            }
            return Ok(());
        }
        AirlineAction::Add {
            name,
            icao,
            iata,
            webhook,
        } => {
            registry.add(&name, Airline::new(&icao, &iata, &webhook)?)?;
        }
        AirlineAction::Edit {
            name,
            rename,
            icao,
            iata,
            webhook,
        } => {
            let current = registry.get(&name)?.clone();
            let updated = Airline::new(
                icao.as_deref().unwrap_or(&current.icao),
                iata.as_deref().unwrap_or(&current.iata),
                webhook.as_deref().unwrap_or(&current.webhook),
            )?;
            registry.edit(&name, rename.as_deref(), updated)?;
        }
        AirlineAction::Remove { name } => {
            registry.remove(&name)?;
        }
        AirlineAction::Select { name } => {
            registry.select(&name)?;
        }
    }

    registry.save(path)?;
    Ok(())
}
