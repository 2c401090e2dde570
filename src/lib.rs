//! Flight logging agent core: watches simulator telemetry, detects departures,
//! landings, crashes and teleportation, and files reports.

pub mod airline;
pub mod airport;
pub mod config;
pub mod error;
pub mod geodesy;
pub mod monitor;
pub mod notifier;
pub mod prompt;
pub mod report;
pub mod runner;
pub mod session;
pub mod storage;
pub mod telemetry;
pub mod teleport;
pub mod vertical_speed;

pub use error::{FlightLoggerError, Result};
