//! Manual fallback when an airport cannot be resolved automatically.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

use tokio::runtime::{Handle, RuntimeFlavor};

pub const UNKNOWN_ICAO: &str = "UNKNOWN";

pub trait UserPrompt {
    /// Ask for free text; `None` when declined or no answer is possible
    fn ask_text(&mut self, message: &str) -> Option<String>;
}

/// Run a blocking read from inside a tick. On a multi-threaded runtime the worker
/// hands its other tasks off first so they keep running while the user types.
fn wait_for_input<T>(read: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(read)
        }
        _ => read(),
    }
}

/// Interactive prompt on the controlling terminal.
///
/// The calling tick waits for the answer, so polling pauses until the user replies;
/// missed ticks are skipped rather than replayed.
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl UserPrompt for StdinPrompt {
    fn ask_text(&mut self, message: &str) -> Option<String> {
        let mut stdout = io::stdout();
        writeln!(stdout, "{}", message).ok()?;
        write!(stdout, "> ").ok()?;
        stdout.flush().ok()?;

        wait_for_input(|| {
            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(0) | Err(_) => None,
                Ok(_) => Some(line),
            }
        })
    }
}

/// Never answers; used when stdin carries telemetry or prompting is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclinePrompt;

impl UserPrompt for DeclinePrompt {
    fn ask_text(&mut self, message: &str) -> Option<String> {
        log::debug!("Prompt declined: {}", message.lines().next().unwrap_or_default());
        None
    }
}

/// Canned answers, handed out in order
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct ScriptedPrompt {
    answers: VecDeque<Option<String>>,
    asked: Vec<String>,
}

#[cfg(test)]
impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(|a| a.map(Into::into)).collect(),
            asked: Vec::new(),
        }
    }

    /// Messages shown so far
    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

#[cfg(test)]
impl UserPrompt for ScriptedPrompt {
    fn ask_text(&mut self, message: &str) -> Option<String> {
        self.asked.push(message.to_string());
        self.answers.pop_front().flatten()
    }
}

/// Ask for an ICAO code at a location the airport database could not match.
///
/// Answers are trimmed and upper-cased; an empty or declined answer becomes `UNKNOWN`.
pub fn resolve_icao(prompt: &mut dyn UserPrompt, kind: &str, lat: f64, lon: f64) -> String {
    let message = format!(
        "{} airport not found in database.\nLocation: {:.4}, {:.4}\n\n\
         Please enter the ICAO code manually (or leave empty for {}):",
        kind, lat, lon, UNKNOWN_ICAO
    );
    let answer = prompt
        .ask_text(&message)
        .map(|a| a.trim().to_uppercase())
        .filter(|a| !a.is_empty());

    match answer {
        Some(icao) => {
            log::info!("{} airport entered manually: {}", kind, icao);
            icao
        }
        None => {
            log::warn!("{} airport left as {}", kind, UNKNOWN_ICAO);
            UNKNOWN_ICAO.to_string()
        }
    }
}
