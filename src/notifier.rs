//! Report delivery.
//!
//! Delivery is best-effort and at-most-once: callers log failures and move on.

use std::future::Future;
use std::time::Duration;

use serde_json::{json, Value};

use crate::error::{FlightLoggerError, Result};
use crate::report::{format_local, FlightReport, LandingQuality, TerminationNotice};

pub const WEBHOOK_MARKER: &str = "discord.com/api/webhooks/";

const FOOTER: &str = "GeoFS Flight Logger";

pub trait Notifier {
    fn send_report(&self, report: &FlightReport) -> impl Future<Output = Result<()>> + Send;
    fn send_termination(&self, notice: &TerminationNotice) -> impl Future<Output = Result<()>> + Send;
}

/// Reject anything that is not a Discord webhook URL
pub fn validate_webhook(url: &str) -> Result<()> {
    let url = url.trim();
    if url.contains(WEBHOOK_MARKER) {
        Ok(())
    } else {
        Err(FlightLoggerError::InvalidWebhook(url.to_string()))
    }
}

fn quality_color(quality: LandingQuality) -> u32 {
    match quality {
        LandingQuality::SuperButter | LandingQuality::Butter => 0x00FF00,
        LandingQuality::Acceptable => 0xFFFF00,
        LandingQuality::Hard => 0xFF8000,
        LandingQuality::Crash => 0xDC143C,
    }
}

/// Discord message body for a completed flight
pub fn report_message(report: &FlightReport) -> Value {
    let mut color = quality_color(report.quality);

    let mut quality = format!("**{}**", report.quality);
    if report.bounces > 0 {
        quality.push_str(&format!("\n**Bounces**: {}", report.bounces));
    }

    let tas = report
        .true_airspeed_kt
        .map(|v| format!("{:.1}", v))
        .unwrap_or_else(|| "N/A".to_string());

    let mut fields = vec![
        json!({
            "name": "Flight Information",
            "value": format!(
                "**Flight no.**: {}\n**Pilot name**: {}\n**Aircraft**: {}",
                report.flight_number, report.pilot_name, report.aircraft
            ),
            "inline": false,
        }),
        json!({
            "name": "Route",
            "value": format!("**Departure**: {}\n**Arrival**: {}", report.departure, report.arrival),
            "inline": true,
        }),
        json!({
            "name": "Duration",
            "value": format!("**Flight Time**: {}", report.duration),
            "inline": true,
        }),
        json!({
            "name": "Flight Data",
            "value": format!(
                "**V/S**: {:.1} fpm\n**G-Force**: {:.2}\n**TAS**: {} kts\n**GS**: {:.1} kts",
                report.vertical_speed_fpm, report.g_force, tas, report.ground_speed_kt
            ),
            "inline": true,
        }),
        json!({
            "name": "Landing Quality",
            "value": quality,
            "inline": true,
        }),
        json!({
            "name": "Times",
            "value": format!(
                "**Takeoff**: {}\n**Landing**: {}",
                format_local(report.takeoff_time, report.departure_timezone.as_deref()),
                format_local(report.landing_time, report.arrival_timezone.as_deref())
            ),
            "inline": false,
        }),
    ];

    let mut footer = FOOTER.to_string();
    if report.teleport_warnings > 0 {
        let mut alert = format!(
            "**Teleportation detected**: {} time(s)\n*Flight continued with noted violation*",
            report.teleport_warnings
        );
        if report.path_continuity_broken {
            alert.push_str("\n*Map path was reset during the flight*");
        }
        fields.push(json!({
            "name": "Flight Integrity Alert",
            "value": alert,
            "inline": false,
        }));
        color = 0xFFA500;
        footer.push_str(" | Integrity Warning");
    }

    json!({
        "embeds": [{
            "title": "Flight Report - GeoFS",
            "color": color,
            "fields": fields,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "footer": { "text": footer },
        }]
    })
}

/// Discord message body for a voided flight
pub fn termination_message(notice: &TerminationNotice) -> Value {
    json!({
        "embeds": [{
            "title": "Flight Terminated - GeoFS",
            "color": 0xFF0000,
            "fields": [
                {
                    "name": "Flight Information",
                    "value": format!(
                        "**Flight no.**: {}\n**Pilot name**: {}\n**Aircraft**: {}",
                        notice.flight_number, notice.pilot_name, notice.aircraft
                    ),
                    "inline": false,
                },
                {
                    "name": "Route",
                    "value": format!("**Departure**: {}\n**Arrival**: {}", notice.departure, notice.arrival),
                    "inline": true,
                },
                {
                    "name": "Duration",
                    "value": format!("**Flight Time**: {}", notice.duration),
                    "inline": true,
                },
                {
                    "name": "Termination Reason",
                    "value": format!(
                        "**{}**\nFlight integrity compromised after {} warnings.",
                        notice.reason, notice.teleport_warnings
                    ),
                    "inline": false,
                },
            ],
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "footer": { "text": format!("{} | Flight Not Logged", FOOTER) },
        }]
    })
}

/// Posts embeds to a Discord webhook
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self> {
        validate_webhook(url)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("flight-logger-rs/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.trim().to_string(),
        })
    }

    async fn post(&self, body: &Value) -> Result<()> {
        let response = self.client.post(&self.url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FlightLoggerError::WebhookStatus(status.as_u16()));
        }
        Ok(())
    }
}

impl Notifier for WebhookNotifier {
    async fn send_report(&self, report: &FlightReport) -> Result<()> {
        log::info!("Sending flight log to webhook: {}", report.summary());
        self.post(&report_message(report)).await?;
        log::info!("Flight log sent");
        Ok(())
    }

    async fn send_termination(&self, notice: &TerminationNotice) -> Result<()> {
        log::info!("Sending termination notice for {}", notice.flight_number);
        self.post(&termination_message(notice)).await?;
        log::info!("Termination notice sent");
        Ok(())
    }
}

/// Writes reports to the log instead of the network (dry runs, replay)
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send_report(&self, report: &FlightReport) -> Result<()> {
        log::info!("[report] {}", report.summary());
        log::debug!("[report] {}", serde_json::to_string(report)?);
        Ok(())
    }

    async fn send_termination(&self, notice: &TerminationNotice) -> Result<()> {
        log::warn!(
            "[report] {} terminated after {} warnings ({} -> {}, {})",
            notice.flight_number,
            notice.teleport_warnings,
            notice.departure,
            notice.arrival,
            notice.duration
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Keeps everything it is asked to send; optionally fails every send
    #[derive(Clone, Default)]
    pub struct RecordingNotifier {
        pub reports: Arc<Mutex<Vec<FlightReport>>>,
        pub terminations: Arc<Mutex<Vec<TerminationNotice>>>,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }
    }

    impl Notifier for RecordingNotifier {
        async fn send_report(&self, report: &FlightReport) -> Result<()> {
            self.reports.lock().unwrap().push(report.clone());
            if self.fail {
                return Err(FlightLoggerError::WebhookStatus(500));
            }
            Ok(())
        }

        async fn send_termination(&self, notice: &TerminationNotice) -> Result<()> {
            self.terminations.lock().unwrap().push(notice.clone());
            if self.fail {
                return Err(FlightLoggerError::WebhookStatus(500));
            }
            Ok(())
        }
    }
}
