use thiserror::Error;

/// Flight logger error types
#[derive(Error, Debug)]
pub enum FlightLoggerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Webhook rejected the message: HTTP {0}")]
    WebhookStatus(u16),

    #[error("Invalid webhook URL: {0}")]
    InvalidWebhook(String),

    #[error("Airline not found: {0}")]
    AirlineNotFound(String),

    #[error("Cannot remove the last airline")]
    LastAirline,

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

/// Result type for flight logger operations
pub type Result<T> = std::result::Result<T, FlightLoggerError>;
