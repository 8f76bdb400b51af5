//! Error types for the telemetry pipeline
//!
//! None of these ever reach application code through the `track_*` surface;
//! they exist for the transport seam and for client construction.

use thiserror::Error;

/// A failed delivery attempt
///
/// Any of these is recoverable: the envelope goes back to the queue head and
/// is retried on the next flush trigger. Timeouts surface as `Http` with
/// `reqwest::Error::is_timeout` set.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("collector returned status {0}")]
    Status(u16),
}

/// Errors surfaced while constructing the pipeline
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
