//! Delivery transport: the seam between the flush cycle and the network
//!
//! One envelope per request, JSON body, no batching. The trait exists so
//! tests can substitute a scripted transport for the reqwest client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{TelemetryError, TransportError};
use crate::events::Envelope;

/// Delivers one envelope to one destination URL
#[async_trait]
pub trait Transport: Send + Sync {
    /// Attempt delivery; any error is treated as a recoverable failure
    async fn deliver(&self, url: &str, envelope: &Envelope) -> Result<(), TransportError>;
}

/// HTTP transport: `POST` with `Content-Type: application/json`
///
/// The request timeout bounds every delivery attempt so a stuck network
/// call cannot stall the flush cycle indefinitely.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TelemetryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TelemetryError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn deliver(&self, url: &str, envelope: &Envelope) -> Result<(), TransportError> {
        let response = self.client.post(url).json(envelope).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status(status.as_u16()))
        }
    }
}

/// Print an envelope to stderr when debug mode is on
///
/// Happens at delivery time, regardless of the delivery outcome.
pub(crate) fn debug_echo(envelope: &Envelope) {
    eprintln!("telemetry event (debug mode):");
    eprintln!(
        "{}",
        serde_json::to_string_pretty(envelope).unwrap_or_default()
    );
}
