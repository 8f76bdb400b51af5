//! # Folio Telemetry
//!
//! Client-embedded telemetry pipeline for the Folio app: capture structured
//! application events (navigation, errors, performance measurements, domain
//! actions) and deliver them to remote collection endpoints.
//!
//! ## Behavior Guarantees
//!
//! - **Fire-and-forget**: `track_*` calls never block, throw, or slow down
//!   the feature they are observing
//! - **Fail Gracefully**: backend failures and lost connectivity requeue
//!   events instead of losing them; nothing is ever surfaced to callers
//! - **Opt-out First**: a kill switch plus independent gates for error
//!   reports, performance metrics, and personal info
//! - **Debug Mode**: inspect events locally at delivery time
//!
//! ## How delivery works
//!
//! Events are normalized into envelopes, queued in memory (FIFO), and
//! drained by an asynchronous flush cycle whenever the app is online. Errors
//! and performance samples route to dedicated endpoints; everything else
//! goes to the generic events endpoint. A failed delivery returns its
//! envelope to the queue head and waits for the next trigger (a new event,
//! or connectivity coming back).
//!
//! The queue is memory-resident only: it does not survive process restarts.
//!
//! ## Opt-Out
//!
//! ```bash
//! # Via environment variable
//! export FOLIO_TELEMETRY_DISABLED=1
//!
//! # Universal opt-out
//! export DO_NOT_TRACK=1
//!
//! # Via config file (~/.folio/config.toml)
//! [telemetry]
//! enabled = false
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
mod queue;
pub mod transport;

pub use client::TelemetryClient;
pub use config::{load_config, ConfigPatch, Endpoints, TelemetryConfig};
pub use error::{TelemetryError, TransportError};
pub use events::{
    Envelope, ErrorDetails, ErrorReport, EventCategory, EventType, Identity, PerformanceSample,
    Properties, Severity,
};
pub use transport::{HttpTransport, Transport};
