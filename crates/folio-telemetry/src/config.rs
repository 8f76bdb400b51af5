//! Telemetry configuration: defaults, partial merge, file and env loading

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::events::EventType;

/// Destination URLs per event type
///
/// An absent URL means "nothing to deliver to" for that type; such envelopes
/// are dropped rather than requeued, since retrying can never succeed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Endpoints {
    pub events: Option<String>,
    pub errors: Option<String>,
    pub performance: Option<String>,
}

impl Endpoints {
    /// Resolve the destination for an envelope's type
    ///
    /// Errors and performance have dedicated endpoints; every other type
    /// goes to the generic events endpoint. No fallback between them.
    pub fn resolve(&self, event_type: EventType) -> Option<&str> {
        match event_type {
            EventType::Error => self.errors.as_deref(),
            EventType::Performance => self.performance.as_deref(),
            _ => self.events.as_deref(),
        }
    }
}

/// Telemetry configuration
///
/// Set once at client construction; mutable afterwards through
/// [`ConfigPatch`] via `TelemetryClient::configure`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Kill switch: when false, no event of any kind is created or queued
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Attach user identity and user properties to envelopes (default: false)
    #[serde(default)]
    pub collect_personal_info: bool,

    /// Allow `track_performance` events (default: true)
    #[serde(default = "default_true")]
    pub collect_performance_metrics: bool,

    /// Allow `track_error` events (default: true)
    #[serde(default = "default_true")]
    pub collect_error_reports: bool,

    /// Echo envelopes locally at delivery time (default: false)
    #[serde(default)]
    pub debug_mode: bool,

    /// Destination URLs; without them every envelope is dropped at delivery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Endpoints>,

    /// Queue capacity; the oldest pending envelope is dropped when full
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,

    /// Delivery attempts per envelope before it is dead-lettered
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Timeout for a single delivery attempt, read at client construction
    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            collect_personal_info: false,
            collect_performance_metrics: true,
            collect_error_reports: true,
            debug_mode: false,
            endpoints: None,
            max_pending: default_max_pending(),
            max_attempts: default_max_attempts(),
            delivery_timeout_secs: default_delivery_timeout_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_pending() -> usize {
    1000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_delivery_timeout_secs() -> u64 {
    10
}

/// Partial configuration update; only the fields present are applied
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigPatch {
    pub enabled: Option<bool>,
    pub collect_personal_info: Option<bool>,
    pub collect_performance_metrics: Option<bool>,
    pub collect_error_reports: Option<bool>,
    pub debug_mode: Option<bool>,
    pub endpoints: Option<Endpoints>,
    pub max_pending: Option<usize>,
    pub max_attempts: Option<u32>,
}

impl TelemetryConfig {
    /// Merge a partial update into this configuration
    pub fn apply(&mut self, patch: ConfigPatch) {
        if let Some(v) = patch.enabled {
            self.enabled = v;
        }
        if let Some(v) = patch.collect_personal_info {
            self.collect_personal_info = v;
        }
        if let Some(v) = patch.collect_performance_metrics {
            self.collect_performance_metrics = v;
        }
        if let Some(v) = patch.collect_error_reports {
            self.collect_error_reports = v;
        }
        if let Some(v) = patch.debug_mode {
            self.debug_mode = v;
        }
        if let Some(v) = patch.endpoints {
            self.endpoints = Some(v);
        }
        if let Some(v) = patch.max_pending {
            self.max_pending = v;
        }
        if let Some(v) = patch.max_attempts {
            self.max_attempts = v;
        }
    }
}

/// Load telemetry configuration with precedence:
/// 1. Environment variables (highest priority)
/// 2. User config (~/.folio/config.toml, `[telemetry]` section)
/// 3. Default
///
/// This is a convenience for the composition root; code that builds a
/// `TelemetryConfig` explicitly bypasses loading entirely.
pub fn load_config() -> Result<TelemetryConfig> {
    let mut config = TelemetryConfig::default();

    if let Some(home_dir) = dirs::home_dir() {
        let user_config = home_dir.join(".folio/config.toml");
        if user_config.exists() {
            if let Ok(cfg) = load_config_from_file(&user_config) {
                config = cfg;
            }
        }
    }

    apply_env_overrides(&mut config);

    Ok(config)
}

/// Load the `[telemetry]` section from a TOML config file
fn load_config_from_file(path: &PathBuf) -> Result<TelemetryConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;

    #[derive(Deserialize)]
    struct FullConfig {
        #[serde(default)]
        telemetry: Option<TelemetryConfig>,
    }

    let full_config: FullConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;

    Ok(full_config.telemetry.unwrap_or_default())
}

/// Apply environment variable overrides
fn apply_env_overrides(config: &mut TelemetryConfig) {
    // FOLIO_TELEMETRY_DISABLED=1 disables telemetry
    if env::var("FOLIO_TELEMETRY_DISABLED").is_ok() {
        config.enabled = false;
        return;
    }

    // DO_NOT_TRACK=1 (universal opt-out)
    if env::var("DO_NOT_TRACK").is_ok() {
        config.enabled = false;
        return;
    }

    // FOLIO_TELEMETRY_DEBUG=1 enables debug mode
    if env::var("FOLIO_TELEMETRY_DEBUG").is_ok() {
        config.debug_mode = true;
    }
}
