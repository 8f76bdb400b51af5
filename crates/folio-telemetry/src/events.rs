//! Telemetry event vocabulary and envelope construction

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Free-form property bag attached to every envelope
pub type Properties = HashMap<String, serde_json::Value>;

/// Coarse tag used to route an envelope to a delivery endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    App,
    User,
    Screen,
    Error,
    Performance,
    Api,
    Portfolio,
    Analysis,
}

/// Fine-grained tag supplied by the caller
///
/// Every category maps to exactly one [`EventType`]; tags outside the closed
/// set are carried as `Other` and routed as `user` events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Lifecycle,
    Session,
    Account,
    Settings,
    Navigation,
    Crash,
    Exception,
    Timing,
    Resource,
    Request,
    Response,
    Holdings,
    Transaction,
    Watchlist,
    Chart,
    Report,
    Screener,
    #[serde(untagged)]
    Other(String),
}

impl EventCategory {
    /// Map this category to its delivery type
    ///
    /// Total and pure: same input, same output, no side effects.
    pub fn classify(&self) -> EventType {
        match self {
            Self::Lifecycle => EventType::App,
            Self::Session | Self::Account | Self::Settings => EventType::User,
            Self::Navigation => EventType::Screen,
            Self::Crash | Self::Exception => EventType::Error,
            Self::Timing | Self::Resource => EventType::Performance,
            Self::Request | Self::Response => EventType::Api,
            Self::Holdings | Self::Transaction | Self::Watchlist => EventType::Portfolio,
            Self::Chart | Self::Report | Self::Screener => EventType::Analysis,
            Self::Other(_) => EventType::User,
        }
    }

    /// Parse a caller-supplied tag into a category
    ///
    /// Unrecognized tags become `Other`, which classifies as `user`.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "lifecycle" => Self::Lifecycle,
            "session" => Self::Session,
            "account" => Self::Account,
            "settings" => Self::Settings,
            "navigation" => Self::Navigation,
            "crash" => Self::Crash,
            "exception" => Self::Exception,
            "timing" => Self::Timing,
            "resource" => Self::Resource,
            "request" => Self::Request,
            "response" => Self::Response,
            "holdings" => Self::Holdings,
            "transaction" => Self::Transaction,
            "watchlist" => Self::Watchlist,
            "chart" => Self::Chart,
            "report" => Self::Report,
            "screener" => Self::Screener,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Severity attached to error envelopes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    #[default]
    Error,
    Critical,
}

/// Current user identity attached to envelopes at creation time
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub user_id: Option<String>,
    pub user_properties: Properties,
}

/// Error input for `track_error`: a message plus an optional stack trace
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub message: String,
    pub stack: Option<String>,
}

impl ErrorReport {
    /// Build a report from a bare message, with no stack trace
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    /// Attach a caller-captured stack trace
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Build a report from any error, capturing its source chain and a backtrace
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut stack = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            stack.push_str("\ncaused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }
        stack.push('\n');
        stack.push_str(&std::backtrace::Backtrace::force_capture().to_string());

        Self {
            message: err.to_string(),
            stack: Some(stack),
        }
    }
}

/// Required fields carried by performance envelopes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub metric: String,
    pub value: f64,
    pub unit: String,
}

/// Required fields carried by error envelopes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub message: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// The normalized, immutable record of one tracked occurrence
///
/// Envelopes are built once, at track time, and never mutated after they
/// enter the pending queue. Ordering is queue-position-based; the timestamp
/// is informational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event_type: EventType,
    pub category: EventCategory,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    pub properties: Properties,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceSample>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

impl Envelope {
    /// Build an envelope from a track call plus the ambient identity
    ///
    /// Caller-supplied properties win over identity properties on key
    /// collision; the identity is snapshotted here, so later identity
    /// updates never retag an already-built envelope.
    pub fn new(
        category: EventCategory,
        action: impl Into<String>,
        label: Option<String>,
        value: Option<f64>,
        properties: Option<Properties>,
        identity: &Identity,
    ) -> Self {
        let mut props = properties.unwrap_or_default();
        if let Some(id) = &identity.user_id {
            props
                .entry("user_id".to_string())
                .or_insert_with(|| serde_json::Value::String(id.clone()));
        }
        for (key, val) in &identity.user_properties {
            props.entry(key.clone()).or_insert_with(|| val.clone());
        }

        Self {
            event_type: category.classify(),
            category,
            action: action.into(),
            label,
            value,
            properties: props,
            timestamp: Utc::now(),
            performance: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_covers_the_closed_set() {
        let cases = [
            (EventCategory::Lifecycle, EventType::App),
            (EventCategory::Session, EventType::User),
            (EventCategory::Account, EventType::User),
            (EventCategory::Settings, EventType::User),
            (EventCategory::Navigation, EventType::Screen),
            (EventCategory::Crash, EventType::Error),
            (EventCategory::Exception, EventType::Error),
            (EventCategory::Timing, EventType::Performance),
            (EventCategory::Resource, EventType::Performance),
            (EventCategory::Request, EventType::Api),
            (EventCategory::Response, EventType::Api),
            (EventCategory::Holdings, EventType::Portfolio),
            (EventCategory::Transaction, EventType::Portfolio),
            (EventCategory::Watchlist, EventType::Portfolio),
            (EventCategory::Chart, EventType::Analysis),
            (EventCategory::Report, EventType::Analysis),
            (EventCategory::Screener, EventType::Analysis),
        ];
        for (category, expected) in cases {
            assert_eq!(category.classify(), expected, "{category:?}");
        }
    }

    #[test]
    fn unrecognized_category_falls_back_to_user() {
        let category = EventCategory::parse("not_a_real_category");
        assert_eq!(
            category,
            EventCategory::Other("not_a_real_category".to_string())
        );
        assert_eq!(category.classify(), EventType::User);
    }

    #[test]
    fn parse_round_trips_known_tags() {
        assert_eq!(EventCategory::parse("navigation"), EventCategory::Navigation);
        assert_eq!(EventCategory::parse("holdings"), EventCategory::Holdings);
        assert_eq!(EventCategory::parse("timing"), EventCategory::Timing);
    }

    #[test]
    fn classify_is_deterministic() {
        let category = EventCategory::parse("chart");
        assert_eq!(category.classify(), category.classify());
    }

    #[test]
    fn envelope_carries_identity_in_properties() {
        let identity = Identity {
            user_id: Some("user-42".to_string()),
            user_properties: HashMap::from([(
                "plan".to_string(),
                serde_json::Value::String("pro".to_string()),
            )]),
        };

        let envelope = Envelope::new(
            EventCategory::Holdings,
            "position_opened",
            None,
            None,
            None,
            &identity,
        );

        assert_eq!(envelope.event_type, EventType::Portfolio);
        assert_eq!(
            envelope.properties.get("user_id"),
            Some(&serde_json::Value::String("user-42".to_string()))
        );
        assert_eq!(
            envelope.properties.get("plan"),
            Some(&serde_json::Value::String("pro".to_string()))
        );
    }

    #[test]
    fn caller_properties_win_over_identity_properties() {
        let identity = Identity {
            user_id: None,
            user_properties: HashMap::from([(
                "plan".to_string(),
                serde_json::Value::String("pro".to_string()),
            )]),
        };
        let props = HashMap::from([(
            "plan".to_string(),
            serde_json::Value::String("trial".to_string()),
        )]);

        let envelope = Envelope::new(
            EventCategory::Session,
            "login",
            None,
            None,
            Some(props),
            &identity,
        );

        assert_eq!(
            envelope.properties.get("plan"),
            Some(&serde_json::Value::String("trial".to_string()))
        );
    }

    #[test]
    fn error_report_from_error_captures_chain() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let report = ErrorReport::from_error(&err);

        assert_eq!(report.message, "boom");
        let stack = report.stack.expect("stack should be captured");
        assert!(stack.starts_with("boom"));
        assert!(!stack.is_empty());
    }

    #[test]
    fn severity_serializes_lowercase() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        assert_eq!(Severity::default(), Severity::Error);
    }

    #[test]
    fn envelope_skips_absent_specializations() {
        let envelope = Envelope::new(
            EventCategory::Lifecycle,
            "app_start",
            None,
            None,
            None,
            &Identity::default(),
        );
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("performance").is_none());
        assert!(json.get("error").is_none());
        assert_eq!(json["event_type"], "app");
        assert_eq!(json["category"], "lifecycle");
    }
}
