//! Delivery engine: gating, identity, queueing, and the flush cycle
//!
//! Every public method is fire-and-forget: nothing here ever panics or
//! returns an error to the caller, because telemetry must never break the
//! feature it is observing.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::{ConfigPatch, TelemetryConfig};
use crate::error::TelemetryError;
use crate::events::{
    Envelope, ErrorDetails, ErrorReport, EventCategory, Identity, PerformanceSample, Properties,
    Severity,
};
use crate::queue::PendingQueue;
use crate::transport::{debug_echo, HttpTransport, Transport};

/// The telemetry pipeline's public handle
///
/// Explicitly constructed and owned by the application's composition root;
/// cheap to clone (all clones share one queue and one flush cycle).
#[derive(Clone)]
pub struct TelemetryClient {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    transport: Arc<dyn Transport>,
}

/// Everything the producer side and the flush cycle share
///
/// The mutex is held only for short, non-awaiting critical sections so a
/// concurrent enqueue can never interleave with a pop-and-requeue.
struct State {
    config: TelemetryConfig,
    identity: Identity,
    queue: PendingQueue,
    online: bool,
    flushing: bool,
    /// Advanced by `dispose()`; a flush cycle that outlived its epoch must
    /// not touch the queue or the `flushing` flag
    epoch: u64,
}

impl State {
    /// Identity snapshot for a new envelope, empty unless the caller opted
    /// into personal-info collection
    fn effective_identity(&self) -> Identity {
        if self.config.collect_personal_info {
            self.identity.clone()
        } else {
            Identity::default()
        }
    }
}

impl TelemetryClient {
    /// Create a client backed by the HTTP transport
    pub fn new(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        let timeout = Duration::from_secs(config.delivery_timeout_secs);
        let transport = Arc::new(HttpTransport::new(timeout)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Create a client with a caller-supplied transport
    pub fn with_transport(config: TelemetryConfig, transport: Arc<dyn Transport>) -> Self {
        let queue = PendingQueue::new(config.max_pending);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    config,
                    identity: Identity::default(),
                    queue,
                    online: true,
                    flushing: false,
                    epoch: 0,
                }),
                transport,
            }),
        }
    }

    /// Track a domain event
    ///
    /// No-op when telemetry is disabled. Never blocks, never fails.
    pub fn track_event(
        &self,
        category: EventCategory,
        action: impl Into<String>,
        label: Option<String>,
        value: Option<f64>,
        properties: Option<Properties>,
    ) {
        {
            let Some(mut state) = self.lock_state() else {
                return;
            };
            if !state.config.enabled {
                return;
            }
            let identity = state.effective_identity();
            let envelope = Envelope::new(category, action, label, value, properties, &identity);
            state.queue.push(envelope);
        }
        self.trigger_flush();
    }

    /// Track a screen view (category `navigation`, action `screen_view`)
    pub fn track_screen_view(&self, name: impl Into<String>, properties: Option<Properties>) {
        self.track_event(
            EventCategory::Navigation,
            "screen_view",
            Some(name.into()),
            None,
            properties,
        );
    }

    /// Track an error report
    ///
    /// No-op unless both `enabled` and `collect_error_reports` are set.
    pub fn track_error(
        &self,
        report: ErrorReport,
        severity: Severity,
        context: Option<Properties>,
    ) {
        {
            let Some(mut state) = self.lock_state() else {
                return;
            };
            if !state.config.enabled || !state.config.collect_error_reports {
                return;
            }
            let identity = state.effective_identity();
            let mut envelope = Envelope::new(
                EventCategory::Exception,
                "error",
                None,
                None,
                context,
                &identity,
            );
            envelope.error = Some(ErrorDetails {
                message: report.message,
                severity,
                stack: report.stack,
            });
            state.queue.push(envelope);
        }
        self.trigger_flush();
    }

    /// Track a performance measurement
    ///
    /// No-op unless both `enabled` and `collect_performance_metrics` are set.
    pub fn track_performance(
        &self,
        metric: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
        context: Option<Properties>,
    ) {
        let metric = metric.into();
        {
            let Some(mut state) = self.lock_state() else {
                return;
            };
            if !state.config.enabled || !state.config.collect_performance_metrics {
                return;
            }
            let identity = state.effective_identity();
            let mut envelope = Envelope::new(
                EventCategory::Timing,
                metric.clone(),
                None,
                Some(value),
                context,
                &identity,
            );
            envelope.performance = Some(PerformanceSample {
                metric,
                value,
                unit: unit.into(),
            });
            state.queue.push(envelope);
        }
        self.trigger_flush();
    }

    /// Set the current user identifier
    ///
    /// Overwrites any previous value; affects only envelopes created after
    /// this call.
    pub fn set_user_id(&self, id: impl Into<String>) {
        if let Some(mut state) = self.lock_state() {
            state.identity.user_id = Some(id.into());
        }
    }

    /// Merge properties into the ambient user-property map
    pub fn set_user_properties(&self, properties: Properties) {
        if let Some(mut state) = self.lock_state() {
            state.identity.user_properties.extend(properties);
        }
    }

    /// Update the last-known connectivity state
    ///
    /// Coming online triggers a flush of the backlog.
    pub fn set_online_status(&self, online: bool) {
        if let Some(mut state) = self.lock_state() {
            state.online = online;
        }
        if online {
            self.trigger_flush();
        }
    }

    /// Merge a partial configuration update
    pub fn configure(&self, patch: ConfigPatch) {
        if let Some(mut state) = self.lock_state() {
            state.config.apply(patch);
            let max_pending = state.config.max_pending;
            state.queue.set_max_pending(max_pending);
        }
    }

    /// Discard the backlog and reset the flush state
    ///
    /// Intended for test teardown or controlled shutdown; discarded events
    /// are never delivered.
    pub fn dispose(&self) {
        if let Some(mut state) = self.lock_state() {
            state.queue.clear();
            state.flushing = false;
            // Orphan any cycle still awaiting a delivery so it cannot
            // requeue a discarded entry or release a newer cycle's claim.
            state.epoch = state.epoch.wrapping_add(1);
        }
    }

    /// Drain the backlog now, returning when the cycle ends
    ///
    /// Equivalent to the flush the engine triggers internally; a no-op when a
    /// cycle is already running, the queue is empty, or the client is
    /// offline.
    pub async fn flush(&self) {
        if let Some(epoch) = self.claim_flush() {
            flush_cycle(&self.inner, epoch).await;
        }
    }

    /// Number of envelopes awaiting delivery
    pub fn pending_count(&self) -> usize {
        self.lock_state().map_or(0, |state| state.queue.len())
    }

    /// Number of envelopes that exhausted their delivery attempts
    pub fn dead_letter_count(&self) -> usize {
        self.lock_state()
            .map_or(0, |state| state.queue.dead_letter_count())
    }

    pub fn is_enabled(&self) -> bool {
        self.lock_state().map_or(false, |state| state.config.enabled)
    }

    pub fn is_online(&self) -> bool {
        self.lock_state().map_or(false, |state| state.online)
    }

    pub fn is_debug(&self) -> bool {
        self.lock_state()
            .map_or(false, |state| state.config.debug_mode)
    }

    fn lock_state(&self) -> Option<MutexGuard<'_, State>> {
        // A poisoned mutex means a panic elsewhere; telemetry just goes quiet.
        self.inner.state.lock().ok()
    }

    /// Start a flush cycle on the runtime if none is running
    ///
    /// Outside a tokio runtime this is a no-op; events stay queued until a
    /// trigger fires with a runtime available.
    fn trigger_flush(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let Some(epoch) = self.claim_flush() else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        handle.spawn(async move {
            flush_cycle(&inner, epoch).await;
        });
    }

    /// Transition `Idle -> Flushing`; `None` when already flushing, offline,
    /// or nothing is queued
    ///
    /// On success, returns the epoch the claim belongs to.
    fn claim_flush(&self) -> Option<u64> {
        let mut state = self.lock_state()?;
        if state.flushing || !state.online || state.queue.is_empty() {
            return None;
        }
        state.flushing = true;
        Some(state.epoch)
    }
}

/// One flush cycle: drain the queue head-first until it is empty, the client
/// goes offline, or a delivery fails
///
/// Runs with the `Flushing` claim held. The claim is released in the same
/// critical section that observes the exit condition, so an enqueue racing
/// with cycle exit either lands before the check (and this cycle keeps
/// draining it) or finds the claim already free and starts a cycle of its
/// own — an event can never be stranded behind a stale claim.
///
/// `epoch` identifies the claim. `dispose()` advances the epoch; a cycle
/// that outlived its epoch returns without touching shared state.
async fn flush_cycle(inner: &Inner, epoch: u64) {
    loop {
        let (entry, endpoint, debug_mode, max_attempts) = {
            let Ok(mut state) = inner.state.lock() else {
                return;
            };
            if state.epoch != epoch {
                return;
            }
            if !state.online {
                tracing::debug!("went offline mid-flush; halting cycle");
                state.flushing = false;
                return;
            }
            let Some(entry) = state.queue.pop() else {
                state.flushing = false;
                return;
            };
            let endpoint = state
                .config
                .endpoints
                .as_ref()
                .and_then(|e| e.resolve(entry.envelope.event_type))
                .map(str::to_string);
            (entry, endpoint, state.config.debug_mode, state.config.max_attempts)
        };

        if debug_mode {
            debug_echo(&entry.envelope);
        }

        // An unconfigured endpoint can never succeed on retry, so the
        // envelope is dropped instead of requeued.
        let Some(url) = endpoint else {
            tracing::debug!(
                event_type = ?entry.envelope.event_type,
                action = %entry.envelope.action,
                "no endpoint configured for event type; dropping event"
            );
            continue;
        };

        match inner.transport.deliver(&url, &entry.envelope).await {
            Ok(()) => {
                tracing::debug!(action = %entry.envelope.action, url = %url, "delivered event");
            }
            Err(e) => {
                let Ok(mut state) = inner.state.lock() else {
                    return;
                };
                if state.epoch != epoch {
                    // Disposed mid-delivery; the backlog this entry came
                    // from is gone, so it must not be resurrected.
                    return;
                }
                let mut entry = entry;
                entry.attempts += 1;
                if entry.attempts >= max_attempts {
                    tracing::warn!(
                        action = %entry.envelope.action,
                        attempts = entry.attempts,
                        error = %e,
                        "delivery attempts exhausted; moving event to dead letters"
                    );
                    state.queue.dead_letter(entry.envelope);
                    // The stuck head is gone; keep draining the backlog.
                    continue;
                }
                tracing::warn!(
                    action = %entry.envelope.action,
                    attempts = entry.attempts,
                    error = %e,
                    "delivery failed; requeueing at head until next trigger"
                );
                state.queue.requeue_front(entry);
                state.flushing = false;
                return;
            }
        }
    }
}
