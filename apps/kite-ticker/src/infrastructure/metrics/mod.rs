//! Prometheus Metrics Module
//!
//! Exposes ticker metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Messages**: inbound frames by kind, ticks decoded, drops by reason
//! - **Commands**: outbound subscription commands by action
//! - **Connection**: current state, connection errors, reconnects
//! - **Subscriptions**: registry size
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! without an installed recorder is a no-op, so library users that never
//! call [`init_metrics`] pay nothing.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::connection::ConnectionState;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling this again after a successful install returns the same handle.
///
/// # Errors
///
/// Returns `BuildError` if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "kite_ticker_messages_received_total",
        "Total frames received from the quote server"
    );
    describe_counter!(
        "kite_ticker_ticks_decoded_total",
        "Total ticks decoded from binary messages"
    );
    describe_counter!(
        "kite_ticker_dropped_total",
        "Total packets, messages, and events dropped"
    );
    describe_counter!(
        "kite_ticker_commands_sent_total",
        "Total subscription commands sent"
    );

    describe_gauge!(
        "kite_ticker_connection_state",
        "Connection state (0 disconnected, 1 connecting, 2 open, 3 closing)"
    );
    describe_gauge!(
        "kite_ticker_subscriptions",
        "Number of instruments in the subscription registry"
    );

    describe_counter!(
        "kite_ticker_connection_errors_total",
        "Total connection failures and losses by kind"
    );
    describe_counter!(
        "kite_ticker_reconnects_total",
        "Total reconnection attempts"
    );
    describe_counter!(
        "kite_ticker_reconnects_exhausted_total",
        "Total times reconnection gave up"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for inbound frame kinds.
#[derive(Debug, Clone, Copy)]
pub enum MessageKind {
    /// Binary tick message.
    Binary,
    /// Binary heartbeat.
    Heartbeat,
    /// JSON text message.
    Text,
}

impl MessageKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Heartbeat => "heartbeat",
            Self::Text => "text",
        }
    }
}

/// Metric labels for drop reasons.
#[derive(Debug, Clone, Copy)]
pub enum DropReason {
    /// A single packet could not be decoded.
    Packet,
    /// A whole message failed framing.
    Message,
    /// An event did not fit in a forwarding channel.
    Event,
}

impl DropReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Packet => "packet",
            Self::Message => "message",
            Self::Event => "event",
        }
    }
}

fn to_count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

/// Record an inbound frame.
pub fn record_message_received(kind: MessageKind) {
    counter!(
        "kite_ticker_messages_received_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record decoded ticks.
pub fn record_ticks_decoded(count: usize) {
    counter!("kite_ticker_ticks_decoded_total").increment(to_count(count));
}

/// Record one dropped packet or message.
pub fn record_dropped(reason: DropReason) {
    counter!(
        "kite_ticker_dropped_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record events dropped by a full forwarding channel.
pub fn record_events_dropped(count: usize) {
    counter!(
        "kite_ticker_dropped_total",
        "reason" => DropReason::Event.as_str()
    )
    .increment(to_count(count));
}

/// Record an outbound command.
pub fn record_command_sent(action: &'static str) {
    counter!(
        "kite_ticker_commands_sent_total",
        "action" => action
    )
    .increment(1);
}

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("kite_ticker_connection_state").set(f64::from(state.as_gauge()));
}

/// Update the subscription count.
pub fn set_subscriptions(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("kite_ticker_subscriptions").set(count as f64);
}

/// Record a connection failure or loss.
pub fn record_connection_error(kind: &'static str) {
    counter!(
        "kite_ticker_connection_errors_total",
        "kind" => kind
    )
    .increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("kite_ticker_reconnects_total").increment(1);
}

/// Record that reconnection gave up.
pub fn record_reconnect_exhausted() {
    counter!("kite_ticker_reconnects_exhausted_total").increment(1);
}

// =============================================================================
// Tests
// =============================================================================
