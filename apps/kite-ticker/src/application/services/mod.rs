//! Application Services
//!
//! - [`EventForwarder`]: a [`TickerHandler`] that turns every callback into
//!   a [`TickerEvent`] on a channel, for hosts that prefer consuming the
//!   ticker as a message stream.

use tokio::sync::mpsc;

use crate::application::ports::{TickerControl, TickerHandler};
use crate::domain::streaming::Tick;

/// Events emitted by the ticker session.
#[derive(Debug, Clone)]
pub enum TickerEvent {
    /// Channel opened and subscriptions are in place.
    Connected,
    /// Channel closed.
    Closed {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// Unclean close or server-reported error.
    Error {
        /// Error code (0 for server text errors).
        code: u16,
        /// Error description.
        reason: String,
    },
    /// Decoded ticks.
    Ticks(Vec<Tick>),
    /// Reconnect attempt scheduled.
    Reconnecting {
        /// Reconnection attempt number.
        attempt: u32,
    },
    /// Reconnect attempts exhausted.
    ReconnectExhausted,
    /// Order update pushed by the server.
    OrderUpdate(serde_json::Value),
}

/// Forwards ticker callbacks as [`TickerEvent`]s.
///
/// Uses `try_send` so a slow consumer never stalls the session loop; events
/// that do not fit in the channel are dropped and counted.
#[derive(Debug, Clone)]
pub struct EventForwarder {
    tx: mpsc::Sender<TickerEvent>,
}

impl EventForwarder {
    /// Create a forwarder and the receiving end of its channel.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TickerEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    fn forward(&self, event: TickerEvent) {
        if let Err(e) = self.tx.try_send(event) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    crate::infrastructure::metrics::record_events_dropped(1);
                    tracing::warn!("Ticker event channel full, dropping event");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    tracing::trace!("Ticker event receiver dropped");
                }
            }
        }
    }
}

impl TickerHandler for EventForwarder {
    fn on_ticks(&self, _ticker: &dyn TickerControl, ticks: &[Tick]) {
        self.forward(TickerEvent::Ticks(ticks.to_vec()));
    }

    fn on_connect(&self, _ticker: &dyn TickerControl) {
        self.forward(TickerEvent::Connected);
    }

    fn on_close(&self, _ticker: &dyn TickerControl, code: u16, reason: &str) {
        self.forward(TickerEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    fn on_error(&self, _ticker: &dyn TickerControl, code: u16, reason: &str) {
        self.forward(TickerEvent::Error {
            code,
            reason: reason.to_string(),
        });
    }

    fn on_reconnect(&self, _ticker: &dyn TickerControl, attempt: u32) {
        self.forward(TickerEvent::Reconnecting { attempt });
    }

    fn on_noreconnect(&self, _ticker: &dyn TickerControl) {
        self.forward(TickerEvent::ReconnectExhausted);
    }

    fn on_order_update(&self, _ticker: &dyn TickerControl, data: &serde_json::Value) {
        self.forward(TickerEvent::OrderUpdate(data.clone()));
    }
}
