//! Port Interfaces
//!
//! Defines the interfaces (ports) between the ticker session and the
//! outside world, following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`Connector`]: opens a duplex frame channel to the quote server
//! - [`TickerHandler`]: receives ticks and connection lifecycle callbacks
//!
//! ## Driver Ports (Inbound)
//!
//! - [`TickerControl`]: subscription and lifecycle commands issued by the
//!   host application, also handed to every [`TickerHandler`] callback

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};

use crate::domain::instrument::{InstrumentToken, StreamMode};
use crate::domain::streaming::Tick;

// =============================================================================
// Transport Port
// =============================================================================

/// Close code and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// WebSocket close code.
    pub code: u16,
    /// Human readable reason.
    pub reason: String,
}

impl CloseReason {
    /// Create a close reason.
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// A single message on the duplex channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text payload.
    Text(String),
    /// Binary payload.
    Binary(Vec<u8>),
    /// Keepalive ping. Inbound pings are answered by the transport.
    Ping(Vec<u8>),
    /// Keepalive pong.
    Pong(Vec<u8>),
    /// Close handshake.
    Close(Option<CloseReason>),
}

/// Transport-level failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Opening the channel failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Opening the channel did not complete in time.
    #[error("connection timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Reading a frame failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

/// Outbound half of a frame channel.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Inbound half of a frame channel.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// An open duplex channel, already split into its two halves.
pub struct FrameChannel {
    /// Outbound frames.
    pub sink: FrameSink,
    /// Inbound frames.
    pub stream: FrameStream,
}

impl std::fmt::Debug for FrameChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameChannel").finish_non_exhaustive()
    }
}

/// Opens frame channels to the quote server.
///
/// Channels answer inbound pings themselves; the session never sends a
/// `Frame::Pong`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a channel to `url`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` when the channel cannot be established.
    async fn connect(&self, url: &str) -> Result<FrameChannel, TransportError>;
}

// =============================================================================
// Control Port
// =============================================================================

/// Error returned when a command can no longer reach the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The session loop has exited.
    #[error("ticker session has ended")]
    SessionEnded,
}

/// Commands accepted by a running ticker session.
///
/// Every method only enqueues the command; the session loop applies it.
pub trait TickerControl: Send + Sync {
    /// Subscribe tokens at the default mode.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::SessionEnded` if the session has exited.
    fn subscribe(&self, tokens: &[InstrumentToken]) -> Result<(), CommandError>;

    /// Unsubscribe tokens.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::SessionEnded` if the session has exited.
    fn unsubscribe(&self, tokens: &[InstrumentToken]) -> Result<(), CommandError>;

    /// Set the streaming mode for tokens.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::SessionEnded` if the session has exited.
    fn set_mode(&self, mode: StreamMode, tokens: &[InstrumentToken]) -> Result<(), CommandError>;

    /// Stop reconnecting without closing an open channel.
    fn stop_retry(&self);

    /// Stop reconnecting and close the channel.
    fn close(&self);

    /// Whether the channel is currently open.
    fn is_connected(&self) -> bool;
}

// =============================================================================
// Handler Port
// =============================================================================

/// Callbacks invoked by the session loop.
///
/// Every method has an empty default, so implementors only override the
/// callbacks they care about. Callbacks run on the session loop and should
/// return quickly.
#[allow(unused_variables)]
pub trait TickerHandler: Send + Sync {
    /// Decoded ticks from one binary message.
    fn on_ticks(&self, ticker: &dyn TickerControl, ticks: &[Tick]) {}

    /// Channel opened (and, after a reconnect, subscriptions replayed).
    fn on_connect(&self, ticker: &dyn TickerControl) {}

    /// Channel closed.
    fn on_close(&self, ticker: &dyn TickerControl, code: u16, reason: &str) {}

    /// Channel closed uncleanly, or the server reported an error.
    fn on_error(&self, ticker: &dyn TickerControl, code: u16, reason: &str) {}

    /// Raw inbound payload, before decoding.
    fn on_message(&self, ticker: &dyn TickerControl, payload: &[u8], is_binary: bool) {}

    /// A reconnect attempt has been scheduled.
    fn on_reconnect(&self, ticker: &dyn TickerControl, attempt: u32) {}

    /// Reconnect attempts are exhausted; the session has stopped.
    fn on_noreconnect(&self, ticker: &dyn TickerControl) {}

    /// Order update pushed as a text message.
    fn on_order_update(&self, ticker: &dyn TickerControl, data: &serde_json::Value) {}
}

/// Handler that ignores every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl TickerHandler for NoopHandler {}
