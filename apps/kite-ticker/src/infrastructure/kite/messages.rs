//! Ticker Text Message Types
//!
//! JSON text frames exchanged with the quote server.
//!
//! ## Outbound
//! - `{"a":"subscribe","v":[tokens]}`
//! - `{"a":"unsubscribe","v":[tokens]}`
//! - `{"a":"mode","v":["full",[tokens]]}`
//!
//! ## Inbound
//! - `{"type":"order","data":{...}}`: order lifecycle update
//! - `{"type":"error","data":"..."}`: server-side error
//!
//! Binary frames carry ticks and are handled by the framing and decoder
//! modules.

use serde::{Deserialize, Serialize};

use crate::domain::instrument::{InstrumentToken, StreamMode};

// =============================================================================
// Outbound Commands
// =============================================================================

/// Command sent to the quote server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "a", content = "v", rename_all = "lowercase")]
pub enum TickerCommand {
    /// Start streaming tokens.
    Subscribe(Vec<InstrumentToken>),
    /// Stop streaming tokens.
    Unsubscribe(Vec<InstrumentToken>),
    /// Change the streaming mode of tokens.
    Mode(StreamMode, Vec<InstrumentToken>),
}

impl TickerCommand {
    /// Short name for logging.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Subscribe(_) => "subscribe",
            Self::Unsubscribe(_) => "unsubscribe",
            Self::Mode(..) => "mode",
        }
    }

    /// Number of tokens carried.
    #[must_use]
    pub fn token_count(&self) -> usize {
        match self {
            Self::Subscribe(tokens) | Self::Unsubscribe(tokens) | Self::Mode(_, tokens) => {
                tokens.len()
            }
        }
    }
}

// =============================================================================
// Inbound Messages
// =============================================================================

/// Text message pushed by the quote server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Order update for the authenticated user.
    Order(serde_json::Value),
    /// Error reported by the server.
    Error(serde_json::Value),
    /// Any other message type (e.g. `message`, `instruments_meta`).
    Other(String),
}

#[derive(Debug, Deserialize)]
struct RawServerMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl ServerMessage {
    /// Parse a text frame.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the frame is not an object with a `type`.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let raw: RawServerMessage = serde_json::from_str(text)?;
        Ok(match raw.kind.as_str() {
            "order" => Self::Order(raw.data),
            "error" => Self::Error(raw.data),
            _ => Self::Other(raw.kind),
        })
    }

    /// Error text of an `Error` message.
    ///
    /// String payloads are returned as-is, anything else as compact JSON.
    #[must_use]
    pub fn error_text(&self) -> Option<String> {
        match self {
            Self::Error(serde_json::Value::String(s)) => Some(s.clone()),
            Self::Error(other) => Some(other.to_string()),
            _ => None,
        }
    }
}
