//! Ticker Codec
//!
//! Decodes inbound frames and encodes outbound commands.
//!
//! - **Binary frames**: framed tick packets, see [`framing`](super::framing)
//!   and [`decoder`](super::decoder)
//! - **Text frames**: JSON order updates and errors
//! - **Commands**: JSON `{"a": ..., "v": ...}` objects
//!
//! A framing error drops the whole message. A decode error drops only the
//! packet; the rest of the batch is still delivered.

use crate::domain::streaming::Tick;
use crate::infrastructure::kite::decoder::decode_packet;
use crate::infrastructure::kite::framing::{FrameError, split_packets};
use crate::infrastructure::kite::messages::{ServerMessage, TickerCommand};
use crate::infrastructure::metrics::{self, DropReason};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary framing failed.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),
}

/// Codec for the ticker's binary and text frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickCodec;

impl TickCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a binary message into ticks.
    ///
    /// Packets with unknown layouts are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Frame` if the message framing is invalid; no
    /// ticks from it are returned.
    pub fn decode_binary(&self, message: &[u8]) -> Result<Vec<Tick>, CodecError> {
        let split = split_packets(message)?;

        if split.trailing > 0 {
            tracing::debug!(
                trailing = split.trailing,
                packets = split.packets.len(),
                "Ignoring trailing bytes after last packet"
            );
        }

        let mut ticks = Vec::with_capacity(split.packets.len());
        for packet in split.packets {
            match decode_packet(packet) {
                Ok(tick) => ticks.push(tick),
                Err(e) => {
                    metrics::record_dropped(DropReason::Packet);
                    tracing::warn!(error = %e, "Skipping undecodable packet");
                }
            }
        }

        metrics::record_ticks_decoded(ticks.len());
        Ok(ticks)
    }

    /// Decode a text message.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Json` if the text is not a server message.
    pub fn decode_text(&self, text: &str) -> Result<ServerMessage, CodecError> {
        Ok(ServerMessage::parse(text)?)
    }

    /// Encode a command as JSON text.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Json` if serialization fails.
    pub fn encode(&self, command: &TickerCommand) -> Result<String, CodecError> {
        Ok(serde_json::to_string(command)?)
    }
}
