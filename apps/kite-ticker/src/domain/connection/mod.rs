//! Connection State
//!
//! Lifecycle of the ticker's channel to the quote server. Exactly one state
//! is active at a time and only the session loop changes it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Channel lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No channel, and none being opened.
    #[default]
    Disconnected,
    /// Opening a channel.
    Connecting,
    /// Channel open.
    Open,
    /// Close requested, channel being torn down.
    Closing,
}

impl ConnectionState {
    /// Lowercase state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        }
    }

    /// Numeric value for gauges.
    #[must_use]
    pub const fn as_gauge(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Open => 2,
            Self::Closing => 3,
        }
    }

    /// Whether the channel is open.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
