//! Kite Ticker Client
//!
//! Streaming client for the Kite quote server.
//!
//! # Protocol
//!
//! - Binary frames carry batches of length-prefixed tick packets
//! - Text frames carry JSON commands (outbound) and order updates or
//!   errors (inbound)
//! - WebSocket ping/pong keeps the channel alive
//!
//! # Modules
//!
//! - `framing`: binary message splitting
//! - `decoder`: tick packet decoding
//! - `messages`: JSON command and server message types
//! - `codec`: frame-level encode/decode
//! - `heartbeat`: ping scheduling and pong staleness detection
//! - `reconnect`: exponential backoff policy
//! - `transport`: WebSocket [`Connector`](crate::application::ports::Connector)
//! - `ticker`: session event loop and control handle

pub mod codec;
pub mod decoder;
pub mod framing;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;
pub mod ticker;
pub mod transport;

pub use codec::{CodecError, TickCodec};
pub use decoder::{DecodeError, decode_packet};
pub use framing::{FrameError, Packets, split_packets};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor, HeartbeatState};
pub use messages::{ServerMessage, TickerCommand};
pub use reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
pub use ticker::{TickerError, TickerHandle, TickerSession};
pub use transport::WsConnector;
