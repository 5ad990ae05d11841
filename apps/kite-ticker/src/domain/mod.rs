//! Domain Layer - Core market data types and subscription state.
//!
//! This layer contains the instrument, tick, and subscription types with no
//! knowledge of the wire protocol or the transport.

/// Connection lifecycle state.
pub mod connection;

/// Instrument tokens, segments, and streaming modes.
pub mod instrument;

/// Decoded tick types.
pub mod streaming;

/// Subscription registry.
pub mod subscription;
