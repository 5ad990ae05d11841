//! Application Layer - Port definitions and handler adapters.
//!
//! This layer contains the port interfaces that decouple the ticker session
//! from the transport and from the host application, plus adapters that
//! turn callbacks into messages.

/// Port interfaces for the transport, callbacks, and commands.
pub mod ports;

/// Application services built on the ports.
pub mod services;
