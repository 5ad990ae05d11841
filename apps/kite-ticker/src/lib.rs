#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::cast_possible_truncation
    )
)]

//! Kite Ticker - Streaming Market Data Client
//!
//! Keeps a WebSocket connection to the Kite quote server, decodes the
//! binary tick protocol, tracks what the caller subscribed to, and replays
//! those subscriptions whenever the connection is re-established.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no transport knowledge
//!   - `instrument`: Tokens, segments, streaming modes
//!   - `streaming`: Decoded ticks, OHLC, market depth
//!   - `subscription`: Subscription registry
//!   - `connection`: Connection lifecycle state
//!
//! - **Application**: Port definitions and adapters
//!   - `ports`: Transport, control, and callback interfaces
//!   - `services`: Callback-to-channel event forwarding
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `kite`: Framing, decoding, heartbeat, backoff, session loop
//!   - `config`: Environment-driven configuration
//!   - `health`: Health check HTTP endpoint
//!   - `metrics`: Prometheus instrumentation
//!   - `telemetry`: Tracing subscriber and OTLP export
//!
//! # Data Flow
//!
//! ```text
//!                     ┌──────────────┐   packets   ┌─────────┐   ticks
//! Kite quote WS ─────►│   framing    │────────────►│ decoder │──────────► on_ticks
//!       ▲             └──────────────┘             └─────────┘
//!       │  subscribe / mode            ┌──────────────────────┐
//!       └──────────────────────────────│ session + registry   │◄── TickerHandle
//!                                      └──────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core market data types with no external dependencies.
pub mod domain;

/// Application layer - Port definitions and adapters.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::ConnectionState;
pub use domain::instrument::{InstrumentToken, Segment, StreamMode};
pub use domain::streaming::{Depth, DepthLevel, Ohlc, Tick};
pub use domain::subscription::{ModeGroup, SubscriptionChanges, SubscriptionRegistry};

// Ports
pub use application::ports::{
    CloseReason, CommandError, Connector, Frame, FrameChannel, NoopHandler, TickerControl,
    TickerHandler, TransportError,
};
pub use application::services::{EventForwarder, TickerEvent};

// Session
pub use infrastructure::kite::{
    ReconnectConfig, ReconnectError, TickerError, TickerHandle, TickerSession, WsConnector,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, Credentials, TickerConfig};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
