//! Configuration Module
//!
//! Configuration loading for the ticker session and the demo binary.

mod settings;

pub use settings::{
    ConfigError, Credentials, DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEALTH_PORT, DEFAULT_ROOT,
    TickerConfig,
};
