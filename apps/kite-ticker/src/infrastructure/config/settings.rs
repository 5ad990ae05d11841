//! Ticker Configuration Settings
//!
//! Configuration for the ticker session, built in code or loaded from
//! environment variables.

use std::time::Duration;

use crate::infrastructure::kite::heartbeat::{DEFAULT_PING_INTERVAL, HeartbeatConfig};
use crate::infrastructure::kite::reconnect::ReconnectConfig;

/// Default quote server endpoint.
pub const DEFAULT_ROOT: &str = "wss://ws.kite.trade";

/// Default handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default health server port.
pub const DEFAULT_HEALTH_PORT: u16 = 8083;

/// Connection credentials, issued by the login flow.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    access_token: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(api_key: String, access_token: String) -> Self {
        Self {
            api_key,
            access_token,
        }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Get the access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Complete ticker configuration.
#[derive(Debug, Clone)]
pub struct TickerConfig {
    /// Quote server endpoint, without query string.
    pub root: String,
    /// Connection credentials.
    pub credentials: Credentials,
    /// Reconnect automatically after failures and losses.
    pub reconnect: bool,
    /// Backoff and attempt limits.
    pub reconnect_policy: ReconnectConfig,
    /// Ping interval and pong timeout.
    pub heartbeat: HeartbeatConfig,
    /// Handshake timeout; exceeding it counts as a failed connection.
    pub connect_timeout: Duration,
    /// Health server port (0 = disabled). Used by the binary only.
    pub health_port: u16,
}

impl TickerConfig {
    /// Create a configuration with default settings.
    #[must_use]
    pub fn new(api_key: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            root: DEFAULT_ROOT.to_string(),
            credentials: Credentials::new(api_key.into(), access_token.into()),
            reconnect: true,
            reconnect_policy: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            health_port: DEFAULT_HEALTH_PORT,
        }
    }

    /// Set the quote server endpoint.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    /// Enable or disable automatic reconnection.
    #[must_use]
    pub const fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the attempts allowed per disconnect episode (at most 300).
    #[must_use]
    pub const fn with_reconnect_max_tries(mut self, max_tries: u32) -> Self {
        self.reconnect_policy.max_attempts = max_tries;
        self
    }

    /// Set the first backoff delay (at least 500ms).
    #[must_use]
    pub const fn with_reconnect_min_delay(mut self, delay: Duration) -> Self {
        self.reconnect_policy.initial_delay = delay;
        self
    }

    /// Set the backoff cap (at least 5s).
    #[must_use]
    pub const fn with_reconnect_max_delay(mut self, delay: Duration) -> Self {
        self.reconnect_policy.max_delay = delay;
        self
    }

    /// Randomize backoff delays by up to `factor` of their value.
    #[must_use]
    pub const fn with_reconnect_jitter(mut self, factor: f64) -> Self {
        self.reconnect_policy.jitter_factor = factor;
        self
    }

    /// Set the ping interval; the pong timeout is twice this.
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.heartbeat = HeartbeatConfig::from_ping_interval(interval);
        self
    }

    /// Set the handshake timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from a variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = required(&lookup, "KITE_API_KEY")?;
        let access_token = required(&lookup, "KITE_ACCESS_TOKEN")?;

        let mut config = Self::new(api_key, access_token);

        if let Some(root) = lookup("KITE_TICKER_ROOT").filter(|v| !v.is_empty()) {
            config.root = root;
        }
        config.reconnect = parse_bool(&lookup, "KITE_TICKER_RECONNECT", config.reconnect);

        let policy = &mut config.reconnect_policy;
        policy.max_attempts = parse_u32(&lookup, "KITE_TICKER_RECONNECT_MAX_TRIES", policy.max_attempts);
        policy.max_delay = parse_duration_secs(
            &lookup,
            "KITE_TICKER_RECONNECT_MAX_DELAY_SECS",
            policy.max_delay,
        );
        policy.initial_delay = parse_duration_millis(
            &lookup,
            "KITE_TICKER_RECONNECT_MIN_DELAY_MS",
            policy.initial_delay,
        );
        config.reconnect_policy = config.reconnect_policy.clamped();

        config.heartbeat = HeartbeatConfig::from_ping_interval(parse_duration_millis(
            &lookup,
            "KITE_TICKER_PING_INTERVAL_MS",
            DEFAULT_PING_INTERVAL,
        ));
        config.connect_timeout = parse_duration_secs(
            &lookup,
            "KITE_TICKER_CONNECT_TIMEOUT_SECS",
            config.connect_timeout,
        );
        config.health_port = parse_u16(&lookup, "KITE_TICKER_HEALTH_PORT", config.health_port);

        Ok(config)
    }

    /// Full connection URL, credentials included.
    #[must_use]
    pub fn socket_url(&self) -> String {
        format!(
            "{}?api_key={}&access_token={}",
            self.root,
            self.credentials.api_key(),
            self.credentials.access_token()
        )
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_u16(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u16) -> u16 {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_u32(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u32) -> u32 {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key).map_or(default, |v| match v.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    })
}

fn parse_duration_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const CREDS: [(&str, &str); 2] = [("KITE_API_KEY", "key123"), ("KITE_ACCESS_TOKEN", "tok456")];

    #[test]
    fn credentials_redacted_debug() {
        let creds = Credentials::new("key123".to_string(), "tok456".to_string());
        let debug = format!("{creds:?}");
        assert!(!debug.contains("key123"));
        assert!(!debug.contains("tok456"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn defaults() {
        let config = TickerConfig::new("k", "t");
        assert_eq!(config.root, "wss://ws.kite.trade");
        assert!(config.reconnect);
        assert_eq!(config.reconnect_policy.max_attempts, 50);
        assert_eq!(config.reconnect_policy.max_delay, Duration::from_secs(60));
        assert_eq!(config.heartbeat.ping_interval, Duration::from_millis(2500));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.health_port, 8083);
    }

    #[test]
    fn socket_url_carries_credentials() {
        let config = TickerConfig::new("key123", "tok456").with_root("wss://example.test");
        assert_eq!(
            config.socket_url(),
            "wss://example.test?api_key=key123&access_token=tok456"
        );
    }

    #[test]
    fn missing_credentials() {
        let err = TickerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::MissingEnvVar("KITE_API_KEY".to_string()));

        let err = TickerConfig::from_lookup(lookup(&[
            ("KITE_API_KEY", "k"),
            ("KITE_ACCESS_TOKEN", ""),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::EmptyValue("KITE_ACCESS_TOKEN".to_string()));
    }

    #[test]
    fn from_lookup_defaults() {
        let config = TickerConfig::from_lookup(lookup(&CREDS)).unwrap();
        assert_eq!(config.credentials.api_key(), "key123");
        assert_eq!(config.credentials.access_token(), "tok456");
        assert_eq!(config.root, DEFAULT_ROOT);
        assert_eq!(config.reconnect_policy.initial_delay, Duration::from_secs(2));
    }

    #[test]
    fn from_lookup_overrides_and_clamps() {
        let mut vars = CREDS.to_vec();
        vars.extend([
            ("KITE_TICKER_ROOT", "wss://local.test"),
            ("KITE_TICKER_RECONNECT", "false"),
            ("KITE_TICKER_RECONNECT_MAX_TRIES", "1000"),
            ("KITE_TICKER_RECONNECT_MAX_DELAY_SECS", "1"),
            ("KITE_TICKER_RECONNECT_MIN_DELAY_MS", "100"),
            ("KITE_TICKER_PING_INTERVAL_MS", "1000"),
            ("KITE_TICKER_CONNECT_TIMEOUT_SECS", "5"),
            ("KITE_TICKER_HEALTH_PORT", "0"),
        ]);
        let config = TickerConfig::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.root, "wss://local.test");
        assert!(!config.reconnect);
        assert_eq!(config.reconnect_policy.max_attempts, 300);
        assert_eq!(config.reconnect_policy.max_delay, Duration::from_secs(5));
        assert_eq!(config.reconnect_policy.initial_delay, Duration::from_millis(500));
        assert_eq!(config.heartbeat.pong_timeout, Duration::from_secs(2));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.health_port, 0);
    }

    #[test]
    fn unparseable_values_fall_back() {
        let mut vars = CREDS.to_vec();
        vars.extend([
            ("KITE_TICKER_RECONNECT", "maybe"),
            ("KITE_TICKER_RECONNECT_MAX_TRIES", "lots"),
        ]);
        let config = TickerConfig::from_lookup(lookup(&vars)).unwrap();
        assert!(config.reconnect);
        assert_eq!(config.reconnect_policy.max_attempts, 50);
    }

    #[test]
    fn builder_setters() {
        let config = TickerConfig::new("k", "t")
            .with_reconnect(false)
            .with_reconnect_max_tries(3)
            .with_reconnect_min_delay(Duration::from_secs(1))
            .with_reconnect_max_delay(Duration::from_secs(10))
            .with_reconnect_jitter(0.2)
            .with_ping_interval(Duration::from_secs(1))
            .with_connect_timeout(Duration::from_secs(3));

        assert!(!config.reconnect);
        assert_eq!(config.reconnect_policy.max_attempts, 3);
        assert_eq!(config.reconnect_policy.initial_delay, Duration::from_secs(1));
        assert_eq!(config.reconnect_policy.max_delay, Duration::from_secs(10));
        assert!((config.reconnect_policy.jitter_factor - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.heartbeat.pong_timeout, Duration::from_secs(2));
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
    }
}
