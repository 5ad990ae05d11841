//! Kite Ticker Binary
//!
//! Streams ticks for a list of instruments and logs them.
//!
//! # Usage
//!
//! ```bash
//! KITE_TICKER_TOKENS=408065,884737 KITE_TICKER_MODE=full cargo run --bin kite-ticker
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `KITE_API_KEY`: Kite Connect API key
//! - `KITE_ACCESS_TOKEN`: Session access token
//!
//! ## Optional
//! - `KITE_TICKER_TOKENS`: Comma-separated instrument tokens to subscribe
//! - `KITE_TICKER_MODE`: ltp | quote | full (default: quote)
//! - `KITE_TICKER_ROOT`: Quote server endpoint (default: wss://ws.kite.trade)
//! - `KITE_TICKER_RECONNECT`: Reconnect automatically (default: true)
//! - `KITE_TICKER_RECONNECT_MAX_TRIES`: Attempts per outage (default: 50, max 300)
//! - `KITE_TICKER_RECONNECT_MAX_DELAY_SECS`: Backoff cap (default: 60, min 5)
//! - `KITE_TICKER_RECONNECT_MIN_DELAY_MS`: First backoff delay (default: 2000, min 500)
//! - `KITE_TICKER_CONNECT_TIMEOUT_SECS`: Handshake timeout (default: 30)
//! - `KITE_TICKER_PING_INTERVAL_MS`: Keepalive ping interval (default: 2500)
//! - `KITE_TICKER_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use kite_ticker::infrastructure::health::{HealthServer, HealthServerState};
use kite_ticker::infrastructure::telemetry;
use kite_ticker::{
    InstrumentToken, StreamMode, Tick, TickerConfig, TickerControl, TickerHandler, TickerSession,
    init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Time allowed for the session to close its channel after a signal.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "failed to install rustls crypto provider")?;

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Kite ticker");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = TickerConfig::from_env()?;
    log_config(&config);

    let tokens = parse_tokens(&std::env::var("KITE_TICKER_TOKENS").unwrap_or_default())?;
    let mode = parse_mode(std::env::var("KITE_TICKER_MODE").ok().as_deref())?;

    let shutdown_token = CancellationToken::new();
    let health_port = config.health_port;

    let (session, handle) = TickerSession::new(config, Arc::new(LoggingHandler));

    if tokens.is_empty() {
        tracing::warn!("KITE_TICKER_TOKENS is empty, connecting without subscriptions");
    } else {
        handle.subscribe(&tokens)?;
        handle.set_mode(mode, &tokens)?;
        tracing::info!(count = tokens.len(), mode = %mode, "Subscriptions queued");
    }

    if health_port == 0 {
        tracing::info!("Health server disabled");
    } else {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            handle.clone(),
        ));
        let health_server = HealthServer::new(health_port, health_state, shutdown_token.clone());
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    let mut session_task = session.spawn();

    tokio::select! {
        () = await_shutdown() => {
            handle.close();
            tracing::info!(
                timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                "Graceful shutdown started"
            );
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut session_task).await {
                Ok(result) => log_session_result(result),
                Err(_) => {
                    tracing::warn!("Session did not stop in time, aborting");
                    session_task.abort();
                }
            }
        }
        result = &mut session_task => log_session_result(result),
    }

    shutdown_token.cancel();

    tracing::info!("Kite ticker stopped");
    Ok(())
}

/// Logs connection lifecycle and tick batches.
struct LoggingHandler;

impl TickerHandler for LoggingHandler {
    fn on_ticks(&self, _ticker: &dyn TickerControl, ticks: &[Tick]) {
        for tick in ticks {
            tracing::info!(
                token = %tick.instrument_token,
                mode = %tick.mode,
                last_price = %tick.last_price,
                volume = tick.volume,
                "Tick"
            );
        }
    }

    fn on_connect(&self, _ticker: &dyn TickerControl) {
        tracing::info!("Ticker connected");
    }

    fn on_close(&self, _ticker: &dyn TickerControl, code: u16, reason: &str) {
        tracing::info!(code, reason, "Ticker closed");
    }

    fn on_error(&self, _ticker: &dyn TickerControl, code: u16, reason: &str) {
        tracing::error!(code, reason, "Ticker error");
    }

    fn on_reconnect(&self, _ticker: &dyn TickerControl, attempt: u32) {
        tracing::warn!(attempt, "Ticker reconnecting");
    }

    fn on_noreconnect(&self, _ticker: &dyn TickerControl) {
        tracing::error!("Ticker gave up reconnecting");
    }

    fn on_order_update(&self, _ticker: &dyn TickerControl, data: &serde_json::Value) {
        tracing::info!(order = %data, "Order update");
    }
}

fn log_session_result(
    result: Result<(TickerSession, Result<(), kite_ticker::TickerError>), tokio::task::JoinError>,
) {
    match result {
        Ok((session, Ok(()))) => tracing::info!(?session, "Ticker session finished"),
        Ok((session, Err(e))) => tracing::error!(error = %e, ?session, "Ticker session failed"),
        Err(e) => tracing::error!(error = %e, "Ticker session task panicked"),
    }
}

/// Parse a comma-separated token list, ignoring blanks.
fn parse_tokens(raw: &str) -> anyhow::Result<Vec<InstrumentToken>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .map(InstrumentToken::new)
                .with_context(|| format!("invalid instrument token {s:?} in KITE_TICKER_TOKENS"))
        })
        .collect()
}

fn parse_mode(raw: Option<&str>) -> anyhow::Result<StreamMode> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(StreamMode::default()),
        Some(s) => StreamMode::from_str_case_insensitive(s)
            .with_context(|| format!("invalid KITE_TICKER_MODE {s:?}, expected ltp, quote or full")),
    }
}

/// Log the parsed configuration.
fn log_config(config: &TickerConfig) {
    tracing::info!(
        root = %config.root,
        api_key = config.credentials.api_key(),
        reconnect = config.reconnect,
        max_tries = config.reconnect_policy.max_attempts,
        health_port = config.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        min_delay_ms = u64::try_from(config.reconnect_policy.initial_delay.as_millis()).unwrap_or(u64::MAX),
        max_delay_secs = config.reconnect_policy.max_delay.as_secs(),
        ping_interval_ms = u64::try_from(config.heartbeat.ping_interval.as_millis()).unwrap_or(u64::MAX),
        connect_timeout_secs = config.connect_timeout.as_secs(),
        "Connection tuning"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
