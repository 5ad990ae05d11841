//! Ticker Session
//!
//! Public entry point: a [`TickerSession`] that owns the event loop and a
//! cloneable [`TickerHandle`] that issues commands to it.
//!
//! # Event Loop
//!
//! One task owns the channel, the heartbeat events, the backoff timers, and
//! the [`SubscriptionRegistry`]. Handle calls are queued as commands and
//! applied on that task, so the registry has a single writer.
//!
//! ```text
//!            ┌──────────── close() ────────────┐
//!            ▼                                  │
//! Disconnected ──► Connecting ──► Open ──► Closing ──► (exit)
//!      ▲               │            │
//!      │   failed      │   lost     │
//!      └──── backoff ◄─┴────────────┘
//! ```
//!
//! After a reconnect the registry is replayed before `on_connect` fires.
//! The registry outlives a run: when `connect()` returns, the session can be
//! connected again and its subscriptions are replayed on the next open.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    CloseReason, CommandError, Connector, Frame, FrameChannel, FrameSink, TickerControl,
    TickerHandler, TransportError,
};
use crate::domain::connection::ConnectionState;
use crate::domain::instrument::{InstrumentToken, StreamMode};
use crate::domain::subscription::{SubscriptionChanges, SubscriptionRegistry};
use crate::infrastructure::config::TickerConfig;
use crate::infrastructure::kite::codec::TickCodec;
use crate::infrastructure::kite::framing::is_heartbeat;
use crate::infrastructure::kite::heartbeat::{
    HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor, HeartbeatState,
};
use crate::infrastructure::kite::messages::{ServerMessage, TickerCommand};
use crate::infrastructure::kite::reconnect::{ReconnectError, ReconnectPolicy};
use crate::infrastructure::kite::transport::WsConnector;
use crate::infrastructure::metrics::{self, DropReason, MessageKind};

/// Close code sent when the client closes the channel.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close code reported when the server sent no code.
pub const NO_STATUS_RECEIVED: u16 = 1005;
/// Close code reported when the channel dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end a ticker session.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TickerError {
    /// Reconnection gave up.
    #[error(transparent)]
    Reconnect(#[from] ReconnectError),

    /// The channel could not be opened and retrying is off.
    #[error("connection failed: {0}")]
    Transport(#[from] TransportError),
}

// =============================================================================
// Handle
// =============================================================================

enum Command {
    Subscribe(Vec<InstrumentToken>),
    Unsubscribe(Vec<InstrumentToken>),
    SetMode(StreamMode, Vec<InstrumentToken>),
    Snapshot(oneshot::Sender<HashMap<InstrumentToken, StreamMode>>),
}

/// Retry and cancellation flags shared by a session and its handles.
#[derive(Debug)]
struct RunControl {
    retry: AtomicBool,
    retry_changed: Notify,
    cancel: Mutex<CancellationToken>,
}

impl RunControl {
    fn new() -> Self {
        Self {
            retry: AtomicBool::new(true),
            retry_changed: Notify::new(),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    fn retry(&self) -> bool {
        self.retry.load(Ordering::SeqCst)
    }

    fn stop_retry(&self) {
        self.retry.store(false, Ordering::SeqCst);
        self.retry_changed.notify_one();
    }

    fn cancel(&self) {
        self.stop_retry();
        self.cancel.lock().cancel();
    }

    fn token(&self) -> CancellationToken {
        self.cancel.lock().clone()
    }

    /// Clear `stop_retry()` and `close()` once a run has ended.
    fn rearm(&self) {
        *self.cancel.lock() = CancellationToken::new();
        self.retry.store(true, Ordering::SeqCst);
    }
}

/// Cloneable control handle for a ticker session.
///
/// Commands are queued and applied by the session. While no run is active
/// they wait for the next `connect()` or [`TickerSession::subscriptions`].
/// Once the session is dropped, commands fail with
/// [`CommandError::SessionEnded`].
#[derive(Debug, Clone)]
pub struct TickerHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    run: Arc<RunControl>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subscribe(t) => f.debug_tuple("Subscribe").field(&t.len()).finish(),
            Self::Unsubscribe(t) => f.debug_tuple("Unsubscribe").field(&t.len()).finish(),
            Self::SetMode(m, t) => f.debug_tuple("SetMode").field(m).field(&t.len()).finish(),
            Self::Snapshot(_) => f.write_str("Snapshot"),
        }
    }
}

impl TickerHandle {
    fn send(&self, command: Command) -> Result<(), CommandError> {
        self.commands
            .send(command)
            .map_err(|_| CommandError::SessionEnded)
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Snapshot of the subscription registry.
    ///
    /// Answered by a running session; between runs the reply waits for the
    /// next `connect()`.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::SessionEnded` if the session was dropped.
    pub async fn subscriptions(&self) -> Result<HashMap<InstrumentToken, StreamMode>, CommandError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| CommandError::SessionEnded)
    }
}

impl TickerControl for TickerHandle {
    fn subscribe(&self, tokens: &[InstrumentToken]) -> Result<(), CommandError> {
        self.send(Command::Subscribe(tokens.to_vec()))
    }

    fn unsubscribe(&self, tokens: &[InstrumentToken]) -> Result<(), CommandError> {
        self.send(Command::Unsubscribe(tokens.to_vec()))
    }

    fn set_mode(&self, mode: StreamMode, tokens: &[InstrumentToken]) -> Result<(), CommandError> {
        self.send(Command::SetMode(mode, tokens.to_vec()))
    }

    fn stop_retry(&self) {
        self.run.stop_retry();
    }

    fn close(&self) {
        self.run.cancel();
    }

    fn is_connected(&self) -> bool {
        self.state().is_open()
    }
}

// =============================================================================
// Session
// =============================================================================

/// A ticker session, ready to connect.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use kite_ticker::application::ports::{TickerControl, TickerHandler};
/// use kite_ticker::domain::instrument::{InstrumentToken, StreamMode};
/// use kite_ticker::domain::streaming::Tick;
/// use kite_ticker::infrastructure::config::TickerConfig;
/// use kite_ticker::infrastructure::kite::ticker::TickerSession;
///
/// struct Printer;
///
/// impl TickerHandler for Printer {
///     fn on_ticks(&self, _ticker: &dyn TickerControl, ticks: &[Tick]) {
///         println!("{ticks:?}");
///     }
/// }
///
/// async fn example() {
///     let config = TickerConfig::new("api_key", "access_token");
///     let (session, handle) = TickerSession::new(config, Arc::new(Printer));
///
///     let token = InstrumentToken::new(738_561);
///     handle.subscribe(&[token]).unwrap();
///     handle.set_mode(StreamMode::Full, &[token]).unwrap();
///
///     let task = session.spawn();
///     // ...
///     handle.close();
///     if let Ok((session, result)) = task.await {
///         // `session` keeps its subscriptions and can connect again.
///         println!("{result:?} {session:?}");
///     }
/// }
/// ```
pub struct TickerSession {
    url: String,
    connector: Arc<dyn Connector>,
    handler: Arc<dyn TickerHandler>,
    control: TickerHandle,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    registry: SubscriptionRegistry,
    policy: ReconnectPolicy,
    codec: TickCodec,
    heartbeat: HeartbeatConfig,
    connect_timeout: Duration,
    reconnect: bool,
}

impl std::fmt::Debug for TickerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickerSession")
            .field("state", &*self.state_tx.borrow())
            .field("subscriptions", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// How a connection attempt ended.
enum Opened {
    Channel(FrameChannel),
    Failed(TransportError),
    Cancelled,
}

/// Why an open channel stopped.
enum Disconnect {
    /// `close()` was called.
    Closed,
    /// Never opened.
    Failed(TransportError),
    /// Dropped after opening.
    Lost,
}

enum Backoff {
    Retry,
    Stopped,
    Exhausted(u32),
}

impl TickerSession {
    /// Create a session that connects over WebSocket.
    #[must_use]
    pub fn new(config: TickerConfig, handler: Arc<dyn TickerHandler>) -> (Self, TickerHandle) {
        Self::with_connector(config, Arc::new(WsConnector::new()), handler)
    }

    /// Create a session over a custom transport.
    #[must_use]
    pub fn with_connector(
        config: TickerConfig,
        connector: Arc<dyn Connector>,
        handler: Arc<dyn TickerHandler>,
    ) -> (Self, TickerHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let control = TickerHandle {
            commands: commands_tx,
            state: state_rx,
            run: Arc::new(RunControl::new()),
        };

        let session = Self {
            url: config.socket_url(),
            connector,
            handler,
            control: control.clone(),
            commands,
            state_tx,
            cancel: CancellationToken::new(),
            registry: SubscriptionRegistry::new(),
            policy: ReconnectPolicy::new(config.reconnect_policy.clamped()),
            codec: TickCodec::new(),
            heartbeat: config.heartbeat,
            connect_timeout: config.connect_timeout,
            reconnect: config.reconnect,
        };

        (session, control)
    }

    /// Handle for this session.
    #[must_use]
    pub fn handle(&self) -> TickerHandle {
        self.control.clone()
    }

    /// Run the session on a background task.
    ///
    /// The task hands the session back with the run's result so it can be
    /// connected again.
    pub fn spawn(mut self) -> JoinHandle<(Self, Result<(), TickerError>)> {
        tokio::spawn(async move {
            let result = self.connect().await;
            (self, result)
        })
    }

    /// Connect and run the session on the current task.
    ///
    /// Returns after `close()`, after the channel stops with retrying off,
    /// or when reconnect attempts run out. The session keeps its
    /// subscriptions and handles, and a later call starts a new run with a
    /// fresh attempt budget. A `close()` issued while no run is active ends
    /// the next run before it connects.
    ///
    /// # Errors
    ///
    /// Returns `TickerError::Reconnect` when attempts are exhausted, or
    /// `TickerError::Transport` if a connection attempt failed with
    /// retrying off.
    pub async fn connect(&mut self) -> Result<(), TickerError> {
        self.cancel = self.control.run.token();
        self.policy.reset();

        let result = self.run_loop().await;

        self.control.run.rearm();
        self.set_state(ConnectionState::Disconnected);
        tracing::info!(ok = result.is_ok(), "Ticker session ended");
        result
    }

    /// Registry contents, after applying any commands queued while idle.
    #[must_use]
    pub fn subscriptions(&mut self) -> HashMap<InstrumentToken, StreamMode> {
        while let Ok(command) = self.commands.try_recv() {
            self.record_offline(command);
        }
        self.registry.snapshot()
    }

    async fn run_loop(&mut self) -> Result<(), TickerError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            let disconnect = match self.open().await {
                Opened::Cancelled => return Ok(()),
                Opened::Failed(e) => {
                    metrics::record_connection_error("connect");
                    tracing::warn!(error = %e, "Connection failed");
                    self.set_state(ConnectionState::Disconnected);
                    Disconnect::Failed(e)
                }
                Opened::Channel(channel) => self.run_connection(channel).await,
            };

            match disconnect {
                Disconnect::Closed => return Ok(()),
                Disconnect::Failed(e) if !self.retry_allowed() => return Err(e.into()),
                Disconnect::Lost if !self.retry_allowed() => return Ok(()),
                Disconnect::Failed(_) | Disconnect::Lost => {}
            }

            match self.backoff().await {
                Backoff::Retry => {}
                Backoff::Stopped => return Ok(()),
                Backoff::Exhausted(attempts) => {
                    return Err(ReconnectError::MaxAttemptsExceeded(attempts).into());
                }
            }
        }
    }

    fn retry_allowed(&self) -> bool {
        self.reconnect && self.control.run.retry() && !self.cancel.is_cancelled()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Connection state changed");
            metrics::set_connection_state(state);
        }
    }

    // -------------------------------------------------------------------------
    // Connecting
    // -------------------------------------------------------------------------

    async fn open(&mut self) -> Opened {
        self.set_state(ConnectionState::Connecting);
        tracing::info!(attempt = self.policy.attempt_count(), "Connecting to quote server");

        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        let connect_timeout = self.connect_timeout;
        let connect = tokio::time::timeout(connect_timeout, async move {
            connector.connect(&url).await
        });
        tokio::pin!(connect);

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => return Opened::Cancelled,

                result = &mut connect => {
                    return match result {
                        Ok(Ok(channel)) => Opened::Channel(channel),
                        Ok(Err(e)) => Opened::Failed(e),
                        Err(_) => Opened::Failed(TransportError::Timeout(connect_timeout)),
                    };
                }

                Some(command) = self.commands.recv() => self.record_offline(command),
            }
        }
    }

    // -------------------------------------------------------------------------
    // Open channel
    // -------------------------------------------------------------------------

    async fn run_connection(&mut self, channel: FrameChannel) -> Disconnect {
        let FrameChannel {
            mut sink,
            mut stream,
        } = channel;

        self.set_state(ConnectionState::Open);
        tracing::info!(subscriptions = self.registry.len(), "Connected to quote server");

        if !self.registry.is_empty() {
            if let Err(e) = self.resubscribe_all(&mut sink).await {
                return self.lost(ABNORMAL_CLOSURE, &e.to_string(), false);
            }
        }
        self.policy.reset();
        self.handler.on_connect(&self.control);

        let hb_state = Arc::new(HeartbeatState::new());
        let (hb_tx, mut hb_rx) = mpsc::channel(8);
        let hb_cancel = self.cancel.child_token();
        let _hb_guard = hb_cancel.clone().drop_guard();
        tokio::spawn(
            HeartbeatMonitor::new(self.heartbeat, hb_state.clone(), hb_tx, hb_cancel).run(),
        );

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    return self.close_channel(&mut sink).await;
                }

                Some(command) = self.commands.recv() => {
                    if let Err(e) = self.apply(command, &mut sink).await {
                        return self.lost(ABNORMAL_CLOSURE, &e.to_string(), false);
                    }
                }

                Some(event) = hb_rx.recv() => match event {
                    HeartbeatEvent::SendPing => {
                        hb_state.mark_ping_sent();
                        if let Err(e) = sink.send(Frame::Ping(Vec::new())).await {
                            return self.lost(ABNORMAL_CLOSURE, &e.to_string(), false);
                        }
                    }
                    HeartbeatEvent::Timeout => {
                        metrics::record_connection_error("heartbeat");
                        return self.lost(ABNORMAL_CLOSURE, "heartbeat timeout", false);
                    }
                },

                frame = stream.next() => match frame {
                    Some(Ok(frame)) => {
                        if let Some(disconnect) = self.handle_frame(frame, &hb_state) {
                            return disconnect;
                        }
                    }
                    Some(Err(e)) => {
                        metrics::record_connection_error("receive");
                        return self.lost(ABNORMAL_CLOSURE, &e.to_string(), false);
                    }
                    None => {
                        metrics::record_connection_error("eof");
                        return self.lost(ABNORMAL_CLOSURE, "connection dropped", false);
                    }
                },
            }
        }
    }

    fn handle_frame(&self, frame: Frame, hb_state: &HeartbeatState) -> Option<Disconnect> {
        match frame {
            Frame::Binary(data) => {
                self.handler.on_message(&self.control, &data, true);
                if is_heartbeat(&data) {
                    metrics::record_message_received(MessageKind::Heartbeat);
                    return None;
                }
                metrics::record_message_received(MessageKind::Binary);

                match self.codec.decode_binary(&data) {
                    Ok(ticks) if !ticks.is_empty() => self.handler.on_ticks(&self.control, &ticks),
                    Ok(_) => {}
                    Err(e) => {
                        metrics::record_dropped(DropReason::Message);
                        tracing::warn!(error = %e, len = data.len(), "Dropping malformed message");
                    }
                }
                None
            }
            Frame::Text(text) => {
                self.handler.on_message(&self.control, text.as_bytes(), false);
                metrics::record_message_received(MessageKind::Text);
                self.handle_text(&text);
                None
            }
            // The transport answers pings.
            Frame::Ping(_) => None,
            Frame::Pong(_) => {
                hb_state.record_pong();
                None
            }
            Frame::Close(reason) => {
                let (code, reason) =
                    reason.map_or((NO_STATUS_RECEIVED, String::new()), |r| (r.code, r.reason));
                Some(self.lost(code, &reason, true))
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match self.codec.decode_text(text) {
            Ok(ServerMessage::Order(data)) => self.handler.on_order_update(&self.control, &data),
            Ok(message @ ServerMessage::Error(_)) => {
                let reason = message.error_text().unwrap_or_default();
                tracing::warn!(reason = %reason, "Server reported error");
                self.handler.on_error(&self.control, 0, &reason);
            }
            Ok(ServerMessage::Other(kind)) => {
                tracing::debug!(kind = %kind, "Ignoring server message");
            }
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring unparseable text message");
            }
        }
    }

    async fn close_channel(&mut self, sink: &mut FrameSink) -> Disconnect {
        self.set_state(ConnectionState::Closing);
        tracing::info!("Closing connection");

        let close = Frame::Close(Some(CloseReason::new(NORMAL_CLOSURE, "client closed")));
        if let Err(e) = sink.send(close).await {
            tracing::debug!(error = %e, "Close frame not delivered");
        }
        let _ = sink.close().await;

        self.set_state(ConnectionState::Disconnected);
        self.handler.on_close(&self.control, NORMAL_CLOSURE, "client closed");
        Disconnect::Closed
    }

    fn lost(&self, code: u16, reason: &str, clean: bool) -> Disconnect {
        self.set_state(ConnectionState::Disconnected);
        if clean {
            tracing::info!(code, reason = %reason, "Connection closed by server");
        } else {
            tracing::warn!(code, reason = %reason, "Connection lost");
            self.handler.on_error(&self.control, code, reason);
        }
        self.handler.on_close(&self.control, code, reason);
        Disconnect::Lost
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Apply a command to the registry. Returns the upstream changes, or
    /// `None` for a snapshot request.
    fn record(&mut self, command: Command) -> Option<SubscriptionChanges> {
        let changes = match command {
            Command::Subscribe(tokens) => self.registry.subscribe(&tokens),
            Command::Unsubscribe(tokens) => self.registry.unsubscribe(&tokens),
            Command::SetMode(mode, tokens) => self.registry.set_mode(mode, &tokens),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.registry.snapshot());
                return None;
            }
        };
        metrics::set_subscriptions(self.registry.len());
        Some(changes)
    }

    /// Apply a command while no channel is open.
    fn record_offline(&mut self, command: Command) {
        if self.record(command).is_some_and(|changes| !changes.is_empty()) {
            tracing::debug!("Channel not open, change kept for resubscription");
        }
    }

    /// Apply a command and send the resulting changes upstream.
    async fn apply(&mut self, command: Command, sink: &mut FrameSink) -> Result<(), TransportError> {
        match self.record(command) {
            Some(changes) => self.send_changes(changes, sink).await,
            None => Ok(()),
        }
    }

    async fn send_changes(
        &self,
        changes: SubscriptionChanges,
        sink: &mut FrameSink,
    ) -> Result<(), TransportError> {
        if !changes.subscribe.is_empty() {
            self.send_command(sink, TickerCommand::Subscribe(changes.subscribe))
                .await?;
        }
        if !changes.unsubscribe.is_empty() {
            self.send_command(sink, TickerCommand::Unsubscribe(changes.unsubscribe))
                .await?;
        }
        if let Some(group) = changes.mode {
            self.send_command(sink, TickerCommand::Mode(group.mode, group.tokens))
                .await?;
        }
        Ok(())
    }

    /// Replay the registry: one subscribe and one mode command per mode.
    async fn resubscribe_all(&self, sink: &mut FrameSink) -> Result<(), TransportError> {
        let groups = self.registry.mode_groups();
        tracing::info!(
            groups = groups.len(),
            tokens = self.registry.len(),
            "Resubscribing"
        );

        for group in groups {
            self.send_command(sink, TickerCommand::Subscribe(group.tokens.clone()))
                .await?;
            self.send_command(sink, TickerCommand::Mode(group.mode, group.tokens))
                .await?;
        }
        Ok(())
    }

    async fn send_command(
        &self,
        sink: &mut FrameSink,
        command: TickerCommand,
    ) -> Result<(), TransportError> {
        let json = match self.codec.encode(&command) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, action = command.action(), "Failed to encode command");
                return Ok(());
            }
        };

        sink.send(Frame::Text(json)).await?;
        metrics::record_command_sent(command.action());
        tracing::debug!(
            action = command.action(),
            tokens = command.token_count(),
            "Sent command"
        );
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reconnecting
    // -------------------------------------------------------------------------

    async fn backoff(&mut self) -> Backoff {
        let Some(delay) = self.policy.next_delay() else {
            let attempts = self.policy.attempt_count();
            metrics::record_reconnect_exhausted();
            tracing::error!(attempts, "Maximum reconnect attempts exhausted");
            self.handler.on_noreconnect(&self.control);
            return Backoff::Exhausted(attempts);
        };

        let attempt = self.policy.attempt_count();
        metrics::record_reconnect();
        tracing::info!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Reconnecting"
        );
        self.handler.on_reconnect(&self.control, attempt);

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => return Backoff::Stopped,

                () = self.control.run.retry_changed.notified() => {
                    if !self.retry_allowed() {
                        return Backoff::Stopped;
                    }
                }

                () = &mut sleep => {
                    return if self.retry_allowed() {
                        Backoff::Retry
                    } else {
                        Backoff::Stopped
                    };
                }

                Some(command) = self.commands.recv() => self.record_offline(command),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{MockConnector, NoopHandler};
    use futures::channel::mpsc as fmpsc;
    use parking_lot::Mutex;

    fn config() -> TickerConfig {
        TickerConfig::new("key", "token")
            .with_root("wss://test.invalid")
            .with_reconnect_max_tries(3)
            .with_reconnect_min_delay(Duration::from_secs(1))
            .with_reconnect_max_delay(Duration::from_secs(5))
    }

    /// In-memory channel: returns the frames the client sent and a sender
    /// for frames the server pushes.
    fn memory_channel() -> (
        FrameChannel,
        fmpsc::UnboundedReceiver<Frame>,
        fmpsc::UnboundedSender<Result<Frame, TransportError>>,
    ) {
        let (client_tx, client_rx) = fmpsc::unbounded();
        let (server_tx, server_rx) = fmpsc::unbounded();
        let channel = FrameChannel {
            sink: Box::pin(client_tx.sink_map_err(|e| TransportError::SendFailed(e.to_string()))),
            stream: Box::pin(server_rx),
        };
        (channel, client_rx, server_tx)
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl TickerHandler for Recorder {
        fn on_connect(&self, _ticker: &dyn TickerControl) {
            self.events.lock().push("connect".to_string());
        }
        fn on_close(&self, _ticker: &dyn TickerControl, code: u16, _reason: &str) {
            self.events.lock().push(format!("close {code}"));
        }
        fn on_error(&self, _ticker: &dyn TickerControl, code: u16, _reason: &str) {
            self.events.lock().push(format!("error {code}"));
        }
        fn on_noreconnect(&self, _ticker: &dyn TickerControl) {
            self.events.lock().push("noreconnect".to_string());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connect_uses_socket_url() {
        let mut connector = MockConnector::new();
        let (channel, _client_rx, _server_tx) = memory_channel();
        let mut channel = Some(channel);
        connector
            .expect_connect()
            .withf(|url| url == "wss://test.invalid?api_key=key&access_token=token")
            .times(1)
            .returning(move |_| channel.take().ok_or_else(|| TransportError::ConnectionFailed("used".into())));

        let (session, handle) =
            TickerSession::with_connector(config(), Arc::new(connector), Arc::new(NoopHandler));
        let task = session.spawn();

        let mut state = handle.watch_state();
        state.wait_for(|s| s.is_open()).await.unwrap();
        assert!(handle.is_connected());

        handle.close();
        let (_session, result) = task.await.unwrap();
        result.unwrap();
        assert_eq!(handle.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connect_without_reconnect_returns_error() {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .times(1)
            .returning(|_| Err(TransportError::ConnectionFailed("refused".into())));

        let recorder = Arc::new(Recorder::default());
        let (mut session, _handle) = TickerSession::with_connector(
            config().with_reconnect(false),
            Arc::new(connector),
            recorder.clone(),
        );

        let result = session.connect().await;
        assert!(matches!(result, Err(TickerError::Transport(_))));
        // A connection that never opened fires no close callbacks.
        assert!(recorder.events.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_fires_once() {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .times(4)
            .returning(|_| Err(TransportError::ConnectionFailed("refused".into())));

        let recorder = Arc::new(Recorder::default());
        let (mut session, _handle) =
            TickerSession::with_connector(config(), Arc::new(connector), recorder.clone());

        let result = session.connect().await;
        assert!(matches!(
            result,
            Err(TickerError::Reconnect(ReconnectError::MaxAttemptsExceeded(3)))
        ));
        assert_eq!(*recorder.events.lock(), vec!["noreconnect".to_string()]);
    }

    /// Connector whose handshake never completes.
    struct Hanging;

    #[async_trait::async_trait]
    impl Connector for Hanging {
        async fn connect(&self, _url: &str) -> Result<FrameChannel, TransportError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_counts_as_failure() {
        let (mut session, _handle) = TickerSession::with_connector(
            config()
                .with_reconnect(false)
                .with_connect_timeout(Duration::from_secs(7)),
            Arc::new(Hanging),
            Arc::new(NoopHandler),
        );

        let start = tokio::time::Instant::now();
        let result = session.connect().await;
        assert!(matches!(
            result,
            Err(TickerError::Transport(TransportError::Timeout(_)))
        ));
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn close_before_run_exits_immediately() {
        let connector = MockConnector::new();
        let (mut session, handle) =
            TickerSession::with_connector(config(), Arc::new(connector), Arc::new(NoopHandler));

        handle.close();
        session.connect().await.unwrap();

        // The session outlives the run, so the handle still reaches it.
        handle.subscribe(&[InstrumentToken::new(1)]).unwrap();
        handle
            .set_mode(StreamMode::Full, &[InstrumentToken::new(1)])
            .unwrap();
        assert_eq!(
            session.subscriptions(),
            HashMap::from([(InstrumentToken::new(1), StreamMode::Full)])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn commands_are_applied_while_connect_is_pending() {
        let (session, handle) = TickerSession::with_connector(
            config().with_connect_timeout(Duration::from_secs(30)),
            Arc::new(Hanging),
            Arc::new(NoopHandler),
        );
        let task = session.spawn();

        let mut state = handle.watch_state();
        state
            .wait_for(|s| *s == ConnectionState::Connecting)
            .await
            .unwrap();

        let start = tokio::time::Instant::now();
        handle.subscribe(&[InstrumentToken::new(5)]).unwrap();
        let snapshot = handle.subscriptions().await.unwrap();

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(
            snapshot,
            HashMap::from([(InstrumentToken::new(5), StreamMode::Quote)])
        );
        assert_eq!(handle.state(), ConnectionState::Connecting);

        handle.close();
        let (_session, result) = task.await.unwrap();
        result.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_retry_cuts_backoff_short() {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .times(1)
            .returning(|_| Err(TransportError::ConnectionFailed("refused".into())));

        struct Attempts(mpsc::UnboundedSender<u32>);

        impl TickerHandler for Attempts {
            fn on_reconnect(&self, _ticker: &dyn TickerControl, attempt: u32) {
                let _ = self.0.send(attempt);
            }
        }

        let (attempts_tx, mut attempts) = mpsc::unbounded_channel();
        let (session, handle) = TickerSession::with_connector(
            config()
                .with_reconnect_min_delay(Duration::from_secs(40))
                .with_reconnect_max_delay(Duration::from_secs(60)),
            Arc::new(connector),
            Arc::new(Attempts(attempts_tx)),
        );
        let start = tokio::time::Instant::now();
        let task = session.spawn();

        assert_eq!(attempts.recv().await, Some(1));
        handle.stop_retry();
        let (_session, result) = task.await.unwrap();

        assert!(result.is_ok());
        assert!(start.elapsed() < Duration::from_secs(40));
    }

    #[test]
    fn snapshot_waits_for_session_and_fails_once_dropped() {
        let (session, handle) = TickerSession::with_connector(
            config(),
            Arc::new(MockConnector::new()),
            Arc::new(NoopHandler),
        );

        let mut snapshot = tokio_test::task::spawn(handle.subscriptions());
        tokio_test::assert_pending!(snapshot.poll());

        drop(session);
        assert_eq!(
            tokio_test::assert_ready!(snapshot.poll()),
            Err(CommandError::SessionEnded)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn server_ping_is_left_to_the_transport() {
        let (channel, client_rx, server_tx) = memory_channel();
        let mut connector = MockConnector::new();
        let mut channel = Some(channel);
        connector
            .expect_connect()
            .times(1)
            .returning(move |_| channel.take().ok_or_else(|| TransportError::ConnectionFailed("used".into())));

        server_tx.unbounded_send(Ok(Frame::Ping(vec![7]))).unwrap();
        server_tx
            .unbounded_send(Ok(Frame::Close(Some(CloseReason::new(1000, "bye")))))
            .unwrap();

        let (mut session, _handle) = TickerSession::with_connector(
            config().with_reconnect(false),
            Arc::new(connector),
            Arc::new(NoopHandler),
        );
        session.connect().await.unwrap();

        let sent: Vec<Frame> = client_rx.collect().await;
        assert!(sent.is_empty(), "unexpected frames: {sent:?}");
    }
}
