//! WebSocket Transport
//!
//! [`Connector`] implementation over `tokio-tungstenite`. Every handshake
//! carries the protocol version header and a client user agent.
//! tungstenite queues the pong for every inbound ping and flushes it on the
//! next read, so pings surface as frames for logging only.

use async_trait::async_trait;
use futures::future;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::application::ports::{CloseReason, Connector, Frame, FrameChannel, TransportError};

/// Protocol version sent in the `X-Kite-Version` header.
pub const KITE_VERSION: &str = "3";

/// User agent sent on every handshake.
pub const USER_AGENT: &str = concat!("kite-ticker-rust/", env!("CARGO_PKG_VERSION"));

/// Opens WebSocket channels to the quote server.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl WsConnector {
    /// Create a new connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<FrameChannel, TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert("X-Kite-Version", HeaderValue::from_static(KITE_VERSION));
        headers.insert("User-Agent", HeaderValue::from_static(USER_AGENT));

        let (ws_stream, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        tracing::debug!(status = %response.status(), "WebSocket handshake complete");

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(|e| TransportError::SendFailed(e.to_string()))
            .with(|frame: Frame| future::ready(Ok::<_, TransportError>(to_message(frame))));

        let stream = read.filter_map(|result| {
            future::ready(match result {
                Ok(msg) => from_message(msg).map(Ok),
                Err(e) => Some(Err(TransportError::ReceiveFailed(e.to_string()))),
            })
        });

        Ok(FrameChannel {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data.into()),
        Frame::Ping(data) => Message::Ping(data.into()),
        Frame::Pong(data) => Message::Pong(data.into()),
        Frame::Close(reason) => Message::Close(reason.map(|r| CloseFrame {
            code: CloseCode::from(r.code),
            reason: r.reason.into(),
        })),
    }
}

fn from_message(msg: Message) -> Option<Frame> {
    match msg {
        Message::Text(text) => Some(Frame::Text(text.as_str().to_owned())),
        Message::Binary(data) => Some(Frame::Binary(data.to_vec())),
        Message::Ping(data) => Some(Frame::Ping(data.to_vec())),
        Message::Pong(data) => Some(Frame::Pong(data.to_vec())),
        Message::Close(frame) => Some(Frame::Close(
            frame.map(|f| CloseReason::new(u16::from(f.code), f.reason.as_str())),
        )),
        // Raw frames only surface when reading with a custom config.
        Message::Frame(_) => None,
    }
}
