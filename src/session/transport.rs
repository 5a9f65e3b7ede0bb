//! Transport seam between the session state machine and the wire.
//!
//! The session is generic over [`Transport`] so its lifecycle logic (backoff,
//! heartbeat, teardown) can be exercised against a scripted in-memory
//! connection. [`WsTransport`] is the production implementation over
//! tokio-tungstenite.

use crate::error::StreamError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use url::Url;

/// Normal closure, sent on explicit unsubscribe. Never triggers reconnection.
pub const CLOSE_CODE_NORMAL: u16 = 1000;

/// Close code used when the session force-closes a stale or superseded
/// connection. Treated as abnormal, triggering the reconnection policy.
pub const CLOSE_CODE_GOING_AWAY: u16 = 1001;

/// Inbound/outbound frame, independent of the underlying socket library.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Text(String),
    Ping,
    Pong,
    Close(Option<u16>),
}

/// One live connection handle. At most one exists per session at any time.
#[async_trait]
pub trait Connection: Send {
    /// Receive the next frame; `None` means the stream ended.
    async fn recv(&mut self) -> Option<Result<Frame, StreamError>>;

    async fn send(&mut self, frame: Frame) -> Result<(), StreamError>;

    async fn close(&mut self, code: u16) -> Result<(), StreamError>;
}

/// Connection factory used by the session on every (re)connect.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Conn: Connection;

    async fn connect(&self, url: &str) -> Result<Self::Conn, StreamError>;
}

/// Production WebSocket transport.
#[derive(Copy, Clone, Debug, Default)]
pub struct WsTransport;

pub struct WsConnection {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    type Conn = WsConnection;

    async fn connect(&self, url: &str) -> Result<Self::Conn, StreamError> {
        let url = Url::parse(url).map_err(|error| StreamError::Transport(error.to_string()))?;
        connect_async(url.as_str())
            .await
            .map(|(inner, _response)| WsConnection { inner })
            .map_err(|error| StreamError::Transport(error.to_string()))
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn recv(&mut self) -> Option<Result<Frame, StreamError>> {
        loop {
            return match self.inner.next().await? {
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.to_string()))),
                Ok(Message::Ping(_)) => Some(Ok(Frame::Ping)),
                Ok(Message::Pong(_)) => Some(Ok(Frame::Pong)),
                Ok(Message::Close(frame)) => {
                    Some(Ok(Frame::Close(frame.map(|f| u16::from(f.code)))))
                }
                // Binary frames are not part of the market-data contract
                Ok(_) => continue,
                Err(error) => Some(Err(StreamError::Transport(error.to_string()))),
            };
        }
    }

    async fn send(&mut self, frame: Frame) -> Result<(), StreamError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Ping => Message::Ping(vec![].into()),
            Frame::Pong => Message::Pong(vec![].into()),
            Frame::Close(code) => Message::Close(code.map(|code| CloseFrame {
                code: CloseCode::from(code),
                reason: "".into(),
            })),
        };

        self.inner
            .send(message)
            .await
            .map_err(|error| StreamError::Transport(error.to_string()))
    }

    async fn close(&mut self, code: u16) -> Result<(), StreamError> {
        self.inner
            .close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: "".into(),
            }))
            .await
            .map_err(|error| StreamError::Transport(error.to_string()))
    }
}
