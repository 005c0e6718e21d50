//! Push channel for backend log lines.
//!
//! [`LogTransport`] opens connections, [`LogConnection`] yields frames. The
//! WebSocket implementation maps every way a socket can end onto a
//! [`CloseCode`] so the manager has a single reconnect decision to make.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Url;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{Error, Result};

/// WebSocket close status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    pub const NORMAL: CloseCode = CloseCode(1000);
    pub const GOING_AWAY: CloseCode = CloseCode(1001);
    /// Close frame without a status code
    pub const NO_STATUS: CloseCode = CloseCode(1005);
    /// Connection lost without a close frame
    pub const ABNORMAL: CloseCode = CloseCode(1006);

    /// Normal and going-away closures are expected shutdowns; everything
    /// else is connection loss.
    pub fn is_deliberate(self) -> bool {
        self == Self::NORMAL || self == Self::GOING_AWAY
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One unit received from the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// The connection is finished.
    Close(CloseCode),
}

/// Opens push connections.
#[async_trait]
pub trait LogTransport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LogConnection>>;
}

/// An open push connection.
#[async_trait]
pub trait LogConnection: Send {
    /// Next frame. After a [`Frame::Close`] the connection must not be polled again.
    async fn next_frame(&mut self) -> Frame;

    /// Close from our side with `code`.
    async fn close(&mut self, code: CloseCode);
}

/// Log stream endpoint for a backend base URL (http -> ws, https -> wss).
pub fn log_stream_url(base_url: &str) -> Result<Url> {
    let mut url =
        Url::parse(base_url).map_err(|e| Error::InvalidUrl(format!("{}: {}", base_url, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(Error::InvalidUrl(base_url.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| Error::InvalidUrl(base_url.to_string()))?;

    url.path_segments_mut()
        .map_err(|_| Error::InvalidUrl(base_url.to_string()))?
        .pop_if_empty()
        .extend(["ws", "logs"]);
    Ok(url)
}

/// WebSocket transport backed by tokio-tungstenite.
pub struct WebSocketTransport {
    url: Url,
}

impl WebSocketTransport {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            url: log_stream_url(base_url)?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl LogTransport for WebSocketTransport {
    async fn connect(&self) -> Result<Box<dyn LogConnection>> {
        let (ws, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::Stream(e.to_string()))?;
        tracing::debug!(url = %self.url, "WebSocket handshake complete");
        Ok(Box::new(WebSocketConnection { ws }))
    }
}

struct WebSocketConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl LogConnection for WebSocketConnection {
    async fn next_frame(&mut self) -> Frame {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Frame::Text(text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return Frame::Text(text),
                    Err(_) => tracing::debug!("Skipping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let code = frame
                        .map(|f| CloseCode(u16::from(f.code)))
                        .unwrap_or(CloseCode::NO_STATUS);
                    return Frame::Close(code);
                }
                // Ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "WebSocket read failed");
                    return Frame::Close(CloseCode::ABNORMAL);
                }
                None => return Frame::Close(CloseCode::ABNORMAL),
            }
        }
    }

    async fn close(&mut self, code: CloseCode) {
        let frame = CloseFrame {
            code: WsCloseCode::from(code.0),
            reason: "".into(),
        };
        if let Err(e) = self.ws.close(Some(frame)).await {
            tracing::debug!(error = %e, "WebSocket close failed");
        }
    }
}
