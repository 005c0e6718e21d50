//! Log stream manager.
//!
//! Keeps one push connection open while the dashboard is mounted:
//!
//! ```text
//! disconnected ──mount──► connecting ──open──► connected
//!      ▲                      ▲                    │
//!      │                      └──delay── abnormal close / connect error
//!      └────────── normal or going-away close, unmount ┘
//! ```
//!
//! Incoming lines are deduplicated and kept in a bounded buffer.

mod buffer;
pub mod transport;

pub use buffer::LogBuffer;
pub use transport::{
    log_stream_url, CloseCode, Frame, LogConnection, LogTransport, WebSocketTransport,
};

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::events::{DashboardEvent, EventSink};
use crate::models::LogEvent;

/// Push connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Messages on the push channel. Only `log` is consumed.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum StreamPayload {
    Log {
        message: String,
        #[serde(default)]
        timestamp: Option<serde_json::Value>,
    },
    #[serde(other)]
    Other,
}

enum PumpOutcome {
    Closed(CloseCode),
    Unmounted,
}

/// Owns the log buffer and the push connection lifecycle.
#[derive(Clone)]
pub struct LogStreamManager {
    transport: Arc<dyn LogTransport>,
    buffer: Arc<RwLock<LogBuffer>>,
    state: Arc<RwLock<ConnectionState>>,
    connect_attempts: Arc<AtomicU32>,
    reconnect_delay: Duration,
    max_reconnect_attempts: u32,
    events: EventSink,
}

impl LogStreamManager {
    pub fn new(transport: Arc<dyn LogTransport>, config: &Config, events: EventSink) -> Self {
        Self {
            transport,
            buffer: Arc::new(RwLock::new(LogBuffer::new(
                config.log_capacity,
                config.log_dedup_window,
            ))),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            connect_attempts: Arc::new(AtomicU32::new(0)),
            reconnect_delay: config.reconnect_delay,
            max_reconnect_attempts: config.max_reconnect_attempts,
            events,
        }
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Buffered lines, oldest first.
    pub async fn entries(&self) -> Vec<LogEvent> {
        self.buffer.read().await.entries()
    }

    /// Total connection attempts since creation.
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    /// Empty the buffer; the connection is left alone.
    pub async fn clear(&self) {
        self.buffer.write().await.clear();
        self.events.emit(DashboardEvent::LogsCleared);
    }

    /// Feed one raw text frame. Returns `true` if a line was buffered.
    pub async fn ingest(&self, raw: &str) -> bool {
        let Some((message, timestamp)) = parse_frame(raw) else {
            return false;
        };

        let appended = self.buffer.write().await.push(message, timestamp);
        if appended {
            self.events.emit(DashboardEvent::LogAppended);
        }
        appended
    }

    pub fn spawn(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move { manager.run(cancel).await })
    }

    /// Connection loop; returns once the stream is closed for good.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut failures: u32 = 0;

        loop {
            self.set_state(ConnectionState::Connecting).await;
            let attempt = self.connect_attempts.fetch_add(1, Ordering::SeqCst) + 1;

            let connected = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.transport.connect() => result,
            };

            let code = match connected {
                Ok(mut connection) => {
                    failures = 0;
                    self.set_state(ConnectionState::Connected).await;
                    tracing::info!(attempt, "Log stream connected");

                    match self.pump(connection.as_mut(), &cancel).await {
                        PumpOutcome::Unmounted => {
                            connection.close(CloseCode::NORMAL).await;
                            break;
                        }
                        PumpOutcome::Closed(code) => code,
                    }
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Log stream connect failed");
                    CloseCode::ABNORMAL
                }
            };

            self.set_state(ConnectionState::Disconnected).await;

            if code.is_deliberate() {
                tracing::info!(%code, "Log stream closed");
                return;
            }
            if cancel.is_cancelled() {
                break;
            }

            failures += 1;
            if self.max_reconnect_attempts > 0 && failures > self.max_reconnect_attempts {
                tracing::warn!(failures, "Log stream unavailable, giving up");
                return;
            }

            tracing::warn!(
                %code,
                failures,
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "Log stream lost, reconnecting"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected).await;
        tracing::debug!("Log stream stopped");
    }

    async fn pump(
        &self,
        connection: &mut dyn LogConnection,
        cancel: &CancellationToken,
    ) -> PumpOutcome {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PumpOutcome::Unmounted,
                frame = connection.next_frame() => match frame {
                    Frame::Text(raw) => {
                        self.ingest(&raw).await;
                    }
                    Frame::Close(code) => return PumpOutcome::Closed(code),
                },
            }
        }
    }

    async fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.write().await;
        if *state != next {
            *state = next;
            self.events.emit(DashboardEvent::ConnectionChanged(next));
        }
    }
}

/// Extract `(message, timestamp)` from a text frame.
///
/// JSON payloads of other types are ignored; plain text is taken as a log line.
fn parse_frame(raw: &str) -> Option<(String, DateTime<Utc>)> {
    let received = Utc::now();
    match serde_json::from_str::<StreamPayload>(raw) {
        Ok(StreamPayload::Log { message, timestamp }) => {
            let timestamp = timestamp
                .as_ref()
                .and_then(parse_timestamp)
                .unwrap_or(received);
            Some((message, timestamp))
        }
        Ok(StreamPayload::Other) => None,
        Err(_) if serde_json::from_str::<serde_json::Value>(raw).is_ok() => {
            tracing::debug!("Ignoring malformed stream payload");
            None
        }
        Err(_) => {
            let line = raw.trim();
            (!line.is_empty()).then(|| (line.to_string(), received))
        }
    }
}

/// Accepts RFC 3339, naive ISO-8601 (taken as UTC) and epoch seconds or milliseconds.
fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            }),
        serde_json::Value::Number(n) => {
            let raw = n.as_f64()?;
            let millis = if raw.abs() >= 1e11 { raw } else { raw * 1000.0 };
            Utc.timestamp_millis_opt(millis as i64).single()
        }
        _ => None,
    }
}
