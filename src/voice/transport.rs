//! WebSocket transport for the voice stream.
//!
//! Owns one connection: validate the streaming URL, connect with the token
//! as a query parameter (the negotiated endpoints do not accept custom
//! handshake headers), pump inbound frames through the protocol decoder,
//! and report outbound buffer depth so the sender can react to
//! backpressure.
//!
//! The URL carries the credential, so it is sensitive: log it only through
//! [`redacted`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::{VoiceError, VoiceResult};

use super::protocol::{decode_frame, ClientMessage, ServerMessage};

/// Hostname (or parent domain) every streaming URL must resolve under.
pub const TRUSTED_STREAMING_DOMAIN: &str = "voxlate.com";

/// Outbound buffered bytes beyond which the sender should slow down.
/// A signal, not a hard error.
pub const OUTBOUND_BUFFER_LIMIT: usize = 1024 * 1024;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

// ── Credentials ────────────────────────────────────────────────────

/// One-shot WebSocket credential produced by negotiation. Consumed exactly
/// once to open one connection.
#[derive(Clone)]
pub struct ConnectionCredential {
    pub streaming_url: String,
    pub token: String,
}

impl std::fmt::Debug for ConnectionCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCredential")
            .field("streaming_url", &self.streaming_url)
            .field("token", &"[redacted]")
            .finish()
    }
}

// ── URL validation ─────────────────────────────────────────────────

/// Validate a streaming URL before connecting: the scheme must be `wss`
/// and the host must equal `trusted_domain` or be one of its subdomains.
/// Look-alike hosts (`notvoxlate.com`, `voxlate.com.evil.com`) are
/// rejected.
pub fn validate_streaming_url(raw: &str, trusted_domain: &str) -> VoiceResult<Url> {
    let url = Url::parse(raw)
        .map_err(|e| VoiceError::InvalidStreamingUrl(format!("unparsable URL: {e}")))?;
    if url.scheme() != "wss" {
        return Err(VoiceError::InvalidStreamingUrl(format!(
            "scheme '{}' is not wss",
            url.scheme()
        )));
    }
    let host = url
        .host_str()
        .ok_or_else(|| VoiceError::InvalidStreamingUrl("missing host".into()))?
        .to_ascii_lowercase();
    if host != trusted_domain && !host.ends_with(&format!(".{trusted_domain}")) {
        return Err(VoiceError::InvalidStreamingUrl(format!(
            "host '{host}' is not {trusted_domain} or a subdomain of it"
        )));
    }
    Ok(url)
}

/// Render a streaming URL with the token query value masked, for logging.
pub fn redacted(url: &Url) -> String {
    if !url.query_pairs().any(|(k, _)| k == "token") {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let k = k.into_owned();
            let v = if k == "token" {
                "[redacted]".to_string()
            } else {
                v.into_owned()
            };
            (k, v)
        })
        .collect();
    let mut shown = url.clone();
    {
        let mut query = shown.query_pairs_mut();
        query.clear();
        for (k, v) in &pairs {
            query.append_pair(k, v);
        }
    }
    shown.to_string()
}

// ── Transport traits ───────────────────────────────────────────────

/// Outcome of a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Transmitted (or queued); `buffered_bytes` is the outbound depth
    /// still waiting on the socket after this send.
    Sent { buffered_bytes: usize },
    /// The socket is not open; nothing was sent.
    NotOpen,
}

/// Inbound event from a transport.
#[derive(Debug)]
pub enum TransportEvent {
    Message(ServerMessage),
    /// The connection is gone — closed by the server, or failed. The
    /// orchestrator decides whether this is graceful (it already saw a
    /// terminal message) or grounds for reconnection.
    Closed,
}

/// One WebSocket connection's worth of send/receive.
#[async_trait]
pub trait StreamTransport: Send {
    async fn send(&mut self, message: &ClientMessage) -> SendStatus;
    /// Next inbound event. Yields `Closed` forever once the connection is
    /// gone.
    async fn next_event(&mut self) -> TransportEvent;
    /// Idempotent; always safe to call.
    async fn close(&mut self);
}

/// Opens transports from credentials. The seam that lets the orchestrator
/// run against scripted transports in tests and reopen connections after a
/// reconnect.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(
        &self,
        credential: &ConnectionCredential,
    ) -> VoiceResult<Box<dyn StreamTransport>>;
}

// ── WebSocket implementation ───────────────────────────────────────

type WsSink = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    WsMessage,
>;

pub struct WsTransport {
    sink: WsSink,
    events: mpsc::Receiver<TransportEvent>,
    open: Arc<AtomicBool>,
    buffered_bytes: usize,
}

#[async_trait]
impl StreamTransport for WsTransport {
    async fn send(&mut self, message: &ClientMessage) -> SendStatus {
        if !self.open.load(Ordering::Relaxed) {
            return SendStatus::NotOpen;
        }
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize outbound message");
                return SendStatus::NotOpen;
            }
        };
        self.buffered_bytes += json.len();
        if self.sink.feed(WsMessage::text(json)).await.is_err() {
            self.open.store(false, Ordering::Relaxed);
            return SendStatus::NotOpen;
        }
        // Drive the flush as far as the socket will take it right now; a
        // stalled socket leaves bytes counted against the buffer limit.
        let flushed = futures_util::future::poll_fn(|cx| {
            Poll::Ready(self.sink.poll_flush_unpin(cx))
        })
        .await;
        match flushed {
            Poll::Ready(Ok(())) => self.buffered_bytes = 0,
            Poll::Ready(Err(_)) => {
                self.open.store(false, Ordering::Relaxed);
                return SendStatus::NotOpen;
            }
            Poll::Pending => {}
        }
        SendStatus::Sent {
            buffered_bytes: self.buffered_bytes,
        }
    }

    async fn next_event(&mut self) -> TransportEvent {
        self.events.recv().await.unwrap_or(TransportEvent::Closed)
    }

    async fn close(&mut self) {
        if self.open.swap(false, Ordering::Relaxed) {
            let _ = self.sink.send(WsMessage::Close(None)).await;
        }
    }
}

/// Connects [`WsTransport`]s against the trusted streaming domain.
pub struct WsConnector {
    trusted_domain: String,
}

impl WsConnector {
    pub fn new(trusted_domain: impl Into<String>) -> Self {
        Self {
            trusted_domain: trusted_domain.into(),
        }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(TRUSTED_STREAMING_DOMAIN)
    }
}

#[async_trait]
impl TransportConnector for WsConnector {
    async fn connect(
        &self,
        credential: &ConnectionCredential,
    ) -> VoiceResult<Box<dyn StreamTransport>> {
        let mut url = validate_streaming_url(&credential.streaming_url, &self.trusted_domain)?;
        url.query_pairs_mut()
            .append_pair("token", &credential.token);

        tracing::info!(url = %redacted(&url), "connecting to streaming endpoint");
        let connect = tokio_tungstenite::connect_async(url.as_str());
        let (ws_stream, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| {
                VoiceError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "websocket handshake timed out",
                ))
            })?
            .map_err(|e| {
                VoiceError::Io(std::io::Error::other(format!("websocket handshake: {e}")))
            })?;

        let (sink, mut stream) = ws_stream.split();
        let open = Arc::new(AtomicBool::new(true));
        let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(64);

        let pump_open = Arc::clone(&open);
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => {
                        if let Some(message) = decode_frame(text.as_str()) {
                            if event_tx.send(TransportEvent::Message(message)).await.is_err() {
                                return;
                            }
                        } else {
                            tracing::trace!("dropping undecodable inbound frame");
                        }
                    }
                    // Some gateways deliver JSON in binary frames.
                    Ok(WsMessage::Binary(data)) => {
                        let Ok(text) = std::str::from_utf8(&data) else {
                            tracing::trace!(len = data.len(), "dropping non-UTF-8 binary frame");
                            continue;
                        };
                        if let Some(message) = decode_frame(text) {
                            if event_tx.send(TransportEvent::Message(message)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(WsMessage::Close(frame)) => {
                        tracing::debug!(close_frame = ?frame, "streaming connection closed");
                        break;
                    }
                    Ok(_) => {} // ping/pong handled by tungstenite
                    Err(e) => {
                        tracing::warn!(error = %e, "websocket receive error");
                        break;
                    }
                }
            }
            pump_open.store(false, Ordering::Relaxed);
            let _ = event_tx.send(TransportEvent::Closed).await;
        });

        Ok(Box::new(WsTransport {
            sink,
            events: event_rx,
            open,
            buffered_bytes: 0,
        }))
    }
}

// ── Tests ──────────────────────────────────────────────────────────
