//! WebSocket signaling channel

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::signaling::protocol::SignalingMessage;
use crate::types::Session;
use crate::{Error, Result};

/// Keepalive interval on the signaling connection
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Incoming activity on the signaling channel
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    /// A parsed signaling message, in receipt order
    Message(SignalingMessage),
    /// The transport closed; `code` is the WebSocket close code if one arrived
    Closed {
        /// WebSocket close code
        code: Option<u16>,
        /// Close reason supplied by the peer
        reason: String,
    },
}

impl SignalingEvent {
    /// Whether this is a clean closure (codes 1000/1001)
    pub fn is_normal_closure(&self) -> bool {
        matches!(
            self,
            SignalingEvent::Closed {
                code: Some(1000) | Some(1001),
                ..
            }
        )
    }
}

/// Cloneable sending half of the signaling channel
///
/// Held by the orchestrator for sending candidates and the disconnect notice
/// while the receiving half lives in the event loop.
#[derive(Clone)]
pub struct SignalingSender {
    sink: Arc<Mutex<WsSink>>,
    open: Arc<AtomicBool>,
}

impl SignalingSender {
    /// Send a message to the signaling server
    pub async fn send(&self, message: &SignalingMessage) -> Result<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(Error::Signaling("Signaling channel not open".to_string()));
        }

        let json = message.to_json()?;
        debug!("Signaling send: {}", json);

        self.sink
            .lock()
            .await
            .send(Message::Text(json))
            .await
            .map_err(|e| Error::Signaling(format!("Failed to send signaling message: {}", e)))
    }

    /// Close the channel with a normal close frame
    ///
    /// Idempotent; errors from an already-torn-down transport are ignored.
    pub async fn close(&self) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }

        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "client disconnect".into(),
        };
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
            debug!("Close frame not delivered: {}", e);
        }
    }

    /// Whether the channel is still open for sending
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Message-oriented connection to the signaling endpoint
///
/// Owns the receiving half of the WebSocket and a background keepalive task;
/// the sending half is shared through [`SignalingSender`].
pub struct SignalingChannel {
    sender: SignalingSender,
    receiver: SplitStream<WsStream>,
    heartbeat: JoinHandle<()>,
}

impl SignalingChannel {
    /// Open the signaling connection for a session
    ///
    /// The session token, when present, is passed as a `token` query
    /// parameter. Fails with a connection error if the endpoint is
    /// unreachable.
    pub async fn open(session: &Session) -> Result<Self> {
        let url = Self::endpoint_url(
            &session.signaling_url,
            &session.session_id,
            session.session_token.as_deref(),
        )?;

        debug!("Connecting to signaling endpoint {}", url);

        let (ws, _response) = connect_async(&url).await.map_err(|e| {
            Error::Connection(format!("Failed to connect to signaling server: {}", e))
        })?;

        let (sink, receiver) = ws.split();
        let sender = SignalingSender {
            sink: Arc::new(Mutex::new(sink)),
            open: Arc::new(AtomicBool::new(true)),
        };

        let heartbeat = tokio::spawn(heartbeat_loop(sender.clone()));

        Ok(Self {
            sender,
            receiver,
            heartbeat,
        })
    }

    /// Build the per-session endpoint URL
    ///
    /// Accepts http(s) or bare host forms and normalizes to ws(s).
    fn endpoint_url(signaling_url: &str, session_id: &str, token: Option<&str>) -> Result<String> {
        let base = normalize_url(signaling_url);
        let mut url = url::Url::parse(&format!("{}/client/{}", base, session_id))
            .map_err(|e| Error::InvalidConfig(format!("Invalid signaling URL: {}", e)))?;

        if let Some(token) = token {
            url.query_pairs_mut().append_pair("token", token);
        }

        Ok(url.into())
    }

    /// Get a cloneable sending handle
    pub fn sender(&self) -> SignalingSender {
        self.sender.clone()
    }

    /// Receive the next signaling event
    ///
    /// Suspends until a message arrives or the channel closes. Unparseable
    /// frames are logged and skipped so one bad message cannot wedge the
    /// negotiation.
    pub async fn recv(&mut self) -> Result<SignalingEvent> {
        loop {
            let frame = match self.receiver.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    self.sender.open.store(false, Ordering::SeqCst);
                    return Err(Error::Signaling(format!("Signaling receive error: {}", e)));
                }
                None => {
                    self.sender.open.store(false, Ordering::SeqCst);
                    return Ok(SignalingEvent::Closed {
                        code: None,
                        reason: "connection closed".to_string(),
                    });
                }
            };

            let text = match frame {
                Message::Text(text) => text,
                Message::Binary(data) => match String::from_utf8(data) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Dropping non-UTF8 signaling frame: {}", e);
                        continue;
                    }
                },
                Message::Close(frame) => {
                    self.sender.open.store(false, Ordering::SeqCst);
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.into_owned()),
                        None => (None, String::new()),
                    };
                    debug!("Signaling closed: code={:?}, reason={}", code, reason);
                    return Ok(SignalingEvent::Closed { code, reason });
                }
                // Pings are answered by the transport when polled
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };

            match SignalingMessage::from_json(&text) {
                Ok(SignalingMessage::Unknown) => {
                    debug!("Ignoring unrecognized signaling message: {}", text);
                }
                Ok(message) => {
                    debug!("Signaling recv: {}", text);
                    return Ok(SignalingEvent::Message(message));
                }
                Err(e) => {
                    warn!("Failed to parse signaling message: {}", e);
                }
            }
        }
    }
}

impl Drop for SignalingChannel {
    fn drop(&mut self) {
        self.heartbeat.abort();
    }
}

async fn heartbeat_loop(sender: SignalingSender) {
    debug!("Started signaling heartbeat ({:?})", HEARTBEAT_INTERVAL);
    let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
    interval.tick().await; // first tick fires immediately

    loop {
        interval.tick().await;
        if !sender.is_open() {
            break;
        }
        if let Err(e) = sender.send(&SignalingMessage::Keepalive).await {
            debug!("Keepalive failed, stopping heartbeat: {}", e);
            break;
        }
    }
}

/// Normalize a signaling URL to ws:// or wss://
pub(crate) fn normalize_url(url: &str) -> String {
    let url = url.trim_end_matches('/');

    if url.starts_with("ws://") || url.starts_with("wss://") {
        url.to_string()
    } else if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        format!("ws://{}", url)
    }
}
