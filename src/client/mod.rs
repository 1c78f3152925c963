//! Client orchestrator
//!
//! [`Client`] drives the full connection lifecycle: credential exchange,
//! session brokering, signaling, peer negotiation, and the data-channel
//! command protocol. A single background task owns the event loop; public
//! methods only inspect shared state or hand commands to the protocol, so
//! they are safe to call from anywhere.

mod handlers;

pub use handlers::EventHandlers;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::AuthClient;
use crate::channels::{
    CommandKind, CommandMessage, CommandOutcome, CommandProtocol, CommandReceiver, StreamEvent,
};
use crate::config::ClientConfig;
use crate::peer::{fetch_ice_servers, EngineEvent, PeerConnection};
use crate::recordings::RecordingsClient;
use crate::signaling::{
    describe_error_reason, SignalingChannel, SignalingEvent, SignalingMessage, SignalingSender,
};
use crate::types::{
    ConnectionStatus, Recording, Session, StreamRecordingsList, StreamState,
};
use crate::{Error, Result};

/// Ceiling on one handshake pass (signaling connect through channel open)
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for interactive audio-visual streaming
///
/// One instance manages at most one connection and one stream at a time.
/// Create it with a [`ClientConfig`], call [`connect`](Client::connect) with
/// your [`EventHandlers`], then drive the stream with
/// [`start_stream`](Client::start_stream), [`interact`](Client::interact),
/// and [`end_stream`](Client::end_stream).
pub struct Client {
    shared: Arc<Shared>,
    recordings: RecordingsClient,
    // Serializes connect/disconnect so their status checks are atomic
    lifecycle: Mutex<()>,
    main_task: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    config: ClientConfig,
    auth: Arc<AuthClient>,
    protocol: CommandProtocol,
    status: RwLock<ConnectionStatus>,
    session: RwLock<Option<Session>>,
    signaling: RwLock<Option<SignalingSender>>,
    peer: RwLock<Option<Arc<PeerConnection>>>,
    handlers: RwLock<Arc<EventHandlers>>,
}

/// Live transport handed from the handshake to the supervisor
struct Established {
    channel: SignalingChannel,
    engine: mpsc::UnboundedReceiver<EngineEvent>,
}

/// Why the connected event loop stopped
enum Outcome {
    /// Server closed the signaling connection cleanly
    CleanClose,
    /// Transport lost unexpectedly; reconnection should be attempted
    Lost(String),
}

impl Client {
    /// Create a client from a configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let auth = Arc::new(AuthClient::new(
            config.api_url.clone(),
            config.api_key.clone(),
        ));
        let recordings = RecordingsClient::new(Arc::clone(&auth), config.api_url.clone());

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                auth,
                protocol: CommandProtocol::new(),
                status: RwLock::new(ConnectionStatus::Disconnected),
                session: RwLock::new(None),
                signaling: RwLock::new(None),
                peer: RwLock::new(None),
                handlers: RwLock::new(Arc::new(EventHandlers::default())),
            }),
            recordings,
            lifecycle: Mutex::new(()),
            main_task: Mutex::new(None),
        })
    }

    /// Create a client with default configuration for an API key
    pub fn with_api_key(api_key: impl Into<String>) -> Result<Self> {
        Self::new(ClientConfig::new(api_key))
    }

    /// Current connection status
    pub async fn status(&self) -> ConnectionStatus {
        *self.shared.status.read().await
    }

    /// Current stream state
    pub async fn stream_state(&self) -> StreamState {
        self.shared.protocol.stream_state().await
    }

    /// The active session assignment, if connected
    pub async fn session(&self) -> Option<Session> {
        self.shared.session.read().await.clone()
    }

    /// Connect to the platform
    ///
    /// Runs the handshake (with retries per the configured policy) and
    /// returns once the connection is ready for stream commands. The handler
    /// set stays registered for the lifetime of the connection, including
    /// across reconnects. Fails if a connection is already up or in progress.
    pub async fn connect(&self, handlers: EventHandlers) -> Result<()> {
        // Claim the lifecycle before awaiting readiness, so a concurrent
        // disconnect() can still cancel the attempt.
        let ready_rx = {
            let _lifecycle = self.lifecycle.lock().await;

            {
                let mut status = self.shared.status.write().await;
                if status.is_busy() {
                    return Err(Error::Connection(format!(
                        "Client is already {}",
                        *status
                    )));
                }
                debug!("Status: {} -> {}", *status, ConnectionStatus::Authenticating);
                *status = ConnectionStatus::Authenticating;
            }

            *self.shared.handlers.write().await = Arc::new(handlers);
            self.shared
                .handlers()
                .await
                .emit_status_change(ConnectionStatus::Authenticating, None);

            let shared = Arc::clone(&self.shared);
            let (ready_tx, ready_rx) = oneshot::channel();

            let task = tokio::spawn(async move {
                match establish_with_retries(&shared).await {
                    Ok(established) => {
                        shared.set_status(ConnectionStatus::Connected, None).await;
                        shared.handlers().await.emit_connected();
                        let _ = ready_tx.send(Ok(()));
                        supervise(shared, established).await;
                    }
                    Err(e) => {
                        shared.session.write().await.take();
                        shared
                            .set_status(ConnectionStatus::Failed, Some(&e.to_string()))
                            .await;
                        let _ = ready_tx.send(Err(e));
                    }
                }
            });
            *self.main_task.lock().await = Some(task);
            ready_rx
        };

        match ready_rx.await {
            Ok(result) => result,
            // The task was aborted by disconnect() before finishing
            Err(_) => Err(Error::Connection(
                "Connection attempt aborted".to_string(),
            )),
        }
    }

    /// Disconnect from the platform
    ///
    /// Sends a courtesy notice to the signaling server, tears down the
    /// transport, and fails any pending command. Idempotent; a no-op when
    /// already disconnected.
    pub async fn disconnect(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        if !self.shared.status.read().await.is_busy() {
            return Ok(());
        }

        info!("Disconnecting");

        // Aborting the main task also interrupts an in-progress handshake
        // or retry sleep.
        if let Some(task) = self.main_task.lock().await.take() {
            task.abort();
        }

        self.shared.protocol.reset("Client disconnected").await;

        let sender = self.shared.signaling.read().await.clone();
        if let Some(sender) = sender {
            if sender.is_open() {
                if let Err(e) = sender.send(&SignalingMessage::ClientDisconnecting).await {
                    debug!("Disconnect notice not delivered: {}", e);
                }
            }
        }

        self.shared.teardown_transport().await;
        self.shared.session.write().await.take();
        self.shared
            .set_status(ConnectionStatus::Disconnected, None)
            .await;
        self.shared.handlers().await.emit_disconnected();

        Ok(())
    }

    /// Start an interactive stream
    ///
    /// Waits up to the configured queue timeout for a streamer to pick up
    /// the stream; on timeout the start is aborted and the stream returns to
    /// idle. Returns the stream id on success.
    pub async fn start_stream(&self, prompt: &str, portrait: bool) -> Result<String> {
        self.require_connected().await?;

        let ack = self
            .shared
            .protocol
            .send_command(CommandMessage::InteractiveStreamStart {
                prompt: prompt.to_string(),
                portrait,
            })
            .await?;

        wait_for_start(&self.shared.protocol, ack, self.shared.config.queue_timeout).await
    }

    /// Send an interaction prompt into the running stream
    ///
    /// Resolves when the streamer acknowledges, returning the echoed prompt.
    pub async fn interact(&self, prompt: &str) -> Result<String> {
        self.require_connected().await?;

        let ack = self
            .shared
            .protocol
            .send_command(CommandMessage::Update {
                prompt: prompt.to_string(),
            })
            .await?;

        match ack.await {
            Ok(Ok(CommandOutcome::Acknowledged { prompt })) => Ok(prompt),
            Ok(Ok(_)) => Err(Error::Stream(
                "Unexpected acknowledgment for interaction".to_string(),
            )),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Stream("Interaction cancelled".to_string())),
        }
    }

    /// End the interactive stream
    pub async fn end_stream(&self) -> Result<()> {
        self.require_connected().await?;

        let ack = self
            .shared
            .protocol
            .send_command(CommandMessage::InteractiveStreamEnd)
            .await?;

        match ack.await {
            Ok(Ok(CommandOutcome::Ended)) => Ok(()),
            Ok(Ok(_)) => Err(Error::Stream(
                "Unexpected acknowledgment for stream end".to_string(),
            )),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::Stream("Stream end cancelled".to_string())),
        }
    }

    /// Get recording data for a stream
    ///
    /// Works without an active connection; only a valid API key is needed.
    pub async fn get_recording(&self, stream_id: &str) -> Result<Recording> {
        self.recordings.get_recording(stream_id).await
    }

    /// List stream recordings for the authenticated user
    pub async fn list_stream_recordings(
        &self,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<StreamRecordingsList> {
        self.recordings.list_stream_recordings(limit, offset).await
    }

    async fn require_connected(&self) -> Result<()> {
        let status = *self.shared.status.read().await;
        if status != ConnectionStatus::Connected {
            return Err(Error::Connection(format!(
                "Not connected (status: {})",
                status
            )));
        }
        Ok(())
    }
}

impl Shared {
    async fn handlers(&self) -> Arc<EventHandlers> {
        self.handlers.read().await.clone()
    }

    async fn set_status(&self, status: ConnectionStatus, detail: Option<&str>) {
        {
            let mut current = self.status.write().await;
            if *current == status {
                return;
            }
            debug!("Status: {} -> {}", *current, status);
            *current = status;
        }
        self.handlers().await.emit_status_change(status, detail);
    }

    /// Enter the connecting status unless a reconnect is in progress
    async fn mark_connecting(&self) {
        let current = *self.status.read().await;
        if current != ConnectionStatus::Reconnecting {
            self.set_status(ConnectionStatus::Connecting, None).await;
        }
    }

    async fn teardown_transport(&self) {
        if let Some(sender) = self.signaling.write().await.take() {
            sender.close().await;
        }
        if let Some(pc) = self.peer.write().await.take() {
            if let Err(e) = pc.close().await {
                debug!("Peer connection close failed: {}", e);
            }
        }
    }
}

/// Run the handshake under the configured retry policy
///
/// Non-retryable failures (credential rejection, bad configuration) abort
/// immediately; everything else retries with exponential backoff until the
/// budget is spent.
async fn establish_with_retries(shared: &Arc<Shared>) -> Result<Established> {
    let mut attempt = 0u32;
    loop {
        match establish_once(shared).await {
            Ok(established) => return Ok(established),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                if !shared.config.retry.should_retry(attempt) {
                    return Err(e);
                }
                let delay = shared.config.retry.delay(attempt);
                warn!(
                    "Connection attempt {} failed ({}), retrying in {:?}",
                    attempt + 1,
                    e,
                    delay
                );
                shared.handlers().await.emit_error(&e, false);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// One full handshake pass: session, ICE config, peer, signaling, negotiation
async fn establish_once(shared: &Arc<Shared>) -> Result<Established> {
    shared.teardown_transport().await;

    let session = resolve_session(shared).await?;
    info!(
        "Using session {} at {}",
        session.session_id, session.signaling_url
    );
    shared.mark_connecting().await;
    // Invariant: a stored session implies a busy connection status
    *shared.session.write().await = Some(session.clone());

    let ice_servers = fetch_ice_servers(&session.signaling_url).await;
    let (pc, mut engine) = PeerConnection::new(ice_servers).await?;
    let pc = Arc::new(pc);

    let mut channel = SignalingChannel::open(&session).await?;
    let sender = channel.sender();

    *shared.peer.write().await = Some(Arc::clone(&pc));
    *shared.signaling.write().await = Some(sender.clone());

    let handshake = drive_handshake(shared, &pc, &mut channel, &mut engine, &sender);
    match tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake).await {
        Ok(Ok(())) => {
            info!("Connection established");
            Ok(Established { channel, engine })
        }
        Ok(Err(e)) => {
            shared.teardown_transport().await;
            Err(e)
        }
        Err(_) => {
            shared.teardown_transport().await;
            Err(Error::Timeout(format!(
                "Handshake did not complete within {:?}",
                HANDSHAKE_TIMEOUT
            )))
        }
    }
}

/// Await the `stream_started` acknowledgment under the queue timeout
///
/// On expiry the pending start is aborted, reverting a `Starting` stream to
/// `Idle`, and the failure surfaces as a stream error.
async fn wait_for_start(
    protocol: &CommandProtocol,
    ack: CommandReceiver,
    queue_timeout: Duration,
) -> Result<String> {
    match tokio::time::timeout(queue_timeout, ack).await {
        Ok(Ok(Ok(CommandOutcome::Started { stream_id }))) => Ok(stream_id),
        Ok(Ok(Ok(_))) => Err(Error::Stream(
            "Unexpected acknowledgment for stream start".to_string(),
        )),
        Ok(Ok(Err(e))) => Err(e),
        Ok(Err(_)) => Err(Error::Stream("Stream start cancelled".to_string())),
        Err(_) => {
            protocol.abort_pending(CommandKind::Start).await;
            Err(Error::Stream(format!(
                "No streamer picked up the stream within {:?}",
                queue_timeout
            )))
        }
    }
}

async fn resolve_session(shared: &Arc<Shared>) -> Result<Session> {
    if let Some(signaling_url) = &shared.config.dev.signaling_url {
        let session_id = shared.config.dev.session_id.clone().ok_or_else(|| {
            Error::InvalidConfig("dev.session_id is required with dev.signaling_url".to_string())
        })?;
        debug!("Dev mode: bypassing session broker");
        return Ok(Session {
            session_id,
            signaling_url: signaling_url.clone(),
            session_token: None,
        });
    }

    shared.auth.acquire_session().await
}

/// Drive SDP/ICE negotiation until the connection is usable
///
/// Usable means the engine reports connected and both data channels are
/// open. Stream events and video frames that arrive mid-handshake are
/// dispatched normally.
async fn drive_handshake(
    shared: &Arc<Shared>,
    pc: &Arc<PeerConnection>,
    channel: &mut SignalingChannel,
    engine: &mut mpsc::UnboundedReceiver<EngineEvent>,
    sender: &SignalingSender,
) -> Result<()> {
    let mut engine_connected = false;
    let mut outbound_open = false;
    let mut inbound_open = false;

    loop {
        if engine_connected && outbound_open && inbound_open {
            return Ok(());
        }

        tokio::select! {
            event = channel.recv() => {
                match event? {
                    SignalingEvent::Message(message) => {
                        handle_signaling_message(pc, sender, message).await?;
                    }
                    SignalingEvent::Closed { code, reason } => {
                        return Err(Error::Signaling(format!(
                            "Signaling closed during handshake (code {:?}): {}",
                            code, reason
                        )));
                    }
                }
            }
            event = engine.recv() => {
                let Some(event) = event else {
                    return Err(Error::Connection(
                        "Media engine stopped during handshake".to_string(),
                    ));
                };
                match event {
                    EngineEvent::Connected => engine_connected = true,
                    EngineEvent::Disconnected => {
                        return Err(Error::Connection(
                            "Peer connection failed during handshake".to_string(),
                        ));
                    }
                    EngineEvent::OutboundChannelOpen => {
                        outbound_open = true;
                        if let Some(sink) = pc.outbound_sink().await {
                            shared.protocol.attach_sink(sink).await;
                        }
                    }
                    EngineEvent::InboundChannelOpen => inbound_open = true,
                    EngineEvent::InboundMessage(data) => {
                        dispatch_stream_event(shared, &data).await;
                    }
                    EngineEvent::VideoFrame(frame) => {
                        shared.handlers().await.emit_video_frame(frame);
                    }
                    EngineEvent::LocalCandidate { candidate, sdp_mid, sdp_m_line_index } => {
                        send_local_candidate(sender, candidate, sdp_mid, sdp_m_line_index).await;
                    }
                }
            }
        }
    }
}

async fn handle_signaling_message(
    pc: &Arc<PeerConnection>,
    sender: &SignalingSender,
    message: SignalingMessage,
) -> Result<()> {
    match message {
        SignalingMessage::Offer { sdp } => {
            debug!("Received offer, answering");
            let answer = pc.accept_offer(sdp).await?;
            sender.send(&SignalingMessage::Answer { sdp: answer }).await?;
        }
        SignalingMessage::IceCandidate {
            candidate,
            sdp_mid,
            sdp_m_line_index,
        } => {
            if let Err(e) = pc
                .add_remote_candidate(candidate, sdp_mid, sdp_m_line_index)
                .await
            {
                // A single bad candidate must not kill the negotiation
                warn!("Dropping remote ICE candidate: {}", e);
            }
        }
        SignalingMessage::Error { reason } => {
            return Err(Error::Signaling(describe_error_reason(&reason)));
        }
        SignalingMessage::Answer { .. } => {
            warn!("Ignoring unexpected answer from signaling server");
        }
        SignalingMessage::Keepalive
        | SignalingMessage::ClientDisconnecting
        | SignalingMessage::Unknown => {}
    }
    Ok(())
}

/// Post-handshake supervisor loop
///
/// Consumes transport events until the connection ends, reconnecting with a
/// fresh retry budget on unexpected loss. Returns only when the client is
/// terminally disconnected or failed.
async fn supervise(shared: Arc<Shared>, mut established: Established) {
    loop {
        let outcome = run_connected(&shared, &mut established).await;
        shared.protocol.reset("Connection lost").await;
        shared.teardown_transport().await;

        match outcome {
            Outcome::CleanClose => {
                info!("Server closed the connection");
                shared.session.write().await.take();
                shared
                    .set_status(ConnectionStatus::Disconnected, Some("closed by server"))
                    .await;
                shared.handlers().await.emit_disconnected();
                return;
            }
            Outcome::Lost(reason) => {
                warn!("Connection lost ({}), reconnecting", reason);
                shared
                    .set_status(ConnectionStatus::Reconnecting, Some(&reason))
                    .await;

                match establish_with_retries(&shared).await {
                    Ok(next) => {
                        established = next;
                        shared.set_status(ConnectionStatus::Connected, None).await;
                        shared.handlers().await.emit_connected();
                    }
                    Err(e) => {
                        shared.session.write().await.take();
                        shared
                            .set_status(ConnectionStatus::Failed, Some(&e.to_string()))
                            .await;
                        shared.handlers().await.emit_error(&e, true);
                        return;
                    }
                }
            }
        }
    }
}

/// Event loop for a live connection
async fn run_connected(shared: &Arc<Shared>, established: &mut Established) -> Outcome {
    loop {
        tokio::select! {
            event = established.channel.recv() => {
                match event {
                    Ok(event) if event.is_normal_closure() => return Outcome::CleanClose,
                    Ok(SignalingEvent::Closed { code, reason }) => {
                        return Outcome::Lost(format!(
                            "signaling closed (code {:?}): {}",
                            code, reason
                        ));
                    }
                    Ok(SignalingEvent::Message(SignalingMessage::Error { reason })) => {
                        return Outcome::Lost(describe_error_reason(&reason));
                    }
                    Ok(SignalingEvent::Message(SignalingMessage::IceCandidate {
                        candidate,
                        sdp_mid,
                        sdp_m_line_index,
                    })) => {
                        let pc = shared.peer.read().await.clone();
                        if let Some(pc) = pc {
                            if let Err(e) = pc
                                .add_remote_candidate(candidate, sdp_mid, sdp_m_line_index)
                                .await
                            {
                                warn!("Dropping remote ICE candidate: {}", e);
                            }
                        }
                    }
                    Ok(SignalingEvent::Message(_)) => {}
                    Err(e) => return Outcome::Lost(e.to_string()),
                }
            }
            event = established.engine.recv() => {
                match event {
                    None => return Outcome::Lost("media engine stopped".to_string()),
                    Some(EngineEvent::Disconnected) => {
                        return Outcome::Lost("peer connection lost".to_string());
                    }
                    Some(EngineEvent::InboundMessage(data)) => {
                        dispatch_stream_event(shared, &data).await;
                    }
                    Some(EngineEvent::VideoFrame(frame)) => {
                        shared.handlers().await.emit_video_frame(frame);
                    }
                    Some(EngineEvent::LocalCandidate { candidate, sdp_mid, sdp_m_line_index }) => {
                        let sender = shared.signaling.read().await.clone();
                        if let Some(sender) = sender {
                            send_local_candidate(&sender, candidate, sdp_mid, sdp_m_line_index)
                                .await;
                        }
                    }
                    // Channel reopens and Connected are handshake-time events
                    Some(_) => {}
                }
            }
        }
    }
}

/// Parse an inbound data-channel message and fan it out
///
/// The protocol sees every event first (acknowledgment matching and stream
/// state), then the matching handler fires.
async fn dispatch_stream_event(shared: &Arc<Shared>, data: &[u8]) {
    let text = match std::str::from_utf8(data) {
        Ok(text) => text,
        Err(e) => {
            warn!("Dropping non-UTF8 stream event: {}", e);
            return;
        }
    };

    let event = match StreamEvent::from_json(text) {
        Ok(event) => event,
        Err(e) => {
            warn!("Failed to parse stream event: {}", e);
            return;
        }
    };

    shared.protocol.handle_event(&event).await;

    let handlers = shared.handlers().await;
    match &event {
        StreamEvent::StreamStarted { stream_id } => handlers.emit_stream_started(stream_id),
        StreamEvent::UpdateAcknowledged { prompt } => handlers.emit_interact_acknowledged(prompt),
        StreamEvent::StreamEnded => handlers.emit_stream_ended(),
        StreamEvent::InteractiveStreamError { reason, message } => {
            handlers.emit_stream_error(reason, message)
        }
        StreamEvent::Unknown => {}
    }
}

async fn send_local_candidate(
    sender: &SignalingSender,
    candidate: String,
    sdp_mid: Option<String>,
    sdp_m_line_index: Option<u16>,
) {
    let message = SignalingMessage::IceCandidate {
        candidate,
        sdp_mid,
        sdp_m_line_index,
    };
    if let Err(e) = sender.send(&message).await {
        warn!("Failed to send local ICE candidate: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::CommandSink;
    use crate::retry::RetryPolicy;

    struct NullSink;

    #[async_trait::async_trait]
    impl CommandSink for NullSink {
        async fn send(&self, _payload: bytes::Bytes) -> Result<()> {
            Ok(())
        }
    }

    async fn started_protocol() -> (CommandProtocol, CommandReceiver) {
        let protocol = CommandProtocol::new();
        protocol.attach_sink(Arc::new(NullSink)).await;
        let ack = protocol
            .send_command(CommandMessage::InteractiveStreamStart {
                prompt: "A cat".to_string(),
                portrait: true,
            })
            .await
            .unwrap();
        (protocol, ack)
    }

    fn dev_config(signaling_url: &str) -> ClientConfig {
        let mut config = ClientConfig::new("");
        config.dev.signaling_url = Some(signaling_url.to_string());
        config.dev.session_id = Some("dev-session".to_string());
        config.retry = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        config
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = Client::new(ClientConfig::new("  "));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_initial_state() {
        let client = Client::with_api_key("mk_test").unwrap();
        assert_eq!(client.status().await, ConnectionStatus::Disconnected);
        assert_eq!(client.stream_state().await, StreamState::Idle);
        assert!(client.session().await.is_none());
    }

    #[tokio::test]
    async fn test_commands_require_connection() {
        let client = Client::with_api_key("mk_test").unwrap();

        let err = client.start_stream("A cat", true).await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));

        let err = client.interact("Pet the cat").await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));

        let err = client.end_stream().await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let client = Client::with_api_key("mk_test").unwrap();
        client.disconnect().await.unwrap();
        client.disconnect().await.unwrap();
        assert_eq!(client.status().await, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_failure_sets_failed_status() {
        // Reserved port with nothing listening; single attempt, no retries
        let client = Client::new(dev_config("ws://127.0.0.1:1")).unwrap();

        let err = client.connect(EventHandlers::new()).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(client.status().await, ConnectionStatus::Failed);
        assert!(client.session().await.is_none());

        // A fresh connect is allowed after failure
        let err = client.connect(EventHandlers::new()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_queue_timeout_reverts_stream_to_idle() {
        let (protocol, ack) = started_protocol().await;
        assert_eq!(protocol.stream_state().await, StreamState::Starting);

        let err = wait_for_start(&protocol, ack, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.is_stream(), "got: {}", err);
        assert_eq!(protocol.stream_state().await, StreamState::Idle);
        assert!(protocol.pending_kind().await.is_none());

        // A fresh start is legal after the timeout
        protocol
            .send_command(CommandMessage::InteractiveStreamStart {
                prompt: "A cat".to_string(),
                portrait: true,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_start_resolves_before_queue_timeout() {
        let (protocol, ack) = started_protocol().await;

        protocol
            .handle_event(&StreamEvent::StreamStarted {
                stream_id: "stream-123".to_string(),
            })
            .await;

        let stream_id = wait_for_start(&protocol, ack, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(stream_id, "stream-123");
        assert_eq!(protocol.stream_state().await, StreamState::Active);
    }
}
