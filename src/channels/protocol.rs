//! Request/acknowledgment matching over the data channels

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::channels::messages::{CommandKind, CommandMessage, CommandOutcome, StreamEvent};
use crate::types::StreamState;
use crate::{Error, Result};

/// Outbound half of the command channel
///
/// Implemented by the media engine's `clientToStreamer` data channel;
/// protocol tests substitute a recording mock.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Send a serialized command payload
    async fn send(&self, payload: Bytes) -> Result<()>;
}

/// Completion handle for a command sent via [`CommandProtocol::send_command`]
pub type CommandReceiver = oneshot::Receiver<Result<CommandOutcome>>;

struct PendingCommand {
    kind: CommandKind,
    issued_at: Instant,
    tx: oneshot::Sender<Result<CommandOutcome>>,
}

struct ProtocolState {
    pending: Option<PendingCommand>,
    stream_state: StreamState,
}

/// Command/acknowledgment protocol over one data-channel pair
///
/// Owns the single pending-command slot and the stream state machine. At most
/// one command is in flight at any instant; a second `send_command` while one
/// is pending fails without touching the first.
pub struct CommandProtocol {
    sink: Mutex<Option<Arc<dyn CommandSink>>>,
    state: Mutex<ProtocolState>,
}

impl CommandProtocol {
    /// Create a protocol instance with no outbound channel attached yet
    pub fn new() -> Self {
        Self {
            sink: Mutex::new(None),
            state: Mutex::new(ProtocolState {
                pending: None,
                stream_state: StreamState::Idle,
            }),
        }
    }

    /// Attach the outbound data channel once it reports open
    pub async fn attach_sink(&self, sink: Arc<dyn CommandSink>) {
        *self.sink.lock().await = Some(sink);
    }

    /// Current stream state
    pub async fn stream_state(&self) -> StreamState {
        self.state.lock().await.stream_state
    }

    /// Kind of the pending command, if any
    pub async fn pending_kind(&self) -> Option<CommandKind> {
        self.state.lock().await.pending.as_ref().map(|p| p.kind)
    }

    /// Send a command and get a completion handle
    ///
    /// Fails immediately with a stream error if another command is pending or
    /// if the stream state forbids the command; in both cases nothing is sent
    /// on the channel.
    pub async fn send_command(&self, command: CommandMessage) -> Result<CommandReceiver> {
        let sink = self
            .sink
            .lock()
            .await
            .clone()
            .ok_or_else(|| Error::DataChannel("Command channel not open".to_string()))?;

        let mut state = self.state.lock().await;

        if let Some(pending) = state.pending.as_ref() {
            return Err(Error::Stream(format!(
                "Another command ({:?}) is already in flight",
                pending.kind
            )));
        }

        let kind = command.kind();
        let legal = match kind {
            CommandKind::Start => state.stream_state.can_start(),
            CommandKind::Interact => state.stream_state.can_interact(),
            CommandKind::End => state.stream_state.can_end(),
        };
        if !legal {
            return Err(Error::Stream(format!(
                "Command {:?} not allowed while stream is {}",
                kind, state.stream_state
            )));
        }

        let payload = Bytes::from(command.to_json()?);
        let (tx, rx) = oneshot::channel();

        state.pending = Some(PendingCommand {
            kind,
            issued_at: Instant::now(),
            tx,
        });
        let previous_state = state.stream_state;
        match kind {
            CommandKind::Start => state.stream_state = StreamState::Starting,
            CommandKind::Interact => {}
            CommandKind::End => state.stream_state = StreamState::Ending,
        }

        debug!("Sending command {:?}", kind);

        // Holding the lock across the send keeps the one-in-flight invariant
        // atomic with the channel write.
        if let Err(e) = sink.send(payload).await {
            state.pending = None;
            state.stream_state = previous_state;
            return Err(e);
        }

        Ok(rx)
    }

    /// Process an inbound event from the streamer
    ///
    /// Completes the pending command when the event is its acknowledgment
    /// counterpart, fails it on `interactive_stream_error`, and advances the
    /// stream state. Unsolicited acknowledgments (e.g. after a reconnect) and
    /// unknown events complete nothing; handler fan-out is the orchestrator's
    /// job and happens for every event regardless of what this returns.
    pub async fn handle_event(&self, event: &StreamEvent) {
        let mut state = self.state.lock().await;

        if let StreamEvent::InteractiveStreamError { reason, message } = event {
            warn!("Stream error from streamer: {}: {}", reason, message);
            state.stream_state = StreamState::Errored;
            if let Some(pending) = state.pending.take() {
                let _ = pending
                    .tx
                    .send(Err(Error::Stream(format!("{}: {}", reason, message))));
            }
            return;
        }

        match event {
            StreamEvent::StreamStarted { .. } => state.stream_state = StreamState::Active,
            StreamEvent::StreamEnded => state.stream_state = StreamState::Ended,
            _ => {}
        }

        let Some(kind) = event.acknowledges() else {
            return;
        };
        let Some(pending) = take_matching(&mut state.pending, kind) else {
            debug!("Unsolicited {:?} acknowledgment", kind);
            return;
        };
        debug!(
            "Command {:?} acknowledged after {:?}",
            kind,
            pending.issued_at.elapsed()
        );
        let outcome = match event {
            StreamEvent::StreamStarted { stream_id } => CommandOutcome::Started {
                stream_id: stream_id.clone(),
            },
            StreamEvent::UpdateAcknowledged { prompt } => CommandOutcome::Acknowledged {
                prompt: prompt.clone(),
            },
            _ => CommandOutcome::Ended,
        };
        let _ = pending.tx.send(Ok(outcome));
    }

    /// Abort the pending command if it is of the given kind
    ///
    /// Used by the orchestrator when the `start_stream` queue timeout
    /// expires: the pending slot is cleared and a `Starting` stream reverts
    /// to `Idle`. Returns whether a command was aborted.
    pub async fn abort_pending(&self, kind: CommandKind) -> bool {
        let mut state = self.state.lock().await;
        if take_matching(&mut state.pending, kind).is_none() {
            return false;
        }
        if kind == CommandKind::Start && state.stream_state == StreamState::Starting {
            state.stream_state = StreamState::Idle;
        }
        true
    }

    /// Reset for a fresh connection
    ///
    /// Detaches the sink, fails any pending command, and returns the stream
    /// state to idle. The stream does not survive the transport, so this runs
    /// on every disconnect and transport loss.
    pub async fn reset(&self, reason: &str) {
        *self.sink.lock().await = None;
        let mut state = self.state.lock().await;
        if let Some(pending) = state.pending.take() {
            debug!("Cancelling pending {:?}: {}", pending.kind, reason);
            let _ = pending.tx.send(Err(Error::Stream(reason.to_string())));
        }
        state.stream_state = StreamState::Idle;
    }
}

impl Default for CommandProtocol {
    fn default() -> Self {
        Self::new()
    }
}

fn take_matching(slot: &mut Option<PendingCommand>, kind: CommandKind) -> Option<PendingCommand> {
    if slot.as_ref().is_some_and(|p| p.kind == kind) {
        slot.take()
    } else {
        None
    }
}
