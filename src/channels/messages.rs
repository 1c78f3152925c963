//! Command and event message types for the data channels
//!
//! The wire format is JSON tagged on `"type"`; the snake_case tags are fixed
//! by the streamer protocol.

use serde::{Deserialize, Serialize};

/// Commands sent client → streamer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandMessage {
    /// Start an interactive stream
    InteractiveStreamStart {
        /// Initial prompt for the generated video
        prompt: String,
        /// Portrait (480x832) vs landscape (832x480) orientation
        portrait: bool,
    },

    /// Send an interaction prompt into the running stream
    Update {
        /// The interaction prompt
        prompt: String,
    },

    /// End the interactive stream
    InteractiveStreamEnd,
}

impl CommandMessage {
    /// The kind used for acknowledgment matching
    pub fn kind(&self) -> CommandKind {
        match self {
            CommandMessage::InteractiveStreamStart { .. } => CommandKind::Start,
            CommandMessage::Update { .. } => CommandKind::Interact,
            CommandMessage::InteractiveStreamEnd => CommandKind::End,
        }
    }

    /// Serialize to the JSON wire format
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self)
            .map_err(|e| crate::Error::Serialization(format!("Failed to serialize command: {}", e)))
    }
}

/// Events received streamer → client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The stream is running; acknowledges `interactive_stream_start`
    StreamStarted {
        /// Stream identifier, usable for recordings lookup
        #[serde(default)]
        stream_id: String,
    },

    /// Acknowledges an `update` command, echoing its prompt
    UpdateAcknowledged {
        /// The echoed prompt
        #[serde(default)]
        prompt: String,
    },

    /// The stream ended; acknowledges `interactive_stream_end`
    StreamEnded,

    /// The streamer reported a stream error
    InteractiveStreamError {
        /// Machine-readable reason
        #[serde(default)]
        reason: String,
        /// Human-readable message
        #[serde(default)]
        message: String,
    },

    /// Any event type this client does not understand (ignored)
    #[serde(other)]
    Unknown,
}

impl StreamEvent {
    /// Parse from the JSON wire format
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::Serialization(format!("Failed to deserialize stream event: {}", e))
        })
    }

    /// The command kind this event acknowledges, if it is an acknowledgment
    pub fn acknowledges(&self) -> Option<CommandKind> {
        match self {
            StreamEvent::StreamStarted { .. } => Some(CommandKind::Start),
            StreamEvent::UpdateAcknowledged { .. } => Some(CommandKind::Interact),
            StreamEvent::StreamEnded => Some(CommandKind::End),
            StreamEvent::InteractiveStreamError { .. } | StreamEvent::Unknown => None,
        }
    }
}

/// Kinds of commands, used to match acknowledgments to the pending command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// `interactive_stream_start`, acknowledged by `stream_started`
    Start,
    /// `update`, acknowledged by `update_acknowledged`
    Interact,
    /// `interactive_stream_end`, acknowledged by `stream_ended`
    End,
}

/// Successful completion payload of a command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// Stream started; carries the stream id
    Started {
        /// Stream identifier
        stream_id: String,
    },
    /// Interaction acknowledged; carries the echoed prompt
    Acknowledged {
        /// The echoed prompt
        prompt: String,
    },
    /// Stream ended
    Ended,
}
