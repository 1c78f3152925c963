//! Public data types for the streaming client

use bytes::Bytes;
use serde::Deserialize;

/// Connection status of the client
///
/// Exactly one value is current per client instance; transitions happen only
/// inside the orchestrator. `Failed` and `Disconnected` are terminal until a
/// new `connect()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Exchanging credentials with the platform API
    Authenticating,
    /// Driving the signaling/peer-connection handshake
    Connecting,
    /// Re-running the handshake after an unexpected transport loss
    Reconnecting,
    /// Connected and ready for stream commands
    Connected,
    /// Disconnected cleanly
    Disconnected,
    /// Connection failed (fatal until a new connect)
    Failed,
}

impl ConnectionStatus {
    /// Lowercase name used in log and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Authenticating => "authenticating",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Reconnecting => "reconnecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Failed => "failed",
        }
    }

    /// Whether a connection attempt or live connection is in progress
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Authenticating
                | ConnectionStatus::Connecting
                | ConnectionStatus::Reconnecting
                | ConnectionStatus::Connected
        )
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of the interactive stream
///
/// One instance per client; gates which commands are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No stream started
    Idle,
    /// `interactive_stream_start` sent, waiting for `stream_started`
    Starting,
    /// Stream running, interactions allowed
    Active,
    /// `interactive_stream_end` sent, waiting for `stream_ended`
    Ending,
    /// Stream ended cleanly
    Ended,
    /// Streamer reported a stream error
    Errored,
}

impl StreamState {
    /// Whether a new stream may be started from this state
    ///
    /// Starting a fresh stream is also the recovery path after an error.
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            StreamState::Idle | StreamState::Ended | StreamState::Errored
        )
    }

    /// Whether an interaction prompt may be sent
    pub fn can_interact(&self) -> bool {
        matches!(self, StreamState::Active)
    }

    /// Whether the stream may be ended
    pub fn can_end(&self) -> bool {
        matches!(self, StreamState::Active)
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StreamState::Idle => "idle",
            StreamState::Starting => "starting",
            StreamState::Active => "active",
            StreamState::Ending => "ending",
            StreamState::Ended => "ended",
            StreamState::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// A brokered streaming session assignment
///
/// Immutable once assigned; discarded on disconnect.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session identifier assigned by the broker
    pub session_id: String,
    /// Signaling endpoint for this session
    pub signaling_url: String,
    /// Short-lived token authenticating the signaling connection
    pub session_token: Option<String>,
}

/// A video frame received from the interactive stream
///
/// The payload is whatever the media engine produced for the remote video
/// track; the client forwards it without decoding. Dimensions are zero when
/// the payload has not been decoded.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Frame payload
    pub data: Bytes,
    /// Frame width in pixels (0 if unknown)
    pub width: u32,
    /// Frame height in pixels (0 if unknown)
    pub height: u32,
    /// Presentation timestamp in milliseconds
    pub timestamp_ms: u64,
}

/// Recording data with presigned URLs for a stream
///
/// URLs are valid for a limited time (typically one hour).
#[derive(Debug, Clone, Deserialize)]
pub struct Recording {
    /// Unique identifier for the stream
    pub stream_id: String,
    /// Presigned URL for the video file
    pub video_url: Option<String>,
    /// Presigned URL for the events JSON file
    pub events_url: Option<String>,
    /// Presigned URL for the thumbnail image
    pub thumbnail_url: Option<String>,
    /// Presigned URL for the preview video
    pub preview_url: Option<String>,
    /// Total number of frames in the recording
    pub frame_count: Option<u64>,
    /// Duration of the recording in seconds
    pub duration_seconds: Option<f64>,
}

/// Summary info for one stream recording in a listing
#[derive(Debug, Clone, Deserialize)]
pub struct StreamRecordingInfo {
    /// Unique identifier for the stream
    pub stream_id: String,
    /// Video width in pixels
    pub width: u32,
    /// Video height in pixels
    pub height: u32,
    /// ISO 8601 timestamp when the stream started
    pub started_at: String,
    /// ISO 8601 timestamp when the stream ended (None if still active)
    pub ended_at: Option<String>,
    /// Duration in seconds (None if still active)
    pub duration_seconds: Option<f64>,
}

/// Paginated list of stream recordings
#[derive(Debug, Clone, Deserialize)]
pub struct StreamRecordingsList {
    /// Recordings in this page, most recent first
    pub recordings: Vec<StreamRecordingInfo>,
    /// Total number of recordings available
    pub total: u64,
    /// Page size used by the server
    pub limit: u64,
    /// Number of recordings skipped
    pub offset: u64,
}
