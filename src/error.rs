//! Error types for the streaming client

/// Result type alias using the client Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in client operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Credential rejected by the platform
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Handshake or transport failure (including capacity exhaustion)
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Signaling channel error
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    Sdp(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidate(String),

    /// Data channel error
    #[error("Data channel error: {0}")]
    DataChannel(String),

    /// Illegal or failed stream command
    #[error("Stream error: {0}")]
    Stream(String),

    /// Operation timeout
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// Recording not found or not accessible
    #[error("Recording not found: {0}")]
    RecordingNotFound(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// WebRTC library error
    #[error("WebRTC error: {0}")]
    WebRtc(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is a credential rejection
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    /// Check if this error is a stream command failure
    pub fn is_stream(&self) -> bool {
        matches!(self, Error::Stream(_))
    }

    /// Check if this error counts as a retryable handshake failure
    ///
    /// Credential rejections and illegal commands are deterministic and never
    /// consume the retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Connection(_)
                | Error::Signaling(_)
                | Error::Sdp(_)
                | Error::IceCandidate(_)
                | Error::DataChannel(_)
                | Error::Timeout(_)
                | Error::WebRtc(_)
                | Error::Io(_)
        )
    }
}
