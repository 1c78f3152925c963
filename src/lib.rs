//! Client SDK for Mirage interactive audio-visual streaming
//!
//! Connects to the Mirage platform, negotiates a WebRTC session with an
//! assigned streamer, and drives interactive video generation over data
//! channels.
//!
//! # Features
//!
//! - Full connection handshake: API key exchange, session brokering,
//!   WebSocket signaling, and peer negotiation
//! - Stream lifecycle commands with acknowledgment matching
//!   ([`Client::start_stream`], [`Client::interact`], [`Client::end_stream`])
//! - Automatic reconnection with exponential backoff on transport loss
//! - Video frame delivery and lifecycle callbacks via [`EventHandlers`]
//! - Recordings lookup independent of any live connection
//!
//! # Example
//!
//! ```no_run
//! use mirage_client::{Client, EventHandlers};
//!
//! #[tokio::main]
//! async fn main() -> mirage_client::Result<()> {
//!     let client = Client::with_api_key("mk_your_api_key")?;
//!
//!     let handlers = EventHandlers::new()
//!         .on_video_frame(|frame| {
//!             println!("frame: {} bytes at {}ms", frame.data.len(), frame.timestamp_ms);
//!         })
//!         .on_stream_error(|reason, message| {
//!             eprintln!("stream error {}: {}", reason, message);
//!         });
//!
//!     client.connect(handlers).await?;
//!
//!     let stream_id = client.start_stream("A cat sitting on a windowsill", true).await?;
//!     println!("streaming: {}", stream_id);
//!
//!     client.interact("Pet the cat").await?;
//!     client.end_stream().await?;
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod channels;
pub mod client;
pub mod config;
pub mod error;
pub mod peer;
pub mod recordings;
pub mod retry;
pub mod signaling;
pub mod types;

pub use client::{Client, EventHandlers};
pub use config::{ClientConfig, DevConfig};
pub use error::{Error, Result};
pub use retry::RetryPolicy;
pub use types::{
    ConnectionStatus, Recording, Session, StreamRecordingInfo, StreamRecordingsList, StreamState,
    VideoFrame,
};

/// Crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::version().is_empty());
    }
}
