//! Signaling client for peer connection negotiation
//!
//! A WebSocket connection to the session's signaling endpoint carries the
//! typed negotiation messages (offer, answer, ICE candidates, server errors)
//! plus keepalives. Messages are delivered in receipt order; closure is
//! surfaced as a distinguished event rather than an error.

mod channel;
pub mod protocol;

pub use channel::{SignalingChannel, SignalingEvent, SignalingSender};
pub use protocol::{describe_error_reason, SignalingMessage};
