//! Data-channel command protocol
//!
//! Turns the `clientToStreamer` / `streamerToClient` byte channels into a
//! request/acknowledgment API for stream lifecycle commands.

mod messages;
mod protocol;

pub use messages::{CommandKind, CommandMessage, CommandOutcome, StreamEvent};
pub use protocol::{CommandProtocol, CommandReceiver, CommandSink};

/// Label of the outbound (commands) data channel
pub const CLIENT_TO_STREAMER_LABEL: &str = "clientToStreamer";

/// Label of the inbound (events) data channel
pub const STREAMER_TO_CLIENT_LABEL: &str = "streamerToClient";
