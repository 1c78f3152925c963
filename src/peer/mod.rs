//! WebRTC peer connection and ICE configuration

mod connection;
mod ice;

pub use connection::{DataChannelSink, EngineEvent, PeerConnection};
pub use ice::fetch_ice_servers;
