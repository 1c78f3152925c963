//! WebRTC peer connection wrapper
//!
//! The streamer is the offerer: it creates both data channels and the video
//! track, so this side only answers, accepts whatever channels arrive, and
//! pumps engine activity into an event stream the orchestrator consumes.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

use crate::channels::{CommandSink, CLIENT_TO_STREAMER_LABEL, STREAMER_TO_CLIENT_LABEL};
use crate::types::VideoFrame;
use crate::{Error, Result};

/// Activity reported by the media engine
///
/// Delivered in engine order on an unbounded channel so webrtc callbacks
/// never block; the orchestrator's event loop is the single consumer.
#[derive(Debug)]
pub enum EngineEvent {
    /// The peer connection reached the connected state
    Connected,
    /// The peer connection disconnected, failed, or closed
    Disconnected,
    /// The `clientToStreamer` channel opened
    OutboundChannelOpen,
    /// The `streamerToClient` channel opened
    InboundChannelOpen,
    /// A message arrived on the `streamerToClient` channel
    InboundMessage(Bytes),
    /// A video frame arrived on the remote video track
    VideoFrame(VideoFrame),
    /// The engine gathered a local ICE candidate to send to the streamer
    LocalCandidate {
        /// Candidate string
        candidate: String,
        /// SDP media stream identification
        sdp_mid: Option<String>,
        /// SDP media line index
        sdp_m_line_index: Option<u16>,
    },
}

/// Answering peer connection for one streaming session
pub struct PeerConnection {
    pc: Arc<RTCPeerConnection>,
    outbound: Arc<RwLock<Option<Arc<RTCDataChannel>>>>,
}

impl PeerConnection {
    /// Create a peer connection and its engine event stream
    pub async fn new(
        ice_servers: Vec<RTCIceServer>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<EngineEvent>)> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::WebRtc(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine)
                .map_err(|e| Error::WebRtc(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|e| Error::WebRtc(format!("Failed to create peer connection: {}", e)))?,
        );

        let (events, events_rx) = mpsc::unbounded_channel();
        let outbound = Arc::new(RwLock::new(None));

        Self::wire_state_changes(&pc, events.clone());
        Self::wire_ice_candidates(&pc, events.clone());
        Self::wire_data_channels(&pc, Arc::clone(&outbound), events.clone());
        Self::wire_tracks(&pc, events);

        Ok((Self { pc, outbound }, events_rx))
    }

    fn wire_state_changes(
        pc: &Arc<RTCPeerConnection>,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) {
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let events = events.clone();
            Box::pin(async move {
                debug!("Peer connection state: {}", state);
                let event = match state {
                    RTCPeerConnectionState::Connected => EngineEvent::Connected,
                    RTCPeerConnectionState::Disconnected
                    | RTCPeerConnectionState::Failed
                    | RTCPeerConnectionState::Closed => EngineEvent::Disconnected,
                    _ => return,
                };
                let _ = events.send(event);
            })
        }));
    }

    fn wire_ice_candidates(
        pc: &Arc<RTCPeerConnection>,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) {
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = events.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    // End of gathering
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = events.send(EngineEvent::LocalCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_m_line_index: init.sdp_mline_index,
                        });
                    }
                    Err(e) => warn!("Failed to serialize local ICE candidate: {}", e),
                }
            })
        }));
    }

    fn wire_data_channels(
        pc: &Arc<RTCPeerConnection>,
        outbound: Arc<RwLock<Option<Arc<RTCDataChannel>>>>,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) {
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let outbound = Arc::clone(&outbound);
            let events = events.clone();
            Box::pin(async move {
                let label = dc.label().to_string();
                debug!("Data channel announced: {}", label);

                match label.as_str() {
                    CLIENT_TO_STREAMER_LABEL => {
                        *outbound.write().await = Some(Arc::clone(&dc));
                        let events = events.clone();
                        dc.on_open(Box::new(move || {
                            let events = events.clone();
                            Box::pin(async move {
                                info!("Outbound command channel open");
                                let _ = events.send(EngineEvent::OutboundChannelOpen);
                            })
                        }));
                    }
                    STREAMER_TO_CLIENT_LABEL => {
                        let open_events = events.clone();
                        dc.on_open(Box::new(move || {
                            let events = open_events.clone();
                            Box::pin(async move {
                                info!("Inbound event channel open");
                                let _ = events.send(EngineEvent::InboundChannelOpen);
                            })
                        }));

                        dc.on_message(Box::new(move |msg| {
                            let events = events.clone();
                            Box::pin(async move {
                                let _ = events.send(EngineEvent::InboundMessage(msg.data));
                            })
                        }));
                    }
                    other => {
                        warn!("Ignoring unexpected data channel: {}", other);
                    }
                }
            })
        }));
    }

    fn wire_tracks(pc: &Arc<RTCPeerConnection>, events: mpsc::UnboundedSender<EngineEvent>) {
        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
            let events = events.clone();
            Box::pin(async move {
                if track.kind() != RTPCodecType::Video {
                    debug!("Ignoring non-video track: {}", track.kind());
                    return;
                }

                info!("Remote video track attached");
                tokio::spawn(pump_video_track(track, events));
            })
        }));
    }

    /// Accept the streamer's SDP offer and produce the answer
    pub async fn accept_offer(&self, offer_sdp: String) -> Result<String> {
        let offer = RTCSessionDescription::offer(offer_sdp)
            .map_err(|e| Error::Sdp(format!("Failed to parse offer: {}", e)))?;

        self.pc
            .set_remote_description(offer)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to set remote description: {}", e)))?;

        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to create answer: {}", e)))?;

        self.pc
            .set_local_description(answer)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to set local description: {}", e)))?;

        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| Error::Sdp("No local description after setting answer".to_string()))?;

        debug!("Created SDP answer");
        Ok(local.sdp)
    }

    /// Add an ICE candidate received from the streamer
    pub async fn add_remote_candidate(
        &self,
        candidate: String,
        sdp_mid: Option<String>,
        sdp_m_line_index: Option<u16>,
    ) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate,
            sdp_mid,
            sdp_mline_index: sdp_m_line_index,
            username_fragment: None,
        };

        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::IceCandidate(format!("Failed to add ICE candidate: {}", e)))
    }

    /// Sending handle for the outbound command channel, once announced
    pub async fn outbound_sink(&self) -> Option<Arc<DataChannelSink>> {
        self.outbound
            .read()
            .await
            .as_ref()
            .map(|dc| Arc::new(DataChannelSink::new(Arc::clone(dc))))
    }

    /// Close the peer connection
    pub async fn close(&self) -> Result<()> {
        self.pc
            .close()
            .await
            .map_err(|e| Error::WebRtc(format!("Failed to close peer connection: {}", e)))
    }
}

async fn pump_video_track(track: Arc<TrackRemote>, events: mpsc::UnboundedSender<EngineEvent>) {
    loop {
        match track.read_rtp().await {
            Ok((packet, _attributes)) => {
                let frame = VideoFrame {
                    data: packet.payload,
                    width: 0,
                    height: 0,
                    // 90 kHz video clock
                    timestamp_ms: u64::from(packet.header.timestamp) / 90,
                };
                if events.send(EngineEvent::VideoFrame(frame)).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("Video track ended: {}", e);
                break;
            }
        }
    }
}

/// [`CommandSink`] over the outbound data channel
pub struct DataChannelSink {
    channel: Arc<RTCDataChannel>,
}

impl DataChannelSink {
    fn new(channel: Arc<RTCDataChannel>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl CommandSink for DataChannelSink {
    async fn send(&self, payload: Bytes) -> Result<()> {
        self.channel
            .send(&payload)
            .await
            .map(|_| ())
            .map_err(|e| Error::DataChannel(format!("Failed to send command: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn streamer_side() -> Arc<RTCPeerConnection> {
        let mut me = MediaEngine::default();
        me.register_default_codecs().unwrap();
        let registry = register_default_interceptors(Default::default(), &mut me).unwrap();
        let api = APIBuilder::new()
            .with_media_engine(me)
            .with_interceptor_registry(registry)
            .build();
        Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_new_has_no_outbound_channel() {
        let (pc, _events) = PeerConnection::new(vec![]).await.unwrap();
        assert!(pc.outbound_sink().await.is_none());
        pc.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_accept_offer_produces_answer() {
        let streamer = streamer_side().await;
        streamer
            .create_data_channel(CLIENT_TO_STREAMER_LABEL, None)
            .await
            .unwrap();
        let offer = streamer.create_offer(None).await.unwrap();
        streamer.set_local_description(offer.clone()).await.unwrap();

        let (pc, _events) = PeerConnection::new(vec![]).await.unwrap();
        let answer = pc.accept_offer(offer.sdp).await.unwrap();

        assert!(!answer.is_empty());
        // The answer must cover the data channel media section
        assert!(answer.contains("application"));

        pc.close().await.unwrap();
        streamer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_accept_garbage_offer_fails() {
        let (pc, _events) = PeerConnection::new(vec![]).await.unwrap();
        let err = pc.accept_offer("not sdp".to_string()).await.unwrap_err();
        assert!(matches!(err, Error::Sdp(_)));
        pc.close().await.unwrap();
    }
}
