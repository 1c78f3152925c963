//! Signaling message types
//!
//! JSON messages tagged on `"type"`. ICE candidate fields keep their
//! camelCase wire names (`sdpMid`, `sdpMLineIndex`) for compatibility with
//! the signaling server.

use serde::{Deserialize, Serialize};

/// Messages exchanged with the signaling server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalingMessage {
    /// Remote session description from the streamer
    Offer {
        /// SDP offer
        sdp: String,
    },

    /// Local session description sent back to the streamer
    Answer {
        /// SDP answer
        sdp: String,
    },

    /// Network path proposal, exchanged in both directions
    IceCandidate {
        /// ICE candidate string
        candidate: String,
        /// SDP media stream identification
        #[serde(rename = "sdpMid", skip_serializing_if = "Option::is_none")]
        sdp_mid: Option<String>,
        /// SDP media line index
        #[serde(rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
        sdp_m_line_index: Option<u16>,
    },

    /// Server-reported error (e.g. streamer not available)
    Error {
        /// Machine-readable reason
        #[serde(default)]
        reason: String,
    },

    /// Periodic liveness message
    Keepalive,

    /// Courtesy notice sent before a clean client disconnect
    ClientDisconnecting,

    /// Any message type this client does not understand (ignored)
    #[serde(other)]
    Unknown,
}

impl SignalingMessage {
    /// Serialize to the JSON wire format
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::Serialization(format!("Failed to serialize signaling message: {}", e))
        })
    }

    /// Parse from the JSON wire format
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::Serialization(format!("Failed to deserialize signaling message: {}", e))
        })
    }
}

/// Human-readable message for a server-reported error reason
pub fn describe_error_reason(reason: &str) -> String {
    match reason {
        "streamer_not_available" => {
            "Streamer not available. Please ensure the streamer is running.".to_string()
        }
        "streamer_disconnected" => "Streamer has disconnected.".to_string(),
        "" | "unknown" => "An unknown error occurred.".to_string(),
        other => format!("Server error: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_round_trip() {
        let msg = SignalingMessage::Offer {
            sdp: "v=0\r\no=- ...".to_string(),
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"offer\""));
        assert_eq!(SignalingMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_ice_candidate_wire_field_names() {
        let msg = SignalingMessage::IceCandidate {
            candidate: "candidate:0 1 UDP 2122252543 192.0.2.1 54321 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
        };

        let json = msg.to_json().unwrap();
        assert!(json.contains("\"sdpMid\""));
        assert!(json.contains("\"sdpMLineIndex\""));
        assert_eq!(SignalingMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_ice_candidate_optional_fields_omitted() {
        let msg = SignalingMessage::IceCandidate {
            candidate: "candidate:...".to_string(),
            sdp_mid: None,
            sdp_m_line_index: None,
        };

        let json = msg.to_json().unwrap();
        assert!(!json.contains("sdpMid"));
        assert!(!json.contains("sdpMLineIndex"));
    }

    #[test]
    fn test_keepalive_tag() {
        let json = SignalingMessage::Keepalive.to_json().unwrap();
        assert_eq!(json, r#"{"type":"keepalive"}"#);
    }

    #[test]
    fn test_error_without_reason() {
        let msg = SignalingMessage::from_json(r#"{"type":"error"}"#).unwrap();
        assert_eq!(
            msg,
            SignalingMessage::Error {
                reason: String::new()
            }
        );
    }

    #[test]
    fn test_unknown_type_tolerated() {
        let msg = SignalingMessage::from_json(r#"{"type":"connected","peer":"x"}"#).unwrap();
        assert_eq!(msg, SignalingMessage::Unknown);
    }

    #[test]
    fn test_describe_error_reason() {
        assert!(describe_error_reason("streamer_not_available").contains("not available"));
        assert!(describe_error_reason("unknown").contains("unknown error"));
        assert_eq!(describe_error_reason("overloaded"), "Server error: overloaded");
    }
}
