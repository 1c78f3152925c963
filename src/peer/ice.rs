//! ICE server discovery
//!
//! The signaling host exposes `GET /config` with the STUN/TURN servers to use
//! for this deployment. Discovery failures fall back to a public STUN server
//! so local and dev setups keep working.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};
use webrtc::ice_transport::ice_server::RTCIceServer;

/// STUN server used when the signaling host publishes no configuration
const FALLBACK_STUN_URL: &str = "stun:stun.l.google.com:19302";

const CONFIG_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct IceConfigResponse {
    #[serde(rename = "iceServers", default)]
    ice_servers: Vec<IceServerEntry>,
}

#[derive(Debug, Deserialize)]
struct IceServerEntry {
    urls: OneOrMany,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    credential: Option<String>,
}

/// `urls` arrives as either a single string or an array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(url) => vec![url],
            OneOrMany::Many(urls) => urls,
        }
    }
}

/// Fetch the ICE server list from the signaling host
///
/// Never fails: an unreachable or malformed `/config` endpoint yields the
/// fallback STUN configuration.
pub async fn fetch_ice_servers(signaling_url: &str) -> Vec<RTCIceServer> {
    let config_url = format!("{}/config", http_base(signaling_url));

    let client = match reqwest::Client::builder()
        .timeout(CONFIG_FETCH_TIMEOUT)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!("Failed to build ICE config client: {}", e);
            return fallback_servers();
        }
    };

    let response = match client.get(&config_url).send().await {
        Ok(response) => response,
        Err(e) => {
            debug!("ICE config fetch failed ({}), using fallback: {}", config_url, e);
            return fallback_servers();
        }
    };

    if !response.status().is_success() {
        debug!(
            "ICE config fetch returned {}, using fallback",
            response.status()
        );
        return fallback_servers();
    }

    let config: IceConfigResponse = match response.json().await {
        Ok(config) => config,
        Err(e) => {
            warn!("Malformed ICE config response, using fallback: {}", e);
            return fallback_servers();
        }
    };

    let servers = to_rtc_ice_servers(config);
    if servers.is_empty() {
        return fallback_servers();
    }

    debug!("Using {} ICE server(s) from signaling host", servers.len());
    servers
}

fn to_rtc_ice_servers(config: IceConfigResponse) -> Vec<RTCIceServer> {
    config
        .ice_servers
        .into_iter()
        .map(|entry| RTCIceServer {
            urls: entry.urls.into_vec(),
            username: entry.username.unwrap_or_default(),
            credential: entry.credential.unwrap_or_default(),
            ..Default::default()
        })
        .filter(|server| !server.urls.is_empty())
        .collect()
}

fn fallback_servers() -> Vec<RTCIceServer> {
    vec![RTCIceServer {
        urls: vec![FALLBACK_STUN_URL.to_string()],
        ..Default::default()
    }]
}

/// Rewrite a ws(s) or bare signaling URL to its http(s) origin
fn http_base(url: &str) -> String {
    let url = url.trim_end_matches('/');

    if let Some(rest) = url.strip_prefix("wss://") {
        format!("https://{}", rest)
    } else if let Some(rest) = url.strip_prefix("ws://") {
        format!("http://{}", rest)
    } else if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_base() {
        assert_eq!(http_base("wss://edge.example.com"), "https://edge.example.com");
        assert_eq!(http_base("ws://localhost:8787/"), "http://localhost:8787");
        assert_eq!(http_base("https://edge.example.com"), "https://edge.example.com");
        assert_eq!(http_base("localhost:8787"), "http://localhost:8787");
    }

    #[test]
    fn test_parse_urls_as_string_or_array() {
        let json = r#"{
            "iceServers": [
                {"urls": "stun:stun.example.com:3478"},
                {
                    "urls": ["turn:turn.example.com:3478?transport=udp"],
                    "username": "u",
                    "credential": "c"
                }
            ]
        }"#;

        let config: IceConfigResponse = serde_json::from_str(json).unwrap();
        let servers = to_rtc_ice_servers(config);

        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].urls, vec!["stun:stun.example.com:3478"]);
        assert!(servers[0].username.is_empty());
        assert_eq!(servers[1].username, "u");
        assert_eq!(servers[1].credential, "c");
    }

    #[test]
    fn test_empty_config_yields_fallback() {
        let config: IceConfigResponse = serde_json::from_str(r#"{"iceServers": []}"#).unwrap();
        assert!(to_rtc_ice_servers(config).is_empty());

        let fallback = fallback_servers();
        assert_eq!(fallback.len(), 1);
        assert_eq!(fallback[0].urls, vec![FALLBACK_STUN_URL]);
    }

    #[tokio::test]
    async fn test_unreachable_host_yields_fallback() {
        // Reserved TEST-NET address, nothing listens there
        let servers = fetch_ice_servers("ws://192.0.2.1:1").await;
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].urls, vec![FALLBACK_STUN_URL]);
    }
}
