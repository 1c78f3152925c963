//! Authentication and session brokering client
//!
//! Performs the three credential exchanges of the handshake: API key for a
//! bearer token, bearer token for a session assignment, session assignment
//! for a session token. No retry happens here; the orchestrator owns the
//! retry policy.

use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::Session;
use crate::{Error, Result};

/// Buffer before token expiry at which the cached token is considered stale
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default bearer token lifetime when the server omits `expires_in`
const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    api_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
struct SessionTokenRequest<'a> {
    session_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct SessionTokenResponse {
    session_token: String,
}

/// Session assignment returned by the broker
///
/// The broker spells the signaling field `signalling_url` on the wire.
#[derive(Debug, Deserialize)]
struct SessionAssignment {
    session_id: String,
    #[serde(rename = "signalling_url")]
    signaling_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    detail: Option<String>,
}

struct BearerToken {
    token: String,
    expires_at: Instant,
}

impl BearerToken {
    fn is_valid(&self) -> bool {
        Instant::now() + TOKEN_EXPIRY_BUFFER < self.expires_at
    }
}

/// Client for the platform's auth and session-broker endpoints
///
/// Stateless beyond the cached bearer token, which is shared with the
/// recordings client.
pub struct AuthClient {
    api_url: String,
    api_key: String,
    http: reqwest::Client,
    token: RwLock<Option<BearerToken>>,
}

impl AuthClient {
    /// Create a new auth client
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            http: reqwest::Client::new(),
            token: RwLock::new(None),
        }
    }

    /// Get a valid bearer token, exchanging the API key if needed
    ///
    /// `POST /auth/token`. The token is cached until shortly before expiry.
    pub async fn bearer_token(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.is_valid() {
                return Ok(token.token.clone());
            }
        }

        debug!("Exchanging API key for bearer token");

        let url = format!("{}/auth/token", self.api_url);
        let response = self
            .http
            .post(&url)
            .json(&TokenRequest {
                api_key: &self.api_key,
            })
            .send()
            .await
            .map_err(|e| Error::Connection(format!("Token exchange failed: {}", e)))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => {
                return Err(Error::Auth("Invalid API key".to_string()));
            }
            StatusCode::FORBIDDEN => {
                let detail = read_detail(response).await;
                return Err(Error::Auth(
                    detail.unwrap_or_else(|| "API key access denied".to_string()),
                ));
            }
            StatusCode::UNPROCESSABLE_ENTITY => {
                return Err(Error::Auth("Invalid API key format".to_string()));
            }
            status if !status.is_success() => {
                return Err(Error::Connection(format!(
                    "Authentication failed: {}",
                    status
                )));
            }
            _ => {}
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Invalid auth response: {}", e)))?;

        let ttl = Duration::from_secs(body.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS));
        debug!("Bearer token obtained, expires in {:?}", ttl);

        let token = body.access_token.clone();
        *self.token.write().await = Some(BearerToken {
            token: body.access_token,
            expires_at: Instant::now() + ttl,
        });

        Ok(token)
    }

    /// Acquire a streaming session
    ///
    /// Runs the full three-exchange sequence and returns the assembled
    /// [`Session`]. A 503 from the broker means no stream capacity is
    /// available right now; the orchestrator decides whether to retry.
    pub async fn acquire_session(&self) -> Result<Session> {
        let bearer = self.bearer_token().await?;

        debug!("Requesting session from broker at {}", self.api_url);

        let url = format!("{}/sessions/request", self.api_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&bearer)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| Error::Connection(format!("Session request failed: {}", e)))?;

        match response.status() {
            StatusCode::SERVICE_UNAVAILABLE => {
                return Err(Error::Connection(
                    "No streamers available. Please try again later.".to_string(),
                ));
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let detail = read_detail(response).await;
                return Err(Error::Connection(
                    detail.unwrap_or_else(|| "Request limit exceeded".to_string()),
                ));
            }
            status if !status.is_success() => {
                return Err(Error::Connection(format!(
                    "Session request failed: {}",
                    status
                )));
            }
            _ => {}
        }

        let assignment: SessionAssignment = response.json().await.map_err(|e| {
            Error::Serialization(format!(
                "Invalid broker response: missing session_id or signalling_url: {}",
                e
            ))
        })?;

        debug!(
            "Broker assigned session {} at {}",
            assignment.session_id, assignment.signaling_url
        );

        let session_token = self.session_token(&assignment.session_id).await?;

        Ok(Session {
            session_id: assignment.session_id,
            signaling_url: assignment.signaling_url,
            session_token: Some(session_token),
        })
    }

    /// Exchange a session assignment for a session token
    ///
    /// `POST /sessions/token`; the token authenticates the signaling
    /// connection for this session.
    pub async fn session_token(&self, session_id: &str) -> Result<String> {
        let bearer = self.bearer_token().await?;

        debug!("Fetching session token for session {}", session_id);

        let url = format!("{}/sessions/token", self.api_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&bearer)
            .json(&SessionTokenRequest { session_id })
            .send()
            .await
            .map_err(|e| Error::Connection(format!("Session token request failed: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(Error::Connection(
                    "Session not found or not authorized".to_string(),
                ));
            }
            status if !status.is_success() => {
                return Err(Error::Connection(format!(
                    "Failed to get session token: {}",
                    status
                )));
            }
            _ => {}
        }

        let body: SessionTokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Invalid session token response: {}", e)))?;

        Ok(body.session_token)
    }
}

async fn read_detail(response: reqwest::Response) -> Option<String> {
    response
        .json::<ErrorDetail>()
        .await
        .ok()
        .and_then(|d| d.detail)
}
