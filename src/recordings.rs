//! Recordings API client
//!
//! Stateless listing/fetch of stream recordings. Works with or without an
//! active streaming connection; only a valid API key is needed. Shares the
//! cached bearer token with [`AuthClient`].

use std::sync::Arc;

use reqwest::StatusCode;
use tracing::debug;

use crate::auth::AuthClient;
use crate::types::{Recording, StreamRecordingsList};
use crate::{Error, Result};

/// Client for the recordings endpoints
pub struct RecordingsClient {
    auth: Arc<AuthClient>,
    api_url: String,
    http: reqwest::Client,
}

impl RecordingsClient {
    /// Create a new recordings client sharing the given auth client
    pub fn new(auth: Arc<AuthClient>, api_url: impl Into<String>) -> Self {
        Self {
            auth,
            api_url: api_url.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Get recording data for a stream
    ///
    /// `GET /recordings/{stream_id}`. Returns presigned URLs valid for a
    /// limited time.
    pub async fn get_recording(&self, stream_id: &str) -> Result<Recording> {
        debug!("Getting recording for stream {}", stream_id);

        let bearer = self.auth.bearer_token().await?;
        let url = format!("{}/recordings/{}", self.api_url, stream_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&bearer)
            .send()
            .await
            .map_err(|e| Error::Connection(format!("Failed to get recording: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(Error::RecordingNotFound(stream_id.to_string()));
            }
            StatusCode::UNAUTHORIZED => {
                return Err(Error::Auth("Not authorized".to_string()));
            }
            status if !status.is_success() => {
                return Err(Error::Connection(format!(
                    "Failed to get recording: {}",
                    status
                )));
            }
            _ => {}
        }

        response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Invalid recording response: {}", e)))
    }

    /// List stream recordings for the authenticated user
    ///
    /// `GET /stream-recordings`, most recent first. `limit` and `offset`
    /// paginate; the server default applies when omitted.
    pub async fn list_stream_recordings(
        &self,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<StreamRecordingsList> {
        debug!("Listing stream recordings");

        let bearer = self.auth.bearer_token().await?;
        let url = format!("{}/stream-recordings", self.api_url);

        let mut request = self.http.get(&url).bearer_auth(&bearer);
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        if let Some(offset) = offset {
            request = request.query(&[("offset", offset)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Connection(format!("Failed to list stream recordings: {}", e)))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => {
                return Err(Error::Auth("Not authorized".to_string()));
            }
            status if !status.is_success() => {
                return Err(Error::Connection(format!(
                    "Failed to list stream recordings: {}",
                    status
                )));
            }
            _ => {}
        }

        response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Invalid recordings list response: {}", e)))
    }
}
