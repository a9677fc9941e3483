//! Meeting directory: REST lookups of meeting metadata
//!
//! # Endpoints
//!
//! - `GET  {base}/meetings/{roomId}` returns [`MeetingMetadata`]
//! - `POST {base}/meetings/start` with `{"applicationId": ..}` returns `{"roomId": ..}`
//!
//! Requests carry `Authorization: Bearer <token>` when a token is configured.

use crate::participant::{Participant, PeerId, RoomId};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Scheduling status reported by the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    /// Not started yet
    #[default]
    Scheduled,
    /// In progress
    Active,
    /// Over; joining is refused
    Ended,
    /// Anything this client does not know
    #[serde(other)]
    Unknown,
}

/// Meeting metadata needed to join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingMetadata {
    /// Room identifier
    pub room_id: RoomId,
    /// Scheduling status
    #[serde(default)]
    pub status: ScheduleStatus,
    /// Participant allowed to end the meeting
    pub host_id: PeerId,
    /// Invited participants
    #[serde(default)]
    pub participants: Vec<Participant>,
}

impl MeetingMetadata {
    /// Metadata for a room not backed by a directory
    pub fn ad_hoc(room_id: impl Into<RoomId>, host_id: impl Into<PeerId>) -> Self {
        Self {
            room_id: room_id.into(),
            status: ScheduleStatus::Active,
            host_id: host_id.into(),
            participants: Vec::new(),
        }
    }
}

/// Source of meeting metadata
#[async_trait]
pub trait MeetingDirectory: Send + Sync {
    /// Look up a meeting
    async fn fetch_meeting(&self, room_id: &str) -> Result<MeetingMetadata>;

    /// Start a meeting for an application; returns the new room id
    async fn start_session(&self, application_id: &str) -> Result<RoomId>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest<'a> {
    application_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    room_id: RoomId,
}

/// [`MeetingDirectory`] over HTTP/JSON
pub struct HttpMeetingDirectory {
    /// Base URL (e.g. "https://api.example.com")
    base_url: String,

    /// Optional bearer token
    auth_token: Option<String>,

    client: reqwest::Client,
}

impl HttpMeetingDirectory {
    /// Create a directory client
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] when `base_url` is not http(s).
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::InvalidConfig(format!(
                "Directory base_url must start with http:// or https://, got: {}",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::DirectoryError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url,
            auth_token,
            client,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::DirectoryError(format!(
                "HTTP {} {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
                error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::DirectoryError(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl MeetingDirectory for HttpMeetingDirectory {
    async fn fetch_meeting(&self, room_id: &str) -> Result<MeetingMetadata> {
        let url = format!("{}/meetings/{}", self.base_url, room_id);
        tracing::debug!("Fetching meeting metadata: {}", url);

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| Error::DirectoryError(format!("HTTP request failed: {}", e)))?;

        Self::read_json(response).await
    }

    async fn start_session(&self, application_id: &str) -> Result<RoomId> {
        let url = format!("{}/meetings/start", self.base_url);

        let response = self
            .authorize(self.client.post(&url).json(&StartRequest { application_id }))
            .send()
            .await
            .map_err(|e| Error::DirectoryError(format!("HTTP request failed: {}", e)))?;

        let started: StartResponse = Self::read_json(response).await?;
        tracing::info!("Started meeting {} for {}", started.room_id, application_id);
        Ok(started.room_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_directory() {
        assert!(HttpMeetingDirectory::new("https://api.example.com/", None).is_ok());
        assert!(HttpMeetingDirectory::new("http://localhost:3000", Some("t".to_string())).is_ok());
    }

    #[test]
    fn test_invalid_url_scheme() {
        assert!(matches!(
            HttpMeetingDirectory::new("ftp://invalid.com", None),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_metadata_json_shape() {
        let json = r#"{
            "roomId": "r-42",
            "status": "active",
            "hostId": "recruiter-1",
            "participants": [
                {"id": "recruiter-1", "role": "host", "displayName": "Sam"},
                {"id": "cand-9", "displayName": "Alex"}
            ]
        }"#;
        let meta: MeetingMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.status, ScheduleStatus::Active);
        assert_eq!(meta.host_id, "recruiter-1");
        assert_eq!(meta.participants.len(), 2);

        let meta: MeetingMetadata =
            serde_json::from_str(r#"{"roomId":"r","status":"archived","hostId":"h"}"#).unwrap();
        assert_eq!(meta.status, ScheduleStatus::Unknown);
        assert!(meta.participants.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_unreachable_is_directory_error() {
        let directory = HttpMeetingDirectory::new("http://127.0.0.1:1", None).unwrap();
        assert!(matches!(
            directory.fetch_meeting("r").await,
            Err(Error::DirectoryError(_))
        ));
    }
}
