//! YouTube Data API resumable uploads

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{error_body, HttpClients, Platform, PlatformKind, PlatformResult, VideoUpload};
use crate::error::PlatformError;
use crate::files::TempFileStore;

pub struct YouTubeClient {
    http: HttpClients,
    base_url: String,
    access_token: SecretString,
    files: Arc<TempFileStore>,
}

#[derive(Debug, Deserialize)]
struct UploadedVideo {
    id: String,
}

impl YouTubeClient {
    pub fn new(
        http: HttpClients,
        base_url: impl Into<String>,
        access_token: SecretString,
        files: Arc<TempFileStore>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token,
            files,
        }
    }

    /// Open a resumable upload session and return its upload URL
    async fn start_session(&self, video: &VideoUpload, size: usize) -> PlatformResult<String> {
        let url = format!(
            "{}/upload/youtube/v3/videos?uploadType=resumable&part=snippet,status",
            self.base_url
        );

        let title = match video.title_or_caption() {
            t if t.trim().is_empty() => "Untitled".to_string(),
            t => t,
        };

        let response = self
            .http
            .api
            .post(&url)
            .bearer_auth(self.access_token.expose_secret())
            .header("X-Upload-Content-Type", "video/mp4")
            .header("X-Upload-Content-Length", size.to_string())
            .json(&json!({
                "snippet": {
                    "title": title,
                    "description": video.caption(),
                    "tags": video.normalized_tags()
                },
                "status": {
                    "privacyStatus": "private"
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PlatformError::Api(format!(
                "YouTube upload session failed: {}",
                error_body(response).await
            )));
        }

        response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PlatformError::Api("YouTube did not return an upload location".to_string()))
    }

    async fn send_bytes(&self, location: &str, bytes: Vec<u8>) -> PlatformResult<String> {
        let response = self
            .http
            .media
            .put(location)
            .bearer_auth(self.access_token.expose_secret())
            .header("Content-Type", "video/mp4")
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PlatformError::Api(format!(
                "YouTube video upload failed: {}",
                error_body(response).await
            )));
        }

        let uploaded: UploadedVideo = response
            .json()
            .await
            .map_err(|e| PlatformError::Api(format!("YouTube returned an unexpected body: {}", e)))?;
        Ok(uploaded.id)
    }
}

#[async_trait]
impl Platform for YouTubeClient {
    fn kind(&self) -> PlatformKind {
        PlatformKind::YouTube
    }

    async fn publish(&self, _content: &str, _media_urls: &[String]) -> PlatformResult<String> {
        Err(PlatformError::Validation(
            "YouTube posts require a video".to_string(),
        ))
    }

    async fn publish_video(&self, video: &VideoUpload) -> PlatformResult<String> {
        let video_id = self
            .files
            .process_upload(&video.url, ".mp4", |artifact| async move {
                let bytes = tokio::fs::read(&artifact)
                    .await
                    .map_err(|e| PlatformError::Io(format!("{}: {}", artifact.display(), e)))?;
                let location = self.start_session(video, bytes.len()).await?;
                debug!("YouTube upload session opened");
                self.send_bytes(&location, bytes).await
            })
            .await?;

        info!(video_id = %video_id, "Uploaded private YouTube video");
        Ok(video_id)
    }
}
