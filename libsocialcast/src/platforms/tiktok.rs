//! TikTok Content Posting API
//!
//! TikTok does not pull from a URL, so the video is fetched into the
//! temporary file store, pushed to TikTok's upload URL, and then published.
//! Posts are always created with `SELF_ONLY` privacy.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{error_body, HttpClients, Platform, PlatformKind, PlatformResult, VideoUpload};
use crate::error::PlatformError;
use crate::files::TempFileStore;

pub struct TikTokClient {
    http: HttpClients,
    base_url: String,
    access_token: SecretString,
    files: Arc<TempFileStore>,
}

#[derive(Debug, Deserialize)]
struct TikTokResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct UploadInit {
    publish_id: String,
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct PublishData {
    publish_id: Option<String>,
}

/// Description with the normalized tags appended as hashtags
fn description_with_hashtags(video: &VideoUpload) -> String {
    let hashtags = video
        .normalized_tags()
        .iter()
        .map(|tag| format!("#{}", tag))
        .collect::<Vec<_>>()
        .join(" ");

    match (video.caption(), hashtags.is_empty()) {
        (caption, true) => caption.to_string(),
        ("", false) => hashtags,
        (caption, false) => format!("{} {}", caption, hashtags),
    }
}

impl TikTokClient {
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

    fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token.expose_secret())
    }

    /// Steps 1 and 2: register the upload and push the bytes
    async fn upload(&self, bytes: Vec<u8>) -> PlatformResult<String> {
        if bytes.is_empty() {
            return Err(PlatformError::Validation("Downloaded video is empty".to_string()));
        }
        let size = bytes.len();

        let init_url = format!("{}/v2/post/publish/inbox/video/init/", self.base_url);
        let response = self
            .http
            .api
            .post(&init_url)
            .header("Authorization", self.bearer())
            .json(&json!({
                "source_info": {
                    "source": "FILE_UPLOAD",
                    "video_size": size,
                    "chunk_size": size,
                    "total_chunk_count": 1
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PlatformError::Api(format!(
                "TikTok upload initialization failed: {}",
                error_body(response).await
            )));
        }

        let init: TikTokResponse<UploadInit> = response
            .json()
            .await
            .map_err(|e| PlatformError::Api(format!("TikTok returned an unexpected body: {}", e)))?;
        debug!(publish_id = %init.data.publish_id, "TikTok upload initialized");

        let response = self
            .http
            .media
            .put(&init.data.upload_url)
            .header("Content-Type", "video/mp4")
            .header("Content-Range", format!("bytes 0-{}/{}", size - 1, size))
            .body(bytes)
            .send()
            .await?;

        if !matches!(response.status().as_u16(), 200 | 201) {
            return Err(PlatformError::Api(format!(
                "TikTok video upload failed: {}",
                error_body(response).await
            )));
        }

        Ok(init.data.publish_id)
    }

    /// Step 3: create the post around the uploaded video
    async fn create_post(&self, publish_id: &str, video: &VideoUpload) -> PlatformResult<String> {
        let url = format!("{}/v2/post/publish/video/init/", self.base_url);

        let response = self
            .http
            .api
            .post(&url)
            .header("Authorization", self.bearer())
            .json(&json!({
                "post_info": {
                    "title": video.title_or_caption(),
                    "description": description_with_hashtags(video),
                    "privacy_level": "SELF_ONLY",
                    "disable_duet": false,
                    "disable_comment": false,
                    "disable_stitch": false
                },
                "publish_id": publish_id
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PlatformError::Api(format!(
                "TikTok post creation failed: {}",
                error_body(response).await
            )));
        }

        let created: TikTokResponse<PublishData> = response
            .json()
            .await
            .map_err(|e| PlatformError::Api(format!("TikTok returned an unexpected body: {}", e)))?;

        Ok(created
            .data
            .publish_id
            .unwrap_or_else(|| publish_id.to_string()))
    }
}

#[async_trait]
impl Platform for TikTokClient {
    fn kind(&self) -> PlatformKind {
        PlatformKind::TikTok
    }

    async fn publish(&self, _content: &str, _media_urls: &[String]) -> PlatformResult<String> {
        Err(PlatformError::Validation(
            "TikTok posts require a video".to_string(),
        ))
    }

    async fn publish_video(&self, video: &VideoUpload) -> PlatformResult<String> {
        let post_id = self
            .files
            .process_upload(&video.url, ".mp4", |artifact| async move {
                let bytes = tokio::fs::read(&artifact)
                    .await
                    .map_err(|e| PlatformError::Io(format!("{}: {}", artifact.display(), e)))?;
                let publish_id = self.upload(bytes).await?;
                self.create_post(&publish_id, video).await
            })
            .await?;

        info!(post_id = %post_id, "Created TikTok draft");
        Ok(post_id)
    }
}
