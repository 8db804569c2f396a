//! Facebook page publishing through the Graph API

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::{error_body, GraphId, HttpClients, Platform, PlatformKind, PlatformResult, VideoUpload};
use crate::error::PlatformError;

pub struct FacebookClient {
    http: HttpClients,
    base_url: String,
    page_id: String,
    access_token: SecretString,
}

impl FacebookClient {
    pub fn new(http: HttpClients, base_url: impl Into<String>, page_id: impl Into<String>, access_token: SecretString) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_id: page_id.into(),
            access_token,
        }
    }
}

#[async_trait]
impl Platform for FacebookClient {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Facebook
    }

    async fn publish(&self, content: &str, media_urls: &[String]) -> PlatformResult<String> {
        let url = format!("{}/{}/feed", self.base_url, self.page_id);

        let mut form = vec![
            ("message", content),
            ("access_token", self.access_token.expose_secret()),
        ];
        // Only the first media URL is attached, as a link
        if let Some(link) = media_urls.first() {
            form.push(("link", link.as_str()));
        }

        debug!(page = %self.page_id, "Posting to Facebook feed");
        let response = self.http.api.post(&url).form(&form).send().await?;

        if !response.status().is_success() {
            return Err(PlatformError::Api(format!(
                "Facebook API error: {}",
                error_body(response).await
            )));
        }

        let created: GraphId = response
            .json()
            .await
            .map_err(|e| PlatformError::Api(format!("Facebook API returned an unexpected body: {}", e)))?;
        Ok(created.id)
    }

    async fn publish_video(&self, video: &VideoUpload) -> PlatformResult<String> {
        let url = format!("{}/{}/videos", self.base_url, self.page_id);
        let title = video.title.clone().unwrap_or_default();

        // Facebook fetches the file itself; nothing touches local storage
        let form = [
            ("file_url", video.url.as_str()),
            ("description", video.caption()),
            ("title", title.as_str()),
            ("access_token", self.access_token.expose_secret()),
        ];

        debug!(page = %self.page_id, "Submitting video to Facebook");
        let response = self.http.media.post(&url).form(&form).send().await?;

        if !response.status().is_success() {
            return Err(PlatformError::Api(format!(
                "Facebook video upload error: {}",
                error_body(response).await
            )));
        }

        let created: GraphId = response
            .json()
            .await
            .map_err(|e| PlatformError::Api(format!("Facebook API returned an unexpected body: {}", e)))?;
        Ok(created.id)
    }
}
