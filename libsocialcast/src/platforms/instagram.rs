//! Instagram business account publishing
//!
//! Publishing is two-phase: create a media container, then publish it. Video
//! containers are processed asynchronously by Instagram, so the container's
//! `status_code` is polled (bounded, with backoff) before publishing.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use super::{error_body, GraphId, HttpClients, Platform, PlatformKind, PlatformResult, VideoUpload};
use crate::config::ProcessingConfig;
use crate::error::PlatformError;

pub struct InstagramClient {
    http: HttpClients,
    base_url: String,
    account_id: String,
    access_token: SecretString,
    processing: ProcessingConfig,
}

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    status_code: String,
}

impl InstagramClient {
    pub fn new(
        http: HttpClients,
        base_url: impl Into<String>,
        account_id: impl Into<String>,
        access_token: SecretString,
        processing: ProcessingConfig,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            account_id: account_id.into(),
            access_token,
            processing,
        }
    }

    async fn create_container(&self, form: &[(&str, &str)], what: &str) -> PlatformResult<String> {
        let url = format!("{}/{}/media", self.base_url, self.account_id);

        let mut body = form.to_vec();
        body.push(("access_token", self.access_token.expose_secret()));

        let response = self.http.media.post(&url).form(&body).send().await?;

        if !response.status().is_success() {
            return Err(PlatformError::Api(format!(
                "Instagram {} creation failed: {}",
                what,
                error_body(response).await
            )));
        }

        let container: GraphId = response
            .json()
            .await
            .map_err(|e| PlatformError::Api(format!("Instagram returned an unexpected body: {}", e)))?;
        debug!(container = %container.id, "Created Instagram {}", what);
        Ok(container.id)
    }

    async fn publish_container(&self, container_id: &str) -> PlatformResult<String> {
        let url = format!("{}/{}/media_publish", self.base_url, self.account_id);

        let response = self
            .http
            .api
            .post(&url)
            .form(&[
                ("creation_id", container_id),
                ("access_token", self.access_token.expose_secret()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PlatformError::Api(format!(
                "Instagram publish failed: {}",
                error_body(response).await
            )));
        }

        let published: GraphId = response
            .json()
            .await
            .map_err(|e| PlatformError::Api(format!("Instagram returned an unexpected body: {}", e)))?;
        Ok(published.id)
    }

    /// Poll until the container reports `FINISHED`
    async fn wait_until_processed(&self, container_id: &str) -> PlatformResult<()> {
        let url = format!("{}/{}", self.base_url, container_id);

        for attempt in 0..self.processing.poll_attempts {
            let response = self
                .http
                .api
                .get(&url)
                .query(&[
                    ("fields", "status_code"),
                    ("access_token", self.access_token.expose_secret()),
                ])
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(PlatformError::Api(format!(
                    "Instagram status check failed: {}",
                    error_body(response).await
                )));
            }

            let status: ContainerStatus = response
                .json()
                .await
                .map_err(|e| PlatformError::Api(format!("Instagram returned an unexpected body: {}", e)))?;

            match status.status_code.as_str() {
                "FINISHED" => return Ok(()),
                "ERROR" | "EXPIRED" => {
                    return Err(PlatformError::Api(format!(
                        "Instagram video processing ended with status {}",
                        status.status_code
                    )))
                }
                other => {
                    let delay = self.processing.delay_for_attempt(attempt);
                    debug!(
                        container = container_id,
                        status = other,
                        "Instagram still processing, checking again in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(PlatformError::Api(format!(
            "Instagram video processing did not finish after {} checks",
            self.processing.poll_attempts
        )))
    }
}

#[async_trait]
impl Platform for InstagramClient {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Instagram
    }

    async fn publish(&self, content: &str, media_urls: &[String]) -> PlatformResult<String> {
        let Some(image_url) = media_urls.first() else {
            return Err(PlatformError::Validation(
                "Instagram posts require media".to_string(),
            ));
        };

        let container_id = self
            .create_container(&[("image_url", image_url.as_str()), ("caption", content)], "container")
            .await?;
        self.publish_container(&container_id).await
    }

    async fn publish_video(&self, video: &VideoUpload) -> PlatformResult<String> {
        let container_id = self
            .create_container(
                &[
                    ("media_type", "VIDEO"),
                    ("video_url", video.url.as_str()),
                    ("caption", video.caption()),
                ],
                "video container",
            )
            .await?;

        self.wait_until_processed(&container_id).await?;
        self.publish_container(&container_id).await
    }
}
