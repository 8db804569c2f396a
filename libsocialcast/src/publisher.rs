//! Multi-platform publication fan-out
//!
//! One attempt per distinct requested platform, all running concurrently.
//! An attempt can fail (unknown platform, missing credentials, remote
//! rejection) or even panic without affecting its siblings; every outcome
//! ends up as an entry in the [`PublicationOutcome`].

use std::collections::{BTreeMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::files::panic_message;
use crate::platforms::{PlatformKind, PlatformProvider, PlatformResult, VideoUpload};
use crate::types::{Post, PostMedia, PostResult};

/// What to publish and where
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub content: String,
    pub platforms: Vec<String>,
    pub media: PostMedia,
}

impl From<&Post> for PublishRequest {
    fn from(post: &Post) -> Self {
        Self {
            content: post.content.clone(),
            platforms: post.platforms.clone(),
            media: post.media.clone(),
        }
    }
}

/// Result of publishing to a single platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptResult {
    #[serde(skip)]
    pub platform: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AttemptResult {
    fn succeeded(platform: &str, post_id: String) -> Self {
        Self {
            platform: platform.to_string(),
            success: true,
            post_id: Some(post_id),
            error: None,
        }
    }

    fn failed(platform: &str, error: String) -> Self {
        Self {
            platform: platform.to_string(),
            success: false,
            post_id: None,
            error: Some(error),
        }
    }
}

/// Aggregate of one fan-out
///
/// Serializes as `{"success": bool, "results": {"<platform>": {...}}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicationOutcome {
    /// True if at least one platform accepted the post
    pub success: bool,
    pub results: BTreeMap<String, AttemptResult>,
}

impl PublicationOutcome {
    fn from_attempts(attempts: Vec<AttemptResult>) -> Self {
        let success = attempts.iter().any(|a| a.success);
        let results = attempts
            .into_iter()
            .map(|a| (a.platform.clone(), a))
            .collect();
        Self { success, results }
    }

    pub fn get(&self, platform: &str) -> Option<&AttemptResult> {
        self.results.get(platform)
    }

    pub fn failures(&self) -> impl Iterator<Item = &AttemptResult> {
        self.results.values().filter(|a| !a.success)
    }

    /// Rows for the `post_results` table
    pub fn to_post_results(&self, post_id: &str, attempted_at: i64) -> Vec<PostResult> {
        self.results
            .values()
            .map(|a| PostResult {
                id: None,
                post_id: post_id.to_string(),
                platform: a.platform.clone(),
                success: a.success,
                platform_post_id: a.post_id.clone(),
                error_message: a.error.clone(),
                attempted_at,
            })
            .collect()
    }
}

/// Requested names with duplicates removed, first occurrence kept
fn distinct_platforms(platforms: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    platforms
        .iter()
        .map(String::as_str)
        .filter(|name| seen.insert(*name))
        .collect()
}

/// Publication fan-out engine
pub struct Publisher {
    provider: Arc<dyn PlatformProvider>,
}

impl Publisher {
    pub fn new(provider: Arc<dyn PlatformProvider>) -> Self {
        Self { provider }
    }

    /// Publish `request` for `account_id` on every requested platform
    ///
    /// Never fails as a whole: each platform's failure is reported in its
    /// own entry of the returned outcome.
    pub async fn publish(&self, account_id: i64, request: &PublishRequest) -> PublicationOutcome {
        let platforms = distinct_platforms(&request.platforms);

        let attempts = platforms.into_iter().map(|name| async move {
            let attempt = AssertUnwindSafe(self.attempt(account_id, name, request))
                .catch_unwind()
                .await;

            match attempt {
                Ok(Ok(post_id)) => {
                    info!(account_id, platform = name, post_id = %post_id, "Published");
                    AttemptResult::succeeded(name, post_id)
                }
                Ok(Err(e)) => {
                    warn!(account_id, platform = name, "Failed to publish: {}", e);
                    AttemptResult::failed(name, e.to_string())
                }
                Err(panic) => {
                    let message = format!("{} publisher panicked: {}", name, panic_message(&*panic));
                    warn!(account_id, platform = name, "{}", message);
                    AttemptResult::failed(name, message)
                }
            }
        });

        PublicationOutcome::from_attempts(join_all(attempts).await)
    }

    async fn attempt(&self, account_id: i64, name: &str, request: &PublishRequest) -> PlatformResult<String> {
        let kind: PlatformKind = name.parse()?;
        let client = self.provider.client(account_id, kind).await?;

        match &request.media {
            PostMedia::Links { media_urls } => client.publish(&request.content, media_urls).await,
            PostMedia::Video(video) => {
                client
                    .publish_video(&VideoUpload::new(request.content.clone(), video))
                    .await
            }
        }
    }
}
