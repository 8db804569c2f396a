//! Platform abstraction and implementations
//!
//! Every supported network implements [`Platform`]. Clients are built per
//! `(account, platform)` by a [`PlatformProvider`], which owns the stored
//! credentials; the publisher never sees a token.
//!
//! # Examples
//!
//! ```no_run
//! use libsocialcast::platforms::{Platform, PlatformKind, PlatformProvider};
//!
//! # async fn example(provider: &dyn PlatformProvider) -> Result<(), libsocialcast::PlatformError> {
//! let client = provider.client(1, PlatformKind::Facebook).await?;
//! let post_id = client.publish("Hello from Socialcast", &[]).await?;
//! println!("Published: {}", post_id);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::config::HttpConfig;
use crate::error::PlatformError;
use crate::types::VideoSpec;

pub mod facebook;
pub mod instagram;
pub mod provider;
pub mod tiktok;
pub mod youtube;

// Mock platform is available for all builds (not just tests) to support integration tests
pub mod mock;

pub use provider::{ConnectedPlatforms, ConnectionProvider, PlatformConnection, PlatformProvider};

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// The closed set of networks Socialcast can publish to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Facebook,
    Instagram,
    TikTok,
    YouTube,
}

impl PlatformKind {
    pub const ALL: [PlatformKind; 4] = [
        PlatformKind::Facebook,
        PlatformKind::Instagram,
        PlatformKind::TikTok,
        PlatformKind::YouTube,
    ];

    /// Identifier used in requests and storage
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Facebook => "facebook",
            PlatformKind::Instagram => "instagram",
            PlatformKind::TikTok => "tiktok",
            PlatformKind::YouTube => "youtube",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PlatformKind::Facebook => "Facebook",
            PlatformKind::Instagram => "Instagram",
            PlatformKind::TikTok => "TikTok",
            PlatformKind::YouTube => "YouTube",
        }
    }
}

impl FromStr for PlatformKind {
    type Err = PlatformError;

    fn from_str(s: &str) -> PlatformResult<Self> {
        match s {
            "facebook" => Ok(PlatformKind::Facebook),
            "instagram" => Ok(PlatformKind::Instagram),
            "tiktok" => Ok(PlatformKind::TikTok),
            "youtube" => Ok(PlatformKind::YouTube),
            other => Err(PlatformError::Unsupported(other.to_string())),
        }
    }
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(name, display name)` for every supported platform
pub fn supported_platforms() -> Vec<(&'static str, &'static str)> {
    PlatformKind::ALL
        .iter()
        .map(|kind| (kind.as_str(), kind.display_name()))
        .collect()
}

/// A video publication request as seen by a platform client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoUpload {
    /// Post text; preferred over `description` as the caption
    pub content: String,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

impl VideoUpload {
    pub fn new(content: impl Into<String>, video: &VideoSpec) -> Self {
        Self {
            content: content.into(),
            url: video.url.clone(),
            title: video.title.clone(),
            description: video.description.clone(),
            tags: video.tags.clone(),
        }
    }

    /// Post text, else the video description, else empty
    pub fn caption(&self) -> &str {
        if !self.content.is_empty() {
            &self.content
        } else {
            self.description.as_deref().unwrap_or("")
        }
    }

    /// Explicit title, else the first 100 characters of the caption
    pub fn title_or_caption(&self) -> String {
        match &self.title {
            Some(title) => title.clone(),
            None => self.caption().chars().take(100).collect(),
        }
    }

    /// Tags with `#` removed and surrounding whitespace trimmed; empty tags dropped
    pub fn normalized_tags(&self) -> Vec<String> {
        self.tags
            .iter()
            .map(|tag| tag.replace('#', "").trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect()
    }
}

/// Platform trait for unified social media platform interactions
///
/// Implementations translate a post into the platform's own publishing
/// protocol and return the identifier the platform assigned to it.
#[async_trait]
pub trait Platform: Send + Sync {
    fn kind(&self) -> PlatformKind;

    /// Publish a text post, optionally referencing media by URL
    ///
    /// # Errors
    ///
    /// - `PlatformError::Validation` if the platform cannot carry this kind of post
    /// - `PlatformError::Api` with the raw response body on a remote rejection
    /// - `PlatformError::Network` on transport failure
    async fn publish(&self, content: &str, media_urls: &[String]) -> PlatformResult<String>;

    /// Publish a video post
    ///
    /// Platforms that upload bytes themselves fetch the source through the
    /// temporary file store and never leave the artifact behind.
    async fn publish_video(&self, video: &VideoUpload) -> PlatformResult<String>;
}

/// HTTP clients shared by the platform implementations
///
/// `api` carries the short API timeout; `media` the extended one used for
/// uploads and server-side fetches of large files.
#[derive(Debug, Clone)]
pub struct HttpClients {
    pub api: Client,
    pub media: Client,
}

impl HttpClients {
    pub fn new(http: &HttpConfig) -> PlatformResult<Self> {
        Ok(Self {
            api: Client::builder().timeout(http.api_timeout()).build()?,
            media: Client::builder().timeout(http.media_timeout()).build()?,
        })
    }
}

/// Body of a failed response, for error reporting
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) if !body.is_empty() => body,
        _ => format!("HTTP {}", status),
    }
}

/// `{"id": "..."}` returned by the Graph API
#[derive(Debug, Deserialize)]
pub(crate) struct GraphId {
    pub id: String,
}
