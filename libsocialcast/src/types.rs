//! Core types for Socialcast

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Result, SocialcastError};

/// Lifecycle of a schedulable post
///
/// `PendingApproval -> Approved -> Published | Failed`; the last two are
/// terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    PendingApproval,
    Approved,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::PendingApproval => "pending_approval",
            PostStatus::Approved => "approved",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PostStatus::Published | PostStatus::Failed)
    }

    /// Whether `self -> next` is an edge of the lifecycle
    pub fn can_transition_to(&self, next: PostStatus) -> bool {
        matches!(
            (self, next),
            (PostStatus::PendingApproval, PostStatus::Approved)
                | (PostStatus::Approved, PostStatus::Published)
                | (PostStatus::Approved, PostStatus::Failed)
        )
    }
}

impl FromStr for PostStatus {
    type Err = SocialcastError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending_approval" => Ok(PostStatus::PendingApproval),
            "approved" => Ok(PostStatus::Approved),
            "published" => Ok(PostStatus::Published),
            "failed" => Ok(PostStatus::Failed),
            other => Err(SocialcastError::InvalidInput(format!(
                "Unknown post status '{}'. Valid: pending_approval, approved, published, failed",
                other
            ))),
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Video attached to a post
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoSpec {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// What a post carries besides its text: links/images, or a single video
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostMedia {
    Links { media_urls: Vec<String> },
    Video(VideoSpec),
}

impl PostMedia {
    pub fn none() -> Self {
        PostMedia::Links { media_urls: vec![] }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, PostMedia::Video(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub account_id: i64,
    pub content: String,
    pub platforms: Vec<String>,
    pub media: PostMedia,
    pub scheduled_at: Option<i64>,
    pub status: PostStatus,
    pub created_at: i64,
    pub published_at: Option<i64>,
}

impl Post {
    /// Build a validated, not yet persisted post in `pending_approval`
    pub fn from_new(account_id: i64, new_post: NewPost) -> Result<Self> {
        let media = new_post.validate()?;

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            account_id,
            content: new_post.content,
            platforms: new_post.platforms,
            media,
            scheduled_at: new_post.scheduled_at,
            status: PostStatus::PendingApproval,
            created_at: chrono::Utc::now().timestamp(),
            published_at: None,
        })
    }

    /// A post with no scheduled instant is due immediately
    pub fn is_due(&self, now: i64) -> bool {
        self.scheduled_at.is_none_or(|at| at <= now)
    }
}

/// Request to create a post, as received from the trigger surface
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPost {
    pub content: String,
    pub platforms: Vec<String>,
    #[serde(default)]
    pub media_urls: Option<Vec<String>>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub video_title: Option<String>,
    #[serde(default)]
    pub video_description: Option<String>,
    #[serde(default)]
    pub video_tags: Option<Vec<String>>,
    #[serde(default)]
    pub scheduled_at: Option<i64>,
    /// Approve right after creation (webhook intake)
    #[serde(default)]
    pub auto_approve: bool,
}

impl NewPost {
    pub fn text(content: impl Into<String>, platforms: &[&str]) -> Self {
        Self {
            content: content.into(),
            platforms: platforms.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn video(content: impl Into<String>, platforms: &[&str], video_url: impl Into<String>) -> Self {
        Self {
            video_url: Some(video_url.into()),
            ..Self::text(content, platforms)
        }
    }

    pub fn scheduled_at(mut self, at: i64) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    /// Check the request and derive the post's media
    pub fn validate(&self) -> Result<PostMedia> {
        if self.platforms.is_empty() {
            return Err(SocialcastError::InvalidInput(
                "At least one platform is required".to_string(),
            ));
        }

        if self.platforms.iter().any(|p| p.trim().is_empty()) {
            return Err(SocialcastError::InvalidInput(
                "Platform names cannot be empty".to_string(),
            ));
        }

        let has_media = self.media_urls.as_ref().is_some_and(|urls| !urls.is_empty());

        match &self.video_url {
            Some(_) if has_media => Err(SocialcastError::InvalidInput(
                "A post carries either media_urls or a video_url, not both".to_string(),
            )),
            Some(url) if url.trim().is_empty() => Err(SocialcastError::InvalidInput(
                "video_url cannot be empty".to_string(),
            )),
            Some(url) => Ok(PostMedia::Video(VideoSpec {
                url: url.clone(),
                title: self.video_title.clone(),
                description: self.video_description.clone(),
                tags: self.video_tags.clone().unwrap_or_default(),
            })),
            None => Ok(PostMedia::Links {
                media_urls: self.media_urls.clone().unwrap_or_default(),
            }),
        }
    }
}

/// Persisted outcome of one platform attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostResult {
    pub id: Option<i64>,
    pub post_id: String,
    pub platform: String,
    pub success: bool,
    pub platform_post_id: Option<String>,
    pub error_message: Option<String>,
    pub attempted_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
}
