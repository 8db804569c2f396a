//! Socialcast - scheduled multi-platform social publishing
//!
//! Posts move through `pending_approval -> approved -> published | failed`.
//! Approved posts are fanned out concurrently to every requested platform;
//! video media is staged in a scratch store that never outlives the upload.

pub mod api_keys;
pub mod config;
pub mod db;
pub mod error;
pub mod files;
pub mod lifecycle;
pub mod logging;
pub mod platforms;
pub mod publisher;
pub mod rate_limiter;
pub mod scheduler;
pub mod scheduling;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use api_keys::{ApiKeyManager, ApiKeyStats};
pub use config::Config;
pub use db::{Database, PostWithResults};
pub use error::{PlatformError, Result, SocialcastError};
pub use files::{FileStoreStats, TempFileStore};
pub use lifecycle::{ApprovalOutcome, CreatedPost, PostLifecycle};
pub use publisher::{AttemptResult, PublicationOutcome, PublishRequest, Publisher};
pub use scheduler::{BatchSummary, Scheduler};
pub use service::SocialcastService;
pub use types::{Account, NewPost, Post, PostMedia, PostResult, PostStatus, VideoSpec};
