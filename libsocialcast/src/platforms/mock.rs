//! Mock platform implementation for testing
//!
//! A configurable stand-in for the real platform clients that can simulate
//! successes, failures, panics, and delays. [`MockProvider`] hands out mock
//! clients so the publisher, lifecycle, and scheduler can be exercised
//! without network access or stored credentials.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use super::{Platform, PlatformKind, PlatformProvider, PlatformResult, VideoUpload};
use crate::error::PlatformError;

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub kind: PlatformKind,

    /// Whether publishing should succeed
    pub publish_succeeds: bool,

    /// Error to return on publishing failure
    pub publish_error: Option<String>,

    /// Panic instead of returning (exercises fan-out isolation)
    pub panics: bool,

    /// Delay before completing operations (simulates network latency)
    pub delay: Duration,

    /// Number of times publish or publish_video has been called
    pub publish_call_count: Arc<Mutex<usize>>,

    /// Content that has been published (for verification)
    pub published_content: Arc<Mutex<Vec<String>>>,
}

impl MockConfig {
    pub fn new(kind: PlatformKind) -> Self {
        Self {
            kind,
            publish_succeeds: true,
            publish_error: None,
            panics: false,
            delay: Duration::from_millis(0),
            publish_call_count: Arc::new(Mutex::new(0)),
            published_content: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn publish_call_count(&self) -> usize {
        *self.publish_call_count.lock().unwrap()
    }

    pub fn published_content(&self) -> Vec<String> {
        self.published_content.lock().unwrap().clone()
    }
}

/// Mock platform for testing
pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// Create a mock platform that always succeeds
    pub fn success(kind: PlatformKind) -> Self {
        Self::new(MockConfig::new(kind))
    }

    /// Create a mock platform that fails publishing
    pub fn failure(kind: PlatformKind, error: &str) -> Self {
        Self::new(MockConfig {
            publish_succeeds: false,
            publish_error: Some(error.to_string()),
            ..MockConfig::new(kind)
        })
    }

    /// Create a mock platform that panics mid-publish
    pub fn panicking(kind: PlatformKind) -> Self {
        Self::new(MockConfig {
            panics: true,
            ..MockConfig::new(kind)
        })
    }

    /// Create a mock platform with a delay
    pub fn with_delay(kind: PlatformKind, delay: Duration) -> Self {
        Self::new(MockConfig {
            delay,
            ..MockConfig::new(kind)
        })
    }

    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    async fn respond(&self, content: &str) -> PlatformResult<String> {
        *self.config.publish_call_count.lock().unwrap() += 1;

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if self.config.panics {
            panic!("mock {} panicked", self.config.kind);
        }

        if self.config.publish_succeeds {
            self.config
                .published_content
                .lock()
                .unwrap()
                .push(content.to_string());

            Ok(format!("{}:mock-{}", self.config.kind, uuid::Uuid::new_v4()))
        } else {
            let error_msg = self
                .config
                .publish_error
                .clone()
                .unwrap_or_else(|| "Mock publishing failed".to_string());
            Err(PlatformError::Api(error_msg))
        }
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn kind(&self) -> PlatformKind {
        self.config.kind
    }

    async fn publish(&self, content: &str, _media_urls: &[String]) -> PlatformResult<String> {
        self.respond(content).await
    }

    async fn publish_video(&self, video: &VideoUpload) -> PlatformResult<String> {
        self.respond(video.caption()).await
    }
}

/// Provider serving mock clients for the configured platforms
///
/// Platforms without a registered config behave as if never connected.
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    configs: Arc<Mutex<HashMap<PlatformKind, MockConfig>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mock platform, replacing any earlier one of the same kind
    pub fn with(self, platform: MockPlatform) -> Self {
        self.configs
            .lock()
            .unwrap()
            .insert(platform.config.kind, platform.config);
        self
    }

    pub fn config(&self, kind: PlatformKind) -> Option<MockConfig> {
        self.configs.lock().unwrap().get(&kind).cloned()
    }
}

#[async_trait]
impl PlatformProvider for MockProvider {
    async fn client(&self, _account_id: i64, kind: PlatformKind) -> PlatformResult<Box<dyn Platform>> {
        let config = self.config(kind).ok_or_else(|| {
            PlatformError::NotConfigured(format!("{} credentials not configured", kind.display_name()))
        })?;
        Ok(Box::new(MockPlatform::new(config)))
    }
}
