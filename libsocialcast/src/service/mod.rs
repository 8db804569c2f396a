//! Service layer for Socialcast
//!
//! `SocialcastService` builds the long-lived components once and hands out
//! shared references, so the daemon and the CLI drive the same code paths.
//!
//! # Example
//!
//! ```no_run
//! use libsocialcast::service::SocialcastService;
//! use libsocialcast::types::NewPost;
//!
//! # async fn example() -> libsocialcast::Result<()> {
//! let service = SocialcastService::new().await?;
//! let account = service.database().create_account("brand").await?;
//!
//! let created = service
//!     .lifecycle()
//!     .create(account.id, NewPost::text("Launch day", &["facebook"]))
//!     .await?;
//! service.lifecycle().approve(account.id, &created.post.id).await?;
//! # Ok(())
//! # }
//! ```

pub mod events;

use std::sync::Arc;

use self::events::{EventBus, EventReceiver};
use crate::api_keys::ApiKeyManager;
use crate::files::TempFileStore;
use crate::lifecycle::PostLifecycle;
use crate::platforms::{ConnectionProvider, HttpClients, PlatformProvider};
use crate::publisher::Publisher;
use crate::rate_limiter::RateLimiter;
use crate::scheduler::Scheduler;
use crate::{Config, Database, Result};

/// Main service facade
///
/// Every component shares one `Database` pool and one [`EventBus`].
pub struct SocialcastService {
    config: Config,
    db: Database,
    files: Arc<TempFileStore>,
    connections: Arc<ConnectionProvider>,
    lifecycle: Arc<PostLifecycle>,
    scheduler: Scheduler,
    api_keys: ApiKeyManager,
    event_bus: EventBus,
}

impl SocialcastService {
    /// Create a service from the default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded, or the
    /// database cannot be opened or migrated.
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Create a service whose platform clients come from stored connections
    pub async fn from_config(config: Config) -> Result<Self> {
        let db = Database::new(&config.database.path).await?;
        let files = Arc::new(TempFileStore::new(&config.storage, &config.http)?);
        let connections = Arc::new(ConnectionProvider::new(
            db.clone(),
            Arc::clone(&files),
            HttpClients::new(&config.http)?,
            config.endpoints.clone(),
            config.processing.clone(),
        ));

        let provider: Arc<dyn PlatformProvider> = connections.clone();
        Ok(Self::assemble(config, db, files, connections, provider))
    }

    /// Create a service that publishes through `provider` instead of the
    /// stored connections
    ///
    /// Connection management still reads and writes the database.
    pub async fn with_provider(config: Config, provider: Arc<dyn PlatformProvider>) -> Result<Self> {
        let db = Database::new(&config.database.path).await?;
        let files = Arc::new(TempFileStore::new(&config.storage, &config.http)?);
        let connections = Arc::new(ConnectionProvider::new(
            db.clone(),
            Arc::clone(&files),
            HttpClients::new(&config.http)?,
            config.endpoints.clone(),
            config.processing.clone(),
        ));

        Ok(Self::assemble(config, db, files, connections, provider))
    }

    fn assemble(
        config: Config,
        db: Database,
        files: Arc<TempFileStore>,
        connections: Arc<ConnectionProvider>,
        provider: Arc<dyn PlatformProvider>,
    ) -> Self {
        let event_bus = EventBus::default();
        let publisher = Arc::new(Publisher::new(provider));
        let lifecycle = Arc::new(PostLifecycle::new(
            db.clone(),
            publisher,
            event_bus.clone(),
        ));
        let scheduler = Scheduler::new(
            db.clone(),
            Arc::clone(&lifecycle),
            Arc::clone(&files),
            event_bus.clone(),
            config.scheduler.claim_timeout_secs,
        );
        let api_keys = ApiKeyManager::new(db.clone(), RateLimiter::new(&config.rate_limit));

        Self {
            config,
            db,
            files,
            connections,
            lifecycle,
            scheduler,
            api_keys,
            event_bus,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Scratch storage for media awaiting upload
    pub fn files(&self) -> &TempFileStore {
        &self.files
    }

    pub fn connections(&self) -> &ConnectionProvider {
        &self.connections
    }

    pub fn lifecycle(&self) -> &PostLifecycle {
        &self.lifecycle
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn api_keys(&self) -> &ApiKeyManager {
        &self.api_keys
    }

    /// Subscribe to lifecycle events
    ///
    /// Multiple subscribers are supported; each receives every event emitted
    /// after it subscribed.
    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }
}
