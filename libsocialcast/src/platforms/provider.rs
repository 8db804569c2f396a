//! Per-account platform credentials and client construction

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info};

use super::facebook::FacebookClient;
use super::instagram::InstagramClient;
use super::tiktok::TikTokClient;
use super::youtube::YouTubeClient;
use super::{HttpClients, Platform, PlatformKind, PlatformResult};
use crate::config::{EndpointsConfig, ProcessingConfig};
use crate::db::{ConnectionRow, Database};
use crate::error::{PlatformError, Result, SocialcastError};
use crate::files::TempFileStore;

/// Source of ready-to-use platform clients
///
/// The publisher asks for one client per `(account, platform)` attempt.
/// Missing or revoked credentials surface as `PlatformError::NotConfigured`.
#[async_trait]
pub trait PlatformProvider: Send + Sync {
    async fn client(&self, account_id: i64, kind: PlatformKind) -> PlatformResult<Box<dyn Platform>>;
}

/// A stored connection with its token held as a secret
#[derive(Debug)]
pub struct PlatformConnection {
    pub account_id: i64,
    pub kind: PlatformKind,
    pub access_token: Option<SecretString>,
    /// Page id, business account id, user id or channel id
    pub target_id: Option<String>,
    pub connected: bool,
    pub updated_at: i64,
}

impl PlatformConnection {
    fn from_row(row: ConnectionRow) -> Option<Self> {
        let kind = row.platform.parse().ok()?;
        Some(Self {
            account_id: row.account_id,
            kind,
            access_token: row.access_token.map(|t| SecretString::new(t.into())),
            target_id: row.target_id,
            connected: row.connected,
            updated_at: row.updated_at,
        })
    }

    pub fn is_usable(&self) -> bool {
        self.connected && self.access_token.is_some()
    }
}

/// Connection status of every supported platform for one account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectedPlatforms {
    pub facebook: bool,
    pub instagram: bool,
    pub tiktok: bool,
    pub youtube: bool,
}

impl ConnectedPlatforms {
    fn set(&mut self, kind: PlatformKind, connected: bool) {
        match kind {
            PlatformKind::Facebook => self.facebook = connected,
            PlatformKind::Instagram => self.instagram = connected,
            PlatformKind::TikTok => self.tiktok = connected,
            PlatformKind::YouTube => self.youtube = connected,
        }
    }

    pub fn is_connected(&self, kind: PlatformKind) -> bool {
        match kind {
            PlatformKind::Facebook => self.facebook,
            PlatformKind::Instagram => self.instagram,
            PlatformKind::TikTok => self.tiktok,
            PlatformKind::YouTube => self.youtube,
        }
    }
}

/// Default provider backed by the `platform_connections` table
pub struct ConnectionProvider {
    db: Database,
    files: Arc<TempFileStore>,
    http: HttpClients,
    endpoints: EndpointsConfig,
    processing: ProcessingConfig,
}

impl ConnectionProvider {
    pub fn new(
        db: Database,
        files: Arc<TempFileStore>,
        http: HttpClients,
        endpoints: EndpointsConfig,
        processing: ProcessingConfig,
    ) -> Self {
        Self {
            db,
            files,
            http,
            endpoints,
            processing,
        }
    }

    /// Store (or replace) the credentials for one platform
    pub async fn connect(
        &self,
        account_id: i64,
        kind: PlatformKind,
        access_token: SecretString,
        target_id: Option<String>,
    ) -> Result<()> {
        if access_token.expose_secret().trim().is_empty() {
            return Err(SocialcastError::InvalidInput(
                "Access token cannot be empty".to_string(),
            ));
        }

        if requires_target(kind) && target_id.as_deref().is_none_or(|t| t.trim().is_empty()) {
            return Err(SocialcastError::InvalidInput(format!(
                "{} connections require a target id",
                kind.display_name()
            )));
        }

        self.db
            .upsert_connection(
                account_id,
                kind.as_str(),
                access_token.expose_secret(),
                target_id.as_deref(),
            )
            .await?;

        info!(account_id, platform = %kind, "Connected platform");
        Ok(())
    }

    /// Clear stored credentials; `false` if the platform was not connected
    pub async fn disconnect(&self, account_id: i64, kind: PlatformKind) -> Result<bool> {
        let disconnected = self.db.disconnect(account_id, kind.as_str()).await?;
        if disconnected {
            info!(account_id, platform = %kind, "Disconnected platform");
        }
        Ok(disconnected)
    }

    pub async fn connection(
        &self,
        account_id: i64,
        kind: PlatformKind,
    ) -> Result<Option<PlatformConnection>> {
        let row = self.db.get_connection(account_id, kind.as_str()).await?;
        Ok(row.and_then(PlatformConnection::from_row))
    }

    pub async fn connected_platforms(&self, account_id: i64) -> Result<ConnectedPlatforms> {
        let mut status = ConnectedPlatforms::default();

        for row in self.db.list_connections(account_id).await? {
            if let Some(connection) = PlatformConnection::from_row(row) {
                status.set(connection.kind, connection.is_usable());
            }
        }

        Ok(status)
    }
}

/// Facebook and Instagram address a page/account in every request path
fn requires_target(kind: PlatformKind) -> bool {
    matches!(kind, PlatformKind::Facebook | PlatformKind::Instagram)
}

fn not_configured(kind: PlatformKind) -> PlatformError {
    PlatformError::NotConfigured(format!("{} credentials not configured", kind.display_name()))
}

#[async_trait]
impl PlatformProvider for ConnectionProvider {
    async fn client(&self, account_id: i64, kind: PlatformKind) -> PlatformResult<Box<dyn Platform>> {
        let connection = self
            .connection(account_id, kind)
            .await
            .map_err(|e| PlatformError::NotConfigured(format!(
                "{} credentials could not be loaded: {}",
                kind.display_name(),
                e
            )))?
            .filter(PlatformConnection::is_usable)
            .ok_or_else(|| not_configured(kind))?;

        let Some(token) = connection.access_token else {
            return Err(not_configured(kind));
        };
        let target = connection.target_id.filter(|t| !t.is_empty());
        if requires_target(kind) && target.is_none() {
            return Err(not_configured(kind));
        }

        debug!(account_id, platform = %kind, "Building platform client");

        let client: Box<dyn Platform> = match kind {
            PlatformKind::Facebook => Box::new(FacebookClient::new(
                self.http.clone(),
                &self.endpoints.graph_api,
                target.unwrap_or_default(),
                token,
            )),
            PlatformKind::Instagram => Box::new(InstagramClient::new(
                self.http.clone(),
                &self.endpoints.graph_api,
                target.unwrap_or_default(),
                token,
                self.processing.clone(),
            )),
            PlatformKind::TikTok => Box::new(TikTokClient::new(
                self.http.clone(),
                &self.endpoints.tiktok_api,
                token,
                self.files.clone(),
            )),
            PlatformKind::YouTube => Box::new(YouTubeClient::new(
                self.http.clone(),
                &self.endpoints.youtube_api,
                token,
                self.files.clone(),
            )),
        };

        Ok(client)
    }
}
