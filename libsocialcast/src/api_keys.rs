//! API key issuance, authentication and usage metering
//!
//! Keys are shown to the caller exactly once. Only the SHA-256 digest is
//! persisted, so a lost key can only be replaced, never recovered.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::Row;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::{DbError, Result, SocialcastError};
use crate::rate_limiter::RateLimiter;

const KEY_PREFIX: &str = "sc_";
const KEY_BYTES: usize = 48;
const RECENT_WINDOW_SECS: i64 = 30 * 24 * 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointUsage {
    pub endpoint: String,
    pub count: i64,
}

/// Usage summary for an account's key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiKeyStats {
    pub active: bool,
    pub name: String,
    pub created_at: i64,
    pub total_usage: i64,
    pub last_used_at: Option<i64>,
    pub recent_usage_30_days: i64,
    /// Percentage of logged requests that succeeded, 0 when none were logged
    pub success_rate: f64,
    pub popular_endpoints: Vec<EndpointUsage>,
}

pub struct ApiKeyManager {
    db: Database,
    limiter: RateLimiter,
}

impl ApiKeyManager {
    pub fn new(db: Database, limiter: RateLimiter) -> Self {
        Self { db, limiter }
    }

    /// Issue a new key for `account_id`, replacing any previous one
    ///
    /// Returns the plain key; it is not stored anywhere.
    pub async fn generate(&self, account_id: i64, name: &str) -> Result<String> {
        if self.db.get_account(account_id).await?.is_none() {
            return Err(SocialcastError::NotFound(format!("account {}", account_id)));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(SocialcastError::InvalidInput(
                "API key name cannot be empty".to_string(),
            ));
        }

        let key = new_key();
        self.db
            .upsert_api_key(account_id, &hash_key(&key), name, chrono::Utc::now().timestamp())
            .await?;

        info!(account_id, name, "Issued API key");
        Ok(key)
    }

    /// Deactivate the account's key; false if there was no active key
    pub async fn revoke(&self, account_id: i64) -> Result<bool> {
        let revoked = self.db.deactivate_api_key(account_id).await?;
        if revoked {
            info!(account_id, "Revoked API key");
        }
        Ok(revoked)
    }

    /// Resolve a presented key to its account
    ///
    /// Unknown and revoked keys are `Unauthorized`; a key over its request
    /// window is `RateLimited`. Accepted requests bump the key's usage.
    pub async fn authenticate(&self, key: &str) -> Result<i64> {
        let row = self
            .db
            .find_api_key_by_hash(&hash_key(key.trim()))
            .await?
            .ok_or_else(|| SocialcastError::Unauthorized("Invalid API key".to_string()))?;

        if !row.active {
            warn!(account_id = row.account_id, "Rejected revoked API key");
            return Err(SocialcastError::Unauthorized(
                "API key has been revoked".to_string(),
            ));
        }

        let now = chrono::Utc::now().timestamp();
        let key_id = rate_key(row.account_id);
        if !self.limiter.check_and_record(&self.db, &key_id, now).await? {
            return Err(SocialcastError::RateLimited(format!(
                "account {} exceeded its request window",
                row.account_id
            )));
        }

        self.db.touch_api_key(row.account_id, now).await?;
        debug!(account_id = row.account_id, "Authenticated API key");
        Ok(row.account_id)
    }

    /// Drop rate-limit windows that closed before `now`
    pub async fn prune_rate_windows(&self, now: i64) -> Result<u64> {
        let removed = self.limiter.cleanup_old_windows(&self.db, now).await?;
        if removed > 0 {
            debug!(removed, "Pruned expired rate-limit windows");
        }
        Ok(removed)
    }

    pub async fn log_usage(
        &self,
        account_id: i64,
        endpoint: &str,
        method: &str,
        success: bool,
        error_message: Option<&str>,
    ) -> Result<()> {
        self.db
            .insert_api_usage(
                account_id,
                endpoint,
                method,
                success,
                error_message,
                chrono::Utc::now().timestamp(),
            )
            .await
    }

    pub async fn stats(&self, account_id: i64) -> Result<ApiKeyStats> {
        let key = self
            .db
            .get_api_key(account_id)
            .await?
            .ok_or_else(|| SocialcastError::NotFound(format!("API key for account {}", account_id)))?;

        let since = chrono::Utc::now().timestamp() - RECENT_WINDOW_SECS;
        let totals = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(success), 0) AS succeeded,
                   COALESCE(SUM(CASE WHEN timestamp >= ? THEN 1 ELSE 0 END), 0) AS recent
            FROM api_key_usage WHERE account_id = ?
            "#,
        )
        .bind(since)
        .bind(account_id)
        .fetch_one(self.db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        let logged: i64 = totals.get("total");
        let succeeded: i64 = totals.get("succeeded");
        let recent: i64 = totals.get("recent");

        let popular_endpoints = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT endpoint, COUNT(*) AS hits
            FROM api_key_usage WHERE account_id = ?
            GROUP BY endpoint
            ORDER BY hits DESC, endpoint ASC
            LIMIT 5
            "#,
        )
        .bind(account_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(DbError::SqlxError)?
        .into_iter()
        .map(|(endpoint, count)| EndpointUsage { endpoint, count })
        .collect();

        let success_rate = if logged > 0 {
            succeeded as f64 * 100.0 / logged as f64
        } else {
            0.0
        };

        Ok(ApiKeyStats {
            active: key.active,
            name: key.name,
            created_at: key.created_at,
            total_usage: key.usage_count,
            last_used_at: key.last_used_at,
            recent_usage_30_days: recent,
            success_rate,
            popular_endpoints,
        })
    }
}

fn new_key() -> String {
    let mut bytes = [0u8; KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{}{}", KEY_PREFIX, URL_SAFE_NO_PAD.encode(bytes))
}

/// Hex SHA-256 of the key as presented
pub fn hash_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

fn rate_key(account_id: i64) -> String {
    format!("account:{}", account_id)
}
