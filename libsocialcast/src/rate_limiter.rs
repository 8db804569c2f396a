//! Request metering for API keys
//!
//! Each key gets `calls` requests per fixed window of `period_secs`, counted
//! in the `rate_limits` table so limits hold across processes.

use crate::config::RateLimitConfig;
use crate::error::{DbError, Result};
use crate::Database;

/// Fixed-window limiter keyed by API key owner
pub struct RateLimiter {
    calls: u32,
    period_secs: i64,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            calls: config.calls,
            period_secs: config.period_secs.max(1),
        }
    }

    /// Count this request if the window still has room
    ///
    /// Returns Ok(true) if the request may proceed, Ok(false) if the key has
    /// used up its window. The check and the increment are one statement, so
    /// concurrent callers cannot push a window past `calls`.
    pub async fn check_and_record(&self, db: &Database, key_id: &str, now: i64) -> Result<bool> {
        if self.calls == 0 {
            return Ok(false);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO rate_limits (key_id, window_start, request_count)
            VALUES (?, ?, 1)
            ON CONFLICT(key_id, window_start)
            DO UPDATE SET request_count = request_count + 1
            WHERE request_count < ?
            "#,
        )
        .bind(key_id)
        .bind(self.window_start(now))
        .bind(i64::from(self.calls))
        .execute(db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Whether another request fits in the current window, without counting it
    pub async fn check(&self, db: &Database, key_id: &str, now: i64) -> Result<bool> {
        let used = self.used(db, key_id, now).await?;
        Ok(used < self.calls)
    }

    pub async fn record(&self, db: &Database, key_id: &str, now: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO rate_limits (key_id, window_start, request_count)
            VALUES (?, ?, 1)
            ON CONFLICT(key_id, window_start)
            DO UPDATE SET request_count = request_count + 1
            "#,
        )
        .bind(key_id)
        .bind(self.window_start(now))
        .execute(db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Requests already counted in the window containing `now`
    pub async fn used(&self, db: &Database, key_id: &str, now: i64) -> Result<u32> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT request_count FROM rate_limits WHERE key_id = ? AND window_start = ?",
        )
        .bind(key_id)
        .bind(self.window_start(now))
        .fetch_optional(db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|(count,)| count.max(0) as u32).unwrap_or(0))
    }

    /// Drop windows that ended before `cutoff`; returns how many were removed
    pub async fn cleanup_old_windows(&self, db: &Database, cutoff: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM rate_limits WHERE window_start < ?")
            .bind(self.window_start(cutoff))
            .execute(db.pool())
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    fn window_start(&self, timestamp: i64) -> i64 {
        timestamp.div_euclid(self.period_secs) * self.period_secs
    }
}
