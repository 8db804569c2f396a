//! Database operations for Socialcast
//!
//! Status changes are single-statement compare-and-swap updates: every
//! transition names the status it expects, and reports whether a row
//! actually moved. Callers never rely on a status read earlier.

use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::Path;

use crate::error::{DbError, Result, SocialcastError};
use crate::types::{Account, Post, PostMedia, PostResult, PostStatus};

/// A post with the per-platform results of its last publication
#[derive(Debug, Clone)]
pub struct PostWithResults {
    pub post: Post,
    pub results: Vec<PostResult>,
}

/// Stored platform connection, token still in plain form
#[derive(Debug, Clone)]
pub struct ConnectionRow {
    pub account_id: i64,
    pub platform: String,
    pub access_token: Option<String>,
    pub target_id: Option<String>,
    pub connected: bool,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct ApiKeyRow {
    pub account_id: i64,
    pub key_hash: String,
    pub name: String,
    pub created_at: i64,
    pub last_used_at: Option<i64>,
    pub usage_count: i64,
    pub active: bool,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }
        }

        // mode=rwc creates the file if it doesn't exist
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    pub async fn create_account(&self, name: &str) -> Result<Account> {
        let now = chrono::Utc::now().timestamp();

        let id = sqlx::query("INSERT INTO accounts (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?
            .last_insert_rowid();

        Ok(Account {
            id,
            name: name.to_string(),
            created_at: now,
        })
    }

    pub async fn get_account(&self, id: i64) -> Result<Option<Account>> {
        let row = sqlx::query("SELECT id, name, created_at FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| Account {
            id: r.get("id"),
            name: r.get("name"),
            created_at: r.get("created_at"),
        }))
    }

    pub async fn get_account_by_name(&self, name: &str) -> Result<Option<Account>> {
        let row = sqlx::query("SELECT id, name, created_at FROM accounts WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| Account {
            id: r.get("id"),
            name: r.get("name"),
            created_at: r.get("created_at"),
        }))
    }

    // ------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------

    pub async fn create_post(&self, post: &Post) -> Result<()> {
        let platforms = serde_json::to_string(&post.platforms)
            .map_err(|e| DbError::Corrupt(format!("platforms: {}", e)))?;
        let media = serde_json::to_string(&post.media)
            .map_err(|e| DbError::Corrupt(format!("media: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO posts (id, account_id, content, platforms, media, scheduled_at, status, created_at, published_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(post.account_id)
        .bind(&post.content)
        .bind(platforms)
        .bind(media)
        .bind(post.scheduled_at)
        .bind(post.status.as_str())
        .bind(post.created_at)
        .bind(post.published_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, content, platforms, media, scheduled_at, status, created_at, published_at
            FROM posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(|r| post_from_row(&r)).transpose()
    }

    /// Posts newest first, optionally filtered by owner and status
    pub async fn list_posts(
        &self,
        account_id: Option<i64>,
        status: Option<PostStatus>,
        limit: usize,
    ) -> Result<Vec<Post>> {
        let mut where_clauses = vec!["1=1"];
        if account_id.is_some() {
            where_clauses.push("account_id = ?");
        }
        if status.is_some() {
            where_clauses.push("status = ?");
        }

        let query_str = format!(
            r#"
            SELECT id, account_id, content, platforms, media, scheduled_at, status, created_at, published_at
            FROM posts
            WHERE {}
            ORDER BY created_at DESC, id
            LIMIT ?
            "#,
            where_clauses.join(" AND ")
        );

        let mut query = sqlx::query(&query_str);
        if let Some(account) = account_id {
            query = query.bind(account);
        }
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }
        query = query.bind(limit as i64);

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    /// Approved, unclaimed posts whose scheduled instant has passed
    ///
    /// Approved posts without a scheduled instant count as due.
    pub async fn due_posts(&self, now: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, content, platforms, media, scheduled_at, status, created_at, published_at
            FROM posts
            WHERE status = 'approved'
              AND claimed_at IS NULL
              AND (scheduled_at IS NULL OR scheduled_at <= ?)
            ORDER BY scheduled_at ASC, created_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    /// Move a post from `from` to `to` if it is still in `from`
    ///
    /// Returns `true` when the row moved. `published_at` is stamped for
    /// terminal targets; any publication claim is released.
    pub async fn transition_status(
        &self,
        post_id: &str,
        from: PostStatus,
        to: PostStatus,
        now: i64,
    ) -> Result<bool> {
        ensure_forward(from, to)?;
        let published_at = to.is_terminal().then_some(now);

        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = ?, published_at = COALESCE(?, published_at), claimed_at = NULL
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(to.as_str())
        .bind(published_at)
        .bind(post_id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Same as [`transition_status`](Self::transition_status), restricted to one owner
    pub async fn transition_status_for_account(
        &self,
        post_id: &str,
        account_id: i64,
        from: PostStatus,
        to: PostStatus,
    ) -> Result<bool> {
        ensure_forward(from, to)?;
        let result = sqlx::query(
            "UPDATE posts SET status = ? WHERE id = ? AND account_id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(post_id)
        .bind(account_id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Take the exclusive right to publish an approved post
    pub async fn claim_for_publication(&self, post_id: &str, now: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts SET claimed_at = ?
            WHERE id = ? AND status = 'approved' AND claimed_at IS NULL
            "#,
        )
        .bind(now)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Record per-platform results and move the claimed post to its terminal status
    ///
    /// Both writes happen in one transaction; nothing is written when the post
    /// is no longer `approved`.
    pub async fn finish_publication(
        &self,
        post_id: &str,
        results: &[PostResult],
        to: PostStatus,
        now: i64,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        let moved = sqlx::query(
            r#"
            UPDATE posts SET status = ?, published_at = ?, claimed_at = NULL
            WHERE id = ? AND status = 'approved'
            "#,
        )
        .bind(to.as_str())
        .bind(now)
        .bind(post_id)
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?
        .rows_affected()
            == 1;

        if !moved {
            tx.rollback().await.map_err(DbError::SqlxError)?;
            return Ok(false);
        }

        for result in results {
            sqlx::query(
                r#"
                INSERT INTO post_results (post_id, platform, success, platform_post_id, error_message, attempted_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(post_id)
            .bind(&result.platform)
            .bind(if result.success { 1 } else { 0 })
            .bind(&result.platform_post_id)
            .bind(&result.error_message)
            .bind(result.attempted_at)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;
        }

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(true)
    }

    /// Fail approved posts whose publication claim is older than `cutoff`
    ///
    /// Returns the ids of the posts that were failed.
    pub async fn fail_stale_claims(&self, cutoff: i64, now: i64) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            UPDATE posts SET status = 'failed', published_at = ?, claimed_at = NULL
            WHERE status = 'approved' AND claimed_at IS NOT NULL AND claimed_at < ?
            RETURNING id
            "#,
        )
        .bind(now)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    pub async fn get_post_results(&self, post_id: &str) -> Result<Vec<PostResult>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, platform, success, platform_post_id, error_message, attempted_at
            FROM post_results
            WHERE post_id = ?
            ORDER BY id
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| PostResult {
                id: r.get("id"),
                post_id: r.get("post_id"),
                platform: r.get("platform"),
                success: r.get::<i32, _>("success") != 0,
                platform_post_id: r.get("platform_post_id"),
                error_message: r.get("error_message"),
                attempted_at: r.get("attempted_at"),
            })
            .collect())
    }

    pub async fn get_post_with_results(&self, post_id: &str) -> Result<Option<PostWithResults>> {
        let Some(post) = self.get_post(post_id).await? else {
            return Ok(None);
        };
        let results = self.get_post_results(post_id).await?;
        Ok(Some(PostWithResults { post, results }))
    }

    /// Number of posts per status for an account (or all accounts)
    pub async fn count_by_status(&self, account_id: Option<i64>) -> Result<Vec<(PostStatus, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS n FROM posts
            WHERE (? IS NULL OR account_id = ?)
            GROUP BY status
            ORDER BY status
            "#,
        )
        .bind(account_id)
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| {
                let status: String = r.get("status");
                let status = status
                    .parse::<PostStatus>()
                    .map_err(|_| DbError::Corrupt(format!("unknown status '{}'", status)))?;
                Ok((status, r.get::<i64, _>("n")))
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Platform connections
    // ------------------------------------------------------------------

    pub async fn upsert_connection(
        &self,
        account_id: i64,
        platform: &str,
        access_token: &str,
        target_id: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO platform_connections (account_id, platform, access_token, target_id, connected, updated_at)
            VALUES (?, ?, ?, ?, 1, ?)
            ON CONFLICT(account_id, platform)
            DO UPDATE SET access_token = excluded.access_token,
                          target_id = excluded.target_id,
                          connected = 1,
                          updated_at = excluded.updated_at
            "#,
        )
        .bind(account_id)
        .bind(platform)
        .bind(access_token)
        .bind(target_id)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Clear a connection's credentials; `false` if it was not connected
    pub async fn disconnect(&self, account_id: i64, platform: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE platform_connections
            SET access_token = NULL, target_id = NULL, connected = 0, updated_at = ?
            WHERE account_id = ? AND platform = ? AND connected = 1
            "#,
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(account_id)
        .bind(platform)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get_connection(
        &self,
        account_id: i64,
        platform: &str,
    ) -> Result<Option<ConnectionRow>> {
        let row = sqlx::query(
            r#"
            SELECT account_id, platform, access_token, target_id, connected, updated_at
            FROM platform_connections
            WHERE account_id = ? AND platform = ?
            "#,
        )
        .bind(account_id)
        .bind(platform)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| connection_from_row(&r)))
    }

    pub async fn list_connections(&self, account_id: i64) -> Result<Vec<ConnectionRow>> {
        let rows = sqlx::query(
            r#"
            SELECT account_id, platform, access_token, target_id, connected, updated_at
            FROM platform_connections
            WHERE account_id = ?
            ORDER BY platform
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(connection_from_row).collect())
    }

    // ------------------------------------------------------------------
    // API keys
    // ------------------------------------------------------------------

    /// Store a key digest for an account, replacing any previous key
    pub async fn upsert_api_key(&self, account_id: i64, key_hash: &str, name: &str, now: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO api_keys (account_id, key_hash, name, created_at, last_used_at, usage_count, active)
            VALUES (?, ?, ?, ?, NULL, 0, 1)
            ON CONFLICT(account_id)
            DO UPDATE SET key_hash = excluded.key_hash,
                          name = excluded.name,
                          created_at = excluded.created_at,
                          last_used_at = NULL,
                          usage_count = 0,
                          active = 1
            "#,
        )
        .bind(account_id)
        .bind(key_hash)
        .bind(name)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn deactivate_api_key(&self, account_id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE api_keys SET active = 0 WHERE account_id = ? AND active = 1")
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKeyRow>> {
        let row = sqlx::query(
            r#"
            SELECT account_id, key_hash, name, created_at, last_used_at, usage_count, active
            FROM api_keys WHERE key_hash = ?
            "#,
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| api_key_from_row(&r)))
    }

    pub async fn get_api_key(&self, account_id: i64) -> Result<Option<ApiKeyRow>> {
        let row = sqlx::query(
            r#"
            SELECT account_id, key_hash, name, created_at, last_used_at, usage_count, active
            FROM api_keys WHERE account_id = ?
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| api_key_from_row(&r)))
    }

    pub async fn touch_api_key(&self, account_id: i64, now: i64) -> Result<()> {
        sqlx::query(
            "UPDATE api_keys SET last_used_at = ?, usage_count = usage_count + 1 WHERE account_id = ?",
        )
        .bind(now)
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn insert_api_usage(
        &self,
        account_id: i64,
        endpoint: &str,
        method: &str,
        success: bool,
        error_message: Option<&str>,
        now: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO api_key_usage (account_id, endpoint, method, timestamp, success, error_message)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account_id)
        .bind(endpoint)
        .bind(method)
        .bind(now)
        .bind(if success { 1 } else { 0 })
        .bind(error_message)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }
}

/// Status only ever moves forward along the lifecycle
fn ensure_forward(from: PostStatus, to: PostStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(SocialcastError::StateViolation(format!(
            "{} -> {} is not a lifecycle transition",
            from, to
        )))
    }
}

fn post_from_row(r: &SqliteRow) -> Result<Post> {
    let platforms: String = r.get("platforms");
    let media: String = r.get("media");
    let status: String = r.get("status");
    let id: String = r.get("id");

    let platforms: Vec<String> = serde_json::from_str(&platforms)
        .map_err(|e| DbError::Corrupt(format!("post {} platforms: {}", id, e)))?;
    let media: PostMedia = serde_json::from_str(&media)
        .map_err(|e| DbError::Corrupt(format!("post {} media: {}", id, e)))?;
    let status = status
        .parse::<PostStatus>()
        .map_err(|_| DbError::Corrupt(format!("post {} has unknown status '{}'", id, status)))?;

    Ok(Post {
        id,
        account_id: r.get("account_id"),
        content: r.get("content"),
        platforms,
        media,
        scheduled_at: r.get("scheduled_at"),
        status,
        created_at: r.get("created_at"),
        published_at: r.get("published_at"),
    })
}

fn connection_from_row(r: &SqliteRow) -> ConnectionRow {
    ConnectionRow {
        account_id: r.get("account_id"),
        platform: r.get("platform"),
        access_token: r.get("access_token"),
        target_id: r.get("target_id"),
        connected: r.get::<i32, _>("connected") != 0,
        updated_at: r.get("updated_at"),
    }
}

fn api_key_from_row(r: &SqliteRow) -> ApiKeyRow {
    ApiKeyRow {
        account_id: r.get("account_id"),
        key_hash: r.get("key_hash"),
        name: r.get("name"),
        created_at: r.get("created_at"),
        last_used_at: r.get("last_used_at"),
        usage_count: r.get("usage_count"),
        active: r.get::<i32, _>("active") != 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewPost;
    use tempfile::TempDir;

    async fn setup_test_db() -> (TempDir, Database, Account) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(&db_path.to_string_lossy()).await.unwrap();
        let account = db.create_account("tester").await.unwrap();
        (temp_dir, db, account)
    }

    async fn insert_post(db: &Database, account: &Account, status: PostStatus) -> Post {
        let mut post = Post::from_new(account.id, NewPost::text("hello", &["facebook"])).unwrap();
        post.status = status;
        db.create_post(&post).await.unwrap();
        post
    }

    #[tokio::test]
    async fn test_database_initialization_with_invalid_path() {
        #[cfg(unix)]
        let invalid_path = "/tmp/test\0invalid.db";

        #[cfg(windows)]
        let invalid_path = "C:\\invalid<>path\\test.db";

        let result = Database::new(invalid_path).await;
        assert!(matches!(result, Err(SocialcastError::Database(_))));
    }

    #[tokio::test]
    async fn test_create_and_get_post_round_trip() {
        let (_temp, db, account) = setup_test_db().await;

        let mut request = NewPost::video("clip", &["tiktok", "youtube"], "https://cdn.example/v.mp4");
        request.video_tags = Some(vec!["rust".to_string()]);
        let post = Post::from_new(account.id, request.scheduled_at(1_700_000_000)).unwrap();
        db.create_post(&post).await.unwrap();

        let loaded = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(loaded.platforms, vec!["tiktok", "youtube"]);
        assert_eq!(loaded.media, post.media);
        assert_eq!(loaded.scheduled_at, Some(1_700_000_000));
        assert_eq!(loaded.status, PostStatus::PendingApproval);
    }

    #[tokio::test]
    async fn test_get_missing_post_is_none() {
        let (_temp, db, _account) = setup_test_db().await;
        assert!(db.get_post("does-not-exist").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_post_requires_existing_account() {
        let (_temp, db, _account) = setup_test_db().await;
        let post = Post::from_new(9999, NewPost::text("orphan", &["facebook"])).unwrap();
        assert!(db.create_post(&post).await.is_err());
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_swap() {
        let (_temp, db, account) = setup_test_db().await;
        let post = insert_post(&db, &account, PostStatus::PendingApproval).await;

        let moved = db
            .transition_status(&post.id, PostStatus::PendingApproval, PostStatus::Approved, 10)
            .await
            .unwrap();
        assert!(moved);

        // Second attempt from the stale status does nothing
        let moved_again = db
            .transition_status(&post.id, PostStatus::PendingApproval, PostStatus::Approved, 11)
            .await
            .unwrap();
        assert!(!moved_again);

        let loaded = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PostStatus::Approved);
        assert_eq!(loaded.published_at, None);
    }

    #[tokio::test]
    async fn test_backward_transition_is_rejected() {
        let (_temp, db, account) = setup_test_db().await;
        let post = insert_post(&db, &account, PostStatus::Published).await;

        let err = db
            .transition_status(&post.id, PostStatus::Published, PostStatus::Approved, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, SocialcastError::StateViolation(_)));

        let loaded = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PostStatus::Published);
    }

    #[tokio::test]
    async fn test_terminal_transition_stamps_published_at() {
        let (_temp, db, account) = setup_test_db().await;
        let post = insert_post(&db, &account, PostStatus::Approved).await;

        db.transition_status(&post.id, PostStatus::Approved, PostStatus::Failed, 1234)
            .await
            .unwrap();

        let loaded = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, PostStatus::Failed);
        assert_eq!(loaded.published_at, Some(1234));
    }

    #[tokio::test]
    async fn test_account_scoped_transition() {
        let (_temp, db, account) = setup_test_db().await;
        let other = db.create_account("other").await.unwrap();
        let post = insert_post(&db, &account, PostStatus::PendingApproval).await;

        let moved = db
            .transition_status_for_account(&post.id, other.id, PostStatus::PendingApproval, PostStatus::Approved)
            .await
            .unwrap();
        assert!(!moved);

        let moved = db
            .transition_status_for_account(&post.id, account.id, PostStatus::PendingApproval, PostStatus::Approved)
            .await
            .unwrap();
        assert!(moved);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let (_temp, db, account) = setup_test_db().await;
        let post = insert_post(&db, &account, PostStatus::Approved).await;

        assert!(db.claim_for_publication(&post.id, 100).await.unwrap());
        assert!(!db.claim_for_publication(&post.id, 101).await.unwrap());

        // Claimed posts are not due
        assert!(db.due_posts(i64::MAX).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claim_requires_approved() {
        let (_temp, db, account) = setup_test_db().await;
        let post = insert_post(&db, &account, PostStatus::PendingApproval).await;
        assert!(!db.claim_for_publication(&post.id, 100).await.unwrap());
    }

    #[tokio::test]
    async fn test_due_posts_filters_status_and_time() {
        let (_temp, db, account) = setup_test_db().await;

        let mut due = Post::from_new(account.id, NewPost::text("due", &["facebook"]).scheduled_at(50)).unwrap();
        due.status = PostStatus::Approved;
        db.create_post(&due).await.unwrap();

        let mut future = Post::from_new(account.id, NewPost::text("later", &["facebook"]).scheduled_at(500)).unwrap();
        future.status = PostStatus::Approved;
        db.create_post(&future).await.unwrap();

        let mut unapproved = Post::from_new(account.id, NewPost::text("pending", &["facebook"]).scheduled_at(10)).unwrap();
        unapproved.status = PostStatus::PendingApproval;
        db.create_post(&unapproved).await.unwrap();

        let unscheduled = insert_post(&db, &account, PostStatus::Approved).await;

        let ids: Vec<String> = db.due_posts(100).await.unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&due.id));
        assert!(ids.contains(&unscheduled.id));
    }

    #[tokio::test]
    async fn test_finish_publication_records_results() {
        let (_temp, db, account) = setup_test_db().await;
        let post = insert_post(&db, &account, PostStatus::Approved).await;
        db.claim_for_publication(&post.id, 1).await.unwrap();

        let results = vec![
            PostResult {
                id: None,
                post_id: post.id.clone(),
                platform: "facebook".to_string(),
                success: true,
                platform_post_id: Some("123_456".to_string()),
                error_message: None,
                attempted_at: 2,
            },
            PostResult {
                id: None,
                post_id: post.id.clone(),
                platform: "myspace".to_string(),
                success: false,
                platform_post_id: None,
                error_message: Some("Unsupported platform: myspace".to_string()),
                attempted_at: 2,
            },
        ];

        let moved = db
            .finish_publication(&post.id, &results, PostStatus::Published, 3)
            .await
            .unwrap();
        assert!(moved);

        let loaded = db.get_post_with_results(&post.id).await.unwrap().unwrap();
        assert_eq!(loaded.post.status, PostStatus::Published);
        assert_eq!(loaded.post.published_at, Some(3));
        assert_eq!(loaded.results.len(), 2);
        assert!(loaded.results[0].success);
        assert_eq!(loaded.results[1].error_message.as_deref(), Some("Unsupported platform: myspace"));
    }

    #[tokio::test]
    async fn test_finish_publication_on_terminal_post_writes_nothing() {
        let (_temp, db, account) = setup_test_db().await;
        let post = insert_post(&db, &account, PostStatus::Failed).await;

        let results = vec![PostResult {
            id: None,
            post_id: post.id.clone(),
            platform: "facebook".to_string(),
            success: true,
            platform_post_id: Some("1".to_string()),
            error_message: None,
            attempted_at: 1,
        }];

        let moved = db
            .finish_publication(&post.id, &results, PostStatus::Published, 2)
            .await
            .unwrap();
        assert!(!moved);
        assert!(db.get_post_results(&post.id).await.unwrap().is_empty());
        assert_eq!(db.get_post(&post.id).await.unwrap().unwrap().status, PostStatus::Failed);
    }

    #[tokio::test]
    async fn test_fail_stale_claims() {
        let (_temp, db, account) = setup_test_db().await;
        let stale = insert_post(&db, &account, PostStatus::Approved).await;
        let fresh = insert_post(&db, &account, PostStatus::Approved).await;

        db.claim_for_publication(&stale.id, 100).await.unwrap();
        db.claim_for_publication(&fresh.id, 900).await.unwrap();

        let failed = db.fail_stale_claims(500, 1000).await.unwrap();
        assert_eq!(failed, vec![stale.id.clone()]);

        assert_eq!(db.get_post(&stale.id).await.unwrap().unwrap().status, PostStatus::Failed);
        assert_eq!(db.get_post(&fresh.id).await.unwrap().unwrap().status, PostStatus::Approved);
    }

    #[tokio::test]
    async fn test_list_posts_filters() {
        let (_temp, db, account) = setup_test_db().await;
        let other = db.create_account("other").await.unwrap();

        insert_post(&db, &account, PostStatus::PendingApproval).await;
        insert_post(&db, &account, PostStatus::Published).await;
        insert_post(&db, &other, PostStatus::PendingApproval).await;

        assert_eq!(db.list_posts(None, None, 100).await.unwrap().len(), 3);
        assert_eq!(db.list_posts(Some(account.id), None, 100).await.unwrap().len(), 2);
        assert_eq!(
            db.list_posts(None, Some(PostStatus::PendingApproval), 100).await.unwrap().len(),
            2
        );
        assert_eq!(db.list_posts(None, None, 1).await.unwrap().len(), 1);

        let counts = db.count_by_status(Some(account.id)).await.unwrap();
        assert!(counts.contains(&(PostStatus::PendingApproval, 1)));
        assert!(counts.contains(&(PostStatus::Published, 1)));
    }

    #[tokio::test]
    async fn test_connection_upsert_and_disconnect() {
        let (_temp, db, account) = setup_test_db().await;

        db.upsert_connection(account.id, "facebook", "token-1", Some("page-1"))
            .await
            .unwrap();
        db.upsert_connection(account.id, "facebook", "token-2", Some("page-2"))
            .await
            .unwrap();

        let conn = db.get_connection(account.id, "facebook").await.unwrap().unwrap();
        assert!(conn.connected);
        assert_eq!(conn.access_token.as_deref(), Some("token-2"));
        assert_eq!(conn.target_id.as_deref(), Some("page-2"));

        assert!(db.disconnect(account.id, "facebook").await.unwrap());
        assert!(!db.disconnect(account.id, "facebook").await.unwrap());

        let conn = db.get_connection(account.id, "facebook").await.unwrap().unwrap();
        assert!(!conn.connected);
        assert!(conn.access_token.is_none());
        assert_eq!(db.list_connections(account.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_api_key_replace_and_deactivate() {
        let (_temp, db, account) = setup_test_db().await;

        db.upsert_api_key(account.id, "hash-a", "first", 1).await.unwrap();
        db.touch_api_key(account.id, 2).await.unwrap();
        db.upsert_api_key(account.id, "hash-b", "second", 3).await.unwrap();

        assert!(db.find_api_key_by_hash("hash-a").await.unwrap().is_none());
        let key = db.find_api_key_by_hash("hash-b").await.unwrap().unwrap();
        assert_eq!(key.name, "second");
        assert_eq!(key.usage_count, 0);
        assert!(key.active);

        assert!(db.deactivate_api_key(account.id).await.unwrap());
        assert!(!db.get_api_key(account.id).await.unwrap().unwrap().active);
    }
}
