//! Post lifecycle: `pending_approval -> approved -> published | failed`
//!
//! Every transition is a compare-and-swap in the database, so two callers
//! racing on the same post cannot both win. Publication additionally takes a
//! claim on the approved post before the fan-out starts; whoever holds the
//! claim is the only one allowed to record the terminal status.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::db::{Database, PostWithResults};
use crate::error::{Result, SocialcastError};
use crate::publisher::{PublicationOutcome, PublishRequest, Publisher};
use crate::service::events::{Event, EventBus};
use crate::types::{NewPost, Post, PostStatus};

/// What happened after a post was approved
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ApprovalOutcome {
    /// The post was due and has been fanned out
    Published(PublicationOutcome),
    /// The scheduler will publish it once `scheduled_at` has passed
    Deferred { scheduled_at: i64 },
    /// Another worker claimed the post between approval and publication
    InProgress,
}

/// A freshly created post and, for auto-approved requests, what approval did
#[derive(Debug, Clone)]
pub struct CreatedPost {
    pub post: Post,
    pub approval: Option<ApprovalOutcome>,
}

pub struct PostLifecycle {
    db: Database,
    publisher: Arc<Publisher>,
    events: EventBus,
}

impl PostLifecycle {
    pub fn new(db: Database, publisher: Arc<Publisher>, events: EventBus) -> Self {
        Self {
            db,
            publisher,
            events,
        }
    }

    /// Validate and store a new post in `pending_approval`
    pub async fn create(&self, account_id: i64, request: NewPost) -> Result<CreatedPost> {
        if self.db.get_account(account_id).await?.is_none() {
            return Err(SocialcastError::NotFound(format!("Account {}", account_id)));
        }

        let auto_approve = request.auto_approve;
        let post = Post::from_new(account_id, request)?;
        self.db.create_post(&post).await?;

        info!(post_id = %post.id, account_id, platforms = ?post.platforms, "Created post");
        self.events.emit(Event::PostCreated {
            post_id: post.id.clone(),
            account_id,
            platforms: post.platforms.clone(),
        });

        if !auto_approve {
            return Ok(CreatedPost {
                post,
                approval: None,
            });
        }

        let approval = self.approve(account_id, &post.id).await?;
        let post = self.get(&post.id).await?.post;
        Ok(CreatedPost {
            post,
            approval: Some(approval),
        })
    }

    /// Approve a pending post owned by `account_id`
    ///
    /// Due posts (no schedule, or schedule already passed) are published
    /// right away; others are left for the scheduler.
    pub async fn approve(&self, account_id: i64, post_id: &str) -> Result<ApprovalOutcome> {
        let moved = self
            .db
            .transition_status_for_account(
                post_id,
                account_id,
                PostStatus::PendingApproval,
                PostStatus::Approved,
            )
            .await?;

        if !moved {
            return match self.db.get_post(post_id).await? {
                Some(post) if post.account_id == account_id => Err(SocialcastError::StateViolation(
                    "Post already processed".to_string(),
                )),
                _ => Err(SocialcastError::NotFound(format!("Post {}", post_id))),
            };
        }

        let post = self.get(post_id).await?.post;
        info!(post_id, "Approved post");
        self.events.emit(Event::PostApproved {
            post_id: post_id.to_string(),
            scheduled_at: post.scheduled_at,
        });

        let now = chrono::Utc::now().timestamp();
        match post.scheduled_at {
            Some(at) if !post.is_due(now) => {
                info!(post_id, scheduled_at = at, "Deferred to scheduler");
                Ok(ApprovalOutcome::Deferred { scheduled_at: at })
            }
            _ => match self.publish_now(post_id).await {
                Ok(outcome) => Ok(ApprovalOutcome::Published(outcome)),
                Err(SocialcastError::StateViolation(_)) => Ok(ApprovalOutcome::InProgress),
                Err(e) => Err(e),
            },
        }
    }

    /// Claim an approved post, fan it out, and record the terminal status
    ///
    /// Fails with `StateViolation` if the post is not approved, someone
    /// else already holds the claim, or the post stopped being approved
    /// before the results could be recorded.
    pub async fn publish_now(&self, post_id: &str) -> Result<PublicationOutcome> {
        let claimed_at = chrono::Utc::now().timestamp();
        if !self.db.claim_for_publication(post_id, claimed_at).await? {
            return match self.db.get_post(post_id).await? {
                None => Err(SocialcastError::NotFound(format!("Post {}", post_id))),
                Some(post) => Err(SocialcastError::StateViolation(format!(
                    "Post is {} or already being published",
                    post.status
                ))),
            };
        }

        let post = self.get(post_id).await?.post;
        self.events.emit(Event::PublicationStarted {
            post_id: post_id.to_string(),
            platforms: post.platforms.clone(),
        });

        let outcome = self
            .publisher
            .publish(post.account_id, &PublishRequest::from(&post))
            .await;

        let status = if outcome.success {
            PostStatus::Published
        } else {
            PostStatus::Failed
        };
        let finished_at = chrono::Utc::now().timestamp();
        let recorded = self
            .db
            .finish_publication(
                post_id,
                &outcome.to_post_results(post_id, finished_at),
                status,
                finished_at,
            )
            .await?;

        if !recorded {
            let attempts = serde_json::to_string(&outcome.results).unwrap_or_default();
            warn!(
                post_id,
                attempts = %attempts,
                "Post left the approved state during publication; results not recorded"
            );
            return Err(SocialcastError::StateViolation(
                "Post left the approved state during publication".to_string(),
            ));
        }

        info!(
            post_id,
            status = %status,
            failed_platforms = outcome.failures().count(),
            "Publication finished"
        );
        self.events.emit(Event::publication_finished(post_id, &outcome));
        Ok(outcome)
    }

    /// Move an approved post to `failed`; `false` if it was not approved
    pub async fn mark_failed(&self, post_id: &str) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let moved = self
            .db
            .transition_status(post_id, PostStatus::Approved, PostStatus::Failed, now)
            .await?;

        if moved {
            warn!(post_id, "Marked post as failed");
        }
        Ok(moved)
    }

    pub async fn get(&self, post_id: &str) -> Result<PostWithResults> {
        self.db
            .get_post_with_results(post_id)
            .await?
            .ok_or_else(|| SocialcastError::NotFound(format!("Post {}", post_id)))
    }

    pub async fn list(
        &self,
        account_id: Option<i64>,
        status: Option<PostStatus>,
        limit: usize,
    ) -> Result<Vec<Post>> {
        self.db.list_posts(account_id, status, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::mock::{MockPlatform, MockProvider};
    use crate::platforms::PlatformKind;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        db: Database,
        lifecycle: PostLifecycle,
        account: i64,
    }

    async fn setup(provider: MockProvider) -> Fixture {
        let temp = TempDir::new().unwrap();
        let db = Database::new(&temp.path().join("test.db").to_string_lossy())
            .await
            .unwrap();
        let account = db.create_account("tester").await.unwrap().id;
        let publisher = Arc::new(Publisher::new(Arc::new(provider)));
        let lifecycle = PostLifecycle::new(db.clone(), publisher, EventBus::default());
        Fixture {
            _temp: temp,
            db,
            lifecycle,
            account,
        }
    }

    fn facebook_ok() -> MockProvider {
        MockProvider::new().with(MockPlatform::success(PlatformKind::Facebook))
    }

    #[tokio::test]
    async fn test_create_stores_pending_post() {
        let f = setup(facebook_ok()).await;

        let created = f
            .lifecycle
            .create(f.account, NewPost::text("hello", &["facebook"]))
            .await
            .unwrap();

        assert!(created.approval.is_none());
        assert_eq!(created.post.status, PostStatus::PendingApproval);
        let stored = f.db.get_post(&created.post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::PendingApproval);
    }

    #[tokio::test]
    async fn test_create_for_unknown_account() {
        let f = setup(facebook_ok()).await;
        let err = f
            .lifecycle
            .create(424242, NewPost::text("hello", &["facebook"]))
            .await
            .unwrap_err();
        assert!(matches!(err, SocialcastError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_media_with_video() {
        let f = setup(facebook_ok()).await;
        let mut request = NewPost::video("hello", &["tiktok"], "https://cdn.example/v.mp4");
        request.media_urls = Some(vec!["https://cdn.example/a.jpg".to_string()]);

        let err = f.lifecycle.create(f.account, request).await.unwrap_err();
        assert!(matches!(err, SocialcastError::InvalidInput(_)));
        assert!(f.db.list_posts(None, None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_approve_due_post_publishes_immediately() {
        let f = setup(facebook_ok()).await;
        let post = f
            .lifecycle
            .create(f.account, NewPost::text("hello", &["facebook"]))
            .await
            .unwrap()
            .post;

        let outcome = f.lifecycle.approve(f.account, &post.id).await.unwrap();
        match outcome {
            ApprovalOutcome::Published(outcome) => assert!(outcome.success),
            other => panic!("expected publication, got {:?}", other),
        }

        let stored = f.lifecycle.get(&post.id).await.unwrap();
        assert_eq!(stored.post.status, PostStatus::Published);
        assert!(stored.post.published_at.is_some());
        assert_eq!(stored.results.len(), 1);
        assert!(stored.results[0].success);
    }

    #[tokio::test]
    async fn test_approve_future_post_is_deferred() {
        let f = setup(facebook_ok()).await;
        let at = chrono::Utc::now().timestamp() + 3600;
        let post = f
            .lifecycle
            .create(f.account, NewPost::text("later", &["facebook"]).scheduled_at(at))
            .await
            .unwrap()
            .post;

        let outcome = f.lifecycle.approve(f.account, &post.id).await.unwrap();
        assert!(matches!(outcome, ApprovalOutcome::Deferred { scheduled_at } if scheduled_at == at));
        assert_eq!(
            f.db.get_post(&post.id).await.unwrap().unwrap().status,
            PostStatus::Approved
        );
    }

    #[tokio::test]
    async fn test_approve_twice_is_state_violation() {
        let f = setup(facebook_ok()).await;
        let post = f
            .lifecycle
            .create(f.account, NewPost::text("hello", &["facebook"]))
            .await
            .unwrap()
            .post;

        f.lifecycle.approve(f.account, &post.id).await.unwrap();
        let err = f.lifecycle.approve(f.account, &post.id).await.unwrap_err();

        assert_eq!(err.to_string(), "Invalid state: Post already processed");
        assert_eq!(
            f.db.get_post(&post.id).await.unwrap().unwrap().status,
            PostStatus::Published
        );
    }

    #[tokio::test]
    async fn test_approve_unknown_or_foreign_post_is_not_found() {
        let f = setup(facebook_ok()).await;
        let other = f.db.create_account("other").await.unwrap().id;
        let post = f
            .lifecycle
            .create(f.account, NewPost::text("hello", &["facebook"]))
            .await
            .unwrap()
            .post;

        let err = f.lifecycle.approve(f.account, "missing").await.unwrap_err();
        assert!(matches!(err, SocialcastError::NotFound(_)));

        let err = f.lifecycle.approve(other, &post.id).await.unwrap_err();
        assert!(matches!(err, SocialcastError::NotFound(_)));
        assert_eq!(
            f.db.get_post(&post.id).await.unwrap().unwrap().status,
            PostStatus::PendingApproval
        );
    }

    #[tokio::test]
    async fn test_all_platforms_failing_marks_failed() {
        let provider = MockProvider::new().with(MockPlatform::failure(PlatformKind::Facebook, "rejected"));
        let f = setup(provider).await;
        let post = f
            .lifecycle
            .create(f.account, NewPost::text("hello", &["facebook"]))
            .await
            .unwrap()
            .post;

        f.lifecycle.approve(f.account, &post.id).await.unwrap();

        let stored = f.lifecycle.get(&post.id).await.unwrap();
        assert_eq!(stored.post.status, PostStatus::Failed);
        assert_eq!(stored.results[0].error_message.as_deref(), Some("rejected"));
    }

    #[tokio::test]
    async fn test_publish_now_requires_approved() {
        let f = setup(facebook_ok()).await;
        let post = f
            .lifecycle
            .create(f.account, NewPost::text("hello", &["facebook"]))
            .await
            .unwrap()
            .post;

        let err = f.lifecycle.publish_now(&post.id).await.unwrap_err();
        assert!(matches!(err, SocialcastError::StateViolation(_)));

        let err = f.lifecycle.publish_now("missing").await.unwrap_err();
        assert!(matches!(err, SocialcastError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_auto_approve_publishes_on_create() {
        let f = setup(facebook_ok()).await;
        let mut request = NewPost::text("hello", &["facebook"]);
        request.auto_approve = true;

        let created = f.lifecycle.create(f.account, request).await.unwrap();
        assert!(matches!(created.approval, Some(ApprovalOutcome::Published(_))));
        assert_eq!(created.post.status, PostStatus::Published);
    }

    #[tokio::test]
    async fn test_mark_failed_only_from_approved() {
        let f = setup(facebook_ok()).await;
        let at = chrono::Utc::now().timestamp() + 3600;
        let post = f
            .lifecycle
            .create(f.account, NewPost::text("later", &["facebook"]).scheduled_at(at))
            .await
            .unwrap()
            .post;

        assert!(!f.lifecycle.mark_failed(&post.id).await.unwrap());
        f.lifecycle.approve(f.account, &post.id).await.unwrap();
        assert!(f.lifecycle.mark_failed(&post.id).await.unwrap());
        assert!(!f.lifecycle.mark_failed(&post.id).await.unwrap());

        assert_eq!(
            f.db.get_post(&post.id).await.unwrap().unwrap().status,
            PostStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_events_follow_lifecycle() {
        let f = setup(facebook_ok()).await;
        let mut events = f.lifecycle.events.subscribe();

        let post = f
            .lifecycle
            .create(f.account, NewPost::text("hello", &["facebook"]))
            .await
            .unwrap()
            .post;
        f.lifecycle.approve(f.account, &post.id).await.unwrap();

        assert!(matches!(events.recv().await.unwrap(), Event::PostCreated { .. }));
        assert!(matches!(events.recv().await.unwrap(), Event::PostApproved { .. }));
        assert!(matches!(events.recv().await.unwrap(), Event::PublicationStarted { .. }));
        assert!(matches!(
            events.recv().await.unwrap(),
            Event::PublicationFinished { success: true, .. }
        ));
    }

    #[tokio::test]
    async fn test_post_failed_mid_publication_keeps_its_status() {
        let provider = MockProvider::new().with(MockPlatform::with_delay(
            PlatformKind::Facebook,
            std::time::Duration::from_millis(400),
        ));
        let f = setup(provider).await;
        let at = chrono::Utc::now().timestamp() + 3600;
        let post = f
            .lifecycle
            .create(f.account, NewPost::text("slow", &["facebook"]).scheduled_at(at))
            .await
            .unwrap()
            .post;
        f.lifecycle.approve(f.account, &post.id).await.unwrap();

        let (published, failed) = tokio::join!(f.lifecycle.publish_now(&post.id), async {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            f.lifecycle.mark_failed(&post.id).await
        });

        assert!(failed.unwrap());
        assert!(matches!(published, Err(SocialcastError::StateViolation(_))));

        let stored = f.lifecycle.get(&post.id).await.unwrap();
        assert_eq!(stored.post.status, PostStatus::Failed);
        assert!(stored.results.is_empty());
    }
}
