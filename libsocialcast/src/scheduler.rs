//! Periodic jobs: publishing due posts and sweeping expired artifacts

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::db::Database;
use crate::error::{Result, SocialcastError};
use crate::files::{panic_message, TempFileStore};
use crate::lifecycle::PostLifecycle;
use crate::service::events::{Event, EventBus};

/// Tally of one publication tick
///
/// `processed == published + failed + skipped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub published: usize,
    pub failed: usize,
    /// Claimed by another worker between the query and our attempt, or
    /// moved out of `approved` while it was being published
    pub skipped: usize,
}

pub struct Scheduler {
    db: Database,
    lifecycle: Arc<PostLifecycle>,
    files: Arc<TempFileStore>,
    events: EventBus,
    claim_timeout_secs: i64,
}

impl Scheduler {
    pub fn new(
        db: Database,
        lifecycle: Arc<PostLifecycle>,
        files: Arc<TempFileStore>,
        events: EventBus,
        claim_timeout_secs: i64,
    ) -> Self {
        Self {
            db,
            lifecycle,
            files,
            events,
            claim_timeout_secs,
        }
    }

    /// Publish every approved, unclaimed post whose schedule has passed
    ///
    /// Posts are processed one after another. A post whose publication
    /// returns an error or panics is marked failed and the batch carries on.
    /// Claims older than the claim timeout are failed before the query so a
    /// crashed worker cannot strand a post.
    pub async fn run_publication_tick(&self, now: i64) -> Result<BatchSummary> {
        let abandoned = self
            .db
            .fail_stale_claims(now - self.claim_timeout_secs, now)
            .await?;
        for post_id in &abandoned {
            warn!(post_id = %post_id, "Failed post with abandoned publication claim");
        }

        let due = self.db.due_posts(now).await?;
        let mut summary = BatchSummary::default();

        for post in due {
            summary.processed += 1;

            let attempt = AssertUnwindSafe(self.lifecycle.publish_now(&post.id))
                .catch_unwind()
                .await;

            match attempt {
                Ok(Ok(outcome)) if outcome.success => summary.published += 1,
                Ok(Ok(_)) => summary.failed += 1,
                Ok(Err(SocialcastError::StateViolation(reason))) => {
                    info!(post_id = %post.id, "Skipped: {}", reason);
                    summary.skipped += 1;
                }
                Ok(Err(e)) => {
                    error!(post_id = %post.id, "Publication error: {}", e);
                    self.fail_post(&post.id).await;
                    summary.failed += 1;
                }
                Err(panic) => {
                    error!(post_id = %post.id, "Publication panicked: {}", panic_message(&*panic));
                    self.fail_post(&post.id).await;
                    summary.failed += 1;
                }
            }
        }

        if summary.processed > 0 {
            info!(
                processed = summary.processed,
                published = summary.published,
                failed = summary.failed,
                skipped = summary.skipped,
                "Publication batch complete"
            );
        }
        self.events.emit(Event::batch_completed(&summary));

        Ok(summary)
    }

    async fn fail_post(&self, post_id: &str) {
        if let Err(e) = self.lifecycle.mark_failed(post_id).await {
            error!(post_id, "Could not mark post failed: {}", e);
        }
    }

    /// Remove artifacts older than the retention window
    pub async fn run_artifact_sweep(&self) -> usize {
        let removed = self.files.sweep().await;
        self.events.emit(Event::ArtifactsSwept { removed });
        removed
    }
}
