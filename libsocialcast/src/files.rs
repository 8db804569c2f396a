//! Temporary storage for downloaded media
//!
//! Video bytes fetched from a caller-supplied URL live in the scratch
//! directory only for as long as the upload step that consumes them. Every
//! artifact is removed by whichever comes first: the consumer finishing (or
//! failing, or panicking), its own retention timer, or the periodic sweep.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use futures::FutureExt;
use rand::RngCore;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{HttpConfig, StorageConfig};
use crate::error::{PlatformError, Result};

/// Snapshot of the scratch directory
#[derive(Debug, Clone, Serialize)]
pub struct FileStoreStats {
    pub count: usize,
    pub total_size: u64,
    pub directory: PathBuf,
    pub retention_hours: u64,
}

impl FileStoreStats {
    pub fn total_size_mb(&self) -> f64 {
        self.total_size as f64 / (1024.0 * 1024.0)
    }
}

pub struct TempFileStore {
    dir: PathBuf,
    retention: Duration,
    cleanup_attempts: u32,
    cleanup_backoff: Duration,
    client: Client,
}

impl TempFileStore {
    pub fn new(storage: &StorageConfig, http: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(http.media_timeout())
            .build()
            .map_err(PlatformError::from)?;

        Ok(Self {
            dir: storage.resolve_temp_dir(),
            retention: storage.retention(),
            cleanup_attempts: storage.cleanup_attempts.max(1),
            cleanup_backoff: Duration::from_millis(storage.cleanup_backoff_ms),
            client,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Write `bytes` to a fresh artifact and arm its retention timer
    pub async fn store(&self, bytes: &[u8], extension: &str) -> std::result::Result<PathBuf, PlatformError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PlatformError::Io(format!("{}: {}", self.dir.display(), e)))?;

        let path = self.dir.join(artifact_name(extension));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| PlatformError::Io(format!("{}: {}", path.display(), e)))?;

        info!(path = %path.display(), size = bytes.len(), "Stored temporary artifact");

        let timer_path = path.clone();
        let retention = self.retention;
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            match tokio::fs::remove_file(&timer_path).await {
                Ok(()) => info!(path = %timer_path.display(), "Retention timer removed artifact"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %timer_path.display(), "Retention timer could not remove artifact: {}", e),
            }
        });

        Ok(path)
    }

    /// Download `url` into a new artifact
    pub async fn fetch(&self, url: &str, extension: &str) -> std::result::Result<PathBuf, PlatformError> {
        debug!(url, "Downloading media");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PlatformError::Download(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlatformError::Download(format!("HTTP {} for {}", status, url)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PlatformError::Download(format!("{}: {}", url, e)))?;
        if bytes.is_empty() {
            return Err(PlatformError::Download(format!("Empty body for {}", url)));
        }

        self.store(&bytes, extension).await
    }

    /// Remove an artifact
    ///
    /// Returns `true` only if this call removed a file. Failures other than
    /// "already gone" are retried with doubling backoff; the last one is
    /// logged and reported as `false`.
    pub async fn delete(&self, path: &Path) -> bool {
        let mut delay = self.cleanup_backoff;

        for attempt in 1..=self.cleanup_attempts {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    info!(path = %path.display(), "Deleted temporary artifact");
                    return true;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return false,
                Err(e) if attempt < self.cleanup_attempts => {
                    debug!(
                        path = %path.display(),
                        "Delete attempt {}/{} failed: {}",
                        attempt,
                        self.cleanup_attempts,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        "Failed to delete temporary artifact after {} attempts: {}",
                        self.cleanup_attempts,
                        e
                    );
                }
            }
        }

        false
    }

    /// Delete every artifact older than the retention window
    pub async fn sweep(&self) -> usize {
        let cutoff = SystemTime::now()
            .checked_sub(self.retention)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(dir = %self.dir.display(), "Cannot read scratch directory: {}", e);
                return 0;
            }
        };

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            // Files can vanish between listing and stat
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let Ok(modified) = metadata.modified() else {
                continue;
            };

            if modified < cutoff && self.delete(&entry.path()).await {
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Swept {} expired artifact(s)", removed);
        }
        removed
    }

    pub async fn stats(&self) -> FileStoreStats {
        let mut stats = FileStoreStats {
            count: 0,
            total_size: 0,
            directory: self.dir.clone(),
            retention_hours: self.retention.as_secs() / 3600,
        };

        let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await else {
            return stats;
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Ok(metadata) = entry.metadata().await {
                if metadata.is_file() {
                    stats.count += 1;
                    stats.total_size += metadata.len();
                }
            }
        }

        stats
    }

    /// Download `url`, hand the artifact to `consumer`, then delete it
    ///
    /// The artifact is deleted on every exit path. A panic inside the
    /// consumer is reported as an error once the file is gone.
    pub async fn process_upload<T, F, Fut>(
        &self,
        url: &str,
        extension: &str,
        consumer: F,
    ) -> std::result::Result<T, PlatformError>
    where
        F: FnOnce(PathBuf) -> Fut,
        Fut: Future<Output = std::result::Result<T, PlatformError>>,
    {
        let path = self.fetch(url, extension).await?;

        let outcome = AssertUnwindSafe(consumer(path.clone()))
            .catch_unwind()
            .await;

        self.delete(&path).await;

        match outcome {
            Ok(result) => result,
            Err(panic) => Err(PlatformError::Io(format!(
                "upload step panicked: {}",
                panic_message(&*panic)
            ))),
        }
    }
}

/// `upload_<unix-ts>_<16 hex chars><ext>`
fn artifact_name(extension: &str) -> String {
    let mut salt = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt: String = salt.iter().map(|b| format!("{:02x}", b)).collect();

    let extension = match extension {
        "" => String::new(),
        ext if ext.starts_with('.') => ext.to_string(),
        ext => format!(".{}", ext),
    };

    format!(
        "upload_{}_{}{}",
        chrono::Utc::now().timestamp(),
        salt,
        extension
    )
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_in(dir: &TempDir) -> TempFileStore {
        let storage = StorageConfig {
            temp_dir: Some(dir.path().to_string_lossy().to_string()),
            retention_hours: 24,
            cleanup_attempts: 2,
            cleanup_backoff_ms: 10,
        };
        TempFileStore::new(&storage, &HttpConfig::default()).unwrap()
    }

    fn age_file(path: &Path, by: Duration) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[test]
    fn test_artifact_name_format() {
        let name = artifact_name(".mp4");
        assert!(name.starts_with("upload_"));
        assert!(name.ends_with(".mp4"));

        let parts: Vec<&str> = name.trim_end_matches(".mp4").split('_').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 16);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));

        assert!(artifact_name("mp4").ends_with(".mp4"));
        assert_ne!(artifact_name(".mp4"), artifact_name(".mp4"));
    }

    #[tokio::test]
    async fn test_store_then_delete() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let path = store.store(b"video bytes", ".mp4").await.unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"video bytes");
        assert_eq!(store.stats().await.count, 1);

        assert!(store.delete(&path).await);
        assert!(!path.exists());
        assert_eq!(store.stats().await.count, 0);

        // Idempotent
        assert!(!store.delete(&path).await);
    }

    #[tokio::test]
    async fn test_stats_reports_sizes() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.store(&[0u8; 1024], ".mp4").await.unwrap();
        store.store(&[0u8; 2048], ".mp4").await.unwrap();

        let stats = store.stats().await;
        assert_eq!(stats.count, 2);
        assert_eq!(stats.total_size, 3072);
        assert_eq!(stats.retention_hours, 24);
        assert_eq!(stats.directory, dir.path());
        assert!(stats.total_size_mb() > 0.0);
    }

    #[tokio::test]
    async fn test_stats_on_missing_directory() {
        let dir = TempDir::new().unwrap();
        let storage = StorageConfig {
            temp_dir: Some(dir.path().join("never-created").to_string_lossy().to_string()),
            ..Default::default()
        };
        let store = TempFileStore::new(&storage, &HttpConfig::default()).unwrap();

        assert_eq!(store.stats().await.count, 0);
        assert_eq!(store.sweep().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let old = store.store(b"old", ".mp4").await.unwrap();
        let fresh = store.store(b"fresh", ".mp4").await.unwrap();
        age_file(&old, Duration::from_secs(25 * 3600));

        assert_eq!(store.sweep().await, 1);
        assert!(!old.exists());
        assert!(fresh.exists());

        let stats = store.stats().await;
        assert_eq!(stats.count, 1);
    }

    #[tokio::test]
    async fn test_retention_timer_deletes_artifact() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.retention = Duration::from_millis(50);

        let path = store.store(b"short-lived", ".mp4").await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp4-data".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let artifact = store
            .fetch(&format!("{}/clip.mp4", server.uri()), ".mp4")
            .await
            .unwrap();
        assert_eq!(std::fs::read(&artifact).unwrap(), b"mp4-data");
    }

    #[tokio::test]
    async fn test_fetch_not_found_leaves_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.mp4"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let err = store
            .fetch(&format!("{}/missing.mp4", server.uri()), ".mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Download(_)));
        assert!(err.to_string().contains("404"));
        assert_eq!(store.stats().await.count, 0);
    }

    #[tokio::test]
    async fn test_fetch_rejects_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/empty.mp4"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let err = store
            .fetch(&format!("{}/empty.mp4", server.uri()), ".mp4")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Empty body"));
        assert_eq!(store.stats().await.count, 0);
    }

    #[tokio::test]
    async fn test_process_upload_cleans_up_on_every_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp4-data".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let url = format!("{}/clip.mp4", server.uri());

        let size = store
            .process_upload(&url, ".mp4", |p| async move {
                let bytes = tokio::fs::read(&p).await.unwrap();
                Ok(bytes.len())
            })
            .await
            .unwrap();
        assert_eq!(size, 8);
        assert_eq!(store.stats().await.count, 0);

        let err = store
            .process_upload(&url, ".mp4", |_| async move {
                Err::<(), _>(PlatformError::Api("remote rejected".to_string()))
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "remote rejected");
        assert_eq!(store.stats().await.count, 0);

        let err = store
            .process_upload(&url, ".mp4", |_| async move {
                if true {
                    panic!("consumer blew up");
                }
                Ok::<(), PlatformError>(())
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("consumer blew up"));
        assert_eq!(store.stats().await.count, 0);
    }
}
