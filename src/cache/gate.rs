//! Existence-checked artifact cache
//!
//! An artifact is cached iff its file exists. A miss runs the producer
//! under the keyed executor; a successful production arms expiry.

use crate::cache::executor::KeyedExecutor;
use crate::cache::reaper::Reaper;
use crate::error::MapmergeResult;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

/// One cache instance: its own keyspace, expiry policy and lifetime
pub struct ArtifactCache {
    executor: KeyedExecutor<()>,
    reaper: Reaper,
    lifetime: Duration,
}

impl ArtifactCache {
    /// Create a cache whose artifacts live for `lifetime`
    ///
    /// `purpose` names both the keyspace and the artifacts in log output.
    pub fn new(purpose: &'static str, lifetime: Duration) -> Self {
        Self {
            executor: KeyedExecutor::new(purpose),
            reaper: Reaper::new(purpose),
            lifetime,
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn reaper(&self) -> &Reaper {
        &self.reaper
    }

    /// Keys currently being produced
    pub fn in_flight(&self) -> usize {
        self.executor.in_flight()
    }

    /// Make sure `target` exists, producing it at most once
    ///
    /// Returns immediately if the file is already there. Otherwise
    /// `produce` runs under the target's key; callers arriving meanwhile
    /// share its outcome. Existence is checked again inside the critical
    /// section because the previous holder may have just finished.
    pub async fn get_or_produce<F, Fut>(&self, target: &Path, produce: F) -> MapmergeResult<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = MapmergeResult<()>> + Send + 'static,
    {
        if artifact_exists(target).await {
            debug!("Cache hit for '{}'", target.display());
            return Ok(());
        }

        let key = target.to_string_lossy().into_owned();
        let target: PathBuf = target.to_path_buf();
        let reaper = self.reaper.clone();
        let lifetime = self.lifetime;

        self.executor
            .run_exclusive(&key, move || async move {
                if artifact_exists(&target).await {
                    return Ok(());
                }

                produce().await?;
                info!("Produced '{}'", target.display());
                reaper.schedule_expiry(target, lifetime);
                Ok(())
            })
            .await
    }
}

/// Whether an artifact is materialized at `path`
pub async fn artifact_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MapmergeError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn writer(
        target: PathBuf,
        runs: Arc<AtomicUsize>,
    ) -> impl FnOnce() -> futures_util::future::BoxFuture<'static, MapmergeResult<()>> + Send + 'static
    {
        use futures_util::FutureExt;
        move || {
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                fs::write(&target, b"artifact")
                    .await
                    .map_err(|e| MapmergeError::io("writing artifact", e))
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn present_artifact_skips_producer() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("done.png");
        fs::write(&target, b"cached").await.unwrap();

        let cache = ArtifactCache::new("test", Duration::from_secs(60));
        let runs = Arc::new(AtomicUsize::new(0));
        cache
            .get_or_produce(&target, writer(target.clone(), Arc::clone(&runs)))
            .await
            .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(fs::read(&target).await.unwrap(), b"cached");
    }

    #[tokio::test]
    async fn second_call_is_fast_path() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.png");
        let cache = ArtifactCache::new("test", Duration::from_secs(60));
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            cache
                .get_or_produce(&target, writer(target.clone(), Arc::clone(&runs)))
                .await
                .unwrap();
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_produce_once() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.png");
        let cache = Arc::new(ArtifactCache::new("test", Duration::from_secs(60)));
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let target = target.clone();
            let produce = writer(target.clone(), Arc::clone(&runs));
            handles.push(tokio::spawn(async move {
                cache.get_or_produce(&target, produce).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test]
    async fn failure_is_not_expired_and_retries() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.png");
        let cache = ArtifactCache::new("test", Duration::from_millis(100));

        let err = cache
            .get_or_produce(&target, || async {
                Err(MapmergeError::Internal("engine down".to_string()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err.root(), MapmergeError::Internal(_)));

        // A later call gets a fresh attempt
        let runs = Arc::new(AtomicUsize::new(0));
        cache
            .get_or_produce(&target, writer(target.clone(), Arc::clone(&runs)))
            .await
            .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn produced_artifact_expires() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.png");
        let cache = ArtifactCache::new("test", Duration::from_millis(300));
        let runs = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_produce(&target, writer(target.clone(), Arc::clone(&runs)))
            .await
            .unwrap();
        assert!(target.exists());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!target.exists());
    }
}
