use crate::services::remote::{Presence, RemoteError, RemoteStore};
use crate::services::staging::{StagedAsset, StagingStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;

/// Per-asset outcome of one sync cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncAttempt {
    Created,
    Updated,
    /// The write reported success but the follow-up existence probe came
    /// back absent. Counted as a failure, never as a crash.
    VerifiedMissing,
    Failed {
        reason: String,
    },
}

impl SyncAttempt {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }
}

/// Aggregate result of one cycle over all staged assets.
#[derive(Debug, Serialize)]
pub struct BatchOutcome {
    pub total: usize,
    pub succeeded: usize,
    pub failed: Vec<StagedAsset>,
}

impl BatchOutcome {
    fn empty() -> Self {
        Self {
            total: 0,
            succeeded: 0,
            failed: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Reconciles the staging store with the remote asset repository.
///
/// Each asset walks existence-check, create-or-update, verify. Staged files
/// are deleted only when the whole batch confirmed; one failed asset keeps
/// every file staged for the next cycle rather than risking a silent loss.
pub struct SyncEngine {
    staging: Arc<StagingStore>,
    remote: Arc<dyn RemoteStore>,
    prefix: String,
    max_attempts: u32,
    backoff: Duration,
    // one cycle at a time; a manual trigger queues behind a scheduled run
    cycle_gate: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        staging: Arc<StagingStore>,
        remote: Arc<dyn RemoteStore>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            staging,
            remote,
            prefix: prefix.into(),
            max_attempts: 3,
            backoff: Duration::from_millis(500),
            cycle_gate: Mutex::new(()),
        }
    }

    /// Runs one batch cycle over everything currently staged.
    ///
    /// Returns an error only when the destination prefix could not be
    /// bootstrapped; without a writable prefix no asset can sync, so the
    /// cycle aborts early with the staging store untouched. Per-asset
    /// failures never abort the cycle.
    pub async fn run_cycle(&self) -> Result<BatchOutcome, RemoteError> {
        let _gate = self.cycle_gate.lock().await;

        let assets = self
            .staging
            .list()
            .await
            .map_err(|e| RemoteError::Transient(format!("staging list failed: {e}")))?;
        if assets.is_empty() {
            return Ok(BatchOutcome::empty());
        }

        tracing::info!("found {} staged image(s) to push", assets.len());

        let branch = self.remote.default_branch().await;
        self.remote.ensure_prefix(&self.prefix, &branch).await?;

        let mut succeeded = 0;
        let mut failed = Vec::new();
        for asset in &assets {
            let outcome = self.sync_asset(asset, &branch).await;
            match &outcome {
                SyncAttempt::Created => {
                    tracing::info!("created {} on '{branch}'", asset.local_name);
                    succeeded += 1;
                }
                SyncAttempt::Updated => {
                    tracing::info!("updated {} on '{branch}'", asset.local_name);
                    succeeded += 1;
                }
                SyncAttempt::VerifiedMissing => {
                    tracing::warn!(
                        "{} reported success but is absent on re-check",
                        asset.local_name
                    );
                    failed.push(asset.clone());
                }
                SyncAttempt::Failed { reason } => {
                    tracing::warn!("{} failed to sync: {reason}", asset.local_name);
                    failed.push(asset.clone());
                }
            }
        }

        let outcome = BatchOutcome {
            total: assets.len(),
            succeeded,
            failed,
        };

        if outcome.is_clean() {
            // The engine is the sole deleter; removing exactly the batch
            // files keeps uploads that landed mid-cycle staged.
            match self.staging.remove(&assets).await {
                Ok(()) => tracing::info!("cleared {} staged file(s)", outcome.total),
                // Leftover files are re-pushed next cycle; update-by-path
                // keeps that idempotent.
                Err(e) => tracing::warn!("failed to clear staging after push: {e}"),
            }
        } else {
            tracing::warn!(
                "{}/{} image(s) failed; staging left untouched for retry",
                outcome.failed.len(),
                outcome.total
            );
        }

        Ok(outcome)
    }

    async fn sync_asset(&self, asset: &StagedAsset, branch: &str) -> SyncAttempt {
        let path = format!("{}/{}", self.prefix, asset.local_name);
        let content = match tokio::fs::read(&asset.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return SyncAttempt::Failed {
                    reason: format!("staged file unreadable: {e}"),
                };
            }
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.push_once(&path, branch, &content, &asset.local_name).await {
                Ok(outcome) => return outcome,
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(
                        "attempt {attempt}/{} for {path} failed: {e}; retrying",
                        self.max_attempts
                    );
                    sleep(self.backoff).await;
                }
                Err(e) => {
                    return SyncAttempt::Failed {
                        reason: e.to_string(),
                    };
                }
            }
        }
    }

    /// One pass of the per-asset state machine: check, create or update,
    /// verify. Conflict and StaleRef bubble up so the retry loop re-enters
    /// at the existence check with a fresh ref.
    async fn push_once(
        &self,
        path: &str,
        branch: &str,
        content: &[u8],
        local_name: &str,
    ) -> Result<SyncAttempt, RemoteError> {
        let updated = match self.remote.object_exists(path, branch).await? {
            Presence::Absent => {
                self.remote
                    .create_object(path, branch, content, &format!("Add image {local_name}"))
                    .await?;
                false
            }
            Presence::Present(obj_ref) => {
                self.remote
                    .update_object(
                        path,
                        branch,
                        content,
                        &format!("Update image {local_name}"),
                        &obj_ref,
                    )
                    .await?;
                true
            }
        };

        // Presence is the durability proof; content equality is not checked.
        match self.remote.object_exists(path, branch).await? {
            Presence::Present(_) => Ok(if updated {
                SyncAttempt::Updated
            } else {
                SyncAttempt::Created
            }),
            Presence::Absent => Ok(SyncAttempt::VerifiedMissing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::remote::{InMemoryRemote, RemoteObjectRef};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Remote that delegates to an in-memory store but can be scripted to
    /// fail a bounded or unbounded number of calls.
    struct ScriptedRemote {
        inner: InMemoryRemote,
        transient_probes: AtomicU32,
        stale_updates: AtomicU32,
        lie_absent: AtomicU32,
        writes_always_fail: bool,
        fail_path: Option<String>,
        fail_prefix: bool,
    }

    impl ScriptedRemote {
        fn wrapping(inner: InMemoryRemote) -> Self {
            Self {
                inner,
                transient_probes: AtomicU32::new(0),
                stale_updates: AtomicU32::new(0),
                lie_absent: AtomicU32::new(0),
                writes_always_fail: false,
                fail_path: None,
                fail_prefix: false,
            }
        }

        fn take(counter: &AtomicU32) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl RemoteStore for ScriptedRemote {
        async fn default_branch(&self) -> String {
            self.inner.default_branch().await
        }

        async fn object_exists(&self, path: &str, branch: &str) -> Result<Presence, RemoteError> {
            if Self::take(&self.transient_probes) {
                return Err(RemoteError::Transient("scripted 500".to_string()));
            }
            if Self::take(&self.lie_absent) {
                return Ok(Presence::Absent);
            }
            self.inner.object_exists(path, branch).await
        }

        async fn create_object(
            &self,
            path: &str,
            branch: &str,
            content: &[u8],
            message: &str,
        ) -> Result<(), RemoteError> {
            if self.writes_always_fail || self.fail_path.as_deref() == Some(path) {
                return Err(RemoteError::Transient("scripted 500".to_string()));
            }
            self.inner.create_object(path, branch, content, message).await
        }

        async fn update_object(
            &self,
            path: &str,
            branch: &str,
            content: &[u8],
            message: &str,
            object_ref: &RemoteObjectRef,
        ) -> Result<(), RemoteError> {
            if self.writes_always_fail || self.fail_path.as_deref() == Some(path) {
                return Err(RemoteError::Transient("scripted 500".to_string()));
            }
            if Self::take(&self.stale_updates) {
                return Err(RemoteError::StaleRef);
            }
            self.inner
                .update_object(path, branch, content, message, object_ref)
                .await
        }

        async fn ensure_prefix(&self, prefix: &str, branch: &str) -> Result<(), RemoteError> {
            if self.fail_prefix {
                return Err(RemoteError::PrefixBootstrap("scripted outage".to_string()));
            }
            self.inner.ensure_prefix(prefix, branch).await
        }
    }

    fn engine_with(
        staging: Arc<StagingStore>,
        remote: Arc<dyn RemoteStore>,
    ) -> SyncEngine {
        SyncEngine::new(staging, remote, "images")
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let staging = Arc::new(StagingStore::new(dir.path()));
        let remote = Arc::new(InMemoryRemote::new("main"));

        let outcome = engine_with(staging, remote.clone()).run_cycle().await.unwrap();
        assert_eq!(outcome.total, 0);
        assert_eq!(outcome.succeeded, 0);
        assert!(outcome.is_clean());
        // Nothing was bootstrapped or written.
        assert_eq!(remote.object_count(), 0);
    }

    #[tokio::test]
    async fn test_fresh_asset_is_created_and_staging_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let staging = Arc::new(StagingStore::new(dir.path()));
        staging.store("a.png", b"pixels").await.unwrap();
        let remote = Arc::new(InMemoryRemote::new("main"));

        let outcome = engine_with(staging.clone(), remote.clone())
            .run_cycle()
            .await
            .unwrap();

        assert_eq!(outcome.total, 1);
        assert_eq!(outcome.succeeded, 1);
        assert!(outcome.is_clean());
        assert_eq!(remote.content("images/a.png").unwrap(), b"pixels");
        assert!(staging.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_existing_object_is_updated() {
        let dir = tempfile::tempdir().unwrap();
        let staging = Arc::new(StagingStore::new(dir.path()));
        staging.store("a.png", b"v2").await.unwrap();
        let remote = Arc::new(InMemoryRemote::new("main"));
        remote.seed("images/a.png", b"v1");

        let outcome = engine_with(staging.clone(), remote.clone())
            .run_cycle()
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, 1);
        assert_eq!(remote.content("images/a.png").unwrap(), b"v2");
        assert!(staging.list().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_failure_blocks_the_purge() {
        let dir = tempfile::tempdir().unwrap();
        let staging = Arc::new(StagingStore::new(dir.path()));
        staging.store("a.png", b"pixels").await.unwrap();

        let mut remote = ScriptedRemote::wrapping(InMemoryRemote::new("main"));
        remote.writes_always_fail = true;
        let outcome = engine_with(staging.clone(), Arc::new(remote))
            .run_cycle()
            .await
            .unwrap();

        assert_eq!(outcome.total, 1);
        assert_eq!(outcome.succeeded, 0);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].local_name, "a.png");

        // The failed asset stays staged for the next cycle.
        let left = staging.list().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].local_name, "a.png");
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failed_asset_keeps_the_whole_batch_staged() {
        let dir = tempfile::tempdir().unwrap();
        let staging = Arc::new(StagingStore::new(dir.path()));
        staging.store("good.png", b"ok").await.unwrap();
        staging.store("zz.png", b"ok").await.unwrap();

        let mut remote = ScriptedRemote::wrapping(InMemoryRemote::new("main"));
        remote.fail_path = Some("images/zz.png".to_string());
        let scripted = Arc::new(remote);

        let outcome = engine_with(staging.clone(), scripted.clone())
            .run_cycle()
            .await
            .unwrap();

        assert_eq!(outcome.total, 2);
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].local_name, "zz.png");
        assert!(scripted.inner.contains("images/good.png"));

        // All-or-nothing purge: the confirmed asset remains staged too.
        assert_eq!(staging.list().await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_probe_failures_recover_within_budget() {
        let dir = tempfile::tempdir().unwrap();
        let staging = Arc::new(StagingStore::new(dir.path()));
        staging.store("a.png", b"pixels").await.unwrap();

        let remote = ScriptedRemote::wrapping(InMemoryRemote::new("main"));
        remote.transient_probes.store(2, Ordering::SeqCst);
        let scripted = Arc::new(remote);

        let outcome = engine_with(staging.clone(), scripted.clone())
            .run_cycle()
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, 1);
        assert!(scripted.inner.contains("images/a.png"));
        assert!(staging.list().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_ref_converges_within_budget() {
        let dir = tempfile::tempdir().unwrap();
        let staging = Arc::new(StagingStore::new(dir.path()));
        staging.store("a.png", b"v2").await.unwrap();

        let remote = ScriptedRemote::wrapping(InMemoryRemote::new("main"));
        remote.inner.seed("images/a.png", b"v1");
        remote.stale_updates.store(1, Ordering::SeqCst);
        let scripted = Arc::new(remote);

        let outcome = engine_with(staging.clone(), scripted.clone())
            .run_cycle()
            .await
            .unwrap();

        assert_eq!(outcome.succeeded, 1);
        assert!(outcome.is_clean());
        assert_eq!(scripted.inner.content("images/a.png").unwrap(), b"v2");
        assert!(staging.list().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_conflict_reroutes_to_update() {
        let dir = tempfile::tempdir().unwrap();
        let staging = Arc::new(StagingStore::new(dir.path()));
        staging.store("a.png", b"v2").await.unwrap();

        // The first probe claims the object is absent even though it exists,
        // so create hits a conflict and the retry re-checks and updates.
        let remote = ScriptedRemote::wrapping(InMemoryRemote::new("main"));
        remote.inner.seed("images/a.png", b"v1");
        remote.lie_absent.store(1, Ordering::SeqCst);
        let scripted = Arc::new(remote);

        let outcome = engine_with(staging.clone(), scripted.clone())
            .run_cycle()
            .await
            .unwrap();

        assert!(outcome.is_clean());
        assert_eq!(scripted.inner.content("images/a.png").unwrap(), b"v2");
    }

    #[tokio::test]
    async fn test_prefix_bootstrap_failure_aborts_the_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let staging = Arc::new(StagingStore::new(dir.path()));
        staging.store("a.png", b"pixels").await.unwrap();

        let mut remote = ScriptedRemote::wrapping(InMemoryRemote::new("main"));
        remote.fail_prefix = true;
        let result = engine_with(staging.clone(), Arc::new(remote)).run_cycle().await;

        assert!(matches!(result, Err(RemoteError::PrefixBootstrap(_))));
        // Nothing was consumed; the next interval retries the whole batch.
        assert_eq!(staging.list().await.unwrap().len(), 1);
    }
}
