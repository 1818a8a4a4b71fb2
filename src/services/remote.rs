use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// The remote store's notion of a file at a path. A present `sha` means the
/// object already exists and must be supplied on update so conflicting
/// writes are detected instead of silently clobbered.
#[derive(Debug, Clone, Serialize)]
pub struct RemoteObjectRef {
    pub path: String,
    pub branch: String,
    pub sha: Option<String>,
}

/// Outcome of an existence probe. A failed probe is *not* absence; transport
/// failures surface as `RemoteError::Transient` so callers never mistake a
/// network error for "does not exist".
#[derive(Debug, Clone)]
pub enum Presence {
    Present(RemoteObjectRef),
    Absent,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("transient remote failure: {0}")]
    Transient(String),

    #[error("object already exists at {path}")]
    Conflict { path: String },

    #[error("remote object changed since the last check")]
    StaleRef,

    #[error("destination prefix could not be bootstrapped: {0}")]
    PrefixBootstrap(String),
}

impl RemoteError {
    /// Whether the sync engine may spend another attempt on this error.
    /// Conflict and StaleRef mean the remote raced ahead; a re-check
    /// re-routes the write. PrefixBootstrap aborts the whole cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transient(_) | Self::Conflict { .. } | Self::StaleRef
        )
    }
}

/// A version-controlled object store addressed by path within a branch,
/// backed by a REST content API.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Resolves the repository's default branch, falling back to the
    /// configured branch on any transport or non-2xx response.
    async fn default_branch(&self) -> String;

    async fn object_exists(&self, path: &str, branch: &str) -> Result<Presence, RemoteError>;

    /// Creates an object that must not already exist. `Conflict` means the
    /// caller's existence check is out of date.
    async fn create_object(
        &self,
        path: &str,
        branch: &str,
        content: &[u8],
        message: &str,
    ) -> Result<(), RemoteError>;

    /// Updates an existing object. `object_ref` must come from a prior
    /// existence check; `StaleRef` means the remote changed in between.
    async fn update_object(
        &self,
        path: &str,
        branch: &str,
        content: &[u8],
        message: &str,
        object_ref: &RemoteObjectRef,
    ) -> Result<(), RemoteError>;

    /// Idempotently makes sure the destination prefix exists, creating a
    /// `<prefix>/.keep` placeholder if it does not. "Prefix already has
    /// content" and "placeholder created" are both success.
    async fn ensure_prefix(&self, prefix: &str, branch: &str) -> Result<(), RemoteError>;
}

struct StoredObject {
    content: Vec<u8>,
    sha: String,
}

/// In-memory remote store for development and tests.
pub struct InMemoryRemote {
    branch: String,
    objects: Mutex<HashMap<String, StoredObject>>,
    revision: Mutex<u64>,
}

impl InMemoryRemote {
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            objects: Mutex::new(HashMap::new()),
            revision: Mutex::new(0),
        }
    }

    fn next_sha(&self) -> String {
        let mut rev = self.revision.lock().unwrap();
        *rev += 1;
        format!("rev-{rev}")
    }

    /// Seeds an object directly, bypassing the conflict checks.
    pub fn seed(&self, path: &str, content: &[u8]) {
        let sha = self.next_sha();
        self.objects.lock().unwrap().insert(
            path.to_string(),
            StoredObject {
                content: content.to_vec(),
                sha,
            },
        );
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .map(|o| o.content.clone())
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn default_branch(&self) -> String {
        self.branch.clone()
    }

    async fn object_exists(&self, path: &str, branch: &str) -> Result<Presence, RemoteError> {
        let objects = self.objects.lock().unwrap();
        Ok(match objects.get(path) {
            Some(obj) => Presence::Present(RemoteObjectRef {
                path: path.to_string(),
                branch: branch.to_string(),
                sha: Some(obj.sha.clone()),
            }),
            None => Presence::Absent,
        })
    }

    async fn create_object(
        &self,
        path: &str,
        _branch: &str,
        content: &[u8],
        _message: &str,
    ) -> Result<(), RemoteError> {
        let sha = self.next_sha();
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(path) {
            return Err(RemoteError::Conflict {
                path: path.to_string(),
            });
        }
        objects.insert(
            path.to_string(),
            StoredObject {
                content: content.to_vec(),
                sha,
            },
        );
        Ok(())
    }

    async fn update_object(
        &self,
        path: &str,
        _branch: &str,
        content: &[u8],
        _message: &str,
        object_ref: &RemoteObjectRef,
    ) -> Result<(), RemoteError> {
        let sha = self.next_sha();
        let mut objects = self.objects.lock().unwrap();
        match objects.get_mut(path) {
            Some(obj) if object_ref.sha.as_deref() == Some(obj.sha.as_str()) => {
                obj.content = content.to_vec();
                obj.sha = sha;
                Ok(())
            }
            _ => Err(RemoteError::StaleRef),
        }
    }

    async fn ensure_prefix(&self, prefix: &str, _branch: &str) -> Result<(), RemoteError> {
        let marker = format!("{prefix}/.keep");
        let sha = self.next_sha();
        let mut objects = self.objects.lock().unwrap();
        let has_content = objects.keys().any(|k| k.starts_with(&format!("{prefix}/")));
        if !has_content {
            objects.insert(
                marker,
                StoredObject {
                    content: Vec::new(),
                    sha,
                },
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_create_then_update() {
        let remote = InMemoryRemote::new("main");

        assert!(matches!(
            remote.object_exists("images/a.png", "main").await.unwrap(),
            Presence::Absent
        ));

        remote
            .create_object("images/a.png", "main", b"v1", "Add image a.png")
            .await
            .unwrap();

        let Presence::Present(obj_ref) = remote.object_exists("images/a.png", "main").await.unwrap()
        else {
            panic!("object should exist after create");
        };

        remote
            .update_object("images/a.png", "main", b"v2", "Update image a.png", &obj_ref)
            .await
            .unwrap();
        assert_eq!(remote.content("images/a.png").unwrap(), b"v2");

        // The old ref no longer matches once the object moved on.
        let stale = remote
            .update_object("images/a.png", "main", b"v3", "Update image a.png", &obj_ref)
            .await;
        assert!(matches!(stale, Err(RemoteError::StaleRef)));
    }

    #[tokio::test]
    async fn test_in_memory_create_conflict() {
        let remote = InMemoryRemote::new("main");
        remote.seed("images/a.png", b"v1");

        let err = remote
            .create_object("images/a.png", "main", b"v2", "Add image a.png")
            .await;
        assert!(matches!(err, Err(RemoteError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_ensure_prefix_is_idempotent() {
        let remote = InMemoryRemote::new("main");

        remote.ensure_prefix("images", "main").await.unwrap();
        assert!(remote.contains("images/.keep"));

        remote.seed("images/a.png", b"v1");
        remote.ensure_prefix("images", "main").await.unwrap();
        assert_eq!(remote.object_count(), 2);
    }
}
