use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use tokio::fs;

/// A validated upload waiting in the staging directory for the next
/// synchronization cycle.
#[derive(Debug, Clone, Serialize)]
pub struct StagedAsset {
    pub local_name: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Ephemeral directory of validated image bytes awaiting synchronization.
///
/// Acts as a write-ahead buffer: upload handlers only ever add new distinct
/// files, and the sync engine is the sole deleter. Nothing here survives a
/// host that clears `/tmp`; assets staged but unconfirmed at restart are
/// simply retried on the next cycle.
pub struct StagingStore {
    dir: PathBuf,
}

impl StagingStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Writes validated bytes under `local_name` and returns the staged entry.
    pub async fn store(&self, local_name: &str, bytes: &[u8]) -> io::Result<StagedAsset> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(local_name);
        fs::write(&path, bytes).await?;
        Ok(StagedAsset {
            local_name: local_name.to_string(),
            path,
            created_at: Utc::now(),
        })
    }

    /// Lists every staged file. A missing directory counts as empty.
    pub async fn list(&self) -> io::Result<Vec<StagedAsset>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut assets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let created_at = meta
                .created()
                .or_else(|_| meta.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            assets.push(StagedAsset {
                local_name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path(),
                created_at,
            });
        }
        assets.sort_by(|a, b| a.local_name.cmp(&b.local_name));
        Ok(assets)
    }

    pub async fn count(&self) -> io::Result<usize> {
        Ok(self.list().await?.len())
    }

    /// Removes exactly the given batch files. Files staged after the batch
    /// was listed are left in place for the next cycle.
    pub async fn remove(&self, assets: &[StagedAsset]) -> io::Result<()> {
        for asset in assets {
            match fs::remove_file(&asset.path).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
