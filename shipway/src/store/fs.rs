//! Filesystem-backed artifact store.

use super::{content_checksum, ArtifactStore, SlotEntry};
use crate::config::Environment;
use crate::core::{ArtifactKind, ArtifactRef, RunId};
use crate::errors::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};

/// Store that persists payloads as content-addressed blobs on disk.
///
/// Blobs live under `<base>/<env>-artifacts/blobs/<checksum>` and
/// survive store restarts; the ref index is in-memory and rebuilt per
/// process. Blobs are shared between slots, so discarding a ref never
/// deletes bytes another slot may point at.
#[derive(Debug)]
pub struct FsArtifactStore {
    root: PathBuf,
    slots: DashMap<(RunId, String), SlotEntry>,
}

impl FsArtifactStore {
    /// Creates the store rooted at `<base>/<env>-artifacts`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` when the directory cannot be created.
    pub fn new(base: impl AsRef<Path>, environment: Environment) -> Result<Self, StoreError> {
        let root = base.as_ref().join(format!("{environment}-artifacts"));
        std::fs::create_dir_all(root.join("blobs"))?;

        Ok(Self {
            root,
            slots: DashMap::new(),
        })
    }

    /// The directory this store writes under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, checksum: &str) -> PathBuf {
        self.root.join("blobs").join(checksum)
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(
        &self,
        run: RunId,
        stage: &str,
        kind: ArtifactKind,
        payload: &[u8],
    ) -> Result<ArtifactRef, StoreError> {
        let key = (run, stage.to_string());

        if let Some(entry) = self.slots.get(&key) {
            if entry.consumed {
                return Err(StoreError::Conflict {
                    run,
                    stage: stage.to_string(),
                });
            }
        }

        let checksum = content_checksum(payload);
        let path = self.blob_path(&checksum);
        if !path.exists() {
            tokio::fs::write(&path, payload).await?;
        }

        let artifact = ArtifactRef::new(run, stage, kind, checksum);
        self.slots.insert(
            key,
            SlotEntry {
                artifact: artifact.clone(),
                consumed: false,
            },
        );

        Ok(artifact)
    }

    async fn get(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, StoreError> {
        let key = (artifact.run, artifact.stage.clone());

        let checksum = {
            let mut entry = self
                .slots
                .get_mut(&key)
                .ok_or_else(|| StoreError::NotFound(artifact.to_string()))?;
            if entry.artifact.id != artifact.id {
                return Err(StoreError::NotFound(artifact.to_string()));
            }
            entry.consumed = true;
            entry.artifact.checksum.clone()
        };

        let path = self.blob_path(&checksum);
        match tokio::fs::read(&path).await {
            Ok(payload) => Ok(payload),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(artifact.to_string()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn discard(&self, run: RunId, stage: &str) {
        let key = (run, stage.to_string());
        self.slots.remove_if(&key, |_, entry| !entry.consumed);
    }

    fn lookup(&self, run: RunId, stage: &str) -> Option<ArtifactRef> {
        self.slots
            .get(&(run, stage.to_string()))
            .map(|entry| entry.artifact.clone())
    }
}
