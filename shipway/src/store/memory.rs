//! In-memory artifact store.

use super::{content_checksum, ArtifactStore, SlotEntry};
use crate::core::{ArtifactKind, ArtifactRef, RunId};
use crate::errors::StoreError;
use async_trait::async_trait;
use dashmap::DashMap;

/// `DashMap`-backed store. The default for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    /// Payload bytes keyed by content checksum.
    blobs: DashMap<String, Vec<u8>>,
    /// Live refs keyed by `(run, stage)` slot.
    slots: DashMap<(RunId, String), SlotEntry>,
}

impl MemoryArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct payloads held.
    #[must_use]
    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
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
        self.blobs
            .entry(checksum.clone())
            .or_insert_with(|| payload.to_vec());

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

        let mut entry = self
            .slots
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(artifact.to_string()))?;
        if entry.artifact.id != artifact.id {
            return Err(StoreError::NotFound(artifact.to_string()));
        }
        entry.consumed = true;
        let checksum = entry.artifact.checksum.clone();
        drop(entry);

        self.blobs
            .get(&checksum)
            .map(|blob| blob.value().clone())
            .ok_or_else(|| StoreError::NotFound(artifact.to_string()))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryArtifactStore::new();

        let artifact = store
            .put(RunId(1), "source", ArtifactKind::SourceTree, b"tree")
            .await
            .unwrap();
        let payload = store.get(&artifact).await.unwrap();

        assert_eq!(payload, b"tree");
        assert_eq!(artifact.checksum, content_checksum(b"tree"));
    }

    #[tokio::test]
    async fn test_identical_payloads_share_one_blob() {
        let store = MemoryArtifactStore::new();

        store
            .put(RunId(1), "source", ArtifactKind::SourceTree, b"same")
            .await
            .unwrap();
        store
            .put(RunId(2), "source", ArtifactKind::SourceTree, b"same")
            .await
            .unwrap();

        assert_eq!(store.blob_count(), 1);
    }

    #[tokio::test]
    async fn test_overwrite_before_consume_allowed() {
        let store = MemoryArtifactStore::new();

        let first = store
            .put(RunId(1), "build", ArtifactKind::BuildOutput, b"v1")
            .await
            .unwrap();
        let second = store
            .put(RunId(1), "build", ArtifactKind::BuildOutput, b"v2")
            .await
            .unwrap();

        // the replaced ref is gone
        assert!(store.get(&first).await.is_err());
        assert_eq!(store.get(&second).await.unwrap(), b"v2");
    }

    #[tokio::test]
    async fn test_overwrite_after_consume_conflicts() {
        let store = MemoryArtifactStore::new();

        let artifact = store
            .put(RunId(1), "build", ArtifactKind::BuildOutput, b"v1")
            .await
            .unwrap();
        store.get(&artifact).await.unwrap();

        let result = store
            .put(RunId(1), "build", ArtifactKind::BuildOutput, b"v2")
            .await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_get_unknown_ref() {
        let store = MemoryArtifactStore::new();
        let artifact = ArtifactRef::new(RunId(9), "build", ArtifactKind::BuildOutput, "none");

        assert!(matches!(
            store.get(&artifact).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_discard_drops_unconsumed() {
        let store = MemoryArtifactStore::new();

        store
            .put(RunId(1), "build", ArtifactKind::BuildOutput, b"v1")
            .await
            .unwrap();
        store.discard(RunId(1), "build").await;

        assert!(store.lookup(RunId(1), "build").is_none());
    }

    #[tokio::test]
    async fn test_discard_keeps_consumed() {
        let store = MemoryArtifactStore::new();

        let artifact = store
            .put(RunId(1), "build", ArtifactKind::BuildOutput, b"v1")
            .await
            .unwrap();
        store.get(&artifact).await.unwrap();
        store.discard(RunId(1), "build").await;

        assert!(store.lookup(RunId(1), "build").is_some());
    }
}
