//! Content-addressed artifact stores.
//!
//! Payloads are keyed by their SHA-256 digest, so identical outputs are
//! stored once. Refs track consumption: once a downstream stage has read
//! an artifact, its slot can no longer be overwritten.

mod fs;
mod memory;

pub use fs::FsArtifactStore;
pub use memory::MemoryArtifactStore;

use crate::core::{ArtifactKind, ArtifactRef, RunId};
use crate::errors::StoreError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Storage contract for artifacts flowing between stages.
///
/// Artifacts are immutable once stored. A slot — one `(run, stage)`
/// pair — holds at most one live ref; re-publishing to a slot replaces
/// the prior ref only while it is unconsumed.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Stores a payload and returns its reference.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` when the slot's prior artifact was
    /// already consumed, or `StoreError::Io` when the backing storage
    /// fails.
    async fn put(
        &self,
        run: RunId,
        stage: &str,
        kind: ArtifactKind,
        payload: &[u8],
    ) -> Result<ArtifactRef, StoreError>;

    /// Returns the payload for a ref and marks the ref consumed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` when the ref is unknown or has
    /// been replaced.
    async fn get(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, StoreError>;

    /// Drops an unconsumed ref, if one exists for the slot.
    ///
    /// Used on the cancellation path to withdraw a pending artifact.
    /// Consumed artifacts are never touched.
    async fn discard(&self, run: RunId, stage: &str);

    /// Returns the live ref for a slot, if any.
    fn lookup(&self, run: RunId, stage: &str) -> Option<ArtifactRef>;
}

/// A stored ref plus its consumption flag.
#[derive(Debug, Clone)]
pub(crate) struct SlotEntry {
    pub(crate) artifact: ArtifactRef,
    pub(crate) consumed: bool,
}

/// Hex-encoded SHA-256 digest of a payload.
#[must_use]
pub fn content_checksum(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}
