//! Artifact references and kinds.

use super::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The kind of payload an artifact carries between stages.
///
/// Stages declare which kinds they consume and produce; the executor
/// rejects inputs of an undeclared kind before any provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// A checked-out source revision.
    SourceTree,
    /// The output of a build stage.
    BuildOutput,
    /// The acknowledgement record of an applied deployment.
    DeploymentRecord,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceTree => write!(f, "source_tree"),
            Self::BuildOutput => write!(f, "build_output"),
            Self::DeploymentRecord => write!(f, "deployment_record"),
        }
    }
}

/// Reference to an artifact held by an [`ArtifactStore`](crate::store::ArtifactStore).
///
/// Refs are cheap to clone and safe to share; the payload bytes live in
/// the store, keyed by the content checksum. An artifact is produced by
/// exactly one stage execution and is immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Unique identifier for this artifact.
    pub id: Uuid,
    /// The run that produced the artifact.
    pub run: RunId,
    /// The stage that produced the artifact.
    pub stage: String,
    /// The kind of payload.
    pub kind: ArtifactKind,
    /// Hex-encoded SHA-256 digest of the payload.
    pub checksum: String,
    /// When the artifact was stored.
    pub created_at: DateTime<Utc>,
}

impl ArtifactRef {
    /// Creates a new reference with a generated id and the current time.
    #[must_use]
    pub fn new(
        run: RunId,
        stage: impl Into<String>,
        kind: ArtifactKind,
        checksum: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            run,
            stage: stage.into(),
            kind,
            checksum: checksum.into(),
            created_at: Utc::now(),
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.run, self.stage, self.kind)
    }
}
