//! Stage failure taxonomy.

use super::ArtifactKind;
use crate::errors::StoreError;
use thiserror::Error;

/// Why a stage attempt did not produce an artifact.
///
/// Failures are recorded in the execution snapshot at the engine
/// boundary; they never propagate past it. Only `Timeout` and `Adapter`
/// are eligible for retry.
#[derive(Debug, Error)]
pub enum StageFailure {
    /// The provider call exceeded the stage deadline.
    #[error("stage '{stage}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The stage name.
        stage: String,
        /// The configured deadline in milliseconds.
        timeout_ms: u64,
    },

    /// The provider adapter returned an error.
    #[error("adapter error in stage '{stage}': {cause}")]
    Adapter {
        /// The stage name.
        stage: String,
        /// The underlying provider error.
        #[source]
        cause: anyhow::Error,
    },

    /// The stage observed the cancellation signal and aborted.
    #[error("stage '{stage}' cancelled: {reason}")]
    Cancelled {
        /// The stage name.
        stage: String,
        /// The cancellation reason.
        reason: String,
    },

    /// An input artifact's kind was not declared by the stage.
    #[error("stage '{stage}' received a {got} artifact, expected one of {expected:?}")]
    BadInput {
        /// The stage name.
        stage: String,
        /// The kind that was offered.
        got: ArtifactKind,
        /// The kinds the stage declares as inputs.
        expected: Vec<ArtifactKind>,
    },

    /// The artifact store rejected or could not serve a payload.
    #[error("store error in stage '{stage}': {source}")]
    Store {
        /// The stage name.
        stage: String,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },
}

impl StageFailure {
    /// Returns true if the engine may re-run the stage after this failure.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Adapter { .. })
    }

    /// The stage this failure belongs to.
    #[must_use]
    pub fn stage(&self) -> &str {
        match self {
            Self::Timeout { stage, .. }
            | Self::Adapter { stage, .. }
            | Self::Cancelled { stage, .. }
            | Self::BadInput { stage, .. }
            | Self::Store { stage, .. } => stage,
        }
    }
}
