//! Error types for the shipway engine.
//!
//! `ConfigError` is the only fatal condition: an invalid pipeline
//! definition is rejected at load and the engine refuses to construct.
//! Everything else is recoverable and surfaces through the control
//! surface or the execution snapshot.

use crate::core::RunId;
use thiserror::Error;

/// Error raised when a pipeline definition fails validation at load.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConfigError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error, if any.
    pub stages: Vec<String>,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }
}

/// Errors surfaced by artifact stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An artifact for this slot was already consumed and cannot be replaced.
    #[error("artifact for {run} stage '{stage}' was already consumed")]
    Conflict {
        /// The run the artifact belongs to.
        run: RunId,
        /// The producing stage.
        stage: String,
    },

    /// No artifact matches the given reference.
    #[error("artifact not found: {0}")]
    NotFound(String),

    /// The backing storage failed.
    #[error("artifact store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned from the engine's control surface.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The pipeline already has an active execution.
    #[error("pipeline '{0}' already has an active execution")]
    AlreadyRunning(String),

    /// No pipeline or run matches the given name or id.
    #[error("unknown pipeline or run: {0}")]
    NotFound(String),

    /// The run has not reached a terminal state yet.
    #[error("{0} is still executing")]
    StillRunning(RunId),

    /// The configuration set was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
