//! Core domain model types for shipway.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Run identifiers
//! - Stage and execution status enums
//! - Artifact references and kinds
//! - The stage failure taxonomy

mod artifact;
mod failure;
mod run;
mod status;

pub use artifact::{ArtifactKind, ArtifactRef};
pub use failure::StageFailure;
pub use run::RunId;
pub use status::{ExecutionStatus, StageStatus};
