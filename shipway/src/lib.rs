//! # Shipway
//!
//! A small deployment-pipeline execution engine: source → build →
//! deploy, with immutable artifact hand-off between stages.
//!
//! Shipway owns the orchestration concerns a managed delivery service
//! would otherwise provide:
//!
//! - **Stage sequencing**: stages run as soon as their dependencies
//!   succeed; independent stages run concurrently
//! - **Single-flight execution**: at most one active run per pipeline
//! - **Artifact hand-off**: content-addressed, immutable artifacts
//!   flow between stages through a pluggable store
//! - **Retries and timeouts**: per-stage policies for transient
//!   provider failures
//! - **Cooperative cancellation**: cancelled stages abort without
//!   leaving partial artifacts visible
//!
//! All concrete infrastructure work happens behind the
//! [`ProviderAdapter`](adapter::ProviderAdapter) boundary.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shipway::prelude::*;
//! use std::sync::Arc;
//!
//! let config = presets::source_build_deploy(Environment::Dev, "acme", "platform", "main");
//! let engine = PipelineEngine::new(vec![config], adapter, store)?;
//!
//! let run = engine.start("dev-delivery")?;
//! let snapshot = engine.wait(run).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod adapter;
pub mod cancellation;
pub mod config;
pub mod core;
pub mod engine;
pub mod errors;
pub mod events;
pub mod executor;
pub mod observability;
pub mod store;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adapter::{BuildSpec, DeployAck, DeployTarget, ProviderAdapter, SourceRef};
    pub use crate::cancellation::CancelToken;
    pub use crate::config::{presets, Environment, PipelineConfig, StageAction, StageConfig};
    pub use crate::core::{
        ArtifactKind, ArtifactRef, ExecutionStatus, RunId, StageFailure, StageStatus,
    };
    pub use crate::engine::{
        Backoff, ExecutionSnapshot, PipelineEngine, RetryPolicy, StageRecord,
    };
    pub use crate::errors::{ConfigError, EngineError, StoreError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::executor::StageExecutor;
    pub use crate::store::{ArtifactStore, FsArtifactStore, MemoryArtifactStore};
}
