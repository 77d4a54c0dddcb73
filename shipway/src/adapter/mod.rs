//! The provider boundary.
//!
//! Everything that touches real infrastructure — version control, build
//! runners, deployment targets — sits behind [`ProviderAdapter`]. The
//! engine never assumes a concrete provider; credentials and endpoints
//! are the implementation's own construction-time configuration, never
//! ambient globals.

use crate::config::Environment;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference to a source revision the provider should fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Branch to fetch.
    pub branch: String,
}

/// Build instructions handed to the provider alongside the input payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Commands executed in order.
    pub commands: Vec<String>,
    /// Variables exported to the build.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Where and how a deployment is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployTarget {
    /// The environment to deploy into.
    pub environment: Environment,
    /// Whether the provider must obtain approval before applying.
    pub require_approval: bool,
}

/// Acknowledgement returned by a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployAck {
    /// The environment that was deployed.
    pub environment: Environment,
    /// Free-form provider detail (revision, endpoint, ...).
    pub detail: String,
}

/// Boundary over concrete cloud/VCS operations.
///
/// Implementations must be safe to re-invoke: the engine retries failed
/// calls according to each stage's retry policy.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Fetches the given source revision and returns its payload.
    async fn fetch_source(&self, source: &SourceRef) -> anyhow::Result<Vec<u8>>;

    /// Runs a build over `payload` and returns the build output.
    async fn run_build(&self, payload: &[u8], spec: &BuildSpec) -> anyhow::Result<Vec<u8>>;

    /// Applies `payload` to the target and returns an acknowledgement.
    async fn apply_deployment(
        &self,
        payload: &[u8],
        target: &DeployTarget,
    ) -> anyhow::Result<DeployAck>;
}
