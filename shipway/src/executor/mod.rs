//! Single-stage execution.
//!
//! The executor runs one attempt of one stage: it checks input kinds,
//! fetches input payloads, dispatches the stage action to the provider
//! adapter under the stage deadline, and publishes the produced artifact.
//! Cancellation is checked before the provider call and again before
//! publication, so a cancelled stage never leaves an artifact visible.

use crate::adapter::{BuildSpec, DeployTarget, ProviderAdapter, SourceRef};
use crate::cancellation::CancelToken;
use crate::config::{StageAction, StageConfig};
use crate::core::{ArtifactRef, RunId, StageFailure};
use crate::store::ArtifactStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Runs one stage attempt against the provider adapter.
pub struct StageExecutor {
    adapter: Arc<dyn ProviderAdapter>,
    store: Arc<dyn ArtifactStore>,
}

impl StageExecutor {
    /// Creates an executor over the given adapter and store.
    #[must_use]
    pub fn new(adapter: Arc<dyn ProviderAdapter>, store: Arc<dyn ArtifactStore>) -> Self {
        Self { adapter, store }
    }

    /// Runs one attempt of `stage` and publishes its artifact on success.
    ///
    /// # Errors
    ///
    /// Returns a [`StageFailure`] describing why no artifact was
    /// produced. Only `Timeout` and `Adapter` failures are retryable.
    pub async fn run(
        &self,
        run: RunId,
        stage: &StageConfig,
        inputs: &[ArtifactRef],
        cancel: &CancelToken,
    ) -> Result<ArtifactRef, StageFailure> {
        for input in inputs {
            if !stage.inputs.contains(&input.kind) {
                return Err(StageFailure::BadInput {
                    stage: stage.name.clone(),
                    got: input.kind,
                    expected: stage.inputs.clone(),
                });
            }
        }

        if cancel.is_cancelled() {
            return Err(self.cancelled(stage, cancel));
        }

        let mut payloads = Vec::with_capacity(inputs.len());
        for input in inputs {
            let payload = self
                .store
                .get(input)
                .await
                .map_err(|source| StageFailure::Store {
                    stage: stage.name.clone(),
                    source,
                })?;
            payloads.push(payload);
        }

        let deadline = Duration::from_millis(stage.timeout_ms);
        let produced = match tokio::time::timeout(deadline, self.dispatch(stage, &payloads)).await
        {
            Err(_) => {
                return Err(StageFailure::Timeout {
                    stage: stage.name.clone(),
                    timeout_ms: stage.timeout_ms,
                })
            }
            Ok(Err(cause)) => {
                return Err(StageFailure::Adapter {
                    stage: stage.name.clone(),
                    cause,
                })
            }
            Ok(Ok(payload)) => payload,
        };

        // A stage that was cancelled mid-call must not publish.
        if cancel.is_cancelled() {
            self.store.discard(run, &stage.name).await;
            return Err(self.cancelled(stage, cancel));
        }

        let artifact = self
            .store
            .put(run, &stage.name, stage.output, &produced)
            .await
            .map_err(|source| StageFailure::Store {
                stage: stage.name.clone(),
                source,
            })?;

        debug!(run = %run, stage = %stage.name, artifact = %artifact, "stage published artifact");
        Ok(artifact)
    }

    fn cancelled(&self, stage: &StageConfig, cancel: &CancelToken) -> StageFailure {
        StageFailure::Cancelled {
            stage: stage.name.clone(),
            reason: cancel
                .reason()
                .unwrap_or_else(|| "cancelled".to_string()),
        }
    }

    async fn dispatch(
        &self,
        stage: &StageConfig,
        payloads: &[Vec<u8>],
    ) -> anyhow::Result<Vec<u8>> {
        let input = payloads.first().map_or(&[][..], Vec::as_slice);

        match &stage.action {
            StageAction::FetchSource {
                owner,
                repo,
                branch,
            } => {
                let source = SourceRef {
                    owner: owner.clone(),
                    repo: repo.clone(),
                    branch: branch.clone(),
                };
                self.adapter.fetch_source(&source).await
            }
            StageAction::RunBuild { commands, env } => {
                let spec = BuildSpec {
                    commands: commands.clone(),
                    env: env.clone(),
                };
                self.adapter.run_build(input, &spec).await
            }
            StageAction::ApplyDeployment {
                target,
                require_approval,
            } => {
                let target = DeployTarget {
                    environment: *target,
                    require_approval: *require_approval,
                };
                let ack = self.adapter.apply_deployment(input, &target).await?;
                serde_json::to_vec(&ack).map_err(Into::into)
            }
        }
    }
}
