//! Scripted provider adapters.

use crate::adapter::{BuildSpec, DeployAck, DeployTarget, ProviderAdapter, SourceRef};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Outcome scripted for one build call.
#[derive(Debug, Clone)]
enum BuildOutcome {
    Fail(String),
    Hang,
}

/// Adapter whose behavior is scripted per call.
///
/// Build outcomes are consumed from a queue, one per `run_build` call;
/// an empty queue means success. Every call counts its invocations, and
/// an optional delay can be applied to all calls to keep a run in
/// flight while a test pokes at the engine.
#[derive(Debug, Default)]
pub struct ScriptedAdapter {
    build_script: Mutex<VecDeque<BuildOutcome>>,
    delay: Mutex<Option<Duration>>,
    fetch_calls: AtomicUsize,
    build_calls: AtomicUsize,
    deploy_calls: AtomicUsize,
}

impl ScriptedAdapter {
    /// Creates an adapter that succeeds on every call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next build call to fail with `message`.
    ///
    /// Calls queue up: scripting two failures makes the next two build
    /// calls fail and the third succeed.
    pub fn fail_next_build(&self, message: impl Into<String>) {
        self.build_script
            .lock()
            .push_back(BuildOutcome::Fail(message.into()));
    }

    /// Scripts the next build call to hang until the caller's deadline.
    pub fn hang_next_build(&self) {
        self.build_script.lock().push_back(BuildOutcome::Hang);
    }

    /// Delays every adapter call by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Number of `fetch_source` calls observed.
    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Number of `run_build` calls observed.
    #[must_use]
    pub fn build_calls(&self) -> usize {
        self.build_calls.load(Ordering::SeqCst)
    }

    /// Number of `apply_deployment` calls observed.
    #[must_use]
    pub fn deploy_calls(&self) -> usize {
        self.deploy_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    async fn fetch_source(&self, source: &SourceRef) -> anyhow::Result<Vec<u8>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        Ok(format!("source:{}/{}@{}", source.owner, source.repo, source.branch).into_bytes())
    }

    async fn run_build(&self, payload: &[u8], spec: &BuildSpec) -> anyhow::Result<Vec<u8>> {
        self.build_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        let outcome = self.build_script.lock().pop_front();
        match outcome {
            Some(BuildOutcome::Fail(message)) => Err(anyhow::anyhow!(message)),
            Some(BuildOutcome::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
            None => {
                let mut output = payload.to_vec();
                output.extend_from_slice(b"|built:");
                output.extend_from_slice(spec.commands.join(",").as_bytes());
                Ok(output)
            }
        }
    }

    async fn apply_deployment(
        &self,
        payload: &[u8],
        target: &DeployTarget,
    ) -> anyhow::Result<DeployAck> {
        self.deploy_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        let approval = if target.require_approval {
            " with approval"
        } else {
            ""
        };
        Ok(DeployAck {
            environment: target.environment,
            detail: format!(
                "applied {} bytes to {}{approval}",
                payload.len(),
                target.environment
            ),
        })
    }
}
