//! The pipeline engine.
//!
//! Sequences stages, enforces single-flight execution per pipeline,
//! retries transient failures, and exposes the status surface. Stages
//! that share no dependency edge run concurrently as spawned tasks;
//! stages with an edge are strictly ordered. Status queries read a
//! short-lived lock and are never blocked by a running stage.

mod retry;
mod state;

#[cfg(test)]
mod engine_tests;

pub use retry::{Backoff, RetryPolicy};
pub use state::{ExecutionSnapshot, StageRecord};

use crate::adapter::ProviderAdapter;
use crate::cancellation::CancelToken;
use crate::config::{PipelineConfig, StageConfig};
use crate::core::{ArtifactRef, ExecutionStatus, RunId, StageFailure, StageStatus};
use crate::errors::{ConfigError, EngineError};
use crate::events::{EventSink, NoOpEventSink};
use crate::executor::StageExecutor;
use crate::store::ArtifactStore;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::RwLock;
use state::ExecutionState;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Shared pieces of one run, kept in the engine's run table.
#[derive(Clone)]
struct RunHandle {
    state: Arc<RwLock<ExecutionState>>,
    cancel: Arc<CancelToken>,
    done: watch::Receiver<bool>,
}

/// Drives executions of a fixed set of validated pipeline definitions.
///
/// The engine owns each execution for its whole lifetime: it allocates
/// the run id, holds the single-flight lock until the run is terminal,
/// and keeps terminal runs queryable until [`clear`](Self::clear).
pub struct PipelineEngine {
    pipelines: HashMap<String, Arc<PipelineConfig>>,
    executor: Arc<StageExecutor>,
    sink: Arc<dyn EventSink>,
    runs: Arc<DashMap<RunId, RunHandle>>,
    active: Arc<DashMap<String, RunId>>,
    next_run: AtomicU64,
}

impl PipelineEngine {
    /// Creates an engine over the given definitions, adapter and store.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if any definition is invalid or two
    /// definitions share a name. An engine is never constructed over a
    /// bad configuration.
    pub fn new(
        configs: Vec<PipelineConfig>,
        adapter: Arc<dyn ProviderAdapter>,
        store: Arc<dyn ArtifactStore>,
    ) -> Result<Self, ConfigError> {
        let mut pipelines = HashMap::new();
        for config in configs {
            config.validate()?;
            if pipelines.contains_key(&config.name) {
                return Err(ConfigError::new(format!(
                    "duplicate pipeline name '{}'",
                    config.name
                )));
            }
            pipelines.insert(config.name.clone(), Arc::new(config));
        }

        Ok(Self {
            pipelines,
            executor: Arc::new(StageExecutor::new(adapter, store)),
            sink: Arc::new(NoOpEventSink),
            runs: Arc::new(DashMap::new()),
            active: Arc::new(DashMap::new()),
            next_run: AtomicU64::new(1),
        })
    }

    /// Replaces the default no-op event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Starts an execution of `pipeline` and returns its run id.
    ///
    /// The run is driven by a spawned task; this call returns as soon as
    /// the execution is registered.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` for an unknown pipeline name, or
    /// `EngineError::AlreadyRunning` while an execution for the same
    /// name is active.
    pub fn start(&self, pipeline: &str) -> Result<RunId, EngineError> {
        let config = self
            .pipelines
            .get(pipeline)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(pipeline.to_string()))?;

        let run = RunId(self.next_run.fetch_add(1, Ordering::SeqCst));

        match self.active.entry(config.name.clone()) {
            Entry::Occupied(_) => {
                return Err(EngineError::AlreadyRunning(config.name.clone()));
            }
            Entry::Vacant(slot) => {
                slot.insert(run);
            }
        }

        let (done_tx, done_rx) = watch::channel(false);
        let handle = RunHandle {
            state: Arc::new(RwLock::new(ExecutionState::new(run, &config))),
            cancel: Arc::new(CancelToken::new()),
            done: done_rx,
        };
        self.runs.insert(run, handle.clone());

        self.sink.emit(
            run,
            "run.started",
            Some(serde_json::json!({"pipeline": &config.name})),
        );
        info!(run = %run, pipeline = %config.name, "execution started");

        let driver = Driver {
            run,
            config,
            executor: self.executor.clone(),
            sink: self.sink.clone(),
            state: handle.state,
            cancel: handle.cancel,
            active: self.active.clone(),
        };
        tokio::spawn(async move {
            driver.drive().await;
            let _ = done_tx.send(true);
        });

        Ok(run)
    }

    /// Returns the current snapshot of a run.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` for an unknown or cleared run.
    pub fn status(&self, run: RunId) -> Result<ExecutionSnapshot, EngineError> {
        self.runs
            .get(&run)
            .map(|handle| handle.state.read().snapshot())
            .ok_or_else(|| EngineError::NotFound(run.to_string()))
    }

    /// Requests cooperative cancellation of a run. Idempotent.
    ///
    /// In-flight stages observe the signal at their next safe point and
    /// abort without publishing; unstarted stages are skipped.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` for an unknown or cleared run.
    pub fn cancel(&self, run: RunId) -> Result<(), EngineError> {
        let handle = self
            .runs
            .get(&run)
            .ok_or_else(|| EngineError::NotFound(run.to_string()))?;
        handle.cancel.cancel("cancelled by caller");
        Ok(())
    }

    /// Waits until a run reaches a terminal state and returns its snapshot.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` for an unknown or cleared run.
    pub async fn wait(&self, run: RunId) -> Result<ExecutionSnapshot, EngineError> {
        let mut done = self
            .runs
            .get(&run)
            .map(|handle| handle.done.clone())
            .ok_or_else(|| EngineError::NotFound(run.to_string()))?;

        while !*done.borrow() {
            if done.changed().await.is_err() {
                // driver finished and dropped its sender
                break;
            }
        }

        self.status(run)
    }

    /// Removes a terminal run from the queryable set.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotFound` for an unknown run, or
    /// `EngineError::StillRunning` if the run has not terminated.
    pub fn clear(&self, run: RunId) -> Result<(), EngineError> {
        {
            let handle = self
                .runs
                .get(&run)
                .ok_or_else(|| EngineError::NotFound(run.to_string()))?;
            if !handle.state.read().status.is_terminal() {
                return Err(EngineError::StillRunning(run));
            }
        }
        self.runs.remove(&run);
        Ok(())
    }

    /// Names of the pipelines this engine can execute.
    #[must_use]
    pub fn pipeline_names(&self) -> Vec<String> {
        self.pipelines.keys().cloned().collect()
    }
}

type StageResult = (String, Result<ArtifactRef, StageFailure>);

/// Owns one execution from start to terminal state.
struct Driver {
    run: RunId,
    config: Arc<PipelineConfig>,
    executor: Arc<StageExecutor>,
    sink: Arc<dyn EventSink>,
    state: Arc<RwLock<ExecutionState>>,
    cancel: Arc<CancelToken>,
    active: Arc<DashMap<String, RunId>>,
}

impl Driver {
    async fn drive(self) {
        self.state.write().status = ExecutionStatus::Running;

        let mut in_degree: HashMap<String, usize> = self
            .config
            .stages
            .iter()
            .map(|s| (s.name.clone(), s.depends_on.len()))
            .collect();
        let mut produced: HashMap<String, ArtifactRef> = HashMap::new();
        let mut started: HashSet<String> = HashSet::new();
        let mut failed = false;
        let mut tasks: FuturesUnordered<tokio::task::JoinHandle<StageResult>> =
            FuturesUnordered::new();

        for stage in self.config.stages.iter().filter(|s| s.depends_on.is_empty()) {
            started.insert(stage.name.clone());
            tasks.push(self.spawn_stage(stage.clone(), Vec::new()));
        }

        while let Some(joined) = tasks.next().await {
            match joined {
                Ok((name, Ok(artifact))) => {
                    self.record_success(&name, &artifact);
                    produced.insert(name.clone(), artifact);

                    if failed || self.cancel.is_cancelled() {
                        continue;
                    }

                    for child in &self.config.stages {
                        if !child.depends_on.iter().any(|d| d == &name) {
                            continue;
                        }
                        let Some(count) = in_degree.get_mut(&child.name) else {
                            continue;
                        };
                        *count = count.saturating_sub(1);
                        if *count == 0 && !started.contains(&child.name) {
                            started.insert(child.name.clone());
                            let inputs: Vec<ArtifactRef> = child
                                .depends_on
                                .iter()
                                .filter_map(|d| produced.get(d))
                                .filter(|a| child.inputs.contains(&a.kind))
                                .cloned()
                                .collect();
                            tasks.push(self.spawn_stage(child.clone(), inputs));
                        }
                    }
                }
                Ok((name, Err(failure))) => {
                    self.record_failure(&name, &failure);
                    failed = true;
                }
                Err(join_error) => {
                    error!(run = %self.run, error = %join_error, "stage task aborted");
                    failed = true;
                }
            }
        }

        self.finish();
    }

    fn spawn_stage(
        &self,
        stage: StageConfig,
        inputs: Vec<ArtifactRef>,
    ) -> tokio::task::JoinHandle<StageResult> {
        let run = self.run;
        let executor = self.executor.clone();
        let state = self.state.clone();
        let cancel = self.cancel.clone();
        let sink = self.sink.clone();

        tokio::spawn(async move {
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                {
                    let mut state = state.write();
                    if let Some(rec) = state.record_mut(&stage.name) {
                        rec.status = StageStatus::Running;
                        rec.attempts = attempt;
                        if rec.started_at.is_none() {
                            rec.started_at = Some(Utc::now());
                        }
                    }
                }
                if attempt == 1 {
                    sink.emit(
                        run,
                        "stage.started",
                        Some(serde_json::json!({"stage": &stage.name})),
                    );
                }

                match executor.run(run, &stage, &inputs, &cancel).await {
                    Ok(artifact) => return (stage.name.clone(), Ok(artifact)),
                    Err(failure) => {
                        let retry = failure.is_retryable()
                            && attempt < stage.retry.max_attempts
                            && !cancel.is_cancelled();
                        if !retry {
                            return (stage.name.clone(), Err(failure));
                        }

                        let delay = stage.retry.delay_for(attempt);
                        debug!(
                            run = %run,
                            stage = %stage.name,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %failure,
                            "retrying stage"
                        );
                        sink.emit(
                            run,
                            "stage.retrying",
                            Some(serde_json::json!({
                                "stage": &stage.name,
                                "attempt": attempt,
                                "delay_ms": delay.as_millis() as u64,
                            })),
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        })
    }

    fn record_success(&self, name: &str, artifact: &ArtifactRef) {
        {
            let mut state = self.state.write();
            if let Some(rec) = state.record_mut(name) {
                rec.status = StageStatus::Succeeded;
                rec.finished_at = Some(Utc::now());
                rec.artifact = Some(artifact.clone());
            }
        }
        self.sink.emit(
            self.run,
            "stage.succeeded",
            Some(serde_json::json!({"stage": name})),
        );
    }

    fn record_failure(&self, name: &str, failure: &StageFailure) {
        let cancelled = matches!(failure, StageFailure::Cancelled { .. });
        {
            let mut state = self.state.write();
            if let Some(rec) = state.record_mut(name) {
                rec.status = if cancelled {
                    StageStatus::Cancelled
                } else {
                    StageStatus::Failed
                };
                rec.finished_at = Some(Utc::now());
                rec.last_error = Some(failure.to_string());
            }
        }
        self.sink.emit(
            self.run,
            "stage.failed",
            Some(serde_json::json!({"stage": name, "error": failure.to_string()})),
        );
        warn!(run = %self.run, stage = %name, error = %failure, "stage failed");
    }

    fn finish(&self) {
        let cancelled = self.cancel.is_cancelled();
        let (status, skipped) = {
            let mut state = self.state.write();
            let now = Utc::now();
            let mut skipped = Vec::new();
            for rec in &mut state.records {
                match rec.status {
                    StageStatus::Pending => {
                        rec.status = StageStatus::Skipped;
                        skipped.push(rec.name.clone());
                    }
                    StageStatus::Running => {
                        rec.status = StageStatus::Failed;
                        rec.last_error = Some("stage task aborted".to_string());
                        rec.finished_at = Some(now);
                    }
                    _ => {}
                }
            }
            let all_ok = state
                .records
                .iter()
                .all(|r| r.status == StageStatus::Succeeded);
            state.status = if all_ok {
                ExecutionStatus::Succeeded
            } else {
                ExecutionStatus::Failed
            };
            state.cancel_reason = self.cancel.reason();
            (state.status, skipped)
        };

        for name in skipped {
            self.sink.emit(
                self.run,
                "stage.skipped",
                Some(serde_json::json!({"stage": &name})),
            );
        }

        let event = if cancelled {
            "run.cancelled"
        } else if status == ExecutionStatus::Succeeded {
            "run.succeeded"
        } else {
            "run.failed"
        };
        self.sink.emit(
            self.run,
            event,
            Some(serde_json::json!({"pipeline": &self.config.name})),
        );
        info!(run = %self.run, pipeline = %self.config.name, status = %status, "execution finished");

        // releasing the single-flight lock is the last state change
        self.active.remove(&self.config.name);
    }
}
