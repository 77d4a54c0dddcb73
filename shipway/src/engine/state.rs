//! Per-run execution state and snapshots.

use crate::config::PipelineConfig;
use crate::core::{ArtifactRef, ExecutionStatus, RunId, StageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record of one stage within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// The stage name.
    pub name: String,
    /// Current status.
    pub status: StageStatus,
    /// Attempts made so far (0 until the stage first runs).
    pub attempts: u32,
    /// When the stage first started running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the stage reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// The most recent failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// The artifact the stage produced, if it succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRef>,
}

impl StageRecord {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Pending,
            attempts: 0,
            started_at: None,
            finished_at: None,
            last_error: None,
            artifact: None,
        }
    }
}

/// Queryable view of one execution.
///
/// Snapshots are plain values; they stay meaningful after the run ends
/// and serialize cleanly for a CLI or dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    /// The run id.
    pub run: RunId,
    /// The pipeline this run executes.
    pub pipeline: String,
    /// Overall status.
    pub status: ExecutionStatus,
    /// Per-stage records, in pipeline declaration order.
    pub stages: Vec<StageRecord>,
    /// Why the run was cancelled, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
}

impl ExecutionSnapshot {
    /// Looks up a stage record by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.name == name)
    }
}

/// Mutable state behind the engine's run table.
#[derive(Debug)]
pub(crate) struct ExecutionState {
    pub(crate) run: RunId,
    pub(crate) pipeline: String,
    pub(crate) status: ExecutionStatus,
    pub(crate) records: Vec<StageRecord>,
    pub(crate) cancel_reason: Option<String>,
}

impl ExecutionState {
    pub(crate) fn new(run: RunId, config: &PipelineConfig) -> Self {
        Self {
            run,
            pipeline: config.name.clone(),
            status: ExecutionStatus::Pending,
            records: config
                .stages
                .iter()
                .map(|s| StageRecord::new(&s.name))
                .collect(),
            cancel_reason: None,
        }
    }

    /// Mutable record for `name`. Stage names are validated at load, so
    /// a miss here is a programming error; callers pass known names.
    pub(crate) fn record_mut(&mut self, name: &str) -> Option<&mut StageRecord> {
        self.records.iter_mut().find(|r| r.name == name)
    }

    pub(crate) fn snapshot(&self) -> ExecutionSnapshot {
        ExecutionSnapshot {
            run: self.run,
            pipeline: self.pipeline.clone(),
            status: self.status,
            stages: self.records.clone(),
            cancel_reason: self.cancel_reason.clone(),
        }
    }
}
