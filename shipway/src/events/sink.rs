//! Event sink trait and implementations.

use crate::core::RunId;
use tracing::info;

/// Receives engine lifecycle events.
///
/// The engine emits `run.started`, `stage.started`, `stage.succeeded`,
/// `stage.failed`, `stage.retrying`, `stage.skipped`, `run.succeeded`,
/// `run.failed` and `run.cancelled`. Sinks must never fail; they swallow
/// their own errors.
pub trait EventSink: Send + Sync {
    /// Records one engine event.
    fn emit(&self, run: RunId, event: &str, data: Option<serde_json::Value>);
}

/// A sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _run: RunId, _event: &str, _data: Option<serde_json::Value>) {
        // Intentionally empty
    }
}

/// A sink that logs events through the tracing framework.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

impl LoggingEventSink {
    /// Creates a new logging sink.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&self, run: RunId, event: &str, data: Option<serde_json::Value>) {
        info!(
            run = %run,
            event = %event,
            data = ?data,
            "engine event"
        );
    }
}

/// A sink that collects events in memory, for tests and dashboards.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<(RunId, String, Option<serde_json::Value>)>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<(RunId, String, Option<serde_json::Value>)> {
        self.events.read().clone()
    }

    /// Returns the names of collected events, in emission order.
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        self.events.read().iter().map(|(_, name, _)| name.clone()).collect()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, run: RunId, event: &str, data: Option<serde_json::Value>) {
        self.events.write().push((run, event.to_string(), data));
    }
}
