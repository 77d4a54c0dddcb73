//! Run identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic identifier for one pipeline execution.
///
/// Run ids are allocated by the engine from a process-local counter, so
/// later runs always compare greater than earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}
