//! Test doubles for the provider boundary.
//!
//! These adapters are used by the crate's own tests and are exported so
//! downstream crates can drive the engine without real infrastructure.

mod adapters;

pub use adapters::ScriptedAdapter;
