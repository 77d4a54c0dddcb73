//! Tracing setup for engine consumers.
//!
//! The library itself only emits through `tracing`; binaries call
//! [`init_logging`] once at startup to install a subscriber.

use tracing_subscriber::EnvFilter;

/// Installs a global tracing subscriber.
///
/// The filter honors `RUST_LOG` and defaults to `info`. With `json` set,
/// events are emitted as structured JSON lines.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("{e}"))?;
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| anyhow::anyhow!("{e}"))?;
    }

    Ok(())
}
