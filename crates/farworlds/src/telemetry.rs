//! Logging bootstrap for binaries (tracing + env filter).

use farworlds_core::{EcsError, EcsResult};
use tracing_subscriber::EnvFilter;

/// Installs a global `fmt` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` is used, falling back
/// to `info` if it does not parse.
///
/// # Errors
///
/// Returns [`EcsError::InvalidConfig`] if a global subscriber is already set.
pub fn init_telemetry(default_filter: &str) -> EcsResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| EcsError::InvalidConfig(format!("logging: {e}")))?;

    tracing::info!(target: "telemetry", default_filter, "telemetry initialized");
    Ok(())
}
