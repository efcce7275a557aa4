//! Expiry Sweep Task
//!
//! Background task that periodically removes expired entries from a backend's
//! storage. Reads already filter expired entries, so a failed or late sweep
//! only delays physical cleanup.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Storage that can physically purge its expired entries.
#[async_trait]
pub trait Sweep: Send + Sync + 'static {
    /// Backend name used in log lines.
    fn name(&self) -> &'static str;

    /// Removes expired entries, returning how many were removed.
    async fn sweep_expired(&self) -> Result<usize>;
}

/// Spawns a background task that periodically sweeps expired entries.
///
/// The task runs until aborted, sleeping for the interval between runs.
/// Sweep failures are logged and swallowed.
///
/// # Returns
/// A JoinHandle for the spawned task, which the owning backend aborts on
/// disconnect or drop.
///
/// # Example
/// ```ignore
/// let handle = spawn_sweep_task(Arc::new(sweeper), 60);
/// // Later, during disconnect:
/// handle.abort();
/// ```
pub fn spawn_sweep_task<S: Sweep>(target: Arc<S>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting {} expiry sweep with interval of {} seconds",
            target.name(),
            interval_secs
        );

        loop {
            // Sleep for the configured interval
            tokio::time::sleep(interval).await;

            match target.sweep_expired().await {
                Ok(0) => debug!("{} sweep: no expired entries found", target.name()),
                Ok(removed) => info!("{} sweep: removed {} expired entries", target.name(), removed),
                Err(err) => warn!("{} sweep failed: {}", target.name(), err),
            }
        }
    })
}
