//! Periodic background resync.

use crate::service::MirrorService;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Spawn the periodic resync loop: one run immediately, then one per
/// interval. Runs never overlap because each iteration awaits the previous
/// one. Abort the returned handle to stop the loop on shutdown.
pub fn spawn_resync_task(service: MirrorService, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            interval_secs = interval.as_secs(),
            "periodic metadata resync enabled"
        );

        loop {
            if let Err(e) = service.resync().await {
                tracing::warn!(error = %e, "periodic resync failed");
            }

            tokio::time::sleep(interval).await;
        }
    })
}
