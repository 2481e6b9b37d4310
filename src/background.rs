//! Background sweep of abandoned chunk buffers.

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::PENDING_SWEEP_INTERVAL_SECS;
use crate::pending::PendingStore;
use crate::upload::UploadConfig;

/// Spawns the retention sweep. Abandoned uploads never finalize on their own;
/// this task is the only path that reclaims their buffers.
pub fn spawn_background_tasks(pending: Arc<PendingStore>, config: Arc<UploadConfig>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(PENDING_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            if let Err(err) = pending.sweep_stale(config.pending_ttl).await {
                warn!(error = %err, "chunk buffer sweep failed");
            }
        }
    });
}
