use std::{sync::Arc, time::Duration};

use {
    switchboard_sessions::SessionRegistry,
    tokio::{task::JoinHandle, time::MissedTickBehavior},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info},
};

/// Periodically drop sender aggregators that have been idle for `idle_for`.
///
/// Returns `None` when `every` is zero. The task ends when `cancel` fires.
pub fn spawn_sweeper(
    registry: Arc<SessionRegistry>,
    every: Duration,
    idle_for: Duration,
    cancel: CancellationToken,
) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        info!("idle aggregator sweeper disabled");
        return None;
    }
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let reclaimed = registry.reclaim_idle(idle_for);
                    if reclaimed > 0 {
                        info!(reclaimed, "reclaimed idle sender aggregators");
                    }
                },
            }
        }
        debug!("idle aggregator sweeper stopped");
    }))
}
