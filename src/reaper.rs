//! Background reaper: periodic TTL and size-bound eviction

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::pool::ResourcePool;

/// Handle to the background eviction task of one [`ResourcePool`].
///
/// The task wakes every `cleanup_interval`, runs a TTL pass then an LRU
/// pass, and stops cooperatively on [`Reaper::shutdown`]. It runs on the
/// tokio runtime and never prevents process exit.
pub struct Reaper {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Reaper {
    pub(crate) fn spawn<T>(
        pool: Arc<ResourcePool<T>>,
        cleanup_interval: Duration,
        ttl: Duration,
        max_idle_size: usize,
    ) -> Self
    where
        T: Send + Sync + 'static,
    {
        let (shutdown, mut signal) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately; skip that first tick so a fresh
            // pool is not scanned before anything has gone idle
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let expired = pool.evict_expired(ttl);
                        let trimmed = pool.evict_excess(max_idle_size);
                        if expired > 0 || trimmed > 0 {
                            debug!(expired, trimmed, "reaper pass complete");
                        } else {
                            trace!("reaper pass found nothing to evict");
                        }
                    }
                    _ = signal.changed() => break,
                }
            }
        });
        Self { shutdown, task }
    }

    /// Signal the loop to stop and wait for it, bounded at five seconds.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .is_err()
        {
            debug!("reaper did not stop within the shutdown window");
        }
    }
}
