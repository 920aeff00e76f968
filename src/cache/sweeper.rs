//! Background eviction sweep.
//!
//! Reads treat expired rows as absent (lazy expiry); the sweeper is what
//! physically reclaims them so the store file does not grow without
//! bound. Running without it is a supported configuration.

use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::infra::db::SqliteStore;
use crate::util::time::now_millis;

const METRIC_SWEEP_REMOVED_TOTAL: &str = "ombra_sweep_removed_total";
const METRIC_SWEEP_MS: &str = "ombra_sweep_ms";

/// Periodic task deleting expired rows. `Stopped -> Running` on spawn,
/// `Running -> Stopped` on [`EvictionSweeper::shutdown`].
pub struct EvictionSweeper {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl EvictionSweeper {
    /// Start the sweep loop. The first tick fires one full interval after
    /// spawn, not immediately.
    pub fn spawn(store: SqliteStore, interval: Duration) -> Self {
        let (shutdown, mut signal) = watch::channel(false);

        let handle = tokio::spawn(async move {
            debug!(interval_secs = interval.as_secs_f64(), "eviction sweeper started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    _ = ticker.tick() => sweep_once(&store).await,
                    _ = signal.changed() => break,
                }
            }
            debug!("eviction sweeper stopped");
        });

        Self { handle, shutdown }
    }

    /// Signal the loop and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

/// One sweep pass. A failing pass is logged and absorbed; the next
/// scheduled pass still runs.
async fn sweep_once(store: &SqliteStore) {
    let started_at = Instant::now();

    match store.delete_all_expired(now_millis()).await {
        Ok(0) => debug!("sweep found no expired entries"),
        Ok(removed) => {
            counter!(METRIC_SWEEP_REMOVED_TOTAL).increment(removed);
            info!(removed, "sweep removed expired entries");
        }
        Err(error) => {
            warn!(error = %error, "sweep pass failed; retrying at next interval");
        }
    }

    histogram!(METRIC_SWEEP_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
}
