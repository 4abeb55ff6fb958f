use std::{sync::Arc, time::Duration};

use metrics::counter;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{info, warn};

use crate::util::bytes::format_budget_usage;

use super::store::DiskCache;

const METRIC_CACHE_EVICT: &str = "docmirror_cache_evict_total";
const METRIC_CACHE_EXPIRED: &str = "docmirror_cache_expired_total";

/// Run [`DiskCache::sweep`] every `interval` in the background.
pub fn spawn_sweeper(store: Arc<DiskCache>, interval: Duration, max_bytes: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match store.sweep(max_bytes).await {
                Ok(report) => {
                    counter!(METRIC_CACHE_EVICT).increment(report.evicted as u64);
                    counter!(METRIC_CACHE_EXPIRED).increment(report.expired as u64);
                    info!(
                        target = "docmirror::cache",
                        expired = report.expired,
                        corrupt = report.corrupt,
                        evicted = report.evicted,
                        failed = report.failed,
                        entries = report.remaining_entries,
                        usage = %format_budget_usage(report.remaining_bytes, max_bytes),
                        "cache sweep finished"
                    );
                }
                Err(err) => {
                    warn!(target = "docmirror::cache", error = %err, "cache sweep failed");
                }
            }
        }
    })
}
