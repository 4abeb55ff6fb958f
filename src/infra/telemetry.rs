use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| InfraError::telemetry(err.to_string()))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "docmirror_cache_hit_total",
            Unit::Count,
            "Responses replayed from the disk cache."
        );
        describe_counter!(
            "docmirror_cache_miss_total",
            Unit::Count,
            "Cacheable requests that reached the handler."
        );
        describe_counter!(
            "docmirror_cache_store_total",
            Unit::Count,
            "Responses written to the disk cache."
        );
        describe_counter!(
            "docmirror_cache_bypass_total",
            Unit::Count,
            "Requests that skipped the cache because of policy."
        );
        describe_counter!(
            "docmirror_cache_evict_total",
            Unit::Count,
            "Cache entries evicted to stay within the size budget."
        );
        describe_counter!(
            "docmirror_cache_expired_total",
            Unit::Count,
            "Expired cache entries removed by the sweeper."
        );
        describe_counter!(
            "docmirror_sync_cycles_total",
            Unit::Count,
            "Completed sync cycles, labelled by result."
        );
        describe_counter!(
            "docmirror_sync_uploads_total",
            Unit::Count,
            "Files uploaded by sync cycles."
        );
        describe_counter!(
            "docmirror_sync_upload_failures_total",
            Unit::Count,
            "Failed upload attempts, including retried ones."
        );
        describe_counter!(
            "docmirror_sync_deletes_total",
            Unit::Count,
            "Orphaned objects deleted by sync cycles."
        );
        describe_histogram!(
            "docmirror_sync_cycle_ms",
            Unit::Milliseconds,
            "Duration of a sync cycle in milliseconds."
        );
    });
}
