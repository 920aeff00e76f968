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
        .with_default_directive(logging.level_filter().into())
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
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "ombra_cache_hit_total",
            Unit::Count,
            "Total number of lookups served from the cache."
        );
        describe_counter!(
            "ombra_cache_miss_total",
            Unit::Count,
            "Total number of lookups that found no live entry."
        );
        describe_counter!(
            "ombra_cache_store_total",
            Unit::Count,
            "Total number of entries written through the facade."
        );
        describe_counter!(
            "ombra_cache_bypass_total",
            Unit::Count,
            "Total number of operations skipped for non-cacheable categories."
        );
        describe_counter!(
            "ombra_cache_invalidate_total",
            Unit::Count,
            "Total number of entries removed by explicit invalidation."
        );
        describe_counter!(
            "ombra_identity_fallback_total",
            Unit::Count,
            "Total number of credentials resolved via the hash fallback."
        );
        describe_counter!(
            "ombra_sweep_removed_total",
            Unit::Count,
            "Total number of expired entries removed by the sweeper."
        );
        describe_histogram!(
            "ombra_sweep_ms",
            Unit::Milliseconds,
            "Eviction sweep latency in milliseconds."
        );
    });
}
