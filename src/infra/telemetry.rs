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

pub(crate) const METRIC_CACHE_HIT: &str = "querydeck_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "querydeck_cache_miss_total";
pub(crate) const METRIC_CACHE_WRITE_FAILED: &str = "querydeck_cache_write_failed_total";
pub(crate) const METRIC_CACHE_EVICT: &str = "querydeck_cache_evict_total";
pub(crate) const METRIC_FETCH: &str = "querydeck_fetch_total";
pub(crate) const METRIC_FETCH_FAILED: &str = "querydeck_fetch_failed_total";
pub(crate) const METRIC_FETCH_MS: &str = "querydeck_fetch_ms";
pub(crate) const METRIC_STALE_RESULT: &str = "querydeck_stale_result_total";

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
///
/// Logs go to stderr so that stdout stays clean for JSON state output.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
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
            METRIC_CACHE_HIT,
            Unit::Count,
            "Total number of cache hits during query resolution."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Total number of cache lookups that fell through to the network."
        );
        describe_counter!(
            METRIC_CACHE_WRITE_FAILED,
            Unit::Count,
            "Total number of dropped cache writes after a successful fetch."
        );
        describe_counter!(
            METRIC_CACHE_EVICT,
            Unit::Count,
            "Total number of memory cache evictions due to capacity."
        );
        describe_counter!(
            METRIC_FETCH,
            Unit::Count,
            "Total number of network fetches issued by the resource client."
        );
        describe_counter!(
            METRIC_FETCH_FAILED,
            Unit::Count,
            "Total number of network fetches that ended in a transport error."
        );
        describe_counter!(
            METRIC_STALE_RESULT,
            Unit::Count,
            "Total number of query results discarded because a newer run started."
        );
        describe_histogram!(
            METRIC_FETCH_MS,
            Unit::Milliseconds,
            "Network fetch latency in milliseconds."
        );
    });
}
