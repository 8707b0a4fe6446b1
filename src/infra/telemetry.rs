use std::sync::Once;

use metrics::{Unit, describe_counter};
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

    // stdout carries command output; logs go to stderr
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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "postdesk_cache_hit_total",
            Unit::Count,
            "Reads served from the query cache without fetching."
        );
        describe_counter!(
            "postdesk_cache_miss_total",
            Unit::Count,
            "Reads that found no fresh data for their key."
        );
        describe_counter!(
            "postdesk_cache_fetch_total",
            Unit::Count,
            "Fetches started against the remote API."
        );
        describe_counter!(
            "postdesk_cache_dedup_total",
            Unit::Count,
            "Requests that joined an in-flight fetch instead of starting one."
        );
        describe_counter!(
            "postdesk_cache_rollback_total",
            Unit::Count,
            "Optimistic writes rolled back after the server rejected them."
        );
        describe_counter!(
            "postdesk_cache_invalidate_total",
            Unit::Count,
            "Cache entries marked stale by invalidation."
        );
    });
}
