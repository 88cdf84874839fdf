//! Metrics collection
//!
//! Process-wide Prometheus counters for the connection and dispatch layers.
//! Every repository in the process shares one set.

use crate::core::error::Result;
use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter, IntGauge,
    Registry,
};
use tracing::warn;

/// Global metrics registry
static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static INSTANCE: Lazy<Option<Metrics>> = Lazy::new(|| match Metrics::new(&REGISTRY) {
    Ok(metrics) => Some(metrics),
    Err(e) => {
        warn!("Failed to register metrics: {}", e);
        None
    }
});

/// Connection and dispatch counters
pub struct Metrics {
    /// Frames decoded from the socket
    pub frames_received: IntCounter,
    /// Frames handed to the socket writer
    pub frames_sent: IntCounter,
    /// Malformed or truncated frames
    pub framing_errors: IntCounter,
    /// Messages dropped because a value failed to decode
    pub decode_errors: IntCounter,
    /// Messages dropped because of unknown ids or count mismatches
    pub schema_errors: IntCounter,
    /// Messages with a type no handler recognizes
    pub unknown_messages: IntCounter,
    /// Heartbeats that could not be queued
    pub heartbeat_failures: IntCounter,
    /// Socket writes that failed
    pub send_failures: IntCounter,
    /// Objects currently held across all repositories
    pub live_objects: IntGauge,
}

impl Metrics {
    /// Register a fresh set of metrics with `registry`
    pub fn new(registry: &Registry) -> Result<Self> {
        Ok(Self {
            frames_received: register_int_counter_with_registry!(
                "astron_frames_received_total",
                "Total frames decoded from the connection",
                registry
            )?,
            frames_sent: register_int_counter_with_registry!(
                "astron_frames_sent_total",
                "Total frames queued for sending",
                registry
            )?,
            framing_errors: register_int_counter_with_registry!(
                "astron_framing_errors_total",
                "Total malformed or truncated frames",
                registry
            )?,
            decode_errors: register_int_counter_with_registry!(
                "astron_decode_errors_total",
                "Total messages dropped on value decode errors",
                registry
            )?,
            schema_errors: register_int_counter_with_registry!(
                "astron_schema_errors_total",
                "Total messages dropped on schema errors",
                registry
            )?,
            unknown_messages: register_int_counter_with_registry!(
                "astron_unknown_messages_total",
                "Total messages with an unrecognized type",
                registry
            )?,
            heartbeat_failures: register_int_counter_with_registry!(
                "astron_heartbeat_failures_total",
                "Total heartbeats that could not be sent",
                registry
            )?,
            send_failures: register_int_counter_with_registry!(
                "astron_send_failures_total",
                "Total failed socket writes",
                registry
            )?,
            live_objects: register_int_gauge_with_registry!(
                "astron_live_objects",
                "Distributed objects currently held",
                registry
            )?,
        })
    }

    /// Get the global metrics instance, if registration succeeded
    pub fn global() -> Option<&'static Metrics> {
        INSTANCE.as_ref()
    }
}

/// Run `f` against the global metrics when they are available
pub fn record<F: FnOnce(&Metrics)>(f: F) {
    if let Some(metrics) = Metrics::global() {
        f(metrics);
    }
}

/// Get the global registry
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// Collect and return all metrics as a Prometheus-formatted string
pub fn gather_metrics() -> String {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = registry().gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_metrics_render() {
        record(|m| m.frames_received.inc());
        let text = gather_metrics();
        assert!(text.contains("astron_frames_received_total"));
    }

    #[test]
    fn test_private_registry() {
        let registry = Registry::new();
        let metrics = Metrics::new(&registry).unwrap();
        metrics.unknown_messages.inc_by(3);
        assert_eq!(metrics.unknown_messages.get(), 3);

        // Names are unique per registry
        assert!(Metrics::new(&registry).is_err());
    }
}
