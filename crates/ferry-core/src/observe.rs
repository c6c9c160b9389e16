//! Optional metrics instrumentation for ferry.
//!
//! When the `observe` feature is enabled, the message store emits counters
//! and histograms via the [`metrics`] crate. A downstream application must
//! install a metrics recorder (e.g. `metrics-exporter-prometheus`) to collect
//! the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record a message reference appended to an endpoint log.
///
/// - `ferry.messages.added_total` – counter
/// - `ferry.messages.deduplicated_total` – counter, body already stored
#[inline]
pub fn record_message_added(deduplicated: bool) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("ferry.messages.added_total").increment(1);
        if deduplicated {
            metrics::counter!("ferry.messages.deduplicated_total").increment(1);
        }
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = deduplicated;
    }
}

/// Record a reference whose body was missing during iteration.
///
/// - `ferry.iterator.missing_bodies_total` – counter
#[inline]
pub fn record_missing_body() {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("ferry.iterator.missing_bodies_total").increment(1);
    }
}

/// Record the outcome of cleaning one endpoint log.
///
/// - `ferry.cleanup.refs_removed_total` – counter
/// - `ferry.cleanup.bodies_deleted_total` – counter
/// - `ferry.cleanup.endpoint_failures_total` – counter
#[inline]
pub fn record_endpoint_cleanup(refs_removed: u64, bodies_deleted: u64, success: bool) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("ferry.cleanup.refs_removed_total").increment(refs_removed);
        metrics::counter!("ferry.cleanup.bodies_deleted_total").increment(bodies_deleted);
        if !success {
            metrics::counter!("ferry.cleanup.endpoint_failures_total").increment(1);
        }
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (refs_removed, bodies_deleted, success);
    }
}

/// Record a full cleanup pass over all endpoints.
///
/// - `ferry.cleanup.passes_total` – counter
/// - `ferry.cleanup.pass_duration_seconds` – histogram
#[inline]
pub fn record_cleanup_pass(duration: std::time::Duration) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("ferry.cleanup.passes_total").increment(1);
        metrics::histogram!("ferry.cleanup.pass_duration_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = duration;
    }
}

/// Set the number of registered endpoints.
///
/// - `ferry.endpoints` – gauge
#[inline]
pub fn set_endpoint_count(count: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::gauge!("ferry.endpoints").set(count as f64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = count;
    }
}
