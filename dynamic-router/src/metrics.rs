//! Metrics collaborator boundary.
//!
//! The router only ever increments named counters. Callers may plug in any sink;
//! when none is configured every increment is a no-op.

use std::sync::Arc;

pub const DISPATCHED_TOTAL: &str = "dynamic_router_dispatched_total";
pub const DROPPED_TOTAL: &str = "dynamic_router_dropped_total";
pub const TIMED_OUT_TOTAL: &str = "dynamic_router_timed_out_total";
pub const FAILED_TOTAL: &str = "dynamic_router_failed_total";

/// Receives counter increments from the router.
pub trait MetricsSink: Send + Sync {
    fn increment(&self, name: &str, by: u64);
}

/// Forwards increments to the global `metrics` facade, so whichever recorder the
/// host installed (Prometheus exporter, statsd, ...) sees them.
#[derive(Clone, Copy, Debug, Default)]
pub struct MetricsCrateSink;

impl MetricsSink for MetricsCrateSink {
    fn increment(&self, name: &str, by: u64) {
        metrics::counter!(name.to_owned()).increment(by);
    }
}

/// Optional sink wrapper used by the data plane.
#[derive(Clone, Default)]
pub(crate) struct Counters {
    sink: Option<Arc<dyn MetricsSink>>,
}

impl Counters {
    pub(crate) fn new(sink: Option<Arc<dyn MetricsSink>>) -> Self {
        Self { sink }
    }

    #[inline]
    pub(crate) fn increment(&self, name: &str) {
        if let Some(sink) = &self.sink {
            sink.increment(name, 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Counters, MetricsCrateSink, MetricsSink, DROPPED_TOTAL};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recording {
        counts: Mutex<HashMap<String, u64>>,
    }

    impl MetricsSink for Recording {
        fn increment(&self, name: &str, by: u64) {
            *self
                .counts
                .lock()
                .expect("lock counts")
                .entry(name.to_string())
                .or_insert(0) += by;
        }
    }

    #[test]
    fn counters_without_sink_are_noop() {
        let counters = Counters::new(None);
        counters.increment(DROPPED_TOTAL);
    }

    #[test]
    fn counters_forward_single_increments() {
        let recording = Arc::new(Recording::default());
        let counters = Counters::new(Some(recording.clone()));

        counters.increment(DROPPED_TOTAL);
        counters.increment(DROPPED_TOTAL);

        assert_eq!(
            recording.counts.lock().expect("lock counts").get(DROPPED_TOTAL),
            Some(&2)
        );
    }

    #[test]
    fn metrics_crate_sink_without_recorder_does_not_panic() {
        MetricsCrateSink.increment(DROPPED_TOTAL, 512);
    }
}
