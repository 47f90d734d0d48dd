//! Metrics reporter trait.

use super::MetricEvent;

/// Trait for reporting metrics events from coordinated-commit operations.
///
/// Implementations receive metric events as they occur and can forward them to monitoring
/// systems like Prometheus, DataDog, etc.
pub trait MetricsReporter: Send + Sync + std::fmt::Debug {
    /// Report a metric event.
    fn report(&self, event: MetricEvent);
}

#[cfg(test)]
pub(crate) mod test_utils {
    use std::sync::Mutex;

    use super::*;

    /// Collects every event it is handed.
    #[derive(Debug, Default)]
    pub(crate) struct CapturingReporter {
        pub(crate) events: Mutex<Vec<MetricEvent>>,
    }

    impl CapturingReporter {
        pub(crate) fn events(&self) -> Vec<MetricEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl MetricsReporter for CapturingReporter {
        fn report(&self, event: MetricEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}
