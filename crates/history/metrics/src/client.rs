use std::time::{Duration, Instant};

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

use crate::defs::{Counter, Scope, Timer};

const OPERATION_LABEL: &str = "operation";

/// Handle used by every component to emit counters and latencies.
///
/// Cheap to clone; all clones write to the same collectors.
#[derive(Clone)]
pub struct MetricsClient {
    counters: Vec<IntCounterVec>,
    timers: Vec<HistogramVec>,
}

impl MetricsClient {
    /// Create the collectors and register them with `registry`.
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let mut counters = Vec::with_capacity(Counter::ALL.len());
        for counter in Counter::ALL {
            let vec = IntCounterVec::new(
                Opts::new(counter.name(), counter.help()),
                &[OPERATION_LABEL],
            )?;
            registry.register(Box::new(vec.clone()))?;
            counters.push(vec);
        }

        let mut timers = Vec::with_capacity(Timer::ALL.len());
        for timer in Timer::ALL {
            let vec = HistogramVec::new(
                HistogramOpts::new(timer.name(), timer.help()).buckets(vec![
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ]),
                &[OPERATION_LABEL],
            )?;
            registry.register(Box::new(vec.clone()))?;
            timers.push(vec);
        }

        Ok(Self { counters, timers })
    }

    /// A client backed by a private registry nobody scrapes.
    pub fn detached() -> Self {
        match Self::new(&Registry::new()) {
            Ok(client) => client,
            Err(e) => {
                // A fresh registry cannot hold duplicates; only a malformed
                // descriptor reaches here.
                tracing::error!(error = %e, "Failed to create detached metrics client");
                Self {
                    counters: Vec::new(),
                    timers: Vec::new(),
                }
            }
        }
    }

    pub fn inc_counter(&self, scope: Scope, counter: Counter) {
        self.add_counter(scope, counter, 1);
    }

    pub fn add_counter(&self, scope: Scope, counter: Counter, delta: u64) {
        if let Some(vec) = self.counters.get(counter as usize) {
            vec.with_label_values(&[scope.operation()]).inc_by(delta);
        }
    }

    pub fn record_timer(&self, scope: Scope, timer: Timer, elapsed: Duration) {
        if let Some(vec) = self.timers.get(timer as usize) {
            vec.with_label_values(&[scope.operation()])
                .observe(elapsed.as_secs_f64());
        }
    }

    /// Start measuring; the latency is recorded when the stopwatch is dropped.
    pub fn start_timer(&self, scope: Scope, timer: Timer) -> Stopwatch {
        Stopwatch {
            client: self.clone(),
            scope,
            timer,
            started: Instant::now(),
        }
    }

    /// Current value of a counter. Used by tests and diagnostics only.
    pub fn counter_value(&self, scope: Scope, counter: Counter) -> u64 {
        self.counters
            .get(counter as usize)
            .map(|vec| vec.with_label_values(&[scope.operation()]).get())
            .unwrap_or(0)
    }

    /// Number of latency samples recorded for a scope.
    pub fn timer_count(&self, scope: Scope, timer: Timer) -> u64 {
        self.timers
            .get(timer as usize)
            .map(|vec| vec.with_label_values(&[scope.operation()]).get_sample_count())
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for MetricsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsClient")
            .field("counters", &self.counters.len())
            .field("timers", &self.timers.len())
            .finish()
    }
}

/// Records elapsed time into a latency histogram on drop.
pub struct Stopwatch {
    client: MetricsClient,
    scope: Scope,
    timer: Timer,
    started: Instant,
}

impl Stopwatch {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for Stopwatch {
    fn drop(&mut self) {
        self.client
            .record_timer(self.scope, self.timer, self.started.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_labelled_by_scope() {
        let registry = Registry::new();
        let metrics = MetricsClient::new(&registry).unwrap();

        metrics.inc_counter(Scope::TransferQueueProcessor, Counter::TaskRequests);
        metrics.add_counter(Scope::TransferQueueProcessor, Counter::TaskRequests, 2);
        metrics.inc_counter(Scope::TimerQueueProcessor, Counter::TaskRequests);

        assert_eq!(
            metrics.counter_value(Scope::TransferQueueProcessor, Counter::TaskRequests),
            3
        );
        assert_eq!(
            metrics.counter_value(Scope::TimerQueueProcessor, Counter::TaskRequests),
            1
        );

        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "task_requests_total"));
    }

    #[test]
    fn stopwatch_records_on_drop() {
        let metrics = MetricsClient::detached();
        {
            let _sw = metrics.start_timer(Scope::PersistenceGetShard, Timer::PersistenceLatency);
        }
        assert_eq!(
            metrics.timer_count(Scope::PersistenceGetShard, Timer::PersistenceLatency),
            1
        );
    }

    #[test]
    fn registering_twice_fails() {
        let registry = Registry::new();
        MetricsClient::new(&registry).unwrap();
        assert!(MetricsClient::new(&registry).is_err());
    }
}
