//! Operation metrics
//!
//! Call counts, error counts, durations and cache hit ratios per service
//! operation, kept in a dedicated prometheus registry so several
//! application instances (e.g. in tests) never collide on registration.

use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::error::BauxiteResult;

#[derive(Clone)]
pub struct OperationMetrics {
    registry: Registry,
    calls: IntCounterVec,
    errors: IntCounterVec,
    durations: HistogramVec,
    cache_hits: IntCounterVec,
    cache_misses: IntCounterVec,
    seen: Arc<Mutex<BTreeSet<(String, String)>>>,
}

impl OperationMetrics {
    pub fn new(namespace: &str) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let calls = IntCounterVec::new(
            Opts::new("operation_calls_total", "Service operation calls").namespace(namespace),
            &["service", "operation"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new("operation_errors_total", "Service operations that returned an error")
                .namespace(namespace),
            &["service", "operation"],
        )?;
        let durations = HistogramVec::new(
            HistogramOpts::new("operation_duration_seconds", "Service operation latency")
                .namespace(namespace),
            &["service", "operation"],
        )?;
        let cache_hits = IntCounterVec::new(
            Opts::new("cache_hits_total", "Cache hits").namespace(namespace),
            &["service"],
        )?;
        let cache_misses = IntCounterVec::new(
            Opts::new("cache_misses_total", "Cache misses").namespace(namespace),
            &["service"],
        )?;

        registry.register(Box::new(calls.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(durations.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;

        Ok(Self {
            registry,
            calls,
            errors,
            durations,
            cache_hits,
            cache_misses,
            seen: Arc::new(Mutex::new(BTreeSet::new())),
        })
    }

    /// Runs `operation`, recording one call, its latency and whether it failed.
    pub async fn track<T, F>(&self, service: &str, operation: &str, fut: F) -> BauxiteResult<T>
    where
        F: Future<Output = BauxiteResult<T>>,
    {
        let labels = [service, operation];
        self.calls.with_label_values(&labels).inc();
        self.remember(service, operation);

        let started = Instant::now();
        let result = fut.await;
        self.durations
            .with_label_values(&labels)
            .observe(started.elapsed().as_secs_f64());

        if let Err(error) = &result {
            self.errors.with_label_values(&labels).inc();
            tracing::debug!(service, operation, error = %error, "Operation failed");
        }

        result
    }

    pub fn record_cache(&self, service: &str, hit: bool) {
        if hit {
            self.cache_hits.with_label_values(&[service]).inc();
        } else {
            self.cache_misses.with_label_values(&[service]).inc();
        }
    }

    /// JSON view of one service's counters, served by the per-resource
    /// health endpoints.
    pub fn snapshot(&self, service: &str) -> Value {
        let operations: Vec<String> = self
            .seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|(name, _)| name == service)
            .map(|(_, operation)| operation.clone())
            .collect();

        let mut per_operation = Map::new();
        for operation in operations {
            let labels = [service, operation.as_str()];
            let histogram = self.durations.with_label_values(&labels);
            let count = histogram.get_sample_count();
            let avg_ms = if count == 0 {
                0.0
            } else {
                histogram.get_sample_sum() / count as f64 * 1000.0
            };
            per_operation.insert(
                operation.clone(),
                json!({
                    "calls": self.calls.with_label_values(&labels).get(),
                    "errors": self.errors.with_label_values(&labels).get(),
                    "avg_duration_ms": avg_ms,
                }),
            );
        }

        let hits = self.cache_hits.with_label_values(&[service]).get();
        let misses = self.cache_misses.with_label_values(&[service]).get();
        let lookups = hits + misses;

        json!({
            "operations": per_operation,
            "cache": {
                "hits": hits,
                "misses": misses,
                "hit_ratio": if lookups == 0 { 0.0 } else { hits as f64 / lookups as f64 },
            }
        })
    }

    /// Prometheus text exposition of everything in the registry.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        encoder
            .encode_to_string(&self.registry.gather())
            .unwrap_or_else(|_| "Error encoding metrics".to_string())
    }

    fn remember(&self, service: &str, operation: &str) {
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert((service.to_string(), operation.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BauxiteError;

    #[tokio::test]
    async fn test_track_counts_calls_and_errors() {
        let metrics = OperationMetrics::new("test").unwrap();

        let ok: BauxiteResult<i32> = metrics.track("mine", "get", async { Ok(1) }).await;
        assert_eq!(ok.unwrap(), 1);
        let err: BauxiteResult<i32> = metrics
            .track("mine", "get", async { Err(BauxiteError::not_found("Mine")) })
            .await;
        assert!(err.is_err());

        let snapshot = metrics.snapshot("mine");
        assert_eq!(snapshot["operations"]["get"]["calls"], 2);
        assert_eq!(snapshot["operations"]["get"]["errors"], 1);
    }

    #[test]
    fn test_cache_ratio() {
        let metrics = OperationMetrics::new("test").unwrap();
        metrics.record_cache("product", true);
        metrics.record_cache("product", true);
        metrics.record_cache("product", false);
        metrics.record_cache("product", true);

        let snapshot = metrics.snapshot("product");
        assert_eq!(snapshot["cache"]["hits"], 3);
        assert_eq!(snapshot["cache"]["hit_ratio"], 0.75);
    }

    #[test]
    fn test_independent_registries() {
        let first = OperationMetrics::new("bauxite").unwrap();
        let second = OperationMetrics::new("bauxite").unwrap();
        first.record_cache("mine", true);
        assert!(first.encode().contains("bauxite_cache_hits_total"));
        assert!(!second.encode().contains("service=\"mine\""));
    }
}
