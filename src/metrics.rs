/*!
 * # Metrics Module
 *
 * In-memory metrics for the settlement pipeline: webhook deliveries,
 * signature rejections, retry traffic, inventory conflicts, and gateway
 * calls.
 *
 * Exposed in Prometheus text format at `/metrics` and as JSON at
 * `/metrics/json`.
 */

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::json;

#[derive(Debug, Clone)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

// Millisecond histogram: sum is stored in whole milliseconds
#[derive(Debug, Clone)]
pub struct Histogram {
    sum: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            sum: Arc::new(AtomicU64::new(0)),
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn observe(&self, value: u64) {
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsRegistry {
    counters: Arc<DashMap<String, Counter>>,
    histograms: Arc<DashMap<String, Histogram>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(DashMap::new()),
            histograms: Arc::new(DashMap::new()),
        }
    }

    pub fn get_or_create_counter(&self, name: &str) -> Counter {
        self.counters
            .entry(name.to_string())
            .or_insert_with(Counter::new)
            .clone()
    }

    pub fn get_or_create_histogram(&self, name: &str) -> Histogram {
        self.histograms
            .entry(name.to_string())
            .or_insert_with(Histogram::new)
            .clone()
    }

    /// Prometheus text exposition format.
    pub fn export_text(&self) -> String {
        let mut output = String::new();

        for entry in self.counters.iter() {
            let (name, counter) = entry.pair();
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{} {}\n", name, counter.get()));
        }

        for entry in self.histograms.iter() {
            let (name, histogram) = entry.pair();
            output.push_str(&format!("# TYPE {} histogram\n", name));
            output.push_str(&format!("{}_count {}\n", name, histogram.get_count()));
            output.push_str(&format!("{}_sum {}\n", name, histogram.get_sum()));
        }

        output
    }

    pub fn export_json(&self) -> serde_json::Value {
        let mut counters = serde_json::Map::new();
        for entry in self.counters.iter() {
            let (name, counter) = entry.pair();
            counters.insert(name.to_string(), json!(counter.get()));
        }

        let mut histograms = serde_json::Map::new();
        for entry in self.histograms.iter() {
            let (name, histogram) = entry.pair();
            histograms.insert(
                name.to_string(),
                json!({
                    "count": histogram.get_count(),
                    "sum": histogram.get_sum(),
                }),
            );
        }

        json!({
            "counters": counters,
            "histograms": histograms,
        })
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Global metrics registry
lazy_static::lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

pub fn increment_counter(name: &str) {
    METRICS.get_or_create_counter(name).inc();
}

pub fn increment_counter_by(name: &str, value: u64) {
    METRICS.get_or_create_counter(name).inc_by(value);
}

pub fn observe_histogram(name: &str, value: u64) {
    METRICS.get_or_create_histogram(name).observe(value);
}

/// Named handles for the webhook pipeline's metrics.
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub events_received: Counter,
    pub events_processed: Counter,
    pub events_duplicate: Counter,
    pub events_failed: Counter,
    pub signature_rejections: Counter,
    pub version_conflicts: Counter,
    pub gateway_requests: Counter,
    pub processing_ms: Histogram,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            events_received: METRICS.get_or_create_counter("settlement_events_received_total"),
            events_processed: METRICS.get_or_create_counter("settlement_events_processed_total"),
            events_duplicate: METRICS.get_or_create_counter("settlement_events_duplicate_total"),
            events_failed: METRICS.get_or_create_counter("settlement_events_failed_total"),
            signature_rejections: METRICS
                .get_or_create_counter("settlement_signature_rejections_total"),
            version_conflicts: METRICS
                .get_or_create_counter("settlement_inventory_version_conflicts_total"),
            gateway_requests: METRICS.get_or_create_counter("settlement_gateway_requests_total"),
            processing_ms: METRICS.get_or_create_histogram("settlement_event_processing_ms"),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
