/*!
 * # Metrics Module
 *
 * In-process counters, gauges and histograms for the storefront API,
 * exported in Prometheus text format at `/metrics` and as JSON at
 * `/metrics/json`.
 */

use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
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

/// Gauge holding an `f64` as its bit pattern
#[derive(Debug, Clone, Default)]
pub struct Gauge {
    bits: Arc<AtomicU64>,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Histogram {
    sum_bits: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, value: f64) {
        let _ = self
            .sum_bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + value).to_bits())
            });
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum(&self) -> f64 {
        f64::from_bits(self.sum_bits.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: DashMap<String, Counter>,
    gauges: DashMap<String, Gauge>,
    histograms: DashMap<String, Histogram>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_counter(&self, name: &str) -> Counter {
        self.counters
            .entry(name.to_string())
            .or_insert_with(Counter::new)
            .clone()
    }

    pub fn get_or_create_gauge(&self, name: &str) -> Gauge {
        self.gauges
            .entry(name.to_string())
            .or_insert_with(Gauge::new)
            .clone()
    }

    pub fn get_or_create_histogram(&self, name: &str) -> Histogram {
        self.histograms
            .entry(name.to_string())
            .or_insert_with(Histogram::new)
            .clone()
    }

    /// Prometheus text exposition, sorted by metric name
    pub fn export_metrics(&self) -> String {
        let mut lines: Vec<(String, String)> = Vec::new();

        for entry in self.counters.iter() {
            let (name, counter) = entry.pair();
            lines.push((
                name.clone(),
                format!("# TYPE {name} counter\n{name} {}\n", counter.get()),
            ));
        }
        for entry in self.gauges.iter() {
            let (name, gauge) = entry.pair();
            lines.push((
                name.clone(),
                format!("# TYPE {name} gauge\n{name} {}\n", gauge.get()),
            ));
        }
        for entry in self.histograms.iter() {
            let (name, histogram) = entry.pair();
            lines.push((
                name.clone(),
                format!(
                    "# TYPE {name} summary\n{name}_count {}\n{name}_sum {}\n",
                    histogram.get_count(),
                    histogram.get_sum()
                ),
            ));
        }

        lines.sort_by(|a, b| a.0.cmp(&b.0));
        lines.into_iter().map(|(_, text)| text).collect()
    }

    pub fn export_metrics_json(&self) -> serde_json::Value {
        let counters: serde_json::Map<_, _> = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), json!(e.value().get())))
            .collect();
        let gauges: serde_json::Map<_, _> = self
            .gauges
            .iter()
            .map(|e| (e.key().clone(), json!(e.value().get())))
            .collect();
        let histograms: serde_json::Map<_, _> = self
            .histograms
            .iter()
            .map(|e| {
                (
                    e.key().clone(),
                    json!({ "count": e.value().get_count(), "sum": e.value().get_sum() }),
                )
            })
            .collect();

        json!({
            "counters": counters,
            "gauges": gauges,
            "histograms": histograms,
        })
    }
}

// Global metrics registry
pub static METRICS: Lazy<MetricsRegistry> = Lazy::new(MetricsRegistry::new);

pub fn increment_counter(name: &str) {
    METRICS.get_or_create_counter(name).inc();
}

pub fn increment_counter_by(name: &str, value: u64) {
    METRICS.get_or_create_counter(name).inc_by(value);
}

pub fn set_gauge(name: &str, value: f64) {
    METRICS.get_or_create_gauge(name).set(value);
}

pub fn observe_histogram(name: &str, value: f64) {
    METRICS.get_or_create_histogram(name).observe(value);
}

pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.export_metrics(),
    )
}

pub async fn metrics_json_handler() -> impl IntoResponse {
    Json(METRICS.export_metrics_json())
}

/// Counts every request and records its latency.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;

    increment_counter("http_requests_total");
    increment_counter(&format!("http_responses_{}xx_total", response.status().as_u16() / 100));
    observe_histogram(
        "http_request_duration_seconds",
        start.elapsed().as_secs_f64(),
    );
    response
}
