//! Prometheus metrics registry.
//!
//! Wraps the `metrics` crate's counters/gauges/histograms behind a
//! `Metrics` struct with one field or accessor per signal, so call sites
//! never touch the global recorder macros directly.

use metrics::{Gauge, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the process-wide Prometheus recorder and describe every metric
/// this crate emits. Must be called exactly once, before any metric is
/// recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!("api_requests_total", "Total API requests");
    metrics::describe_counter!("scrape_total", "Total scrape attempts");
    metrics::describe_counter!("captcha_total", "Captcha detections");
    metrics::describe_histogram!("scrape_duration_seconds", Unit::Seconds, "Scrape duration in seconds");
    metrics::describe_gauge!("scrape_queue_depth", "Current scrape queue depth");
    metrics::describe_gauge!("cache_size", "Current cache size");

    Ok(handle)
}

/// Thin, label-aware façade over the global recorder. Unlabeled gauges are
/// held as fields (cheap, cloneable handles); labeled signals are
/// constructed on demand via the `metrics` macros, which cache the
/// underlying handle per unique label set on the recorder side.
pub struct Metrics {
    pub scrape_queue_depth: Gauge,
    pub cache_size: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            scrape_queue_depth: metrics::gauge!("scrape_queue_depth"),
            cache_size: metrics::gauge!("cache_size"),
        }
    }

    pub fn api_requests_total(&self, endpoint: &str, status: &str) -> metrics::Counter {
        metrics::counter!("api_requests_total", "endpoint" => endpoint.to_string(), "status" => status.to_string())
    }

    pub fn scrape_total(&self, status: &str, country: &str) -> metrics::Counter {
        metrics::counter!("scrape_total", "status" => status.to_string(), "country" => country.to_string())
    }

    pub fn captcha_total(&self, country: &str) -> metrics::Counter {
        metrics::counter!("captcha_total", "country" => country.to_string())
    }

    pub fn scrape_duration_seconds(&self, country: &str) -> metrics::Histogram {
        metrics::histogram!("scrape_duration_seconds", "country" => country.to_string())
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
