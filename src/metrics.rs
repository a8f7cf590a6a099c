// src/metrics.rs
//
// Prometheus counters behind the `metrics` feature. Without it every
// recorder below compiles to nothing.
use std::time::Duration;

use crate::types::ExchangeId;

#[cfg(feature = "metrics")]
mod registry {
    use once_cell::sync::Lazy;
    use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};

    pub static REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
        register_int_counter_vec!(
            "funding_arb_requests_total",
            "Exchange requests issued",
            &["exchange", "outcome"] // ok|transient|permanent
        )
        .unwrap()
    });

    pub static RETRIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
        register_int_counter_vec!(
            "funding_arb_retries_total", "Backoff retries", &["exchange"]
        ).unwrap()
    });

    pub static REQUEST_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
        register_histogram_vec!(
            "funding_arb_request_latency_seconds",
            "Exchange request latency",
            &["exchange"],
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
        ).unwrap()
    });
}

#[cfg(feature = "metrics")]
pub fn record_request(exchange: ExchangeId, outcome: &'static str, elapsed: Duration) {
    registry::REQUESTS_TOTAL.with_label_values(&[exchange.as_str(), outcome]).inc();
    registry::REQUEST_LATENCY
        .with_label_values(&[exchange.as_str()])
        .observe(elapsed.as_secs_f64());
}

#[cfg(not(feature = "metrics"))]
pub fn record_request(_exchange: ExchangeId, _outcome: &'static str, _elapsed: Duration) {}

#[cfg(feature = "metrics")]
pub fn record_retry(exchange: ExchangeId) {
    registry::RETRIES_TOTAL.with_label_values(&[exchange.as_str()]).inc();
}

#[cfg(not(feature = "metrics"))]
pub fn record_retry(_exchange: ExchangeId) {}

/// Text exposition of everything registered so far.
#[cfg(feature = "metrics")]
pub fn render() -> Option<String> {
    use prometheus::Encoder;
    let mut buf = Vec::new();
    prometheus::TextEncoder::new().encode(&prometheus::gather(), &mut buf).ok()?;
    String::from_utf8(buf).ok()
}

#[cfg(not(feature = "metrics"))]
pub fn render() -> Option<String> {
    None
}
