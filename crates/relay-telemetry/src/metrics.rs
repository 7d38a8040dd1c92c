//! Prometheus metrics for the relay services.
//!
//! All metrics follow the naming convention: `relay_<component>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, HistogramOpts, HistogramVec, Opts,
    Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // GATEWAY METRICS
    // =========================================================================

    /// Dispatched requests by action and result (`ok` or an error label)
    pub static ref GATEWAY_REQUESTS: CounterVec = CounterVec::new(
        Opts::new("relay_gateway_requests_total", "Requests handled by the action dispatcher"),
        &["action", "result"]
    ).expect("metric creation failed");

    /// Time spent in a transport adapter
    pub static ref GATEWAY_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "relay_gateway_request_duration_seconds",
            "Time spent dispatching one action"
        ).buckets(exponential_buckets(0.001, 2.0, 14).expect("valid buckets")),
        &["action"]
    ).expect("metric creation failed");

    // =========================================================================
    // EVENT BUS METRICS
    // =========================================================================

    /// Messages accepted by the broker
    pub static ref BUS_MESSAGES_PUBLISHED: CounterVec = CounterVec::new(
        Opts::new("relay_bus_messages_published_total", "Messages pushed to the topic exchange"),
        &["topic"]
    ).expect("metric creation failed");

    /// Events handed to a listener handler, by event title
    pub static ref BUS_MESSAGES_CONSUMED: CounterVec = CounterVec::new(
        Opts::new("relay_bus_messages_consumed_total", "Events received from the topic exchange"),
        &["title"]
    ).expect("metric creation failed");

    /// Handler failures by event title
    pub static ref BUS_HANDLER_FAILURES: CounterVec = CounterVec::new(
        Opts::new("relay_bus_handler_failures_total", "Event handler failures"),
        &["title"]
    ).expect("metric creation failed");

    /// Broker dials, successful or not
    pub static ref BROKER_DIAL_ATTEMPTS: Counter = Counter::new(
        "relay_broker_dial_attempts_total",
        "Total broker dial attempts"
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Gateway
        Box::new(GATEWAY_REQUESTS.clone()),
        Box::new(GATEWAY_REQUEST_DURATION.clone()),
        // Event Bus
        Box::new(BUS_MESSAGES_PUBLISHED.clone()),
        Box::new(BUS_MESSAGES_CONSUMED.clone()),
        Box::new(BUS_HANDLER_FAILURES.clone()),
        Box::new(BROKER_DIAL_ATTEMPTS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Observes elapsed time into a histogram on drop.
pub struct HistogramTimer {
    histogram: prometheus::Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a timer for one label set of a histogram vector.
    pub fn new(histogram: &HistogramVec, labels: &[&str]) -> Self {
        Self {
            histogram: histogram.with_label_values(labels),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_twice() {
        assert!(register_metrics().is_ok());
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_counter_increment_is_encoded() {
        register_metrics().unwrap();
        BUS_MESSAGES_PUBLISHED.with_label_values(&["log.INFO"]).inc();

        let text = encode_metrics().unwrap();
        assert!(text.contains("relay_bus_messages_published_total"));
        assert!(text.contains("log.INFO"));
    }

    #[test]
    fn test_histogram_timer_observes_on_drop() {
        let before = GATEWAY_REQUEST_DURATION
            .with_label_values(&["timer-test"])
            .get_sample_count();
        {
            let _timer = HistogramTimer::new(&GATEWAY_REQUEST_DURATION, &["timer-test"]);
        }
        let after = GATEWAY_REQUEST_DURATION
            .with_label_values(&["timer-test"])
            .get_sample_count();
        assert_eq!(after, before + 1);
    }
}
