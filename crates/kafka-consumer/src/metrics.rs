use std::time::Duration;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

/// Per-topic consumer counters, registered in a shared registry.
#[derive(Clone)]
pub struct ConsumerMetrics {
    records_total: IntCounterVec,
    handle_duration_seconds: HistogramVec,
}

impl ConsumerMetrics {
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let records_total = IntCounterVec::new(
            Opts::new(
                "projector_records_total",
                "Records seen by consumers, by outcome",
            ),
            &["topic", "outcome"],
        )?;
        let handle_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "projector_handle_duration_seconds",
                "Time spent projecting one record",
            ),
            &["topic"],
        )?;

        registry.register(Box::new(records_total.clone()))?;
        registry.register(Box::new(handle_duration_seconds.clone()))?;

        Ok(Self {
            records_total,
            handle_duration_seconds,
        })
    }

    /// Counts one record with the given outcome label.
    pub fn record(&self, topic: &str, outcome: &str) {
        self.records_total
            .with_label_values(&[topic, outcome])
            .inc();
    }

    pub fn observe_handle(&self, topic: &str, elapsed: Duration) {
        self.handle_duration_seconds
            .with_label_values(&[topic])
            .observe(elapsed.as_secs_f64());
    }

    /// Current count for `topic` and `outcome`.
    pub fn count(&self, topic: &str, outcome: &str) -> u64 {
        self.records_total.with_label_values(&[topic, outcome]).get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_topic_and_outcome() {
        let registry = Registry::new();
        let metrics = ConsumerMetrics::register(&registry).unwrap();

        metrics.record("rates", "created");
        metrics.record("rates", "created");
        metrics.record("rates", "decode_error");
        metrics.observe_handle("rates", Duration::from_millis(3));

        assert_eq!(metrics.count("rates", "created"), 2);
        assert_eq!(metrics.count("rates", "decode_error"), 1);
        assert_eq!(metrics.count("commodities", "created"), 0);

        let text = prometheus::TextEncoder::new()
            .encode_to_string(&registry.gather())
            .unwrap();
        assert!(text.contains(r#"projector_records_total{outcome="created",topic="rates"} 2"#));
        assert!(text.contains("projector_handle_duration_seconds_count"));
    }

    #[test]
    fn test_registering_twice_fails() {
        let registry = Registry::new();
        ConsumerMetrics::register(&registry).unwrap();
        assert!(ConsumerMetrics::register(&registry).is_err());
    }
}
