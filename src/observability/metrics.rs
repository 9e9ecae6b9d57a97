use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};
use tracing::{debug, info};

use crate::utils::constants::METRICS_PREFIX;

/// Refresh trigger label values
pub static TRIGGER_INITIAL: &str = "initial";
pub static TRIGGER_SCHEDULED: &str = "scheduled";
pub static TRIGGER_FORCED: &str = "forced";

/// Metrics of one token manager, registered in its own registry.
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Exchange metrics
    pub refresh_attempts: IntCounterVec,
    pub refresh_failures: IntCounterVec,
    pub refresh_duration: HistogramVec,

    // Cache metrics
    pub token_expiry_unix: IntGauge,
    pub consecutive_failures: IntGauge,

    pub up: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        info!("Initializing Metrics ...");
        let registry = Registry::new_custom(Some(METRICS_PREFIX.into()), None)
            .unwrap_or_else(|_| Registry::new());

        let metrics = Self {
            refresh_attempts: IntCounterVec::new(Opts::new("refresh_attempts_total", "Token exchange attempts by trigger"), &["trigger"]).expect("static metric definition"),
            refresh_failures: IntCounterVec::new(Opts::new("refresh_failures_total", "Token exchange failures by trigger and reason"), &["trigger", "reason"]).expect("static metric definition"),
            refresh_duration: HistogramVec::new(HistogramOpts::new("refresh_duration_seconds", "Token exchange duration seconds").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]), &["trigger"]).expect("static metric definition"),

            token_expiry_unix: IntGauge::new("token_expiry_unix_seconds", "Expiry timestamp of the current token").expect("static metric definition"),
            consecutive_failures: IntGauge::new("consecutive_refresh_failures", "Failed background refreshes since the last success").expect("static metric definition"),
            up: IntGauge::new("up", "1 while the manager is running").expect("static metric definition"),

            registry,
        };

        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(metrics.refresh_attempts.clone()),
            Box::new(metrics.refresh_failures.clone()),
            Box::new(metrics.refresh_duration.clone()),
            Box::new(metrics.token_expiry_unix.clone()),
            Box::new(metrics.consecutive_failures.clone()),
            Box::new(metrics.up.clone()),
        ];
        for collector in collectors {
            if let Err(err) = metrics.registry.register(collector) {
                debug!("metric registration skipped: {}", err);
            }
        }

        metrics
    }

    pub fn observe_attempt(&self, trigger: &str, elapsed_secs: f64) {
        self.refresh_attempts.with_label_values(&[trigger]).inc();
        self.refresh_duration.with_label_values(&[trigger]).observe(elapsed_secs);
    }

    pub fn observe_failure(&self, trigger: &str, reason: &str) {
        self.refresh_failures.with_label_values(&[trigger, reason]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registries_are_independent() {
        let first = Metrics::new();
        let second = Metrics::new();
        first.observe_attempt(TRIGGER_FORCED, 0.1);
        first.observe_failure(TRIGGER_FORCED, "network");

        assert_eq!(first.refresh_attempts.with_label_values(&[TRIGGER_FORCED]).get(), 1);
        assert_eq!(second.refresh_attempts.with_label_values(&[TRIGGER_FORCED]).get(), 0);
        let rendered = prometheus::TextEncoder::new()
            .encode_to_string(&first.registry.gather())
            .unwrap();
        assert!(rendered.contains("tokenclient_refresh_failures_total"));
    }
}
