// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Reconciliation passes (outcome, duration)
// - Per-target sync outcomes
// - Conflict retry attempts and outcomes
// - Notifications dropped by the event filter
// - Component health
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Pass Metrics
    pub passes_total: IntCounterVec,
    pub pass_duration: HistogramVec,

    // Target Metrics
    pub target_outcomes_total: IntCounterVec,

    // Retry Metrics
    pub retry_attempts_total: IntCounterVec,
    pub retry_success: IntCounterVec,
    pub retry_failure: IntCounterVec,

    // Notification Metrics
    pub events_total: IntCounterVec,

    // Health Metrics
    pub component_health: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Pass Metrics
        let passes_total = IntCounterVec::new(
            Opts::new("injector_passes_total", "Reconciliation passes by result"),
            &["result"],
        )?;
        registry.register(Box::new(passes_total.clone()))?;

        let pass_duration = HistogramVec::new(
            HistogramOpts::new("injector_pass_duration_seconds", "Reconciliation pass duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
            &["trigger"],
        )?;
        registry.register(Box::new(pass_duration.clone()))?;

        // Target Metrics
        let target_outcomes_total = IntCounterVec::new(
            Opts::new("injector_target_outcomes_total", "Per-target sync outcomes"),
            &["outcome"],
        )?;
        registry.register(Box::new(target_outcomes_total.clone()))?;

        // Retry Metrics
        let retry_attempts_total = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Total retry attempts"),
            &["operation", "attempt"],
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        let retry_success = IntCounterVec::new(
            Opts::new("retry_success_total", "Operations that succeeded after at least one retry"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_success.clone()))?;

        let retry_failure = IntCounterVec::new(
            Opts::new("retry_failure_total", "Operations that failed after all attempts"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_failure.clone()))?;

        // Notification Metrics
        let events_total = IntCounterVec::new(
            Opts::new("injector_events_total", "Change notifications seen by the dispatcher"),
            &["kind", "decision"],
        )?;
        registry.register(Box::new(events_total.clone()))?;

        // Health Metrics
        let component_health = IntGaugeVec::new(
            Opts::new("component_health_status", "Component health (0=Degraded, 1=Healthy)"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            registry,
            passes_total,
            pass_duration,
            target_outcomes_total,
            retry_attempts_total,
            retry_success,
            retry_failure,
            events_total,
            component_health,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Helper to record a finished pass
    pub fn record_pass(&self, trigger: &str, result: &str, duration_secs: f64) {
        self.passes_total.with_label_values(&[result]).inc();
        self.pass_duration.with_label_values(&[trigger]).observe(duration_secs);
    }

    /// Helper to record one target's outcome
    pub fn record_target_outcome(&self, outcome: &str) {
        self.target_outcomes_total.with_label_values(&[outcome]).inc();
    }

    /// Helper to record retry attempt
    pub fn record_retry_attempt(&self, operation: &str, attempt: u32) {
        self.retry_attempts_total.with_label_values(&[operation, &attempt.to_string()]).inc();
    }

    /// Helper to record retry outcome
    pub fn record_retry_outcome(&self, operation: &str, success: bool) {
        if success {
            self.retry_success.with_label_values(&[operation]).inc();
        } else {
            self.retry_failure.with_label_values(&[operation]).inc();
        }
    }

    /// Helper to record a filter decision
    pub fn record_event(&self, kind: &str, accepted: bool) {
        let decision = if accepted { "accepted" } else { "dropped" };
        self.events_total.with_label_values(&[kind, decision]).inc();
    }

    /// Helper to update component health
    pub fn set_component_health(&self, component: &str, healthy: bool) {
        self.component_health.with_label_values(&[component]).set(healthy as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.record_pass("bundle", "success", 0.01);
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_record_pass() {
        let metrics = Metrics::new().unwrap();
        metrics.record_pass("bundle", "success", 0.05);
        metrics.record_pass("target", "partial_failure", 0.05);

        let gathered = metrics.registry.gather();
        let passes = gathered.iter().find(|m| m.name() == "injector_passes_total").unwrap();
        assert_eq!(passes.metric.len(), 2);
    }

    #[test]
    fn test_record_retry() {
        let metrics = Metrics::new().unwrap();
        metrics.record_retry_attempt("configmap_apply", 1);
        metrics.record_retry_attempt("configmap_apply", 2);
        metrics.record_retry_outcome("configmap_apply", true);

        let gathered = metrics.registry.gather();
        let attempts = gathered.iter().find(|m| m.name() == "retry_attempts_total").unwrap();
        assert_eq!(attempts.metric.len(), 2); // Two different attempt labels
    }

    #[test]
    fn test_component_health_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.set_component_health("InjectorConfig", true);
        metrics.set_component_health("InjectorConfig", false);

        let gathered = metrics.registry.gather();
        let health = gathered.iter().find(|m| m.name() == "component_health_status").unwrap();
        assert_eq!(health.metric[0].gauge.value, Some(0.0));
    }
}
