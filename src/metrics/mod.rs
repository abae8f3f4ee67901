//! Metrics collection for observability

use prometheus::{
    Counter, CounterVec, Histogram, HistogramOpts, Opts, Registry,
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_with_registry,
};
use std::sync::Arc;
use once_cell::sync::Lazy;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Context analysis metrics
    pub analysis_requests: CounterVec,
    pub analysis_duration: Histogram,
    pub gate_rejections: Counter,

    // Pipeline health
    pub degraded_signals: CounterVec,

    // Detection metrics
    pub detection_cache: CounterVec,
    pub detection_refreshes: Counter,

    // Documentation provider metrics
    pub documentation_requests: CounterVec,

    // Rule intelligence metrics
    pub rule_conflicts: CounterVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let analysis_requests = register_counter_vec_with_registry!(
            Opts::new("context_analysis_requests_total", "Total context analysis requests"),
            &["status"],
            registry
        )?;

        let analysis_duration = register_histogram_with_registry!(
            HistogramOpts::new(
                "context_analysis_duration_seconds",
                "Context analysis duration in seconds"
            ),
            registry
        )?;

        let gate_rejections = register_counter_with_registry!(
            Opts::new(
                "context_relevance_gate_rejections_total",
                "Prompts short-circuited by the relevance gate"
            ),
            registry
        )?;

        let degraded_signals = register_counter_vec_with_registry!(
            Opts::new("context_degraded_signals_total", "Optional stages that degraded to defaults"),
            &["stage"],
            registry
        )?;

        let detection_cache = register_counter_vec_with_registry!(
            Opts::new("detection_cache_lookups_total", "Detection cache lookups by outcome"),
            &["outcome"],
            registry
        )?;

        let detection_refreshes = register_counter_with_registry!(
            Opts::new("detection_cache_refreshes_total", "Detection cache refreshes started"),
            registry
        )?;

        let documentation_requests = register_counter_vec_with_registry!(
            Opts::new("documentation_requests_total", "Documentation provider requests"),
            &["status"],
            registry
        )?;

        let rule_conflicts = register_counter_vec_with_registry!(
            Opts::new("rule_conflicts_total", "Rule conflicts detected"),
            &["kind"],
            registry
        )?;

        Ok(Self {
            registry,
            analysis_requests,
            analysis_duration,
            gate_rejections,
            degraded_signals,
            detection_cache,
            detection_refreshes,
            documentation_requests,
            rule_conflicts,
        })
    }

    /// Record a finished analysis request
    pub fn record_analysis(&self, status: &str, seconds: f64) {
        self.analysis_requests.with_label_values(&[status]).inc();
        self.analysis_duration.observe(seconds);
    }

    /// Record a prompt rejected by the relevance gate
    pub fn record_gate_rejection(&self) {
        self.gate_rejections.inc();
    }

    /// Record an optional stage that fell back to defaults
    pub fn record_degraded(&self, stage: &str) {
        self.degraded_signals.with_label_values(&[stage]).inc();
    }

    /// Record a detection cache lookup (`hit`, `stale`, `wait`, `miss`)
    pub fn record_cache_lookup(&self, outcome: &str) {
        self.detection_cache.with_label_values(&[outcome]).inc();
    }

    pub fn record_cache_refresh(&self) {
        self.detection_refreshes.inc();
    }

    pub fn record_documentation(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        self.documentation_requests.with_label_values(&[status]).inc();
    }

    pub fn record_rule_conflict(&self, kind: &str) {
        self.rule_conflicts.with_label_values(&[kind]).inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}
