use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use sequencing_core::{Classification, EnrichedSlot};
use std::time::Duration;

/// Service metrics. Each recorder owns its registry so several can coexist
/// in one process.
pub struct MetricsRecorder {
    registry: Registry,

    // Slot enrichment
    slots_enriched: IntCounter,
    slot_failures: IntCounter,
    index_mismatches: IntCounter,

    // Classification
    classifications: IntCounterVec,
    producer_failures: IntCounter,

    // Data access
    store_latency: HistogramVec,
    store_errors: IntCounterVec,
    upstream_errors: IntCounterVec,
    cache_lookups: IntCounterVec,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("scheduler_inspector".to_string()), None)?;

        let slots_enriched = IntCounter::new("slots_enriched_total", "Slots run through enrichment")?;
        let slot_failures = IntCounter::new(
            "slot_failures_total",
            "Recent slots that could not be loaded for classification",
        )?;
        let index_mismatches = IntCounter::new(
            "index_mismatches_total",
            "Transactions whose index fell outside every entry range",
        )?;
        let classifications = IntCounterVec::new(
            Opts::new("classifications_total", "Producer classifications by label"),
            &["label"],
        )?;
        let producer_failures = IntCounter::new(
            "producer_failures_total",
            "Producers that could not be classified in a batch",
        )?;
        let store_latency = HistogramVec::new(
            HistogramOpts::new("store_query_duration_seconds", "ClickHouse query latency")
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["query"],
        )?;
        let store_errors = IntCounterVec::new(
            Opts::new("store_errors_total", "Failed ClickHouse queries"),
            &["query"],
        )?;
        let upstream_errors = IntCounterVec::new(
            Opts::new("upstream_errors_total", "Failed validator metadata fetches"),
            &["upstream"],
        )?;
        let cache_lookups = IntCounterVec::new(
            Opts::new("cache_lookups_total", "Report cache lookups"),
            &["cache", "outcome"],
        )?;

        registry.register(Box::new(slots_enriched.clone()))?;
        registry.register(Box::new(slot_failures.clone()))?;
        registry.register(Box::new(index_mismatches.clone()))?;
        registry.register(Box::new(classifications.clone()))?;
        registry.register(Box::new(producer_failures.clone()))?;
        registry.register(Box::new(store_latency.clone()))?;
        registry.register(Box::new(store_errors.clone()))?;
        registry.register(Box::new(upstream_errors.clone()))?;
        registry.register(Box::new(cache_lookups.clone()))?;

        Ok(Self {
            registry,
            slots_enriched,
            slot_failures,
            index_mismatches,
            classifications,
            producer_failures,
            store_latency,
            store_errors,
            upstream_errors,
            cache_lookups,
        })
    }

    pub fn record_slot(&self, slot: &EnrichedSlot) {
        self.slots_enriched.inc();
        self.index_mismatches
            .inc_by(slot.totals.index_mismatches as u64);
    }

    pub fn record_slot_failure(&self) {
        self.slot_failures.inc();
    }

    pub fn record_classification(&self, label: Classification) {
        self.classifications
            .with_label_values(&[label.as_str()])
            .inc();
    }

    pub fn record_producer_failure(&self) {
        self.producer_failures.inc();
    }

    pub fn observe_store_query(&self, query: &str, elapsed: Duration, ok: bool) {
        self.store_latency
            .with_label_values(&[query])
            .observe(elapsed.as_secs_f64());
        if !ok {
            self.store_errors.with_label_values(&[query]).inc();
        }
    }

    pub fn record_upstream_error(&self, upstream: &str) {
        self.upstream_errors.with_label_values(&[upstream]).inc();
    }

    pub fn record_cache_lookup(&self, cache: &str, hit: bool) {
        let outcome = if hit { "hit" } else { "miss" };
        self.cache_lookups.with_label_values(&[cache, outcome]).inc();
    }

    /// Prometheus text exposition of every metric in this recorder.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorders_are_independent() {
        let a = MetricsRecorder::new().unwrap();
        let b = MetricsRecorder::new().unwrap();
        a.record_classification(Classification::SecondHalfDominant);
        a.record_producer_failure();

        let text = a.encode().unwrap();
        assert!(text.contains("scheduler_inspector_classifications_total{label=\"Rev\"} 1"));
        assert!(text.contains("scheduler_inspector_producer_failures_total 1"));
        assert!(b.encode().unwrap().contains("scheduler_inspector_producer_failures_total 0"));
    }

    #[test]
    fn store_errors_are_labelled() {
        let m = MetricsRecorder::new().unwrap();
        m.observe_store_query("slot_entries", Duration::from_millis(12), false);
        let text = m.encode().unwrap();
        assert!(text.contains("scheduler_inspector_store_errors_total{query=\"slot_entries\"} 1"));
        assert!(text.contains("scheduler_inspector_store_query_duration_seconds_count{query=\"slot_entries\"} 1"));
    }

    #[test]
    fn cache_lookups_are_split_by_cache() {
        let m = MetricsRecorder::new().unwrap();
        m.record_cache_lookup("dashboard", true);
        m.record_cache_lookup("transitions", false);
        let text = m.encode().unwrap();
        assert!(text.contains("scheduler_inspector_cache_lookups_total{cache=\"dashboard\",outcome=\"hit\"} 1"));
        assert!(text.contains("scheduler_inspector_cache_lookups_total{cache=\"transitions\",outcome=\"miss\"} 1"));
    }
}
