use sequencing_core::transitions::{build_report, SlotSummary, TrackedTypes, TransitionReport};
use sequencing_core::validators::ValidatorSnapshot;
use sequencing_core::TimeRange;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cache::TtlCache;
use crate::error::Result;
use crate::metrics::MetricsRecorder;
use crate::store::{SlotActivity, SlotStore};
use crate::validators_app::ValidatorDirectory;

/// Tags per-slot activity with the producer's software client and name.
pub fn summarize(activity: Vec<SlotActivity>, snapshot: &ValidatorSnapshot) -> Vec<SlotSummary> {
    activity
        .into_iter()
        .map(|a| SlotSummary {
            producer_name: snapshot.name(&a.producer).map(str::to_string),
            producer_type: snapshot.software_client(&a.producer).to_string(),
            slot: a.slot,
            producer: a.producer,
            tracked_tx_count: a.tracked_tx_count,
            total_tx_count: a.total_tx_count,
            total_compute_units: a.total_compute_units,
        })
        .collect()
}

/// Leader transition reports over a time range, cached per range and
/// account set.
pub struct TransitionAnalyzer {
    store: Arc<dyn SlotStore>,
    directory: Arc<ValidatorDirectory>,
    cache: TtlCache<Arc<TransitionReport>>,
    tracked_types: TrackedTypes,
    reference_type: String,
    default_accounts: Vec<String>,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl TransitionAnalyzer {
    pub fn new(
        store: Arc<dyn SlotStore>,
        directory: Arc<ValidatorDirectory>,
        tracked_types: TrackedTypes,
        reference_type: impl Into<String>,
        default_accounts: Vec<String>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            store,
            directory,
            cache: TtlCache::new(cache_ttl),
            tracked_types,
            reference_type: reference_type.into(),
            default_accounts,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn report(&self, range: TimeRange, accounts: Option<Vec<String>>) -> Result<Arc<TransitionReport>> {
        let key = format!(
            "{}-{}",
            range.cache_key(),
            accounts.as_ref().map(|a| a.join(",")).unwrap_or_else(|| "default".to_string())
        );

        let cached = self.cache.get(&key);
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_lookup("transitions", cached.is_some());
        }
        if let Some(report) = cached {
            return Ok(report);
        }

        let accounts = accounts.unwrap_or_else(|| self.default_accounts.clone());
        let (activity, snapshot) = tokio::join!(
            self.store.slot_sequence(&range, &accounts),
            self.directory.snapshot()
        );
        let sequence = summarize(activity?, &snapshot);
        let report = Arc::new(build_report(&sequence, &self.tracked_types, &self.reference_type));

        info!(
            slots = sequence.len(),
            transitions = report.transitions.len(),
            pairs = report.stats.len(),
            "transition report built"
        );
        self.cache.insert(key, report.clone());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::validators_app::ValidatorSource;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use sequencing_core::validators::{RawValidator, AGAVE_BAM, HARMONIC};
    use std::collections::HashSet;

    struct StaticSource;

    #[async_trait]
    impl ValidatorSource for StaticSource {
        async fn fetch_validators(&self) -> Result<Vec<RawValidator>> {
            Ok(vec![
                RawValidator {
                    account: "bam-leader".into(),
                    name: Some("Bam Leader".into()),
                    active_stake: Some(100),
                    software_client: Some("Agave".into()),
                },
                RawValidator {
                    account: "harmonic-leader".into(),
                    name: None,
                    active_stake: Some(50),
                    software_client: None,
                },
            ])
        }

        async fn fetch_bam_validators(&self) -> Result<HashSet<String>> {
            Ok(["bam-leader".to_string()].into_iter().collect())
        }
    }

    fn activity(slot: u64, producer: &str, tracked: u64) -> SlotActivity {
        SlotActivity {
            slot,
            producer: producer.to_string(),
            tracked_tx_count: tracked,
            total_tx_count: 100,
            total_compute_units: 1_000_000,
        }
    }

    fn analyzer(store: Arc<MemoryStore>) -> TransitionAnalyzer {
        let directory = Arc::new(ValidatorDirectory::new(
            Arc::new(StaticSource),
            Duration::from_secs(1800),
        ));
        TransitionAnalyzer::new(
            store,
            directory,
            TrackedTypes::default(),
            AGAVE_BAM,
            Vec::new(),
            Duration::from_secs(600),
        )
    }

    fn range() -> TimeRange {
        TimeRange::last_hours(Utc.timestamp_opt(1_700_000_000, 0).unwrap(), 2)
    }

    #[tokio::test]
    async fn tags_slots_and_finds_transitions() {
        let store = Arc::new(MemoryStore::new());
        store.set_sequence(vec![
            activity(1, "bam-leader", 4),
            activity(2, "bam-leader", 4),
            activity(3, "harmonic-leader", 1),
            activity(4, "harmonic-leader", 1),
        ]);

        let report = analyzer(store).report(range(), None).await.unwrap();
        assert_eq!(report.transitions.len(), 1);
        let t = &report.transitions[0];
        assert_eq!(t.from.producer_type, AGAVE_BAM);
        assert_eq!(t.to.producer_type, HARMONIC);
        assert_eq!(t.from.producer_name.as_deref(), Some("Bam Leader"));
        assert_eq!(report.stats[0].transition_type, "AgaveBam → Harmonic");
        assert_eq!(report.avg_tracked_tx_per_reference_slot, 4.0);
    }

    #[tokio::test]
    async fn cached_per_range_and_accounts() {
        let store = Arc::new(MemoryStore::new());
        store.set_sequence(vec![activity(1, "bam-leader", 4), activity(2, "harmonic-leader", 1)]);
        let analyzer = analyzer(store.clone());

        let first = analyzer.report(range(), None).await.unwrap();
        store.set_sequence(Vec::new());
        let second = analyzer.report(range(), None).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other_accounts = analyzer
            .report(range(), Some(vec!["acct".into()]))
            .await
            .unwrap();
        assert!(other_accounts.transitions.is_empty());
    }
}
