use futures::stream::{self, StreamExt};
use sequencing_core::{
    classify_producer, enrich_slot, Classification, EnrichedSlot, ProducerClassification,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{InspectorError, Result};
use crate::metrics::MetricsRecorder;
use crate::store::SlotStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerFailure {
    pub identity: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotFailure {
    pub identity: String,
    pub slot: u64,
    pub error: String,
}

/// Enriched recent slots of one producer and the ones that failed to load.
#[derive(Debug, Clone, Default)]
pub struct LoadedSlots {
    pub slots: Vec<EnrichedSlot>,
    pub failed: Vec<SlotFailure>,
}

/// A producer's label together with the recent slots left out of the vote.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerReport {
    #[serde(flatten)]
    pub classification: ProducerClassification,
    pub failed_slots: Vec<SlotFailure>,
}

/// Result of a batch run. Every requested producer has a label; producers
/// that failed are labelled `Other` and listed in `errors`. Slots skipped
/// for producers that still got a label are listed in `failed_slots`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub classifications: BTreeMap<String, Classification>,
    pub producers: Vec<ProducerClassification>,
    pub errors: Vec<ProducerFailure>,
    pub failed_slots: Vec<SlotFailure>,
}

impl BatchOutcome {
    pub fn count(&self, label: Classification) -> usize {
        self.classifications.values().filter(|&&l| l == label).count()
    }
}

/// Classifies producers with bounded concurrency. Each producer is an
/// independent unit of work with its own slot fetches and tick resolution.
pub struct BatchClassifier {
    store: Arc<dyn SlotStore>,
    window: usize,
    width: usize,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl BatchClassifier {
    pub fn new(store: Arc<dyn SlotStore>, window: usize, width: usize) -> Self {
        Self {
            store,
            window: window.max(1),
            width: width.max(1),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Fetches and enriches the producer's most recent slots. Slots that
    /// fail to load are skipped and reported; if every recent slot fails the
    /// producer cannot be classified and an error is returned.
    pub async fn recent_enriched_slots(&self, identity: &str, window: usize) -> Result<LoadedSlots> {
        let recent = self.store.recent_slots(identity, window).await?;

        let fetched = futures::future::join_all(
            recent.iter().map(|r| self.store.fetch_slot_input(r.slot)),
        )
        .await;

        let mut loaded = LoadedSlots::default();
        for (recent, input) in recent.iter().zip(fetched) {
            match input {
                Ok(input) => {
                    let enriched = enrich_slot(input);
                    if let Some(metrics) = &self.metrics {
                        metrics.record_slot(&enriched);
                    }
                    loaded.slots.push(enriched);
                }
                Err(e) => {
                    warn!(identity, slot = recent.slot, error = %e, "skipping slot");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_slot_failure();
                    }
                    loaded.failed.push(SlotFailure {
                        identity: identity.to_string(),
                        slot: recent.slot,
                        error: e.to_string(),
                    });
                }
            }
        }

        if loaded.slots.is_empty() && !loaded.failed.is_empty() {
            return Err(InspectorError::StoreUnavailable(format!(
                "all {} recent slots of {identity} failed to load",
                loaded.failed.len()
            )));
        }
        Ok(loaded)
    }

    pub async fn classify(&self, identity: &str, window: usize) -> Result<ProducerReport> {
        let loaded = self.recent_enriched_slots(identity, window).await?;
        let classification = classify_producer(identity, &loaded.slots);
        if let Some(metrics) = &self.metrics {
            metrics.record_classification(classification.label);
        }
        Ok(ProducerReport {
            classification,
            failed_slots: loaded.failed,
        })
    }

    pub async fn classify_all(&self, identities: Vec<String>) -> BatchOutcome {
        self.classify_all_with(identities, self.window, self.width).await
    }

    pub async fn classify_all_with(&self, identities: Vec<String>, window: usize, width: usize) -> BatchOutcome {
        let total = identities.len();
        let (window, width) = (window.max(1), width.max(1));
        info!(total, width, window, "classifying producers");

        // `buffered` yields in submission order, so progress lines stay ordered
        let results: Vec<(usize, String, Result<ProducerReport>)> = stream::iter(identities.into_iter().enumerate())
            .map(|(i, identity)| async move {
                let result = self.classify(&identity, window).await;
                (i, identity, result)
            })
            .buffered(width)
            .collect()
            .await;

        let mut outcome = BatchOutcome::default();
        for (i, identity, result) in results {
            match result {
                Ok(report) => {
                    let producer = report.classification;
                    let progress = format!("{}/{}", i + 1, total);
                    info!(
                        progress = %progress,
                        identity = %identity,
                        label = %producer.label,
                        valid_slots = producer.valid_slot_count,
                        skipped_slots = report.failed_slots.len(),
                        "classified"
                    );
                    outcome.classifications.insert(identity, producer.label);
                    outcome.producers.push(producer);
                    outcome.failed_slots.extend(report.failed_slots);
                }
                Err(e) => {
                    error!(identity = %identity, error = %e, "classification failed");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_producer_failure();
                    }
                    outcome
                        .classifications
                        .insert(identity.clone(), Classification::Other);
                    outcome.errors.push(ProducerFailure {
                        identity,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            rev = outcome.count(Classification::SecondHalfDominant),
            vanilla = outcome.count(Classification::Other),
            failed = outcome.errors.len(),
            skipped_slots = outcome.failed_slots.len(),
            "batch complete"
        );
        outcome
    }
}
