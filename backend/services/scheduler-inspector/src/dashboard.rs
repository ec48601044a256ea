//! Five-minute activity series for the overview dashboard.

use chrono::{DateTime, TimeZone, Utc};
use sequencing_core::constants::LAMPORTS_PER_SOL;
use sequencing_core::TimeRange;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::cache::TtlCache;
use crate::error::Result;
use crate::metrics::MetricsRecorder;
use crate::store::{ActivityWindows, BlockWindow, BundleWindow, SlotStatusWindow, SlotStore, WindowCount};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleLandingPoint {
    pub window_start: DateTime<Utc>,
    pub bundle_count: u64,
    /// Landed tips in SOL; `None` for windows without tips.
    pub total_tips_sol: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThroughputPoint {
    pub window_start: DateTime<Utc>,
    pub transaction_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryVolumePoint {
    pub window_start: DateTime<Utc>,
    pub entry_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotStatusPoint {
    pub window_start: DateTime<Utc>,
    pub status: String,
    pub slot_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMetadataPoint {
    pub window_start: DateTime<Utc>,
    pub block_count: u64,
    pub avg_total_fee_lamports: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSeries {
    pub range: TimeRange,
    pub bundles: Vec<BundleLandingPoint>,
    pub transactions: Vec<ThroughputPoint>,
    pub entries: Vec<EntryVolumePoint>,
    pub slot_status: Vec<SlotStatusPoint>,
    pub block_metadata: Vec<BlockMetadataPoint>,
}

fn window_start(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

fn lamports_to_sol(lamports: Option<u64>) -> Option<f64> {
    lamports
        .filter(|&l| l > 0)
        .map(|l| l as f64 / LAMPORTS_PER_SOL as f64)
}

impl DashboardSeries {
    /// Converts raw windows. Rows with an unrepresentable window start are
    /// dropped.
    pub fn from_windows(range: TimeRange, windows: ActivityWindows) -> Self {
        let ActivityWindows {
            bundles,
            transactions,
            entries,
            slot_status,
            block_metadata,
        } = windows;

        Self {
            range,
            bundles: bundles
                .into_iter()
                .filter_map(|BundleWindow { window_start: w, bundle_count, total_tip_lamports }| {
                    Some(BundleLandingPoint {
                        window_start: window_start(w)?,
                        bundle_count,
                        total_tips_sol: lamports_to_sol(total_tip_lamports),
                    })
                })
                .collect(),
            transactions: transactions
                .into_iter()
                .filter_map(|WindowCount { window_start: w, count }| {
                    Some(ThroughputPoint {
                        window_start: window_start(w)?,
                        transaction_count: count,
                    })
                })
                .collect(),
            entries: entries
                .into_iter()
                .filter_map(|WindowCount { window_start: w, count }| {
                    Some(EntryVolumePoint {
                        window_start: window_start(w)?,
                        entry_count: count,
                    })
                })
                .collect(),
            slot_status: slot_status
                .into_iter()
                .filter_map(|SlotStatusWindow { window_start: w, status, slot_count }| {
                    Some(SlotStatusPoint {
                        window_start: window_start(w)?,
                        status,
                        slot_count,
                    })
                })
                .collect(),
            block_metadata: block_metadata
                .into_iter()
                .filter_map(|BlockWindow { window_start: w, block_count, avg_total_fee_lamports }| {
                    Some(BlockMetadataPoint {
                        window_start: window_start(w)?,
                        block_count,
                        avg_total_fee_lamports,
                    })
                })
                .collect(),
        }
    }
}

/// Builds dashboard series, cached per range. The rolling default range
/// shares one cache slot.
pub struct DashboardService {
    store: Arc<dyn SlotStore>,
    cache: TtlCache<Arc<DashboardSeries>>,
    default_hours: i64,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl DashboardService {
    pub fn new(store: Arc<dyn SlotStore>, default_hours: i64, cache_ttl: Duration) -> Self {
        Self {
            store,
            cache: TtlCache::new(cache_ttl),
            default_hours,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn series(&self, range: Option<TimeRange>) -> Result<Arc<DashboardSeries>> {
        let key = range
            .as_ref()
            .map(TimeRange::cache_key)
            .unwrap_or_else(|| "default".to_string());

        let cached = self.cache.get(&key);
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_lookup("dashboard", cached.is_some());
        }
        if let Some(series) = cached {
            debug!(key = %key, "dashboard cache hit");
            return Ok(series);
        }

        let range = range.unwrap_or_else(|| TimeRange::last_hours(Utc::now(), self.default_hours));
        let windows = self.store.activity_windows(&range).await?;
        let series = Arc::new(DashboardSeries::from_windows(range, windows));

        info!(
            bundles = series.bundles.len(),
            transactions = series.transactions.len(),
            entries = series.entries.len(),
            "dashboard series built"
        );
        self.cache.insert(key, series.clone());
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const T0: i64 = 1_700_000_100;

    fn windows() -> ActivityWindows {
        ActivityWindows {
            bundles: vec![
                BundleWindow {
                    window_start: T0,
                    bundle_count: 3,
                    total_tip_lamports: Some(2_500_000_000),
                },
                BundleWindow {
                    window_start: T0 + 300,
                    bundle_count: 1,
                    total_tip_lamports: Some(0),
                },
                BundleWindow {
                    window_start: T0 + 600,
                    bundle_count: 0,
                    total_tip_lamports: None,
                },
            ],
            transactions: vec![WindowCount {
                window_start: T0,
                count: 42,
            }],
            entries: vec![WindowCount {
                window_start: T0,
                count: 7,
            }],
            slot_status: vec![SlotStatusWindow {
                window_start: T0,
                status: "FirstShredReceived".into(),
                slot_count: 750,
            }],
            block_metadata: vec![BlockWindow {
                window_start: T0,
                block_count: 750,
                avg_total_fee_lamports: Some(12_345.5),
            }],
        }
    }

    #[test]
    fn tips_become_sol_and_empty_windows_null() {
        let range = TimeRange::last_hours(Utc::now(), 1);
        let series = DashboardSeries::from_windows(range, windows());
        let tips: Vec<Option<f64>> = series.bundles.iter().map(|b| b.total_tips_sol).collect();
        assert_eq!(tips, vec![Some(2.5), None, None]);
        assert_eq!(series.transactions[0].transaction_count, 42);
        assert_eq!(series.transactions[0].window_start.timestamp(), T0);
        assert_eq!(series.slot_status[0].status, "FirstShredReceived");

        let json = serde_json::to_value(&series).unwrap();
        assert_eq!(json["blockMetadata"][0]["avgTotalFeeLamports"], 12_345.5);
        assert!(json["bundles"][1]["totalTipsSol"].is_null());
    }

    #[tokio::test]
    async fn default_range_is_cached() {
        let store = Arc::new(MemoryStore::new());
        store.set_activity_windows(windows());
        let service = DashboardService::new(store.clone(), 6, Duration::from_secs(60));

        let first = service.series(None).await.unwrap();
        assert_eq!(first.range.to - first.range.from, chrono::Duration::hours(6));

        store.set_activity_windows(ActivityWindows::default());
        let second = service.series(None).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let explicit = service
            .series(Some(TimeRange::last_hours(Utc::now(), 1)))
            .await
            .unwrap();
        assert!(explicit.bundles.is_empty());
    }
}
