//! Prop-AMM first-win rates per producer over an epoch, the last few hours
//! or a caller-chosen slot range.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sequencing_core::{
    first_wins, win_rates, PropAmmFirstWin, SlotRange, ValidatorWinRate, PROP_AMM_ACCOUNTS,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::config::Config;
use crate::error::{InspectorError, Result};
use crate::metrics::MetricsRecorder;
use crate::store::{EpochRange, SlotStore};

const RECENT_KEY: &str = "recent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WinSource {
    Epoch,
    Recent,
    Custom,
}

/// First wins over one slot range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinData {
    pub source: WinSource,
    pub label: String,
    pub epoch: Option<u64>,
    pub start_slot: u64,
    pub end_slot: u64,
    pub generated_at: DateTime<Utc>,
    pub wins: Vec<PropAmmFirstWin>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinrateReport {
    #[serde(flatten)]
    pub data: WinData,
    /// Producers with the most slots first, at most the requested limit.
    pub validators: Vec<ValidatorWinRate>,
    pub total_validators: usize,
}

impl WinrateReport {
    pub fn new(data: WinData, limit: usize) -> Self {
        let mut validators = win_rates(&data.wins);
        let total_validators = validators.len();
        validators.truncate(limit);
        Self {
            data,
            validators,
            total_validators,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WinrateSettings {
    pub recent_hours: u32,
    pub recent_chunk_slots: u64,
    pub epoch_chunk_slots: u64,
    pub recent_ttl: Duration,
    pub max_custom_slots: u64,
}

impl WinrateSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            recent_hours: config.prop_amm_recent_hours,
            recent_chunk_slots: config.prop_amm_recent_chunk_slots,
            epoch_chunk_slots: config.prop_amm_epoch_chunk_slots,
            recent_ttl: config.prop_amm_cache_ttl(),
            max_custom_slots: config.prop_amm_max_custom_slots,
        }
    }
}

impl Default for WinrateSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Computes first wins chunk by chunk. Recent results expire after a TTL;
/// an epoch result is kept until a newer epoch completes.
pub struct PropAmmAnalyzer {
    store: Arc<dyn SlotStore>,
    accounts: Vec<String>,
    settings: WinrateSettings,
    recent: TtlCache<Arc<WinData>>,
    epoch: RwLock<Option<Arc<WinData>>>,
    epoch_refresh: Mutex<()>,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl PropAmmAnalyzer {
    pub fn new(store: Arc<dyn SlotStore>, settings: WinrateSettings) -> Self {
        Self {
            store,
            accounts: PROP_AMM_ACCOUNTS.iter().map(|p| p.account.to_string()).collect(),
            recent: TtlCache::new(settings.recent_ttl),
            settings,
            epoch: RwLock::new(None),
            epoch_refresh: Mutex::new(()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn record_lookup(&self, cache: &str, hit: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_lookup(cache, hit);
        }
    }

    async fn collect_wins(&self, range: SlotRange, chunk_slots: u64) -> Result<Vec<PropAmmFirstWin>> {
        let mut wins = Vec::new();
        // chunks never share a slot, so per-chunk winners are final
        for chunk in range.chunks(chunk_slots) {
            let touches = self.store.prop_amm_touches(chunk, &self.accounts).await?;
            let chunk_wins = first_wins(touches);
            debug!(start = chunk.start, end = chunk.end, wins = chunk_wins.len(), "prop-AMM chunk");
            wins.extend(chunk_wins);
        }
        Ok(wins)
    }

    /// Uncached wins over an explicit range. Bounds may come in either order.
    pub async fn custom(&self, start: u64, end: u64) -> Result<WinData> {
        let range = SlotRange::new(start, end);
        if range.span() > self.settings.max_custom_slots {
            return Err(InspectorError::InvalidInput(format!(
                "slot range too large (>{}), narrow the window",
                self.settings.max_custom_slots
            )));
        }
        let wins = self.collect_wins(range, self.settings.epoch_chunk_slots).await?;
        Ok(WinData {
            source: WinSource::Custom,
            label: format!("Slots {}-{}", range.start, range.end),
            epoch: None,
            start_slot: range.start,
            end_slot: range.end,
            generated_at: Utc::now(),
            wins,
        })
    }

    /// Wins over the last few hours of produced slots.
    pub async fn recent(&self) -> Result<Arc<WinData>> {
        let cached = self.recent.get(RECENT_KEY);
        self.record_lookup("prop_amm_recent", cached.is_some());
        if let Some(data) = cached {
            return Ok(data);
        }

        let hours = self.settings.recent_hours;
        let range = self.store.recent_slot_range(hours).await?.ok_or_else(|| {
            InspectorError::NotFound(format!("no produced slots in the last {hours} hours"))
        })?;
        let wins = self.collect_wins(range, self.settings.recent_chunk_slots).await?;
        if wins.is_empty() {
            return Err(InspectorError::NotFound(
                "no recent prop-AMM transactions in the requested window".into(),
            ));
        }

        let data = Arc::new(WinData {
            source: WinSource::Recent,
            label: format!("Recent (~{hours} hours)"),
            epoch: None,
            start_slot: range.start,
            end_slot: range.end,
            generated_at: Utc::now(),
            wins,
        });
        info!(start = range.start, end = range.end, wins = data.wins.len(), "recent prop-AMM wins computed");
        self.recent.insert(RECENT_KEY, data.clone());
        Ok(data)
    }

    /// Wins over the latest completed epoch.
    pub async fn latest_epoch(&self) -> Result<Arc<WinData>> {
        let EpochRange { epoch, range } = self
            .store
            .latest_completed_epoch()
            .await?
            .ok_or_else(|| InspectorError::NotFound("no completed epoch".into()))?;

        if let Some(data) = self.cached_epoch(epoch) {
            return Ok(data);
        }

        let _guard = self.epoch_refresh.lock().await;
        // another request may have finished the scan while we waited
        if let Some(data) = self.cached_epoch(epoch) {
            return Ok(data);
        }

        let wins = self.collect_wins(range, self.settings.epoch_chunk_slots).await?;
        let data = Arc::new(WinData {
            source: WinSource::Epoch,
            label: format!("Epoch {epoch}"),
            epoch: Some(epoch),
            start_slot: range.start,
            end_slot: range.end,
            generated_at: Utc::now(),
            wins,
        });
        info!(epoch, start = range.start, end = range.end, wins = data.wins.len(), "epoch prop-AMM wins computed");
        *self.epoch.write() = Some(data.clone());
        Ok(data)
    }

    fn cached_epoch(&self, epoch: u64) -> Option<Arc<WinData>> {
        let cached = self
            .epoch
            .read()
            .as_ref()
            .filter(|d| d.epoch == Some(epoch))
            .cloned();
        self.record_lookup("prop_amm_epoch", cached.is_some());
        cached
    }

    /// Latest completed epoch, falling back to recent slots when the epoch
    /// cannot be determined or scanned.
    pub async fn default_wins(&self) -> Result<Arc<WinData>> {
        match self.latest_epoch().await {
            Ok(data) => Ok(data),
            Err(e) => {
                warn!(error = %e, "epoch prop-AMM wins unavailable, using recent slots");
                self.recent().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use sequencing_core::{PropAmmGroup, PropAmmTouch};

    const HUMI: &str = "9YW7Rc8ongNLedz9YBp5hVYwdEJHuHbQkUf3fZocNkHN";
    const TESS: &str = "FVnv5qH7dsrBzEDwJ8dN2m9PFtKTBAQFtqWF3M9LpwMg";

    fn touch(slot: u64, index: u64, validator: &str, account: &str) -> PropAmmTouch {
        PropAmmTouch {
            slot,
            transaction_index: index,
            signature: format!("{slot}-{index}"),
            validator: validator.to_string(),
            account: account.to_string(),
        }
    }

    fn settings() -> WinrateSettings {
        WinrateSettings {
            recent_hours: 6,
            recent_chunk_slots: 20,
            epoch_chunk_slots: 10,
            recent_ttl: Duration::from_secs(300),
            max_custom_slots: 100,
        }
    }

    fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.add_touches([
            touch(100, 5, "v1", HUMI),
            touch(100, 2, "v1", TESS),
            touch(109, 0, "v1", HUMI),
            touch(110, 1, "v2", TESS),
            touch(125, 3, "v2", HUMI),
        ]);
        store
    }

    #[tokio::test]
    async fn custom_range_is_chunked() {
        let store = store();
        let analyzer = PropAmmAnalyzer::new(store.clone(), settings());

        let data = analyzer.custom(125, 100).await.unwrap();
        assert_eq!((data.start_slot, data.end_slot), (100, 125));
        assert_eq!(data.source, WinSource::Custom);
        assert_eq!(store.touch_queries(), 3);

        let slots: Vec<u64> = data.wins.iter().map(|w| w.slot).collect();
        assert_eq!(slots, vec![100, 109, 110, 125]);
        assert_eq!(data.wins[0].group, Some(PropAmmGroup::Tess));

        let report = WinrateReport::new(data, 1);
        assert_eq!(report.total_validators, 2);
        assert_eq!(report.validators.len(), 1);
        assert_eq!(report.validators[0].validator, "v1");
    }

    #[tokio::test]
    async fn oversized_custom_range_is_rejected() {
        let analyzer = PropAmmAnalyzer::new(store(), settings());
        let err = analyzer.custom(0, 1_000).await.unwrap_err();
        assert!(matches!(err, InspectorError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn epoch_result_is_reused_until_the_next_epoch() {
        let store = store();
        store.set_completed_epoch(Some(EpochRange {
            epoch: 700,
            range: SlotRange::new(100, 119),
        }));
        let analyzer = PropAmmAnalyzer::new(store.clone(), settings());

        let first = analyzer.default_wins().await.unwrap();
        assert_eq!(first.label, "Epoch 700");
        assert_eq!(first.wins.len(), 3);
        let queries = store.touch_queries();

        let again = analyzer.default_wins().await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(store.touch_queries(), queries);

        store.set_completed_epoch(Some(EpochRange {
            epoch: 701,
            range: SlotRange::new(120, 139),
        }));
        let next = analyzer.default_wins().await.unwrap();
        assert_eq!(next.epoch, Some(701));
        assert_eq!(next.wins.len(), 1);
    }

    #[tokio::test]
    async fn falls_back_to_recent_slots() {
        let store = store();
        let analyzer = PropAmmAnalyzer::new(store.clone(), settings());
        // neither an epoch nor recent slots
        assert!(analyzer.default_wins().await.is_err());

        store.set_recent_range(Some(SlotRange::new(105, 115)));
        let data = analyzer.default_wins().await.unwrap();
        assert_eq!(data.source, WinSource::Recent);
        assert_eq!(data.label, "Recent (~6 hours)");
        assert_eq!(data.wins.len(), 2);

        let cached = analyzer.recent().await.unwrap();
        assert!(Arc::ptr_eq(&data, &cached));
    }

    #[tokio::test]
    async fn recent_window_without_wins_is_an_error() {
        let store = store();
        store.set_recent_range(Some(SlotRange::new(200, 300)));
        let analyzer = PropAmmAnalyzer::new(store, settings());
        assert!(matches!(
            analyzer.recent().await,
            Err(InspectorError::NotFound(_))
        ));
    }
}
