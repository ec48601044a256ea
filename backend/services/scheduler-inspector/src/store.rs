//! Data access for geyser slot data.
//!
//! Every identity column is base58 encoded inside the query so leaders,
//! bundle producers and signatures compare as plain strings on this side.

use async_trait::async_trait;
use clickhouse::{Client, Row};
use dashmap::DashMap;
use parking_lot::RwLock;
use sequencing_core::{
    Entry, LandedBundle, PropAmmTouch, Slot, SlotInput, SlotMetadata, SlotRange, SourcedEntry,
    StaticAccounts, TimeRange, Transaction,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{InspectorError, Result};
use crate::metrics::MetricsRecorder;

/// A slot produced by a given validator.
#[derive(Debug, Clone, PartialEq, Eq, Row, Serialize, Deserialize)]
pub struct RecentSlot {
    pub slot: u64,
    pub block_height: u64,
    pub total_fee_lamports: u64,
}

/// Per-slot producer and transaction volume over a time range.
#[derive(Debug, Clone, PartialEq, Eq, Row, Serialize, Deserialize)]
pub struct SlotActivity {
    pub slot: u64,
    pub producer: String,
    pub tracked_tx_count: u64,
    pub total_tx_count: u64,
    pub total_compute_units: u64,
}

/// Row count of one five-minute window. `window_start` is in unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Row, Serialize, Deserialize)]
pub struct WindowCount {
    pub window_start: i64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Row, Serialize, Deserialize)]
pub struct BundleWindow {
    pub window_start: i64,
    pub bundle_count: u64,
    pub total_tip_lamports: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Row, Serialize, Deserialize)]
pub struct SlotStatusWindow {
    pub window_start: i64,
    pub status: String,
    pub slot_count: u64,
}

#[derive(Debug, Clone, PartialEq, Row, Serialize, Deserialize)]
pub struct BlockWindow {
    pub window_start: i64,
    pub block_count: u64,
    pub avg_total_fee_lamports: Option<f64>,
}

/// Five-minute activity windows of every geyser table over a time range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityWindows {
    pub bundles: Vec<BundleWindow>,
    pub transactions: Vec<WindowCount>,
    pub entries: Vec<WindowCount>,
    pub slot_status: Vec<SlotStatusWindow>,
    pub block_metadata: Vec<BlockWindow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochRange {
    pub epoch: u64,
    pub range: SlotRange,
}

#[async_trait]
pub trait SlotStore: Send + Sync {
    async fn slot_metadata(&self, slot: Slot) -> Result<Option<SlotMetadata>>;

    /// Entries from every geyser source, tagged with their source.
    async fn slot_entries(&self, slot: Slot) -> Result<Vec<SourcedEntry>>;

    /// Non-redundant transactions ordered by index.
    async fn slot_transactions(&self, slot: Slot) -> Result<Vec<Transaction>>;

    async fn slot_bundles(&self, slot: Slot) -> Result<Vec<LandedBundle>>;

    /// Most recent slots produced by `identity`, newest first.
    async fn recent_slots(&self, identity: &str, limit: usize) -> Result<Vec<RecentSlot>>;

    /// Slots produced within `range` in slot order, with the number of
    /// non-vote transactions touching any of `tracked_accounts`.
    async fn slot_sequence(&self, range: &TimeRange, tracked_accounts: &[String]) -> Result<Vec<SlotActivity>>;

    /// Producer identities starting with `prefix`.
    async fn search_validators(&self, prefix: &str, limit: usize) -> Result<Vec<String>>;

    async fn activity_windows(&self, range: &TimeRange) -> Result<ActivityWindows>;

    /// Non-vote transactions in `range` touching any of `accounts`, each
    /// with the first matching static key and the slot producer.
    async fn prop_amm_touches(&self, range: SlotRange, accounts: &[String]) -> Result<Vec<PropAmmTouch>>;

    /// Slots produced within the last `hours`, `None` when there are none.
    async fn recent_slot_range(&self, hours: u32) -> Result<Option<SlotRange>>;

    /// The epoch before the newest one seen, with its slot bounds.
    async fn latest_completed_epoch(&self) -> Result<Option<EpochRange>>;

    /// Everything needed to enrich one slot. A missing metadata row yields
    /// the `Unknown` placeholder; a failed bundle query yields no bundles.
    async fn fetch_slot_input(&self, slot: Slot) -> Result<SlotInput> {
        let (metadata, entries, transactions, bundles) = tokio::join!(
            self.slot_metadata(slot),
            self.slot_entries(slot),
            self.slot_transactions(slot),
            self.slot_bundles(slot),
        );

        let metadata = metadata?.unwrap_or_else(|| SlotMetadata::unknown(slot));
        let bundles = bundles.unwrap_or_else(|e| {
            warn!(slot, error = %e, "bundle query failed, continuing without bundles");
            Vec::new()
        });

        Ok(SlotInput {
            metadata,
            entries: entries?,
            transactions: transactions?,
            bundles,
        })
    }
}

#[derive(Row, Deserialize)]
struct MetadataRow {
    slot: u64,
    leader: String,
    block_height: u64,
    total_fee_lamports: u64,
    first_shred_time_ms: Option<i64>,
    prev_slot_first_shred_time_ms: Option<i64>,
    last_shred_time_ms: Option<i64>,
}

impl From<MetadataRow> for SlotMetadata {
    fn from(row: MetadataRow) -> Self {
        SlotMetadata {
            slot: row.slot,
            leader: row.leader,
            block_height: row.block_height,
            total_fee_lamports: row.total_fee_lamports,
            first_shred_time_ms: row.first_shred_time_ms,
            prev_slot_first_shred_time_ms: row.prev_slot_first_shred_time_ms,
            last_shred_time_ms: row.last_shred_time_ms,
        }
    }
}

#[derive(Row, Deserialize)]
struct EntryRow {
    source: String,
    index: u64,
    executed_transaction_count: u64,
    time_ms: Option<i64>,
    num_hashes: Option<u64>,
}

impl From<EntryRow> for SourcedEntry {
    fn from(row: EntryRow) -> Self {
        SourcedEntry {
            source: row.source,
            entry: Entry {
                index: row.index,
                executed_transaction_count: row.executed_transaction_count,
                time_ms: row.time_ms,
                num_hashes: row.num_hashes,
            },
        }
    }
}

#[derive(Row, Deserialize)]
struct TransactionRow {
    index: u64,
    signature: String,
    is_vote: u8,
    compute_units_consumed: Option<u64>,
    fee_lamports: u64,
    time_ms: Option<i64>,
    compute_units_requested: Option<u64>,
    compute_unit_price: Option<u64>,
    signed_writable: Vec<String>,
    signed_readonly: Vec<String>,
    unsigned_writable: Vec<String>,
    unsigned_readonly: Vec<String>,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        Transaction {
            index: row.index,
            signature: row.signature,
            is_vote: row.is_vote != 0,
            compute_units_consumed: row.compute_units_consumed,
            fee_lamports: row.fee_lamports,
            time_ms: row.time_ms,
            compute_units_requested: row.compute_units_requested,
            compute_unit_price: row.compute_unit_price,
            static_accounts: StaticAccounts {
                signed_writable: row.signed_writable,
                signed_readonly: row.signed_readonly,
                unsigned_writable: row.unsigned_writable,
                unsigned_readonly: row.unsigned_readonly,
            },
        }
    }
}

#[derive(Row, Deserialize)]
struct BundleRow {
    bundle_id: String,
    producer_identity: Option<String>,
    tip_lamports: u64,
    member_signatures: Vec<String>,
}

impl From<BundleRow> for LandedBundle {
    fn from(row: BundleRow) -> Self {
        LandedBundle {
            bundle_id: row.bundle_id,
            producer_identity: row.producer_identity.filter(|p| !p.is_empty()),
            tip_lamports: row.tip_lamports,
            member_signatures: row.member_signatures,
        }
    }
}

#[derive(Row, Deserialize)]
struct ValidatorRow {
    validator: String,
}

#[derive(Row, Deserialize)]
struct TouchRow {
    slot: u64,
    transaction_index: u64,
    signature: String,
    validator: String,
    account: String,
}

impl From<TouchRow> for PropAmmTouch {
    fn from(row: TouchRow) -> Self {
        PropAmmTouch {
            slot: row.slot,
            transaction_index: row.transaction_index,
            signature: row.signature,
            validator: row.validator,
            account: row.account,
        }
    }
}

#[derive(Row, Deserialize)]
struct SlotBoundsRow {
    epoch: u64,
    slot_count: u64,
    min_slot: u64,
    max_slot: u64,
}

const METADATA_QUERY: &str = "
    SELECT
        toUInt64(bm.slot) AS slot,
        base58Encode(bm.validator_identity) AS leader,
        toUInt64(bm.block_height) AS block_height,
        toUInt64(bm.total_fee_lamports) AS total_fee_lamports,
        (SELECT toNullable(toUnixTimestamp64Milli(time)) FROM bam.geyser_slot_status
            WHERE slot = ? AND status = 'FirstShredReceived' ORDER BY time LIMIT 1) AS first_shred_time_ms,
        (SELECT toNullable(toUnixTimestamp64Milli(time)) FROM bam.geyser_slot_status
            WHERE slot = ? AND status = 'FirstShredReceived' ORDER BY time LIMIT 1) AS prev_slot_first_shred_time_ms,
        (SELECT toNullable(toUnixTimestamp64Milli(time)) FROM bam.geyser_slot_status
            WHERE slot = ? AND status = 'LastShredReceived' ORDER BY time DESC LIMIT 1) AS last_shred_time_ms
    FROM bam.geyser_block_metadata bm
    WHERE bm.slot = ?
    LIMIT 1";

const ENTRIES_QUERY: &str = "
    SELECT
        toString(source) AS source,
        toUInt64(index) AS index,
        toUInt64(executed_transaction_count) AS executed_transaction_count,
        toNullable(toUnixTimestamp64Milli(time)) AS time_ms,
        CAST(num_hashes AS Nullable(UInt64)) AS num_hashes
    FROM bam.geyser_entries
    WHERE slot = ?
    ORDER BY source, index";

// older schemas lack num_hashes
const ENTRIES_QUERY_NO_HASHES: &str = "
    SELECT
        toString(source) AS source,
        toUInt64(index) AS index,
        toUInt64(executed_transaction_count) AS executed_transaction_count,
        toNullable(toUnixTimestamp64Milli(time)) AS time_ms,
        CAST(NULL AS Nullable(UInt64)) AS num_hashes
    FROM bam.geyser_entries
    WHERE slot = ?
    ORDER BY source, index";

// redundant geyser rows collapse on (signature, index, is_vote); time is averaged
const TRANSACTIONS_QUERY: &str = "
    SELECT
        toUInt64(index) AS index,
        base58Encode(signature) AS signature,
        toUInt8(is_vote) AS is_vote,
        CAST(any(compute_units_consumed) AS Nullable(UInt64)) AS compute_units_consumed,
        toUInt64(ifNull(any(fee), 0)) AS fee_lamports,
        toNullable(toInt64(avg(toUnixTimestamp64Milli(time)))) AS time_ms,
        CAST(any(compute_units_requested) AS Nullable(UInt64)) AS compute_units_requested,
        CAST(any(compute_unit_price) AS Nullable(UInt64)) AS compute_unit_price,
        arrayMap(x -> base58Encode(x), coalesce(any(static_signed_writable_accounts), [])) AS signed_writable,
        arrayMap(x -> base58Encode(x), coalesce(any(static_signed_readonly_accounts), [])) AS signed_readonly,
        arrayMap(x -> base58Encode(x), coalesce(any(static_unsigned_writable_accounts), [])) AS unsigned_writable,
        arrayMap(x -> base58Encode(x), coalesce(any(static_unsigned_readonly_accounts), [])) AS unsigned_readonly
    FROM bam.geyser_transactions
    WHERE slot = ?
    GROUP BY signature, index, is_vote
    ORDER BY index";

const BUNDLES_QUERY: &str = "
    SELECT
        base58Encode(bundle_id) AS bundle_id,
        if(isNull(validator), NULL, base58Encode(assumeNotNull(validator))) AS producer_identity,
        toUInt64(landed_tip_lamports) AS tip_lamports,
        arrayMap(x -> base58Encode(x), tx_signatures) AS member_signatures
    FROM bundles.bundles_landed_v2
    WHERE slot = ?
    ORDER BY landed_tip_lamports DESC";

const RECENT_SLOTS_QUERY: &str = "
    SELECT
        toUInt64(slot) AS slot,
        toUInt64(any(block_height)) AS block_height,
        toUInt64(any(total_fee_lamports)) AS total_fee_lamports
    FROM bam.geyser_block_metadata
    WHERE validator_identity = base58Decode(?)
    GROUP BY slot
    ORDER BY slot DESC
    LIMIT ?";

const SLOT_SEQUENCE_QUERY: &str = "
    SELECT
        toUInt64(bm.slot) AS slot,
        bm.producer AS producer,
        toUInt64(ifNull(tx.tracked_tx_count, 0)) AS tracked_tx_count,
        toUInt64(ifNull(tx.total_tx_count, 0)) AS total_tx_count,
        toUInt64(ifNull(tx.total_compute_units, 0)) AS total_compute_units
    FROM (
        SELECT slot, base58Encode(any(validator_identity)) AS producer
        FROM bam.geyser_block_metadata
        WHERE time BETWEEN parseDateTimeBestEffort(?) AND parseDateTimeBestEffort(?)
        GROUP BY slot
    ) AS bm
    LEFT JOIN (
        SELECT
            slot,
            countIf(tracked) AS tracked_tx_count,
            count() AS total_tx_count,
            sum(cu) AS total_compute_units
        FROM (
            SELECT
                slot,
                signature,
                any(ifNull(compute_units_consumed, 0)) AS cu,
                hasAny(
                    arrayMap(x -> base58Encode(x), arrayConcat(
                        coalesce(any(static_signed_writable_accounts), []),
                        coalesce(any(static_signed_readonly_accounts), []),
                        coalesce(any(static_unsigned_writable_accounts), []),
                        coalesce(any(static_unsigned_readonly_accounts), [])
                    )),
                    ?
                ) AS tracked
            FROM bam.geyser_transactions
            WHERE time BETWEEN parseDateTimeBestEffort(?) AND parseDateTimeBestEffort(?)
              AND is_vote = 0
            GROUP BY slot, signature
        )
        GROUP BY slot
    ) AS tx ON tx.slot = bm.slot
    ORDER BY bm.slot";

const SEARCH_VALIDATORS_QUERY: &str = "
    SELECT DISTINCT base58Encode(validator_identity) AS validator
    FROM bam.geyser_block_metadata
    WHERE startsWith(base58Encode(validator_identity), ?)
    LIMIT ?";

const BUNDLE_WINDOWS_QUERY: &str = "
    SELECT
        toInt64(toUnixTimestamp(toStartOfInterval(time, INTERVAL 5 minute))) AS window_start,
        count() AS bundle_count,
        CAST(sumOrNull(landed_tip_lamports) AS Nullable(UInt64)) AS total_tip_lamports
    FROM bundles.bundles_landed_v2
    WHERE time BETWEEN parseDateTimeBestEffort(?) AND parseDateTimeBestEffort(?)
    GROUP BY window_start
    ORDER BY window_start";

const TRANSACTION_WINDOWS_QUERY: &str = "
    SELECT
        toInt64(toUnixTimestamp(toStartOfInterval(time, INTERVAL 5 minute))) AS window_start,
        count() AS count
    FROM bam.geyser_transactions
    WHERE time BETWEEN parseDateTimeBestEffort(?) AND parseDateTimeBestEffort(?)
    GROUP BY window_start
    ORDER BY window_start";

const ENTRY_WINDOWS_QUERY: &str = "
    SELECT
        toInt64(toUnixTimestamp(toStartOfInterval(time, INTERVAL 5 minute))) AS window_start,
        count() AS count
    FROM bam.geyser_entries
    WHERE time BETWEEN parseDateTimeBestEffort(?) AND parseDateTimeBestEffort(?)
    GROUP BY window_start
    ORDER BY window_start";

const SLOT_STATUS_WINDOWS_QUERY: &str = "
    SELECT
        toInt64(toUnixTimestamp(toStartOfInterval(time, INTERVAL 5 minute))) AS window_start,
        toString(status) AS status,
        count() AS slot_count
    FROM bam.geyser_slot_status
    WHERE time BETWEEN parseDateTimeBestEffort(?) AND parseDateTimeBestEffort(?)
    GROUP BY window_start, status
    ORDER BY window_start, status";

const BLOCK_WINDOWS_QUERY: &str = "
    SELECT
        toInt64(toUnixTimestamp(toStartOfInterval(time, INTERVAL 5 minute))) AS window_start,
        count() AS block_count,
        avgOrNull(total_fee_lamports) AS avg_total_fee_lamports
    FROM bam.geyser_block_metadata
    WHERE time BETWEEN parseDateTimeBestEffort(?) AND parseDateTimeBestEffort(?)
    GROUP BY window_start
    ORDER BY window_start";

// first tracked key in message order; redundant geyser rows collapse per (slot, index, signature)
const PROP_AMM_TOUCHES_QUERY: &str = "
    SELECT
        toUInt64(tx.slot) AS slot,
        toUInt64(tx.tx_index) AS transaction_index,
        base58Encode(tx.signature) AS signature,
        bm.validator AS validator,
        tx.account AS account
    FROM (
        SELECT
            slot,
            index AS tx_index,
            signature,
            arrayFirst(acc -> has(?, acc), arrayMap(x -> base58Encode(x), arrayConcat(
                coalesce(any(static_signed_writable_accounts), []),
                coalesce(any(static_signed_readonly_accounts), []),
                coalesce(any(static_unsigned_writable_accounts), []),
                coalesce(any(static_unsigned_readonly_accounts), [])
            ))) AS account
        FROM bam.geyser_transactions
        WHERE slot BETWEEN ? AND ? AND is_vote = 0
        GROUP BY slot, index, signature
    ) AS tx
    INNER JOIN (
        SELECT slot, base58Encode(any(validator_identity)) AS validator
        FROM bam.geyser_block_metadata
        WHERE slot BETWEEN ? AND ?
        GROUP BY slot
    ) AS bm ON bm.slot = tx.slot
    WHERE tx.account != ''
    ORDER BY slot, transaction_index";

const RECENT_SLOT_RANGE_QUERY: &str = "
    SELECT
        toUInt64(0) AS epoch,
        count() AS slot_count,
        toUInt64(min(slot)) AS min_slot,
        toUInt64(max(slot)) AS max_slot
    FROM bam.geyser_block_metadata
    WHERE time >= now() - INTERVAL ? HOUR";

const COMPLETED_EPOCH_QUERY: &str = "
    SELECT
        toUInt64(any(epoch)) AS epoch,
        count() AS slot_count,
        toUInt64(min(slot)) AS min_slot,
        toUInt64(max(slot)) AS max_slot
    FROM bam.geyser_block_metadata
    WHERE epoch = (SELECT max(epoch) - 1 FROM bam.geyser_block_metadata)";

#[derive(Clone)]
pub struct ClickHouseStore {
    client: Client,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl ClickHouseStore {
    pub fn new(config: &Config) -> Self {
        let client = Client::default()
            .with_url(&config.clickhouse_url)
            .with_user(&config.clickhouse_user)
            .with_password(&config.clickhouse_password)
            .with_database(&config.clickhouse_database);
        Self { client, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn timed<T, F>(&self, query: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = clickhouse::error::Result<T>> + Send,
    {
        let started = Instant::now();
        let result = fut.await;
        if let Some(metrics) = &self.metrics {
            metrics.observe_store_query(query, started.elapsed(), result.is_ok());
        }
        result.map_err(|e| {
            debug!(query, error = %e, "ClickHouse query failed");
            InspectorError::from(e)
        })
    }
}

#[async_trait]
impl SlotStore for ClickHouseStore {
    async fn slot_metadata(&self, slot: Slot) -> Result<Option<SlotMetadata>> {
        let query = self
            .client
            .query(METADATA_QUERY)
            .bind(slot)
            .bind(slot.saturating_sub(1))
            .bind(slot)
            .bind(slot);
        let row = self
            .timed("slot_metadata", query.fetch_optional::<MetadataRow>())
            .await?;
        Ok(row.map(SlotMetadata::from))
    }

    async fn slot_entries(&self, slot: Slot) -> Result<Vec<SourcedEntry>> {
        let query = self.client.query(ENTRIES_QUERY).bind(slot);
        let rows = match self.timed("slot_entries", query.fetch_all::<EntryRow>()).await {
            Ok(rows) => rows,
            Err(e) => {
                debug!(slot, error = %e, "retrying entries without num_hashes");
                let fallback = self.client.query(ENTRIES_QUERY_NO_HASHES).bind(slot);
                self.timed("slot_entries_no_hashes", fallback.fetch_all::<EntryRow>())
                    .await?
            }
        };
        Ok(rows.into_iter().map(SourcedEntry::from).collect())
    }

    async fn slot_transactions(&self, slot: Slot) -> Result<Vec<Transaction>> {
        let query = self.client.query(TRANSACTIONS_QUERY).bind(slot);
        let rows = self
            .timed("slot_transactions", query.fetch_all::<TransactionRow>())
            .await?;
        Ok(rows.into_iter().map(Transaction::from).collect())
    }

    async fn slot_bundles(&self, slot: Slot) -> Result<Vec<LandedBundle>> {
        let query = self.client.query(BUNDLES_QUERY).bind(slot);
        let rows = self
            .timed("slot_bundles", query.fetch_all::<BundleRow>())
            .await?;
        Ok(rows.into_iter().map(LandedBundle::from).collect())
    }

    async fn recent_slots(&self, identity: &str, limit: usize) -> Result<Vec<RecentSlot>> {
        let query = self
            .client
            .query(RECENT_SLOTS_QUERY)
            .bind(identity)
            .bind(limit as u64);
        self.timed("recent_slots", query.fetch_all::<RecentSlot>()).await
    }

    async fn slot_sequence(&self, range: &TimeRange, tracked_accounts: &[String]) -> Result<Vec<SlotActivity>> {
        let from = range.from.to_rfc3339();
        let to = range.to.to_rfc3339();
        let query = self
            .client
            .query(SLOT_SEQUENCE_QUERY)
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(tracked_accounts)
            .bind(from.as_str())
            .bind(to.as_str());
        self.timed("slot_sequence", query.fetch_all::<SlotActivity>()).await
    }

    async fn search_validators(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let query = self
            .client
            .query(SEARCH_VALIDATORS_QUERY)
            .bind(prefix)
            .bind(limit as u64);
        let rows = self
            .timed("search_validators", query.fetch_all::<ValidatorRow>())
            .await?;
        Ok(rows.into_iter().map(|r| r.validator).collect())
    }

    async fn activity_windows(&self, range: &TimeRange) -> Result<ActivityWindows> {
        let from = range.from.to_rfc3339();
        let to = range.to.to_rfc3339();
        let windowed = |sql: &'static str| self.client.query(sql).bind(from.as_str()).bind(to.as_str());

        let (bundles, transactions, entries, slot_status, block_metadata) = tokio::try_join!(
            self.timed("bundle_windows", windowed(BUNDLE_WINDOWS_QUERY).fetch_all::<BundleWindow>()),
            self.timed("transaction_windows", windowed(TRANSACTION_WINDOWS_QUERY).fetch_all::<WindowCount>()),
            self.timed("entry_windows", windowed(ENTRY_WINDOWS_QUERY).fetch_all::<WindowCount>()),
            self.timed("slot_status_windows", windowed(SLOT_STATUS_WINDOWS_QUERY).fetch_all::<SlotStatusWindow>()),
            self.timed("block_windows", windowed(BLOCK_WINDOWS_QUERY).fetch_all::<BlockWindow>()),
        )?;

        Ok(ActivityWindows {
            bundles,
            transactions,
            entries,
            slot_status,
            block_metadata,
        })
    }

    async fn prop_amm_touches(&self, range: SlotRange, accounts: &[String]) -> Result<Vec<PropAmmTouch>> {
        if accounts.is_empty() {
            return Ok(Vec::new());
        }
        let query = self
            .client
            .query(PROP_AMM_TOUCHES_QUERY)
            .bind(accounts)
            .bind(range.start)
            .bind(range.end)
            .bind(range.start)
            .bind(range.end);
        let rows = self
            .timed("prop_amm_touches", query.fetch_all::<TouchRow>())
            .await?;
        Ok(rows.into_iter().map(PropAmmTouch::from).collect())
    }

    async fn recent_slot_range(&self, hours: u32) -> Result<Option<SlotRange>> {
        let query = self.client.query(RECENT_SLOT_RANGE_QUERY).bind(hours.max(1));
        let row = self
            .timed("recent_slot_range", query.fetch_optional::<SlotBoundsRow>())
            .await?;
        Ok(row
            .filter(|r| r.slot_count > 0)
            .map(|r| SlotRange::new(r.min_slot, r.max_slot)))
    }

    async fn latest_completed_epoch(&self) -> Result<Option<EpochRange>> {
        let query = self.client.query(COMPLETED_EPOCH_QUERY);
        let row = self
            .timed("latest_completed_epoch", query.fetch_optional::<SlotBoundsRow>())
            .await?;
        Ok(row.filter(|r| r.slot_count > 0).map(|r| EpochRange {
            epoch: r.epoch,
            range: SlotRange::new(r.min_slot, r.max_slot),
        }))
    }
}

/// In-process store backed by maps. Slots can be marked as failing to
/// exercise partial-failure paths.
#[derive(Default)]
pub struct MemoryStore {
    slots: DashMap<Slot, SlotInput>,
    failing_slots: RwLock<HashSet<Slot>>,
    failing_producers: RwLock<HashSet<String>>,
    bundles_fail: RwLock<bool>,
    sequence: RwLock<Vec<SlotActivity>>,
    windows: RwLock<ActivityWindows>,
    touches: RwLock<Vec<PropAmmTouch>>,
    touch_queries: AtomicUsize,
    recent_range: RwLock<Option<SlotRange>>,
    completed_epoch: RwLock<Option<EpochRange>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_slot(&self, input: SlotInput) {
        self.slots.insert(input.metadata.slot, input);
    }

    pub fn fail_slot(&self, slot: Slot) {
        self.failing_slots.write().insert(slot);
    }

    /// Makes the recent-slot lookup for `identity` fail.
    pub fn fail_producer(&self, identity: &str) {
        self.failing_producers.write().insert(identity.to_string());
    }

    pub fn fail_bundles(&self) {
        *self.bundles_fail.write() = true;
    }

    pub fn set_sequence(&self, sequence: Vec<SlotActivity>) {
        *self.sequence.write() = sequence;
    }

    pub fn set_activity_windows(&self, windows: ActivityWindows) {
        *self.windows.write() = windows;
    }

    pub fn add_touches(&self, touches: impl IntoIterator<Item = PropAmmTouch>) {
        self.touches.write().extend(touches);
    }

    /// Number of `prop_amm_touches` calls served so far.
    pub fn touch_queries(&self) -> usize {
        self.touch_queries.load(Ordering::Relaxed)
    }

    pub fn set_recent_range(&self, range: Option<SlotRange>) {
        *self.recent_range.write() = range;
    }

    pub fn set_completed_epoch(&self, epoch: Option<EpochRange>) {
        *self.completed_epoch.write() = epoch;
    }

    fn check(&self, slot: Slot) -> Result<()> {
        if self.failing_slots.read().contains(&slot) {
            return Err(InspectorError::StoreUnavailable(format!("slot {slot} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl SlotStore for MemoryStore {
    async fn slot_metadata(&self, slot: Slot) -> Result<Option<SlotMetadata>> {
        self.check(slot)?;
        Ok(self.slots.get(&slot).map(|s| s.metadata.clone()))
    }

    async fn slot_entries(&self, slot: Slot) -> Result<Vec<SourcedEntry>> {
        self.check(slot)?;
        Ok(self.slots.get(&slot).map(|s| s.entries.clone()).unwrap_or_default())
    }

    async fn slot_transactions(&self, slot: Slot) -> Result<Vec<Transaction>> {
        self.check(slot)?;
        Ok(self
            .slots
            .get(&slot)
            .map(|s| s.transactions.clone())
            .unwrap_or_default())
    }

    async fn slot_bundles(&self, slot: Slot) -> Result<Vec<LandedBundle>> {
        if *self.bundles_fail.read() {
            return Err(InspectorError::StoreUnavailable("bundles table unavailable".into()));
        }
        Ok(self.slots.get(&slot).map(|s| s.bundles.clone()).unwrap_or_default())
    }

    async fn recent_slots(&self, identity: &str, limit: usize) -> Result<Vec<RecentSlot>> {
        if self.failing_producers.read().contains(identity) {
            return Err(InspectorError::StoreUnavailable(format!("no slots for {identity}")));
        }
        let mut slots: Vec<RecentSlot> = self
            .slots
            .iter()
            .filter(|s| s.metadata.leader == identity)
            .map(|s| RecentSlot {
                slot: s.metadata.slot,
                block_height: s.metadata.block_height,
                total_fee_lamports: s.metadata.total_fee_lamports,
            })
            .collect();
        slots.sort_by(|a, b| b.slot.cmp(&a.slot));
        slots.truncate(limit);
        Ok(slots)
    }

    async fn slot_sequence(&self, _range: &TimeRange, _tracked_accounts: &[String]) -> Result<Vec<SlotActivity>> {
        Ok(self.sequence.read().clone())
    }

    async fn search_validators(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let mut found: Vec<String> = self
            .slots
            .iter()
            .map(|s| s.metadata.leader.clone())
            .filter(|leader| leader.starts_with(prefix))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        found.sort();
        found.truncate(limit);
        Ok(found)
    }

    async fn activity_windows(&self, _range: &TimeRange) -> Result<ActivityWindows> {
        Ok(self.windows.read().clone())
    }

    async fn prop_amm_touches(&self, range: SlotRange, accounts: &[String]) -> Result<Vec<PropAmmTouch>> {
        self.touch_queries.fetch_add(1, Ordering::Relaxed);
        let mut touches: Vec<PropAmmTouch> = self
            .touches
            .read()
            .iter()
            .filter(|t| (range.start..=range.end).contains(&t.slot))
            .filter(|t| accounts.iter().any(|a| *a == t.account))
            .cloned()
            .collect();
        touches.sort_by_key(|t| (t.slot, t.transaction_index));
        Ok(touches)
    }

    async fn recent_slot_range(&self, _hours: u32) -> Result<Option<SlotRange>> {
        Ok(*self.recent_range.read())
    }

    async fn latest_completed_epoch(&self) -> Result<Option<EpochRange>> {
        Ok(*self.completed_epoch.read())
    }
}
