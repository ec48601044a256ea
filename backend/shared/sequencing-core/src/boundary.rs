//! Maps executed-transaction counts per entry onto transaction index ranges
//! and PoH ticks, and resolves a transaction index back to its tick.

use serde::{Deserialize, Serialize};

use crate::constants::NOMINAL_TICKS_PER_SLOT;
use crate::types::{Entry, SourcedEntry};

/// Transaction index range covered by one entry, with the tick it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryBoundary {
    pub entry_index: u64,
    pub entry_time_ms: Option<i64>,
    /// Zero-based, inclusive.
    pub start: i64,
    /// Zero-based, inclusive. Equal to `start - 1` for tick entries.
    pub end: i64,
    pub tick: u32,
    /// Entry index of the most recent tick entry, `None` before the first tick.
    pub tick_entry_index: Option<u64>,
    pub tick_time_ms: Option<i64>,
}

impl EntryBoundary {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    #[inline]
    pub fn contains(&self, tx_index: i64) -> bool {
        tx_index >= self.start && tx_index <= self.end
    }
}

/// Picks exactly one entry stream for a slot before boundaries are built.
/// Mixing entries from two streams corrupts the cumulative counts.
pub trait SourceSelector {
    fn select(&self, entries: Vec<SourcedEntry>) -> Vec<Entry>;
}

/// Keeps the stream that delivered the earliest entry. Entries without a
/// timestamp rank last; ties go to the lexicographically smallest source.
#[derive(Debug, Clone, Copy, Default)]
pub struct EarliestSource;

impl SourceSelector for EarliestSource {
    fn select(&self, entries: Vec<SourcedEntry>) -> Vec<Entry> {
        let chosen = entries
            .iter()
            .min_by(|a, b| {
                let ta = a.entry.time_ms.unwrap_or(i64::MAX);
                let tb = b.entry.time_ms.unwrap_or(i64::MAX);
                ta.cmp(&tb).then_with(|| a.source.cmp(&b.source))
            })
            .map(|e| e.source.clone());

        let Some(chosen) = chosen else {
            return Vec::new();
        };

        let mut selected: Vec<Entry> = entries
            .into_iter()
            .filter(|e| e.source == chosen)
            .map(|e| e.entry)
            .collect();
        selected.sort_by_key(|e| e.index);
        selected
    }
}

/// Builds one boundary per entry, in input order. Entries must come from a
/// single stream and be sorted by index.
pub fn build_boundaries(entries: &[Entry]) -> Vec<EntryBoundary> {
    let mut cumulative: i64 = 0;
    let mut tick_counter: i64 = -1;
    let mut tick_entry_index = None;
    let mut tick_time_ms = None;

    entries
        .iter()
        .map(|entry| {
            let count = i64::try_from(entry.executed_transaction_count).unwrap_or(i64::MAX);
            if entry.is_tick() {
                tick_counter += 1;
                tick_entry_index = Some(entry.index);
                tick_time_ms = entry.time_ms;
            }

            let boundary = EntryBoundary {
                entry_index: entry.index,
                entry_time_ms: entry.time_ms,
                start: cumulative,
                end: cumulative.saturating_add(count) - 1,
                // transactions before the first tick entry belong to tick 0
                tick: tick_counter.max(0) as u32,
                tick_entry_index,
                tick_time_ms,
            };
            cumulative = cumulative.saturating_add(count);
            boundary
        })
        .collect()
}

pub fn max_tick(boundaries: &[EntryBoundary]) -> u32 {
    boundaries.iter().map(|b| b.tick).max().unwrap_or(0)
}

/// Upper bound for tick axes: never below the nominal 64.
pub fn tick_axis_ceiling(observed_max_tick: u32) -> u32 {
    observed_max_tick.max(NOMINAL_TICKS_PER_SLOT)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupOutcome {
    Contained,
    /// Missed the zero-based ranges but fits once the index is read as
    /// one-based.
    OneBased,
    /// Index precedes every boundary; resolved to the first one.
    ClampedLow,
    /// Index is past every boundary; resolved to the last one.
    ClampedHigh,
    NoBoundaries,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickLookup<'a> {
    pub tick: u32,
    pub outcome: LookupOutcome,
    pub boundary: Option<&'a EntryBoundary>,
}

impl TickLookup<'_> {
    /// True for every lookup that needed a fallback. These are the rows where
    /// the entry and transaction sources disagree.
    pub fn is_mismatch(&self) -> bool {
        self.outcome != LookupOutcome::Contained
    }
}

/// Resolves a transaction index to its tick. Total over every integer.
///
/// Entry and transaction rows come from two independently aggregated queries
/// that can disagree near the edges of a slot. A miss is retried with the
/// index read as one-based, then clamps to the nearest end instead of failing.
pub fn resolve_tick(tx_index: i64, boundaries: &[EntryBoundary]) -> TickLookup<'_> {
    if let Some(boundary) = find_containing(tx_index, boundaries) {
        return TickLookup {
            tick: boundary.tick,
            outcome: LookupOutcome::Contained,
            boundary: Some(boundary),
        };
    }

    if let Some(boundary) = tx_index
        .checked_sub(1)
        .and_then(|zero_based| find_containing(zero_based, boundaries))
    {
        return TickLookup {
            tick: boundary.tick,
            outcome: LookupOutcome::OneBased,
            boundary: Some(boundary),
        };
    }

    match (boundaries.first(), boundaries.last()) {
        (Some(first), _) if tx_index < first.start => TickLookup {
            tick: first.tick,
            outcome: LookupOutcome::ClampedLow,
            boundary: Some(first),
        },
        (_, Some(last)) => TickLookup {
            tick: last.tick,
            outcome: LookupOutcome::ClampedHigh,
            boundary: Some(last),
        },
        _ => TickLookup {
            tick: 0,
            outcome: LookupOutcome::NoBoundaries,
            boundary: None,
        },
    }
}

fn find_containing(tx_index: i64, boundaries: &[EntryBoundary]) -> Option<&EntryBoundary> {
    // starts are non-decreasing and non-empty ranges never overlap, so the
    // only candidate is the last non-empty boundary starting at or before
    // the index
    let upper = boundaries.partition_point(|b| b.start <= tx_index);
    boundaries[..upper]
        .iter()
        .rev()
        .find(|b| !b.is_empty())
        .filter(|b| b.contains(tx_index))
}
