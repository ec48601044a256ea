use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::boundary::{
    build_boundaries, max_tick, resolve_tick, tick_axis_ceiling, EarliestSource, EntryBoundary,
    LookupOutcome, SourceSelector,
};
use crate::bundles::{bundles_for_leader, BundleSignatureSet, TxCategory};
use crate::prop_amm::first_prop_amm_match;
use crate::rewards::{allocate_bundle_tips, leader_fee_share, reward_lamports, TipAllocation};
use crate::types::{Entry, Lamports, LandedBundle, SlotMetadata, SourcedEntry, Transaction};

/// Raw rows for one slot as fetched from the event store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotInput {
    pub metadata: SlotMetadata,
    pub entries: Vec<SourcedEntry>,
    pub transactions: Vec<Transaction>,
    pub bundles: Vec<LandedBundle>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedTransaction {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub category: TxCategory,
    pub is_bundled: bool,
    pub tick: u32,
    pub tick_lookup: LookupOutcome,
    pub tick_entry_index: Option<u64>,
    pub tick_time_ms: Option<i64>,
    pub first_entry_time_ms: Option<i64>,
    pub leader_fee_share_lamports: Lamports,
    pub allocated_tip_lamports: Lamports,
    pub reward_lamports: Lamports,
    pub bundle_tip_per_cu: Option<f64>,
    /// First tracked prop-AMM account among the static keys.
    pub prop_amm_account: Option<String>,
    pub prop_amm_label: Option<String>,
}

impl EnrichedTransaction {
    #[inline]
    pub fn is_regular(&self) -> bool {
        self.category == TxCategory::Regular
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotTotals {
    pub entry_count: usize,
    pub tick_entry_count: usize,
    pub max_tick: u32,
    pub tick_axis_ceiling: u32,
    pub transaction_count: usize,
    pub vote_count: usize,
    pub bundled_count: usize,
    pub regular_count: usize,
    pub total_tips_lamports: Lamports,
    pub block_rewards_lamports: Lamports,
    /// Compute units consumed by non-vote transactions.
    pub compute_units_used: u64,
    /// Transactions whose index fell outside every entry range.
    pub index_mismatches: usize,
    pub slot_time_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedSlot {
    pub metadata: SlotMetadata,
    pub entries: Vec<Entry>,
    pub boundaries: Vec<EntryBoundary>,
    pub transactions: Vec<EnrichedTransaction>,
    pub totals: SlotTotals,
}

impl EnrichedSlot {
    pub fn slot(&self) -> u64 {
        self.metadata.slot
    }

    pub fn regular_transactions(&self) -> impl Iterator<Item = &EnrichedTransaction> {
        self.transactions.iter().filter(|t| t.is_regular())
    }
}

pub fn enrich_slot(input: SlotInput) -> EnrichedSlot {
    enrich_slot_with(input, &EarliestSource)
}

/// Runs the full reconstruction for one slot: source selection, boundaries,
/// tick resolution, bundle tagging and reward allocation.
pub fn enrich_slot_with<S>(input: SlotInput, selector: &S) -> EnrichedSlot
where
    S: SourceSelector + ?Sized,
{
    let SlotInput {
        metadata,
        entries,
        transactions,
        bundles,
    } = input;

    let entries = selector.select(entries);
    let boundaries = build_boundaries(&entries);

    let leader = metadata.leader.as_str();
    let bundle_set = BundleSignatureSet::for_leader(&bundles, leader);

    let cu_by_signature: HashMap<&str, Option<u64>> = transactions
        .iter()
        .map(|t| (t.signature.as_str(), t.compute_units_consumed))
        .collect();
    let allocations = allocate_bundle_tips(bundles_for_leader(&bundles, leader), |sig| {
        cu_by_signature.get(sig).copied().flatten()
    });

    let mut index_mismatches = 0usize;
    let enriched: Vec<EnrichedTransaction> = transactions
        .iter()
        .map(|tx| {
            let lookup = resolve_tick(i64::try_from(tx.index).unwrap_or(i64::MAX), &boundaries);
            if lookup.is_mismatch() {
                index_mismatches += 1;
            }

            let is_bundled = bundle_set.contains(&tx.signature);
            let allocation = allocations
                .get(&tx.signature)
                .copied()
                .unwrap_or_else(TipAllocation::default);
            let fee_share = leader_fee_share(tx.fee_lamports);
            let prop_amm = first_prop_amm_match(tx.static_accounts.iter());

            EnrichedTransaction {
                transaction: tx.clone(),
                category: TxCategory::of(tx.is_vote, is_bundled),
                is_bundled,
                tick: lookup.tick,
                tick_lookup: lookup.outcome,
                tick_entry_index: lookup.boundary.and_then(|b| b.tick_entry_index),
                tick_time_ms: lookup.boundary.and_then(|b| b.tick_time_ms),
                first_entry_time_ms: lookup.boundary.and_then(|b| b.entry_time_ms),
                leader_fee_share_lamports: fee_share,
                allocated_tip_lamports: allocation.allocated_tip_lamports,
                reward_lamports: reward_lamports(tx.fee_lamports, allocation.allocated_tip_lamports),
                bundle_tip_per_cu: allocation.bundle_tip_per_cu,
                prop_amm_account: prop_amm.map(|p| p.account.to_string()),
                prop_amm_label: prop_amm.map(|p| p.label.to_string()),
            }
        })
        .collect();

    if index_mismatches > 0 {
        debug!(
            slot = metadata.slot,
            index_mismatches,
            boundaries = boundaries.len(),
            "transaction indices outside entry ranges were clamped"
        );
    }

    let totals = summarize(&metadata, &entries, &boundaries, &enriched, index_mismatches);

    EnrichedSlot {
        metadata,
        entries,
        boundaries,
        transactions: enriched,
        totals,
    }
}

fn summarize(
    metadata: &SlotMetadata,
    entries: &[Entry],
    boundaries: &[EntryBoundary],
    transactions: &[EnrichedTransaction],
    index_mismatches: usize,
) -> SlotTotals {
    let observed_max_tick = max_tick(boundaries);
    let mut totals = SlotTotals {
        entry_count: entries.len(),
        tick_entry_count: entries.iter().filter(|e| e.is_tick()).count(),
        max_tick: observed_max_tick,
        tick_axis_ceiling: tick_axis_ceiling(observed_max_tick),
        transaction_count: transactions.len(),
        index_mismatches,
        slot_time_ms: metadata.slot_time_ms(),
        ..SlotTotals::default()
    };

    for tx in transactions {
        match tx.category {
            TxCategory::Vote => totals.vote_count += 1,
            TxCategory::Bundled => totals.bundled_count += 1,
            TxCategory::Regular => totals.regular_count += 1,
        }
        if !tx.transaction.is_vote {
            totals.compute_units_used += tx.transaction.compute_units_consumed.unwrap_or(0);
        }
        totals.total_tips_lamports += tx.allocated_tip_lamports;
        totals.block_rewards_lamports += tx.reward_lamports;
    }

    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StaticAccounts;

    const LEADER: &str = "Leader1111111111111111111111111111111111111";
    const HUMI: &str = "9YW7Rc8ongNLedz9YBp5hVYwdEJHuHbQkUf3fZocNkHN";
    const SV2: &str = "px1rbjiEWwwcq1epXSsTMJERyQy7h4vg4VopqFz2HwH";

    fn input() -> SlotInput {
        let mut metadata = SlotMetadata::unknown(42);
        metadata.leader = LEADER.to_string();

        let entries = [0u64, 3, 0, 2]
            .iter()
            .enumerate()
            .map(|(i, &c)| SourcedEntry::new("geyser-a", Entry::new(i as u64, c).with_time(1_000 + i as i64)))
            .collect();

        let transactions = vec![
            Transaction::new(0, "vote").vote().with_fee(5_000),
            Transaction::new(1, "bundled-1").with_fee(5_000).with_compute_units(100),
            Transaction::new(2, "bundled-2").with_fee(5_000).with_compute_units(200),
            Transaction::new(3, "regular-1")
                .with_fee(15_000)
                .with_compute_units(50)
                .with_accounts(StaticAccounts {
                    signed_writable: vec!["payer".into()],
                    unsigned_writable: vec![SV2.into()],
                    unsigned_readonly: vec![HUMI.into()],
                    ..StaticAccounts::default()
                }),
            Transaction::new(4, "regular-2").with_fee(5_000),
            Transaction::new(9, "late").with_fee(5_000),
        ];

        let bundles = vec![
            LandedBundle {
                bundle_id: "b1".into(),
                producer_identity: Some(LEADER.into()),
                tip_lamports: 900,
                member_signatures: vec!["bundled-1".into(), "bundled-2".into()],
            },
            LandedBundle {
                bundle_id: "foreign".into(),
                producer_identity: Some("SomeoneElse".into()),
                tip_lamports: 1_000_000,
                member_signatures: vec!["regular-1".into()],
            },
        ];

        SlotInput {
            metadata,
            entries,
            transactions,
            bundles,
        }
    }

    #[test]
    fn enriches_every_transaction() {
        let slot = enrich_slot(input());
        let by_sig: HashMap<&str, &EnrichedTransaction> = slot
            .transactions
            .iter()
            .map(|t| (t.transaction.signature.as_str(), t))
            .collect();

        assert_eq!(by_sig["vote"].category, TxCategory::Vote);
        assert_eq!(by_sig["bundled-1"].category, TxCategory::Bundled);
        assert_eq!(by_sig["regular-1"].category, TxCategory::Regular);

        assert_eq!(by_sig["bundled-1"].allocated_tip_lamports, 300);
        assert_eq!(by_sig["bundled-2"].allocated_tip_lamports, 600);
        assert_eq!(by_sig["bundled-2"].reward_lamports, 2_500 + 600);
        // foreign bundle neither tags nor tips
        assert!(!by_sig["regular-1"].is_bundled);
        assert_eq!(by_sig["regular-1"].allocated_tip_lamports, 0);
        assert_eq!(by_sig["regular-1"].reward_lamports, 12_500);

        assert_eq!(by_sig["regular-2"].tick, 1);
        assert_eq!(by_sig["regular-2"].tick_entry_index, Some(2));
        assert_eq!(by_sig["late"].tick_lookup, LookupOutcome::ClampedHigh);
    }

    #[test]
    fn tags_the_first_prop_amm_account() {
        let slot = enrich_slot(input());
        let tagged: Vec<_> = slot
            .transactions
            .iter()
            .filter_map(|t| Some((t.transaction.signature.as_str(), t.prop_amm_account.as_deref()?)))
            .collect();
        // writable keys come before readonly ones
        assert_eq!(tagged, vec![("regular-1", SV2)]);
        let regular = slot
            .transactions
            .iter()
            .find(|t| t.transaction.signature == "regular-1")
            .unwrap();
        assert_eq!(regular.prop_amm_label.as_deref(), Some("Sv2 SolUSDC"));
    }

    #[test]
    fn totals_roll_up() {
        let slot = enrich_slot(input());
        let totals = &slot.totals;
        assert_eq!(totals.entry_count, 4);
        assert_eq!(totals.tick_entry_count, 2);
        assert_eq!(totals.max_tick, 1);
        assert_eq!(totals.tick_axis_ceiling, 64);
        assert_eq!(totals.vote_count, 1);
        assert_eq!(totals.bundled_count, 2);
        assert_eq!(totals.regular_count, 3);
        assert_eq!(totals.total_tips_lamports, 900);
        assert_eq!(totals.compute_units_used, 350);
        assert_eq!(totals.index_mismatches, 1);
        assert_eq!(
            totals.block_rewards_lamports,
            2_500 * 5 + 12_500 + 900
        );
    }

    #[test]
    fn empty_slot_degrades_quietly() {
        let slot = enrich_slot(SlotInput {
            metadata: SlotMetadata::unknown(7),
            entries: Vec::new(),
            transactions: Vec::new(),
            bundles: Vec::new(),
        });
        assert!(slot.boundaries.is_empty());
        assert!(slot.transactions.is_empty());
        assert_eq!(slot.totals, SlotTotals {
            tick_axis_ceiling: 64,
            ..SlotTotals::default()
        });
    }
}
