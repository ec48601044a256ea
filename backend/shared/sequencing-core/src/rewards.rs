use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constants::{BASE_FEE_LAMPORTS, LEADER_BASE_FEE_SHARE_PERCENT};
use crate::types::{Lamports, LandedBundle};

/// Portion of a transaction fee paid to the block producer: half of the base
/// fee plus everything charged above it.
#[inline]
pub fn leader_fee_share(fee_lamports: Lamports) -> Lamports {
    let base_portion = fee_lamports.min(BASE_FEE_LAMPORTS);
    let base_to_leader = base_portion * LEADER_BASE_FEE_SHARE_PERCENT / 100;
    let extra_to_leader = fee_lamports.saturating_sub(BASE_FEE_LAMPORTS);
    base_to_leader + extra_to_leader
}

/// Leader fee share plus the tip allocated to the transaction.
#[inline]
pub fn reward_lamports(fee_lamports: Lamports, allocated_tip_lamports: Lamports) -> Lamports {
    leader_fee_share(fee_lamports).saturating_add(allocated_tip_lamports)
}

/// Tip attributed to one signature, summed over every bundle it landed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TipAllocation {
    pub allocated_tip_lamports: Lamports,
    /// Tip per compute unit of the first bundle with a known CU total.
    pub bundle_tip_per_cu: Option<f64>,
    pub bundle_count: u32,
}

/// Splits every bundle's tip across its members proportionally to compute
/// units consumed. Members without a CU figure count as zero; when a bundle
/// has no CU at all the tip is split evenly.
pub fn allocate_bundle_tips<'a, I, F>(bundles: I, compute_units: F) -> HashMap<String, TipAllocation>
where
    I: IntoIterator<Item = &'a LandedBundle>,
    F: Fn(&str) -> Option<u64>,
{
    let mut allocations: HashMap<String, TipAllocation> = HashMap::new();

    for bundle in bundles {
        let members = &bundle.member_signatures;
        if members.is_empty() {
            continue;
        }

        let member_cu: Vec<u64> = members
            .iter()
            .map(|sig| compute_units(sig).unwrap_or(0))
            .collect();
        let total_cu: u128 = member_cu.iter().map(|&cu| cu as u128).sum();
        let tip = bundle.tip_lamports;
        let tip_per_cu = (total_cu > 0).then(|| tip as f64 / total_cu as f64);

        for (signature, cu) in members.iter().zip(member_cu) {
            let share = if total_cu > 0 {
                (tip as u128 * cu as u128 / total_cu) as u64
            } else {
                tip / members.len() as u64
            };

            let allocation = allocations.entry(signature.clone()).or_default();
            allocation.allocated_tip_lamports = allocation.allocated_tip_lamports.saturating_add(share);
            if allocation.bundle_tip_per_cu.is_none() {
                allocation.bundle_tip_per_cu = tip_per_cu;
            }
            allocation.bundle_count += 1;
        }
    }

    allocations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(id: &str, tip: u64, members: &[&str]) -> LandedBundle {
        LandedBundle {
            bundle_id: id.to_string(),
            producer_identity: Some("leader".to_string()),
            tip_lamports: tip,
            member_signatures: members.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn fee_share_splits_base_and_keeps_priority() {
        assert_eq!(leader_fee_share(0), 0);
        assert_eq!(leader_fee_share(4_999), 2_499);
        assert_eq!(leader_fee_share(5_000), 2_500);
        assert_eq!(leader_fee_share(5_001), 2_501);
        assert_eq!(leader_fee_share(105_000), 102_500);
        assert_eq!(reward_lamports(10_000, 700), 7_500 + 700);
    }

    #[test]
    fn proportional_to_compute_units() {
        let bundles = vec![bundle("b1", 900, &["x", "y"])];
        let cu: HashMap<&str, u64> = [("x", 100), ("y", 200)].into_iter().collect();
        let alloc = allocate_bundle_tips(&bundles, |s| cu.get(s).copied());

        assert_eq!(alloc["x"].allocated_tip_lamports, 300);
        assert_eq!(alloc["y"].allocated_tip_lamports, 600);
        assert_eq!(alloc["x"].bundle_tip_per_cu, Some(3.0));
    }

    #[test]
    fn unknown_compute_units_fall_back_to_even_split() {
        let bundles = vec![bundle("b1", 1_000, &["x", "y", "z"])];
        let alloc = allocate_bundle_tips(&bundles, |_| None);
        for sig in ["x", "y", "z"] {
            assert_eq!(alloc[sig].allocated_tip_lamports, 333);
            assert_eq!(alloc[sig].bundle_tip_per_cu, None);
        }
    }

    #[test]
    fn partial_compute_units_treat_missing_as_zero() {
        let bundles = vec![bundle("b1", 1_000, &["x", "y"])];
        let alloc = allocate_bundle_tips(&bundles, |s| (s == "x").then_some(50));
        assert_eq!(alloc["x"].allocated_tip_lamports, 1_000);
        assert_eq!(alloc["y"].allocated_tip_lamports, 0);
    }

    #[test]
    fn signatures_in_several_bundles_accumulate() {
        let bundles = vec![bundle("b1", 100, &["x", "y"]), bundle("b2", 50, &["x"])];
        let alloc = allocate_bundle_tips(&bundles, |_| Some(10));
        assert_eq!(alloc["x"].allocated_tip_lamports, 50 + 50);
        assert_eq!(alloc["x"].bundle_count, 2);
        assert_eq!(alloc["y"].allocated_tip_lamports, 50);
        assert!(!alloc.contains_key("z"));
    }

    #[test]
    fn allocations_partition_the_tip_within_rounding() {
        let members = ["a", "b", "c", "d", "e", "f", "g"];
        let cu: HashMap<&str, u64> = members
            .iter()
            .enumerate()
            .map(|(i, s)| (*s, 1_000 + 37 * i as u64))
            .collect();

        for tip in [1u64, 7, 999, 123_457, 9_999_999_967] {
            let bundles = vec![bundle("b", tip, &members)];
            let alloc = allocate_bundle_tips(&bundles, |s| cu.get(s).copied());
            let sum: u64 = alloc.values().map(|a| a.allocated_tip_lamports).sum();
            assert!(sum <= tip);
            assert!(tip - sum <= members.len() as u64, "tip {tip} sum {sum}");
        }
    }
}
