use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::constants::{TRANSITION_WINDOW_AFTER, TRANSITION_WINDOW_BEFORE};
use crate::types::Slot;
use crate::validators::{AGAVE_BAM, FRANKENDANCER, HARMONIC, JITO_LABS};

/// Per-slot figures used for leader transition analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSummary {
    pub slot: Slot,
    pub producer: String,
    pub producer_name: Option<String>,
    pub producer_type: String,
    /// Transactions touching one of the watched accounts.
    pub tracked_tx_count: u64,
    pub total_tx_count: u64,
    pub total_compute_units: u64,
}

/// Allow-list of producer types whose hand-overs are recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedTypes(BTreeSet<String>);

impl TrackedTypes {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(types.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, producer_type: &str) -> bool {
        self.0.contains(producer_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for TrackedTypes {
    fn default() -> Self {
        Self::new([AGAVE_BAM, FRANKENDANCER, JITO_LABS, HARMONIC])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypePair {
    pub from: String,
    pub to: String,
}

impl fmt::Display for TypePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.from, self.to)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderTransition {
    pub from: SlotSummary,
    pub to: SlotSummary,
    /// Slots −3..=+4 around the "from" slot, truncated at the sequence edges.
    pub window: Vec<SlotSummary>,
}

impl LeaderTransition {
    pub fn pair(&self) -> TypePair {
        TypePair {
            from: self.from.producer_type.clone(),
            to: self.to.producer_type.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionStats {
    pub transition_type: String,
    pub from_type: String,
    pub to_type: String,
    pub count: usize,
    pub avg_from_tracked_tx: f64,
    pub avg_to_tracked_tx: f64,
    pub avg_from_total_tx: f64,
    pub avg_to_total_tx: f64,
    /// Σ to-side tracked tx / Σ from-side tracked tx. Infinite when only the
    /// to-side saw tracked volume; JSON carries that as the string
    /// `"Infinity"`, never `null`. 1.0 when neither side did.
    #[serde(serialize_with = "serialize_ratio")]
    pub tracked_tx_ratio: f64,
}

fn serialize_ratio<S: Serializer>(ratio: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if ratio.is_infinite() {
        serializer.serialize_str(if *ratio > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        serializer.serialize_f64(*ratio)
    }
}

/// Scans consecutive slots for producer-type changes between two tracked
/// types and captures the surrounding window for each.
pub fn find_transitions(sequence: &[SlotSummary], tracked: &TrackedTypes) -> Vec<LeaderTransition> {
    sequence
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| {
            let (current, next) = (&pair[0], &pair[1]);
            current.producer_type != next.producer_type
                && tracked.contains(&current.producer_type)
                && tracked.contains(&next.producer_type)
        })
        .map(|(i, pair)| {
            let start = i.saturating_sub(TRANSITION_WINDOW_BEFORE);
            let end = (i + TRANSITION_WINDOW_AFTER).min(sequence.len() - 1);
            LeaderTransition {
                from: pair[0].clone(),
                to: pair[1].clone(),
                window: sequence[start..=end].to_vec(),
            }
        })
        .collect()
}

#[derive(Default)]
struct PairTotals {
    count: usize,
    from_tracked: u64,
    to_tracked: u64,
    from_total: u64,
    to_total: u64,
}

/// Aggregates transitions per ordered type pair, most frequent first. Equal
/// counts are ordered by pair name, not by first appearance.
pub fn aggregate_transitions(transitions: &[LeaderTransition]) -> Vec<TransitionStats> {
    let mut by_pair: BTreeMap<TypePair, PairTotals> = BTreeMap::new();
    for t in transitions {
        let totals = by_pair.entry(t.pair()).or_default();
        totals.count += 1;
        totals.from_tracked += t.from.tracked_tx_count;
        totals.to_tracked += t.to.tracked_tx_count;
        totals.from_total += t.from.total_tx_count;
        totals.to_total += t.to.total_tx_count;
    }

    let mut stats: Vec<TransitionStats> = by_pair
        .into_iter()
        .map(|(pair, totals)| {
            let n = totals.count as f64;
            TransitionStats {
                transition_type: pair.to_string(),
                count: totals.count,
                avg_from_tracked_tx: totals.from_tracked as f64 / n,
                avg_to_tracked_tx: totals.to_tracked as f64 / n,
                avg_from_total_tx: totals.from_total as f64 / n,
                avg_to_total_tx: totals.to_total as f64 / n,
                tracked_tx_ratio: tracked_ratio(totals.from_tracked, totals.to_tracked),
                from_type: pair.from,
                to_type: pair.to,
            }
        })
        .collect();

    // stable sort keeps the pair order for equal counts
    stats.sort_by(|a, b| b.count.cmp(&a.count));
    stats
}

fn tracked_ratio(from: u64, to: u64) -> f64 {
    match (from, to) {
        (0, 0) => 1.0,
        (0, _) => f64::INFINITY,
        (from, to) => to as f64 / from as f64,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionReport {
    pub transitions: Vec<LeaderTransition>,
    pub stats: Vec<TransitionStats>,
    pub reference_type: String,
    pub reference_slot_count: usize,
    pub tracked_tx_on_reference: u64,
    pub avg_tracked_tx_per_reference_slot: f64,
    pub avg_tracked_tx_per_other_slot: f64,
}

/// Transitions, per-pair stats and tracked volume on the reference type
/// versus the other tracked types.
pub fn build_report(
    sequence: &[SlotSummary],
    tracked: &TrackedTypes,
    reference_type: &str,
) -> TransitionReport {
    let transitions = find_transitions(sequence, tracked);
    let stats = aggregate_transitions(&transitions);

    let (reference, other): (Vec<&SlotSummary>, Vec<&SlotSummary>) = sequence
        .iter()
        .filter(|s| tracked.contains(&s.producer_type))
        .partition(|s| s.producer_type == reference_type);

    let tracked_tx_on_reference: u64 = reference.iter().map(|s| s.tracked_tx_count).sum();
    let tracked_tx_on_other: u64 = other.iter().map(|s| s.tracked_tx_count).sum();

    TransitionReport {
        transitions,
        stats,
        reference_type: reference_type.to_string(),
        reference_slot_count: reference.len(),
        tracked_tx_on_reference,
        avg_tracked_tx_per_reference_slot: mean(tracked_tx_on_reference, reference.len()),
        avg_tracked_tx_per_other_slot: mean(tracked_tx_on_other, other.len()),
    }
}

fn mean(total: u64, n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        total as f64 / n as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(slot: Slot, producer_type: &str, tracked: u64, total: u64) -> SlotSummary {
        SlotSummary {
            slot,
            producer: format!("{producer_type}-validator"),
            producer_name: None,
            producer_type: producer_type.to_string(),
            tracked_tx_count: tracked,
            total_tx_count: total,
            total_compute_units: total * 1_000,
        }
    }

    fn run(types: &[&str]) -> Vec<SlotSummary> {
        types
            .iter()
            .enumerate()
            .map(|(i, t)| summary(100 + i as u64, t, i as u64, 10 * i as u64))
            .collect()
    }

    #[test]
    fn no_type_change_means_no_transitions() {
        let seq = run(&[AGAVE_BAM; 12]);
        let transitions = find_transitions(&seq, &TrackedTypes::default());
        assert!(transitions.is_empty());
        assert!(aggregate_transitions(&transitions).is_empty());
    }

    #[test]
    fn untracked_types_are_ignored() {
        let seq = run(&[AGAVE_BAM, "Unknown", HARMONIC, "Agave", "Agave"]);
        assert!(find_transitions(&seq, &TrackedTypes::default()).is_empty());
    }

    #[test]
    fn window_spans_three_before_four_after() {
        let mut types = vec![AGAVE_BAM; 8];
        types.extend(vec![JITO_LABS; 8]);
        let seq = run(&types);

        let transitions = find_transitions(&seq, &TrackedTypes::default());
        assert_eq!(transitions.len(), 1);
        let t = &transitions[0];
        assert_eq!(t.from.slot, 107);
        assert_eq!(t.to.slot, 108);
        let window: Vec<Slot> = t.window.iter().map(|s| s.slot).collect();
        assert_eq!(window, (104..=111).collect::<Vec<_>>());
    }

    #[test]
    fn window_truncates_at_edges() {
        let seq = run(&[AGAVE_BAM, HARMONIC, HARMONIC]);
        let transitions = find_transitions(&seq, &TrackedTypes::default());
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].window.len(), 3);

        let seq = run(&[HARMONIC, HARMONIC, HARMONIC, HARMONIC, FRANKENDANCER]);
        let transitions = find_transitions(&seq, &TrackedTypes::default());
        assert_eq!(transitions[0].window.first().map(|s| s.slot), Some(100));
        assert_eq!(transitions[0].window.last().map(|s| s.slot), Some(104));
    }

    #[test]
    fn aggregates_per_ordered_pair() {
        let seq = vec![
            summary(1, AGAVE_BAM, 4, 100),
            summary(2, HARMONIC, 8, 200),
            summary(3, AGAVE_BAM, 2, 50),
            summary(4, HARMONIC, 2, 60),
            summary(5, JITO_LABS, 0, 10),
        ];
        let transitions = find_transitions(&seq, &TrackedTypes::default());
        assert_eq!(transitions.len(), 4);

        let stats = aggregate_transitions(&transitions);
        let bam_to_harmonic = &stats[0];
        assert_eq!(bam_to_harmonic.transition_type, "AgaveBam → Harmonic");
        assert_eq!(bam_to_harmonic.count, 2);
        assert_eq!(bam_to_harmonic.avg_from_tracked_tx, 3.0);
        assert_eq!(bam_to_harmonic.avg_to_tracked_tx, 5.0);
        assert_eq!(bam_to_harmonic.avg_to_total_tx, 130.0);
        assert!((bam_to_harmonic.tracked_tx_ratio - 10.0 / 6.0).abs() < 1e-12);

        let harmonic_to_jito = stats
            .iter()
            .find(|s| s.transition_type == "Harmonic → JitoLabs")
            .unwrap();
        assert_eq!(harmonic_to_jito.tracked_tx_ratio, 0.0);
    }

    #[test]
    fn zero_from_volume_is_infinite_ratio() {
        assert_eq!(tracked_ratio(0, 5), f64::INFINITY);
        assert_eq!(tracked_ratio(0, 0), 1.0);
        assert_eq!(tracked_ratio(4, 2), 0.5);

        let stats = aggregate_transitions(&find_transitions(
            &[summary(1, JITO_LABS, 0, 5), summary(2, AGAVE_BAM, 3, 5)],
            &TrackedTypes::default(),
        ));
        let json = serde_json::to_value(&stats[0]).unwrap();
        assert_eq!(json["trackedTxRatio"], "Infinity");
    }

    #[test]
    fn equal_counts_order_by_pair_name() {
        let seq = vec![
            summary(1, JITO_LABS, 1, 10),
            summary(2, HARMONIC, 1, 10),
            summary(3, AGAVE_BAM, 1, 10),
        ];
        let stats = aggregate_transitions(&find_transitions(&seq, &TrackedTypes::default()));
        let order: Vec<&str> = stats.iter().map(|s| s.transition_type.as_str()).collect();
        assert_eq!(order, vec!["Harmonic → AgaveBam", "JitoLabs → Harmonic"]);
    }

    #[test]
    fn report_splits_reference_volume() {
        let seq = vec![
            summary(1, AGAVE_BAM, 4, 100),
            summary(2, AGAVE_BAM, 6, 100),
            summary(3, HARMONIC, 3, 100),
            summary(4, "Unknown", 50, 100),
            summary(5, JITO_LABS, 1, 100),
        ];
        let report = build_report(&seq, &TrackedTypes::default(), AGAVE_BAM);
        assert_eq!(report.reference_slot_count, 2);
        assert_eq!(report.tracked_tx_on_reference, 10);
        assert_eq!(report.avg_tracked_tx_per_reference_slot, 5.0);
        assert_eq!(report.avg_tracked_tx_per_other_slot, 2.0);
        assert_eq!(report.transitions.len(), 1);
    }
}
