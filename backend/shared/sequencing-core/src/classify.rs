//! Scheduler classification.
//!
//! A slot is second-half dominant when at least 95% of its regular
//! (non-vote, non-bundled) transactions land on tick 32 or later. A producer
//! is labelled by majority vote over its most recent slots.

use serde::{Deserialize, Serialize};

use crate::constants::{DOMINANCE_THRESHOLD, TICK_HALF_BOUNDARY};
use crate::slot::EnrichedSlot;
use crate::types::{Classification, Slot};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotClassification {
    pub slot: Slot,
    pub label: Classification,
    /// `None` when the slot has no regular transactions.
    pub second_half_ratio: Option<f64>,
    pub regular_tx_count: usize,
    pub second_half_tx_count: usize,
}

impl SlotClassification {
    /// Void slots carry no signal and are skipped by the majority vote.
    pub fn is_void(&self) -> bool {
        self.regular_tx_count == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerClassification {
    pub identity: String,
    pub label: Classification,
    pub valid_slot_count: usize,
    pub dominant_slot_count: usize,
    pub slots: Vec<SlotClassification>,
}

pub fn classify_slot(slot: &EnrichedSlot) -> SlotClassification {
    classify_ticks(slot.slot(), slot.regular_transactions().map(|t| t.tick))
}

/// Classifies a slot from the ticks of its regular transactions.
pub fn classify_ticks<I>(slot: Slot, regular_ticks: I) -> SlotClassification
where
    I: IntoIterator<Item = u32>,
{
    classify_with_threshold(slot, regular_ticks, DOMINANCE_THRESHOLD)
}

pub(crate) fn classify_with_threshold<I>(slot: Slot, regular_ticks: I, threshold: f64) -> SlotClassification
where
    I: IntoIterator<Item = u32>,
{
    let (regular_tx_count, second_half_tx_count) =
        regular_ticks
            .into_iter()
            .fold((0usize, 0usize), |(total, late), tick| {
                (total + 1, late + usize::from(tick >= TICK_HALF_BOUNDARY))
            });

    if regular_tx_count == 0 {
        return SlotClassification {
            slot,
            label: Classification::Other,
            second_half_ratio: None,
            regular_tx_count,
            second_half_tx_count,
        };
    }

    let ratio = second_half_tx_count as f64 / regular_tx_count as f64;
    let label = if ratio >= threshold {
        Classification::SecondHalfDominant
    } else {
        Classification::Other
    };

    SlotClassification {
        slot,
        label,
        second_half_ratio: Some(ratio),
        regular_tx_count,
        second_half_tx_count,
    }
}

/// Majority vote over per-slot labels, ignoring void slots. Ties go to
/// `SecondHalfDominant`; no valid slot at all yields `Other`.
pub fn majority_vote(identity: impl Into<String>, slots: Vec<SlotClassification>) -> ProducerClassification {
    let valid_slot_count = slots.iter().filter(|s| !s.is_void()).count();
    let dominant_slot_count = slots
        .iter()
        .filter(|s| !s.is_void() && s.label == Classification::SecondHalfDominant)
        .count();

    let needed = (valid_slot_count + 1) / 2;
    let label = if valid_slot_count > 0 && dominant_slot_count >= needed {
        Classification::SecondHalfDominant
    } else {
        Classification::Other
    };

    ProducerClassification {
        identity: identity.into(),
        label,
        valid_slot_count,
        dominant_slot_count,
        slots,
    }
}

pub fn classify_producer<'a, I>(identity: impl Into<String>, slots: I) -> ProducerClassification
where
    I: IntoIterator<Item = &'a EnrichedSlot>,
{
    majority_vote(identity, slots.into_iter().map(classify_slot).collect())
}
