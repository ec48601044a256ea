//! Slot sequencing reconstruction.
//!
//! Rebuilds where each transaction of a produced slot landed on the PoH tick
//! axis, attributes fees and bundle tips to the leader, labels producers by
//! their scheduling behaviour, summarizes hand-overs between producer
//! types and scores the prop-AMM first-win race. Everything here is pure
//! and synchronous; data access lives in the service crate.

pub mod boundary;
pub mod bundles;
pub mod classify;
pub mod constants;
pub mod error;
pub mod prop_amm;
pub mod rewards;
pub mod slot;
pub mod transitions;
pub mod types;
pub mod validators;

pub use boundary::{
    build_boundaries, resolve_tick, EarliestSource, EntryBoundary, LookupOutcome, SourceSelector,
    TickLookup,
};
pub use bundles::{BundleSignatureSet, TxCategory};
pub use classify::{
    classify_producer, classify_slot, classify_ticks, majority_vote, ProducerClassification,
    SlotClassification,
};
pub use error::{CoreError, Result};
pub use prop_amm::{
    first_prop_amm_match, first_wins, prop_amm_account, win_rates, PropAmmAccount,
    PropAmmFirstWin, PropAmmGroup, PropAmmTouch, SlotRange, ValidatorWinRate, PROP_AMM_ACCOUNTS,
};
pub use rewards::{allocate_bundle_tips, leader_fee_share, reward_lamports, TipAllocation};
pub use slot::{enrich_slot, enrich_slot_with, EnrichedSlot, EnrichedTransaction, SlotInput, SlotTotals};
pub use transitions::{
    aggregate_transitions, build_report, find_transitions, LeaderTransition, SlotSummary,
    TrackedTypes, TransitionReport, TransitionStats,
};
pub use types::{
    validate_identity, Classification, Entry, LandedBundle, Lamports, Slot, SlotMetadata,
    SourcedEntry, StaticAccounts, TimeRange, Transaction,
};
pub use validators::{ClientShare, RawValidator, ValidatorData, ValidatorMatch, ValidatorSnapshot};
