//! Protocol constants that are part of the externally observable contract.
//! None of these are configurable.

/// Nominal number of PoH ticks in a slot. Producers may emit more or fewer.
pub const NOMINAL_TICKS_PER_SLOT: u32 = 64;

/// First tick of the second half of a slot.
pub const TICK_HALF_BOUNDARY: u32 = 32;

/// Minimum share of regular transactions in the second half for a slot to be
/// labelled second-half dominant.
pub const DOMINANCE_THRESHOLD: f64 = 0.95;

/// Base signature fee; anything charged above it is priority/compute pricing.
pub const BASE_FEE_LAMPORTS: u64 = 5_000;

/// Leader share of the base fee, in percent.
pub const LEADER_BASE_FEE_SHARE_PERCENT: u64 = 50;

/// Default number of most recent slots used for a producer majority vote.
pub const DEFAULT_CLASSIFICATION_WINDOW: usize = 5;

/// Default number of producers classified concurrently in a batch.
pub const DEFAULT_BATCH_WIDTH: usize = 10;

/// Slots captured before the "from" slot of a leader transition.
pub const TRANSITION_WINDOW_BEFORE: usize = 3;

/// Slots captured after the "from" slot of a leader transition.
pub const TRANSITION_WINDOW_AFTER: usize = 4;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;
