use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

pub type Slot = u64;
pub type Lamports = u64;

/// One pacing unit of block production as reported by geyser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub index: u64,
    pub executed_transaction_count: u64,
    pub time_ms: Option<i64>,
    /// PoH hashes in this entry, when the upstream schema carries them.
    pub num_hashes: Option<u64>,
}

impl Entry {
    pub fn new(index: u64, executed_transaction_count: u64) -> Self {
        Self {
            index,
            executed_transaction_count,
            time_ms: None,
            num_hashes: None,
        }
    }

    pub fn with_time(mut self, time_ms: i64) -> Self {
        self.time_ms = Some(time_ms);
        self
    }

    /// A zero-transaction entry marks a PoH tick.
    #[inline]
    pub fn is_tick(&self) -> bool {
        self.executed_transaction_count == 0
    }
}

/// An entry tagged with the geyser stream it was observed on. A slot can be
/// reported by several redundant streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcedEntry {
    pub source: String,
    #[serde(flatten)]
    pub entry: Entry,
}

impl SourcedEntry {
    pub fn new(source: impl Into<String>, entry: Entry) -> Self {
        Self {
            source: source.into(),
            entry,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Position within the slot used for boundary lookup. Not necessarily the
    /// on-chain submission order.
    pub index: u64,
    pub signature: String,
    pub is_vote: bool,
    pub compute_units_consumed: Option<u64>,
    pub fee_lamports: Lamports,
    pub time_ms: Option<i64>,
    pub compute_units_requested: Option<u64>,
    pub compute_unit_price: Option<u64>,
    #[serde(default)]
    pub static_accounts: StaticAccounts,
}

/// Static account keys of a message, grouped the way the message header
/// orders them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticAccounts {
    pub signed_writable: Vec<String>,
    pub signed_readonly: Vec<String>,
    pub unsigned_writable: Vec<String>,
    pub unsigned_readonly: Vec<String>,
}

impl StaticAccounts {
    /// All keys in message order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.signed_writable
            .iter()
            .chain(&self.signed_readonly)
            .chain(&self.unsigned_writable)
            .chain(&self.unsigned_readonly)
            .map(String::as_str)
    }
}

impl Transaction {
    pub fn new(index: u64, signature: impl Into<String>) -> Self {
        Self {
            index,
            signature: signature.into(),
            is_vote: false,
            compute_units_consumed: None,
            fee_lamports: 0,
            time_ms: None,
            compute_units_requested: None,
            compute_unit_price: None,
            static_accounts: StaticAccounts::default(),
        }
    }

    pub fn vote(mut self) -> Self {
        self.is_vote = true;
        self
    }

    pub fn with_fee(mut self, fee_lamports: Lamports) -> Self {
        self.fee_lamports = fee_lamports;
        self
    }

    pub fn with_compute_units(mut self, cu: u64) -> Self {
        self.compute_units_consumed = Some(cu);
        self
    }

    pub fn with_accounts(mut self, static_accounts: StaticAccounts) -> Self {
        self.static_accounts = static_accounts;
        self
    }
}

/// A set of transactions landed together with one aggregate tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandedBundle {
    pub bundle_id: String,
    /// Producer the landed-bundle feed attributes this bundle to.
    pub producer_identity: Option<String>,
    pub tip_lamports: Lamports,
    pub member_signatures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotMetadata {
    pub slot: Slot,
    pub leader: String,
    pub block_height: u64,
    pub total_fee_lamports: Lamports,
    pub first_shred_time_ms: Option<i64>,
    pub prev_slot_first_shred_time_ms: Option<i64>,
    pub last_shred_time_ms: Option<i64>,
}

impl SlotMetadata {
    pub const UNKNOWN_LEADER: &'static str = "Unknown";

    /// Placeholder used when the block metadata row is missing.
    pub fn unknown(slot: Slot) -> Self {
        Self {
            slot,
            leader: Self::UNKNOWN_LEADER.to_string(),
            block_height: 0,
            total_fee_lamports: 0,
            first_shred_time_ms: None,
            prev_slot_first_shred_time_ms: None,
            last_shred_time_ms: None,
        }
    }

    /// Gap between the first shred of the previous slot and of this one.
    pub fn slot_time_ms(&self) -> Option<i64> {
        match (self.prev_slot_first_shred_time_ms, self.first_shred_time_ms) {
            (Some(prev), Some(current)) => Some(current - prev),
            _ => None,
        }
    }
}

/// Scheduling behaviour label for a slot or a producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Classification {
    /// Nearly all regular transactions land in the second half of the slot.
    #[serde(rename = "Rev")]
    SecondHalfDominant,
    #[default]
    #[serde(rename = "Vanilla")]
    Other,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::SecondHalfDominant => "Rev",
            Classification::Other => "Vanilla",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self> {
        if from > to {
            return Err(CoreError::InvalidTimeRange { from, to });
        }
        Ok(Self { from, to })
    }

    pub fn last_hours(now: DateTime<Utc>, hours: i64) -> Self {
        Self {
            from: now - Duration::hours(hours),
            to: now,
        }
    }

    pub fn cache_key(&self) -> String {
        format!("{}-{}", self.from.to_rfc3339(), self.to.to_rfc3339())
    }
}

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Shape check for a base58 account address.
pub fn validate_identity(identity: &str) -> Result<&str> {
    let trimmed = identity.trim();
    let well_formed = (32..=64).contains(&trimmed.len())
        && trimmed.chars().all(|c| BASE58_ALPHABET.contains(c));
    if well_formed {
        Ok(trimmed)
    } else {
        Err(CoreError::InvalidIdentity(identity.to_string()))
    }
}

/// Prefix form of [`validate_identity`] used for search queries.
pub fn is_base58_prefix(query: &str) -> bool {
    query.len() <= 64 && query.chars().all(|c| BASE58_ALPHABET.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn classification_serializes_with_house_vocabulary() {
        let rev = serde_json::to_string(&Classification::SecondHalfDominant).unwrap();
        let vanilla = serde_json::to_string(&Classification::Other).unwrap();
        assert_eq!(rev, "\"Rev\"");
        assert_eq!(vanilla, "\"Vanilla\"");
        assert_eq!(Classification::default(), Classification::Other);
    }

    #[test]
    fn slot_time_requires_both_shred_times() {
        let mut meta = SlotMetadata::unknown(10);
        assert_eq!(meta.slot_time_ms(), None);
        meta.prev_slot_first_shred_time_ms = Some(1_000);
        meta.first_shred_time_ms = Some(1_412);
        assert_eq!(meta.slot_time_ms(), Some(412));
    }

    #[test]
    fn time_range_rejects_inverted_bounds() {
        let a = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let b = Utc.timestamp_opt(1_700_003_600, 0).unwrap();
        assert!(TimeRange::new(a, b).is_ok());
        assert!(matches!(
            TimeRange::new(b, a),
            Err(CoreError::InvalidTimeRange { .. })
        ));
    }

    #[test]
    fn identity_validation() {
        assert!(validate_identity("3psxMyr7rQzywVp1MXKd1XFmFz33NjydzCoJx9t2sMQW").is_ok());
        assert!(validate_identity("short").is_err());
        // 0, O, I and l are not in the base58 alphabet
        assert!(validate_identity("0psxMyr7rQzywVp1MXKd1XFmFz33NjydzCoJx9t2sMQW").is_err());
        assert!(is_base58_prefix("3psx"));
        assert!(!is_base58_prefix("3ps'x"));
    }
}
