//! Proprietary AMM oracle accounts and the "first win" race between them.
//!
//! A slot's first win goes to the tracked account touched by the lowest
//! transaction index in that slot. Win rates are counted per producer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::Slot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PropAmmGroup {
    Humi,
    Tess,
    Sv2,
}

impl PropAmmGroup {
    pub const ALL: [PropAmmGroup; 3] = [PropAmmGroup::Humi, PropAmmGroup::Tess, PropAmmGroup::Sv2];

    pub fn as_str(&self) -> &'static str {
        match self {
            PropAmmGroup::Humi => "Humi",
            PropAmmGroup::Tess => "Tess",
            PropAmmGroup::Sv2 => "Sv2",
        }
    }
}

impl fmt::Display for PropAmmGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropAmmAccount {
    pub account: &'static str,
    pub label: &'static str,
    pub group: PropAmmGroup,
}

pub const PROP_AMM_ACCOUNTS: &[PropAmmAccount] = &[
    PropAmmAccount {
        account: "9YW7Rc8ongNLedz9YBp5hVYwdEJHuHbQkUf3fZocNkHN",
        label: "Humi SolUSDC #1",
        group: PropAmmGroup::Humi,
    },
    PropAmmAccount {
        account: "4KSLE7EU1P7PQ8Rc4hdb2ZKq2JmWHD8UXJp7guEdyT9j",
        label: "Humi SolUSDC #2",
        group: PropAmmGroup::Humi,
    },
    PropAmmAccount {
        account: "4dxRtLucVXZ4o9drN5jtCs5X9TJdv79KwPDp4fsVqtqh",
        label: "Humi SolUSDC #3",
        group: PropAmmGroup::Humi,
    },
    PropAmmAccount {
        account: "CmmZXMztbTuAyWXJecn96Q5WvcyMYcMK7JcMukJdku8U",
        label: "Humi SolUSDC #4",
        group: PropAmmGroup::Humi,
    },
    PropAmmAccount {
        account: "FVnv5qH7dsrBzEDwJ8dN2m9PFtKTBAQFtqWF3M9LpwMg",
        label: "Tess SolUSDC",
        group: PropAmmGroup::Tess,
    },
    PropAmmAccount {
        account: "px1rbjiEWwwcq1epXSsTMJERyQy7h4vg4VopqFz2HwH",
        label: "Sv2 SolUSDC",
        group: PropAmmGroup::Sv2,
    },
];

pub fn prop_amm_account(account: &str) -> Option<&'static PropAmmAccount> {
    PROP_AMM_ACCOUNTS.iter().find(|p| p.account == account)
}

/// First tracked account among `accounts`, in iteration order.
pub fn first_prop_amm_match<'a, I>(accounts: I) -> Option<&'static PropAmmAccount>
where
    I: IntoIterator<Item = &'a str>,
{
    accounts.into_iter().find_map(prop_amm_account)
}

/// Inclusive slot range. Bounds given in either order are normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotRange {
    pub start: Slot,
    pub end: Slot,
}

impl SlotRange {
    pub fn new(a: Slot, b: Slot) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    /// Number of slots covered.
    pub fn span(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }

    /// Consecutive sub-ranges of at most `size` slots covering the range.
    pub fn chunks(&self, size: u64) -> impl Iterator<Item = SlotRange> {
        let size = size.max(1);
        let end = self.end;
        let mut next = Some(self.start);
        std::iter::from_fn(move || {
            let start = next?;
            let chunk_end = start.saturating_add(size - 1).min(end);
            next = (chunk_end < end).then(|| chunk_end + 1);
            Some(SlotRange {
                start,
                end: chunk_end,
            })
        })
    }
}

/// A transaction touching a tracked account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropAmmTouch {
    pub slot: Slot,
    pub transaction_index: u64,
    pub signature: String,
    pub validator: String,
    pub account: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropAmmFirstWin {
    pub slot: Slot,
    pub validator: String,
    pub signature: String,
    pub transaction_index: u64,
    pub account: String,
    /// `None` when the account is no longer in [`PROP_AMM_ACCOUNTS`].
    pub group: Option<PropAmmGroup>,
}

/// Keeps the lowest-index touch of every slot, ordered by slot.
pub fn first_wins<I>(touches: I) -> Vec<PropAmmFirstWin>
where
    I: IntoIterator<Item = PropAmmTouch>,
{
    let mut first: BTreeMap<Slot, PropAmmTouch> = BTreeMap::new();
    for touch in touches {
        let earlier = first
            .get(&touch.slot)
            .map_or(true, |current| touch.transaction_index < current.transaction_index);
        if earlier {
            first.insert(touch.slot, touch);
        }
    }

    first
        .into_values()
        .map(|t| PropAmmFirstWin {
            group: prop_amm_account(&t.account).map(|p| p.group),
            slot: t.slot,
            validator: t.validator,
            signature: t.signature,
            transaction_index: t.transaction_index,
            account: t.account,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorWinRate {
    pub validator: String,
    /// Produced slots with at least one tracked touch.
    pub total_slots: usize,
    /// Wins per group name; untracked accounts count under "Unknown".
    pub group_wins: BTreeMap<String, usize>,
    pub win_rates: BTreeMap<PropAmmGroup, f64>,
}

/// Per-producer win counts and rates, most slots first.
pub fn win_rates(wins: &[PropAmmFirstWin]) -> Vec<ValidatorWinRate> {
    let mut by_validator: BTreeMap<&str, BTreeMap<String, usize>> = BTreeMap::new();
    for win in wins {
        let group = win.group.map(|g| g.as_str()).unwrap_or("Unknown");
        *by_validator
            .entry(win.validator.as_str())
            .or_default()
            .entry(group.to_string())
            .or_default() += 1;
    }

    let mut rates: Vec<ValidatorWinRate> = by_validator
        .into_iter()
        .map(|(validator, group_wins)| {
            let total_slots: usize = group_wins.values().sum();
            let win_rates = PropAmmGroup::ALL
                .iter()
                .map(|g| {
                    let won = group_wins.get(g.as_str()).copied().unwrap_or(0);
                    (*g, won as f64 / total_slots as f64)
                })
                .collect();
            ValidatorWinRate {
                validator: validator.to_string(),
                total_slots,
                group_wins,
                win_rates,
            }
        })
        .collect();

    // stable sort keeps ties in validator order
    rates.sort_by(|a, b| b.total_slots.cmp(&a.total_slots));
    rates
}

#[cfg(test)]
mod tests {
    use super::*;

    const HUMI: &str = "9YW7Rc8ongNLedz9YBp5hVYwdEJHuHbQkUf3fZocNkHN";
    const TESS: &str = "FVnv5qH7dsrBzEDwJ8dN2m9PFtKTBAQFtqWF3M9LpwMg";

    fn touch(slot: Slot, index: u64, validator: &str, account: &str) -> PropAmmTouch {
        PropAmmTouch {
            slot,
            transaction_index: index,
            signature: format!("{slot}-{index}"),
            validator: validator.to_string(),
            account: account.to_string(),
        }
    }

    #[test]
    fn lookup_and_first_match() {
        assert_eq!(prop_amm_account(TESS).map(|p| p.label), Some("Tess SolUSDC"));
        assert!(prop_amm_account("nope").is_none());

        let found = first_prop_amm_match(["a", TESS, HUMI]);
        assert_eq!(found.map(|p| p.group), Some(PropAmmGroup::Tess));
        assert!(first_prop_amm_match(Vec::<&str>::new()).is_none());
    }

    #[test]
    fn lowest_index_wins_each_slot() {
        let wins = first_wins(vec![
            touch(11, 9, "v1", HUMI),
            touch(10, 4, "v1", TESS),
            touch(11, 2, "v1", TESS),
            touch(10, 4, "v1", HUMI),
            touch(12, 0, "v2", "retired"),
        ]);
        let slots: Vec<(Slot, u64)> = wins.iter().map(|w| (w.slot, w.transaction_index)).collect();
        assert_eq!(slots, vec![(10, 4), (11, 2), (12, 0)]);
        // equal index keeps the first seen
        assert_eq!(wins[0].account, TESS);
        assert_eq!(wins[1].group, Some(PropAmmGroup::Tess));
        assert_eq!(wins[2].group, None);
    }

    #[test]
    fn rates_per_validator() {
        let wins = first_wins(vec![
            touch(1, 0, "v1", HUMI),
            touch(2, 0, "v1", HUMI),
            touch(3, 0, "v1", TESS),
            touch(4, 0, "v1", "retired"),
            touch(5, 0, "v2", TESS),
        ]);
        let rates = win_rates(&wins);
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].validator, "v1");
        assert_eq!(rates[0].total_slots, 4);
        assert_eq!(rates[0].group_wins["Unknown"], 1);
        assert_eq!(rates[0].win_rates[&PropAmmGroup::Humi], 0.5);
        assert_eq!(rates[0].win_rates[&PropAmmGroup::Sv2], 0.0);
        assert_eq!(rates[1].win_rates[&PropAmmGroup::Tess], 1.0);
        assert!(win_rates(&[]).is_empty());
    }

    #[test]
    fn slot_ranges_normalize_and_chunk() {
        let range = SlotRange::new(120, 100);
        assert_eq!((range.start, range.end, range.span()), (100, 120, 21));

        let chunks: Vec<(Slot, Slot)> = range.chunks(10).map(|c| (c.start, c.end)).collect();
        assert_eq!(chunks, vec![(100, 109), (110, 119), (120, 120)]);
        assert_eq!(SlotRange::new(5, 5).chunks(0).count(), 1);
        assert_eq!(SlotRange::new(u64::MAX - 1, u64::MAX).chunks(10).count(), 1);
        assert_eq!(SlotRange::new(0, u64::MAX).span(), u64::MAX);
    }
}
