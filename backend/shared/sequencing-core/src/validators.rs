//! Point-in-time view of third-party validator metadata.
//!
//! The snapshot is passed explicitly to whatever needs names or software
//! client tags; refreshing it is the caller's business.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

pub const AGAVE_BAM: &str = "AgaveBam";
pub const FRANKENDANCER: &str = "Frankendancer";
pub const JITO_LABS: &str = "JitoLabs";
pub const HARMONIC: &str = "Harmonic";
pub const UNKNOWN_CLIENT: &str = "Unknown";

/// Validators reporting an unknown client that are known not to run Harmonic.
pub const NOT_HARMONIC: &[&str] = &[
    "3psxMyr7rQzywVp1MXKd1XFmFz33NjydzCoJx9t2sMQW", // OtterSec
];

/// Validator record as published by validators.app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawValidator {
    pub account: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub active_stake: Option<u64>,
    #[serde(default)]
    pub software_client: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorData {
    pub account: String,
    pub name: Option<String>,
    pub active_stake: u64,
    pub software_client: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorMatch {
    pub account: String,
    pub name: Option<String>,
}

/// The client index is derived from `validators`, so deserializing goes
/// through [`SnapshotRepr`] and rebuilds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "SnapshotRepr")]
pub struct ValidatorSnapshot {
    pub generated_at: DateTime<Utc>,
    /// Staked validators, highest stake first.
    pub validators: Vec<ValidatorData>,
    /// Display names of every validator that has one, staked or not.
    pub names: BTreeMap<String, String>,
    #[serde(skip)]
    clients: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRepr {
    generated_at: DateTime<Utc>,
    validators: Vec<ValidatorData>,
    #[serde(default)]
    names: BTreeMap<String, String>,
}

impl From<SnapshotRepr> for ValidatorSnapshot {
    fn from(repr: SnapshotRepr) -> Self {
        Self::from_validators(repr.generated_at, repr.validators, repr.names)
    }
}

/// Per-client share of the staked validator set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientShare {
    pub software_client: String,
    pub validator_count: usize,
    pub active_stake: u64,
    /// Fraction of total active stake, 0.0 when nothing is staked.
    pub stake_share: f64,
}

impl ValidatorSnapshot {
    pub fn empty(generated_at: DateTime<Utc>) -> Self {
        Self::from_validators(generated_at, Vec::new(), BTreeMap::new())
    }

    pub fn from_validators(
        generated_at: DateTime<Utc>,
        mut validators: Vec<ValidatorData>,
        names: BTreeMap<String, String>,
    ) -> Self {
        validators.sort_by(|a, b| b.active_stake.cmp(&a.active_stake));
        let clients = validators
            .iter()
            .map(|v| (v.account.clone(), v.software_client.clone()))
            .collect();
        Self {
            generated_at,
            validators,
            names,
            clients,
        }
    }

    /// Applies the client-tag overrides to raw records:
    /// confirmed BAM validators become `AgaveBam`, unconfirmed `AgaveBam`
    /// claims become `JitoLabs`, and unknown clients become `Harmonic` unless
    /// listed in [`NOT_HARMONIC`]. Unstaked validators are dropped.
    pub fn build(
        generated_at: DateTime<Utc>,
        raw: Vec<RawValidator>,
        confirmed_bam: &HashSet<String>,
    ) -> Self {
        let mut names = BTreeMap::new();
        let mut validators = Vec::new();

        for v in raw {
            let name = v
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string);
            if let Some(name) = &name {
                names.insert(v.account.clone(), name.clone());
            }

            let stake = match v.active_stake {
                Some(stake) if stake > 0 => stake,
                _ => continue,
            };

            let reported = v
                .software_client
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
            let software_client = if confirmed_bam.contains(&v.account) {
                AGAVE_BAM.to_string()
            } else if reported == AGAVE_BAM {
                JITO_LABS.to_string()
            } else if reported == UNKNOWN_CLIENT && !NOT_HARMONIC.contains(&v.account.as_str()) {
                HARMONIC.to_string()
            } else {
                reported
            };

            validators.push(ValidatorData {
                account: v.account,
                name,
                active_stake: stake,
                software_client,
            });
        }

        Self::from_validators(generated_at, validators, names)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.generated_at < ttl
    }

    pub fn name(&self, account: &str) -> Option<&str> {
        self.names.get(account).map(String::as_str)
    }

    pub fn software_client(&self, account: &str) -> &str {
        self.clients
            .get(account)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_CLIENT)
    }

    pub fn accounts_with_client<'a>(&'a self, client: &'a str) -> impl Iterator<Item = &'a ValidatorData> + 'a {
        self.validators
            .iter()
            .filter(move |v| v.software_client == client)
    }

    /// Case-insensitive name substring or address prefix match.
    pub fn search(&self, query: &str, limit: usize) -> Vec<ValidatorMatch> {
        let needle = query.to_lowercase();
        self.names
            .iter()
            .filter(|(account, name)| {
                name.to_lowercase().contains(&needle) || account.to_lowercase().starts_with(&needle)
            })
            .take(limit)
            .map(|(account, name)| ValidatorMatch {
                account: account.clone(),
                name: Some(name.clone()),
            })
            .collect()
    }

    pub fn by_software_client(&self) -> BTreeMap<&str, Vec<&ValidatorData>> {
        let mut grouped: BTreeMap<&str, Vec<&ValidatorData>> = BTreeMap::new();
        for v in &self.validators {
            grouped.entry(v.software_client.as_str()).or_default().push(v);
        }
        grouped
    }

    pub fn stake_by_software_client(&self) -> BTreeMap<&str, u64> {
        let mut stake: BTreeMap<&str, u64> = BTreeMap::new();
        for v in &self.validators {
            *stake.entry(v.software_client.as_str()).or_default() += v.active_stake;
        }
        stake
    }

    /// Validator count and stake per software client, largest stake first.
    pub fn client_breakdown(&self) -> Vec<ClientShare> {
        let stake = self.stake_by_software_client();
        let total: u64 = stake.values().sum();
        let mut shares: Vec<ClientShare> = self
            .by_software_client()
            .into_iter()
            .map(|(client, validators)| {
                let active_stake = stake.get(client).copied().unwrap_or(0);
                ClientShare {
                    software_client: client.to_string(),
                    validator_count: validators.len(),
                    active_stake,
                    stake_share: if total > 0 {
                        active_stake as f64 / total as f64
                    } else {
                        0.0
                    },
                }
            })
            .collect();
        shares.sort_by(|a, b| {
            b.active_stake
                .cmp(&a.active_stake)
                .then_with(|| a.software_client.cmp(&b.software_client))
        });
        shares
    }
}
