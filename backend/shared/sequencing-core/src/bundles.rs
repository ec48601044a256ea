use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::types::LandedBundle;

/// Bundles the landed-bundle feed attributes to `leader`. Bundles without a
/// producer identity, or attributed to another producer, are dropped.
///
/// Both sides are compared as base58 strings; the data layer must encode the
/// block-metadata leader and the bundle producer the same way.
pub fn bundles_for_leader<'a>(
    bundles: &'a [LandedBundle],
    leader: &'a str,
) -> impl Iterator<Item = &'a LandedBundle> + 'a {
    bundles
        .iter()
        .filter(move |b| b.producer_identity.as_deref() == Some(leader))
}

/// Signatures of every transaction landed in one of the leader's bundles.
#[derive(Debug, Clone, Default)]
pub struct BundleSignatureSet {
    signatures: HashSet<String>,
}

impl BundleSignatureSet {
    pub fn for_leader(bundles: &[LandedBundle], leader: &str) -> Self {
        bundles_for_leader(bundles, leader)
            .flat_map(|b| b.member_signatures.iter().cloned())
            .collect()
    }

    #[inline]
    pub fn contains(&self, signature: &str) -> bool {
        self.signatures.contains(signature)
    }
}

impl FromIterator<String> for BundleSignatureSet {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self {
            signatures: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxCategory {
    Vote,
    Bundled,
    Regular,
}

impl TxCategory {
    /// Votes take precedence over bundle membership.
    #[inline]
    pub fn of(is_vote: bool, is_bundled: bool) -> Self {
        if is_vote {
            TxCategory::Vote
        } else if is_bundled {
            TxCategory::Bundled
        } else {
            TxCategory::Regular
        }
    }
}
