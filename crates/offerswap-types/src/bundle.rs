//! Spend intents and spend bundles.
//!
//! An offer carries a *partial* bundle: the initiator's signed spends only.
//! The responder appends its own spends and the bundle becomes broadcastable
//! once every spend is authorized and every asset class balances.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    AssetId, BundleId, Coin, CoinId, Condition, Puzzle, constants,
    ids::{hex_vec, hex32, tagged_hash},
    payment_announcement_id,
};

/// One signer's contribution to a bundle's authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureFragment {
    #[serde(with = "hex32")]
    pub public_key: [u8; 32],
    #[serde(with = "hex_vec")]
    pub signature: Vec<u8>,
}

/// All fragments of a bundle, in spend order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSignature {
    pub fragments: Vec<SignatureFragment>,
}

/// A single coin spend: the coin, its revealed puzzle, the conditions it
/// emits, and (for owned coins) the owner's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendIntent {
    pub coin: Coin,
    pub puzzle: Puzzle,
    pub conditions: Vec<Condition>,
    pub signature: Option<SignatureFragment>,
}

impl SpendIntent {
    #[must_use]
    pub fn new(coin: Coin, puzzle: Puzzle, conditions: Vec<Condition>) -> Self {
        Self {
            coin,
            puzzle,
            conditions,
            signature: None,
        }
    }

    #[must_use]
    pub fn coin_id(&self) -> CoinId {
        self.coin.id()
    }

    /// The digest a signer commits to. Covers the coin and every condition,
    /// so a signed spend cannot be re-targeted or stripped of assertions.
    #[must_use]
    pub fn message(&self) -> [u8; 32] {
        let mut encoded = Vec::with_capacity(self.conditions.len() * 48);
        for condition in &self.conditions {
            condition.encode_into(&mut encoded);
        }
        tagged_hash(
            constants::TAG_SPEND_MESSAGE,
            &[
                self.coin_id().as_bytes(),
                self.puzzle.puzzle_hash().as_bytes(),
                &encoded,
            ],
        )
    }

    /// Coins created by this spend.
    #[must_use]
    pub fn outputs(&self) -> Vec<Coin> {
        let parent = self.coin_id();
        self.conditions
            .iter()
            .filter_map(Condition::output)
            .map(|(puzzle_hash, amount)| Coin::new(parent, puzzle_hash, amount, self.coin.asset))
            .collect()
    }

    /// Sum of all created coin amounts (saturating; overflow is a conservation failure anyway).
    #[must_use]
    pub fn output_total(&self) -> u64 {
        self.conditions
            .iter()
            .filter_map(Condition::output)
            .fold(0u64, |acc, (_, amount)| acc.saturating_add(amount))
    }

    /// Announcement ids this spend makes.
    #[must_use]
    pub fn announcements(&self) -> Vec<[u8; 32]> {
        self.conditions
            .iter()
            .filter_map(|condition| match condition {
                Condition::CreatePayment {
                    terms_hash,
                    puzzle_hash,
                    amount,
                } => Some(payment_announcement_id(
                    &self.coin.asset,
                    terms_hash,
                    puzzle_hash,
                    *amount,
                )),
                _ => None,
            })
            .collect()
    }

    /// Announcement ids this spend requires.
    #[must_use]
    pub fn asserted_announcements(&self) -> Vec<[u8; 32]> {
        self.conditions
            .iter()
            .filter_map(|condition| match condition {
                Condition::AssertAnnouncement { announcement_id } => Some(*announcement_id),
                _ => None,
            })
            .collect()
    }

    /// Whether every `AssertAssetClass` matches the spent coin.
    #[must_use]
    pub fn asset_assertions_hold(&self) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::AssertAssetClass { asset } => *asset == self.coin.asset,
            _ => true,
        })
    }

    /// Coin ids this spend requires to be spent alongside it.
    #[must_use]
    pub fn asserted_spends(&self) -> Vec<CoinId> {
        self.conditions
            .iter()
            .filter_map(|condition| match condition {
                Condition::AssertCoinSpent { coin_id } => Some(*coin_id),
                _ => None,
            })
            .collect()
    }

    /// Whether this spend balances on its own: native may leave a fee
    /// behind, tokens may not.
    #[must_use]
    pub fn conserves_value(&self) -> bool {
        let total = self
            .conditions
            .iter()
            .filter_map(Condition::output)
            .try_fold(0u64, |acc, (_, amount)| acc.checked_add(amount));
        match total {
            Some(out) if self.coin.asset.is_native() => out <= self.coin.amount,
            Some(out) => out == self.coin.amount,
            None => false,
        }
    }
}

/// A set of spends submitted together; valid only as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendBundle {
    pub spends: Vec<SpendIntent>,
    pub aggregated_signature: Option<AggregateSignature>,
}

impl SpendBundle {
    #[must_use]
    pub fn new(spends: Vec<SpendIntent>) -> Self {
        Self {
            spends,
            aggregated_signature: None,
        }
    }

    /// Content digest over the spends in order. Signatures are excluded so
    /// the id is fixed before signing.
    #[must_use]
    pub fn id(&self) -> BundleId {
        let mut hasher_input = Vec::with_capacity(self.spends.len() * 64);
        for spend in &self.spends {
            hasher_input.extend_from_slice(spend.coin_id().as_bytes());
            hasher_input.extend_from_slice(&spend.message());
        }
        BundleId(tagged_hash(constants::TAG_BUNDLE, &[&hasher_input]))
    }

    /// Ids of the coins this bundle consumes.
    #[must_use]
    pub fn removals(&self) -> Vec<CoinId> {
        self.spends.iter().map(SpendIntent::coin_id).collect()
    }

    /// Coins this bundle creates.
    #[must_use]
    pub fn additions(&self) -> Vec<Coin> {
        self.spends.iter().flat_map(SpendIntent::outputs).collect()
    }

    /// Coin ids spent more than once within the bundle, if any.
    #[must_use]
    pub fn duplicate_spend(&self) -> Option<CoinId> {
        let mut seen = HashSet::with_capacity(self.spends.len());
        self.spends
            .iter()
            .map(SpendIntent::coin_id)
            .find(|id| !seen.insert(*id))
    }

    /// Inputs minus outputs per asset. Zero everywhere on a balanced token bundle.
    #[must_use]
    pub fn asset_balance(&self) -> BTreeMap<AssetId, i128> {
        let mut balance = BTreeMap::new();
        for spend in &self.spends {
            let entry = balance.entry(spend.coin.asset).or_insert(0i128);
            *entry += i128::from(spend.coin.amount);
            *entry -= i128::from(spend.output_total());
        }
        balance
    }

    /// Token classes balance exactly and native outputs do not exceed inputs.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.asset_balance()
            .iter()
            .all(|(asset, net)| if asset.is_native() { *net >= 0 } else { *net == 0 })
    }

    /// Append another party's spends.
    pub fn merge(&mut self, other: SpendBundle) {
        self.spends.extend(other.spends);
        self.aggregated_signature = None;
    }

    /// Whether every spend that needs a signature carries one.
    #[must_use]
    pub fn is_fully_signed(&self) -> bool {
        self.spends
            .iter()
            .all(|spend| !spend.puzzle.requires_signature() || spend.signature.is_some())
    }
}
