//! Offer model: what a party asks for, what it gives, and the portable
//! payload written to an offer file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    AssetId, GenesisChecker, OfferswapError, PuzzleHash, Result, SpendBundle, TradeId, constants,
    ids::{hex32, tagged_hash},
};

// ---------------------------------------------------------------------------
// OfferDelta
// ---------------------------------------------------------------------------

/// Signed amount per asset class, from one party's point of view.
///
/// Positive = the party receives this amount; negative = the party gives it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfferDelta(BTreeMap<AssetId, i64>);

impl OfferDelta {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style leg insertion.
    #[must_use]
    pub fn with(mut self, asset: AssetId, amount: i64) -> Self {
        self.0.insert(asset, amount);
        self
    }

    pub fn insert(&mut self, asset: AssetId, amount: i64) {
        self.0.insert(asset, amount);
    }

    #[must_use]
    pub fn get(&self, asset: &AssetId) -> Option<i64> {
        self.0.get(asset).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AssetId, &i64)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check the trade invariant: at least one leg given and one received.
    ///
    /// Zero legs are tolerated (and ignored) when `allow_zero_legs` is set.
    pub fn validate(&self, allow_zero_legs: bool) -> Result<()> {
        let mut gives = false;
        let mut receives = false;
        for (asset, amount) in &self.0 {
            match amount.signum() {
                0 if allow_zero_legs => {}
                0 => {
                    return Err(OfferswapError::InvalidOffer {
                        reason: format!("zero amount for {asset}"),
                    });
                }
                -1 => gives = true,
                _ => receives = true,
            }
            if *amount == i64::MIN {
                return Err(OfferswapError::InvalidOffer {
                    reason: format!("amount for {asset} out of range"),
                });
            }
        }
        if !gives || !receives {
            return Err(OfferswapError::InvalidOffer {
                reason: "a trade needs at least one offered and one requested asset".into(),
            });
        }
        Ok(())
    }

    /// Legs this party gives, as positive amounts.
    pub fn offered(&self) -> impl Iterator<Item = (AssetId, u64)> + '_ {
        self.0
            .iter()
            .filter(|(_, amount)| **amount < 0)
            .map(|(asset, amount)| (*asset, amount.unsigned_abs()))
    }

    /// Legs this party receives.
    pub fn requested(&self) -> impl Iterator<Item = (AssetId, u64)> + '_ {
        self.0
            .iter()
            .filter(|(_, amount)| **amount > 0)
            .map(|(asset, amount)| (*asset, amount.unsigned_abs()))
    }

    /// The same delta without zero legs.
    #[must_use]
    pub fn non_zero(&self) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(_, amount)| **amount != 0)
                .map(|(asset, amount)| (*asset, *amount))
                .collect(),
        )
    }

    /// The counterparty's view of this delta.
    #[must_use]
    pub fn negated(&self) -> Self {
        Self(
            self.0
                .iter()
                .map(|(asset, amount)| (*asset, amount.saturating_neg()))
                .collect(),
        )
    }

    #[must_use]
    pub fn into_inner(self) -> BTreeMap<AssetId, i64> {
        self.0
    }
}

impl FromIterator<(AssetId, i64)> for OfferDelta {
    fn from_iter<T: IntoIterator<Item = (AssetId, i64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<AssetId, i64>> for OfferDelta {
    fn from(map: BTreeMap<AssetId, i64>) -> Self {
        Self(map)
    }
}

// ---------------------------------------------------------------------------
// Terms
// ---------------------------------------------------------------------------

/// One counter-payment the initiator requires in exchange for its coins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedPayment {
    pub asset: AssetId,
    /// Where the counterparty must send it (the initiator's puzzle hash).
    pub puzzle_hash: PuzzleHash,
    pub amount: u64,
}

/// The full set of requested payments, bound to a nonce unique to the offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferTerms {
    #[serde(with = "hex32")]
    pub nonce: [u8; 32],
    pub payments: Vec<RequestedPayment>,
}

impl OfferTerms {
    #[must_use]
    pub fn terms_hash(&self) -> [u8; 32] {
        let mut encoded = Vec::with_capacity(32 + self.payments.len() * 80);
        encoded.extend_from_slice(&self.nonce);
        for payment in &self.payments {
            encoded.extend_from_slice(&payment.asset.hash_bytes());
            encoded.extend_from_slice(payment.puzzle_hash.as_bytes());
            encoded.extend_from_slice(&payment.amount.to_le_bytes());
        }
        tagged_hash(constants::TAG_TERMS, &[&encoded])
    }

    /// Requested amount per asset.
    #[must_use]
    pub fn requested_totals(&self) -> BTreeMap<AssetId, u64> {
        let mut totals = BTreeMap::new();
        for payment in &self.payments {
            let entry = totals.entry(payment.asset).or_insert(0u64);
            *entry = entry.saturating_add(payment.amount);
        }
        totals
    }
}

// ---------------------------------------------------------------------------
// Offer
// ---------------------------------------------------------------------------

/// Lets the receiver resolve a token [`AssetId`] to one of its own asset classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub asset: AssetId,
    pub genesis_checker: GenesisChecker,
}

/// The content of an offer file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Offer {
    pub version: u16,
    /// The initiator's delta, as declared.
    pub delta: OfferDelta,
    pub terms: OfferTerms,
    /// The initiator's signed spends only.
    pub bundle: SpendBundle,
    pub assets: Vec<AssetMetadata>,
}

impl Offer {
    /// Id both parties derive from the partial bundle.
    #[must_use]
    pub fn trade_id(&self) -> TradeId {
        TradeId::from_bundle(&self.bundle.id())
    }

    #[must_use]
    pub fn checker_for(&self, asset: &AssetId) -> Option<&GenesisChecker> {
        self.assets
            .iter()
            .find(|meta| &meta.asset == asset)
            .map(|meta| &meta.genesis_checker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokenColour;

    fn token(n: u8) -> AssetId {
        AssetId::Token(TokenColour([n; 32]))
    }

    #[test]
    fn two_sided_delta_is_valid() {
        let delta = OfferDelta::new().with(AssetId::Native, 10).with(token(2), -30);
        assert!(delta.validate(true).is_ok());
    }

    #[test]
    fn one_sided_delta_is_rejected() {
        let delta = OfferDelta::new().with(AssetId::Native, 10).with(token(2), 30);
        let err = delta.validate(true).unwrap_err();
        assert!(matches!(err, OfferswapError::InvalidOffer { .. }));
        assert!(OfferDelta::new().validate(true).is_err());
    }

    #[test]
    fn zero_legs_do_not_count() {
        let delta = OfferDelta::new().with(AssetId::Native, 10).with(token(3), 0);
        assert!(delta.validate(true).is_err(), "zero leg is not a counter-asset");

        let delta = OfferDelta::new()
            .with(AssetId::Native, 10)
            .with(token(2), -30)
            .with(token(3), 0);
        assert!(delta.validate(true).is_ok());
        assert!(delta.validate(false).is_err());
        assert_eq!(delta.non_zero().len(), 2);
    }

    #[test]
    fn min_amount_is_out_of_range() {
        let delta = OfferDelta::new()
            .with(AssetId::Native, 10)
            .with(token(2), i64::MIN);
        assert!(delta.validate(true).is_err());
    }

    #[test]
    fn offered_and_requested_split() {
        let delta = OfferDelta::new()
            .with(AssetId::Native, 1000)
            .with(token(2), -20)
            .with(token(4), -50);
        let offered: Vec<_> = delta.offered().collect();
        let requested: Vec<_> = delta.requested().collect();
        assert_eq!(offered, vec![(token(2), 20), (token(4), 50)]);
        assert_eq!(requested, vec![(AssetId::Native, 1000)]);
    }

    #[test]
    fn negated_flips_every_leg() {
        let delta = OfferDelta::new().with(AssetId::Native, 10).with(token(2), -30);
        let flipped = delta.negated();
        assert_eq!(flipped.get(&AssetId::Native), Some(-10));
        assert_eq!(flipped.get(&token(2)), Some(30));
    }

    #[test]
    fn terms_hash_binds_payments() {
        let terms = OfferTerms {
            nonce: [1u8; 32],
            payments: vec![RequestedPayment {
                asset: AssetId::Native,
                puzzle_hash: PuzzleHash([2u8; 32]),
                amount: 10,
            }],
        };
        let mut other = terms.clone();
        other.payments[0].amount = 11;
        assert_ne!(terms.terms_hash(), other.terms_hash());
        assert_eq!(terms.requested_totals().get(&AssetId::Native), Some(&10));
    }
}
