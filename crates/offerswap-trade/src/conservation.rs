//! Value conservation checks.
//!
//! Two invariants, checked at different scopes:
//! ```text
//! per bundle:  ∀ token a: Σ inputs(a) == Σ outputs(a)
//!              native:    Σ inputs    >= Σ outputs      (the rest is fee)
//! per ledger:  ∀ asset a: Σ unspent(a) == Σ minted(a) - Σ fees(a)
//! ```
//!
//! The manager runs the bundle check before anything leaves the wallet, and
//! compares each party's [`party_flow`] against the reviewed delta before
//! it commits to a completion.
//! [`SupplyConservation`] holds the ledger-wide expectations, for
//! anything that can observe total supply.

use std::collections::{BTreeMap, BTreeSet};

use offerswap_types::{AssetId, OfferDelta, OfferswapError, PuzzleHash, Result, SpendBundle};

/// Refuse a bundle that creates value.
///
/// # Errors
/// Returns [`OfferswapError::ConservationViolation`] naming the first
/// asset that does not balance.
pub fn check_bundle(bundle: &SpendBundle) -> Result<()> {
    for (asset, net) in bundle.asset_balance() {
        let holds = if asset.is_native() { net >= 0 } else { net == 0 };
        if !holds {
            return Err(OfferswapError::ConservationViolation {
                reason: format!(
                    "bundle {}: {asset} inputs minus outputs is {net}",
                    bundle.id()
                ),
            });
        }
    }
    Ok(())
}

/// The two sides of a settled trade must mirror each other exactly:
/// whatever leaves one party enters the other.
///
/// # Errors
/// Returns [`OfferswapError::ConservationViolation`] if they do not.
pub fn check_trade_flow(initiator: &OfferDelta, responder: &OfferDelta) -> Result<()> {
    let assets: BTreeSet<AssetId> = initiator
        .iter()
        .chain(responder.iter())
        .map(|(asset, _)| *asset)
        .collect();
    for asset in assets {
        let a = i128::from(initiator.get(&asset).unwrap_or(0));
        let b = i128::from(responder.get(&asset).unwrap_or(0));
        if a + b != 0 {
            return Err(OfferswapError::ConservationViolation {
                reason: format!("{asset}: initiator {a} and responder {b} do not cancel out"),
            });
        }
    }
    Ok(())
}

/// What `bundle` moves to the holder of `owner`: coins it creates under
/// `owner` minus `owner`'s coins it spends. Assets that net to zero are
/// left out.
///
/// # Errors
/// Returns [`OfferswapError::ConservationViolation`] if a net amount does
/// not fit a delta.
pub fn party_flow(bundle: &SpendBundle, owner: &PuzzleHash) -> Result<OfferDelta> {
    let mut net: BTreeMap<AssetId, i128> = BTreeMap::new();
    for spend in bundle.spends.iter().filter(|spend| spend.coin.puzzle_hash == *owner) {
        *net.entry(spend.coin.asset).or_insert(0) -= i128::from(spend.coin.amount);
    }
    for coin in bundle.additions().iter().filter(|coin| coin.puzzle_hash == *owner) {
        *net.entry(coin.asset).or_insert(0) += i128::from(coin.amount);
    }
    net.into_iter()
        .filter(|(_, amount)| *amount != 0)
        .map(|(asset, amount)| {
            i64::try_from(amount)
                .map(|amount| (asset, amount))
                .map_err(|_| OfferswapError::ConservationViolation {
                    reason: format!("bundle {}: {asset} flow {amount} out of range", bundle.id()),
                })
        })
        .collect()
}

/// Per-asset supply expectations: what was minted minus what was burned
/// as fees.
#[derive(Debug, Default)]
pub struct SupplyConservation {
    minted: BTreeMap<AssetId, u64>,
    fees: BTreeMap<AssetId, u64>,
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_mint(&mut self, asset: AssetId, amount: u64) {
        let entry = self.minted.entry(asset).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Record the value a confirmed bundle left unclaimed.
    pub fn record_fees(&mut self, bundle: &SpendBundle) {
        for (asset, net) in bundle.asset_balance() {
            if let Ok(fee) = u64::try_from(net) {
                if fee > 0 {
                    let entry = self.fees.entry(asset).or_insert(0);
                    *entry = entry.saturating_add(fee);
                }
            }
        }
    }

    #[must_use]
    pub fn expected_supply(&self, asset: &AssetId) -> u64 {
        let minted = self.minted.get(asset).copied().unwrap_or(0);
        let fees = self.fees.get(asset).copied().unwrap_or(0);
        minted.saturating_sub(fees)
    }

    /// # Errors
    /// Returns [`OfferswapError::ConservationViolation`] if `actual` differs
    /// from the expected supply.
    pub fn verify(&self, asset: &AssetId, actual: u64) -> Result<()> {
        let expected = self.expected_supply(asset);
        if actual != expected {
            return Err(OfferswapError::ConservationViolation {
                reason: format!(
                    "{asset}: supply {actual} != expected {expected} (minted={}, fees={})",
                    self.minted.get(asset).copied().unwrap_or(0),
                    self.fees.get(asset).copied().unwrap_or(0),
                ),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn tracked_assets(&self) -> Vec<AssetId> {
        let assets: BTreeSet<AssetId> = self.minted.keys().chain(self.fees.keys()).copied().collect();
        assets.into_iter().collect()
    }
}
