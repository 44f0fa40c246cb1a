//! Discrepancy Validator: what would I have to give, and what would I get?
//!
//! For every asset class the reviewer recomputes the initiator's side from
//! the partial bundle itself, never trusting the declared delta:
//!
//! ```text
//!   offered[a]   = Σ outputs of class a paid into the settlement puzzle
//!   requested[a] = Σ payments of class a in the terms
//!   initiator[a] = requested[a] - offered[a]     must equal declared delta[a]
//!   reviewer[a]  = -initiator[a]
//! ```

use std::collections::{BTreeMap, HashSet};

use offerswap_types::{
    AssetId, Coin, Condition, Offer, OfferDelta, OfferswapError, Result, payment_announcement_id,
    settlement_puzzle_hash,
};
use offerswap_wallet::AssetLedgerView;

fn inconsistent(reason: impl Into<String>) -> OfferswapError {
    OfferswapError::Inconsistent {
        reason: reason.into(),
    }
}

/// Coins the initiator's spends pay into the settlement puzzle.
#[must_use]
pub fn settlement_coins(offer: &Offer) -> Vec<Coin> {
    let settlement_ph = settlement_puzzle_hash(&offer.terms.terms_hash());
    offer
        .bundle
        .additions()
        .into_iter()
        .filter(|coin| coin.puzzle_hash == settlement_ph)
        .collect()
}

/// The delta the reviewing wallet would take on by completing `offer`:
/// negative for what it must give, positive for what it receives.
///
/// # Errors
/// - `Inconsistent` if the spends, terms and declared delta do not reconcile
/// - `UnknownAsset` if a token class cannot be resolved by this wallet
pub async fn discrepancies(offer: &Offer, ledger: &dyn AssetLedgerView) -> Result<OfferDelta> {
    let terms_hash = offer.terms.terms_hash();
    let required: HashSet<[u8; 32]> = offer
        .terms
        .payments
        .iter()
        .map(|payment| {
            payment_announcement_id(&payment.asset, &terms_hash, &payment.puzzle_hash, payment.amount)
        })
        .collect();

    for spend in &offer.bundle.spends {
        let coin_id = spend.coin_id();
        if let Some(resolved) = ledger.resolve_asset_for_coin(&spend.coin).await? {
            if resolved != spend.coin.asset {
                return Err(inconsistent(format!(
                    "coin {coin_id} claims {} but the ledger says {resolved}",
                    spend.coin.asset
                )));
            }
        }
        if !spend.conserves_value() {
            return Err(inconsistent(format!("spend of {coin_id} does not conserve value")));
        }
        let asserted: HashSet<[u8; 32]> = spend.asserted_announcements().into_iter().collect();
        if !required.is_subset(&asserted) {
            return Err(inconsistent(format!(
                "spend of {coin_id} is not bound to the requested payments"
            )));
        }
        if !spend.coin.asset.is_native()
            && !spend.conditions.contains(&Condition::AssertAssetClass {
                asset: spend.coin.asset,
            })
        {
            return Err(inconsistent(format!(
                "token spend of {coin_id} lacks an asset class assertion"
            )));
        }
    }

    let mut net: BTreeMap<AssetId, i128> = BTreeMap::new();
    for (asset, amount) in offer.terms.requested_totals() {
        *net.entry(asset).or_insert(0) += i128::from(amount);
    }
    for coin in settlement_coins(offer) {
        *net.entry(coin.asset).or_insert(0) -= i128::from(coin.amount);
    }
    let mut recomputed = OfferDelta::new();
    for (asset, amount) in net {
        if amount == 0 {
            continue;
        }
        let amount = i64::try_from(amount)
            .map_err(|_| inconsistent(format!("amount of {asset} out of range")))?;
        recomputed.insert(asset, amount);
    }

    if recomputed != offer.delta.non_zero() {
        return Err(inconsistent(format!(
            "declared delta {:?} does not match the bundle ({:?})",
            offer.delta, recomputed
        )));
    }

    for (asset, _) in recomputed.iter().filter(|(asset, _)| !asset.is_native()) {
        let checker = offer
            .checker_for(asset)
            .ok_or_else(|| inconsistent(format!("no metadata for {asset}")))?;
        if checker.asset_id() != *asset {
            return Err(inconsistent(format!(
                "metadata for {asset} names a different asset class"
            )));
        }
        let resolved = ledger
            .known_assets()
            .iter()
            .any(|known| ledger.is_genesis_equal(known, checker));
        if !resolved {
            return Err(OfferswapError::UnknownAsset(*asset));
        }
    }

    let reviewer = recomputed.negated();
    tracing::debug!(trade_id = %offer.trade_id(), delta = ?reviewer, "Offer reviewed");
    Ok(reviewer)
}

#[cfg(test)]
mod tests {
    use offerswap_types::{AssetMetadata, EngineConfig, GenesisChecker};
    use offerswap_wallet::{Ed25519Signer, SigningOracle, SimWallet, SimulatedChain, sign_bundle};

    use super::*;
    use crate::{OfferBuilder, asset_metadata};

    struct Fixture {
        maker: Ed25519Signer,
        maker_wallet: SimWallet,
        taker_wallet: SimWallet,
        token: AssetId,
        checker: GenesisChecker,
    }

    fn fixture() -> Fixture {
        let chain = SimulatedChain::new();
        let maker = Ed25519Signer::generate();
        let taker = Ed25519Signer::generate();
        let checker = GenesisChecker(b"token-t".to_vec());
        let token = checker.asset_id();
        chain.mint(maker.puzzle_hash(), token, 100);
        chain.mint(maker.puzzle_hash(), AssetId::Native, 100);
        let maker_wallet = chain.wallet(maker.puzzle_hash());
        maker_wallet.track_asset(checker.clone());
        let taker_wallet = chain.wallet(taker.puzzle_hash());
        Fixture {
            maker,
            maker_wallet,
            taker_wallet,
            token,
            checker,
        }
    }

    async fn build(fx: &Fixture, delta: &OfferDelta) -> Offer {
        let builder = OfferBuilder::new(fx.maker.puzzle(), &EngineConfig::default());
        let mut candidates = BTreeMap::new();
        for asset in [AssetId::Native, fx.token] {
            candidates.insert(asset, fx.maker_wallet.spendable_coins(&asset).await.unwrap());
        }
        let assets = asset_metadata(delta, &fx.maker_wallet).unwrap();
        builder
            .prepare(delta, &candidates, &assets)
            .unwrap()
            .sign(&fx.maker)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn reviewer_sees_negated_delta() {
        let fx = fixture();
        fx.taker_wallet.track_asset(fx.checker.clone());
        let delta = OfferDelta::new().with(AssetId::Native, 10).with(fx.token, -30);
        let offer = build(&fx, &delta).await;

        let seen = discrepancies(&offer, &fx.taker_wallet).await.unwrap();
        assert_eq!(seen.get(&AssetId::Native), Some(-10));
        assert_eq!(seen.get(&fx.token), Some(30));
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn zero_legs_do_not_show_up() {
        let fx = fixture();
        fx.taker_wallet.track_asset(fx.checker.clone());
        let other = GenesisChecker(b"token-z".to_vec()).asset_id();
        let delta = OfferDelta::new()
            .with(AssetId::Native, 10)
            .with(fx.token, -30)
            .with(other, 0);
        let offer = build(&fx, &delta).await;
        let seen = discrepancies(&offer, &fx.taker_wallet).await.unwrap();
        assert_eq!(seen.get(&other), None);
    }

    #[tokio::test]
    async fn untracked_token_is_unknown() {
        let fx = fixture();
        let delta = OfferDelta::new().with(AssetId::Native, 10).with(fx.token, -30);
        let offer = build(&fx, &delta).await;
        let err = discrepancies(&offer, &fx.taker_wallet).await.unwrap_err();
        assert!(matches!(err, OfferswapError::UnknownAsset(asset) if asset == fx.token));
    }

    #[tokio::test]
    async fn lying_delta_is_inconsistent() {
        let fx = fixture();
        fx.taker_wallet.track_asset(fx.checker.clone());
        let delta = OfferDelta::new().with(AssetId::Native, 10).with(fx.token, -30);
        let mut offer = build(&fx, &delta).await;
        offer.delta.insert(fx.token, -60);
        let err = discrepancies(&offer, &fx.taker_wallet).await.unwrap_err();
        assert!(matches!(err, OfferswapError::Inconsistent { .. }));
    }

    #[tokio::test]
    async fn unbound_spend_is_inconsistent() {
        let fx = fixture();
        fx.taker_wallet.track_asset(fx.checker.clone());
        let delta = OfferDelta::new().with(AssetId::Native, 10).with(fx.token, -30);
        let mut offer = build(&fx, &delta).await;
        offer.bundle.spends[0]
            .conditions
            .retain(|c| !matches!(c, Condition::AssertAnnouncement { .. }));
        offer.bundle.spends[0].signature = None;
        sign_bundle(&mut offer.bundle, &fx.maker).await.unwrap();
        let err = discrepancies(&offer, &fx.taker_wallet).await.unwrap_err();
        assert!(matches!(err, OfferswapError::Inconsistent { .. }));
    }

    #[tokio::test]
    async fn mislabelled_metadata_is_inconsistent() {
        let fx = fixture();
        fx.taker_wallet.track_asset(fx.checker.clone());
        let delta = OfferDelta::new().with(AssetId::Native, 10).with(fx.token, -30);
        let mut offer = build(&fx, &delta).await;
        offer.assets = vec![AssetMetadata {
            asset: fx.token,
            genesis_checker: GenesisChecker(b"something-else".to_vec()),
        }];
        let err = discrepancies(&offer, &fx.taker_wallet).await.unwrap_err();
        assert!(matches!(err, OfferswapError::Inconsistent { .. }));
    }

    #[tokio::test]
    async fn settlement_coins_cover_offered_amount() {
        let fx = fixture();
        let delta = OfferDelta::new().with(AssetId::Native, -40).with(fx.token, 5);
        let offer = build(&fx, &delta).await;
        let coins = settlement_coins(&offer);
        assert_eq!(coins.iter().map(|c| c.amount).sum::<u64>(), 40);
        assert!(coins.iter().all(|c| c.asset == AssetId::Native));
    }
}
