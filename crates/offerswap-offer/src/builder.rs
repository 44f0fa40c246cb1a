//! Offer Builder: turns a delta into the initiator's half of a swap.
//!
//! ## Shape of an offer
//!
//! ```text
//!   initiator coin ──spend──▶ settlement coin (amount offered)   ─┐
//!        │                    change coin (back to initiator)     │ claimed by
//!        └─ asserts: every requested payment is announced         │ whoever pays
//!                                                                  ▼ the terms
//!   terms = { nonce, [(asset, initiator puzzle hash, amount requested)] }
//! ```
//!
//! The settlement puzzle commits to the terms hash, and every initiator spend
//! asserts the payment announcements for those same terms. Neither side of
//! the offer can be consumed by a bundle that does not pay the initiator
//! exactly what it asked for.
//!
//! Building is split in two: [`OfferBuilder::prepare`] is synchronous (coin
//! selection and spend construction, run while the caller holds its lock
//! table) and [`PreparedOffer::sign`] suspends on the signing oracle.

use std::collections::BTreeMap;

use offerswap_types::{
    AssetId, AssetMetadata, Coin, Condition, EngineConfig, Offer, OfferDelta, OfferTerms,
    OfferswapError, Puzzle, RequestedPayment, Result, SpendBundle, SpendIntent, TradeId, constants,
    payment_announcement_id, settlement_puzzle_hash, tagged_hash,
};
use offerswap_wallet::{AssetLedgerView, SigningOracle, select_coins, sign_bundle};

/// An offer with coins chosen and spends built, not yet signed.
#[derive(Debug, Clone)]
pub struct PreparedOffer {
    pub offer: Offer,
    /// Coins the offer spends; the caller locks these.
    pub selected: Vec<Coin>,
}

impl PreparedOffer {
    /// Known before signing: bundle ids exclude signatures.
    #[must_use]
    pub fn trade_id(&self) -> TradeId {
        self.offer.trade_id()
    }

    /// Sign every spend with the initiator's key.
    ///
    /// # Errors
    /// Propagates `SigningFailed`.
    pub async fn sign(mut self, signer: &dyn SigningOracle) -> Result<Offer> {
        sign_bundle(&mut self.offer.bundle, signer).await?;
        Ok(self.offer)
    }
}

/// Builds offers on behalf of one wallet.
#[derive(Debug, Clone)]
pub struct OfferBuilder {
    own: Puzzle,
    allow_zero_legs: bool,
}

impl OfferBuilder {
    #[must_use]
    pub fn new(own: Puzzle, config: &EngineConfig) -> Self {
        Self {
            own,
            allow_zero_legs: config.allow_zero_legs,
        }
    }

    /// Select coins and build the initiator's spends for `delta`.
    ///
    /// `candidates` holds the wallet's unlocked spendable coins per asset;
    /// `assets` must carry a genesis checker for every token in `delta`.
    ///
    /// # Errors
    /// - `InvalidOffer` if `delta` is not a two-sided trade
    /// - `InsufficientFunds` if an offered asset cannot be covered
    /// - `UnknownAsset` if a token has no metadata
    pub fn prepare(
        &self,
        delta: &OfferDelta,
        candidates: &BTreeMap<AssetId, Vec<Coin>>,
        assets: &[AssetMetadata],
    ) -> Result<PreparedOffer> {
        delta.validate(self.allow_zero_legs)?;
        let legs = delta.non_zero();

        for (asset, _) in legs.iter() {
            if !asset.is_native() && !assets.iter().any(|meta| meta.asset == *asset) {
                return Err(OfferswapError::UnknownAsset(*asset));
            }
        }

        let mut selections = Vec::new();
        for (asset, amount) in legs.offered() {
            let pool = candidates.get(&asset).map_or(&[][..], Vec::as_slice);
            selections.push((asset, amount, select_coins(pool, &asset, amount)?));
        }

        let own_ph = self.own.puzzle_hash();
        let terms = OfferTerms {
            nonce: offer_nonce(
                selections.iter().flat_map(|(_, _, coins)| coins),
                &rand::random(),
            ),
            payments: legs
                .requested()
                .map(|(asset, amount)| RequestedPayment {
                    asset,
                    puzzle_hash: own_ph,
                    amount,
                })
                .collect(),
        };
        let terms_hash = terms.terms_hash();
        let settlement_ph = settlement_puzzle_hash(&terms_hash);
        let required: Vec<Condition> = terms
            .payments
            .iter()
            .map(|payment| Condition::AssertAnnouncement {
                announcement_id: payment_announcement_id(
                    &payment.asset,
                    &terms_hash,
                    &payment.puzzle_hash,
                    payment.amount,
                ),
            })
            .collect();

        let mut spends = Vec::new();
        let mut selected = Vec::new();
        for (asset, amount, coins) in selections {
            let mut remaining = amount;
            for coin in coins {
                let settle = coin.amount.min(remaining);
                remaining -= settle;
                let change = coin.amount - settle;

                let mut conditions = Vec::with_capacity(required.len() + 3);
                if settle > 0 {
                    conditions.push(Condition::CreateCoin {
                        puzzle_hash: settlement_ph,
                        amount: settle,
                    });
                }
                if change > 0 {
                    conditions.push(Condition::CreateCoin {
                        puzzle_hash: own_ph,
                        amount: change,
                    });
                }
                conditions.extend(required.iter().cloned());
                if !asset.is_native() {
                    conditions.push(Condition::AssertAssetClass { asset });
                }
                spends.push(SpendIntent::new(coin, self.own.clone(), conditions));
                selected.push(coin);
            }
        }

        let offer = Offer {
            version: constants::OFFER_FORMAT_VERSION,
            delta: delta.clone(),
            terms,
            bundle: SpendBundle::new(spends),
            assets: legs
                .iter()
                .filter_map(|(asset, _)| assets.iter().find(|meta| meta.asset == *asset))
                .cloned()
                .collect(),
        };
        tracing::debug!(
            trade_id = %offer.trade_id(),
            spends = offer.bundle.spends.len(),
            payments = offer.terms.payments.len(),
            "Offer prepared"
        );
        Ok(PreparedOffer { offer, selected })
    }

    /// Unsigned bundle sending `coins` straight back to the wallet's own
    /// puzzle hash. Used by secure cancel: once it confirms, the offer's
    /// coins are gone and no completion can succeed.
    #[must_use]
    pub fn reclaim_bundle(&self, coins: &[Coin]) -> SpendBundle {
        let own_ph = self.own.puzzle_hash();
        SpendBundle::new(
            coins
                .iter()
                .map(|coin| {
                    let mut conditions = vec![Condition::CreateCoin {
                        puzzle_hash: own_ph,
                        amount: coin.amount,
                    }];
                    if !coin.asset.is_native() {
                        conditions.push(Condition::AssertAssetClass { asset: coin.asset });
                    }
                    SpendIntent::new(*coin, self.own.clone(), conditions)
                })
                .collect(),
        )
    }
}

/// Genesis checkers for every token leg of `delta`, looked up in the ledger.
///
/// # Errors
/// Returns `UnknownAsset` for a token the wallet does not track.
pub fn asset_metadata(delta: &OfferDelta, ledger: &dyn AssetLedgerView) -> Result<Vec<AssetMetadata>> {
    delta
        .non_zero()
        .iter()
        .filter(|(asset, _)| !asset.is_native())
        .map(|(asset, _)| {
            ledger
                .asset_checker(asset)
                .map(|genesis_checker| AssetMetadata {
                    asset: *asset,
                    genesis_checker,
                })
                .ok_or(OfferswapError::UnknownAsset(*asset))
        })
        .collect()
}

/// Nonce bound to the coins an offer spends and salted per offer, so
/// offering the same coins again yields a new trade id.
fn offer_nonce<'a>(coins: impl Iterator<Item = &'a Coin>, salt: &[u8; 16]) -> [u8; 32] {
    let mut ids: Vec<_> = coins.map(Coin::id).collect();
    ids.sort();
    let bytes: Vec<u8> = ids.iter().flat_map(|id| id.as_bytes().to_vec()).collect();
    tagged_hash(constants::TAG_OFFER_NONCE, &[bytes.as_slice(), salt.as_slice()])
}

#[cfg(test)]
mod tests {
    use offerswap_types::GenesisChecker;
    use offerswap_wallet::{Ed25519Signer, verify_bundle};

    use super::*;

    fn token() -> (AssetId, AssetMetadata) {
        let checker = GenesisChecker(b"token-t".to_vec());
        let asset = checker.asset_id();
        (
            asset,
            AssetMetadata {
                asset,
                genesis_checker: checker,
            },
        )
    }

    fn wallet_coins(signer: &Ed25519Signer, asset: AssetId, amounts: &[u64]) -> Vec<Coin> {
        amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| {
                Coin::dummy(u8::try_from(i).unwrap() + 1, signer.puzzle_hash(), *amount, asset)
            })
            .collect()
    }

    #[test]
    fn token_for_native_offer_shape() {
        let signer = Ed25519Signer::generate();
        let (token, meta) = token();
        let builder = OfferBuilder::new(signer.puzzle(), &EngineConfig::default());
        let candidates = BTreeMap::from([(token, wallet_coins(&signer, token, &[50]))]);
        let delta = OfferDelta::new().with(AssetId::Native, 10).with(token, -30);

        let prepared = builder.prepare(&delta, &candidates, &[meta]).unwrap();
        let offer = &prepared.offer;
        assert_eq!(prepared.selected.len(), 1);
        assert_eq!(offer.bundle.spends.len(), 1);
        assert_eq!(offer.terms.payments.len(), 1);
        assert_eq!(offer.terms.payments[0].amount, 10);
        assert_eq!(offer.terms.payments[0].puzzle_hash, signer.puzzle_hash());

        let spend = &offer.bundle.spends[0];
        assert!(spend.conserves_value());
        let settlement_ph = settlement_puzzle_hash(&offer.terms.terms_hash());
        let outputs = spend.outputs();
        assert!(outputs.iter().any(|c| c.puzzle_hash == settlement_ph && c.amount == 30));
        assert!(outputs.iter().any(|c| c.puzzle_hash == signer.puzzle_hash() && c.amount == 20));
        assert_eq!(spend.asserted_announcements().len(), 1);
        assert!(spend.conditions.contains(&Condition::AssertAssetClass { asset: token }));
        assert_eq!(offer.assets.len(), 1);
    }

    #[test]
    fn multi_coin_selection_splits_settlement() {
        let signer = Ed25519Signer::generate();
        let builder = OfferBuilder::new(signer.puzzle(), &EngineConfig::default());
        let (token, meta) = token();
        let candidates =
            BTreeMap::from([(AssetId::Native, wallet_coins(&signer, AssetId::Native, &[20, 15]))]);
        let delta = OfferDelta::new().with(AssetId::Native, -30).with(token, 50);

        let prepared = builder.prepare(&delta, &candidates, &[meta]).unwrap();
        let settlement_ph = settlement_puzzle_hash(&prepared.offer.terms.terms_hash());
        let settled: u64 = prepared
            .offer
            .bundle
            .additions()
            .iter()
            .filter(|c| c.puzzle_hash == settlement_ph)
            .map(|c| c.amount)
            .sum();
        assert_eq!(settled, 30);
        assert_eq!(prepared.selected.len(), 2);
    }

    #[test]
    fn insufficient_funds() {
        let signer = Ed25519Signer::generate();
        let builder = OfferBuilder::new(signer.puzzle(), &EngineConfig::default());
        let (token, meta) = token();
        let candidates = BTreeMap::from([(token, wallet_coins(&signer, token, &[10]))]);
        let delta = OfferDelta::new().with(AssetId::Native, 10).with(token, -30);
        let err = builder.prepare(&delta, &candidates, &[meta]).unwrap_err();
        assert!(matches!(err, OfferswapError::InsufficientFunds { needed: 30, .. }));
    }

    #[test]
    fn one_sided_delta_rejected() {
        let signer = Ed25519Signer::generate();
        let builder = OfferBuilder::new(signer.puzzle(), &EngineConfig::default());
        let delta = OfferDelta::new().with(AssetId::Native, -10);
        let err = builder.prepare(&delta, &BTreeMap::new(), &[]).unwrap_err();
        assert!(matches!(err, OfferswapError::InvalidOffer { .. }));
    }

    #[test]
    fn token_without_metadata_is_unknown() {
        let signer = Ed25519Signer::generate();
        let builder = OfferBuilder::new(signer.puzzle(), &EngineConfig::default());
        let (token, _) = token();
        let delta = OfferDelta::new().with(AssetId::Native, -10).with(token, 5);
        let err = builder.prepare(&delta, &BTreeMap::new(), &[]).unwrap_err();
        assert!(matches!(err, OfferswapError::UnknownAsset(asset) if asset == token));
    }

    #[tokio::test]
    async fn signed_offer_verifies_and_keeps_trade_id() {
        let signer = Ed25519Signer::generate();
        let builder = OfferBuilder::new(signer.puzzle(), &EngineConfig::default());
        let (token, meta) = token();
        let candidates = BTreeMap::from([(token, wallet_coins(&signer, token, &[30]))]);
        let delta = OfferDelta::new().with(AssetId::Native, 10).with(token, -30);

        let prepared = builder.prepare(&delta, &candidates, &[meta]).unwrap();
        let trade_id = prepared.trade_id();
        let offer = prepared.sign(&signer).await.unwrap();
        assert_eq!(offer.trade_id(), trade_id);
        assert!(verify_bundle(&offer.bundle).is_ok());
    }

    #[test]
    fn reclaim_returns_every_coin() {
        let signer = Ed25519Signer::generate();
        let builder = OfferBuilder::new(signer.puzzle(), &EngineConfig::default());
        let coins = wallet_coins(&signer, AssetId::Native, &[5, 7]);
        let bundle = builder.reclaim_bundle(&coins);
        assert_eq!(bundle.removals().len(), 2);
        assert!(bundle.is_balanced());
        assert!(
            bundle
                .additions()
                .iter()
                .all(|c| c.puzzle_hash == signer.puzzle_hash())
        );
    }
}
