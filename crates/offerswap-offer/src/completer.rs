//! Offer Completer: the responder's half of the swap.
//!
//! Given a reviewed offer the completer adds two kinds of spends:
//!
//! - **payments**: the responder's own coins, emitting a `CreatePayment`
//!   for every requested payment (this is what satisfies the initiator's
//!   announcement assertions), plus change;
//! - **claims**: every settlement coin, spent through the revealed
//!   settlement puzzle into the responder's own puzzle hash.
//!
//! Every payment spend asserts every claim, so the responder never pays
//! without also collecting.

use std::collections::BTreeMap;

use offerswap_types::{
    AssetId, Coin, Condition, Offer, OfferDelta, OfferswapError, Puzzle, Result, SpendBundle,
    SpendIntent, TradeId,
};
use offerswap_wallet::{AssetLedgerView, SigningOracle, select_coins, sign_bundle, total_amount};

use crate::validator::settlement_coins;

/// A completed, not yet signed, bundle and the coins it spends from the
/// responder's wallet.
#[derive(Debug, Clone)]
pub struct Completion {
    pub offer: Offer,
    /// The responder's delta.
    pub delta: OfferDelta,
    /// Initiator spends followed by the responder's.
    pub bundle: SpendBundle,
    /// The responder's own coins; the caller locks these.
    pub selected: Vec<Coin>,
}

impl Completion {
    #[must_use]
    pub fn trade_id(&self) -> TradeId {
        self.offer.trade_id()
    }

    /// Sign the responder's spends and aggregate with the initiator's fragments.
    ///
    /// # Errors
    /// Propagates `SigningFailed`.
    pub async fn sign(&mut self, signer: &dyn SigningOracle) -> Result<()> {
        sign_bundle(&mut self.bundle, signer).await
    }
}

/// Completes offers on behalf of one wallet.
#[derive(Debug, Clone)]
pub struct OfferCompleter {
    own: Puzzle,
}

impl OfferCompleter {
    #[must_use]
    pub fn new(own: Puzzle) -> Self {
        Self { own }
    }

    /// Build the complementary spends for `offer`.
    ///
    /// `delta` is the reviewer's delta from [`crate::discrepancies`];
    /// `candidates` the wallet's unlocked spendable coins per asset.
    ///
    /// # Errors
    /// Returns `InsufficientFunds` if a requested payment cannot be covered.
    pub fn prepare(
        &self,
        offer: &Offer,
        delta: &OfferDelta,
        candidates: &BTreeMap<AssetId, Vec<Coin>>,
    ) -> Result<Completion> {
        let terms_hash = offer.terms.terms_hash();
        let own_ph = self.own.puzzle_hash();

        let claims: Vec<SpendIntent> = settlement_coins(offer)
            .into_iter()
            .map(|coin| {
                let mut conditions = vec![Condition::CreateCoin {
                    puzzle_hash: own_ph,
                    amount: coin.amount,
                }];
                if !coin.asset.is_native() {
                    conditions.push(Condition::AssertAssetClass { asset: coin.asset });
                }
                SpendIntent::new(
                    coin,
                    Puzzle::Settlement {
                        terms: offer.terms.clone(),
                    },
                    conditions,
                )
            })
            .collect();
        let claimed: Vec<Condition> = claims
            .iter()
            .map(|claim| Condition::AssertCoinSpent {
                coin_id: claim.coin_id(),
            })
            .collect();

        let mut by_asset: BTreeMap<AssetId, Vec<Condition>> = BTreeMap::new();
        for payment in &offer.terms.payments {
            by_asset
                .entry(payment.asset)
                .or_default()
                .push(Condition::CreatePayment {
                    terms_hash,
                    puzzle_hash: payment.puzzle_hash,
                    amount: payment.amount,
                });
        }

        let totals = offer.terms.requested_totals();
        let mut payments = Vec::new();
        let mut selected = Vec::new();
        for (asset, creates) in by_asset {
            let needed = totals.get(&asset).copied().unwrap_or(0);
            let pool = candidates.get(&asset).map_or(&[][..], Vec::as_slice);
            let coins = select_coins(pool, &asset, needed)?;
            let change = total_amount(&coins) - needed;

            // The first coin carries every output; the rest only contribute
            // value, which balances per asset across the bundle.
            for (i, coin) in coins.iter().enumerate() {
                let mut conditions = Vec::new();
                if i == 0 {
                    conditions.extend(creates.iter().cloned());
                    if change > 0 {
                        conditions.push(Condition::CreateCoin {
                            puzzle_hash: own_ph,
                            amount: change,
                        });
                    }
                }
                conditions.extend(claimed.iter().cloned());
                if !asset.is_native() {
                    conditions.push(Condition::AssertAssetClass { asset });
                }
                payments.push(SpendIntent::new(*coin, self.own.clone(), conditions));
            }
            selected.extend(coins);
        }

        let mut bundle = offer.bundle.clone();
        payments.extend(claims);
        bundle.merge(SpendBundle::new(payments));

        if !bundle.is_balanced() {
            return Err(OfferswapError::ConservationViolation {
                reason: format!("completed bundle {} does not balance", bundle.id()),
            });
        }
        tracing::debug!(
            trade_id = %offer.trade_id(),
            spends = bundle.spends.len(),
            "Offer completion prepared"
        );
        Ok(Completion {
            offer: offer.clone(),
            delta: delta.clone(),
            bundle,
            selected,
        })
    }
}

/// Every coin the initiator spends must still be unspent on chain.
///
/// # Errors
/// Returns `StaleOffer` naming the first coin that is gone.
pub async fn ensure_fresh(offer: &Offer, ledger: &dyn AssetLedgerView) -> Result<()> {
    for spend in &offer.bundle.spends {
        let coin_id = spend.coin_id();
        let unspent = ledger
            .coin_record(&coin_id)
            .await?
            .is_some_and(|record| record.is_unspent());
        if !unspent {
            return Err(OfferswapError::StaleOffer { coin: coin_id });
        }
    }
    Ok(())
}
