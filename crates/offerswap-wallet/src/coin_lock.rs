//! Coin Lock Table: which coins are reserved by which pending trade.
//!
//! Locking is the only concurrency-control primitive of the engine. A coin
//! is held by at most one trade; a `lock` call either reserves every coin it
//! is given or none of them.

use std::collections::HashMap;

use chrono::Utc;
use offerswap_types::{AssetId, Coin, CoinId, LockedCoinRecord, OfferswapError, Result, TradeId};

/// Per-wallet table of locked coins.
#[derive(Debug, Default)]
pub struct CoinLockTable {
    /// Every locked coin, indexed by its id.
    by_coin: HashMap<CoinId, LockedCoinRecord>,
    /// Locked coin ids per trade, in lock order.
    by_trade: HashMap<TradeId, Vec<CoinId>>,
}

impl CoinLockTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `coins` for `trade_id`.
    ///
    /// All coins are checked before any is inserted, so a failure leaves
    /// the table untouched. Locking a coin the same trade already holds is
    /// a no-op.
    ///
    /// # Errors
    /// Returns `AlreadyLocked` naming the first coin held by another trade.
    pub fn lock(&mut self, trade_id: TradeId, coins: &[Coin]) -> Result<()> {
        for coin in coins {
            if let Some(held) = self.by_coin.get(&coin.id()) {
                if held.trade_id != trade_id {
                    return Err(OfferswapError::AlreadyLocked {
                        coin: coin.id(),
                        trade_id: held.trade_id,
                    });
                }
            }
        }

        let now = Utc::now();
        let ids = self.by_trade.entry(trade_id).or_default();
        for coin in coins {
            let coin_id = coin.id();
            if self.by_coin.contains_key(&coin_id) {
                continue;
            }
            self.by_coin.insert(
                coin_id,
                LockedCoinRecord {
                    trade_id,
                    coin: *coin,
                    locked_at: now,
                },
            );
            ids.push(coin_id);
        }
        tracing::debug!(trade_id = %trade_id, coins = coins.len(), "Coins locked");
        Ok(())
    }

    /// Release every coin held by `trade_id`. Returns the released coins;
    /// empty if the trade held none (a second unlock never double-releases).
    pub fn unlock(&mut self, trade_id: TradeId) -> Vec<Coin> {
        let released: Vec<Coin> = self
            .by_trade
            .remove(&trade_id)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|coin_id| self.by_coin.remove(&coin_id))
            .map(|record| record.coin)
            .collect();
        if !released.is_empty() {
            tracing::debug!(trade_id = %trade_id, coins = released.len(), "Coins unlocked");
        }
        released
    }

    #[must_use]
    pub fn is_locked(&self, coin_id: &CoinId) -> bool {
        self.by_coin.contains_key(coin_id)
    }

    /// The trade holding `coin_id`, if any.
    #[must_use]
    pub fn locked_by(&self, coin_id: &CoinId) -> Option<TradeId> {
        self.by_coin.get(coin_id).map(|record| record.trade_id)
    }

    /// Coins held by one trade, in lock order.
    #[must_use]
    pub fn coins_for_trade(&self, trade_id: &TradeId) -> Vec<Coin> {
        self.by_trade
            .get(trade_id)
            .into_iter()
            .flatten()
            .filter_map(|coin_id| self.by_coin.get(coin_id))
            .map(|record| record.coin)
            .collect()
    }

    /// Locked coins of one asset class.
    #[must_use]
    pub fn locked_coins(&self, asset: &AssetId) -> HashMap<CoinId, LockedCoinRecord> {
        self.by_coin
            .iter()
            .filter(|(_, record)| record.coin.asset == *asset)
            .map(|(id, record)| (*id, *record))
            .collect()
    }

    /// Every locked coin.
    #[must_use]
    pub fn all_locked(&self) -> HashMap<CoinId, LockedCoinRecord> {
        self.by_coin.clone()
    }

    /// Sum of locked amounts of one asset class.
    #[must_use]
    pub fn locked_amount(&self, asset: &AssetId) -> u64 {
        self.by_coin
            .values()
            .filter(|record| record.coin.asset == *asset)
            .fold(0u64, |acc, record| acc.saturating_add(record.coin.amount))
    }

    /// Number of locked coins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_coin.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_coin.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use offerswap_types::{BundleId, PuzzleHash, TokenColour};

    use super::*;

    fn trade(n: u8) -> TradeId {
        TradeId::from_bundle(&BundleId([n; 32]))
    }

    fn coin(seed: u8, amount: u64) -> Coin {
        Coin::dummy(seed, PuzzleHash([1u8; 32]), amount, AssetId::Native)
    }

    #[test]
    fn lock_and_unlock() {
        let mut table = CoinLockTable::new();
        let coins = [coin(1, 10), coin(2, 20)];
        table.lock(trade(1), &coins).unwrap();

        assert!(table.is_locked(&coins[0].id()));
        assert_eq!(table.locked_by(&coins[1].id()), Some(trade(1)));
        assert_eq!(table.locked_amount(&AssetId::Native), 30);
        assert_eq!(table.coins_for_trade(&trade(1)), coins.to_vec());

        let released = table.unlock(trade(1));
        assert_eq!(released.len(), 2);
        assert!(table.is_empty());
    }

    #[test]
    fn coin_held_by_one_trade_only() {
        let mut table = CoinLockTable::new();
        table.lock(trade(1), &[coin(1, 10)]).unwrap();

        let err = table.lock(trade(2), &[coin(2, 5), coin(1, 10)]).unwrap_err();
        assert!(matches!(
            err,
            OfferswapError::AlreadyLocked { trade_id, .. } if trade_id == trade(1)
        ));
        // All-or-nothing: coin 2 was not locked either.
        assert!(!table.is_locked(&coin(2, 5).id()));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn relocking_own_coin_is_noop() {
        let mut table = CoinLockTable::new();
        table.lock(trade(1), &[coin(1, 10)]).unwrap();
        table.lock(trade(1), &[coin(1, 10)]).unwrap();
        assert_eq!(table.coins_for_trade(&trade(1)).len(), 1);
    }

    #[test]
    fn second_unlock_releases_nothing() {
        let mut table = CoinLockTable::new();
        table.lock(trade(1), &[coin(1, 10)]).unwrap();
        assert_eq!(table.unlock(trade(1)).len(), 1);
        assert!(table.unlock(trade(1)).is_empty());
    }

    #[test]
    fn locked_coins_filter_by_asset() {
        let mut table = CoinLockTable::new();
        let token = AssetId::Token(TokenColour([4u8; 32]));
        let token_coin = Coin::dummy(3, PuzzleHash([1u8; 32]), 7, token);
        table.lock(trade(1), &[coin(1, 10), token_coin]).unwrap();

        let locked = table.locked_coins(&token);
        assert_eq!(locked.len(), 1);
        assert_eq!(locked[&token_coin.id()].trade_id, trade(1));
        assert_eq!(table.locked_amount(&token), 7);
        assert_eq!(table.all_locked().len(), 2);
    }
}
