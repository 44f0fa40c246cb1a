//! Coin model.
//!
//! A [`Coin`] is immutable and consumed whole. Its id commits to the coin
//! that created it, its puzzle hash, its amount and its asset class, so a
//! coin's identity only exists in the context of the spend that made it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AssetId, CoinId, PuzzleHash, TradeId, constants, ids::tagged_hash};

/// A single unit of value locked behind a puzzle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    /// Id of the coin whose spend created this one.
    pub parent_id: CoinId,
    /// Commitment to the puzzle guarding this coin.
    pub puzzle_hash: PuzzleHash,
    pub amount: u64,
    pub asset: AssetId,
}

impl Coin {
    #[must_use]
    pub fn new(parent_id: CoinId, puzzle_hash: PuzzleHash, amount: u64, asset: AssetId) -> Self {
        Self {
            parent_id,
            puzzle_hash,
            amount,
            asset,
        }
    }

    /// Deterministic coin id.
    #[must_use]
    pub fn id(&self) -> CoinId {
        CoinId(tagged_hash(
            constants::TAG_COIN_ID,
            &[
                self.parent_id.as_bytes(),
                self.puzzle_hash.as_bytes(),
                &self.amount.to_le_bytes(),
                &self.asset.hash_bytes(),
            ],
        ))
    }
}

/// Chain view of a coin: when it was created and (if so) when it was spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinRecord {
    pub coin: Coin,
    pub confirmed_height: u32,
    pub spent_height: Option<u32>,
}

impl CoinRecord {
    #[must_use]
    pub fn is_unspent(&self) -> bool {
        self.spent_height.is_none()
    }
}

/// A coin reserved by a pending trade.
///
/// Exists only while the trade is pending on the side that locked it. The
/// Coin Lock Table destroys it on cancellation or confirmed settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedCoinRecord {
    pub trade_id: TradeId,
    pub coin: Coin,
    pub locked_at: DateTime<Utc>,
}

/// Dummy coins for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Coin {
    /// A coin with a parent id derived from `seed`.
    pub fn dummy(seed: u8, puzzle_hash: PuzzleHash, amount: u64, asset: AssetId) -> Self {
        Self::new(CoinId([seed; 32]), puzzle_hash, amount, asset)
    }
}
