//! Spending conditions ("puzzles") and the conditions a spend emits.
//!
//! The engine never evaluates a scripting language. A puzzle is one of two
//! fixed shapes, and a spend's effect is the list of [`Condition`]s it
//! declares. What the ledger must enforce for each shape:
//!
//! ```text
//!   Standard { owner }     spend needs an ed25519 signature by `owner`
//!                          over the spend message
//!   Settlement { terms }   spend needs no signature, but the bundle must
//!                          announce every payment listed in `terms`
//! ```
//!
//! Value is conserved per asset class across a whole bundle: token outputs
//! equal token inputs exactly, native outputs never exceed native inputs.

use serde::{Deserialize, Serialize};

use crate::{
    AssetId, CoinId, OfferTerms, PuzzleHash, TokenColour, constants,
    ids::{hex_vec, hex32, tagged_hash},
};

// ---------------------------------------------------------------------------
// GenesisChecker
// ---------------------------------------------------------------------------

/// Opaque issuance rule of a token asset class.
///
/// Two wallets agree on a token when their checkers are genesis-equal; the
/// colour (and so the [`AssetId`]) is the hash of the checker bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenesisChecker(#[serde(with = "hex_vec")] pub Vec<u8>);

impl GenesisChecker {
    #[must_use]
    pub fn colour(&self) -> TokenColour {
        TokenColour(tagged_hash(constants::TAG_GENESIS, &[&self.0]))
    }

    #[must_use]
    pub fn asset_id(&self) -> AssetId {
        AssetId::Token(self.colour())
    }
}

// ---------------------------------------------------------------------------
// Puzzle
// ---------------------------------------------------------------------------

/// A spending condition, revealed in full when a coin is spent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Puzzle {
    /// Owned by an ed25519 key.
    Standard {
        #[serde(with = "hex32")]
        owner: [u8; 32],
    },
    /// Intermediate offer coin, claimable by whoever pays `terms`.
    Settlement { terms: OfferTerms },
}

impl Puzzle {
    #[must_use]
    pub fn standard(owner: [u8; 32]) -> Self {
        Self::Standard { owner }
    }

    #[must_use]
    pub fn puzzle_hash(&self) -> PuzzleHash {
        match self {
            Self::Standard { owner } => {
                PuzzleHash(tagged_hash(constants::TAG_PUZZLE, &[&[0u8], owner]))
            }
            Self::Settlement { terms } => settlement_puzzle_hash(&terms.terms_hash()),
        }
    }

    #[must_use]
    pub fn requires_signature(&self) -> bool {
        matches!(self, Self::Standard { .. })
    }
}

/// Puzzle hash of the settlement puzzle for a given terms hash.
///
/// The builder uses this to route offered value without revealing terms twice.
#[must_use]
pub fn settlement_puzzle_hash(terms_hash: &[u8; 32]) -> PuzzleHash {
    PuzzleHash(tagged_hash(constants::TAG_PUZZLE, &[&[1u8], terms_hash]))
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// An externally observable effect of a spend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    /// Create a coin of the spent coin's asset.
    CreateCoin { puzzle_hash: PuzzleHash, amount: u64 },
    /// Create a coin *and* announce that it pays an offer's terms.
    CreatePayment {
        #[serde(with = "hex32")]
        terms_hash: [u8; 32],
        puzzle_hash: PuzzleHash,
        amount: u64,
    },
    /// Require an announcement to be made elsewhere in the same bundle.
    AssertAnnouncement {
        #[serde(with = "hex32")]
        announcement_id: [u8; 32],
    },
    /// Require the spent coin to belong to this asset class.
    AssertAssetClass { asset: AssetId },
    /// Require another coin to be spent in the same bundle.
    AssertCoinSpent { coin_id: CoinId },
}

impl Condition {
    /// Amount of value this condition moves into a new coin, if any.
    #[must_use]
    pub fn output(&self) -> Option<(PuzzleHash, u64)> {
        match self {
            Self::CreateCoin {
                puzzle_hash,
                amount,
            }
            | Self::CreatePayment {
                puzzle_hash,
                amount,
                ..
            } => Some((*puzzle_hash, *amount)),
            _ => None,
        }
    }

    /// Canonical bytes, fed into spend messages and bundle ids.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Self::CreateCoin {
                puzzle_hash,
                amount,
            } => {
                out.push(0);
                out.extend_from_slice(puzzle_hash.as_bytes());
                out.extend_from_slice(&amount.to_le_bytes());
            }
            Self::CreatePayment {
                terms_hash,
                puzzle_hash,
                amount,
            } => {
                out.push(1);
                out.extend_from_slice(terms_hash);
                out.extend_from_slice(puzzle_hash.as_bytes());
                out.extend_from_slice(&amount.to_le_bytes());
            }
            Self::AssertAnnouncement { announcement_id } => {
                out.push(2);
                out.extend_from_slice(announcement_id);
            }
            Self::AssertAssetClass { asset } => {
                out.push(3);
                out.extend_from_slice(&asset.hash_bytes());
            }
            Self::AssertCoinSpent { coin_id } => {
                out.push(4);
                out.extend_from_slice(coin_id.as_bytes());
            }
        }
    }
}

/// Announcement id made by a `CreatePayment` of `asset`.
///
/// Binds the asset class, the terms, the recipient and the amount, so an
/// assertion on it can only be satisfied by that exact counter-payment.
#[must_use]
pub fn payment_announcement_id(
    asset: &AssetId,
    terms_hash: &[u8; 32],
    puzzle_hash: &PuzzleHash,
    amount: u64,
) -> [u8; 32] {
    let message = tagged_hash(
        constants::TAG_PAYMENT,
        &[terms_hash, puzzle_hash.as_bytes(), &amount.to_le_bytes()],
    );
    tagged_hash(constants::TAG_ANNOUNCEMENT, &[&asset.hash_bytes(), &message])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RequestedPayment;

    fn terms() -> OfferTerms {
        OfferTerms {
            nonce: [5u8; 32],
            payments: vec![RequestedPayment {
                asset: AssetId::Native,
                puzzle_hash: PuzzleHash([1u8; 32]),
                amount: 10,
            }],
        }
    }

    #[test]
    fn standard_and_settlement_hashes_differ() {
        let standard = Puzzle::standard([5u8; 32]);
        let settlement = Puzzle::Settlement { terms: terms() };
        assert_ne!(standard.puzzle_hash(), settlement.puzzle_hash());
    }

    #[test]
    fn settlement_hash_matches_helper() {
        let t = terms();
        let puzzle = Puzzle::Settlement { terms: t.clone() };
        assert_eq!(puzzle.puzzle_hash(), settlement_puzzle_hash(&t.terms_hash()));
    }

    #[test]
    fn only_standard_needs_signature() {
        assert!(Puzzle::standard([0u8; 32]).requires_signature());
        assert!(!Puzzle::Settlement { terms: terms() }.requires_signature());
    }

    #[test]
    fn payment_announcement_binds_amount_and_asset() {
        let ph = PuzzleHash([1u8; 32]);
        let base = payment_announcement_id(&AssetId::Native, &[0u8; 32], &ph, 10);
        assert_ne!(
            base,
            payment_announcement_id(&AssetId::Native, &[0u8; 32], &ph, 11)
        );
        assert_ne!(
            base,
            payment_announcement_id(
                &AssetId::Token(TokenColour([0u8; 32])),
                &[0u8; 32],
                &ph,
                10
            )
        );
    }

    #[test]
    fn genesis_checker_colour_is_stable() {
        let a = GenesisChecker(b"genesis_by_id:1".to_vec());
        let b = GenesisChecker(b"genesis_by_id:1".to_vec());
        assert_eq!(a.asset_id(), b.asset_id());
        assert_ne!(
            a.asset_id(),
            GenesisChecker(b"genesis_by_id:2".to_vec()).asset_id()
        );
    }

    #[test]
    fn condition_output() {
        let ph = PuzzleHash([1u8; 32]);
        let create = Condition::CreateCoin {
            puzzle_hash: ph,
            amount: 4,
        };
        assert_eq!(create.output(), Some((ph, 4)));
        let assert = Condition::AssertAssetClass {
            asset: AssetId::Native,
        };
        assert_eq!(assert.output(), None);
    }
}
