//! # offerswap-types
//!
//! Shared types, errors, and configuration for the **offerswap** trade engine.
//!
//! This crate is the leaf dependency of the workspace: every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`AssetId`], [`TokenColour`], [`CoinId`], [`PuzzleHash`], [`BundleId`], [`TradeId`]
//! - **Coin model**: [`Coin`], [`CoinRecord`], [`LockedCoinRecord`]
//! - **Spending conditions**: [`Puzzle`], [`Condition`], [`GenesisChecker`]
//! - **Bundles**: [`SpendIntent`], [`SpendBundle`], [`SignatureFragment`], [`AggregateSignature`]
//! - **Offers**: [`OfferDelta`], [`OfferTerms`], [`RequestedPayment`], [`Offer`]
//! - **Trades**: [`TradeRecord`], [`TradeStatus`], [`TradeRole`]
//! - **Configuration**: [`EngineConfig`]
//! - **Errors**: [`OfferswapError`] with `OS_ERR_` prefix codes
//! - **Constants**: hashing domain tags and defaults

pub mod bundle;
pub mod coin;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod offer;
pub mod puzzle;
pub mod trade;

pub use bundle::*;
pub use coin::*;
pub use config::*;
pub use error::*;
pub use ids::{AssetId, BundleId, CoinId, PuzzleHash, TokenColour, TradeId, tagged_hash};
pub use offer::*;
pub use puzzle::*;
pub use trade::*;

// Constants are accessed via `offerswap_types::constants::FOO`
// (not re-exported to avoid name collisions).
