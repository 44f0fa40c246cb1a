//! # offerswap-wallet
//!
//! The wallet side of the trade engine: what the engine consumes from the
//! outside world and the per-wallet state it owns.
//!
//! - [`AssetLedgerView`] / [`BroadcastChannel`]: read-only ledger access and
//!   bundle submission (external collaborators)
//! - [`SigningOracle`] with the [`Ed25519Signer`] implementation
//! - [`CoinLockTable`]: coins reserved by pending trades
//! - [`select_coins`]: deterministic smallest-set coin selection
//! - `sim` (feature `test-helpers`): an in-memory ledger for tests

pub mod coin_lock;
pub mod coin_selection;
pub mod ledger;
pub mod signer;
#[cfg(any(test, feature = "test-helpers"))]
pub mod sim;

pub use coin_lock::CoinLockTable;
pub use coin_selection::{select_coins, total_amount};
pub use ledger::{AssetLedgerView, BroadcastChannel, BroadcastOutcome, SpendConfirmation};
pub use signer::{Ed25519Signer, SigningOracle, sign_bundle, verify_bundle, verify_fragment};
#[cfg(any(test, feature = "test-helpers"))]
pub use sim::{SimWallet, SimulatedChain};
