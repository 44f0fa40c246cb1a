//! Collaborator seams the trade engine consumes but never implements:
//! a read-only view of the ledger and a channel to submit bundles.

use async_trait::async_trait;
use offerswap_types::{AssetId, BundleId, Coin, CoinId, CoinRecord, GenesisChecker, Result, SpendBundle};
use tokio::sync::broadcast;

/// "Coin `coin_id` was spent by bundle `spent_by` in the block at `height`,
/// which is now `depth` blocks deep" (depth 1 = the tip).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendConfirmation {
    pub coin_id: CoinId,
    pub spent_by: BundleId,
    pub height: u32,
    pub depth: u32,
    /// Coins that spend of `coin_id` created.
    pub created: Vec<CoinId>,
}

/// Verdict of the broadcast channel on a submitted bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastOutcome {
    Accepted,
    Rejected { reason: String },
}

impl BroadcastOutcome {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Read access to the ledger as one wallet sees it.
///
/// Never mutated by the engine: all value transfer happens through
/// [`BroadcastChannel::submit`] and is observed later as confirmed state.
#[async_trait]
pub trait AssetLedgerView: Send + Sync {
    /// Unspent coins of `asset` this wallet can spend. Does not know about
    /// the engine's locks; callers subtract those.
    async fn spendable_coins(&self, asset: &AssetId) -> Result<Vec<Coin>>;

    /// Chain record of any coin, spent or not. `None` if never created.
    async fn coin_record(&self, coin_id: &CoinId) -> Result<Option<CoinRecord>>;

    /// The asset class the ledger attributes to `coin`, if it knows the coin.
    async fn resolve_asset_for_coin(&self, coin: &Coin) -> Result<Option<AssetId>>;

    /// Do two genesis checkers denote the same asset class?
    fn is_genesis_equal(&self, a: &GenesisChecker, b: &GenesisChecker) -> bool;

    /// Checkers of every token class this wallet tracks.
    fn known_assets(&self) -> Vec<GenesisChecker>;

    /// Checker of a tracked token class.
    fn asset_checker(&self, asset: &AssetId) -> Option<GenesisChecker> {
        self.known_assets()
            .into_iter()
            .find(|checker| checker.asset_id() == *asset)
    }

    /// Feed of spend confirmations. Each call returns a fresh receiver.
    fn subscribe(&self) -> broadcast::Receiver<SpendConfirmation>;
}

/// Where completed bundles go.
#[async_trait]
pub trait BroadcastChannel: Send + Sync {
    /// Hand a bundle to the network. `Err` means the channel itself failed;
    /// a refusal by the ledger is `Ok(Rejected)`.
    async fn submit(&self, bundle: &SpendBundle) -> Result<BroadcastOutcome>;
}
