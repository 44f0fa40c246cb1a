//! In-memory ledger for tests. **Never use in production.**
//!
//! [`SimulatedChain`] holds the coin set, a mempool and a block height.
//! Bundles are validated on submit the way a real ledger would:
//!
//! ```text
//!   every spent coin exists (on chain or created earlier in the bundle),
//!   is unspent and not claimed by a pending bundle
//!   puzzle reveal matches the coin's puzzle hash
//!   standard spends carry a valid owner signature (see signer::verify_bundle)
//!   asserted announcements, asserted coin spends and settlement terms are met
//!   token classes balance exactly, native outputs never exceed inputs
//! ```
//!
//! Blocks are produced only by [`SimulatedChain::farm_block`]; every block
//! re-announces recent spends with their new depth on the confirmation feed.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use offerswap_types::{
    AssetId, BundleId, Coin, CoinId, CoinRecord, GenesisChecker, Puzzle, PuzzleHash, Result,
    SpendBundle, payment_announcement_id, tagged_hash,
};
use tokio::sync::broadcast;

use crate::{
    ledger::{AssetLedgerView, BroadcastChannel, BroadcastOutcome, SpendConfirmation},
    signer,
};

/// Spends deeper than this are no longer re-announced.
const MAX_REPORTED_DEPTH: u32 = 32;

struct LoggedSpend {
    coin_id: CoinId,
    spent_by: BundleId,
    height: u32,
    created: Vec<CoinId>,
}

#[derive(Default)]
struct ChainState {
    height: u32,
    coins: HashMap<CoinId, CoinRecord>,
    mempool: Vec<SpendBundle>,
    /// Coins claimed by a bundle in the mempool.
    pending_spends: HashMap<CoinId, BundleId>,
    /// Every confirmed spend.
    spend_log: Vec<LoggedSpend>,
    minted: BTreeMap<AssetId, u64>,
    mint_counter: u64,
}

/// A single-node ledger with manual block production.
pub struct SimulatedChain {
    state: Mutex<ChainState>,
    events: broadcast::Sender<SpendConfirmation>,
}

impl SimulatedChain {
    #[must_use]
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(4096);
        Arc::new(Self {
            state: Mutex::new(ChainState::default()),
            events,
        })
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A wallet view for the owner of `puzzle_hash`.
    #[must_use]
    pub fn wallet(self: &Arc<Self>, puzzle_hash: PuzzleHash) -> SimWallet {
        SimWallet {
            chain: Arc::clone(self),
            owner: puzzle_hash,
            assets: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.state().height
    }

    /// Create a coin out of thin air at the current height.
    pub fn mint(&self, puzzle_hash: PuzzleHash, asset: AssetId, amount: u64) -> Coin {
        let mut state = self.state();
        state.mint_counter += 1;
        let parent = CoinId(tagged_hash(b"sim:mint:", &[&state.mint_counter.to_le_bytes()]));
        let coin = Coin::new(parent, puzzle_hash, amount, asset);
        let height = state.height;
        state.coins.insert(
            coin.id(),
            CoinRecord {
                coin,
                confirmed_height: height,
                spent_height: None,
            },
        );
        let minted = state.minted.entry(asset).or_insert(0);
        *minted = minted.saturating_add(amount);
        coin
    }

    /// Validate a bundle and admit it to the mempool.
    pub fn submit_bundle(&self, bundle: &SpendBundle) -> BroadcastOutcome {
        let mut state = self.state();
        if let Err(reason) = validate(&state, bundle) {
            tracing::debug!(bundle = %bundle.id().short(), %reason, "Bundle rejected");
            return BroadcastOutcome::Rejected { reason };
        }
        let bundle_id = bundle.id();
        for coin_id in bundle.removals() {
            state.pending_spends.insert(coin_id, bundle_id);
        }
        state.mempool.push(bundle.clone());
        BroadcastOutcome::Accepted
    }

    /// Include every mempool bundle in a new block and announce depths.
    pub fn farm_block(&self) -> u32 {
        let mut state = self.state();
        state.height += 1;
        let height = state.height;

        let mempool = std::mem::take(&mut state.mempool);
        state.pending_spends.clear();
        for bundle in mempool {
            let bundle_id = bundle.id();
            for coin in bundle.additions() {
                state.coins.insert(
                    coin.id(),
                    CoinRecord {
                        coin,
                        confirmed_height: height,
                        spent_height: None,
                    },
                );
            }
            for spend in &bundle.spends {
                let record = state.coins.entry(spend.coin_id()).or_insert(CoinRecord {
                    coin: spend.coin,
                    confirmed_height: height,
                    spent_height: None,
                });
                record.spent_height = Some(height);
                state.spend_log.push(LoggedSpend {
                    coin_id: spend.coin_id(),
                    spent_by: bundle_id,
                    height,
                    created: spend.outputs().iter().map(Coin::id).collect(),
                });
            }
        }

        for spend in &state.spend_log {
            let depth = height - spend.height + 1;
            if depth <= MAX_REPORTED_DEPTH {
                // No receivers is fine.
                let _ = self.events.send(SpendConfirmation {
                    coin_id: spend.coin_id,
                    spent_by: spend.spent_by,
                    height: spend.height,
                    depth,
                    created: spend.created.clone(),
                });
            }
        }
        height
    }

    /// Farm `n` blocks; returns the new height.
    pub fn farm_blocks(&self, n: u32) -> u32 {
        let mut height = self.height();
        for _ in 0..n {
            height = self.farm_block();
        }
        height
    }

    #[must_use]
    pub fn mempool_len(&self) -> usize {
        self.state().mempool.len()
    }

    #[must_use]
    pub fn is_spent(&self, coin_id: &CoinId) -> bool {
        self.state()
            .coins
            .get(coin_id)
            .is_some_and(|record| !record.is_unspent())
    }

    /// Sum of all unspent coins of `asset`.
    #[must_use]
    pub fn total_supply(&self, asset: &AssetId) -> u64 {
        self.state()
            .coins
            .values()
            .filter(|record| record.is_unspent() && record.coin.asset == *asset)
            .fold(0u64, |acc, record| acc.saturating_add(record.coin.amount))
    }

    /// Sum of everything ever minted of `asset`.
    #[must_use]
    pub fn minted(&self, asset: &AssetId) -> u64 {
        self.state().minted.get(asset).copied().unwrap_or(0)
    }

    fn coins_of(&self, owner: &PuzzleHash, asset: &AssetId, include_pending: bool) -> Vec<Coin> {
        let state = self.state();
        let mut coins: Vec<Coin> = state
            .coins
            .iter()
            .filter(|(id, record)| {
                record.is_unspent()
                    && record.coin.puzzle_hash == *owner
                    && record.coin.asset == *asset
                    && (include_pending || !state.pending_spends.contains_key(*id))
            })
            .map(|(_, record)| record.coin)
            .collect();
        coins.sort_by_key(Coin::id);
        coins
    }
}

fn validate(state: &ChainState, bundle: &SpendBundle) -> std::result::Result<(), String> {
    if bundle.spends.is_empty() {
        return Err("empty bundle".into());
    }
    if let Some(coin_id) = bundle.duplicate_spend() {
        return Err(format!("coin {coin_id} spent twice"));
    }

    let ephemeral: HashSet<CoinId> = bundle.additions().iter().map(Coin::id).collect();
    let removals: HashSet<CoinId> = bundle.removals().into_iter().collect();
    let announcements: HashSet<[u8; 32]> = bundle
        .spends
        .iter()
        .flat_map(|spend| spend.announcements())
        .collect();

    for spend in &bundle.spends {
        let coin_id = spend.coin_id();
        match state.coins.get(&coin_id) {
            Some(record) if !record.is_unspent() => {
                return Err(format!("coin {coin_id} already spent"));
            }
            Some(_) => {}
            None if ephemeral.contains(&coin_id) => {}
            None => return Err(format!("unknown coin {coin_id}")),
        }
        if state.pending_spends.contains_key(&coin_id) {
            return Err(format!("coin {coin_id} conflicts with a pending bundle"));
        }
        if spend.puzzle.puzzle_hash() != spend.coin.puzzle_hash {
            return Err(format!("wrong puzzle reveal for {coin_id}"));
        }
        if !spend.asset_assertions_hold() {
            return Err(format!("asset class assertion failed for {coin_id}"));
        }
        if spend
            .asserted_announcements()
            .iter()
            .any(|id| !announcements.contains(id))
        {
            return Err(format!("missing announcement asserted by {coin_id}"));
        }
        if spend.asserted_spends().iter().any(|id| !removals.contains(id)) {
            return Err(format!("missing coin spend asserted by {coin_id}"));
        }
        if let Puzzle::Settlement { terms } = &spend.puzzle {
            let terms_hash = terms.terms_hash();
            let paid = terms.payments.iter().all(|payment| {
                announcements.contains(&payment_announcement_id(
                    &payment.asset,
                    &terms_hash,
                    &payment.puzzle_hash,
                    payment.amount,
                ))
            });
            if !paid {
                return Err(format!("settlement terms of {coin_id} not paid"));
            }
        }
    }

    signer::verify_bundle(bundle).map_err(|err| err.to_string())?;

    if !bundle.is_balanced() {
        return Err("bundle does not conserve value".into());
    }
    Ok(())
}

/// One wallet's view of a [`SimulatedChain`].
pub struct SimWallet {
    chain: Arc<SimulatedChain>,
    owner: PuzzleHash,
    assets: Mutex<Vec<GenesisChecker>>,
}

impl SimWallet {
    /// Start tracking a token class.
    pub fn track_asset(&self, checker: GenesisChecker) {
        let mut assets = self.assets.lock().unwrap_or_else(PoisonError::into_inner);
        if !assets.contains(&checker) {
            assets.push(checker);
        }
    }

    /// All unspent owned coins of `asset`, including ones a pending bundle spends.
    #[must_use]
    pub fn confirmed_balance(&self, asset: &AssetId) -> u64 {
        self.chain
            .coins_of(&self.owner, asset, true)
            .iter()
            .fold(0u64, |acc, coin| acc.saturating_add(coin.amount))
    }

    #[must_use]
    pub fn owner(&self) -> PuzzleHash {
        self.owner
    }

    #[must_use]
    pub fn chain(&self) -> &Arc<SimulatedChain> {
        &self.chain
    }
}

#[async_trait]
impl AssetLedgerView for SimWallet {
    async fn spendable_coins(&self, asset: &AssetId) -> Result<Vec<Coin>> {
        Ok(self.chain.coins_of(&self.owner, asset, false))
    }

    async fn coin_record(&self, coin_id: &CoinId) -> Result<Option<CoinRecord>> {
        Ok(self.chain.state().coins.get(coin_id).copied())
    }

    async fn resolve_asset_for_coin(&self, coin: &Coin) -> Result<Option<AssetId>> {
        Ok(self
            .chain
            .state()
            .coins
            .get(&coin.id())
            .map(|record| record.coin.asset))
    }

    fn is_genesis_equal(&self, a: &GenesisChecker, b: &GenesisChecker) -> bool {
        a == b
    }

    fn known_assets(&self) -> Vec<GenesisChecker> {
        self.assets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<SpendConfirmation> {
        self.chain.events.subscribe()
    }
}

#[async_trait]
impl BroadcastChannel for SimWallet {
    async fn submit(&self, bundle: &SpendBundle) -> Result<BroadcastOutcome> {
        Ok(self.chain.submit_bundle(bundle))
    }
}

#[cfg(test)]
mod tests {
    use offerswap_types::{Condition, SpendIntent};

    use super::*;
    use crate::{Ed25519Signer, SigningOracle, sign_bundle};

    async fn transfer(signer: &Ed25519Signer, coin: Coin, to: PuzzleHash) -> SpendBundle {
        let mut bundle = SpendBundle::new(vec![SpendIntent::new(
            coin,
            signer.puzzle(),
            vec![Condition::CreateCoin {
                puzzle_hash: to,
                amount: coin.amount,
            }],
        )]);
        sign_bundle(&mut bundle, signer).await.unwrap();
        bundle
    }

    #[tokio::test]
    async fn signed_transfer_confirms() {
        let chain = SimulatedChain::new();
        let alice = Ed25519Signer::generate();
        let bob = Ed25519Signer::generate();
        let coin = chain.mint(alice.puzzle_hash(), AssetId::Native, 100);
        let bob_wallet = chain.wallet(bob.puzzle_hash());

        let bundle = transfer(&alice, coin, bob.puzzle_hash()).await;
        assert!(chain.submit_bundle(&bundle).is_accepted());
        assert_eq!(chain.farm_block(), 1);
        assert!(chain.is_spent(&coin.id()));
        assert_eq!(bob_wallet.confirmed_balance(&AssetId::Native), 100);
        assert_eq!(chain.total_supply(&AssetId::Native), chain.minted(&AssetId::Native));
    }

    #[tokio::test]
    async fn double_spend_rejected() {
        let chain = SimulatedChain::new();
        let alice = Ed25519Signer::generate();
        let coin = chain.mint(alice.puzzle_hash(), AssetId::Native, 100);

        let first = transfer(&alice, coin, PuzzleHash([1u8; 32])).await;
        let second = transfer(&alice, coin, PuzzleHash([2u8; 32])).await;
        assert!(chain.submit_bundle(&first).is_accepted());
        assert!(!chain.submit_bundle(&second).is_accepted(), "mempool conflict");
        chain.farm_block();
        assert!(!chain.submit_bundle(&second).is_accepted(), "already spent");
    }

    #[tokio::test]
    async fn unsigned_or_foreign_spend_rejected() {
        let chain = SimulatedChain::new();
        let alice = Ed25519Signer::generate();
        let mallory = Ed25519Signer::generate();
        let coin = chain.mint(alice.puzzle_hash(), AssetId::Native, 100);

        let mut unsigned = transfer(&alice, coin, PuzzleHash([1u8; 32])).await;
        unsigned.spends[0].signature = None;
        assert!(!chain.submit_bundle(&unsigned).is_accepted());

        let mut stolen = SpendBundle::new(vec![SpendIntent::new(
            coin,
            alice.puzzle(),
            vec![Condition::CreateCoin {
                puzzle_hash: mallory.puzzle_hash(),
                amount: 100,
            }],
        )]);
        let signed = sign_bundle(&mut stolen, &mallory).await;
        assert!(signed.is_err() || !chain.submit_bundle(&stolen).is_accepted());
    }

    #[tokio::test]
    async fn inflation_rejected() {
        let chain = SimulatedChain::new();
        let alice = Ed25519Signer::generate();
        let coin = chain.mint(alice.puzzle_hash(), AssetId::Native, 100);
        let mut bundle = SpendBundle::new(vec![SpendIntent::new(
            coin,
            alice.puzzle(),
            vec![Condition::CreateCoin {
                puzzle_hash: alice.puzzle_hash(),
                amount: 101,
            }],
        )]);
        sign_bundle(&mut bundle, &alice).await.unwrap();
        assert!(!chain.submit_bundle(&bundle).is_accepted());
    }

    #[tokio::test]
    async fn confirmations_report_growing_depth() {
        let chain = SimulatedChain::new();
        let alice = Ed25519Signer::generate();
        let coin = chain.mint(alice.puzzle_hash(), AssetId::Native, 100);
        let wallet = chain.wallet(alice.puzzle_hash());
        let mut feed = wallet.subscribe();

        let bundle = transfer(&alice, coin, PuzzleHash([1u8; 32])).await;
        assert!(wallet.submit(&bundle).await.unwrap().is_accepted());
        chain.farm_blocks(3);

        let events: Vec<SpendConfirmation> = std::iter::from_fn(|| feed.try_recv().ok())
            .filter(|event| event.coin_id == coin.id())
            .collect();
        let depths: Vec<u32> = events.iter().map(|event| event.depth).collect();
        assert_eq!(depths, vec![1, 2, 3]);
        let created: Vec<CoinId> = bundle.spends[0].outputs().iter().map(Coin::id).collect();
        assert!(events.iter().all(|event| event.created == created));
    }

    #[tokio::test]
    async fn pending_coins_not_spendable() {
        let chain = SimulatedChain::new();
        let alice = Ed25519Signer::generate();
        let coin = chain.mint(alice.puzzle_hash(), AssetId::Native, 100);
        let wallet = chain.wallet(alice.puzzle_hash());

        let bundle = transfer(&alice, coin, PuzzleHash([1u8; 32])).await;
        chain.submit_bundle(&bundle);
        assert!(wallet.spendable_coins(&AssetId::Native).await.unwrap().is_empty());
        assert_eq!(wallet.confirmed_balance(&AssetId::Native), 100);
    }
}
