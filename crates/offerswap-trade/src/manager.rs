//! Trade Manager: owns the coin lock table and the trade ledger and drives
//! each trade through its lifecycle.
//!
//! ```text
//!   PENDING_ACCEPT ──completion broadcast / spend seen──▶ PENDING_CONFIRM ──depth──▶ CONFIRMED
//!      │    │
//!      │    └──secure cancel (cancel_bundle set) ──cancel spend at depth──▶ CANCELED
//!      └──insecure cancel ─────────────────────────────────────────────────▶ CANCELED
//!   broadcast rejected ──▶ FAILED
//! ```
//!
//! Locks and records live behind one mutex and always change together. The
//! mutex is never held across an `.await`: every operation reads the ledger
//! first, commits under the lock, then signs and broadcasts, and rolls the
//! commit back if anything after it fails.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::Utc;
use offerswap_offer::{
    Completion, OfferBuilder, OfferCompleter, PreparedOffer, asset_metadata, discrepancies,
    ensure_fresh, read_offer, write_offer,
};
use offerswap_types::{
    AssetId, Coin, CoinId, EngineConfig, LockedCoinRecord, Offer, OfferDelta, OfferswapError,
    PuzzleHash, Result, TradeId, TradeRecord, TradeRole, TradeStatus,
};
use offerswap_wallet::{
    AssetLedgerView, BroadcastChannel, BroadcastOutcome, CoinLockTable, SigningOracle,
    SpendConfirmation, sign_bundle,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::broadcast::{self, error::RecvError, error::TryRecvError},
};
use tracing::{debug, info, warn};

use crate::{
    conservation::{check_bundle, check_trade_flow, party_flow},
    store::{MemoryTradeStore, TradeStore},
};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct ManagerState {
    locks: CoinLockTable,
    store: Box<dyn TradeStore>,
}

impl ManagerState {
    /// `candidates` minus every coin some pending trade holds.
    fn unlocked(&self, candidates: &BTreeMap<AssetId, Vec<Coin>>) -> BTreeMap<AssetId, Vec<Coin>> {
        candidates
            .iter()
            .map(|(asset, coins)| {
                let free = coins
                    .iter()
                    .filter(|coin| !self.locks.is_locked(&coin.id()))
                    .copied()
                    .collect();
                (*asset, free)
            })
            .collect()
    }
}

/// One wallet's trade engine.
pub struct TradeManager {
    config: EngineConfig,
    ledger: Arc<dyn AssetLedgerView>,
    channel: Arc<dyn BroadcastChannel>,
    signer: Arc<dyn SigningOracle>,
    builder: OfferBuilder,
    completer: OfferCompleter,
    state: Mutex<ManagerState>,
}

impl fmt::Debug for TradeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TradeManager")
            .field("config", &self.config)
            .field("owner", &self.signer.puzzle_hash())
            .finish_non_exhaustive()
    }
}

impl TradeManager {
    /// Manager with an in-memory trade ledger.
    ///
    /// # Errors
    /// Returns `Configuration` if `config` is invalid.
    pub fn new(
        config: EngineConfig,
        ledger: Arc<dyn AssetLedgerView>,
        channel: Arc<dyn BroadcastChannel>,
        signer: Arc<dyn SigningOracle>,
    ) -> Result<Self> {
        Self::with_store(config, ledger, channel, signer, Box::new(MemoryTradeStore::new()))
    }

    /// # Errors
    /// Returns `Configuration` if `config` is invalid.
    pub fn with_store(
        config: EngineConfig,
        ledger: Arc<dyn AssetLedgerView>,
        channel: Arc<dyn BroadcastChannel>,
        signer: Arc<dyn SigningOracle>,
        store: Box<dyn TradeStore>,
    ) -> Result<Self> {
        config.validate()?;
        let own = signer.puzzle();
        Ok(Self {
            builder: OfferBuilder::new(own.clone(), &config),
            completer: OfferCompleter::new(own),
            config,
            ledger,
            channel,
            signer,
            state: Mutex::new(ManagerState {
                locks: CoinLockTable::new(),
                store,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn state(&self) -> Result<MutexGuard<'_, ManagerState>> {
        self.state
            .lock()
            .map_err(|_| OfferswapError::Internal("trade manager state poisoned".into()))
    }

    /// Apply `apply` to a copy of the record and store it only on success.
    /// Closures touch the lock table last, after every fallible step.
    fn update_record<T>(
        &self,
        trade_id: TradeId,
        apply: impl FnOnce(&mut TradeRecord, &mut CoinLockTable) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.state()?;
        let state = &mut *guard;
        let mut record = state
            .store
            .get(&trade_id)
            .ok_or(OfferswapError::TradeNotFound(trade_id))?;
        let out = apply(&mut record, &mut state.locks)?;
        state.store.put(record);
        Ok(out)
    }

    /// Undo a commit whose follow-up failed: the record and its locks go
    /// together.
    fn rollback(&self, trade_id: TradeId) {
        match self.state() {
            Ok(mut state) => {
                state.locks.unlock(trade_id);
                state.store.remove(&trade_id);
                debug!(trade_id = %trade_id, "Trade rolled back");
            }
            Err(err) => warn!(trade_id = %trade_id, error = %err, "Rollback skipped"),
        }
    }

    async fn candidates(&self, assets: &[AssetId]) -> Result<BTreeMap<AssetId, Vec<Coin>>> {
        let mut out = BTreeMap::new();
        for asset in assets {
            out.insert(*asset, self.ledger.spendable_coins(asset).await?);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Initiator
    // -----------------------------------------------------------------------

    /// Build, lock, sign and write an offer for `delta`.
    ///
    /// Coins are locked and the record is inserted in one step; if signing
    /// or writing fails afterwards, both are rolled back.
    ///
    /// # Errors
    /// `InvalidOffer`, `UnknownAsset`, `InsufficientFunds`, `SigningFailed`
    /// or `Io`.
    pub async fn create_offer_for_ids<W>(&self, delta: &OfferDelta, sink: &mut W) -> Result<TradeRecord>
    where
        W: AsyncWrite + Unpin + Send,
    {
        delta.validate(self.config.allow_zero_legs)?;
        let metadata = asset_metadata(delta, self.ledger.as_ref())?;
        let offered: Vec<AssetId> = delta.offered().map(|(asset, _)| asset).collect();
        let candidates = self.candidates(&offered).await?;

        let prepared = {
            let mut state = self.state()?;
            let available = state.unlocked(&candidates);
            let prepared = self.builder.prepare(delta, &available, &metadata)?;
            if state.store.get(&prepared.trade_id()).is_some() {
                return Err(OfferswapError::InvalidOffer {
                    reason: format!("trade {} already exists", prepared.trade_id()),
                });
            }
            state.locks.lock(prepared.trade_id(), &prepared.selected)?;
            state.store.put(TradeRecord::new_offer(prepared.offer.clone()));
            prepared
        };

        let trade_id = prepared.trade_id();
        match self.finish_offer(prepared, sink).await {
            Ok(record) => {
                info!(
                    trade_id = %trade_id,
                    delta = ?record.delta,
                    "Offer created"
                );
                Ok(record)
            }
            Err(err) => {
                self.rollback(trade_id);
                Err(err)
            }
        }
    }

    async fn finish_offer<W>(&self, prepared: PreparedOffer, sink: &mut W) -> Result<TradeRecord>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let trade_id = prepared.trade_id();
        let offer = prepared.sign(self.signer.as_ref()).await?;
        let record = self.update_record(trade_id, |record, _| {
            record.offer = offer.clone();
            Ok(record.clone())
        })?;
        write_offer(sink, &offer).await?;
        Ok(record)
    }

    /// [`Self::create_offer_for_ids`] into a file. A path without an
    /// extension gets the configured one. The file is only written once the
    /// offer is complete.
    ///
    /// # Errors
    /// As [`Self::create_offer_for_ids`].
    pub async fn create_offer_file(&self, delta: &OfferDelta, path: impl AsRef<Path>) -> Result<TradeRecord> {
        let mut path = path.as_ref().to_path_buf();
        if path.extension().is_none() {
            path.set_extension(&self.config.offer_file_extension);
        }
        let mut encoded = Vec::new();
        let record = self.create_offer_for_ids(delta, &mut encoded).await?;
        if let Err(err) = tokio::fs::write(&path, &encoded).await {
            self.rollback(record.trade_id);
            return Err(err.into());
        }
        self.update_record(record.trade_id, |record, _| {
            record.offer_file = Some(path);
            Ok(record.clone())
        })
    }

    /// Insecure cancel: forget the offer locally and release its coins at
    /// once. Nothing goes on chain, so a counterparty holding the file can
    /// still complete it. The record stays, as `CANCELED`.
    ///
    /// # Errors
    /// - `TradeNotFound`
    /// - `AlreadyCanceling` while a secure cancel is in flight
    /// - `NotCancellable` unless this wallet's own offer is `PENDING_ACCEPT`
    pub fn cancel_pending_offer(&self, trade_id: &TradeId) -> Result<TradeRecord> {
        let trade_id = *trade_id;
        let record = self.update_record(trade_id, |record, locks| {
            if record.is_canceling() {
                return Err(OfferswapError::AlreadyCanceling(trade_id));
            }
            ensure_cancellable(record)?;
            record.transition(TradeStatus::Canceled)?;
            locks.unlock(trade_id);
            Ok(record.clone())
        })?;
        info!(trade_id = %trade_id, "Offer canceled locally");
        Ok(record)
    }

    /// Secure cancel: spend the locked coins back to this wallet. The trade
    /// stays `PENDING_ACCEPT` with its coins locked until the return spend
    /// reaches the confirmation depth, then becomes `CANCELED`.
    ///
    /// # Errors
    /// - `TradeNotFound`, `NotCancellable`
    /// - `AlreadyCanceling` if a return spend is already in flight
    /// - `BroadcastRejected` if the ledger refuses the return spend, e.g.
    ///   because a completion already consumed the coins; the trade is left
    ///   as it was
    pub async fn cancel_pending_offer_safely(&self, trade_id: &TradeId) -> Result<TradeRecord> {
        let trade_id = *trade_id;
        let mut bundle = self.update_record(trade_id, |record, locks| {
            if record.is_canceling() {
                return Err(OfferswapError::AlreadyCanceling(trade_id));
            }
            ensure_cancellable(record)?;
            let coins = locks.coins_for_trade(&trade_id);
            if coins.is_empty() {
                return Err(OfferswapError::Internal(format!(
                    "trade {trade_id} holds no locked coins"
                )));
            }
            let bundle = self.builder.reclaim_bundle(&coins);
            record.cancel_bundle = Some(bundle.id());
            Ok(bundle)
        })?;
        let cancel_id = bundle.id();

        let outcome = match sign_bundle(&mut bundle, self.signer.as_ref()).await {
            Ok(()) => self.channel.submit(&bundle).await,
            Err(err) => Err(err),
        };
        let reason = match outcome {
            Ok(BroadcastOutcome::Accepted) => {
                info!(trade_id = %trade_id, bundle = %cancel_id.short(), "Secure cancel broadcast");
                return self
                    .get_trade_by_id(&trade_id)?
                    .ok_or(OfferswapError::TradeNotFound(trade_id));
            }
            Ok(BroadcastOutcome::Rejected { reason }) => {
                warn!(trade_id = %trade_id, %reason, "Secure cancel rejected");
                OfferswapError::BroadcastRejected { reason }
            }
            Err(err) => err,
        };
        self.update_record(trade_id, |record, _| {
            if record.cancel_bundle == Some(cancel_id) {
                record.cancel_bundle = None;
            }
            Ok(())
        })?;
        Err(reason)
    }

    // -----------------------------------------------------------------------
    // Responder
    // -----------------------------------------------------------------------

    /// Read an offer and report what accepting it would do to this wallet.
    ///
    /// # Errors
    /// `MalformedOffer`, `Inconsistent` or `UnknownAsset`.
    pub async fn get_discrepancies_for_offer<R>(&self, source: &mut R) -> Result<OfferDelta>
    where
        R: AsyncRead + Unpin + Send,
    {
        let offer = read_offer(source, self.config.max_offer_bytes).await?;
        let delta = discrepancies(&offer, self.ledger.as_ref()).await?;
        info!(trade_id = %offer.trade_id(), delta = ?delta, "Offer reviewed");
        Ok(delta)
    }

    /// Read, validate, complete and broadcast an offer.
    ///
    /// # Errors
    /// Everything [`Self::get_discrepancies_for_offer`] returns, plus
    /// `StaleOffer`, `InsufficientFunds`, `ConservationViolation`,
    /// `SigningFailed` and `BroadcastRejected` (the trade is then recorded
    /// as `FAILED`).
    pub async fn respond_to_offer<R>(&self, source: &mut R) -> Result<TradeRecord>
    where
        R: AsyncRead + Unpin + Send,
    {
        let offer = read_offer(source, self.config.max_offer_bytes).await?;
        self.respond(offer, None).await
    }

    /// [`Self::respond_to_offer`] reading from a file.
    ///
    /// # Errors
    /// As [`Self::respond_to_offer`], plus `Io`.
    pub async fn respond_to_offer_file(&self, path: impl AsRef<Path>) -> Result<TradeRecord> {
        let path = path.as_ref();
        let mut file = tokio::fs::File::open(path).await?;
        let offer = read_offer(&mut file, self.config.max_offer_bytes).await?;
        self.respond(offer, Some(path.to_path_buf())).await
    }

    async fn respond(&self, offer: Offer, offer_file: Option<PathBuf>) -> Result<TradeRecord> {
        let trade_id = offer.trade_id();
        let delta = discrepancies(&offer, self.ledger.as_ref()).await?;
        ensure_fresh(&offer, self.ledger.as_ref()).await?;
        let paying: Vec<AssetId> = delta.offered().map(|(asset, _)| asset).collect();
        let candidates = self.candidates(&paying).await?;

        let mut completion = {
            let mut state = self.state()?;
            if state.store.get(&trade_id).is_some() {
                return Err(OfferswapError::InvalidOffer {
                    reason: format!("trade {trade_id} is already known to this wallet"),
                });
            }
            let available = state.unlocked(&candidates);
            let completion = self.completer.prepare(&offer, &delta, &available)?;
            check_completion_flows(&completion, &self.signer.puzzle_hash())?;
            state.locks.lock(trade_id, &completion.selected)?;
            let mut record = TradeRecord::new_response(offer, delta, completion.bundle.id());
            record.offer_file = offer_file;
            state.store.put(record);
            completion
        };

        let signed = match completion.sign(self.signer.as_ref()).await {
            Ok(()) => check_bundle(&completion.bundle),
            Err(err) => Err(err),
        };
        let outcome = match signed {
            Ok(()) => self.channel.submit(&completion.bundle).await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(BroadcastOutcome::Accepted) => {
                let record = self.update_record(trade_id, |record, _| {
                    record.transition(TradeStatus::PendingConfirm)?;
                    record.accepted_at = Some(Utc::now());
                    Ok(record.clone())
                })?;
                info!(
                    trade_id = %trade_id,
                    bundle = %completion.bundle.id().short(),
                    "Offer accepted, completion broadcast"
                );
                Ok(record)
            }
            Ok(BroadcastOutcome::Rejected { reason }) => {
                warn!(trade_id = %trade_id, %reason, "Completion rejected");
                let failure = reason.clone();
                self.update_record(trade_id, |record, locks| {
                    record.failure = Some(failure);
                    record.transition(TradeStatus::Failed)?;
                    locks.unlock(trade_id);
                    Ok(())
                })?;
                Err(OfferswapError::BroadcastRejected { reason })
            }
            Err(err) => {
                self.rollback(trade_id);
                Err(err)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Confirmations
    // -----------------------------------------------------------------------

    /// A fresh receiver on the ledger's confirmation feed.
    pub fn subscribe(&self) -> broadcast::Receiver<SpendConfirmation> {
        self.ledger.subscribe()
    }

    /// React to one confirmation. Returns the record if its status changed.
    /// Repeated or irrelevant events are no-ops.
    ///
    /// # Errors
    /// `Internal` if the state lock is poisoned.
    pub fn handle_spend_confirmation(&self, event: &SpendConfirmation) -> Result<Option<TradeRecord>> {
        let mut guard = self.state()?;
        let state = &mut *guard;
        let Some(trade_id) = state.locks.locked_by(&event.coin_id) else {
            return Ok(None);
        };
        let Some(mut record) = state.store.get(&trade_id) else {
            return Ok(None);
        };
        let before = (record.status, record.cancel_bundle);
        let deep = event.depth >= self.config.confirmation_depth;
        let mut release = false;

        match record.role {
            TradeRole::Initiator if record.cancel_bundle == Some(event.spent_by) => {
                if deep && record.status == TradeStatus::PendingAccept {
                    record.transition(TradeStatus::Canceled)?;
                    record.settled_height = Some(event.height);
                    release = true;
                }
            }
            TradeRole::Initiator if settles_offer(&record.offer, event) => {
                // Someone completed the offer; a concurrent cancel lost.
                if record.status == TradeStatus::PendingAccept {
                    record.transition(TradeStatus::PendingConfirm)?;
                    record.accepted_at = Some(Utc::now());
                    record.cancel_bundle = None;
                }
                if deep && record.status == TradeStatus::PendingConfirm {
                    record.transition(TradeStatus::Confirmed)?;
                    record.settled_height = Some(event.height);
                    release = true;
                }
            }
            // Same coins, other outputs: an earlier offer on these coins
            // was completed, or they were spent outside the engine.
            TradeRole::Initiator => {
                if !record.status.is_terminal() {
                    record.failure = Some(format!(
                        "coin {} consumed by bundle {} without settling this offer",
                        event.coin_id,
                        event.spent_by.short()
                    ));
                    record.transition(TradeStatus::Failed)?;
                    record.cancel_bundle = None;
                    release = true;
                }
            }
            TradeRole::Responder if record.completed_bundle == Some(event.spent_by) => {
                if deep && record.status == TradeStatus::PendingConfirm {
                    record.transition(TradeStatus::Confirmed)?;
                    record.settled_height = Some(event.height);
                    release = true;
                }
            }
            TradeRole::Responder => {
                if !record.status.is_terminal() {
                    record.failure = Some(format!(
                        "coin {} consumed by bundle {}",
                        event.coin_id,
                        event.spent_by.short()
                    ));
                    record.transition(TradeStatus::Failed)?;
                    release = true;
                }
            }
        }

        if release {
            state.locks.unlock(trade_id);
        }
        let changed = before != (record.status, record.cancel_bundle);
        state.store.put(record.clone());
        if !changed {
            return Ok(None);
        }
        let from = before.0;
        info!(
            trade_id = %trade_id,
            from = %from,
            to = %record.status,
            depth = event.depth,
            "Trade status changed"
        );
        Ok(Some(record))
    }

    /// Handle every confirmation already queued on `feed`, without waiting.
    /// Returns how many events were handled.
    ///
    /// # Errors
    /// As [`Self::handle_spend_confirmation`].
    pub fn drain_confirmations(&self, feed: &mut broadcast::Receiver<SpendConfirmation>) -> Result<usize> {
        let mut handled = 0;
        loop {
            match feed.try_recv() {
                Ok(event) => {
                    self.handle_spend_confirmation(&event)?;
                    handled += 1;
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Confirmation feed lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return Ok(handled),
            }
        }
    }

    /// Handle confirmations as they arrive until the feed closes. Meant to
    /// be spawned by the caller.
    ///
    /// # Errors
    /// As [`Self::handle_spend_confirmation`].
    pub async fn follow_confirmations(&self, mut feed: broadcast::Receiver<SpendConfirmation>) -> Result<()> {
        loop {
            match feed.recv().await {
                Ok(event) => {
                    self.handle_spend_confirmation(&event)?;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Confirmation feed lagged");
                }
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// # Errors
    /// `Internal` if the state lock is poisoned.
    pub fn get_trade_by_id(&self, trade_id: &TradeId) -> Result<Option<TradeRecord>> {
        Ok(self.state()?.store.get(trade_id))
    }

    /// # Errors
    /// `Internal` if the state lock is poisoned.
    pub fn get_all_trades(&self) -> Result<Vec<TradeRecord>> {
        Ok(self.state()?.store.all())
    }

    /// # Errors
    /// `Internal` if the state lock is poisoned.
    pub fn get_trades_by_status(&self, status: TradeStatus) -> Result<Vec<TradeRecord>> {
        Ok(self.state()?.store.by_status(status))
    }

    /// Coins of `asset` currently held by pending trades.
    ///
    /// # Errors
    /// `Internal` if the state lock is poisoned.
    pub fn get_locked_coins(&self, asset: &AssetId) -> Result<HashMap<CoinId, LockedCoinRecord>> {
        Ok(self.state()?.locks.locked_coins(asset))
    }

    /// Spendable coins of `asset` on the ledger, minus the locked ones.
    ///
    /// # Errors
    /// Propagates ledger errors.
    pub async fn spendable_balance(&self, asset: &AssetId) -> Result<u64> {
        let coins = self.ledger.spendable_coins(asset).await?;
        let state = self.state()?;
        Ok(coins
            .iter()
            .filter(|coin| !state.locks.is_locked(&coin.id()))
            .fold(0u64, |acc, coin| acc.saturating_add(coin.amount)))
    }
}

/// Whether `event` spends its coin the way `offer` signed it: same coin,
/// same created coins.
fn settles_offer(offer: &Offer, event: &SpendConfirmation) -> bool {
    offer
        .bundle
        .spends
        .iter()
        .find(|spend| spend.coin_id() == event.coin_id)
        .is_some_and(|spend| {
            let expected: BTreeSet<CoinId> = spend.outputs().iter().map(Coin::id).collect();
            let created: BTreeSet<CoinId> = event.created.iter().copied().collect();
            expected == created
        })
}

/// The completed bundle must pay this wallet exactly the negation of the
/// offer's delta, and what the initiator's puzzle receives must mirror it.
fn check_completion_flows(completion: &Completion, own: &PuzzleHash) -> Result<()> {
    let responder = party_flow(&completion.bundle, own)?;
    check_trade_flow(&completion.offer.delta.non_zero(), &responder)?;
    if let Some(spend) = completion.offer.bundle.spends.first() {
        let initiator = party_flow(&completion.bundle, &spend.coin.puzzle_hash)?;
        check_trade_flow(&initiator, &responder)?;
    }
    Ok(())
}

fn ensure_cancellable(record: &TradeRecord) -> Result<()> {
    if record.role != TradeRole::Initiator || record.status != TradeStatus::PendingAccept {
        return Err(OfferswapError::NotCancellable {
            trade_id: record.trade_id,
            status: record.status,
        });
    }
    Ok(())
}
