//! Error types for the offerswap trade engine.
//!
//! All errors use the `OS_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Offer construction errors
//! - 2xx: Funds / coin lock errors
//! - 3xx: Offer codec errors
//! - 4xx: Offer validation errors
//! - 5xx: Chain / broadcast / signing errors
//! - 6xx: Trade lifecycle errors
//! - 9xx: General / internal errors

use thiserror::Error;

use crate::{AssetId, CoinId, TradeId, TradeStatus};

/// Central error enum for all offerswap operations.
#[derive(Debug, Error)]
pub enum OfferswapError {
    // =================================================================
    // Offer Construction Errors (1xx)
    // =================================================================
    /// The requested delta is not a trade (missing a side, bad amounts, ...).
    #[error("OS_ERR_100: Invalid offer: {reason}")]
    InvalidOffer { reason: String },

    // =================================================================
    // Funds / Lock Errors (2xx)
    // =================================================================
    /// Not enough unlocked spendable coins of an asset.
    #[error("OS_ERR_200: Insufficient funds of {asset}: need {needed}, have {available}")]
    InsufficientFunds {
        asset: AssetId,
        needed: u64,
        available: u64,
    },

    /// The coin is already reserved by another pending trade.
    #[error("OS_ERR_201: Coin {coin} already locked by trade {trade_id}")]
    AlreadyLocked { coin: CoinId, trade_id: TradeId },

    // =================================================================
    // Codec Errors (3xx)
    // =================================================================
    /// The offer bytes could not be decoded into a well-formed offer.
    #[error("OS_ERR_300: Malformed offer: {reason}")]
    MalformedOffer { reason: String },

    // =================================================================
    // Validation Errors (4xx)
    // =================================================================
    /// The offer's spends, terms and declared delta do not reconcile.
    #[error("OS_ERR_400: Inconsistent offer: {reason}")]
    Inconsistent { reason: String },

    /// The offer references an asset class this wallet cannot resolve.
    #[error("OS_ERR_401: Unknown asset class: {0}")]
    UnknownAsset(AssetId),

    /// A bundle or the ledger as a whole creates or destroys value.
    #[error("OS_ERR_402: Conservation violated: {reason}")]
    ConservationViolation { reason: String },

    // =================================================================
    // Chain / Broadcast / Signing Errors (5xx)
    // =================================================================
    /// A coin spent by the offer is no longer unspent on chain.
    #[error("OS_ERR_500: Stale offer: coin {coin} is no longer unspent")]
    StaleOffer { coin: CoinId },

    /// The broadcast channel refused the bundle.
    #[error("OS_ERR_501: Broadcast rejected: {reason}")]
    BroadcastRejected { reason: String },

    /// The signing oracle could not produce a signature.
    #[error("OS_ERR_502: Signing failed: {reason}")]
    SigningFailed { reason: String },

    // =================================================================
    // Trade Lifecycle Errors (6xx)
    // =================================================================
    /// No trade record with this id.
    #[error("OS_ERR_600: Trade not found: {0}")]
    TradeNotFound(TradeId),

    /// A secure cancel for this trade is already in flight.
    #[error("OS_ERR_601: Trade {0} is already being canceled")]
    AlreadyCanceling(TradeId),

    /// The trade cannot be canceled in its current state.
    #[error("OS_ERR_602: Trade {trade_id} cannot be canceled in state {status}")]
    NotCancellable {
        trade_id: TradeId,
        status: TradeStatus,
    },

    /// A status write that the trade state machine forbids.
    #[error("OS_ERR_603: Invalid status transition {from} -> {to}")]
    InvalidTransition { from: TradeStatus, to: TradeStatus },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("OS_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("OS_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("OS_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (offer file sink or source).
    #[error("OS_ERR_903: I/O error: {0}")]
    Io(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, OfferswapError>;

impl From<std::io::Error> for OfferswapError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for OfferswapError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
