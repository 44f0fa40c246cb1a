//! # Trade records and the trade status state machine
//!
//! Each party keeps its own [`TradeRecord`]. The two copies are never synced
//! directly; they converge only through what the chain confirms.
//!
//! ## State Machine
//!
//! ```text
//!                      respond / own coins seen spent
//!   ┌────────────────┐ ─────────────────────────────▶ ┌─────────────────┐
//!   │ PENDING_ACCEPT │                                │ PENDING_CONFIRM │
//!   └──┬──────────┬──┘                                └──┬───────────┬──┘
//!      │ cancel   │ broadcast rejected    spend buried   │           │ rejected /
//!      ▼          ▼                                      ▼           ▼ conflicted
//!   ┌──────────┐ ┌────────┐                        ┌───────────┐ ┌────────┐
//!   │ CANCELED │ │ FAILED │                        │ CONFIRMED │ │ FAILED │
//!   └──────────┘ └────────┘                        └───────────┘ └────────┘
//! ```
//!
//! A secure cancel keeps the record in `PENDING_ACCEPT` (with a cancel bundle
//! id set) until the return spend is buried deep enough.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BundleId, Offer, OfferDelta, OfferswapError, Result, TradeId};

/// Lifecycle status of a trade, from one party's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeStatus {
    /// Offer created, nobody has completed it yet.
    PendingAccept,
    /// Completed bundle broadcast or seen on chain, not yet deep enough.
    PendingConfirm,
    /// Included in a block and final. **Terminal.**
    Confirmed,
    /// Withdrawn before confirmation. **Terminal.**
    Canceled,
    /// Broadcast rejected or bundle invalid. **Terminal**; never retried.
    Failed,
}

impl TradeStatus {
    /// Can this status transition to the given target status?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (
                Self::PendingAccept,
                Self::PendingConfirm | Self::Canceled | Self::Failed
            ) | (Self::PendingConfirm, Self::Confirmed | Self::Failed)
        )
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Canceled | Self::Failed)
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PendingAccept => write!(f, "PENDING_ACCEPT"),
            Self::PendingConfirm => write!(f, "PENDING_CONFIRM"),
            Self::Confirmed => write!(f, "CONFIRMED"),
            Self::Canceled => write!(f, "CANCELED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Which side of the trade this record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeRole {
    /// Created the offer file.
    Initiator,
    /// Completed someone else's offer file.
    Responder,
}

/// A party's local record of one trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Same on both sides: derived from the initiator's partial bundle.
    pub trade_id: TradeId,
    pub role: TradeRole,
    /// This party's delta (the responder's is the negation of the offer's).
    pub delta: OfferDelta,
    pub offer: Offer,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    /// Bundle this party broadcast to complete the trade (responder only).
    pub completed_bundle: Option<BundleId>,
    /// Return-spend bundle of an in-flight secure cancel (initiator only).
    pub cancel_bundle: Option<BundleId>,
    /// Height of the block that settled the trade or the cancel.
    pub settled_height: Option<u32>,
    /// Where the offer file was written to or read from, if it was a file.
    pub offer_file: Option<PathBuf>,
    /// Reason recorded on `FAILED`.
    pub failure: Option<String>,
}

impl TradeRecord {
    /// Record for a freshly built offer.
    #[must_use]
    pub fn new_offer(offer: Offer) -> Self {
        Self {
            trade_id: offer.trade_id(),
            role: TradeRole::Initiator,
            delta: offer.delta.clone(),
            offer,
            status: TradeStatus::PendingAccept,
            created_at: Utc::now(),
            accepted_at: None,
            completed_bundle: None,
            cancel_bundle: None,
            settled_height: None,
            offer_file: None,
            failure: None,
        }
    }

    /// Record for an offer this party is completing. Stays `PENDING_ACCEPT`
    /// until the completed bundle has been accepted for broadcast.
    #[must_use]
    pub fn new_response(offer: Offer, delta: OfferDelta, completed_bundle: BundleId) -> Self {
        Self {
            trade_id: offer.trade_id(),
            role: TradeRole::Responder,
            delta,
            offer,
            status: TradeStatus::PendingAccept,
            created_at: Utc::now(),
            accepted_at: None,
            completed_bundle: Some(completed_bundle),
            cancel_bundle: None,
            settled_height: None,
            offer_file: None,
            failure: None,
        }
    }

    /// Move to `target`, enforcing the state machine.
    ///
    /// # Errors
    /// Returns `InvalidTransition` if the move is not allowed.
    pub fn transition(&mut self, target: TradeStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(OfferswapError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }

    /// A secure cancel has been broadcast and not yet confirmed.
    #[must_use]
    pub fn is_canceling(&self) -> bool {
        self.cancel_bundle.is_some() && !self.status.is_terminal()
    }
}
