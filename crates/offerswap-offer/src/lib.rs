//! # offerswap-offer
//!
//! Offer construction and consumption, independent of any trade ledger.
//!
//! ## Data flow
//!
//! ```text
//!   initiator                                         responder
//!   ─────────                                         ─────────
//!   OfferBuilder::prepare ─▶ PreparedOffer::sign
//!           │
//!           ▼
//!   encode_offer / write_offer ──▶ [ .offer file ] ──▶ read_offer / decode_offer
//!                                                              │
//!                                                              ▼
//!                                                       discrepancies
//!                                                              │
//!                                                              ▼
//!                                            ensure_fresh ─▶ OfferCompleter::prepare
//!                                                              │
//!                                                              ▼
//!                                                    Completion::sign ─▶ broadcast
//! ```
//!
//! The synchronous `prepare` steps never touch the ledger: callers fetch
//! candidate coins first and run `prepare` under their own coin lock table.

pub mod builder;
pub mod codec;
pub mod completer;
pub mod validator;

pub use builder::{OfferBuilder, PreparedOffer, asset_metadata};
pub use codec::{decode_offer, encode_offer, read_offer, write_offer};
pub use completer::{Completion, OfferCompleter, ensure_fresh};
pub use validator::{discrepancies, settlement_coins};
