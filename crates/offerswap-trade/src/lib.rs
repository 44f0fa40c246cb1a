//! # offerswap-trade
//!
//! The Trade Manager: one instance per wallet process owns that wallet's
//! coin lock table and trade ledger, and exposes the create / review /
//! accept / cancel operations on top of `offerswap-offer`.
//!
//! Both parties of a swap run their own manager. They never talk to each
//! other; the offer file is the only thing that travels, and each side's
//! records are reconciled by the chain alone:
//!
//! ```text
//!   initiator manager              offer file               responder manager
//!   create_offer_for_ids ─────────▶ [.offer] ─────────────▶ get_discrepancies_for_offer
//!                                                            respond_to_offer ──▶ broadcast
//!                                                                                   │
//!   handle_spend_confirmation ◀────────── ledger confirmation feed ◀────────────────┘
//! ```

pub mod conservation;
pub mod manager;
pub mod store;

pub use conservation::{SupplyConservation, check_bundle, check_trade_flow, party_flow};
pub use manager::TradeManager;
pub use store::{MemoryTradeStore, TradeStore};
