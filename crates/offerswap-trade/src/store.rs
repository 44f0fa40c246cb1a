//! Trade ledger: trade id → [`TradeRecord`].
//!
//! The manager only ever touches the store while holding its state lock,
//! together with the coin lock table, so implementations need no internal
//! synchronization.

use std::collections::HashMap;

use offerswap_types::{TradeId, TradeRecord, TradeStatus};

/// Key-value storage of trade records.
pub trait TradeStore: Send {
    fn get(&self, trade_id: &TradeId) -> Option<TradeRecord>;

    /// Insert or replace.
    fn put(&mut self, record: TradeRecord);

    fn remove(&mut self, trade_id: &TradeId) -> Option<TradeRecord>;

    /// Every record, oldest first.
    fn all(&self) -> Vec<TradeRecord>;

    fn by_status(&self, status: TradeStatus) -> Vec<TradeRecord> {
        self.all()
            .into_iter()
            .filter(|record| record.status == status)
            .collect()
    }
}

/// In-memory trade store.
#[derive(Debug, Default)]
pub struct MemoryTradeStore {
    records: HashMap<TradeId, TradeRecord>,
}

impl MemoryTradeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl TradeStore for MemoryTradeStore {
    fn get(&self, trade_id: &TradeId) -> Option<TradeRecord> {
        self.records.get(trade_id).cloned()
    }

    fn put(&mut self, record: TradeRecord) {
        self.records.insert(record.trade_id, record);
    }

    fn remove(&mut self, trade_id: &TradeId) -> Option<TradeRecord> {
        self.records.remove(trade_id)
    }

    fn all(&self) -> Vec<TradeRecord> {
        let mut records: Vec<TradeRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.trade_id.cmp(&b.trade_id))
        });
        records
    }
}

#[cfg(test)]
mod tests {
    use offerswap_types::{
        AssetId, Offer, OfferDelta, OfferTerms, SpendBundle, constants,
    };

    use super::*;

    fn record(nonce: u8) -> TradeRecord {
        TradeRecord::new_offer(Offer {
            version: constants::OFFER_FORMAT_VERSION,
            delta: OfferDelta::new().with(AssetId::Native, 1),
            terms: OfferTerms {
                nonce: [nonce; 32],
                payments: Vec::new(),
            },
            bundle: SpendBundle::default(),
            assets: Vec::new(),
        })
    }

    #[test]
    fn put_get_remove() {
        let mut store = MemoryTradeStore::new();
        let rec = record(1);
        let id = rec.trade_id;
        store.put(rec);
        assert_eq!(store.get(&id).map(|r| r.status), Some(TradeStatus::PendingAccept));
        assert_eq!(store.len(), 1);
        assert!(store.remove(&id).is_some());
        assert!(store.get(&id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn filter_by_status() {
        let mut store = MemoryTradeStore::new();
        let mut rec = record(1);
        rec.transition(TradeStatus::Canceled).unwrap();
        store.put(rec);
        assert_eq!(store.by_status(TradeStatus::Canceled).len(), 1);
        assert!(store.by_status(TradeStatus::PendingAccept).is_empty());
    }
}
