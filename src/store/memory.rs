//! In-memory ledger store.
//!
//! Uses BTreeMap/BTreeSet for deterministic iteration order. All state sits
//! behind one `RwLock`, so a commit is atomic with respect to concurrent
//! readers such as the reconciliation job.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

use super::{LedgerSnapshot, LedgerStore, RemainingCorrection, WriteBatch};
use crate::types::{
    round2, AuditEvent, LedgerNode, Lot, LotId, Stock, StockId, Transformation, TransformationId,
};

/// Error type for in-memory store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryError {
    /// Commit refused by failure injection.
    #[error("Commit refused: {0}")]
    CommitRefused(String),
}

#[derive(Debug, Default)]
struct Inner {
    lots: BTreeMap<LotId, Lot>,
    stocks: BTreeMap<StockId, Stock>,
    transformations: BTreeMap<TransformationId, Transformation>,
    lots_by_parent_lot: BTreeMap<LotId, BTreeSet<LotId>>,
    lots_by_parent_stock: BTreeMap<StockId, BTreeSet<LotId>>,
    stocks_by_parent_lot: BTreeMap<LotId, BTreeSet<StockId>>,
    stocks_by_parent_transformation: BTreeMap<TransformationId, BTreeSet<StockId>>,
    transformations_by_source: BTreeMap<StockId, BTreeSet<TransformationId>>,
    audit_log: Vec<AuditEvent>,
    commits: u64,
    refused_commits: u32,
}

impl Inner {
    fn put_lot(&mut self, lot: Lot) {
        if let Some(parent) = lot.parent_lot() {
            self.lots_by_parent_lot.entry(parent).or_default().insert(lot.id());
        }
        if let Some(parent) = lot.parent_stock() {
            self.lots_by_parent_stock.entry(parent).or_default().insert(lot.id());
        }
        self.lots.insert(lot.id(), lot);
    }

    fn put_stock(&mut self, stock: Stock) {
        if let Some(parent) = stock.parent_lot() {
            self.stocks_by_parent_lot.entry(parent).or_default().insert(stock.id());
        }
        if let Some(parent) = stock.parent_transformation() {
            self.stocks_by_parent_transformation
                .entry(parent)
                .or_default()
                .insert(stock.id());
        }
        self.stocks.insert(stock.id(), stock);
    }

    fn put_transformation(&mut self, t: Transformation) {
        self.transformations_by_source
            .entry(t.source_stock())
            .or_default()
            .insert(t.id());
        self.transformations.insert(t.id(), t);
    }

    fn put_node(&mut self, node: LedgerNode) {
        match node {
            LedgerNode::Lot(lot) => self.put_lot(lot),
            LedgerNode::Stock(stock) => self.put_stock(stock),
            LedgerNode::Transformation(t) => self.put_transformation(t),
        }
    }
}

fn collect_children<P: Ord, C: Ord + Copy, V: Clone>(
    index: &BTreeMap<P, BTreeSet<C>>,
    values: &BTreeMap<C, V>,
    parents: &[P],
) -> Vec<V> {
    let ids: BTreeSet<C> = parents
        .iter()
        .filter_map(|p| index.get(p))
        .flat_map(|set| set.iter().copied())
        .collect();
    ids.iter().filter_map(|id| values.get(id).cloned()).collect()
}

fn collect_by_id<K: Ord + Copy, V: Clone>(values: &BTreeMap<K, V>, ids: &[K]) -> Vec<V> {
    let ids: BTreeSet<K> = ids.iter().copied().collect();
    ids.iter().filter_map(|id| values.get(id).cloned()).collect()
}

/// In-memory ledger store for tests and offline jobs.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    inner: RwLock<Inner>,
}

impl InMemoryLedgerStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding every record of a snapshot.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.write();
            for lot in snapshot.lots {
                inner.put_lot(lot);
            }
            for stock in snapshot.stocks {
                inner.put_stock(stock);
            }
            for t in snapshot.transformations {
                inner.put_transformation(t);
            }
        }
        store
    }

    /// Export every record.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let inner = self.inner.read();
        LedgerSnapshot {
            lots: inner.lots.values().cloned().collect(),
            stocks: inner.stocks.values().cloned().collect(),
            transformations: inner.transformations.values().cloned().collect(),
        }
    }

    /// Insert or overwrite a lot, bypassing the engines (fixtures, imports).
    pub fn insert_lot(&self, lot: Lot) {
        self.inner.write().put_lot(lot);
    }

    /// Insert or overwrite a stock, bypassing the engines (fixtures, imports).
    pub fn insert_stock(&self, stock: Stock) {
        self.inner.write().put_stock(stock);
    }

    /// Insert or overwrite a transformation, bypassing the engines (fixtures, imports).
    pub fn insert_transformation(&self, t: Transformation) {
        self.inner.write().put_transformation(t);
    }

    /// Get a lot by id.
    pub fn lot(&self, id: LotId) -> Option<Lot> {
        self.inner.read().lots.get(&id).cloned()
    }

    /// Get a stock by id.
    pub fn stock(&self, id: StockId) -> Option<Stock> {
        self.inner.read().stocks.get(&id).cloned()
    }

    /// Get a transformation by id.
    pub fn transformation(&self, id: TransformationId) -> Option<Transformation> {
        self.inner.read().transformations.get(&id).cloned()
    }

    /// Number of lots, including deleted ones.
    pub fn num_lots(&self) -> usize {
        self.inner.read().lots.len()
    }

    /// Number of stocks.
    pub fn num_stocks(&self) -> usize {
        self.inner.read().stocks.len()
    }

    /// All persisted audit events, in commit order.
    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.inner.read().audit_log.clone()
    }

    /// Number of successful commits.
    pub fn commit_count(&self) -> u64 {
        self.inner.read().commits
    }

    /// Refuse the next `n` commits (failure injection for tests).
    pub fn refuse_next_commits(&self, n: u32) {
        self.inner.write().refused_commits = n;
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    type Error = InMemoryError;

    async fn get_lots(&self, ids: &[LotId]) -> Result<Vec<Lot>, Self::Error> {
        Ok(collect_by_id(&self.inner.read().lots, ids))
    }

    async fn get_stocks(&self, ids: &[StockId]) -> Result<Vec<Stock>, Self::Error> {
        Ok(collect_by_id(&self.inner.read().stocks, ids))
    }

    async fn get_transformations(
        &self,
        ids: &[TransformationId],
    ) -> Result<Vec<Transformation>, Self::Error> {
        Ok(collect_by_id(&self.inner.read().transformations, ids))
    }

    async fn lots_by_parent_lot(&self, parents: &[LotId]) -> Result<Vec<Lot>, Self::Error> {
        let inner = self.inner.read();
        Ok(collect_children(&inner.lots_by_parent_lot, &inner.lots, parents))
    }

    async fn lots_by_parent_stock(&self, parents: &[StockId]) -> Result<Vec<Lot>, Self::Error> {
        let inner = self.inner.read();
        Ok(collect_children(&inner.lots_by_parent_stock, &inner.lots, parents))
    }

    async fn stocks_by_parent_lot(&self, parents: &[LotId]) -> Result<Vec<Stock>, Self::Error> {
        let inner = self.inner.read();
        Ok(collect_children(&inner.stocks_by_parent_lot, &inner.stocks, parents))
    }

    async fn stocks_by_parent_transformation(
        &self,
        parents: &[TransformationId],
    ) -> Result<Vec<Stock>, Self::Error> {
        let inner = self.inner.read();
        Ok(collect_children(
            &inner.stocks_by_parent_transformation,
            &inner.stocks,
            parents,
        ))
    }

    async fn transformations_by_source_stock(
        &self,
        sources: &[StockId],
    ) -> Result<Vec<Transformation>, Self::Error> {
        let inner = self.inner.read();
        Ok(collect_children(
            &inner.transformations_by_source,
            &inner.transformations,
            sources,
        ))
    }

    async fn list_stocks(
        &self,
        after: Option<StockId>,
        limit: usize,
    ) -> Result<Vec<Stock>, Self::Error> {
        let inner = self.inner.read();
        let page = match after {
            Some(after) => inner
                .stocks
                .range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
                .take(limit)
                .map(|(_, s)| s.clone())
                .collect(),
            None => inner.stocks.values().take(limit).cloned().collect(),
        };
        Ok(page)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), Self::Error> {
        let mut inner = self.inner.write();
        if inner.refused_commits > 0 {
            inner.refused_commits -= 1;
            return Err(InMemoryError::CommitRefused(format!(
                "{} node writes, {} audit events",
                batch.node_count(),
                batch.audit_events.len()
            )));
        }

        for node in batch.upserts {
            inner.put_node(node);
        }
        for lot in batch.deleted_lots {
            inner.put_lot(lot);
        }
        inner.audit_log.extend(batch.audit_events);
        inner.commits += 1;
        Ok(())
    }

    async fn correct_remaining(
        &self,
        corrections: Vec<RemainingCorrection>,
    ) -> Result<Vec<StockId>, Self::Error> {
        let mut inner = self.inner.write();
        if inner.refused_commits > 0 {
            inner.refused_commits -= 1;
            return Err(InMemoryError::CommitRefused(format!(
                "{} remaining corrections",
                corrections.len()
            )));
        }

        let mut corrected = Vec::new();
        for correction in corrections {
            let Some(stock) = inner.stocks.get_mut(&correction.stock_id) else {
                continue;
            };
            if round2(stock.remaining_volume()) != round2(correction.expected) {
                continue;
            }
            stock.set_remaining_volume(correction.remaining);
            corrected.push(correction.stock_id);
            inner.audit_log.push(correction.event);
        }
        inner.commits += 1;
        Ok(corrected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Biofuel, Characteristics, EntityId, LotStatus};
    use uuid::Uuid;

    fn make_lot(id: u128, volume: f64) -> Lot {
        Lot::draft(
            EntityId::new(Uuid::from_u128(100)),
            Characteristics::new("COLZA", Biofuel::emhv()),
            volume,
        )
        .with_id(LotId::new(Uuid::from_u128(id)))
    }

    #[tokio::test]
    async fn test_insert_and_get_lot() {
        let store = InMemoryLedgerStore::new();
        let lot = make_lot(1, 100.0);
        let id = lot.id();
        store.insert_lot(lot);

        let lots = store.get_lots(&[id]).await.unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].id(), id);
        assert!(store.get_lots(&[LotId::generate()]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_children_by_parent_reference() {
        let store = InMemoryLedgerStore::new();
        let root = make_lot(1, 1000.0);
        let stock = Stock::from_lot(&root, EntityId::generate());
        let drawn = make_lot(2, 300.0).with_parent_stock(stock.id());
        let forwarded = make_lot(3, 1000.0).with_parent_lot(root.id());

        store.insert_lot(root.clone());
        store.insert_stock(stock.clone());
        store.insert_lot(drawn.clone());
        store.insert_lot(forwarded.clone());

        let stocks = store.stocks_by_parent_lot(&[root.id()]).await.unwrap();
        assert_eq!(stocks.len(), 1);
        assert_eq!(stocks[0].id(), stock.id());

        let lots = store.lots_by_parent_stock(&[stock.id()]).await.unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].id(), drawn.id());

        let lots = store.lots_by_parent_lot(&[root.id()]).await.unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].id(), forwarded.id());
    }

    #[tokio::test]
    async fn test_list_stocks_paginates_in_id_order() {
        let store = InMemoryLedgerStore::new();
        let root = make_lot(1, 10.0);
        for i in 1..=5u128 {
            store.insert_stock(
                Stock::from_lot(&root, EntityId::generate()).with_id(StockId::new(Uuid::from_u128(i))),
            );
        }

        let first = store.list_stocks(None, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        let second = store.list_stocks(Some(first[1].id()), 2).await.unwrap();
        assert_eq!(second.len(), 2);
        assert!(second[0].id() > first[1].id());
        let last = store.list_stocks(Some(second[1].id()), 2).await.unwrap();
        assert_eq!(last.len(), 1);
    }

    #[tokio::test]
    async fn test_refused_commit_writes_nothing() {
        let store = InMemoryLedgerStore::new();
        store.refuse_next_commits(1);

        let lot = make_lot(1, 10.0);
        let batch = WriteBatch {
            upserts: vec![LedgerNode::Lot(lot.clone())],
            ..WriteBatch::default()
        };
        assert!(store.commit(batch.clone()).await.is_err());
        assert!(store.lot(lot.id()).is_none());

        store.commit(batch).await.unwrap();
        assert!(store.lot(lot.id()).is_some());
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_correct_remaining_writes_only_unraced_stocks() {
        let store = InMemoryLedgerStore::new();
        let root = make_lot(1, 1000.0).with_status(LotStatus::Accepted);
        let current = Stock::from_lot(&root, EntityId::generate())
            .with_id(StockId::new(Uuid::from_u128(1)))
            .with_remaining_volume(650.0);
        let raced = Stock::from_lot(&root, EntityId::generate())
            .with_id(StockId::new(Uuid::from_u128(2)))
            .with_remaining_volume(550.0);
        store.insert_stock(current.clone());
        store.insert_stock(raced.clone());

        let correction = |stock: &Stock| RemainingCorrection {
            stock_id: stock.id(),
            expected: 650.0,
            remaining: 700.0,
            event: AuditEvent::new(
                crate::types::AuditEventKind::DriftCorrected {
                    stock_id: stock.id(),
                    stored: 650.0,
                    theoretical: 700.0,
                    delta: 50.0,
                },
                "reconcile",
            ),
        };
        let corrected = store
            .correct_remaining(vec![correction(&current), correction(&raced)])
            .await
            .unwrap();

        assert_eq!(corrected, vec![current.id()]);
        let stock = store.stock(current.id()).unwrap();
        assert_eq!(stock.remaining_volume(), 700.0);
        assert_eq!(stock.characteristics(), current.characteristics());
        assert_eq!(stock.remaining().weight, 618.1);
        assert_eq!(store.stock(raced.id()).unwrap().remaining_volume(), 550.0);
        assert_eq!(store.audit_events().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip_keeps_indexes() {
        let store = InMemoryLedgerStore::new();
        let root = make_lot(1, 10.0).with_status(LotStatus::Accepted);
        let stock = Stock::from_lot(&root, EntityId::generate());
        store.insert_lot(root.clone());
        store.insert_stock(stock.clone());

        let json = serde_json::to_string(&store.snapshot()).unwrap();
        let restored = InMemoryLedgerStore::from_snapshot(serde_json::from_str(&json).unwrap());
        let stocks = restored.stocks_by_parent_lot(&[root.id()]).await.unwrap();
        assert_eq!(stocks.len(), 1);
        assert_eq!(stocks[0].id(), stock.id());
        assert_eq!(stocks[0].initial_volume(), 10.0);
    }
}
