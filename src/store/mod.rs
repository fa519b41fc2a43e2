//! Ledger storage backends.
//!
//! The engine only needs bulk reads by id, bulk reads by parent reference
//! (which backends must index), paginated stock listing and one atomic
//! bulk write per transaction.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{
    AuditEvent, LedgerNode, Lot, LotId, NodeRef, Stock, StockId, Transformation,
    TransformationId,
};

/// Trait for ledger storage backends.
///
/// Implementations must return results ordered by id for determinism.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync;

    /// Fetch lots by id. Missing ids are skipped.
    async fn get_lots(&self, ids: &[LotId]) -> Result<Vec<Lot>, Self::Error>;

    /// Fetch stocks by id. Missing ids are skipped.
    async fn get_stocks(&self, ids: &[StockId]) -> Result<Vec<Stock>, Self::Error>;

    /// Fetch transformations by id. Missing ids are skipped.
    async fn get_transformations(
        &self,
        ids: &[TransformationId],
    ) -> Result<Vec<Transformation>, Self::Error>;

    /// Lots whose `parent_lot` is one of `parents` (including deleted lots).
    async fn lots_by_parent_lot(&self, parents: &[LotId]) -> Result<Vec<Lot>, Self::Error>;

    /// Lots whose `parent_stock` is one of `parents` (including deleted lots).
    async fn lots_by_parent_stock(&self, parents: &[StockId]) -> Result<Vec<Lot>, Self::Error>;

    /// Stocks whose `parent_lot` is one of `parents`.
    async fn stocks_by_parent_lot(&self, parents: &[LotId]) -> Result<Vec<Stock>, Self::Error>;

    /// Stocks whose `parent_transformation` is one of `parents`.
    async fn stocks_by_parent_transformation(
        &self,
        parents: &[TransformationId],
    ) -> Result<Vec<Stock>, Self::Error>;

    /// Transformations whose `source_stock` is one of `sources`.
    async fn transformations_by_source_stock(
        &self,
        sources: &[StockId],
    ) -> Result<Vec<Transformation>, Self::Error>;

    /// Up to `limit` stocks with id greater than `after`, ordered by id.
    async fn list_stocks(
        &self,
        after: Option<StockId>,
        limit: usize,
    ) -> Result<Vec<Stock>, Self::Error>;

    /// Apply a write batch atomically: all of it or none of it.
    async fn commit(&self, batch: WriteBatch) -> Result<(), Self::Error>;

    /// Overwrite the remaining quantity of drifting stocks, atomically.
    ///
    /// Only the remaining volume and its derived weight and energy are
    /// written, onto the row as currently stored. A correction whose stock
    /// no longer stores `expected` lost a race with a live write and is
    /// skipped, along with its audit event. Returns the corrected ids.
    async fn correct_remaining(
        &self,
        corrections: Vec<RemainingCorrection>,
    ) -> Result<Vec<StockId>, Self::Error>;

    /// Fetch nodes of any kind by reference.
    async fn get_nodes(&self, refs: &[NodeRef]) -> Result<Vec<LedgerNode>, Self::Error> {
        let mut lots = Vec::new();
        let mut stocks = Vec::new();
        let mut transformations = Vec::new();
        for r in refs {
            match r {
                NodeRef::Lot(id) => lots.push(*id),
                NodeRef::Stock(id) => stocks.push(*id),
                NodeRef::Transformation(id) => transformations.push(*id),
            }
        }

        let mut nodes = Vec::with_capacity(refs.len());
        if !lots.is_empty() {
            nodes.extend(self.get_lots(&lots).await?.into_iter().map(LedgerNode::Lot));
        }
        if !stocks.is_empty() {
            nodes.extend(self.get_stocks(&stocks).await?.into_iter().map(LedgerNode::Stock));
        }
        if !transformations.is_empty() {
            nodes.extend(
                self.get_transformations(&transformations)
                    .await?
                    .into_iter()
                    .map(LedgerNode::Transformation),
            );
        }
        Ok(nodes)
    }
}

/// Changes produced by one engine call, persisted as a single transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteBatch {
    /// Nodes to insert or overwrite.
    pub upserts: Vec<LedgerNode>,
    /// Lots to soft-delete (already carrying status `DELETED`).
    pub deleted_lots: Vec<Lot>,
    /// Audit events recorded with the changes.
    pub audit_events: Vec<AuditEvent>,
}

impl WriteBatch {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the batch writes nothing.
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deleted_lots.is_empty() && self.audit_events.is_empty()
    }

    /// Number of node writes.
    pub fn node_count(&self) -> usize {
        self.upserts.len() + self.deleted_lots.len()
    }
}

/// Reconciliation overwrite of one stock's remaining volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemainingCorrection {
    /// Stock to correct.
    pub stock_id: StockId,
    /// Stored remaining volume the correction was derived against.
    pub expected: f64,
    /// Re-derived remaining volume.
    pub remaining: f64,
    /// Recorded only if the correction is applied.
    pub event: AuditEvent,
}

/// Full dump of a ledger, used for import/export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// All lots.
    pub lots: Vec<Lot>,
    /// All stocks.
    pub stocks: Vec<Stock>,
    /// All transformations.
    pub transformations: Vec<Transformation>,
}

pub use memory::{InMemoryError, InMemoryLedgerStore};
