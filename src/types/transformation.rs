//! Transformation: irreversible conversion of part of one stock into another.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{EntityId, StockId, TransformationId};

/// A transformation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    pub(crate) id: TransformationId,
    pub(crate) owner: EntityId,
    pub(crate) kind: String,
    pub(crate) source_stock: StockId,
    pub(crate) destination_stock: StockId,
    pub(crate) volume_deducted_from_source: f64,
    pub(crate) volume_destination: f64,
    pub(crate) created_at: DateTime<Utc>,
}

impl Transformation {
    /// Create a transformation record.
    pub fn new(
        id: TransformationId,
        owner: EntityId,
        kind: impl Into<String>,
        source_stock: StockId,
        destination_stock: StockId,
        volume_deducted_from_source: f64,
        volume_destination: f64,
    ) -> Self {
        Self {
            id,
            owner,
            kind: kind.into(),
            source_stock,
            destination_stock,
            volume_deducted_from_source,
            volume_destination,
            created_at: Utc::now(),
        }
    }

    /// Id.
    pub fn id(&self) -> TransformationId {
        self.id
    }

    /// Owner entity.
    pub fn owner(&self) -> EntityId {
        self.owner
    }

    /// Transformation kind (e.g. `ETH_ETBE`).
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Stock the volume was taken from.
    pub fn source_stock(&self) -> StockId {
        self.source_stock
    }

    /// Stock the output was put into.
    pub fn destination_stock(&self) -> StockId {
        self.destination_stock
    }

    /// Volume taken from the source stock.
    pub fn volume_deducted_from_source(&self) -> f64 {
        self.volume_deducted_from_source
    }

    /// Volume put into the destination stock.
    pub fn volume_destination(&self) -> f64 {
        self.volume_destination
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
