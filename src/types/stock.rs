//! Stock: a reservoir of commodity held by one party.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::characteristics::Characteristics;
use super::ids::{EntityId, LotId, StockId, TransformationId};
use super::lot::Lot;
use super::quantity::{round2, Quantity};

/// A stock.
///
/// `initial_volume` and the parent link are fixed at creation. The remaining
/// quantity is maintained by the engines and re-derived by reconciliation:
///
/// ```text
/// remaining = initial - Σ live drawn lots - Σ transformation deductions
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    pub(crate) id: StockId,
    pub(crate) owner: EntityId,
    pub(crate) parent_lot: Option<LotId>,
    pub(crate) parent_transformation: Option<TransformationId>,
    pub(crate) characteristics: Characteristics,
    pub(crate) initial_volume: f64,
    pub(crate) remaining: Quantity,
    #[serde(default)]
    pub(crate) retired: bool,
    pub(crate) created_at: DateTime<Utc>,
}

impl Stock {
    /// Create the stock that receives an accepted lot.
    pub fn from_lot(lot: &Lot, owner: EntityId) -> Self {
        Self {
            id: StockId::generate(),
            owner,
            parent_lot: Some(lot.id()),
            parent_transformation: None,
            characteristics: lot.characteristics().clone(),
            initial_volume: lot.volume(),
            remaining: lot.quantity(),
            retired: false,
            created_at: Utc::now(),
        }
    }

    /// Create the destination stock of a transformation.
    pub fn from_transformation(
        transformation: TransformationId,
        owner: EntityId,
        characteristics: Characteristics,
        volume: f64,
    ) -> Self {
        let remaining = characteristics.biofuel.quantity(volume);
        Self {
            id: StockId::generate(),
            owner,
            parent_lot: None,
            parent_transformation: Some(transformation),
            characteristics,
            initial_volume: remaining.volume,
            remaining,
            retired: false,
            created_at: Utc::now(),
        }
    }

    /// Use a specific id.
    pub fn with_id(mut self, id: StockId) -> Self {
        self.id = id;
        self
    }

    /// Override the stored remaining volume of a record imported from an existing ledger.
    pub fn with_remaining_volume(mut self, volume: f64) -> Self {
        self.set_remaining_volume(volume);
        self
    }

    /// Id.
    pub fn id(&self) -> StockId {
        self.id
    }

    /// Owner entity.
    pub fn owner(&self) -> EntityId {
        self.owner
    }

    /// Lot this stock was accepted from.
    pub fn parent_lot(&self) -> Option<LotId> {
        self.parent_lot
    }

    /// Transformation that produced this stock.
    pub fn parent_transformation(&self) -> Option<TransformationId> {
        self.parent_transformation
    }

    /// Characteristics.
    pub fn characteristics(&self) -> &Characteristics {
        &self.characteristics
    }

    /// Volume at creation.
    pub fn initial_volume(&self) -> f64 {
        self.initial_volume
    }

    /// Remaining volume.
    pub fn remaining_volume(&self) -> f64 {
        self.remaining.volume
    }

    /// Remaining volume, weight and energy.
    pub fn remaining(&self) -> Quantity {
        self.remaining
    }

    /// Soft-deleted because its feed was deleted.
    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn set_remaining_volume(&mut self, volume: f64) {
        self.remaining = self.characteristics.biofuel.quantity(volume);
    }

    /// Add `delta` (may be negative) to the remaining volume.
    pub(crate) fn adjust_remaining(&mut self, delta: f64) {
        self.set_remaining_volume(round2(self.remaining.volume + delta));
    }

    pub(crate) fn retire(&mut self) {
        self.retired = true;
    }
}
