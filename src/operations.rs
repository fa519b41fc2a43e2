//! Operations that grow the graph: receiving a lot into a stock, forwarding
//! it, splitting a stock into new lots and transforming part of a stock.
//!
//! Each operation creates its nodes in the [`NodeSet`] (marked created and
//! dirty) and keeps the conservation formula of every touched stock.

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::node_set::NodeSet;
use crate::types::{
    round2, Biofuel, EntityId, LedgerNode, Lot, LotId, NodeRef, Stock, StockId, Transformation,
    TransformationId,
};

/// Parameters of a transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationSpec {
    /// Kind code (e.g. `ETH_ETBE`).
    pub kind: String,
    /// Volume taken from the source stock.
    pub volume_deducted: f64,
    /// Volume put into the destination stock.
    pub volume_destination: f64,
    /// Commodity of the destination stock.
    pub destination_biofuel: Biofuel,
}

/// Nodes created by a transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transformed {
    /// New transformation.
    pub transformation: TransformationId,
    /// New destination stock.
    pub destination: StockId,
}

fn positive(volume: f64) -> Result<f64, LedgerError> {
    if !volume.is_finite() || volume <= 0.0 {
        return Err(LedgerError::InvalidVolume(volume));
    }
    Ok(round2(volume))
}

/// Check that `stock` can give `volume` and return it.
fn drawable<'a>(set: &'a NodeSet, stock_id: StockId, volume: f64) -> Result<&'a Stock, LedgerError> {
    let stock = set.require_stock(stock_id)?;
    if stock.is_retired() {
        return Err(LedgerError::StockRetired(stock_id));
    }
    if stock.remaining_volume() < volume {
        return Err(LedgerError::InsufficientVolume {
            stock: stock_id,
            requested: volume,
            available: stock.remaining_volume(),
        });
    }
    Ok(stock)
}

/// Create the stock receiving an accepted lot, owned by `owner`.
pub(crate) fn receive_into_stock(
    set: &mut NodeSet,
    lot: LotId,
    owner: EntityId,
) -> Result<StockId, LedgerError> {
    let stock = Stock::from_lot(set.require_lot(lot)?, owner);
    let id = stock.id();
    set.insert_new(LedgerNode::Stock(stock));
    Ok(id)
}

/// Create a draft lot forwarding `lot` from `author` to `recipient`.
pub(crate) fn forward(
    set: &mut NodeSet,
    lot: LotId,
    author: EntityId,
    recipient: EntityId,
) -> Result<LotId, LedgerError> {
    let parent = set.require_lot(lot)?;
    let child = Lot::draft(author, parent.characteristics().clone(), parent.volume())
        .with_parent_lot(lot)
        .with_client(recipient);
    let id = child.id();
    set.insert_new(LedgerNode::Lot(child));
    Ok(id)
}

/// Draw `volume` from a stock into a new draft lot authored by `actor`.
///
/// Overdrawing is an error here, unlike a volume increase on an existing
/// lot which is reverted with a warning.
pub fn split(
    set: &mut NodeSet,
    stock: StockId,
    actor: EntityId,
    volume: f64,
    client: Option<EntityId>,
) -> Result<LotId, LedgerError> {
    let volume = positive(volume)?;
    let source = drawable(set, stock, volume)?;

    let mut lot = Lot::draft(actor, source.characteristics().clone(), volume).with_parent_stock(stock);
    if let Some(client) = client {
        lot = lot.with_client(client);
    }
    let id = lot.id();

    set.stock_mut(stock)?.adjust_remaining(-volume);
    set.insert_new(LedgerNode::Lot(lot));
    tracing::debug!(stock = %stock, lot = %id, volume, "Split stock");
    Ok(id)
}

/// Convert part of a stock into a new stock of another commodity.
pub fn transform(
    set: &mut NodeSet,
    source: StockId,
    actor: EntityId,
    spec: TransformationSpec,
) -> Result<Transformed, LedgerError> {
    let deducted = positive(spec.volume_deducted)?;
    let produced = positive(spec.volume_destination)?;
    let stock = drawable(set, source, deducted)?;

    let mut characteristics = stock.characteristics().clone();
    characteristics.biofuel = spec.destination_biofuel;

    let tid = TransformationId::generate();
    let destination = Stock::from_transformation(tid, actor, characteristics, produced);
    let transformation = Transformation::new(
        tid,
        actor,
        spec.kind,
        source,
        destination.id(),
        deducted,
        produced,
    );
    let result = Transformed { transformation: tid, destination: destination.id() };

    set.stock_mut(source)?.adjust_remaining(-deducted);
    set.insert_new(LedgerNode::Transformation(transformation));
    set.insert_new(LedgerNode::Stock(destination));
    tracing::debug!(
        source = %source,
        transformation = %tid,
        deducted,
        produced,
        "Transformed stock"
    );
    Ok(result)
}

/// Volume a stock should have left according to its loaded children.
///
/// `initial - Σ live drawn lots - Σ transformation deductions`
pub fn theoretical_remaining(set: &NodeSet, stock: StockId) -> Result<f64, LedgerError> {
    let initial = set.require_stock(stock)?.initial_volume();
    let drawn: f64 = set
        .children_refs(&NodeRef::Stock(stock))
        .iter()
        .filter_map(|r| set.get(r))
        .map(|node| match node {
            LedgerNode::Lot(lot) if lot.is_live() => lot.volume(),
            LedgerNode::Transformation(t) => t.volume_deducted_from_source(),
            _ => 0.0,
        })
        .sum();
    Ok(round2(initial - drawn))
}
