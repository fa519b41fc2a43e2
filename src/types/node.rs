//! Tagged union over the three ledger node kinds.

use serde::{Deserialize, Serialize};

use super::ids::{NodeKind, NodeRef};
use super::lot::Lot;
use super::stock::Stock;
use super::transformation::Transformation;

/// A node of the traceability graph.
///
/// Edges point from parent to child:
///
/// ```text
/// Lot --parent_lot--> Lot
/// Lot --parent_lot--> Stock
/// Stock --parent_stock--> Lot
/// Stock --source_stock--> Transformation --parent_transformation--> Stock
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerNode {
    /// A lot.
    Lot(Lot),
    /// A stock.
    Stock(Stock),
    /// A transformation.
    Transformation(Transformation),
}

impl LedgerNode {
    /// Typed id.
    pub fn id(&self) -> NodeRef {
        match self {
            Self::Lot(lot) => NodeRef::Lot(lot.id()),
            Self::Stock(stock) => NodeRef::Stock(stock.id()),
            Self::Transformation(t) => NodeRef::Transformation(t.id()),
        }
    }

    /// Kind discriminant.
    pub fn kind(&self) -> NodeKind {
        self.id().kind()
    }

    /// The volume this node accounts for: a lot's volume, a stock's remaining
    /// volume, or a transformation's deduction from its source.
    pub fn volume(&self) -> f64 {
        match self {
            Self::Lot(lot) => lot.volume(),
            Self::Stock(stock) => stock.remaining_volume(),
            Self::Transformation(t) => t.volume_deducted_from_source(),
        }
    }

    /// Upstream references. Well-formed nodes have at most one.
    pub fn parent_refs(&self) -> Vec<NodeRef> {
        match self {
            Self::Lot(lot) => {
                let mut refs = Vec::new();
                if let Some(parent) = lot.parent_lot() {
                    refs.push(NodeRef::Lot(parent));
                }
                if let Some(parent) = lot.parent_stock() {
                    refs.push(NodeRef::Stock(parent));
                }
                refs
            }
            Self::Stock(stock) => {
                let mut refs = Vec::new();
                if let Some(parent) = stock.parent_lot() {
                    refs.push(NodeRef::Lot(parent));
                }
                if let Some(parent) = stock.parent_transformation() {
                    refs.push(NodeRef::Transformation(parent));
                }
                refs
            }
            Self::Transformation(t) => vec![NodeRef::Stock(t.source_stock())],
        }
    }

    /// Whether the node is frozen or deleted.
    pub fn is_immutable(&self) -> bool {
        match self {
            Self::Lot(lot) => lot.status().is_terminal(),
            Self::Stock(_) => false,
            Self::Transformation(_) => true,
        }
    }

    /// Borrow as a lot.
    pub fn as_lot(&self) -> Option<&Lot> {
        match self {
            Self::Lot(lot) => Some(lot),
            _ => None,
        }
    }

    /// Borrow as a stock.
    pub fn as_stock(&self) -> Option<&Stock> {
        match self {
            Self::Stock(stock) => Some(stock),
            _ => None,
        }
    }

    /// Borrow as a transformation.
    pub fn as_transformation(&self) -> Option<&Transformation> {
        match self {
            Self::Transformation(t) => Some(t),
            _ => None,
        }
    }
}

impl From<Lot> for LedgerNode {
    fn from(lot: Lot) -> Self {
        Self::Lot(lot)
    }
}

impl From<Stock> for LedgerNode {
    fn from(stock: Stock) -> Self {
        Self::Stock(stock)
    }
}

impl From<Transformation> for LedgerNode {
    fn from(t: Transformation) -> Self {
        Self::Transformation(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Biofuel, Characteristics, EntityId, StockId, TransformationId};

    #[test]
    fn test_parent_refs_by_kind() {
        let lot = Lot::draft(EntityId::generate(), Characteristics::new("COLZA", Biofuel::emhv()), 10.0);
        let root = LedgerNode::from(lot.clone());
        assert!(root.parent_refs().is_empty());

        let stock = Stock::from_lot(&lot, EntityId::generate());
        let node = LedgerNode::from(stock.clone());
        assert_eq!(node.parent_refs(), vec![NodeRef::Lot(lot.id())]);

        let t = Transformation::new(
            TransformationId::generate(),
            EntityId::generate(),
            "ETH_ETBE",
            stock.id(),
            StockId::generate(),
            5.0,
            4.0,
        );
        let node = LedgerNode::from(t);
        assert_eq!(node.parent_refs(), vec![NodeRef::Stock(stock.id())]);
        assert_eq!(node.volume(), 5.0);
        assert!(node.is_immutable());
    }
}
