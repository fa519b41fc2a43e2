//! Arena of ledger nodes keyed by [`NodeRef`], with explicit edges.
//!
//! A `NodeSet` is what the graph loader returns and what every mutating
//! engine operates on. It tracks which nodes were modified or created so
//! the caller can persist them in one batch.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::canonical::canonical_hash_hex;
use crate::error::LedgerError;
use crate::types::{LedgerNode, Lot, LotId, NodeRef, Stock, StockId, Transformation, TransformationId};

/// Loaded component of the traceability graph.
#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    nodes: BTreeMap<NodeRef, LedgerNode>,
    children: BTreeMap<NodeRef, BTreeSet<NodeRef>>,
    seeds: Vec<NodeRef>,
    dirty: BTreeSet<NodeRef>,
    created: BTreeSet<NodeRef>,
}

impl NodeSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from already loaded nodes.
    pub fn from_nodes(nodes: impl IntoIterator<Item = LedgerNode>) -> Self {
        let mut set = Self::new();
        for node in nodes {
            set.insert(node);
        }
        set
    }

    pub(crate) fn insert(&mut self, node: LedgerNode) {
        let id = node.id();
        for parent in node.parent_refs() {
            self.children.entry(parent).or_default().insert(id);
        }
        if let LedgerNode::Transformation(t) = &node {
            // the destination stock also names the transformation as parent;
            // indexing it here keeps the edge when only one side is loaded
            self.children
                .entry(id)
                .or_default()
                .insert(NodeRef::Stock(t.destination_stock()));
        }
        self.nodes.insert(id, node);
    }

    pub(crate) fn insert_new(&mut self, node: LedgerNode) {
        let id = node.id();
        self.insert(node);
        self.created.insert(id);
        self.dirty.insert(id);
    }

    pub(crate) fn set_seeds(&mut self, seeds: Vec<NodeRef>) {
        self.seeds = seeds;
    }

    /// Seeds the set was loaded from.
    pub fn seeds(&self) -> &[NodeRef] {
        &self.seeds
    }

    /// Whether the node is loaded.
    pub fn contains(&self, id: &NodeRef) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of loaded nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node is loaded.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate nodes in `NodeRef` order.
    pub fn iter(&self) -> impl Iterator<Item = &LedgerNode> {
        self.nodes.values()
    }

    /// Get a node.
    pub fn get(&self, id: &NodeRef) -> Option<&LedgerNode> {
        self.nodes.get(id)
    }

    /// Get a lot.
    pub fn lot(&self, id: LotId) -> Option<&Lot> {
        self.nodes.get(&NodeRef::Lot(id)).and_then(LedgerNode::as_lot)
    }

    /// Get a stock.
    pub fn stock(&self, id: StockId) -> Option<&Stock> {
        self.nodes.get(&NodeRef::Stock(id)).and_then(LedgerNode::as_stock)
    }

    /// Get a transformation.
    pub fn transformation(&self, id: TransformationId) -> Option<&Transformation> {
        self.nodes
            .get(&NodeRef::Transformation(id))
            .and_then(LedgerNode::as_transformation)
    }

    /// Get a lot or fail with `NodeNotFound`.
    pub fn require_lot(&self, id: LotId) -> Result<&Lot, LedgerError> {
        self.lot(id).ok_or(LedgerError::NodeNotFound(NodeRef::Lot(id)))
    }

    /// Get a stock or fail with `NodeNotFound`.
    pub fn require_stock(&self, id: StockId) -> Result<&Stock, LedgerError> {
        self.stock(id).ok_or(LedgerError::NodeNotFound(NodeRef::Stock(id)))
    }

    pub(crate) fn lot_mut(&mut self, id: LotId) -> Result<&mut Lot, LedgerError> {
        let key = NodeRef::Lot(id);
        match self.nodes.get_mut(&key) {
            Some(LedgerNode::Lot(lot)) => {
                self.dirty.insert(key);
                Ok(lot)
            }
            _ => Err(LedgerError::NodeNotFound(key)),
        }
    }

    pub(crate) fn stock_mut(&mut self, id: StockId) -> Result<&mut Stock, LedgerError> {
        let key = NodeRef::Stock(id);
        match self.nodes.get_mut(&key) {
            Some(LedgerNode::Stock(stock)) => {
                self.dirty.insert(key);
                Ok(stock)
            }
            _ => Err(LedgerError::NodeNotFound(key)),
        }
    }

    /// Direct children of a node, in `NodeRef` order.
    pub fn children_refs(&self, id: &NodeRef) -> Vec<NodeRef> {
        self.children
            .get(id)
            .map(|set| set.iter().filter(|c| self.nodes.contains_key(c)).copied().collect())
            .unwrap_or_default()
    }

    /// Direct children that are not deleted lots.
    pub fn live_children_refs(&self, id: &NodeRef) -> Vec<NodeRef> {
        self.children_refs(id)
            .into_iter()
            .filter(|c| !matches!(self.get(c), Some(LedgerNode::Lot(lot)) if !lot.is_live()))
            .collect()
    }

    /// Upstream references of a node.
    pub fn parent_refs(&self, id: &NodeRef) -> Vec<NodeRef> {
        self.nodes.get(id).map(LedgerNode::parent_refs).unwrap_or_default()
    }

    /// Nodes without a parent.
    pub fn roots(&self) -> Vec<NodeRef> {
        self.nodes
            .values()
            .filter(|n| n.parent_refs().is_empty())
            .map(LedgerNode::id)
            .collect()
    }

    /// Whether a node was created during this transaction.
    pub fn is_created(&self, id: &NodeRef) -> bool {
        self.created.contains(id)
    }

    /// References of modified or created nodes.
    pub fn dirty_refs(&self) -> Vec<NodeRef> {
        self.dirty.iter().copied().collect()
    }

    /// Modified or created nodes, in `NodeRef` order.
    pub fn dirty_nodes(&self) -> Vec<LedgerNode> {
        self.dirty
            .iter()
            .filter_map(|id| self.nodes.get(id).cloned())
            .collect()
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty.clear();
        self.created.clear();
    }

    /// Deterministic hash of every node's full content.
    ///
    /// Two sets with the same fingerprint are field-for-field identical.
    pub fn fingerprint(&self) -> String {
        #[derive(Serialize)]
        struct Entry<'a> {
            id: &'a NodeRef,
            node: &'a LedgerNode,
        }
        let entries: Vec<Entry<'_>> = self
            .nodes
            .iter()
            .map(|(id, node)| Entry { id, node })
            .collect();
        canonical_hash_hex(&entries)
    }
}
