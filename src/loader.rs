//! Graph loader: resolves the connected component around a set of seeds.
//!
//! Every node has at most one parent, so the traceability graph is a
//! forest. Walking up from each seed to its root and then down from every
//! root visits the full weakly-connected component.
//!
//! ## Algorithm
//!
//! 1. Fetch the seeds
//! 2. For each seed, follow its single parent reference until a root,
//!    failing on a repeated node (cycle), a dangling reference or a node
//!    with two parents
//! 3. Breadth-first from all roots, one bulk "fetch by parent" query per
//!    node kind and level; a node reached twice is a cycle
//! 4. Fail closed with `TraversalLimit` beyond `max_depth` hops or
//!    `max_nodes` nodes

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::LedgerError;
use crate::node_set::NodeSet;
use crate::store::LedgerStore;
use crate::types::{AuditEvent, AuditEventKind, LedgerNode, LotId, NodeRef, StockId, TransformationId};

/// Loads the subgraph every mutating engine operates on.
pub struct GraphLoader<S: LedgerStore> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: LedgerStore> GraphLoader<S> {
    /// Create a loader.
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Load the full connected component containing `seeds`. Read-only.
    pub async fn load_subgraph(&self, seeds: &[NodeRef]) -> Result<NodeSet, LedgerError> {
        let seed_nodes = self
            .store
            .get_nodes(seeds)
            .await
            .map_err(LedgerError::from_store)?;
        let found: BTreeSet<NodeRef> = seed_nodes.iter().map(LedgerNode::id).collect();
        if let Some(missing) = seeds.iter().find(|s| !found.contains(s)) {
            return Err(LedgerError::NodeNotFound(*missing));
        }

        let mut roots: BTreeMap<NodeRef, LedgerNode> = BTreeMap::new();
        for node in seed_nodes {
            let root = self.find_root(node).await?;
            roots.entry(root.id()).or_insert(root);
        }

        let mut set = self.expand_down(roots.into_values().collect()).await?;

        if let Some(missing) = seeds.iter().find(|s| !set.contains(s)) {
            return Err(integrity_violation(
                *missing,
                "seed not reachable from its own root".to_string(),
            ));
        }

        set.set_seeds(seeds.to_vec());
        tracing::debug!(
            seeds = seeds.len(),
            nodes = set.len(),
            "Loaded ledger subgraph"
        );
        Ok(set)
    }

    async fn find_root(&self, seed: LedgerNode) -> Result<LedgerNode, LedgerError> {
        let seed_id = seed.id();
        let mut chain: BTreeSet<NodeRef> = BTreeSet::new();
        chain.insert(seed_id);
        let mut current = seed;
        let mut hops: u32 = 0;

        loop {
            let parents = current.parent_refs();
            let parent = match parents.as_slice() {
                [] => return Ok(current),
                [parent] => *parent,
                _ => {
                    return Err(integrity_violation(
                        current.id(),
                        format!("node has {} parents", parents.len()),
                    ))
                }
            };

            if !chain.insert(parent) {
                return Err(integrity_violation(
                    parent,
                    format!("cycle detected walking up from {}", seed_id),
                ));
            }

            hops += 1;
            if hops > self.config.max_depth {
                return Err(LedgerError::TraversalLimit {
                    seed: seed_id,
                    limit: format!("more than {} parent hops", self.config.max_depth),
                });
            }

            let child_id = current.id();
            current = self
                .store
                .get_nodes(&[parent])
                .await
                .map_err(LedgerError::from_store)?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    integrity_violation(child_id, format!("dangling parent reference {}", parent))
                })?;
        }
    }

    async fn expand_down(&self, roots: Vec<LedgerNode>) -> Result<NodeSet, LedgerError> {
        let first_seed = roots.first().map(LedgerNode::id);
        let mut set = NodeSet::new();
        let mut frontier: Vec<NodeRef> = Vec::with_capacity(roots.len());
        for root in roots {
            frontier.push(root.id());
            set.insert(root);
        }

        let mut depth: u32 = 0;
        while !frontier.is_empty() {
            let children = self.fetch_children(&frontier).await?;
            if children.is_empty() {
                break;
            }

            depth += 1;
            if depth > self.config.max_depth {
                return Err(LedgerError::TraversalLimit {
                    seed: first_seed.unwrap_or(frontier[0]),
                    limit: format!("more than {} levels below the root", self.config.max_depth),
                });
            }

            let mut next = Vec::with_capacity(children.len());
            for child in children {
                let id = child.id();
                if set.contains(&id) {
                    return Err(integrity_violation(id, "node reached twice".to_string()));
                }
                if child.parent_refs().len() > 1 {
                    return Err(integrity_violation(
                        id,
                        format!("node has {} parents", child.parent_refs().len()),
                    ));
                }
                set.insert(child);
                next.push(id);
            }

            if set.len() > self.config.max_nodes {
                return Err(LedgerError::TraversalLimit {
                    seed: first_seed.unwrap_or(next[0]),
                    limit: format!("more than {} nodes", self.config.max_nodes),
                });
            }
            frontier = next;
        }

        Ok(set)
    }

    async fn fetch_children(&self, frontier: &[NodeRef]) -> Result<Vec<LedgerNode>, LedgerError> {
        let mut lots: Vec<LotId> = Vec::new();
        let mut stocks: Vec<StockId> = Vec::new();
        let mut transformations: Vec<TransformationId> = Vec::new();
        for r in frontier {
            match r {
                NodeRef::Lot(id) => lots.push(*id),
                NodeRef::Stock(id) => stocks.push(*id),
                NodeRef::Transformation(id) => transformations.push(*id),
            }
        }

        let mut children = Vec::new();
        if !lots.is_empty() {
            let forwarded = self.store.lots_by_parent_lot(&lots).await.map_err(LedgerError::from_store)?;
            children.extend(forwarded.into_iter().map(LedgerNode::Lot));
            let stocked = self.store.stocks_by_parent_lot(&lots).await.map_err(LedgerError::from_store)?;
            children.extend(stocked.into_iter().map(LedgerNode::Stock));
        }
        if !stocks.is_empty() {
            let drawn = self.store.lots_by_parent_stock(&stocks).await.map_err(LedgerError::from_store)?;
            children.extend(drawn.into_iter().map(LedgerNode::Lot));
            let transformed = self
                .store
                .transformations_by_source_stock(&stocks)
                .await
                .map_err(LedgerError::from_store)?;
            children.extend(transformed.into_iter().map(LedgerNode::Transformation));
        }
        if !transformations.is_empty() {
            let produced = self
                .store
                .stocks_by_parent_transformation(&transformations)
                .await
                .map_err(LedgerError::from_store)?;
            children.extend(produced.into_iter().map(LedgerNode::Stock));
        }
        Ok(children)
    }

    /// The store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Build a `GraphIntegrity` error and raise the corresponding alert.
pub(crate) fn integrity_violation(node: NodeRef, reason: String) -> LedgerError {
    AuditEvent::new(
        AuditEventKind::GraphIntegrityViolation { node, reason: reason.clone() },
        "graph_loader",
    )
    .log();
    LedgerError::GraphIntegrity { node, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryLedgerStore;
    use crate::types::{Biofuel, Characteristics, EntityId, Lot, LotStatus, Stock, Transformation};
    use uuid::Uuid;

    fn lot(id: u128, volume: f64) -> Lot {
        Lot::draft(
            EntityId::new(Uuid::from_u128(1_000)),
            Characteristics::new("BETTERAVE", Biofuel::ethanol()),
            volume,
        )
        .with_id(LotId::new(Uuid::from_u128(id)))
    }

    /// root lot -> stock -> {drawn lot, transformation -> stock2 -> lot}; plus an unrelated lot.
    fn build_store() -> (Arc<InMemoryLedgerStore>, Vec<NodeRef>) {
        let store = InMemoryLedgerStore::new();
        let root = lot(1, 1000.0).with_status(LotStatus::Accepted);
        let stock = Stock::from_lot(&root, EntityId::generate());
        let drawn = lot(2, 300.0).with_parent_stock(stock.id());
        let t_id = TransformationId::generate();
        let stock2 = Stock::from_transformation(
            t_id,
            stock.owner(),
            Characteristics::new("BETTERAVE", Biofuel::etbe()),
            200.0,
        );
        let t = Transformation::new(t_id, stock.owner(), "ETH_ETBE", stock.id(), stock2.id(), 100.0, 200.0);
        let downstream = lot(3, 50.0).with_parent_stock(stock2.id());
        let unrelated = lot(4, 10.0);

        let refs = vec![
            NodeRef::Lot(root.id()),
            NodeRef::Stock(stock.id()),
            NodeRef::Lot(drawn.id()),
            NodeRef::Transformation(t.id()),
            NodeRef::Stock(stock2.id()),
            NodeRef::Lot(downstream.id()),
        ];

        store.insert_lot(root);
        store.insert_stock(stock);
        store.insert_lot(drawn);
        store.insert_transformation(t);
        store.insert_stock(stock2);
        store.insert_lot(downstream);
        store.insert_lot(unrelated);
        (Arc::new(store), refs)
    }

    #[tokio::test]
    async fn test_loads_full_component_from_leaf() {
        let (store, refs) = build_store();
        let loader = GraphLoader::new(store, EngineConfig::default());

        let leaf = refs[5];
        let set = loader.load_subgraph(&[leaf]).await.unwrap();
        assert_eq!(set.len(), refs.len());
        for r in &refs {
            assert!(set.contains(r), "missing {}", r);
        }
        assert_eq!(set.seeds(), &[leaf]);
    }

    #[tokio::test]
    async fn test_same_component_from_any_seed() {
        let (store, refs) = build_store();
        let loader = GraphLoader::new(store, EngineConfig::default());

        let a = loader.load_subgraph(&[refs[0]]).await.unwrap();
        let b = loader.load_subgraph(&[refs[2]]).await.unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[tokio::test]
    async fn test_missing_seed() {
        let (store, _) = build_store();
        let loader = GraphLoader::new(store, EngineConfig::default());
        let missing = NodeRef::Lot(LotId::generate());
        let err = loader.load_subgraph(&[missing]).await.unwrap_err();
        assert_eq!(err, LedgerError::NodeNotFound(missing));
    }

    #[tokio::test]
    async fn test_cycle_is_integrity_error() {
        let store = InMemoryLedgerStore::new();
        let a_id = LotId::new(Uuid::from_u128(1));
        let b_id = LotId::new(Uuid::from_u128(2));
        store.insert_lot(lot(1, 10.0).with_parent_lot(b_id));
        store.insert_lot(lot(2, 10.0).with_parent_lot(a_id));

        let loader = GraphLoader::new(Arc::new(store), EngineConfig::default());
        let err = loader.load_subgraph(&[NodeRef::Lot(a_id)]).await.unwrap_err();
        assert!(matches!(err, LedgerError::GraphIntegrity { .. }));
    }

    #[tokio::test]
    async fn test_double_parent_is_integrity_error() {
        let (store, refs) = build_store();
        let NodeRef::Stock(stock_id) = refs[1] else { panic!("expected stock") };
        let bad = lot(9, 5.0)
            .with_parent_lot(LotId::new(Uuid::from_u128(1)))
            .with_parent_stock(stock_id);
        let bad_id = bad.id();
        store.insert_lot(bad);

        let loader = GraphLoader::new(store, EngineConfig::default());
        let err = loader.load_subgraph(&[NodeRef::Lot(bad_id)]).await.unwrap_err();
        assert!(matches!(err, LedgerError::GraphIntegrity { .. }));
    }

    #[tokio::test]
    async fn test_dangling_parent_is_integrity_error() {
        let store = InMemoryLedgerStore::new();
        let orphan = lot(1, 10.0).with_parent_lot(LotId::generate());
        let id = orphan.id();
        store.insert_lot(orphan);

        let loader = GraphLoader::new(Arc::new(store), EngineConfig::default());
        let err = loader.load_subgraph(&[NodeRef::Lot(id)]).await.unwrap_err();
        assert!(matches!(err, LedgerError::GraphIntegrity { .. }));
    }

    #[tokio::test]
    async fn test_deep_chain_fails_closed() {
        let store = InMemoryLedgerStore::new();
        for i in 1..=10u128 {
            let mut l = lot(i, 10.0);
            if i > 1 {
                l = l.with_parent_lot(LotId::new(Uuid::from_u128(i - 1)));
            }
            store.insert_lot(l);
        }
        let loader = GraphLoader::new(Arc::new(store), EngineConfig::minimal());

        let leaf = NodeRef::Lot(LotId::new(Uuid::from_u128(10)));
        let err = loader.load_subgraph(&[leaf]).await.unwrap_err();
        assert!(matches!(err, LedgerError::TraversalLimit { .. }));

        let root = NodeRef::Lot(LotId::new(Uuid::from_u128(1)));
        let err = loader.load_subgraph(&[root]).await.unwrap_err();
        assert!(matches!(err, LedgerError::TraversalLimit { .. }));
    }
}
