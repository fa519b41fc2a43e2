//! Transactional façade over the engines.
//!
//! Every call follows the same shape:
//!
//! 1. Load the full component around the seed (fresh state, so headroom
//!    checks see the current stock)
//! 2. Apply the operation to the in-memory [`NodeSet`]
//! 3. Propagate inheritable changes
//! 4. Persist every touched node and the audit events in one `commit`
//!
//! An error at any step returns before the commit, so nothing is written.

use std::sync::Arc;

use crate::cascade::{self, CascadeOutcome};
use crate::config::EngineConfig;
use crate::diff::{self, Diff};
use crate::error::LedgerError;
use crate::lifecycle::{self, Acceptance, Transition};
use crate::loader::GraphLoader;
use crate::node_set::NodeSet;
use crate::operations::{self, TransformationSpec, Transformed};
use crate::propagation;
use crate::store::{LedgerStore, WriteBatch};
use crate::types::{
    AuditEvent, AuditEventKind, EntityId, FieldValue, LedgerMetrics, LedgerNode, LotId, LotStatus,
    NodeRef, NoOpMetrics, StockId,
};

/// Result of an update call.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    /// Diff of the updated node.
    pub diff: Diff,
    /// Descendants modified by propagation.
    pub propagated: Vec<LedgerNode>,
    /// Every node written by the commit.
    pub committed: Vec<NodeRef>,
}

/// Ledger engine bound to a store.
pub struct LedgerEngine<S: LedgerStore> {
    loader: GraphLoader<S>,
    metrics: Arc<dyn LedgerMetrics>,
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// Create an engine.
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            loader: GraphLoader::new(store, config),
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Count audit events with `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn LedgerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        self.loader.store()
    }

    /// Configuration.
    pub fn config(&self) -> &EngineConfig {
        self.loader.config()
    }

    /// Load the connected component around `seeds`. Read-only.
    pub async fn load_subgraph(&self, seeds: &[NodeRef]) -> Result<NodeSet, LedgerError> {
        self.loader.load_subgraph(seeds).await
    }

    /// Apply field changes to a node and propagate inheritable ones downstream.
    ///
    /// A refused volume increase is reported in `diff.warnings`, not as an error.
    pub async fn update(
        &self,
        node: NodeRef,
        changes: Vec<FieldValue>,
        actor: EntityId,
    ) -> Result<UpdateOutcome, LedgerError> {
        let ((diff, propagated), committed) = self
            .transact(node, "update", |set, _| {
                let diff = diff::update(set, node, &changes, actor)?;
                let propagated = propagation::propagate(set, &diff, true)?;
                Ok((diff, propagated))
            })
            .await?;
        Ok(UpdateOutcome { diff, propagated, committed })
    }

    /// Delete a lot and everything that depended exclusively on it.
    pub async fn delete(&self, lot: LotId, actor: EntityId) -> Result<CascadeOutcome, LedgerError> {
        let (outcome, _) = self
            .transact(NodeRef::Lot(lot), "delete", |set, events| {
                lifecycle::authorize_delete(set, lot, actor)?;
                let outcome = cascade::delete(set, lot)?;
                events.push(
                    AuditEvent::new(
                        AuditEventKind::CascadeDeleted {
                            root: lot,
                            deleted: outcome.deleted.len(),
                            updated: outcome.updated.len(),
                        },
                        "cascade",
                    )
                    .with_context("actor", actor.to_string()),
                );
                Ok(outcome)
            })
            .await?;
        Ok(outcome)
    }

    /// DRAFT → PENDING.
    pub async fn send(&self, lot: LotId, actor: EntityId) -> Result<Transition, LedgerError> {
        self.transition(lot, "send", |set| lifecycle::send(set, lot, actor)).await
    }

    /// PENDING → ACCEPTED.
    pub async fn accept(
        &self,
        lot: LotId,
        actor: EntityId,
        acceptance: Acceptance,
    ) -> Result<Transition, LedgerError> {
        self.transition(lot, "accept", |set| lifecycle::accept(set, lot, actor, acceptance))
            .await
    }

    /// PENDING/ACCEPTED → REJECTED.
    pub async fn reject(&self, lot: LotId, actor: EntityId) -> Result<Transition, LedgerError> {
        self.transition(lot, "reject", |set| lifecycle::reject(set, lot, actor)).await
    }

    /// REJECTED → PENDING.
    pub async fn resubmit(
        &self,
        lot: LotId,
        actor: EntityId,
        client: EntityId,
    ) -> Result<Transition, LedgerError> {
        self.transition(lot, "resubmit", |set| lifecycle::resubmit(set, lot, actor, client))
            .await
    }

    /// Declare for the actor's side; freezes once both sides declared.
    pub async fn declare(&self, lot: LotId, actor: EntityId) -> Result<Transition, LedgerError> {
        self.transition(lot, "declare", |set| lifecycle::declare(set, lot, actor)).await
    }

    /// Open a correction.
    pub async fn request_correction(
        &self,
        lot: LotId,
        actor: EntityId,
    ) -> Result<Transition, LedgerError> {
        self.transition(lot, "request_correction", |set| {
            lifecycle::request_correction(set, lot, actor)
        })
        .await
    }

    /// Mark a correction as done.
    pub async fn mark_fixed(&self, lot: LotId, actor: EntityId) -> Result<Transition, LedgerError> {
        self.transition(lot, "mark_fixed", |set| lifecycle::mark_fixed(set, lot, actor)).await
    }

    /// Approve a fixed correction.
    pub async fn approve_fix(&self, lot: LotId, actor: EntityId) -> Result<Transition, LedgerError> {
        self.transition(lot, "approve_fix", |set| lifecycle::approve_fix(set, lot, actor)).await
    }

    /// Draw `volume` from a stock into a new draft lot.
    pub async fn split(
        &self,
        stock: StockId,
        actor: EntityId,
        volume: f64,
        client: Option<EntityId>,
    ) -> Result<LotId, LedgerError> {
        let (lot, _) = self
            .transact(NodeRef::Stock(stock), "split", |set, _| {
                operations::split(set, stock, actor, volume, client)
            })
            .await?;
        Ok(lot)
    }

    /// Convert part of a stock into a new stock.
    pub async fn transform(
        &self,
        stock: StockId,
        actor: EntityId,
        spec: TransformationSpec,
    ) -> Result<Transformed, LedgerError> {
        let (created, _) = self
            .transact(NodeRef::Stock(stock), "transform", |set, _| {
                operations::transform(set, stock, actor, spec)
            })
            .await?;
        Ok(created)
    }

    async fn transition<F>(&self, lot: LotId, op: &'static str, f: F) -> Result<Transition, LedgerError>
    where
        F: FnOnce(&mut NodeSet) -> Result<Transition, LedgerError>,
    {
        let (transition, _) = self.transact(NodeRef::Lot(lot), op, |set, _| f(set)).await?;
        Ok(transition)
    }

    /// Load, apply `f`, and persist everything it touched in one commit.
    async fn transact<T, F>(
        &self,
        seed: NodeRef,
        op: &'static str,
        f: F,
    ) -> Result<(T, Vec<NodeRef>), LedgerError>
    where
        F: FnOnce(&mut NodeSet, &mut Vec<AuditEvent>) -> Result<T, LedgerError>,
    {
        let mut set = self.loader.load_subgraph(&[seed]).await?;
        let mut events = Vec::new();
        let value = f(&mut set, &mut events)?;

        let mut batch = WriteBatch::new();
        for node in set.dirty_nodes() {
            match node {
                LedgerNode::Lot(lot) if lot.status() == LotStatus::Deleted => {
                    batch.deleted_lots.push(lot)
                }
                other => batch.upserts.push(other),
            }
        }
        let written = set.dirty_refs();
        if batch.is_empty() && events.is_empty() {
            tracing::debug!(op, seed = %seed, "Nothing to commit");
            return Ok((value, written));
        }

        batch.audit_events = events.clone();
        self.store()
            .commit(batch)
            .await
            .map_err(LedgerError::from_store)?;
        set.clear_dirty();

        for event in &events {
            event.log();
            self.metrics.record_event(event);
        }
        tracing::info!(
            op,
            seed = %seed,
            nodes = written.len(),
            events = events.len(),
            "Committed ledger transaction"
        );
        Ok((value, written))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryLedgerStore;
    use crate::types::{Biofuel, Characteristics, Lot, TestMetrics};

    struct Fixture {
        engine: LedgerEngine<InMemoryLedgerStore>,
        store: Arc<InMemoryLedgerStore>,
        author: EntityId,
        client: EntityId,
        lot: LotId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryLedgerStore::new());
        let author = EntityId::generate();
        let client = EntityId::generate();
        let lot = Lot::draft(author, Characteristics::new("COLZA", Biofuel::emhv()), 500.0)
            .with_client(client);
        let id = lot.id();
        store.insert_lot(lot);
        Fixture {
            engine: LedgerEngine::new(store.clone(), EngineConfig::default()),
            store,
            author,
            client,
            lot: id,
        }
    }

    #[tokio::test]
    async fn test_accept_into_stock_persists_both_nodes() {
        let f = fixture();
        f.engine.send(f.lot, f.author).await.unwrap();
        let t = f.engine.accept(f.lot, f.client, Acceptance::IntoStock).await.unwrap();

        let Some(NodeRef::Stock(stock)) = t.created else {
            panic!("expected a stock, got {:?}", t.created);
        };
        assert_eq!(f.store.lot(f.lot).unwrap().status(), LotStatus::Accepted);
        assert_eq!(f.store.stock(stock).unwrap().remaining_volume(), 500.0);
        assert_eq!(f.store.commit_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_operation_commits_nothing() {
        let f = fixture();
        let err = f.engine.accept(f.lot, f.client, Acceptance::IntoStock).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
        assert_eq!(f.store.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_refused_commit_surfaces_store_error() {
        let f = fixture();
        f.store.refuse_next_commits(1);
        let err = f.engine.send(f.lot, f.author).await.unwrap_err();
        assert!(matches!(err, LedgerError::Store(_)));
        assert_eq!(f.store.lot(f.lot).unwrap().status(), LotStatus::Draft);
    }

    #[tokio::test]
    async fn test_update_propagates_and_commits_once() {
        let f = fixture();
        f.engine.send(f.lot, f.author).await.unwrap();
        let t = f.engine.accept(f.lot, f.client, Acceptance::IntoStock).await.unwrap();
        let Some(NodeRef::Stock(stock)) = t.created else {
            panic!("expected a stock");
        };
        let drawn = f.engine.split(stock, f.client, 200.0, None).await.unwrap();
        f.engine.request_correction(f.lot, f.client).await.unwrap();
        let commits = f.store.commit_count();

        let outcome = f
            .engine
            .update(
                NodeRef::Lot(f.lot),
                vec![FieldValue::ProductionSiteCertificate(Some("2BS-77".to_string()))],
                f.author,
            )
            .await
            .unwrap();

        assert_eq!(outcome.propagated.len(), 2);
        assert_eq!(outcome.committed.len(), 3);
        assert_eq!(f.store.commit_count(), commits + 1);
        let drawn = f.store.lot(drawn).unwrap();
        assert_eq!(
            drawn.characteristics().production_site_certificate.as_deref(),
            Some("2BS-77")
        );
    }

    #[tokio::test]
    async fn test_delete_records_audit_event_and_metric() {
        let f = fixture();
        let metrics = Arc::new(TestMetrics::default());
        let engine = LedgerEngine::new(f.store.clone(), EngineConfig::default())
            .with_metrics(metrics.clone());

        let outcome = engine.delete(f.lot, f.author).await.unwrap();

        assert_eq!(outcome.deleted.len(), 1);
        assert_eq!(f.store.lot(f.lot).unwrap().status(), LotStatus::Deleted);
        assert_eq!(f.store.audit_events().len(), 1);
        assert_eq!(metrics.get_count("ledger_cascade_deletes_total"), 1);
    }

    #[tokio::test]
    async fn test_noop_update_does_not_commit() {
        let f = fixture();
        f.engine
            .update(NodeRef::Lot(f.lot), vec![FieldValue::Volume(500.0)], f.author)
            .await
            .unwrap();
        assert_eq!(f.store.commit_count(), 0);
    }
}
