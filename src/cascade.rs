//! Cascade delete.
//!
//! Deleting a lot removes everything whose provenance runs through it:
//! lots forwarded from it, the stock it was accepted into, lots drawn from
//! that stock, and the output stocks of that stock's transformations with
//! their own lots. Stocks are retired rather than removed and
//! transformations are left in place.
//!
//! The cascade is planned on the loaded [`NodeSet`] before anything is
//! written, so a frozen lot anywhere in the plan aborts with no effect.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::LedgerError;
use crate::node_set::NodeSet;
use crate::types::{LedgerNode, LotId, LotStatus, NodeRef, StockId};

/// Result of a cascade delete. `deleted` and `updated` are disjoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CascadeOutcome {
    /// Lots now carrying status `DELETED`.
    pub deleted: Vec<LedgerNode>,
    /// Stocks recredited or retired, and a reopened parent lot.
    pub updated: Vec<LedgerNode>,
}

impl CascadeOutcome {
    /// References of deleted lots.
    pub fn deleted_refs(&self) -> Vec<NodeRef> {
        self.deleted.iter().map(LedgerNode::id).collect()
    }

    /// References of updated nodes.
    pub fn updated_refs(&self) -> Vec<NodeRef> {
        self.updated.iter().map(LedgerNode::id).collect()
    }
}

#[derive(Debug, Default)]
struct Plan {
    lots: Vec<LotId>,
    retired: Vec<StockId>,
}

fn plan(set: &NodeSet, root: LotId) -> Result<Plan, LedgerError> {
    let mut plan = Plan::default();
    let mut seen = BTreeSet::new();
    let mut stack = vec![NodeRef::Lot(root)];

    while let Some(current) = stack.pop() {
        if !seen.insert(current) {
            continue;
        }
        match current {
            NodeRef::Lot(id) => {
                let lot = set.require_lot(id)?;
                match lot.status() {
                    LotStatus::Frozen => {
                        return Err(LedgerError::CascadeBlocked { root, frozen: id });
                    }
                    LotStatus::Deleted => continue,
                    _ => plan.lots.push(id),
                }
            }
            NodeRef::Stock(id) => {
                if !set.require_stock(id)?.is_retired() {
                    plan.retired.push(id);
                }
            }
            NodeRef::Transformation(_) => {}
        }
        stack.extend(set.children_refs(&current).into_iter().rev());
    }

    Ok(plan)
}

/// Delete `root` and everything that depended exclusively on it.
///
/// Every deleted lot drawn from a stock recredits its volume to that stock.
/// If the parent lot of `root` is ACCEPTED and is left with no live child,
/// it is reopened to PENDING.
pub fn delete(set: &mut NodeSet, root: LotId) -> Result<CascadeOutcome, LedgerError> {
    let target = set.require_lot(root)?;
    if target.status().is_terminal() {
        return Err(LedgerError::ImmutableNode(NodeRef::Lot(root)));
    }
    let parent_lot = target.parent_lot();

    let plan = plan(set, root)?;

    let mut updated: BTreeSet<NodeRef> = BTreeSet::new();
    for &id in &plan.lots {
        let lot = set.lot_mut(id)?;
        lot.status = LotStatus::Deleted;
        let credit = lot.parent_stock().map(|stock| (stock, lot.volume()));
        if let Some((stock_id, volume)) = credit {
            set.stock_mut(stock_id)?.adjust_remaining(volume);
            updated.insert(NodeRef::Stock(stock_id));
        }
    }
    for &id in &plan.retired {
        set.stock_mut(id)?.retire();
        updated.insert(NodeRef::Stock(id));
    }

    if let Some(parent_id) = parent_lot {
        let parent = set.require_lot(parent_id)?;
        let orphaned = set.live_children_refs(&NodeRef::Lot(parent_id)).is_empty();
        if parent.status() == LotStatus::Accepted && orphaned {
            set.lot_mut(parent_id)?.status = LotStatus::Pending;
            updated.insert(NodeRef::Lot(parent_id));
        }
    }

    let deleted: Vec<LedgerNode> = plan
        .lots
        .iter()
        .filter_map(|id| set.get(&NodeRef::Lot(*id)).cloned())
        .collect();
    let updated: Vec<LedgerNode> = updated
        .iter()
        .filter_map(|r| set.get(r).cloned())
        .collect();

    tracing::debug!(
        root = %root,
        deleted = deleted.len(),
        updated = updated.len(),
        "Cascade planned and applied"
    );
    Ok(CascadeOutcome { deleted, updated })
}
