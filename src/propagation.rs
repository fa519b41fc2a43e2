//! Propagation of inheritable characteristics to descendants.
//!
//! Starting from the node a [`Diff`] was computed on, every inheritable
//! field value in the diff is re-applied to the children reached through
//! `parent_lot` and `parent_stock`. Transformations are a boundary: they
//! change the commodity, so nothing crosses them. Frozen and deleted lots
//! are skipped together with their subtrees.

use std::collections::BTreeSet;

use crate::diff::Diff;
use crate::error::LedgerError;
use crate::node_set::NodeSet;
use crate::types::{FieldValue, LedgerNode, NodeRef};

/// Re-apply the inheritable fields of `diff` to the descendants of its node.
///
/// With `changed_only`, recursion stops below any descendant that already
/// carried every value. Returns the modified nodes in traversal order.
/// Running it twice on the same diff modifies nothing the second time.
pub fn propagate(
    set: &mut NodeSet,
    diff: &Diff,
    changed_only: bool,
) -> Result<Vec<LedgerNode>, LedgerError> {
    let values: Vec<FieldValue> = diff.inheritable().map(|e| e.new.clone()).collect();
    if values.is_empty() {
        return Ok(Vec::new());
    }

    let mut modified = Vec::new();
    let mut visited: BTreeSet<NodeRef> = BTreeSet::new();
    let mut stack: Vec<NodeRef> = set.children_refs(&diff.node).into_iter().rev().collect();
    visited.insert(diff.node);

    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        let changed = match current {
            NodeRef::Lot(id) => {
                let lot = set.require_lot(id)?;
                if lot.status().is_terminal() {
                    continue;
                }
                let pending: Vec<FieldValue> = values
                    .iter()
                    .filter(|v| lot.field_value(v.field()) != **v)
                    .cloned()
                    .collect();
                if pending.is_empty() {
                    false
                } else {
                    let lot = set.lot_mut(id)?;
                    for value in &pending {
                        lot.apply(value);
                    }
                    true
                }
            }
            NodeRef::Stock(id) => {
                let stock = set.require_stock(id)?;
                let mut next = stock.characteristics().clone();
                let mut any = false;
                for value in &values {
                    if next.get(value.field()).as_ref() != Some(value) {
                        any |= next.set(value);
                    }
                }
                if any {
                    let stock = set.stock_mut(id)?;
                    let remaining = stock.remaining_volume();
                    stock.characteristics = next;
                    stock.set_remaining_volume(remaining);
                }
                any
            }
            NodeRef::Transformation(_) => continue,
        };

        if changed {
            if let Some(node) = set.get(&current) {
                modified.push(node.clone());
            }
        }
        if changed || !changed_only {
            stack.extend(set.children_refs(&current).into_iter().rev());
        }
    }

    tracing::debug!(
        node = %diff.node,
        fields = values.len(),
        modified = modified.len(),
        changed_only,
        "Propagated inheritable fields"
    );
    Ok(modified)
}
