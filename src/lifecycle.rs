//! Lot lifecycle and correction workflow.
//!
//! | From | To | Action | Guard |
//! |------|----|--------|-------|
//! | DRAFT | PENDING | send | author, counterpart set |
//! | PENDING | ACCEPTED | accept | counterpart |
//! | PENDING, ACCEPTED | REJECTED | reject | counterpart, no live downstream |
//! | REJECTED | PENDING | resubmit | author |
//! | ACCEPTED | FROZEN | declare | both parties declared |
//! | any non-terminal | DELETED | delete | author |
//!
//! Correction status moves NO_ISSUE/FIXED → IN_CORRECTION → FIXED → NO_ISSUE
//! independently of the lifecycle status.

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::node_set::NodeSet;
use crate::operations;
use crate::types::{CorrectionStatus, EntityId, Lot, LotId, LotStatus, NodeRef};

/// What the counterpart does with an accepted lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Acceptance {
    /// Consumed: no downstream node.
    Consumption,
    /// Received into a new stock owned by the counterpart.
    IntoStock,
    /// Forwarded to a third party as a new draft lot.
    Forward {
        /// Recipient of the forwarded lot.
        recipient: EntityId,
    },
}

/// Record of one applied transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    /// Lot.
    pub lot: LotId,
    /// Action name.
    pub action: &'static str,
    /// Status before.
    pub from: LotStatus,
    /// Status after.
    pub to: LotStatus,
    /// Correction status after.
    pub correction: CorrectionStatus,
    /// Node created by the transition (accept into stock or forward).
    pub created: Option<NodeRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Party {
    Author,
    Counterpart,
}

fn party(lot: &Lot, actor: EntityId) -> Option<Party> {
    if actor == lot.author() {
        Some(Party::Author)
    } else if Some(actor) == lot.client() {
        Some(Party::Counterpart)
    } else {
        None
    }
}

/// Lot in one of `allowed` statuses, else `ImmutableNode` or `InvalidTransition`.
fn guard<'a>(
    set: &'a NodeSet,
    id: LotId,
    action: &'static str,
    allowed: &[LotStatus],
) -> Result<&'a Lot, LedgerError> {
    let lot = set.require_lot(id)?;
    if lot.status().is_terminal() {
        return Err(LedgerError::ImmutableNode(NodeRef::Lot(id)));
    }
    if !allowed.contains(&lot.status()) {
        return Err(LedgerError::InvalidTransition { lot: id, action, from: lot.status() });
    }
    Ok(lot)
}

fn require(lot: &Lot, actor: EntityId, expected: Party, action: &'static str) -> Result<(), LedgerError> {
    if party(lot, actor) != Some(expected) {
        return Err(LedgerError::Unauthorized { lot: lot.id(), actor, action });
    }
    Ok(())
}

fn record(set: &NodeSet, id: LotId, action: &'static str, from: LotStatus) -> Result<Transition, LedgerError> {
    let lot = set.require_lot(id)?;
    tracing::debug!(lot = %id, action, from = %from, to = %lot.status(), "Lot transition");
    Ok(Transition {
        lot: id,
        action,
        from,
        to: lot.status(),
        correction: lot.correction_status(),
        created: None,
    })
}

/// DRAFT → PENDING.
pub fn send(set: &mut NodeSet, id: LotId, actor: EntityId) -> Result<Transition, LedgerError> {
    let lot = guard(set, id, "send", &[LotStatus::Draft])?;
    require(lot, actor, Party::Author, "send")?;
    if lot.client().is_none() {
        return Err(LedgerError::MissingCounterpart(id));
    }
    set.lot_mut(id)?.status = LotStatus::Pending;
    record(set, id, "send", LotStatus::Draft)
}

/// PENDING → ACCEPTED, creating a stock or a forwarded lot as requested.
pub fn accept(
    set: &mut NodeSet,
    id: LotId,
    actor: EntityId,
    acceptance: Acceptance,
) -> Result<Transition, LedgerError> {
    let lot = guard(set, id, "accept", &[LotStatus::Pending])?;
    require(lot, actor, Party::Counterpart, "accept")?;

    set.lot_mut(id)?.status = LotStatus::Accepted;
    let created = match acceptance {
        Acceptance::Consumption => None,
        Acceptance::IntoStock => Some(NodeRef::Stock(operations::receive_into_stock(set, id, actor)?)),
        Acceptance::Forward { recipient } => {
            Some(NodeRef::Lot(operations::forward(set, id, actor, recipient)?))
        }
    };

    let mut transition = record(set, id, "accept", LotStatus::Pending)?;
    transition.created = created;
    Ok(transition)
}

/// PENDING or ACCEPTED → REJECTED. Clears the counterpart link.
pub fn reject(set: &mut NodeSet, id: LotId, actor: EntityId) -> Result<Transition, LedgerError> {
    let lot = guard(set, id, "reject", &[LotStatus::Pending, LotStatus::Accepted])?;
    require(lot, actor, Party::Counterpart, "reject")?;
    if !set.live_children_refs(&NodeRef::Lot(id)).is_empty() {
        return Err(LedgerError::HasDownstream(id));
    }
    let from = lot.status();

    let lot = set.lot_mut(id)?;
    lot.status = LotStatus::Rejected;
    lot.client = None;
    lot.declared_by_supplier = false;
    lot.declared_by_client = false;
    record(set, id, "reject", from)
}

/// REJECTED → PENDING towards `client`.
pub fn resubmit(
    set: &mut NodeSet,
    id: LotId,
    actor: EntityId,
    client: EntityId,
) -> Result<Transition, LedgerError> {
    let lot = guard(set, id, "resubmit", &[LotStatus::Rejected])?;
    require(lot, actor, Party::Author, "resubmit")?;

    let lot = set.lot_mut(id)?;
    lot.client = Some(client);
    lot.status = LotStatus::Pending;
    record(set, id, "resubmit", LotStatus::Rejected)
}

/// Record the actor's declaration. ACCEPTED → FROZEN once both parties declared.
pub fn declare(set: &mut NodeSet, id: LotId, actor: EntityId) -> Result<Transition, LedgerError> {
    let lot = guard(set, id, "declare", &[LotStatus::Accepted])?;
    if lot.correction_status() == CorrectionStatus::InCorrection {
        return Err(LedgerError::CorrectionPending(id));
    }
    let side = party(lot, actor).ok_or(LedgerError::Unauthorized { lot: id, actor, action: "declare" })?;

    let lot = set.lot_mut(id)?;
    match side {
        Party::Author => lot.declared_by_supplier = true,
        Party::Counterpart => lot.declared_by_client = true,
    }
    if lot.declared_by_supplier && lot.declared_by_client {
        lot.status = LotStatus::Frozen;
    }
    record(set, id, "declare", LotStatus::Accepted)
}

/// Open a correction. Either party, before any declaration.
pub fn request_correction(set: &mut NodeSet, id: LotId, actor: EntityId) -> Result<Transition, LedgerError> {
    let lot = guard(set, id, "request_correction", &[LotStatus::Pending, LotStatus::Accepted])?;
    if party(lot, actor).is_none() {
        return Err(LedgerError::Unauthorized { lot: id, actor, action: "request_correction" });
    }
    if lot.correction_status() == CorrectionStatus::InCorrection
        || lot.declared_by_supplier()
        || lot.declared_by_client()
    {
        return Err(LedgerError::InvalidTransition {
            lot: id,
            action: "request_correction",
            from: lot.status(),
        });
    }
    let from = lot.status();
    set.lot_mut(id)?.correction_status = CorrectionStatus::InCorrection;
    record(set, id, "request_correction", from)
}

/// IN_CORRECTION → FIXED, by the author.
pub fn mark_fixed(set: &mut NodeSet, id: LotId, actor: EntityId) -> Result<Transition, LedgerError> {
    correction_step(
        set,
        id,
        actor,
        Party::Author,
        "mark_fixed",
        CorrectionStatus::InCorrection,
        CorrectionStatus::Fixed,
    )
}

/// FIXED → NO_ISSUE, by the counterpart.
pub fn approve_fix(set: &mut NodeSet, id: LotId, actor: EntityId) -> Result<Transition, LedgerError> {
    correction_step(
        set,
        id,
        actor,
        Party::Counterpart,
        "approve_fix",
        CorrectionStatus::Fixed,
        CorrectionStatus::NoIssue,
    )
}

fn correction_step(
    set: &mut NodeSet,
    id: LotId,
    actor: EntityId,
    by: Party,
    action: &'static str,
    expected: CorrectionStatus,
    next: CorrectionStatus,
) -> Result<Transition, LedgerError> {
    let lot = guard(set, id, action, &[LotStatus::Pending, LotStatus::Accepted])?;
    require(lot, actor, by, action)?;
    if lot.correction_status() != expected {
        return Err(LedgerError::InvalidTransition { lot: id, action, from: lot.status() });
    }
    let from = lot.status();
    set.lot_mut(id)?.correction_status = next;
    record(set, id, action, from)
}

/// Check that `actor` may delete the lot. The cascade itself runs in [`crate::cascade`].
pub fn authorize_delete(set: &NodeSet, id: LotId, actor: EntityId) -> Result<(), LedgerError> {
    let lot = guard(
        set,
        id,
        "delete",
        &[LotStatus::Draft, LotStatus::Pending, LotStatus::Accepted, LotStatus::Rejected],
    )?;
    require(lot, actor, Party::Author, "delete")
}
