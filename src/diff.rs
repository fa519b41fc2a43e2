//! Diff/update engine.
//!
//! Applies field changes to one node of a loaded [`NodeSet`], in memory,
//! and returns the field-level diff. Nothing is persisted here: the caller
//! propagates the diff and commits every touched node in one batch.
//!
//! ## Field mutability
//!
//! | Lot status | Mutable fields |
//! |------------|----------------|
//! | DRAFT, REJECTED | all |
//! | PENDING | all while IN_CORRECTION, otherwise transport document and delivery site |
//! | ACCEPTED | all while IN_CORRECTION, otherwise none |
//! | FROZEN, DELETED | none |
//!
//! Stocks accept inheritable characteristics only. Transformations accept nothing.

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::node_set::NodeSet;
use crate::types::{
    round2, CorrectionStatus, EntityId, Field, FieldValue, Lot, LotId, LotStatus,
    LotWarning, NodeRef,
};

/// Old and new value of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    /// Value before the change.
    pub old: FieldValue,
    /// Value after the change.
    pub new: FieldValue,
}

impl FieldDiff {
    /// The changed field.
    pub fn field(&self) -> Field {
        self.new.field()
    }
}

/// Field-level diff of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    /// Changed node.
    pub node: NodeRef,
    /// Entity that requested the change, if any.
    pub actor: Option<EntityId>,
    /// Changed fields, in request order.
    pub entries: Vec<FieldDiff>,
    /// Warnings attached to the node by this change.
    pub warnings: Vec<LotWarning>,
    /// Other nodes modified as a consequence (e.g. the parent stock of a lot).
    pub side_effects: Vec<NodeRef>,
}

impl Diff {
    /// Empty diff for a node.
    pub fn new(node: NodeRef, actor: Option<EntityId>) -> Self {
        Self {
            node,
            actor,
            entries: Vec::new(),
            warnings: Vec::new(),
            side_effects: Vec::new(),
        }
    }

    /// No field changed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for a field.
    pub fn get(&self, field: Field) -> Option<&FieldDiff> {
        self.entries.iter().find(|e| e.field() == field)
    }

    /// Entries whose field is inherited downstream.
    pub fn inheritable(&self) -> impl Iterator<Item = &FieldDiff> {
        self.entries.iter().filter(|e| e.field().is_inheritable())
    }

    pub(crate) fn record(&mut self, old: FieldValue, new: FieldValue) {
        self.entries.push(FieldDiff { old, new });
    }
}

/// Outcome of the stock headroom check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Headroom {
    /// The lot has no parent stock or the change does not increase the draw.
    NotApplicable,
    /// The stock covers the increase of `delta`.
    Granted {
        /// Volume to deduct from the stock (negative credits it back).
        delta: f64,
    },
    /// The stock cannot cover the increase.
    Refused {
        /// Requested increase.
        delta: f64,
        /// Remaining volume of the stock.
        available: f64,
    },
}

/// Whether a field of `lot` may change in its current state.
pub fn field_is_mutable(lot: &Lot, field: Field) -> bool {
    let in_correction = lot.correction_status() == CorrectionStatus::InCorrection;
    match lot.status() {
        LotStatus::Draft | LotStatus::Rejected => true,
        LotStatus::Pending => {
            in_correction
                || matches!(field, Field::TransportDocumentReference | Field::DeliverySite)
        }
        LotStatus::Accepted => in_correction,
        LotStatus::Frozen | LotStatus::Deleted => false,
    }
}

/// Check whether the parent stock of `lot` can cover a change to `new_volume`.
///
/// Evaluated against the freshly loaded stock of `set`.
pub fn check_stock_headroom(set: &NodeSet, lot: &Lot, new_volume: f64) -> Result<Headroom, LedgerError> {
    let Some(stock_id) = lot.parent_stock() else {
        return Ok(Headroom::NotApplicable);
    };
    let stock = set.require_stock(stock_id)?;
    let delta = round2(round2(new_volume) - lot.volume());
    if delta == 0.0 {
        return Ok(Headroom::NotApplicable);
    }
    if delta > 0.0 && stock.remaining_volume() < delta {
        return Ok(Headroom::Refused {
            delta,
            available: stock.remaining_volume(),
        });
    }
    Ok(Headroom::Granted { delta })
}

/// Apply `changes` to `node` and return the diff.
///
/// Validation happens before any write, so an error leaves `set` untouched.
/// A volume increase the parent stock cannot cover is not an error: the
/// volume is kept, `NOT_ENOUGH_VOLUME_LEFT` is attached to the lot and the
/// remaining changes still apply.
pub fn update(
    set: &mut NodeSet,
    node: NodeRef,
    changes: &[FieldValue],
    actor: EntityId,
) -> Result<Diff, LedgerError> {
    match node {
        NodeRef::Lot(id) => update_lot(set, id, changes, actor),
        NodeRef::Stock(id) => {
            for change in changes {
                if !change.field().is_inheritable() {
                    return Err(LedgerError::FieldNotApplicable { node, field: change.field() });
                }
            }
            let current = set.require_stock(id)?.characteristics().clone();
            let mut diff = Diff::new(node, Some(actor));
            let mut next = current.clone();
            for change in changes {
                if let Some(old) = next.get(change.field()) {
                    if &old != change {
                        next.set(change);
                        diff.record(old, change.clone());
                    }
                }
            }
            if !diff.is_empty() {
                let stock = set.stock_mut(id)?;
                let remaining = stock.remaining_volume();
                stock.characteristics = next;
                stock.set_remaining_volume(remaining);
            }
            Ok(diff)
        }
        NodeRef::Transformation(_) => Err(LedgerError::ImmutableNode(node)),
    }
}

fn update_lot(
    set: &mut NodeSet,
    id: LotId,
    changes: &[FieldValue],
    actor: EntityId,
) -> Result<Diff, LedgerError> {
    let node = NodeRef::Lot(id);
    let lot = set.require_lot(id)?;
    if lot.status().is_terminal() {
        return Err(LedgerError::ImmutableNode(node));
    }

    let mut volume_change: Option<f64> = None;
    for change in changes {
        let field = change.field();
        if !field_is_mutable(lot, field) {
            return Err(LedgerError::FieldLocked {
                lot: id,
                field,
                status: lot.status(),
                correction: lot.correction_status(),
            });
        }
        if let FieldValue::Volume(v) = change {
            if !v.is_finite() || *v <= 0.0 {
                return Err(LedgerError::InvalidVolume(*v));
            }
            let v = round2(*v);
            if v != lot.volume() {
                if !set.live_children_refs(&node).is_empty() {
                    return Err(LedgerError::VolumeLocked(id));
                }
                volume_change = Some(v);
            }
        }
    }

    let mut diff = Diff::new(node, Some(actor));

    if let Some(new_volume) = volume_change {
        let lot = set.require_lot(id)?;
        match check_stock_headroom(set, lot, new_volume)? {
            Headroom::Refused { delta, available } => {
                let warning = LotWarning::NotEnoughVolumeLeft {
                    requested: new_volume,
                    kept: lot.volume(),
                    available,
                };
                tracing::warn!(
                    lot = %id,
                    requested = new_volume,
                    delta,
                    available,
                    "Volume increase refused: parent stock has not enough volume left"
                );
                set.lot_mut(id)?.attach_warning(warning.clone());
                diff.warnings.push(warning);
            }
            headroom => {
                let old = lot.volume();
                if let (Headroom::Granted { delta }, Some(stock_id)) = (headroom, lot.parent_stock()) {
                    set.stock_mut(stock_id)?.adjust_remaining(-delta);
                    diff.side_effects.push(NodeRef::Stock(stock_id));
                }
                let lot = set.lot_mut(id)?;
                lot.set_volume(new_volume);
                lot.clear_warning(LotWarning::NOT_ENOUGH_VOLUME_LEFT);
                diff.record(FieldValue::Volume(old), FieldValue::Volume(new_volume));
            }
        }
    }

    for change in changes {
        if change.field() == Field::Volume {
            continue;
        }
        let old = set.require_lot(id)?.field_value(change.field());
        if &old != change {
            set.lot_mut(id)?.apply(change);
            diff.record(old, change.clone());
        }
    }

    Ok(diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Biofuel, Characteristics, LedgerNode, Stock};

    struct Fixture {
        set: NodeSet,
        author: EntityId,
        stock: Stock,
        drawn: Lot,
    }

    /// Accepted root lot of 1000 into a stock; a draft lot of 300 drawn from it.
    fn fixture() -> Fixture {
        let author = EntityId::generate();
        let root = Lot::draft(author, Characteristics::new("COLZA", Biofuel::emhv()), 1000.0)
            .with_status(LotStatus::Accepted);
        let stock = Stock::from_lot(&root, author).with_remaining_volume(700.0);
        let drawn = Lot::draft(author, root.characteristics().clone(), 300.0)
            .with_parent_stock(stock.id());
        let set = NodeSet::from_nodes(vec![
            LedgerNode::Lot(root),
            LedgerNode::Stock(stock.clone()),
            LedgerNode::Lot(drawn.clone()),
        ]);
        Fixture { set, author, stock, drawn }
    }

    #[test]
    fn test_volume_increase_within_headroom() {
        let mut f = fixture();
        let diff = update(
            &mut f.set,
            NodeRef::Lot(f.drawn.id()),
            &[FieldValue::Volume(500.0)],
            f.author,
        )
        .unwrap();

        assert_eq!(diff.get(Field::Volume).unwrap().old, FieldValue::Volume(300.0));
        assert_eq!(diff.side_effects, vec![NodeRef::Stock(f.stock.id())]);
        assert_eq!(f.set.lot(f.drawn.id()).unwrap().volume(), 500.0);
        assert_eq!(f.set.stock(f.stock.id()).unwrap().remaining_volume(), 500.0);
    }

    #[test]
    fn test_volume_decrease_credits_stock() {
        let mut f = fixture();
        update(&mut f.set, NodeRef::Lot(f.drawn.id()), &[FieldValue::Volume(100.0)], f.author).unwrap();
        assert_eq!(f.set.stock(f.stock.id()).unwrap().remaining_volume(), 900.0);
    }

    #[test]
    fn test_volume_increase_beyond_headroom_is_reverted_with_warning() {
        let mut f = fixture();
        let diff = update(
            &mut f.set,
            NodeRef::Lot(f.drawn.id()),
            &[FieldValue::Volume(1100.0), FieldValue::DeliverySite(Some("DEPOT".to_string()))],
            f.author,
        )
        .unwrap();

        assert!(diff.get(Field::Volume).is_none());
        assert!(diff.get(Field::DeliverySite).is_some());
        assert_eq!(diff.warnings.len(), 1);

        let lot = f.set.lot(f.drawn.id()).unwrap();
        assert_eq!(lot.volume(), 300.0);
        assert!(lot.has_warning("NOT_ENOUGH_VOLUME_LEFT"));
        assert_eq!(f.set.stock(f.stock.id()).unwrap().remaining_volume(), 700.0);
    }

    #[test]
    fn test_frozen_lot_is_immutable() {
        let mut f = fixture();
        f.set.lot_mut(f.drawn.id()).unwrap().status = LotStatus::Frozen;
        let before = f.set.fingerprint();

        let err = update(&mut f.set, NodeRef::Lot(f.drawn.id()), &[FieldValue::Volume(10.0)], f.author)
            .unwrap_err();
        assert_eq!(err, LedgerError::ImmutableNode(NodeRef::Lot(f.drawn.id())));
        assert_eq!(f.set.fingerprint(), before);
    }

    #[test]
    fn test_repeated_refusals_keep_one_warning() {
        let mut f = fixture();
        let lot = NodeRef::Lot(f.drawn.id());
        for _ in 0..3 {
            update(&mut f.set, lot, &[FieldValue::Volume(1100.0)], f.author).unwrap();
        }
        assert_eq!(f.set.lot(f.drawn.id()).unwrap().warnings().len(), 1);
    }

    #[test]
    fn test_granted_volume_change_clears_warning() {
        let mut f = fixture();
        let lot = NodeRef::Lot(f.drawn.id());
        update(&mut f.set, lot, &[FieldValue::Volume(1100.0)], f.author).unwrap();
        assert!(f.set.lot(f.drawn.id()).unwrap().has_warning("NOT_ENOUGH_VOLUME_LEFT"));

        let diff = update(&mut f.set, lot, &[FieldValue::Volume(350.0)], f.author).unwrap();

        assert!(diff.warnings.is_empty());
        let lot = f.set.lot(f.drawn.id()).unwrap();
        assert_eq!(lot.volume(), 350.0);
        assert!(lot.warnings().is_empty());
        assert_eq!(f.set.stock(f.stock.id()).unwrap().remaining_volume(), 650.0);
    }

    #[test]
    fn test_deleted_lot_is_immutable() {
        let mut f = fixture();
        f.set.lot_mut(f.drawn.id()).unwrap().status = LotStatus::Deleted;
        let before = f.set.fingerprint();

        let err = update(
            &mut f.set,
            NodeRef::Lot(f.drawn.id()),
            &[FieldValue::DeliverySite(Some("DEPOT".to_string()))],
            f.author,
        )
        .unwrap_err();
        assert_eq!(err, LedgerError::ImmutableNode(NodeRef::Lot(f.drawn.id())));
        assert_eq!(f.set.fingerprint(), before);
    }

    #[test]
    fn test_accepted_lot_locked_outside_correction() {
        let mut f = fixture();
        f.set.lot_mut(f.drawn.id()).unwrap().status = LotStatus::Accepted;
        let err = update(
            &mut f.set,
            NodeRef::Lot(f.drawn.id()),
            &[FieldValue::SupplierCertificate(Some("X".to_string()))],
            f.author,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::FieldLocked { .. }));

        f.set.lot_mut(f.drawn.id()).unwrap().correction_status = CorrectionStatus::InCorrection;
        let diff = update(
            &mut f.set,
            NodeRef::Lot(f.drawn.id()),
            &[FieldValue::SupplierCertificate(Some("X".to_string()))],
            f.author,
        )
        .unwrap();
        assert_eq!(diff.entries.len(), 1);
    }

    #[test]
    fn test_pending_lot_allows_logistics_fields_only() {
        let mut f = fixture();
        f.set.lot_mut(f.drawn.id()).unwrap().status = LotStatus::Pending;
        let lot = NodeRef::Lot(f.drawn.id());
        assert!(update(&mut f.set, lot, &[FieldValue::DeliverySite(Some("D".to_string()))], f.author).is_ok());
        assert!(matches!(
            update(&mut f.set, lot, &[FieldValue::Volume(10.0)], f.author),
            Err(LedgerError::FieldLocked { .. })
        ));
    }

    #[test]
    fn test_volume_locked_by_downstream() {
        let mut f = fixture();
        let root_id = f.stock.parent_lot().unwrap();
        f.set.lot_mut(root_id).unwrap().correction_status = CorrectionStatus::InCorrection;
        let err = update(&mut f.set, NodeRef::Lot(root_id), &[FieldValue::Volume(900.0)], f.author)
            .unwrap_err();
        assert_eq!(err, LedgerError::VolumeLocked(root_id));
    }

    #[test]
    fn test_invalid_volume_rejected_before_any_write() {
        let mut f = fixture();
        let before = f.set.fingerprint();
        let err = update(
            &mut f.set,
            NodeRef::Lot(f.drawn.id()),
            &[FieldValue::DeliverySite(Some("D".to_string())), FieldValue::Volume(-5.0)],
            f.author,
        )
        .unwrap_err();
        assert_eq!(err, LedgerError::InvalidVolume(-5.0));
        assert_eq!(f.set.fingerprint(), before);
    }

    #[test]
    fn test_unchanged_value_yields_empty_diff() {
        let mut f = fixture();
        let diff = update(&mut f.set, NodeRef::Lot(f.drawn.id()), &[FieldValue::Volume(300.0)], f.author)
            .unwrap();
        assert!(diff.is_empty());
        assert!(f.set.dirty_refs().is_empty());
    }

    #[test]
    fn test_stock_accepts_only_inheritable_fields() {
        let mut f = fixture();
        let stock = NodeRef::Stock(f.stock.id());
        let err = update(&mut f.set, stock, &[FieldValue::Volume(1.0)], f.author).unwrap_err();
        assert!(matches!(err, LedgerError::FieldNotApplicable { .. }));

        let diff = update(
            &mut f.set,
            stock,
            &[FieldValue::CountryOfOrigin(Some("FR".to_string()))],
            f.author,
        )
        .unwrap();
        assert_eq!(diff.entries.len(), 1);
        assert_eq!(
            f.set.stock(f.stock.id()).unwrap().characteristics().country_of_origin.as_deref(),
            Some("FR")
        );
    }
}
