//! Property tests for conservation, atomicity and idempotent propagation.

use lot_ledger_kernel::{
    delete, propagate, split, theoretical_remaining, update, volumes_match, Biofuel,
    Characteristics, EntityId, FieldValue, LedgerNode, Lot, LotId, LotStatus, NodeRef, NodeSet,
    Stock, StockId,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Split(f64),
    Resize(usize, f64),
    Delete(usize),
}

fn volume() -> impl Strategy<Value = f64> {
    (1u32..60_000).prop_map(|cents| cents as f64 / 100.0)
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        volume().prop_map(Op::Split),
        (any::<usize>(), volume()).prop_map(|(i, v)| Op::Resize(i, v)),
        any::<usize>().prop_map(Op::Delete),
    ]
}

fn stocked(initial: f64) -> (NodeSet, StockId, EntityId) {
    let owner = EntityId::generate();
    let root = Lot::draft(EntityId::generate(), Characteristics::new("COLZA", Biofuel::emhv()), initial)
        .with_status(LotStatus::Accepted);
    let stock = Stock::from_lot(&root, owner);
    let id = stock.id();
    (NodeSet::from_nodes(vec![LedgerNode::Lot(root), LedgerNode::Stock(stock)]), id, owner)
}

fn assert_conserved(set: &NodeSet) {
    for stock in set.iter().filter_map(LedgerNode::as_stock) {
        let theoretical = theoretical_remaining(set, stock.id()).unwrap();
        assert!(
            volumes_match(stock.remaining_volume(), theoretical),
            "stock {} stores {} but children leave {}",
            stock.id(),
            stock.remaining_volume(),
            theoretical
        );
        assert!(stock.remaining_volume() >= 0.0);
    }
}

proptest! {
    #[test]
    fn prop_stock_volume_is_conserved(initial in volume(), ops in prop::collection::vec(op(), 1..40)) {
        let (mut set, stock, owner) = stocked(initial);
        let mut lots: Vec<LotId> = Vec::new();

        for op in ops {
            let before = set.fingerprint();
            let result = match op {
                Op::Split(v) => split(&mut set, stock, owner, v, None).map(|id| lots.push(id)),
                Op::Resize(i, v) if !lots.is_empty() => {
                    let lot = lots[i % lots.len()];
                    update(&mut set, NodeRef::Lot(lot), &[FieldValue::Volume(v)], owner).map(|_| ())
                }
                Op::Delete(i) if !lots.is_empty() => {
                    let lot = lots[i % lots.len()];
                    delete(&mut set, lot).map(|_| ())
                }
                _ => Ok(()),
            };
            if result.is_err() {
                prop_assert_eq!(set.fingerprint(), before);
            }
            assert_conserved(&set);
        }
    }

    #[test]
    fn prop_propagation_is_idempotent(
        draws in prop::collection::vec(1u32..100, 1..8),
        cert in "[A-Z]{4}-[0-9]{3}",
        changed_only in any::<bool>(),
    ) {
        let (mut set, stock, owner) = stocked(1000.0);
        for d in draws {
            split(&mut set, stock, owner, d as f64, None).unwrap();
        }

        let diff = update(
            &mut set,
            NodeRef::Stock(stock),
            &[FieldValue::SupplierCertificate(Some(cert.clone()))],
            owner,
        )
        .unwrap();
        let first = propagate(&mut set, &diff, changed_only).unwrap();
        prop_assert!(!first.is_empty());
        let after_first = set.fingerprint();

        let second = propagate(&mut set, &diff, changed_only).unwrap();
        prop_assert!(second.is_empty());
        prop_assert_eq!(set.fingerprint(), after_first);

        for lot in set.iter().filter_map(LedgerNode::as_lot).filter(|l| l.parent_stock().is_some()) {
            prop_assert_eq!(lot.characteristics().supplier_certificate.as_deref(), Some(cert.as_str()));
        }
    }
}
