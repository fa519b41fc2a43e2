//! Error type shared by the engines.
//!
//! `NOT_ENOUGH_VOLUME_LEFT` is not an error: it is a
//! [`LotWarning`](crate::types::LotWarning) attached to the lot.

use crate::types::{CorrectionStatus, EntityId, Field, LotId, LotStatus, NodeRef, StockId};

/// Error type for ledger operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    /// The graph violated a structural invariant (cycle, dangling or double parent).
    #[error("Graph integrity violation at {node}: {reason}")]
    GraphIntegrity {
        /// Node where the violation was observed.
        node: NodeRef,
        /// Description.
        reason: String,
    },
    /// Mutation attempted on a frozen/deleted lot or on a transformation.
    #[error("Node {0} is immutable")]
    ImmutableNode(NodeRef),
    /// Delete would reach a frozen lot.
    #[error("Cascade from lot {root} blocked by frozen lot {frozen}")]
    CascadeBlocked {
        /// Lot the delete was requested on.
        root: LotId,
        /// First frozen lot found in the cascade.
        frozen: LotId,
    },
    /// Traversal exceeded the configured depth or node budget.
    #[error("Traversal limit exceeded from {seed}: {limit}")]
    TraversalLimit {
        /// Seed the traversal started from.
        seed: NodeRef,
        /// Which limit was hit.
        limit: String,
    },
    /// Node not present in the store or the loaded node set.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeRef),
    /// Field cannot be changed in the lot's current state.
    #[error("Field {field} of lot {lot} is locked (status {status}, correction {correction})")]
    FieldLocked {
        /// Lot.
        lot: LotId,
        /// Field.
        field: Field,
        /// Lot status.
        status: LotStatus,
        /// Correction status.
        correction: CorrectionStatus,
    },
    /// Field not applicable to this node kind.
    #[error("Field {field} cannot be changed on {node}")]
    FieldNotApplicable {
        /// Node.
        node: NodeRef,
        /// Field.
        field: Field,
    },
    /// Volume of a lot with live downstream nodes cannot change.
    #[error("Volume of lot {0} is locked by downstream nodes")]
    VolumeLocked(LotId),
    /// Volume must be strictly positive.
    #[error("Invalid volume: {0}")]
    InvalidVolume(f64),
    /// Creation would overdraw a stock.
    #[error("Stock {stock} has {available} left, {requested} requested")]
    InsufficientVolume {
        /// Stock.
        stock: StockId,
        /// Requested volume.
        requested: f64,
        /// Remaining volume.
        available: f64,
    },
    /// Stock was soft-deleted.
    #[error("Stock {0} is retired")]
    StockRetired(StockId),
    /// Status transition not allowed.
    #[error("Lot {lot}: cannot {action} from {from}")]
    InvalidTransition {
        /// Lot.
        lot: LotId,
        /// Requested action.
        action: &'static str,
        /// Current status.
        from: LotStatus,
    },
    /// Actor is not the party allowed to perform the action.
    #[error("Entity {actor} may not {action} lot {lot}")]
    Unauthorized {
        /// Lot.
        lot: LotId,
        /// Actor.
        actor: EntityId,
        /// Requested action.
        action: &'static str,
    },
    /// Lot has no counterpart to send to.
    #[error("Lot {0} has no counterpart")]
    MissingCounterpart(LotId),
    /// Action not allowed while a correction is open.
    #[error("Lot {0} has an open correction")]
    CorrectionPending(LotId),
    /// Action requires the lot to have no live downstream nodes.
    #[error("Lot {0} has live downstream nodes")]
    HasDownstream(LotId),
    /// Store error.
    #[error("Store error: {0}")]
    Store(String),
}

impl LedgerError {
    /// Create a store error from any error type.
    pub fn from_store<E: std::error::Error>(e: E) -> Self {
        Self::Store(e.to_string())
    }

    /// Whether the error is a caller mistake (4xx-equivalent) rather than a
    /// storage failure or an integrity alert.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Store(_) | Self::GraphIntegrity { .. } | Self::TraversalLimit { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_classification() {
        let lot = LotId::generate();
        assert!(LedgerError::ImmutableNode(NodeRef::Lot(lot)).is_rejection());
        assert!(LedgerError::CascadeBlocked { root: lot, frozen: lot }.is_rejection());
        assert!(!LedgerError::Store("io".to_string()).is_rejection());
        assert!(!LedgerError::GraphIntegrity {
            node: NodeRef::Lot(lot),
            reason: "cycle".to_string()
        }
        .is_rejection());
    }

    #[test]
    fn test_display() {
        let err = LedgerError::InvalidVolume(-1.0);
        assert_eq!(err.to_string(), "Invalid volume: -1");
    }
}
