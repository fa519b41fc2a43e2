//! Core types for the ledger kernel.

pub mod ids;
pub mod quantity;
pub mod characteristics;
pub mod lot;
pub mod stock;
pub mod transformation;
pub mod node;
pub mod audit;

pub use ids::{EntityId, LotId, NodeKind, NodeRef, StockId, TransformationId};
pub use quantity::{round2, volumes_match, Biofuel, Quantity, VOLUME_EPSILON};
pub use characteristics::{Characteristics, Field, FieldValue, GhgComponents};
pub use lot::{CorrectionStatus, Lot, LotStatus, LotWarning};
pub use stock::Stock;
pub use transformation::Transformation;
pub use node::LedgerNode;
pub use audit::{
    AuditEvent, AuditEventKind, LedgerMetrics, NoOpMetrics, Severity, TestMetrics,
};
