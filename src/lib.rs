//! # lot-ledger-kernel
//!
//! Traceability graph and volume-conservation engine for chain-of-custody
//! ledgers.
//!
//! The kernel answers one question:
//!
//! > After this change, does everything claimed downstream still add up to
//! > what was produced upstream?
//!
//! ## Core Contract
//!
//! 1. Every mutation loads the full connected component of the node first
//! 2. Changes are applied in memory, diff-tracked, propagated, then
//!    persisted in one commit (all or nothing)
//! 3. Every stock satisfies, within 0.01 litre:
//!    `remaining = initial - Σ live drawn lots - Σ transformation deductions`
//!
//! ## Architecture
//!
//! ```text
//! request → GraphLoader → NodeSet → diff / cascade / lifecycle / operations
//!                ↑                         ↓
//!           LedgerStore  ←──── commit ← propagation
//!
//! Reconciler: LedgerStore pages → PageContext → drift report / corrections
//! ```
//!
//! ## Graph Shape
//!
//! Lots, stocks and transformations form a forest: every node has at most
//! one parent. Frozen and deleted lots are immutable; transformations are
//! immutable once created.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod error;
pub mod config;
pub mod canonical;
pub mod store;
pub mod node_set;
pub mod loader;
pub mod diff;
pub mod propagation;
pub mod cascade;
pub mod lifecycle;
pub mod operations;
pub mod engine;
pub mod reconcile;

// Re-exports
pub use types::{
    round2, volumes_match, AuditEvent, AuditEventKind, Biofuel, Characteristics,
    CorrectionStatus, EntityId, Field, FieldValue, GhgComponents, LedgerMetrics, LedgerNode, Lot,
    LotId, LotStatus, LotWarning, NoOpMetrics, NodeKind, NodeRef, Quantity, Severity, Stock,
    StockId, TestMetrics, Transformation, TransformationId, VOLUME_EPSILON,
};
pub use error::LedgerError;
pub use config::EngineConfig;
pub use canonical::{to_canonical_bytes, canonical_hash, canonical_hash_hex};
pub use store::{
    InMemoryError, InMemoryLedgerStore, LedgerSnapshot, LedgerStore, RemainingCorrection,
    WriteBatch,
};
pub use node_set::NodeSet;
pub use loader::GraphLoader;
pub use diff::{check_stock_headroom, field_is_mutable, update, Diff, FieldDiff, Headroom};
pub use propagation::propagate;
pub use cascade::{delete, CascadeOutcome};
pub use lifecycle::{Acceptance, Transition};
pub use operations::{split, theoretical_remaining, transform, TransformationSpec, Transformed};
pub use engine::{LedgerEngine, UpdateOutcome};
pub use reconcile::{
    PageContext, PageFailure, ReconcileOptions, ReconcileReport, Reconciler, StockDrift,
};

/// Schema version of the persisted node types.
/// Increment on breaking changes to any serialized type.
pub const LEDGER_SCHEMA_VERSION: &str = "1.0.0";
