//! Audit events and counters.
//!
//! ## Event Types
//!
//! | Event | Severity | Emitted by |
//! |-------|----------|------------|
//! | DriftDetected | MEDIUM | reconciliation, dry-run |
//! | DriftCorrected | MEDIUM | reconciliation, apply mode |
//! | CascadeDeleted | LOW | cascade delete commit |
//! | GraphIntegrityViolation | CRITICAL | graph loader |
//!
//! Events that are persisted travel in the same write batch as the node
//! changes they describe, so they commit or roll back together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::ids::{LotId, NodeRef, StockId};

/// Severity levels for audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Informational.
    Low,
    /// Needs inspection.
    Medium,
    /// Needs prompt inspection.
    High,
    /// Must never happen; page.
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventKind {
    /// Stored remaining volume differs from the re-derived one (not corrected).
    DriftDetected {
        /// Stock.
        stock_id: StockId,
        /// Stored remaining volume.
        stored: f64,
        /// Re-derived remaining volume.
        theoretical: f64,
        /// `theoretical - stored`.
        delta: f64,
    },
    /// Stored remaining volume was overwritten with the re-derived one.
    DriftCorrected {
        /// Stock.
        stock_id: StockId,
        /// Remaining volume before correction.
        stored: f64,
        /// Remaining volume after correction.
        theoretical: f64,
        /// `theoretical - stored`.
        delta: f64,
    },
    /// A lot and its exclusive descendants were deleted.
    CascadeDeleted {
        /// Lot the delete was requested on.
        root: LotId,
        /// Number of lots deleted.
        deleted: usize,
        /// Number of surviving nodes updated.
        updated: usize,
    },
    /// The graph violated a structural invariant.
    GraphIntegrityViolation {
        /// Node where the violation was observed.
        node: NodeRef,
        /// Description.
        reason: String,
    },
}

impl AuditEventKind {
    /// Severity of this event kind.
    pub fn severity(&self) -> Severity {
        match self {
            Self::DriftDetected { .. } => Severity::Medium,
            Self::DriftCorrected { .. } => Severity::Medium,
            Self::CascadeDeleted { .. } => Severity::Low,
            Self::GraphIntegrityViolation { .. } => Severity::Critical,
        }
    }

    /// Counter name for this event kind.
    pub fn metric_name(&self) -> &'static str {
        match self {
            Self::DriftDetected { .. } => "ledger_stock_drift_detected_total",
            Self::DriftCorrected { .. } => "ledger_stock_drift_corrected_total",
            Self::CascadeDeleted { .. } => "ledger_cascade_deletes_total",
            Self::GraphIntegrityViolation { .. } => "ledger_graph_integrity_violations_total",
        }
    }
}

/// A recorded audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event id.
    pub id: Uuid,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: AuditEventKind,
    /// Severity level.
    pub severity: Severity,
    /// Component that emitted the event.
    pub source: String,
    /// Additional context.
    pub context: BTreeMap<String, String>,
}

impl AuditEvent {
    /// Create a new event.
    pub fn new(kind: AuditEventKind, source: impl Into<String>) -> Self {
        let severity = kind.severity();
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            severity,
            source: source.into(),
            context: BTreeMap::new(),
        }
    }

    /// Add context to the event.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Log this event as a structured tracing event.
    pub fn log(&self) {
        match self.severity {
            Severity::Critical | Severity::High => tracing::error!(
                event_id = %self.id,
                kind = ?self.kind,
                severity = %self.severity,
                source = %self.source,
                context = ?self.context,
                "LEDGER_ALERT: {}",
                self.kind.metric_name()
            ),
            Severity::Medium => tracing::warn!(
                event_id = %self.id,
                kind = ?self.kind,
                source = %self.source,
                "ledger audit event"
            ),
            Severity::Low => tracing::info!(
                event_id = %self.id,
                kind = ?self.kind,
                source = %self.source,
                "ledger audit event"
            ),
        }
    }
}

/// Counter interface for ledger events.
pub trait LedgerMetrics: Send + Sync {
    /// Increment a counter by 1.
    fn increment(&self, metric_name: &str, labels: &[(&str, &str)]);

    /// Count an audit event.
    fn record_event(&self, event: &AuditEvent) {
        let severity = match event.severity {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        self.increment(event.kind.metric_name(), &[("severity", severity)]);
    }
}

/// No-op counters.
#[derive(Debug, Default)]
pub struct NoOpMetrics;

impl LedgerMetrics for NoOpMetrics {
    fn increment(&self, _metric_name: &str, _labels: &[(&str, &str)]) {}
}

/// In-memory counters for tests.
#[derive(Debug, Default)]
pub struct TestMetrics {
    /// Counter values keyed by name and labels.
    pub counters: parking_lot::Mutex<HashMap<String, u64>>,
}

impl LedgerMetrics for TestMetrics {
    fn increment(&self, metric_name: &str, labels: &[(&str, &str)]) {
        let key = format!("{}:{:?}", metric_name, labels);
        *self.counters.lock().entry(key).or_insert(0) += 1;
    }
}

impl TestMetrics {
    /// Sum of all counters whose name starts with `metric_name`.
    pub fn get_count(&self, metric_name: &str) -> u64 {
        self.counters
            .lock()
            .iter()
            .filter(|(k, _)| k.starts_with(metric_name))
            .map(|(_, v)| v)
            .sum()
    }
}
