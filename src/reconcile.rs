//! Reconciliation of stored stock volumes.
//!
//! Scans every stock page by page, re-derives its remaining volume from its
//! children and reports the stocks whose stored value drifted beyond the
//! tolerance:
//!
//! ```text
//! theoretical = initial - Σ live drawn lots - Σ transformation deductions
//! ```
//!
//! Each page is independent: its children are fetched in bulk into a
//! [`PageContext`] and, in apply mode, its corrections and audit events are
//! written in one store call. A failed page is recorded in the report and
//! the scan moves on.
//!
//! Live transactions keep running during a scan. A correction only rewrites
//! the remaining quantity, and only if the stock still stores the value the
//! scan read; a stock written in between is reported but left for the next
//! run, which re-derives it from scratch.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::LedgerError;
use crate::store::{LedgerStore, RemainingCorrection};
use crate::types::{
    round2, AuditEvent, AuditEventKind, LedgerMetrics, NoOpMetrics, Stock, StockId,
};

/// Options of one reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Stocks per page.
    pub batch_size: usize,
    /// Drift up to this many litres is ignored.
    pub tolerance: f64,
    /// Overwrite drifted stocks instead of only reporting them.
    pub apply: bool,
}

impl ReconcileOptions {
    /// Options taken from the engine configuration.
    pub fn from_config(config: &EngineConfig, apply: bool) -> Self {
        Self {
            batch_size: config.batch_size,
            tolerance: config.drift_tolerance,
            apply,
        }
    }
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default(), false)
    }
}

/// Drift found on one stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockDrift {
    /// Stock.
    pub stock_id: StockId,
    /// Stored remaining volume.
    pub stored: f64,
    /// Re-derived remaining volume.
    pub theoretical: f64,
    /// `theoretical - stored`.
    pub delta: f64,
    /// Whether the stored value was overwritten.
    pub corrected: bool,
}

/// A page whose reads or commit failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageFailure {
    /// Cursor the page was listed after.
    pub after: Option<StockId>,
    /// Number of stocks in the page.
    pub stocks: usize,
    /// Error message.
    pub error: String,
}

/// Outcome of a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Stocks found drifting, corrected or not.
    pub drift_count: usize,
    /// Stocks overwritten.
    pub corrected_count: usize,
    /// One entry per drifting stock.
    pub per_item_deltas: Vec<StockDrift>,
    /// Stocks examined.
    pub scanned: usize,
    /// Pages processed, failed ones included.
    pub pages: usize,
    /// Pages that could not be processed.
    pub failed_pages: Vec<PageFailure>,
}

/// Children of one page of stocks, fetched in bulk.
///
/// Passed explicitly to the per-stock computation; nothing is cached
/// between pages.
#[derive(Debug, Default)]
pub struct PageContext {
    drawn: BTreeMap<StockId, f64>,
    deducted: BTreeMap<StockId, f64>,
}

impl PageContext {
    /// Fetch the live drawn lots and the transformations of `stocks`.
    pub async fn load<S: LedgerStore>(store: &S, stocks: &[Stock]) -> Result<Self, S::Error> {
        let ids: Vec<StockId> = stocks.iter().map(Stock::id).collect();
        let mut ctx = Self::default();

        for lot in store.lots_by_parent_stock(&ids).await? {
            if !lot.is_live() {
                continue;
            }
            if let Some(parent) = lot.parent_stock() {
                *ctx.drawn.entry(parent).or_insert(0.0) += lot.volume();
            }
        }
        for t in store.transformations_by_source_stock(&ids).await? {
            *ctx.deducted.entry(t.source_stock()).or_insert(0.0) += t.volume_deducted_from_source();
        }
        Ok(ctx)
    }

    /// Re-derived remaining volume of `stock`.
    pub fn theoretical_remaining(&self, stock: &Stock) -> f64 {
        let drawn = self.drawn.get(&stock.id()).copied().unwrap_or(0.0);
        let deducted = self.deducted.get(&stock.id()).copied().unwrap_or(0.0);
        round2(stock.initial_volume() - drawn - deducted)
    }
}

/// Batch reconciliation job.
pub struct Reconciler<S: LedgerStore> {
    store: Arc<S>,
    metrics: Arc<dyn LedgerMetrics>,
}

impl<S: LedgerStore> Reconciler<S> {
    /// Create a reconciler.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Count drift events with `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn LedgerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Scan every stock.
    ///
    /// Drift is data, not an error: the only error returned is a failure to
    /// list the next page, since the scan cannot continue past it.
    pub async fn reconcile(&self, options: ReconcileOptions) -> Result<ReconcileReport, LedgerError> {
        let batch_size = options.batch_size.max(1);
        let mut report = ReconcileReport::default();
        let mut after: Option<StockId> = None;

        loop {
            let page = self
                .store
                .list_stocks(after, batch_size)
                .await
                .map_err(LedgerError::from_store)?;
            let Some(last) = page.last().map(Stock::id) else {
                break;
            };
            report.pages += 1;
            report.scanned += page.len();

            match self.reconcile_page(&page, &options).await {
                Ok(drifts) => {
                    tracing::info!(
                        page = report.pages,
                        stocks = page.len(),
                        drifted = drifts.len(),
                        apply = options.apply,
                        "Reconciled stock page"
                    );
                    report.drift_count += drifts.len();
                    report.corrected_count += drifts.iter().filter(|d| d.corrected).count();
                    report.per_item_deltas.extend(drifts);
                }
                Err(e) => {
                    tracing::error!(
                        page = report.pages,
                        stocks = page.len(),
                        error = %e,
                        "Reconciliation page failed"
                    );
                    report.failed_pages.push(PageFailure {
                        after,
                        stocks: page.len(),
                        error: e.to_string(),
                    });
                }
            }

            if page.len() < batch_size {
                break;
            }
            after = Some(last);
        }

        tracing::info!(
            scanned = report.scanned,
            drift = report.drift_count,
            corrected = report.corrected_count,
            failed_pages = report.failed_pages.len(),
            "Reconciliation finished"
        );
        Ok(report)
    }

    async fn reconcile_page(
        &self,
        page: &[Stock],
        options: &ReconcileOptions,
    ) -> Result<Vec<StockDrift>, LedgerError> {
        let ctx = PageContext::load(self.store.as_ref(), page)
            .await
            .map_err(LedgerError::from_store)?;

        let mut drifts = Vec::new();
        let mut detected = Vec::new();
        let mut corrections = Vec::new();
        for stock in page {
            let stored = stock.remaining_volume();
            let theoretical = ctx.theoretical_remaining(stock);
            let delta = round2(theoretical - stored);
            if delta.abs() <= options.tolerance {
                continue;
            }

            let stock_id = stock.id();
            if options.apply {
                let event = AuditEvent::new(
                    AuditEventKind::DriftCorrected { stock_id, stored, theoretical, delta },
                    "reconcile",
                )
                .with_context("tolerance", options.tolerance.to_string());
                corrections.push(RemainingCorrection {
                    stock_id,
                    expected: stored,
                    remaining: theoretical,
                    event,
                });
            } else {
                detected.push(
                    AuditEvent::new(
                        AuditEventKind::DriftDetected { stock_id, stored, theoretical, delta },
                        "reconcile",
                    )
                    .with_context("tolerance", options.tolerance.to_string()),
                );
            }
            drifts.push(StockDrift { stock_id, stored, theoretical, delta, corrected: false });
        }

        if corrections.is_empty() {
            for event in &detected {
                event.log();
                self.metrics.record_event(event);
            }
            return Ok(drifts);
        }

        let events: BTreeMap<StockId, AuditEvent> =
            corrections.iter().map(|c| (c.stock_id, c.event.clone())).collect();
        let corrected: BTreeSet<StockId> = self
            .store
            .correct_remaining(corrections)
            .await
            .map_err(LedgerError::from_store)?
            .into_iter()
            .collect();

        for drift in &mut drifts {
            if corrected.contains(&drift.stock_id) {
                drift.corrected = true;
                if let Some(event) = events.get(&drift.stock_id) {
                    event.log();
                    self.metrics.record_event(event);
                }
            } else {
                tracing::warn!(
                    stock = %drift.stock_id,
                    stored = drift.stored,
                    "Stock changed during reconciliation, left for the next run"
                );
            }
        }
        Ok(drifts)
    }
}
