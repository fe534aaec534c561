use std::collections::BTreeMap;

use serde::Serialize;

use fiscora_core::{CENT, round2};
use fiscora_documents::FiscalDocument;
use fiscora_store::{DocumentStore, StoreError};

/// Refund state of an original document, derived from its credit notes.
///
/// Never stored: computed by scanning every credit note whose
/// `original_invoice_id` references the original, so it is always
/// authoritative even when the denormalized fields on the original are
/// stale (e.g. after a best-effort update failed).
#[derive(Debug, Clone, Default)]
pub struct RefundAggregate {
    /// Sum of `abs(quantity)` over credit-note lines, per original line index.
    pub refunded_qty_by_index: BTreeMap<usize, f64>,
    /// `Σ abs(credit_note.total_ttc)`.
    pub credit_notes_total: f64,
    /// `abs(original.total_ttc)`, the conserved quantity.
    pub original_total: f64,
}

impl RefundAggregate {
    pub fn compute<S: DocumentStore>(
        store: &S,
        original: &FiscalDocument,
    ) -> Result<Self, StoreError> {
        let notes = store.find_credit_notes(&original.id)?;

        let mut refunded_qty_by_index: BTreeMap<usize, f64> = BTreeMap::new();
        let mut credit_notes_total = 0.0;
        for note in &notes {
            credit_notes_total += note.total_ttc.abs();
            for item in &note.items {
                if let Some(index) = item.original_item_index {
                    *refunded_qty_by_index.entry(index).or_insert(0.0) += item.quantity.abs();
                }
            }
        }

        Ok(Self {
            refunded_qty_by_index,
            credit_notes_total: round2(credit_notes_total),
            original_total: original.total_ttc.abs(),
        })
    }

    /// Quantity already refunded for a line index (0 when untouched).
    pub fn refunded_qty(&self, index: usize) -> f64 {
        self.refunded_qty_by_index.get(&index).copied().unwrap_or(0.0)
    }

    /// Amount still refundable.
    pub fn remaining(&self) -> f64 {
        round2(self.original_total - self.credit_notes_total)
    }

    pub fn fully_refunded(&self) -> bool {
        self.remaining() <= CENT
    }
}

/// Read-only refundable state of one original line.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundableLine {
    pub index: usize,
    pub description: String,
    pub original_quantity: f64,
    pub refunded_quantity: f64,
    pub remaining_quantity: f64,
}

/// Read-only refund view of an original document, for callers that render
/// refundable state before submitting a refund.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundSummary {
    pub document_number: String,
    pub lines: Vec<RefundableLine>,
    pub credit_notes_total: f64,
    pub remaining: f64,
    pub fully_refunded: bool,
}
