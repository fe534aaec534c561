use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

use fiscora_chain::ChainSealer;
use fiscora_core::{CENT, CompanyId, DocumentId, UserId, round2};
use fiscora_documents::{
    DocumentDraft, DocumentStatus, FiscalDocument, InvoiceType, LineItem,
};
use fiscora_store::{DocumentStore, StoreError};

use crate::aggregate::{RefundAggregate, RefundSummary, RefundableLine};
use crate::error::RefundError;

/// Quantities are decimals; anything below this is refunded-out noise.
const QTY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundType {
    /// Refund everything that is still refundable, line by line.
    Full,
    /// Refund the explicitly listed items/quantities.
    Partial,
}

/// How the money goes back. Recorded in the audit log, not on the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundMethod {
    Cash,
    Card,
    BankTransfer,
    StoreCredit,
}

/// One requested line of a partial refund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundedItem {
    pub original_item_index: usize,
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    pub original_document_id: DocumentId,
    pub refund_type: RefundType,
    pub refund_method: RefundMethod,
    /// Required (non-empty) for `Partial`, ignored for `Full`.
    #[serde(default)]
    pub refunded_items: Vec<RefundedItem>,
    pub reason: String,
    pub acting_user: UserId,
}

/// Result of a successful refund.
#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub credit_note: FiscalDocument,
    /// The original with refreshed denormalized aggregates. Returned even
    /// when persisting the refresh failed (the aggregates are derivable
    /// from the credit notes at any time).
    pub updated_original: FiscalDocument,
}

/// Creates credit notes against sealed invoices.
///
/// All validation happens inside the owning company's chain lock, in the
/// same critical section that seals, so two concurrent refunds against one
/// invoice cannot both observe the same remaining amount.
#[derive(Debug)]
pub struct RefundLedger<S> {
    store: S,
    sealer: ChainSealer<S>,
}

impl<S: DocumentStore> RefundLedger<S> {
    pub fn new(store: S, sealer: ChainSealer<S>) -> Self {
        Self { store, sealer }
    }

    /// Create a credit note reversing part or all of an invoice.
    ///
    /// Validation failures abort before any write. A persistence failure
    /// while refreshing the original's denormalized aggregates is logged
    /// and tolerated: the credit note is the source of truth.
    pub fn create_credit_note(
        &self,
        request: RefundRequest,
    ) -> Result<RefundOutcome, RefundError> {
        if request.reason.trim().is_empty() {
            return Err(RefundError::MissingReason);
        }

        let original = self
            .store
            .find_by_id(&request.original_document_id)?
            .ok_or(RefundError::OriginalNotFound(request.original_document_id))?;
        if original.invoice_type != InvoiceType::Invoice {
            return Err(RefundError::NotRefundable {
                number: original.number.clone(),
            });
        }
        if original.status == DocumentStatus::Draft {
            return Err(RefundError::DraftDocument {
                number: original.number.clone(),
            });
        }

        let company = original.owner_company;
        let credit_note = self.sealer.seal_with(company, || {
            self.build_credit_note_draft(company, &original, &request)
        })?;

        tracing::info!(
            company = %company,
            credit_note = %credit_note.number,
            original = %original.number,
            amount = credit_note.total_ttc,
            method = ?request.refund_method,
            acting_user = %request.acting_user,
            "credit note sealed"
        );

        let updated_original = self.refresh_original_aggregates(original);
        Ok(RefundOutcome {
            credit_note,
            updated_original,
        })
    }

    /// Refund view of an original document (per-line refunded/remaining
    /// quantities plus totals).
    pub fn refund_summary(
        &self,
        original_document_id: &DocumentId,
    ) -> Result<RefundSummary, RefundError> {
        let original = self
            .store
            .find_by_id(original_document_id)?
            .ok_or(RefundError::OriginalNotFound(*original_document_id))?;
        let aggregate = RefundAggregate::compute(&self.store, &original)?;

        let lines = original
            .items
            .iter()
            .enumerate()
            .map(|(index, line)| {
                let refunded = aggregate.refunded_qty(index);
                RefundableLine {
                    index,
                    description: line.description.clone(),
                    original_quantity: line.quantity,
                    refunded_quantity: refunded,
                    remaining_quantity: (line.quantity - refunded).max(0.0),
                }
            })
            .collect();

        Ok(RefundSummary {
            document_number: original.number,
            lines,
            credit_notes_total: aggregate.credit_notes_total,
            remaining: aggregate.remaining().max(0.0),
            fully_refunded: aggregate.fully_refunded(),
        })
    }

    /// Everything tail-dependent: runs inside the company chain lock.
    fn build_credit_note_draft(
        &self,
        company: CompanyId,
        original: &FiscalDocument,
        request: &RefundRequest,
    ) -> Result<DocumentDraft, RefundError> {
        let aggregate = RefundAggregate::compute(&self.store, original)?;
        let remaining = aggregate.remaining();
        if remaining <= CENT {
            return Err(RefundError::AlreadyRefunded {
                number: original.number.clone(),
            });
        }

        let selected = match request.refund_type {
            RefundType::Partial => {
                select_partial(original, &aggregate, &request.refunded_items)?
            }
            RefundType::Full => select_full(original, &aggregate)?,
        };

        let (items, total_ht, total_ttc) = scale_lines(original, &selected, &request.reason);
        if total_ttc > remaining + CENT {
            return Err(RefundError::ExceedsRefundable {
                requested: total_ttc,
                remaining,
            });
        }
        // Derived, never rounded independently: ht + tva == ttc at cents.
        let total_tva = round2(total_ttc - total_ht);

        let date = Utc::now().date_naive();
        let number = self.next_credit_note_number(&company, date.year())?;

        Ok(DocumentDraft::credit_note(
            number,
            company,
            date,
            original.customer.clone(),
            items,
            -total_ht,
            -total_tva,
            -total_ttc,
            original.id,
            Some(request.acting_user),
        )?)
    }

    /// `AVO-{fiscalYear}-{6 digits}`: highest existing suffix + 1 for the
    /// company and year. Called under the company chain lock, which is what
    /// makes the scan-then-allocate safe against concurrent refunds.
    fn next_credit_note_number(
        &self,
        company: &CompanyId,
        fiscal_year: i32,
    ) -> Result<String, StoreError> {
        let prefix = format!("AVO-{fiscal_year}-");
        let numbers = self.store.numbers_with_prefix(company, &prefix)?;
        let max = numbers
            .iter()
            .filter_map(|n| n.strip_prefix(prefix.as_str()))
            .filter_map(|suffix| suffix.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        Ok(format!("{prefix}{:06}", max + 1))
    }

    /// Best-effort refresh of the original's denormalized refund fields.
    fn refresh_original_aggregates(&self, original: FiscalDocument) -> FiscalDocument {
        let mut updated = original;

        match RefundAggregate::compute(&self.store, &updated) {
            Ok(aggregate) => {
                updated.has_credit_note = true;
                updated.credit_notes_total = aggregate.credit_notes_total;
                updated.remaining_amount = Some(aggregate.remaining().max(0.0));
            }
            Err(error) => {
                tracing::warn!(
                    number = %updated.number,
                    %error,
                    "could not recompute refund aggregates; returning stale original"
                );
                return updated;
            }
        }

        if let Err(error) = self.store.save(&updated) {
            tracing::warn!(
                number = %updated.number,
                %error,
                "failed to persist refreshed refund aggregates; credit note stands"
            );
        }
        updated
    }
}

fn select_partial(
    original: &FiscalDocument,
    aggregate: &RefundAggregate,
    requested: &[RefundedItem],
) -> Result<Vec<(usize, f64)>, RefundError> {
    if requested.is_empty() {
        return Err(RefundError::NoItemsRequested);
    }

    let mut selected = Vec::with_capacity(requested.len());
    for item in requested {
        let index = item.original_item_index;
        let line = original
            .items
            .get(index)
            .ok_or(RefundError::ItemIndexOutOfRange {
                index,
                lines: original.items.len(),
            })?;
        if item.quantity <= 0.0 {
            return Err(RefundError::InvalidQuantity {
                index,
                requested: item.quantity,
            });
        }
        let available = line.quantity - aggregate.refunded_qty(index);
        if item.quantity > available + QTY_EPSILON {
            return Err(RefundError::QuantityExceedsRemaining {
                index,
                requested: item.quantity,
                remaining: available.max(0.0),
            });
        }
        selected.push((index, item.quantity));
    }
    Ok(selected)
}

fn select_full(
    original: &FiscalDocument,
    aggregate: &RefundAggregate,
) -> Result<Vec<(usize, f64)>, RefundError> {
    let selected: Vec<(usize, f64)> = original
        .items
        .iter()
        .enumerate()
        .filter_map(|(index, line)| {
            let remaining = line.quantity - aggregate.refunded_qty(index);
            (remaining > QTY_EPSILON).then_some((index, remaining))
        })
        .collect();

    if selected.is_empty() {
        return Err(RefundError::NothingToRefund {
            number: original.number.clone(),
        });
    }
    Ok(selected)
}

/// Scale original lines down to the refunded quantities.
///
/// Per line, `ht` and `ttc` are rounded to cents independently and `tva` is
/// derived as their difference, so `ht + tva == ttc` holds exactly on every
/// generated line, whatever the scaling ratio did.
fn scale_lines(
    original: &FiscalDocument,
    selected: &[(usize, f64)],
    reason: &str,
) -> (Vec<LineItem>, f64, f64) {
    let mut items = Vec::with_capacity(selected.len());
    let mut sum_ht = 0.0;
    let mut sum_ttc = 0.0;

    for &(index, quantity) in selected {
        let line = &original.items[index];
        let ratio = quantity / line.quantity;
        let ht = round2(line.total_ht * ratio);
        let ttc = round2(line.total_ttc * ratio);
        let tva = round2(ttc - ht);

        items.push(LineItem {
            description: line.description.clone(),
            quantity,
            unit_price: line.unit_price,
            total_ht: ht,
            total_tva: tva,
            total_ttc: ttc,
            original_item_index: Some(index),
            refund_reason: Some(reason.to_string()),
        });
        sum_ht += ht;
        sum_ttc += ttc;
    }

    (items, round2(sum_ht), round2(sum_ttc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use fiscora_store::InMemoryDocumentStore;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn line(description: &str, qty: f64, ht: f64, ttc: f64) -> LineItem {
        LineItem {
            description: description.to_string(),
            quantity: qty,
            unit_price: round2(ht / qty),
            total_ht: ht,
            total_tva: round2(ttc - ht),
            total_ttc: ttc,
            original_item_index: None,
            refund_reason: None,
        }
    }

    fn ledger() -> RefundLedger<Arc<InMemoryDocumentStore>> {
        let store = Arc::new(InMemoryDocumentStore::new());
        let sealer = ChainSealer::new(Arc::clone(&store));
        RefundLedger::new(store, sealer)
    }

    fn sealed_invoice(
        ledger: &RefundLedger<Arc<InMemoryDocumentStore>>,
        company: CompanyId,
        items: Vec<LineItem>,
    ) -> FiscalDocument {
        let draft = DocumentDraft::invoice(
            "FAC-2025-000001",
            company,
            NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            "ACME",
            items,
            None,
        )
        .unwrap();
        ledger.sealer.seal(draft).unwrap()
    }

    fn partial_request(
        original: &FiscalDocument,
        items: Vec<RefundedItem>,
    ) -> RefundRequest {
        RefundRequest {
            original_document_id: original.id,
            refund_type: RefundType::Partial,
            refund_method: RefundMethod::Card,
            refunded_items: items,
            reason: "Damaged on arrival".to_string(),
            acting_user: UserId::new(),
        }
    }

    #[test]
    fn missing_reason_is_rejected_before_lookup() {
        let ledger = ledger();
        let request = RefundRequest {
            original_document_id: DocumentId::new(),
            refund_type: RefundType::Full,
            refund_method: RefundMethod::Cash,
            refunded_items: vec![],
            reason: "  ".to_string(),
            acting_user: UserId::new(),
        };
        assert!(matches!(
            ledger.create_credit_note(request),
            Err(RefundError::MissingReason)
        ));
    }

    #[test]
    fn credit_notes_cannot_be_refunded() {
        let ledger = ledger();
        let company = CompanyId::new();
        let original = sealed_invoice(&ledger, company, vec![line("Widget", 1.0, 100.0, 120.0)]);

        let outcome = ledger
            .create_credit_note(partial_request(
                &original,
                vec![RefundedItem {
                    original_item_index: 0,
                    quantity: 1.0,
                }],
            ))
            .unwrap();

        let request = partial_request(&outcome.credit_note, vec![]);
        assert!(matches!(
            ledger.create_credit_note(request),
            Err(RefundError::NotRefundable { .. })
        ));
    }

    #[test]
    fn draft_documents_cannot_be_refunded() {
        let ledger = ledger();
        let company = CompanyId::new();
        let mut original =
            sealed_invoice(&ledger, company, vec![line("Widget", 1.0, 100.0, 120.0)]);
        original.status = DocumentStatus::Draft;
        ledger.store.save(&original).unwrap();

        let err = ledger
            .create_credit_note(partial_request(
                &original,
                vec![RefundedItem {
                    original_item_index: 0,
                    quantity: 1.0,
                }],
            ))
            .unwrap_err();
        assert!(matches!(err, RefundError::DraftDocument { .. }));
    }

    #[test]
    fn full_selection_over_exhausted_lines_has_nothing_to_refund() {
        let ledger = ledger();
        let company = CompanyId::new();
        let original = sealed_invoice(&ledger, company, vec![line("Widget", 2.0, 50.0, 60.0)]);

        let mut aggregate = RefundAggregate::default();
        aggregate.refunded_qty_by_index.insert(0, 2.0);

        let err = select_full(&original, &aggregate).unwrap_err();
        assert!(matches!(err, RefundError::NothingToRefund { .. }));
    }

    #[test]
    fn out_of_range_index_names_the_offender() {
        let ledger = ledger();
        let company = CompanyId::new();
        let original = sealed_invoice(&ledger, company, vec![line("Widget", 2.0, 50.0, 60.0)]);

        let err = ledger
            .create_credit_note(partial_request(
                &original,
                vec![RefundedItem {
                    original_item_index: 3,
                    quantity: 1.0,
                }],
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            RefundError::ItemIndexOutOfRange { index: 3, lines: 1 }
        ));
    }

    #[test]
    fn quantity_beyond_remaining_names_the_line() {
        let ledger = ledger();
        let company = CompanyId::new();
        let original = sealed_invoice(&ledger, company, vec![line("Widget", 2.0, 50.0, 60.0)]);

        ledger
            .create_credit_note(partial_request(
                &original,
                vec![RefundedItem {
                    original_item_index: 0,
                    quantity: 1.0,
                }],
            ))
            .unwrap();

        let err = ledger
            .create_credit_note(partial_request(
                &original,
                vec![RefundedItem {
                    original_item_index: 0,
                    quantity: 2.0,
                }],
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            RefundError::QuantityExceedsRemaining { index: 0, .. }
        ));
    }

    #[test]
    fn credit_note_number_series_increments_per_company_and_year() {
        let ledger = ledger();
        let company = CompanyId::new();
        let original = sealed_invoice(
            &ledger,
            company,
            vec![line("Widget", 4.0, 100.0, 120.0)],
        );

        let one = RefundedItem {
            original_item_index: 0,
            quantity: 1.0,
        };
        let year = Utc::now().date_naive().year();
        let first = ledger
            .create_credit_note(partial_request(&original, vec![one.clone()]))
            .unwrap();
        let second = ledger
            .create_credit_note(partial_request(&original, vec![one]))
            .unwrap();

        assert_eq!(first.credit_note.number, format!("AVO-{year}-000001"));
        assert_eq!(second.credit_note.number, format!("AVO-{year}-000002"));
    }

    proptest! {
        /// Property: every generated credit-note line satisfies the rounding
        /// identity `ht + tva == ttc` exactly at cent granularity.
        #[test]
        fn scaled_lines_preserve_the_rounding_identity(
            qty in 1u32..50,
            requested in 1u32..50,
            ht in 0.01f64..5_000.0,
            vat_rate in 0.0f64..0.3,
        ) {
            let qty = f64::from(qty);
            let requested = f64::from(requested.min(qty as u32));
            let ht = round2(ht);
            let ttc = round2(ht * (1.0 + vat_rate));

            let original_line = LineItem {
                description: "Widget".to_string(),
                quantity: qty,
                unit_price: round2(ht / qty),
                total_ht: ht,
                total_tva: round2(ttc - ht),
                total_ttc: ttc,
                original_item_index: None,
                refund_reason: None,
            };
            let draft = DocumentDraft::invoice(
                "FAC-1",
                CompanyId::new(),
                NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
                "ACME",
                vec![original_line],
                None,
            ).unwrap();
            let original = draft.seal(1, fiscora_hashing::GENESIS_HASH.to_string());

            let (items, sum_ht, sum_ttc) =
                scale_lines(&original, &[(0, requested)], "why not");
            for item in &items {
                prop_assert!(
                    (round2(item.total_ht + item.total_tva) - item.total_ttc).abs() < 1e-9
                );
            }
            prop_assert!((round2(sum_ht + round2(sum_ttc - sum_ht)) - sum_ttc).abs() < 1e-9);
        }
    }
}
