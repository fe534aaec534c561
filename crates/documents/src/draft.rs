use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use fiscora_core::{CENT, CompanyId, DocumentId, DomainError, DomainResult, UserId, round2};

use crate::document::{DocumentStatus, FiscalDocument, InvoiceType, LineItem};

/// An unsealed document: everything except the chain fields.
///
/// Drafts carry no `sequence_number`, `previous_hash` or `hash`; those are
/// assigned atomically by sealing, under the owning company's chain lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDraft {
    pub number: String,
    pub owner_company: CompanyId,
    pub invoice_type: InvoiceType,
    pub is_pos_ticket: bool,
    pub date: NaiveDate,
    pub fiscal_year: i32,
    pub customer: String,
    pub items: Vec<LineItem>,
    pub total_ht: f64,
    pub total_tva: f64,
    pub total_ttc: f64,
    pub original_invoice_id: Option<DocumentId>,
    pub status: DocumentStatus,
    pub created_by: Option<UserId>,
}

impl DocumentDraft {
    /// Draft an invoice; totals are derived from the lines.
    pub fn invoice(
        number: impl Into<String>,
        owner_company: CompanyId,
        date: NaiveDate,
        customer: impl Into<String>,
        items: Vec<LineItem>,
        created_by: Option<UserId>,
    ) -> DomainResult<Self> {
        Self::issued(
            number,
            owner_company,
            InvoiceType::Invoice,
            false,
            date,
            customer,
            items,
            created_by,
        )
    }

    /// Draft a POS ticket; same sequence space, same sealing path.
    pub fn pos_ticket(
        number: impl Into<String>,
        owner_company: CompanyId,
        date: NaiveDate,
        customer: impl Into<String>,
        items: Vec<LineItem>,
        created_by: Option<UserId>,
    ) -> DomainResult<Self> {
        Self::issued(
            number,
            owner_company,
            InvoiceType::Invoice,
            true,
            date,
            customer,
            items,
            created_by,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn issued(
        number: impl Into<String>,
        owner_company: CompanyId,
        invoice_type: InvoiceType,
        is_pos_ticket: bool,
        date: NaiveDate,
        customer: impl Into<String>,
        items: Vec<LineItem>,
        created_by: Option<UserId>,
    ) -> DomainResult<Self> {
        if items.is_empty() {
            return Err(DomainError::validation("cannot draft a document without lines"));
        }
        for (index, line) in items.iter().enumerate() {
            if line.quantity <= 0.0 {
                return Err(DomainError::validation(format!(
                    "line {index} quantity must be positive"
                )));
            }
        }

        let total_ht = round2(items.iter().map(|l| l.total_ht).sum());
        let total_ttc = round2(items.iter().map(|l| l.total_ttc).sum());
        // Derived, never summed independently: keeps ht + tva == ttc exact.
        let total_tva = round2(total_ttc - total_ht);

        let draft = Self {
            number: number.into(),
            owner_company,
            invoice_type,
            is_pos_ticket,
            date,
            fiscal_year: date.year(),
            customer: customer.into(),
            items,
            total_ht,
            total_tva,
            total_ttc,
            original_invoice_id: None,
            status: DocumentStatus::Issued,
            created_by,
        };
        draft.validate()?;
        Ok(draft)
    }

    /// Draft a credit note with explicit (negative) totals.
    ///
    /// Lines stay positive (they describe refunded quantities); the document
    /// totals carry the sign.
    #[allow(clippy::too_many_arguments)]
    pub fn credit_note(
        number: impl Into<String>,
        owner_company: CompanyId,
        date: NaiveDate,
        customer: impl Into<String>,
        items: Vec<LineItem>,
        total_ht: f64,
        total_tva: f64,
        total_ttc: f64,
        original_invoice_id: DocumentId,
        created_by: Option<UserId>,
    ) -> DomainResult<Self> {
        let draft = Self {
            number: number.into(),
            owner_company,
            invoice_type: InvoiceType::CreditNote,
            is_pos_ticket: false,
            date,
            fiscal_year: date.year(),
            customer: customer.into(),
            items,
            total_ht: round2(total_ht),
            total_tva: round2(total_tva),
            total_ttc: round2(total_ttc),
            original_invoice_id: Some(original_invoice_id),
            status: DocumentStatus::Issued,
            created_by,
        };
        draft.validate()?;
        Ok(draft)
    }

    /// Structural validation ahead of sealing.
    pub fn validate(&self) -> DomainResult<()> {
        if self.number.trim().is_empty() {
            return Err(DomainError::validation("document number is required"));
        }
        if self.customer.trim().is_empty() {
            return Err(DomainError::validation("customer is required"));
        }
        if (self.total_ht + self.total_tva - self.total_ttc).abs() >= CENT {
            return Err(DomainError::invariant(format!(
                "totals are inconsistent: {} + {} != {}",
                self.total_ht, self.total_tva, self.total_ttc
            )));
        }
        if !self.items.is_empty() {
            let lines_ttc: f64 = self.items.iter().map(|l| l.total_ttc).sum();
            if (round2(lines_ttc) - self.total_ttc.abs()).abs() >= CENT {
                return Err(DomainError::invariant(format!(
                    "line totals {} do not match document total {}",
                    round2(lines_ttc),
                    self.total_ttc
                )));
            }
        }
        if self.invoice_type == InvoiceType::CreditNote && self.original_invoice_id.is_none() {
            return Err(DomainError::validation(
                "credit notes must reference an original document",
            ));
        }
        Ok(())
    }

    /// Seal the draft: assign the chain fields and compute the hash.
    ///
    /// Callers must hold the company chain lock; the draft is consumed so a
    /// document can only be sealed once.
    pub fn seal(self, sequence_number: u64, previous_hash: String) -> FiscalDocument {
        let mut doc = FiscalDocument {
            id: DocumentId::new(),
            number: self.number,
            owner_company: self.owner_company,
            invoice_type: self.invoice_type,
            is_pos_ticket: self.is_pos_ticket,
            date: self.date,
            fiscal_year: self.fiscal_year,
            customer: self.customer,
            items: self.items,
            total_ht: self.total_ht,
            total_tva: self.total_tva,
            total_ttc: self.total_ttc,
            sequence_number,
            previous_hash,
            hash: String::new(),
            is_locked: true,
            original_invoice_id: self.original_invoice_id,
            status: self.status,
            has_credit_note: false,
            credit_notes_total: 0.0,
            remaining_amount: None,
            created_by: self.created_by,
            created_at: Utc::now(),
        };
        doc.hash = doc.compute_hash();
        doc
    }
}
