use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use fiscora_core::{CompanyId, DocumentId, UserId};
use fiscora_hashing::{hash_from_map, money_value, normalize_date};

/// Kind of fiscal document (the tag of the invoice/credit-note union).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    Invoice,
    CreditNote,
}

impl InvoiceType {
    /// Canonical wire/hash representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceType::Invoice => "invoice",
            InvoiceType::CreditNote => "credit_note",
        }
    }
}

/// Document status lifecycle.
///
/// Drafts are never sealed into the chain and can never be refunded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Draft,
    Issued,
    Paid,
    Cancelled,
}

/// Which documents a chain operation looks at.
///
/// All document types share one sequence space per company, so the `Fiscal`
/// scope (invoices and credit notes only) can see sequence gaps where POS
/// tickets sit; predecessor lookups fall through to the full space there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainScope {
    /// Every chain-eligible document (invoices, credit notes, POS tickets).
    Full,
    /// Invoices and credit notes only.
    Fiscal,
}

impl ChainScope {
    pub fn includes(&self, doc: &FiscalDocument) -> bool {
        match self {
            ChainScope::Full => true,
            ChainScope::Fiscal => !doc.is_pos_ticket,
        }
    }
}

/// One line of a document.
///
/// On credit-note lines, `original_item_index` points back into the original
/// document's `items` and `refund_reason` carries the stated reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub total_ht: f64,
    pub total_tva: f64,
    pub total_ttc: f64,
    #[serde(default)]
    pub original_item_index: Option<usize>,
    #[serde(default)]
    pub refund_reason: Option<String>,
}

/// A sealed fiscal document.
///
/// Once `is_locked` is true the hashed fields are immutable; only the chain
/// repairer may rewrite `previous_hash`/`hash` to fix detected corruption.
/// The denormalized refund aggregates (`has_credit_note`,
/// `credit_notes_total`, `remaining_amount`) sit outside the hash whitelist
/// and stay mutable; they can be recomputed from the credit notes at any
/// time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiscalDocument {
    pub id: DocumentId,
    /// Unique human-facing number, e.g. `FAC-2025-000042` or `AVO-2025-000003`.
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
    /// Per-company position in the chain, shared across all document types.
    pub sequence_number: u64,
    pub previous_hash: String,
    pub hash: String,
    pub is_locked: bool,
    /// Set only on credit notes; references the refunded document.
    #[serde(default)]
    pub original_invoice_id: Option<DocumentId>,
    pub status: DocumentStatus,
    #[serde(default)]
    pub has_credit_note: bool,
    #[serde(default)]
    pub credit_notes_total: f64,
    #[serde(default)]
    pub remaining_amount: Option<f64>,
    #[serde(default)]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl FiscalDocument {
    /// The whitelisted field map the document hash is computed over.
    ///
    /// Exactly these fields and nothing else: `customer`, `date`
    /// (normalized), `fiscalYear`, `invoiceType`, `number`, `ownerCompany`,
    /// `previousHash`, `sequenceNumber`, `totalHt`, `totalTtc`, `totalTva`,
    /// plus `originalInvoiceId` only when set. Items, status and the
    /// denormalized aggregates never influence the hash.
    pub fn hash_fields(&self, previous_hash: &str) -> BTreeMap<String, Value> {
        let date = self.date.format("%Y-%m-%d").to_string();
        let mut fields = BTreeMap::new();
        fields.insert("customer".to_string(), Value::from(self.customer.as_str()));
        fields.insert(
            "date".to_string(),
            Value::from(normalize_date(&date).to_string()),
        );
        fields.insert("fiscalYear".to_string(), Value::from(self.fiscal_year));
        fields.insert(
            "invoiceType".to_string(),
            Value::from(self.invoice_type.as_str()),
        );
        fields.insert("number".to_string(), Value::from(self.number.as_str()));
        fields.insert(
            "ownerCompany".to_string(),
            Value::from(self.owner_company.to_string()),
        );
        fields.insert("previousHash".to_string(), Value::from(previous_hash));
        fields.insert(
            "sequenceNumber".to_string(),
            Value::from(self.sequence_number),
        );
        fields.insert("totalHt".to_string(), money_value(self.total_ht));
        fields.insert("totalTtc".to_string(), money_value(self.total_ttc));
        fields.insert("totalTva".to_string(), money_value(self.total_tva));
        if let Some(original) = &self.original_invoice_id {
            fields.insert(
                "originalInvoiceId".to_string(),
                Value::from(original.to_string()),
            );
        }
        fields
    }

    /// Recompute the document hash from its stored `previous_hash`.
    pub fn compute_hash(&self) -> String {
        hash_from_map(&self.hash_fields(&self.previous_hash))
    }

    /// Recompute the document hash with a substituted previous hash.
    ///
    /// Used by the verifier/repairer to evaluate what the hash *should* be
    /// once the chain link is corrected, without mutating the document.
    pub fn compute_hash_with_previous(&self, previous_hash: &str) -> String {
        hash_from_map(&self.hash_fields(previous_hash))
    }
}
