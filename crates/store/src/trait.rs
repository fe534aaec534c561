use thiserror::Error;

use std::sync::Arc;

use fiscora_core::{CompanyId, DocumentId};
use fiscora_documents::{ChainScope, FiscalDocument};

/// Document store operation error.
///
/// These are **infrastructure errors** (storage, locking) as opposed to
/// domain errors (validation, invariants). During bulk chain repair they are
/// counted and the run continues; on single-document paths they abort the
/// operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found")]
    NotFound,

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Per-company document persistence.
///
/// ## Query Semantics
///
/// - `find_by_owner_ordered` returns a company's chain-eligible documents in
///   ascending `sequence_number` order, filtered by [`ChainScope`].
/// - `find_predecessor` resolves the document holding an exact sequence
///   number; with `include_all_types` it searches the full sequence space
///   (POS tickets included) even when the caller is operating on a
///   fiscal-only scope.
/// - `chain_tail` returns the highest-sequence document for a company, the
///   document every new seal links to.
/// - `numbers_with_prefix` supports numbering-series allocation
///   (`AVO-{year}-` scans).
///
/// ## Write Semantics
///
/// `save` upserts by document id. The store never assigns chain fields;
/// sealing and repair own those. Implementations must keep per-company
/// ordering stable under upserts.
pub trait DocumentStore: Send + Sync {
    /// A company's documents, ascending by `sequence_number`, scope-filtered.
    fn find_by_owner_ordered(
        &self,
        company: &CompanyId,
        scope: ChainScope,
    ) -> Result<Vec<FiscalDocument>, StoreError>;

    /// The document holding exactly `sequence_number` for this company.
    fn find_predecessor(
        &self,
        company: &CompanyId,
        sequence_number: u64,
        include_all_types: bool,
    ) -> Result<Option<FiscalDocument>, StoreError>;

    fn find_by_id(&self, id: &DocumentId) -> Result<Option<FiscalDocument>, StoreError>;

    /// All credit notes referencing `original` via `original_invoice_id`.
    fn find_credit_notes(
        &self,
        original: &DocumentId,
    ) -> Result<Vec<FiscalDocument>, StoreError>;

    /// The company's current chain tail (highest sequence number), if any.
    fn chain_tail(&self, company: &CompanyId) -> Result<Option<FiscalDocument>, StoreError>;

    /// Document numbers of this company starting with `prefix`.
    fn numbers_with_prefix(
        &self,
        company: &CompanyId,
        prefix: &str,
    ) -> Result<Vec<String>, StoreError>;

    /// Every company with at least one stored document.
    fn companies(&self) -> Result<Vec<CompanyId>, StoreError>;

    /// Upsert a document by id.
    fn save(&self, doc: &FiscalDocument) -> Result<(), StoreError>;
}

impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    fn find_by_owner_ordered(
        &self,
        company: &CompanyId,
        scope: ChainScope,
    ) -> Result<Vec<FiscalDocument>, StoreError> {
        (**self).find_by_owner_ordered(company, scope)
    }

    fn find_predecessor(
        &self,
        company: &CompanyId,
        sequence_number: u64,
        include_all_types: bool,
    ) -> Result<Option<FiscalDocument>, StoreError> {
        (**self).find_predecessor(company, sequence_number, include_all_types)
    }

    fn find_by_id(&self, id: &DocumentId) -> Result<Option<FiscalDocument>, StoreError> {
        (**self).find_by_id(id)
    }

    fn find_credit_notes(
        &self,
        original: &DocumentId,
    ) -> Result<Vec<FiscalDocument>, StoreError> {
        (**self).find_credit_notes(original)
    }

    fn chain_tail(&self, company: &CompanyId) -> Result<Option<FiscalDocument>, StoreError> {
        (**self).chain_tail(company)
    }

    fn numbers_with_prefix(
        &self,
        company: &CompanyId,
        prefix: &str,
    ) -> Result<Vec<String>, StoreError> {
        (**self).numbers_with_prefix(company, prefix)
    }

    fn companies(&self) -> Result<Vec<CompanyId>, StoreError> {
        (**self).companies()
    }

    fn save(&self, doc: &FiscalDocument) -> Result<(), StoreError> {
        (**self).save(doc)
    }
}
