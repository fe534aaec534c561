use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use fiscora_core::CompanyId;
use fiscora_documents::{DocumentDraft, FiscalDocument};
use fiscora_hashing::GENESIS_HASH;
use fiscora_store::DocumentStore;

use crate::error::ChainError;

/// Keyed per-company mutual exclusion.
///
/// The company chain tail (max sequence number + its hash) is a shared
/// resource: every read-tail → seal → persist cycle for a company must be
/// serialized, and a repair run must exclude live sealing for the whole
/// company. Locks are closure-scoped so a guard can never outlive its use.
#[derive(Debug, Default)]
pub struct CompanyLocks {
    inner: Mutex<HashMap<CompanyId, Arc<Mutex<()>>>>,
}

impl CompanyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the company's chain lock.
    ///
    /// Poisoning is recovered: the guarded data is `()`, so a panic in a
    /// previous holder leaves nothing inconsistent to observe.
    pub fn with_lock<R>(&self, company: CompanyId, f: impl FnOnce() -> R) -> R {
        let lock = {
            let mut registry = self
                .inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(registry.entry(company).or_default())
        };
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}

/// Seals drafts into a company's chain.
///
/// This is the single write path for document creation: tickets, invoices
/// and credit notes all go through [`ChainSealer::seal`], which is what
/// makes the shared sequence space and the chain linkage invariant hold.
#[derive(Debug)]
pub struct ChainSealer<S> {
    store: S,
    locks: Arc<CompanyLocks>,
}

impl<S: DocumentStore> ChainSealer<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: Arc::new(CompanyLocks::new()),
        }
    }

    /// Share an existing lock registry (e.g. with a repair scheduler), so
    /// sealing and repair exclude each other per company.
    pub fn with_locks(store: S, locks: Arc<CompanyLocks>) -> Self {
        Self { store, locks }
    }

    pub fn locks(&self) -> &Arc<CompanyLocks> {
        &self.locks
    }

    /// Seal a draft: read tail, assign `sequence_number`/`previous_hash`,
    /// hash, lock and persist, atomically with respect to other sealers
    /// and repair runs for the same company.
    pub fn seal(&self, draft: DocumentDraft) -> Result<FiscalDocument, ChainError> {
        let company = draft.owner_company;
        self.seal_with(company, move || Ok::<_, ChainError>(draft))
    }

    /// Seal a draft built *inside* the company lock.
    ///
    /// Lets callers make tail-dependent decisions (number allocation,
    /// remaining-amount validation) in the same critical section that
    /// seals, without re-entering the non-reentrant company lock.
    pub fn seal_with<E>(
        &self,
        company: CompanyId,
        build: impl FnOnce() -> Result<DocumentDraft, E>,
    ) -> Result<FiscalDocument, E>
    where
        E: From<ChainError>,
    {
        self.locks.with_lock(company, || {
            let draft = build()?;
            draft.validate().map_err(ChainError::from).map_err(E::from)?;

            let tail = self
                .store
                .chain_tail(&company)
                .map_err(ChainError::from)
                .map_err(E::from)?;
            let (sequence_number, previous_hash) = match tail {
                Some(tail) => (tail.sequence_number + 1, tail.hash),
                None => (1, GENESIS_HASH.to_string()),
            };

            let doc = draft.seal(sequence_number, previous_hash);
            self.store
                .save(&doc)
                .map_err(ChainError::from)
                .map_err(E::from)?;

            tracing::debug!(
                company = %company,
                number = %doc.number,
                sequence_number = doc.sequence_number,
                "document sealed into chain"
            );
            Ok(doc)
        })
    }
}
