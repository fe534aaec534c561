use std::collections::HashMap;
use std::sync::RwLock;

use fiscora_core::{CompanyId, DocumentId};
use fiscora_documents::{ChainScope, FiscalDocument, InvoiceType};

use super::r#trait::{DocumentStore, StoreError};

/// In-memory document store.
///
/// Intended for tests/dev. Documents are bucketed per company and kept in
/// ascending `sequence_number` order under upserts. Not optimized for
/// performance.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    companies: RwLock<HashMap<CompanyId, Vec<FiscalDocument>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored documents, across companies.
    pub fn len(&self) -> usize {
        self.companies
            .read()
            .map(|map| map.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn find_by_owner_ordered(
        &self,
        company: &CompanyId,
        scope: ChainScope,
    ) -> Result<Vec<FiscalDocument>, StoreError> {
        let map = self.companies.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map
            .get(company)
            .map(|docs| {
                docs.iter()
                    .filter(|d| scope.includes(d))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn find_predecessor(
        &self,
        company: &CompanyId,
        sequence_number: u64,
        include_all_types: bool,
    ) -> Result<Option<FiscalDocument>, StoreError> {
        let map = self.companies.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.get(company).and_then(|docs| {
            docs.iter()
                .filter(|d| include_all_types || !d.is_pos_ticket)
                .find(|d| d.sequence_number == sequence_number)
                .cloned()
        }))
    }

    fn find_by_id(&self, id: &DocumentId) -> Result<Option<FiscalDocument>, StoreError> {
        let map = self.companies.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map
            .values()
            .flat_map(|docs| docs.iter())
            .find(|d| d.id == *id)
            .cloned())
    }

    fn find_credit_notes(
        &self,
        original: &DocumentId,
    ) -> Result<Vec<FiscalDocument>, StoreError> {
        let map = self.companies.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map
            .values()
            .flat_map(|docs| docs.iter())
            .filter(|d| {
                d.invoice_type == InvoiceType::CreditNote
                    && d.original_invoice_id.as_ref() == Some(original)
            })
            .cloned()
            .collect())
    }

    fn chain_tail(&self, company: &CompanyId) -> Result<Option<FiscalDocument>, StoreError> {
        let map = self.companies.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.get(company).and_then(|docs| docs.last().cloned()))
    }

    fn numbers_with_prefix(
        &self,
        company: &CompanyId,
        prefix: &str,
    ) -> Result<Vec<String>, StoreError> {
        let map = self.companies.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map
            .get(company)
            .map(|docs| {
                docs.iter()
                    .filter(|d| d.number.starts_with(prefix))
                    .map(|d| d.number.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn companies(&self) -> Result<Vec<CompanyId>, StoreError> {
        let map = self.companies.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut companies: Vec<CompanyId> = map.keys().copied().collect();
        companies.sort_by(|a, b| a.as_uuid().cmp(b.as_uuid()));
        Ok(companies)
    }

    fn save(&self, doc: &FiscalDocument) -> Result<(), StoreError> {
        let mut map = self.companies.write().map_err(|_| StoreError::LockPoisoned)?;
        let docs = map.entry(doc.owner_company).or_default();

        if let Some(existing) = docs.iter_mut().find(|d| d.id == doc.id) {
            *existing = doc.clone();
        } else {
            docs.push(doc.clone());
        }
        // Keep the chain walkable without re-sorting on every read.
        docs.sort_by_key(|d| d.sequence_number);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use fiscora_documents::{DocumentDraft, LineItem};
    use fiscora_hashing::GENESIS_HASH;

    fn line(ht: f64, tva: f64) -> LineItem {
        LineItem {
            description: "Item".to_string(),
            quantity: 1.0,
            unit_price: ht,
            total_ht: ht,
            total_tva: tva,
            total_ttc: ht + tva,
            original_item_index: None,
            refund_reason: None,
        }
    }

    fn sealed(
        company: CompanyId,
        number: &str,
        seq: u64,
        prev: &str,
        pos_ticket: bool,
    ) -> FiscalDocument {
        let date = NaiveDate::from_ymd_opt(2025, 4, 2).unwrap();
        let draft = if pos_ticket {
            DocumentDraft::pos_ticket(number, company, date, "Walk-in", vec![line(10.0, 2.0)], None)
        } else {
            DocumentDraft::invoice(number, company, date, "ACME", vec![line(10.0, 2.0)], None)
        }
        .unwrap();
        draft.seal(seq, prev.to_string())
    }

    fn chained(company: CompanyId, specs: &[(&str, bool)]) -> Vec<FiscalDocument> {
        let mut docs = Vec::new();
        let mut prev = GENESIS_HASH.to_string();
        for (seq, (number, pos)) in specs.iter().enumerate() {
            let doc = sealed(company, number, seq as u64 + 1, &prev, *pos);
            prev = doc.hash.clone();
            docs.push(doc);
        }
        docs
    }

    #[test]
    fn find_by_owner_is_ordered_and_scope_filtered() {
        let store = InMemoryDocumentStore::new();
        let company = CompanyId::new();
        // Insert out of order; ticket sits at seq 2.
        let docs = chained(company, &[("FAC-1", false), ("TKT-1", true), ("FAC-2", false)]);
        for doc in docs.iter().rev() {
            store.save(doc).unwrap();
        }

        let full = store.find_by_owner_ordered(&company, ChainScope::Full).unwrap();
        assert_eq!(
            full.iter().map(|d| d.sequence_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let fiscal = store.find_by_owner_ordered(&company, ChainScope::Fiscal).unwrap();
        assert_eq!(
            fiscal.iter().map(|d| d.number.as_str()).collect::<Vec<_>>(),
            vec!["FAC-1", "FAC-2"]
        );
    }

    #[test]
    fn predecessor_lookup_honors_type_inclusion() {
        let store = InMemoryDocumentStore::new();
        let company = CompanyId::new();
        for doc in chained(company, &[("FAC-1", false), ("TKT-1", true)]) {
            store.save(&doc).unwrap();
        }

        let ticket = store.find_predecessor(&company, 2, true).unwrap().unwrap();
        assert_eq!(ticket.number, "TKT-1");

        assert!(store.find_predecessor(&company, 2, false).unwrap().is_none());
    }

    #[test]
    fn chain_tail_is_the_highest_sequence() {
        let store = InMemoryDocumentStore::new();
        let company = CompanyId::new();
        for doc in chained(company, &[("FAC-1", false), ("FAC-2", false)]) {
            store.save(&doc).unwrap();
        }

        let tail = store.chain_tail(&company).unwrap().unwrap();
        assert_eq!(tail.number, "FAC-2");
        assert!(store.chain_tail(&CompanyId::new()).unwrap().is_none());
    }

    #[test]
    fn save_upserts_by_id() {
        let store = InMemoryDocumentStore::new();
        let company = CompanyId::new();
        let mut doc = sealed(company, "FAC-1", 1, GENESIS_HASH, false);
        store.save(&doc).unwrap();

        doc.has_credit_note = true;
        store.save(&doc).unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.find_by_id(&doc.id).unwrap().unwrap().has_credit_note);
    }

    #[test]
    fn numbers_with_prefix_scopes_to_company() {
        let store = InMemoryDocumentStore::new();
        let company = CompanyId::new();
        let other = CompanyId::new();
        for doc in chained(company, &[("AVO-2025-000001", false), ("FAC-1", false)]) {
            store.save(&doc).unwrap();
        }
        for doc in chained(other, &[("AVO-2025-000002", false)]) {
            store.save(&doc).unwrap();
        }

        let numbers = store.numbers_with_prefix(&company, "AVO-2025-").unwrap();
        assert_eq!(numbers, vec!["AVO-2025-000001"]);
    }
}
