use std::collections::HashMap;

use serde::Serialize;

use fiscora_core::{CompanyId, DocumentId};
use fiscora_documents::ChainScope;
use fiscora_store::{DocumentStore, StoreError};

use crate::error::ChainError;
use crate::seal::CompanyLocks;
use crate::verify::{DiagnosisReport, diagnose, expected_previous_hash};

/// A document the repairer could not persist.
#[derive(Debug, Serialize)]
pub struct RepairError {
    pub owner_company: CompanyId,
    pub document_id: DocumentId,
    pub document_number: String,
    pub sequence_number: u64,
    #[serde(skip)]
    pub error: StoreError,
}

/// Outcome of a repair run.
///
/// Bulk repair is best-effort: per-document persistence failures land in
/// `errors` and the run continues, so the report is always complete even
/// when some documents could not be fixed.
#[derive(Debug, Default, Serialize)]
pub struct RepairReport {
    pub scanned: usize,
    /// Documents corrected (or, under `dry_run`, that would be corrected).
    pub updated: usize,
    pub errors: Vec<RepairError>,
}

impl RepairReport {
    fn merge(&mut self, other: RepairReport) {
        self.scanned += other.scanned;
        self.updated += other.updated;
        self.errors.extend(other.errors);
    }
}

/// Repair chains: relink and rehash documents in sequence order.
///
/// Corrections feed forward (fixing document *n* changes the hash that
/// document *n + 1* must link to), so each company is processed strictly
/// ascending, under that company's chain lock for the whole run.
/// With `dry_run` every computation still happens on speculative copies and
/// the report counts what would change, but nothing is written.
pub fn repair<S: DocumentStore>(
    store: &S,
    locks: &CompanyLocks,
    scope: ChainScope,
    company: Option<&CompanyId>,
    dry_run: bool,
) -> Result<RepairReport, ChainError> {
    let companies = match company {
        Some(c) => vec![*c],
        None => store.companies()?,
    };

    let mut report = RepairReport::default();
    for company in &companies {
        let company_report =
            locks.with_lock(*company, || repair_company(store, *company, scope, dry_run))?;
        report.merge(company_report);
    }

    tracing::info!(
        scanned = report.scanned,
        updated = report.updated,
        errors = report.errors.len(),
        dry_run,
        "chain repair complete"
    );
    Ok(report)
}

fn repair_company<S: DocumentStore>(
    store: &S,
    company: CompanyId,
    scope: ChainScope,
    dry_run: bool,
) -> Result<RepairReport, ChainError> {
    let docs = store.find_by_owner_ordered(&company, scope)?;
    let mut report = RepairReport::default();

    // Hashes as they stand *after* this run: corrections recorded here feed
    // the expected previous hash of every later document, including under
    // dry_run (the simulation must cascade the same way a real run would).
    let mut corrected: HashMap<u64, String> = HashMap::new();

    for doc in &docs {
        report.scanned += 1;

        let expected_prev = match corrected.get(&(doc.sequence_number.wrapping_sub(1))) {
            Some(hash) if doc.sequence_number > 1 => Some(hash.clone()),
            _ => expected_previous_hash(store, &company, doc, None)?,
        };
        let Some(expected_prev) = expected_prev else {
            tracing::warn!(
                company = %company,
                number = %doc.number,
                sequence_number = doc.sequence_number,
                "predecessor missing; leaving link untouched"
            );
            corrected.insert(doc.sequence_number, doc.hash.clone());
            continue;
        };

        let mut candidate = doc.clone();
        let mut changed = false;

        if candidate.previous_hash != expected_prev {
            candidate.previous_hash = expected_prev;
            changed = true;
        }

        let recomputed = candidate.compute_hash();
        if candidate.hash != recomputed {
            candidate.hash = recomputed;
            changed = true;
        }

        // Later links chain onto the intended final hash even if this
        // document's own save fails below.
        corrected.insert(candidate.sequence_number, candidate.hash.clone());

        if !changed {
            continue;
        }
        report.updated += 1;

        if dry_run {
            continue;
        }
        if let Err(error) = store.save(&candidate) {
            tracing::warn!(
                company = %company,
                number = %candidate.number,
                sequence_number = candidate.sequence_number,
                %error,
                "failed to persist repaired document; continuing"
            );
            report.errors.push(RepairError {
                owner_company: company,
                document_id: candidate.id,
                document_number: candidate.number.clone(),
                sequence_number: candidate.sequence_number,
                error,
            });
        }
    }

    Ok(report)
}

/// Outcome of a full migration (diagnose → repair → re-diagnose).
#[derive(Debug, Serialize)]
pub struct MigrationReport {
    pub initial: DiagnosisReport,
    /// `None` when the initial diagnosis was already clean.
    pub repair: Option<RepairReport>,
    pub remaining: usize,
}

/// Diagnose, repair if needed, and confirm convergence.
///
/// Errors with [`ChainError::IntegrityViolation`] when anomalies survive the
/// repair pass: that means corruption the relink/rehash cycle cannot
/// express, and it should be looked at rather than retried.
pub fn run_full_migration<S: DocumentStore>(
    store: &S,
    locks: &CompanyLocks,
    scope: ChainScope,
) -> Result<MigrationReport, ChainError> {
    let initial = diagnose(store, scope, None)?;
    if initial.is_clean() {
        tracing::info!(scanned = initial.scanned, "chains already consistent");
        return Ok(MigrationReport {
            initial,
            repair: None,
            remaining: 0,
        });
    }

    tracing::info!(
        anomalies = initial.anomalies.len(),
        "anomalies detected; repairing"
    );
    let repair_report = repair(store, locks, scope, None, false)?;

    let confirmation = diagnose(store, scope, None)?;
    let remaining = confirmation.anomalies.len();
    if remaining > 0 {
        tracing::error!(remaining, "chain repair did not converge");
        return Err(ChainError::IntegrityViolation { remaining });
    }

    Ok(MigrationReport {
        initial,
        repair: Some(repair_report),
        remaining,
    })
}
