use thiserror::Error;

use fiscora_core::DomainError;
use fiscora_store::StoreError;

/// Chain operation error.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A migration finished but anomalies remain: the chain did not
    /// converge and needs investigation, not another blind repair run.
    #[error("chain integrity violation: {remaining} anomalies remain after repair")]
    IntegrityViolation { remaining: usize },
}
