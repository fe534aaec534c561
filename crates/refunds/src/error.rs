use thiserror::Error;

use fiscora_chain::ChainError;
use fiscora_core::{DocumentId, DomainError};
use fiscora_store::StoreError;

/// Refund operation error.
///
/// Every validation variant is raised *before* any write; when one is
/// returned, no document was created or modified.
#[derive(Debug, Error)]
pub enum RefundError {
    #[error("original document not found: {0}")]
    OriginalNotFound(DocumentId),

    #[error("document {number} cannot be refunded: only invoices carry credit notes")]
    NotRefundable { number: String },

    #[error("document {number} is a draft and cannot be refunded")]
    DraftDocument { number: String },

    #[error("a refund reason is required")]
    MissingReason,

    #[error("document {number} is already fully refunded")]
    AlreadyRefunded { number: String },

    #[error("a partial refund requires at least one item")]
    NoItemsRequested,

    #[error("refund item index {index} is out of range (document has {lines} lines)")]
    ItemIndexOutOfRange { index: usize, lines: usize },

    #[error("refund quantity {requested} for line {index} must be positive")]
    InvalidQuantity { index: usize, requested: f64 },

    #[error("refund quantity {requested} for line {index} exceeds the remaining {remaining}")]
    QuantityExceedsRemaining {
        index: usize,
        requested: f64,
        remaining: f64,
    },

    #[error("nothing left to refund on document {number}")]
    NothingToRefund { number: String },

    #[error("refund total {requested:.2} exceeds refundable amount {remaining:.2}")]
    ExceedsRefundable { requested: f64, remaining: f64 },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Chain(#[from] ChainError),
}
