//! `fiscora-refunds` — the credit-note (refund) ledger.
//!
//! A credit note partially or fully reverses an invoice while preserving two
//! conservation invariants: the sum of credit-note amounts referencing an
//! original never exceeds the original's amount (plus the cent tolerance),
//! and per-line refunded quantities never exceed what the original sold.
//! Credit notes are sealed into the same per-company hash chain as every
//! other document.

pub mod aggregate;
pub mod error;
pub mod ledger;

pub use aggregate::{RefundAggregate, RefundSummary, RefundableLine};
pub use error::RefundError;
pub use ledger::{
    RefundLedger, RefundMethod, RefundOutcome, RefundRequest, RefundType, RefundedItem,
};
