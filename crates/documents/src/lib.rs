//! `fiscora-documents` — the fiscal document model.
//!
//! A [`FiscalDocument`] is a sealed business record (invoice, POS ticket or
//! credit note) that participates in its company's append-only hash chain.
//! Unsealed documents are represented by [`DocumentDraft`] and only become
//! `FiscalDocument`s through sealing, which assigns the sequence number,
//! previous hash and hash atomically.

pub mod document;
pub mod draft;

pub use document::{ChainScope, DocumentStatus, FiscalDocument, InvoiceType, LineItem};
pub use draft::DocumentDraft;
