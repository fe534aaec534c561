//! `fiscora-store` — document persistence boundary.
//!
//! This crate defines an infrastructure-facing abstraction for storing and
//! querying per-company fiscal documents without making any storage
//! assumptions. The chain and refund subsystems consume [`DocumentStore`];
//! production backends implement it, and [`InMemoryDocumentStore`] serves
//! tests and development.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryDocumentStore;
pub use r#trait::{DocumentStore, StoreError};
