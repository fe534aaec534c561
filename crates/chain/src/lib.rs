//! `fiscora-chain` — per-company document integrity chain.
//!
//! Three concerns live here:
//!
//! - **Sealing** ([`ChainSealer`]): the only way a draft becomes a sealed
//!   document. Reads the company's chain tail, assigns the next sequence
//!   number and previous hash, computes the hash and persists, all inside
//!   that company's chain lock, so concurrent creations can never read the
//!   same tail.
//! - **Verification** ([`diagnose`]): a read-only scan reporting hash
//!   mismatches and broken links as [`ChainAnomaly`] records.
//! - **Repair** ([`repair`], [`run_full_migration`]): sequential, best-effort
//!   correction that feeds each corrected hash forward into the next link.

pub mod error;
pub mod repair;
pub mod seal;
pub mod verify;

pub use error::ChainError;
pub use repair::{MigrationReport, RepairError, RepairReport, repair, run_full_migration};
pub use seal::{ChainSealer, CompanyLocks};
pub use verify::{ChainAnomaly, DiagnosisReport, diagnose};
