//! `fiscora-hashing` — canonical document hashing.
//!
//! Every sealed document carries a SHA-256 digest over a whitelisted field
//! set, canonicalized so that the digest is independent of any in-memory
//! field order. The same canonicalization is reusable for other hash-chained
//! ledgers (e.g. audit-log chaining) via [`hash_from_map`].

pub mod canonical;

pub use canonical::{GENESIS_HASH, hash_from_map, money_value, normalize_date, sha256_hex};
