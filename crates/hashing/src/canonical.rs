//! Canonical JSON hashing.
//!
//! The canonical form of a field map is the concatenation of every key/value
//! pair in lexicographic key order, each serialized to JSON individually
//! (key first, then value). The digest is the lowercase hex SHA-256 of that
//! byte string. Optional fields are **omitted** from the map, never encoded
//! as `null`; omission and null produce different digests.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

use fiscora_core::round2;

/// Sentinel `previous_hash` for the first document of a company's chain.
///
/// 64 zeros, the length of a SHA-256 hex digest, so the sentinel is shaped
/// like every other hash value in the chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Normalize a date representation to its first 10 characters (`YYYY-MM-DD`).
///
/// Compatibility rule: truncation is performed on whatever string is
/// supplied, so non-ISO encodings will not normalize to a calendar date.
/// Callers that hold typed dates should format them as `%Y-%m-%d` before
/// hashing; this helper exists so raw stored representations hash the same
/// way they always have.
pub fn normalize_date(raw: &str) -> &str {
    match raw.char_indices().nth(10) {
        Some((byte_idx, _)) => &raw[..byte_idx],
        None => raw,
    }
}

/// A monetary amount as a canonical JSON value (rounded to two decimals).
pub fn money_value(amount: f64) -> Value {
    Value::from(round2(amount))
}

/// SHA-256 of `bytes`, lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Digest a field map canonically.
///
/// `BTreeMap` iteration order is the lexicographic key order the canonical
/// form requires. Pure and total: there are no error conditions, and any
/// value `serde_json` can represent is accepted.
pub fn hash_from_map(fields: &BTreeMap<String, Value>) -> String {
    let mut payload = String::new();
    for (key, value) in fields {
        payload.push_str(&Value::String(key.clone()).to_string());
        payload.push_str(&value.to_string());
    }
    sha256_hex(payload.as_bytes())
}
