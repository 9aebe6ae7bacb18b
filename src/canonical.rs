//! Canonical serialization for deterministic fingerprints.
//!
//! Every derived artifact (index, snapshot, union graph, rank history,
//! policy) carries an xxh64 fingerprint of its canonical JSON form, so two
//! runs over identical inputs can be compared byte-for-byte.
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: Struct fields serialize in declaration order
//! - Stable Vec order: Vectors serialize in index order
//! - No HashMap allowed: Use BTreeMap for maps in hashed data
//! - Floats are quantized by callers before hashing

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Serialize a value to canonical JSON bytes for hashing.
///
/// # Panics
///
/// Panics if the value has no JSON form, such as a map with non-string
/// keys. Every hashed artifact in this crate keys its maps by string.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("Canonical serialization failed")
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    let bytes = to_canonical_bytes(value);
    xxh64(&bytes, 0)
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}

/// Quantize a float to an i64 (×1e6) so it hashes identically everywhere.
pub fn quantize(value: f64) -> i64 {
    (value * 1_000_000.0).round() as i64
}
