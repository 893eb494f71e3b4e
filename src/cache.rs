//! Config fingerprinting and artifact reuse.
//!
//! A run is identified by the SHA-256 of its config document with the
//! artifact-location fields removed, serialized as compact JSON with sorted
//! keys. A cache file whose `config_hash` matches is reused verbatim; an
//! import file is reused regardless of hash. Unreadable, malformed or
//! non-OK artifacts are misses, never errors.

use std::path::Path;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Config keys that locate artifacts or toggle reuse; they never change results.
pub const VOLATILE_KEYS: [&str; 5] = [
    "output_file",
    "cache_file",
    "use_cache",
    "use_import",
    "import_file",
];

/// Canonical compact JSON of the config without volatile keys.
///
/// `serde_json::Map` is ordered by key, so serialization is already sorted.
pub fn canonical_config(raw: &Value) -> String {
    let mut filtered = raw.clone();
    if let Some(map) = filtered.as_object_mut() {
        for key in VOLATILE_KEYS {
            map.remove(key);
        }
    }
    filtered.to_string()
}

/// Hex SHA-256 of the canonical config.
pub fn config_hash(raw: &Value) -> String {
    let digest = Sha256::digest(canonical_config(raw).as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Read a JSON artifact, treating any failure as absent.
pub fn try_load_json(path: &Path) -> Option<Value> {
    if path.as_os_str().is_empty() {
        return None;
    }
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Value>(&content) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed artifact");
            None
        }
    }
}

fn is_ok_artifact(value: &Value) -> bool {
    value.get("status").and_then(Value::as_str) == Some("OK")
}

/// Load an externally supplied profile. It is stamped with the current hash
/// and marked `loaded_from_import`.
pub fn load_import(path: &Path, hash: &str) -> Option<Value> {
    let mut imported = try_load_json(path)?;
    if !imported.is_object() || !is_ok_artifact(&imported) {
        tracing::debug!(path = %path.display(), "import file is not an OK profile");
        return None;
    }
    let map = imported.as_object_mut()?;
    map.insert("loaded_from_import".into(), Value::Bool(true));
    map.insert("config_hash".into(), Value::String(hash.to_string()));
    Some(imported)
}

/// Load a cached profile if it was produced from an identical config.
pub fn load_cached(path: &Path, hash: &str) -> Option<Value> {
    let cached = try_load_json(path)?;
    let matches = cached.get("config_hash").and_then(Value::as_str) == Some(hash);
    if cached.is_object() && matches && is_ok_artifact(&cached) {
        Some(cached)
    } else {
        None
    }
}
