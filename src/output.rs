//! Artifact output (JSON).
//!
//! Everything is written as compact JSON with keys in sorted order, so a
//! freshly built artifact and the same artifact copied from the cache are
//! byte-identical.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde_json::{json, Value};

use crate::analysis::STATUS_ERROR;
use crate::error::Result;

/// Write any serializable artifact to `writer`.
pub fn write_json<W: Write, T: Serialize + ?Sized>(artifact: &T, writer: &mut W) -> Result<()> {
    let value = serde_json::to_value(artifact)?;
    serde_json::to_writer(&mut *writer, &value)?;
    writer.flush()?;
    Ok(())
}

/// Write an artifact to a file, creating parent directories as needed.
pub fn write_json_file<T: Serialize + ?Sized>(path: &Path, artifact: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_json(artifact, &mut file)?;
    tracing::debug!(path = %path.display(), "artifact written");
    Ok(())
}

/// The artifact written in place of a profile when a run fails.
///
/// ```json
/// {"config_hash":"…","error":"config has no windings","status":"ERROR"}
/// ```
pub fn error_artifact(message: &str, config_hash: &str) -> Value {
    json!({
        "status": STATUS_ERROR,
        "error": message,
        "config_hash": config_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Unsorted {
        zeta: u32,
        alpha: u32,
    }

    #[test]
    fn test_keys_are_sorted() {
        let mut buf = Vec::new();
        write_json(&Unsorted { zeta: 1, alpha: 2 }, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), r#"{"alpha":2,"zeta":1}"#);
    }

    #[test]
    fn test_error_artifact_shape() {
        let v = error_artifact("boom", "abc");
        assert_eq!(v["status"], "ERROR");
        assert_eq!(v["error"], "boom");
        assert_eq!(v["config_hash"], "abc");
    }

    #[test]
    fn test_file_written_with_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.json");
        write_json_file(&path, &error_artifact("x", "y")).unwrap();
        let back: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back["error"], "x");
    }
}
