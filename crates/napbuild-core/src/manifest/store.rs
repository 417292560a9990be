//! Manifest file I/O.
//!
//! Manifests are handled as ordered JSON objects so that rewriting a file
//! keeps the author's key order. Writes go to a sibling temporary file that
//! is then renamed over the target.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// An ordered JSON object as stored on disk.
pub type Document = Map<String, Value>;

/// Read a manifest as an ordered JSON object.
pub fn read_document(path: &Path) -> Result<Document> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::ManifestNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let value: Value =
        serde_json::from_str(&content).map_err(|e| Error::malformed(path, e.to_string()))?;

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(Error::malformed(path, "top-level value is not an object")),
    }
}

/// Serialize with 4-space indentation and a trailing newline.
pub fn to_pretty_string<T: Serialize>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    buf.push(b'\n');
    // serde_json only emits valid UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Write a manifest atomically.
pub fn write_document(path: &Path, document: &Document) -> Result<()> {
    write_atomic(path, to_pretty_string(document)?.as_bytes())
}

/// Write `contents` to a sibling temporary file, then rename it over `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Fetch a string field.
pub fn get_str<'a>(document: &'a Document, key: &str) -> Option<&'a str> {
    document.get(key).and_then(Value::as_str)
}

/// Fetch an array of strings, failing on non-string members.
pub fn get_string_list(document: &Document, key: &str, path: &Path) -> Result<Vec<String>> {
    match document.get(key) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    Error::malformed(path, format!("'{key}' must contain only strings"))
                })
            })
            .collect(),
        Some(_) => Err(Error::malformed(path, format!("'{key}' is not an array"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_missing_and_malformed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.json");

        assert!(matches!(
            read_document(&path),
            Err(Error::ManifestNotFound(_))
        ));

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            read_document(&path),
            Err(Error::ManifestMalformed { .. })
        ));

        fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            read_document(&path),
            Err(Error::ManifestMalformed { .. })
        ));
    }

    #[test]
    fn test_key_order_preserved() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("module.json");
        fs::write(
            &path,
            r#"{"Zeta": 1, "Type": "Module", "alpha": [], "mID": "mod_x"}"#,
        )
        .unwrap();

        let doc = read_document(&path).unwrap();
        write_document(&path, &doc).unwrap();
        let reread = read_document(&path).unwrap();

        let keys: Vec<_> = reread.keys().cloned().collect();
        assert_eq!(keys, vec!["Zeta", "Type", "alpha", "mID"]);
    }

    #[test]
    fn test_pretty_indent() {
        let mut doc = Document::new();
        doc.insert("Type".into(), Value::String("App".into()));
        let text = to_pretty_string(&doc).unwrap();
        assert_eq!(text, "{\n    \"Type\": \"App\"\n}\n");
    }

    #[test]
    fn test_string_list_validation() {
        let path = Path::new("module.json");
        let doc: Document =
            serde_json::from_str(r#"{"A": ["x", "y"], "B": "x", "C": [1]}"#).unwrap();

        assert_eq!(get_string_list(&doc, "A", path).unwrap(), vec!["x", "y"]);
        assert!(get_string_list(&doc, "B", path).is_err());
        assert!(get_string_list(&doc, "C", path).is_err());
        assert!(get_string_list(&doc, "missing", path).unwrap().is_empty());
    }
}
