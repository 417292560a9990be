//! Manifest schemas.
//!
//! Each manifest parses into one of two shapes: a legacy document without
//! `Type`/`mID`, or a current document. Only the current shape is handed to
//! consumers; [`super::upgrade`] maps legacy documents forward.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::store::{Document, get_str, get_string_list};
use crate::error::{Error, Result};

pub const APP_TYPE: &str = "App";
pub const APP_MID: &str = "ProjectInfo";
pub const MODULE_TYPE: &str = "Module";
pub const PATH_MAPPING_TYPE: &str = "PathMapping";

/// Default location of an app's path mapping, relative to the app directory.
pub const DEFAULT_PATH_MAPPING: &str = "cache/path_mapping.json";

/// Path mapping role binding `{ROOT}` and prefixing `{MODULE_DIR}`.
pub const ROLE_EXE_TO_ROOT: &str = "app-exe-to-framework-root";

/// Whether a document carries the fields of the current schema.
pub fn is_current(document: &Document) -> bool {
    document.contains_key("Type") && document.contains_key("mID")
}

/// App manifest as found on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum AppSchema {
    Legacy(LegacyAppManifest),
    Current(Document),
}

impl AppSchema {
    pub fn classify(document: Document, path: &Path) -> Result<Self> {
        if is_current(&document) {
            return Ok(AppSchema::Current(document));
        }
        let title = get_str(&document, "title").map(str::to_string);
        let version = get_str(&document, "version").map(str::to_string);
        let modules = get_string_list(&document, "modules", path)?;
        let mut extra = document;
        for key in ["title", "version", "modules"] {
            extra.shift_remove(key);
        }
        Ok(AppSchema::Legacy(LegacyAppManifest {
            title,
            version,
            modules,
            extra,
        }))
    }
}

/// Pre-schema app manifest: `{title, version, modules}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LegacyAppManifest {
    pub title: Option<String>,
    pub version: Option<String>,
    pub modules: Vec<String>,
    /// Unrecognized keys, carried over unchanged.
    pub extra: Document,
}

/// Module manifest as found on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleSchema {
    Legacy(LegacyModuleManifest),
    Current(Document),
}

impl ModuleSchema {
    pub fn classify(document: Document, path: &Path) -> Result<Self> {
        if is_current(&document) {
            return Ok(ModuleSchema::Current(document));
        }
        let dependencies = get_string_list(&document, "dependencies", path)?;
        let mut extra = document;
        extra.shift_remove("dependencies");
        Ok(ModuleSchema::Legacy(LegacyModuleManifest {
            dependencies,
            extra,
        }))
    }
}

/// Pre-schema module manifest: `{dependencies}`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LegacyModuleManifest {
    pub dependencies: Vec<String>,
    pub extra: Document,
}

/// Current app manifest.
///
/// The app id is its `Title`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppManifest {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "mID")]
    pub mid: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "RequiredModules", default)]
    pub required_modules: Vec<String>,
    #[serde(rename = "ServiceConfig", default)]
    pub service_config: Vec<Value>,
    #[serde(rename = "PathMapping", default = "default_path_mapping")]
    pub path_mapping: String,
    #[serde(rename = "Data", default)]
    pub data: String,
}

fn default_path_mapping() -> String {
    DEFAULT_PATH_MAPPING.to_string()
}

impl AppManifest {
    pub fn new(title: impl Into<String>, required_modules: Vec<String>) -> Self {
        Self {
            kind: APP_TYPE.to_string(),
            mid: APP_MID.to_string(),
            title: title.into(),
            version: "0.1".to_string(),
            required_modules,
            service_config: Vec::new(),
            path_mapping: default_path_mapping(),
            data: String::new(),
        }
    }

    /// Parse a current-schema document.
    pub fn from_document(document: &Document, path: &Path) -> Result<Self> {
        check_type(document, APP_TYPE, path)?;
        serde_json::from_value(Value::Object(document.clone()))
            .map_err(|e| Error::malformed(path, e.to_string()))
    }

    pub fn to_document(&self) -> Result<Document> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => unreachable!("struct serializes to an object"),
        }
    }
}

/// Current module manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleManifest {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "mID")]
    pub mid: String,
    #[serde(rename = "RequiredModules", default)]
    pub required_modules: Vec<String>,
    /// Platform key → templated search paths.
    #[serde(rename = "LibrarySearchPaths", default)]
    pub library_search_paths: BTreeMap<String, Vec<String>>,
}

impl ModuleManifest {
    pub fn new(id: impl Into<String>, required_modules: Vec<String>) -> Self {
        Self {
            kind: MODULE_TYPE.to_string(),
            mid: id.into(),
            required_modules,
            library_search_paths: BTreeMap::new(),
        }
    }

    pub fn from_document(document: &Document, path: &Path) -> Result<Self> {
        check_type(document, MODULE_TYPE, path)?;
        serde_json::from_value(Value::Object(document.clone()))
            .map_err(|e| Error::malformed(path, e.to_string()))
    }

    pub fn to_document(&self) -> Result<Document> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => unreachable!("struct serializes to an object"),
        }
    }

    /// Search paths declared for a platform key.
    pub fn search_paths_for(&self, platform_key: &str) -> &[String] {
        self.library_search_paths
            .get(platform_key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Path mapping manifest: named roles mapped to relative paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathMappingManifest {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "mID")]
    pub mid: String,
    #[serde(rename = "Roles", default)]
    pub roles: BTreeMap<String, String>,
}

impl PathMappingManifest {
    pub fn new(exe_to_root: impl Into<String>) -> Self {
        let mut roles = BTreeMap::new();
        roles.insert(ROLE_EXE_TO_ROOT.to_string(), exe_to_root.into());
        Self {
            kind: PATH_MAPPING_TYPE.to_string(),
            mid: PATH_MAPPING_TYPE.to_string(),
            roles,
        }
    }

    pub fn from_document(document: &Document, path: &Path) -> Result<Self> {
        check_type(document, PATH_MAPPING_TYPE, path)?;
        serde_json::from_value(Value::Object(document.clone()))
            .map_err(|e| Error::malformed(path, e.to_string()))
    }

    pub fn role(&self, role: &str) -> Option<&str> {
        self.roles.get(role).map(String::as_str)
    }
}

fn check_type(document: &Document, expected: &str, path: &Path) -> Result<()> {
    match get_str(document, "Type") {
        Some(kind) if kind == expected => Ok(()),
        Some(kind) => Err(Error::malformed(
            path,
            format!("expected Type '{expected}', found '{kind}'"),
        )),
        None => Err(Error::malformed(path, "missing string field 'Type'")),
    }
}
