//! Schema upgrade pipeline.
//!
//! The `upgrade_*_document` functions are pure and operate on in-memory
//! documents. The `upgrade_*_dir` functions read, upgrade and write back,
//! merging and removing a legacy `config.json` next to an app manifest.
//! Upgrading an already current manifest leaves the file untouched.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::schema::{
    APP_MID, APP_TYPE, AppSchema, DEFAULT_PATH_MAPPING, MODULE_TYPE, ModuleSchema,
};
use super::store::{self, Document, get_str};
use crate::error::{Error, Result};
use crate::paths::{self, APP_MANIFEST, APP_MODULE_DIR, MODULE_MANIFEST};

/// Legacy service configuration stored beside the app manifest.
pub const LEGACY_SERVICE_CONFIG: &str = "config.json";

/// Module `mID` written by older tooling in place of the module id.
const LEGACY_MODULE_MID: &str = "ModuleInfo";

/// Values filled in for fields a manifest doesn't carry.
#[derive(Debug, Clone, Default)]
pub struct AppDefaults {
    /// Title used when a legacy manifest has none.
    pub title: String,
    /// Data file relative to the app directory, or empty.
    pub data: String,
}

impl AppDefaults {
    /// Derive defaults from the app directory on disk.
    pub fn for_app_dir(app_dir: &Path) -> Self {
        let name = app_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let data_dir = app_dir.join("data");
        let data = [format!("{name}.json"), "data.json".to_string()]
            .into_iter()
            .find(|file| data_dir.join(file).is_file())
            .map(|file| format!("data/{file}"))
            .unwrap_or_default();
        Self { title: name, data }
    }
}

/// Bring an app manifest to the current schema.
///
/// `services` are objects from a legacy service configuration; each is
/// appended to `ServiceConfig` unless an equal object is already present.
pub fn upgrade_app_document(
    schema: AppSchema,
    services: Vec<Value>,
    defaults: &AppDefaults,
) -> Document {
    let mut doc = match schema {
        AppSchema::Legacy(legacy) => {
            let mut doc = Document::new();
            doc.insert("Type".into(), APP_TYPE.into());
            doc.insert("mID".into(), APP_MID.into());
            doc.insert(
                "Title".into(),
                legacy.title.unwrap_or_else(|| defaults.title.clone()).into(),
            );
            doc.insert("Version".into(), legacy.version.unwrap_or_default().into());
            doc.insert("RequiredModules".into(), legacy.modules.into());
            doc.extend(legacy.extra);
            doc
        }
        AppSchema::Current(mut doc) => {
            // nap::ProjectInfo and friends
            doc.insert("Type".into(), APP_TYPE.into());
            doc.insert("mID".into(), APP_MID.into());
            doc
        }
    };

    for (key, value) in [
        ("RequiredModules", Value::Array(Vec::new())),
        ("ServiceConfig", Value::Array(Vec::new())),
        ("PathMapping", Value::from(DEFAULT_PATH_MAPPING)),
        ("Data", Value::from(defaults.data.as_str())),
    ] {
        doc.entry(key).or_insert(value);
    }

    // Older tooling wrote an empty string here.
    if !doc["ServiceConfig"].is_array() {
        doc["ServiceConfig"] = Value::Array(Vec::new());
    }
    if let Value::Array(existing) = &mut doc["ServiceConfig"] {
        for service in services {
            if !existing.contains(&service) {
                existing.push(service);
            }
        }
    }

    doc
}

/// Bring a module manifest to the current schema.
pub fn upgrade_module_document(schema: ModuleSchema, module_id: &str) -> Document {
    let mut doc = match schema {
        ModuleSchema::Legacy(legacy) => {
            let mut doc = Document::new();
            doc.insert("Type".into(), MODULE_TYPE.into());
            doc.insert("mID".into(), module_id.into());
            doc.insert("RequiredModules".into(), legacy.dependencies.into());
            doc.extend(legacy.extra);
            doc
        }
        ModuleSchema::Current(mut doc) => {
            doc.insert("Type".into(), MODULE_TYPE.into());
            if get_str(&doc, "mID") == Some(LEGACY_MODULE_MID) {
                doc.insert("mID".into(), module_id.into());
            }
            doc
        }
    };
    doc.entry("RequiredModules")
        .or_insert_with(|| Value::Array(Vec::new()));
    doc
}

/// What an upgrade pass touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeReport {
    /// Manifests rewritten.
    pub upgraded: Vec<PathBuf>,
    /// Manifests already current.
    pub unchanged: Vec<PathBuf>,
    /// Legacy service configurations merged and removed.
    pub merged_configs: Vec<PathBuf>,
}

impl UpgradeReport {
    fn merge(&mut self, other: UpgradeReport) {
        self.upgraded.extend(other.upgraded);
        self.unchanged.extend(other.unchanged);
        self.merged_configs.extend(other.merged_configs);
    }

    fn record(&mut self, path: PathBuf, changed: bool) {
        if changed {
            self.upgraded.push(path);
        } else {
            self.unchanged.push(path);
        }
    }
}

/// Write `upgraded` over `path` unless it serializes identically to `original`.
fn write_if_changed(path: &Path, original: &Document, upgraded: &Document) -> Result<bool> {
    if store::to_pretty_string(original)? == store::to_pretty_string(upgraded)? {
        return Ok(false);
    }
    store::write_document(path, upgraded)?;
    Ok(true)
}

fn read_service_config(path: &Path) -> Result<Vec<Value>> {
    let doc = store::read_document(path)?;
    match doc.get("Objects") {
        None => Ok(Vec::new()),
        Some(Value::Array(objects)) => Ok(objects.clone()),
        Some(_) => Err(Error::malformed(path, "'Objects' is not an array")),
    }
}

/// Upgrade an app manifest, its legacy service configuration and its
/// app-local module.
pub fn upgrade_app_dir(app_dir: &Path) -> Result<UpgradeReport> {
    let manifest_path = app_dir.join(APP_MANIFEST);
    let original = store::read_document(&manifest_path)?;

    let config_path = app_dir.join(LEGACY_SERVICE_CONFIG);
    let services = if config_path.is_file() {
        read_service_config(&config_path)?
    } else {
        Vec::new()
    };

    let schema = AppSchema::classify(original.clone(), &manifest_path)?;
    if matches!(schema, AppSchema::Legacy(_)) {
        tracing::info!("Converting legacy app manifest {}", manifest_path.display());
    }
    let upgraded = upgrade_app_document(schema, services, &AppDefaults::for_app_dir(app_dir));

    let mut report = UpgradeReport::default();
    let changed = write_if_changed(&manifest_path, &original, &upgraded)?;
    report.record(manifest_path, changed);

    if config_path.is_file() {
        fs::remove_file(&config_path)?;
        tracing::info!("Merged and removed {}", config_path.display());
        report.merged_configs.push(config_path);
    }

    let module_dir = app_dir.join(APP_MODULE_DIR);
    if module_dir.join(MODULE_MANIFEST).is_file() {
        report.merge(upgrade_module_dir(&module_dir)?);
    }

    Ok(report)
}

/// Upgrade a module manifest in place.
pub fn upgrade_module_dir(module_dir: &Path) -> Result<UpgradeReport> {
    let manifest_path = module_dir.join(MODULE_MANIFEST);
    let original = store::read_document(&manifest_path)?;

    let schema = ModuleSchema::classify(original.clone(), &manifest_path)?;
    if matches!(schema, ModuleSchema::Legacy(_)) {
        tracing::info!(
            "Converting legacy module manifest {}",
            manifest_path.display()
        );
    }
    let upgraded = upgrade_module_document(schema, &paths::module_id_for_dir(module_dir));

    let mut report = UpgradeReport::default();
    let changed = write_if_changed(&manifest_path, &original, &upgraded)?;
    report.record(manifest_path, changed);
    Ok(report)
}

fn upgrade_apps_under(parent: &Path, report: &mut UpgradeReport) -> Result<()> {
    for dir in paths::list_subdirs(parent)? {
        if dir.join(APP_MANIFEST).is_file() {
            report.merge(upgrade_app_dir(&dir)?);
        } else {
            tracing::debug!("Skipping {}: no {}", dir.display(), APP_MANIFEST);
        }
    }
    Ok(())
}

fn upgrade_modules_under(parent: &Path, report: &mut UpgradeReport) -> Result<()> {
    for dir in paths::list_subdirs(parent)? {
        if dir.join(MODULE_MANIFEST).is_file() {
            report.merge(upgrade_module_dir(&dir)?);
        }
    }
    Ok(())
}

/// Upgrade user content: `apps/` and `modules/`.
pub fn upgrade_repo(root: &Path) -> Result<UpgradeReport> {
    let mut report = UpgradeReport::default();
    upgrade_apps_under(&root.join("apps"), &mut report)?;
    upgrade_modules_under(&root.join("modules"), &mut report)?;
    Ok(report)
}

/// Upgrade everything in the framework, including demos, tests and
/// system modules.
pub fn upgrade_all(root: &Path) -> Result<UpgradeReport> {
    let mut report = UpgradeReport::default();
    for parent in ["apps", "demos", "examples", "test"] {
        upgrade_apps_under(&root.join(parent), &mut report)?;
    }
    for parent in ["system_modules", "modules"] {
        upgrade_modules_under(&root.join(parent), &mut report)?;
    }
    Ok(report)
}
