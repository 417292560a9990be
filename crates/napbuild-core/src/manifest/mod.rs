//! Manifest store: loading, validation and schema upgrade of app and module
//! manifests.
//!
//! Consumers only ever see current-schema manifests. A legacy file found on
//! load is upgraded in memory with a warning; `upgrade-*` commands persist
//! the upgrade.

pub mod schema;
pub mod store;
pub mod upgrade;

use std::path::Path;

pub use schema::{
    AppManifest, AppSchema, LegacyAppManifest, LegacyModuleManifest, ModuleManifest,
    ModuleSchema, PathMappingManifest,
};
pub use store::{Document, read_document, write_document};
pub use upgrade::{AppDefaults, UpgradeReport};

use crate::error::Result;
use crate::paths::{APP_MANIFEST, MODULE_MANIFEST, module_id_for_dir};

/// Load the app manifest in `app_dir`.
pub fn load_app(app_dir: &Path) -> Result<AppManifest> {
    let path = app_dir.join(APP_MANIFEST);
    let document = match AppSchema::classify(read_document(&path)?, &path)? {
        AppSchema::Current(document) => document,
        legacy => {
            tracing::warn!(
                "Legacy app manifest at {}, run `napbuild upgrade-app` to convert it",
                path.display()
            );
            upgrade::upgrade_app_document(legacy, Vec::new(), &AppDefaults::for_app_dir(app_dir))
        }
    };
    AppManifest::from_document(&document, &path)
}

/// Load the module manifest in `module_dir`.
pub fn load_module(module_dir: &Path) -> Result<ModuleManifest> {
    let path = module_dir.join(MODULE_MANIFEST);
    let document = match ModuleSchema::classify(read_document(&path)?, &path)? {
        ModuleSchema::Current(document) => document,
        legacy => {
            tracing::warn!(
                "Legacy module manifest at {}, run `napbuild upgrade-module` to convert it",
                path.display()
            );
            upgrade::upgrade_module_document(legacy, &module_id_for_dir(module_dir))
        }
    };
    ModuleManifest::from_document(&document, &path)
}

/// Load the path mapping of an app, if the app has one on disk.
pub fn load_path_mapping(app_dir: &Path, app: &AppManifest) -> Result<Option<PathMappingManifest>> {
    if app.path_mapping.is_empty() {
        return Ok(None);
    }
    let path = app_dir.join(&app.path_mapping);
    if !path.is_file() {
        tracing::debug!("No path mapping at {}", path.display());
        return Ok(None);
    }
    let document = read_document(&path)?;
    PathMappingManifest::from_document(&document, &path).map(Some)
}
