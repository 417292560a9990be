//! Framework directory layout and target lookup.
//!
//! ```text
//! <root>/
//! ├── system_modules/<id>/module.json   # framework modules
//! ├── modules/<id>/module.json          # user modules
//! ├── apps/<app>/app.json               # user apps
//! │   ├── module/module.json            # app-local module (mod_<app>)
//! │   └── <build-dir>/                  # generator output + dependency record
//! ├── demos/<app>/ ...
//! └── solution_info.json                # source context only
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::env::Environment;
use crate::error::{Error, Result};
use crate::platform::Generator;
use crate::record::RECORD_FILENAME;

pub const APP_MANIFEST: &str = "app.json";
pub const MODULE_MANIFEST: &str = "module.json";
/// Directory of the app-local module inside an app.
pub const APP_MODULE_DIR: &str = "module";

/// Roots searched for apps, in order.
pub const APP_ROOTS: [&str; 3] = ["apps", "demos", "examples"];
/// Roots searched for modules, in order.
pub const MODULE_ROOTS: [&str; 2] = ["system_modules", "modules"];

/// Prefix of user and app-local module ids.
pub const USER_MODULE_PREFIX: &str = "mod_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    App,
    Module,
}

impl TargetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::App => "app",
            TargetKind::Module => "module",
        }
    }
}

/// An app or module located inside the framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub kind: TargetKind,
    /// App directory name, or module id.
    pub id: String,
    /// Absolute target directory.
    pub dir: PathBuf,
}

impl Target {
    pub fn app(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            kind: TargetKind::App,
            id: dir_name(&dir),
            dir,
        }
    }

    pub fn module(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            kind: TargetKind::Module,
            id: module_id_for_dir(&dir),
            dir,
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        match self.kind {
            TargetKind::App => self.dir.join(APP_MANIFEST),
            TargetKind::Module => self.dir.join(MODULE_MANIFEST),
        }
    }

    /// Build target name passed to the native build tool.
    pub fn build_target_name(&self) -> String {
        self.id.to_lowercase()
    }

    pub fn build_dirs(&self, generator: Generator) -> BuildDirs {
        BuildDirs::for_target(&self.dir, generator)
    }
}

/// Per-target build directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDirs {
    /// Generator output directory.
    pub build_dir: PathBuf,
    /// Machine-generated dependency record inside `build_dir`.
    pub record_path: PathBuf,
}

impl BuildDirs {
    pub fn for_target(target_dir: &Path, generator: Generator) -> Self {
        let build_dir = target_dir.join(generator.build_dir_name());
        let record_path = build_dir.join(RECORD_FILENAME);
        Self {
            build_dir,
            record_path,
        }
    }

    /// Create the build directory if it doesn't exist.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.build_dir)?;
        Ok(())
    }

    /// Remove the build directory entirely.
    pub fn clean(&self) -> Result<bool> {
        if self.build_dir.exists() {
            fs::remove_dir_all(&self.build_dir)?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn is_configured(&self) -> bool {
        self.record_path.is_file()
    }
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Directory name of an app with the given id.
pub fn app_dir_name(app_id: &str) -> String {
    app_id.to_lowercase()
}

/// Id of the app-local module owned by the app in `app_dir`.
pub fn app_module_id(app_dir: &Path) -> String {
    format!("{USER_MODULE_PREFIX}{}", dir_name(app_dir).to_lowercase())
}

/// Id of a user module created under the given name.
pub fn user_module_id(name: &str) -> String {
    let lower = name.to_lowercase();
    if lower.starts_with(USER_MODULE_PREFIX) {
        lower
    } else {
        format!("{USER_MODULE_PREFIX}{lower}")
    }
}

/// Module id for a module directory, accounting for app-local modules.
pub fn module_id_for_dir(dir: &Path) -> String {
    let name = dir_name(dir);
    if name == APP_MODULE_DIR {
        if let Some(app_dir) = dir.parent() {
            if app_dir.join(APP_MANIFEST).exists() {
                return app_module_id(app_dir);
            }
        }
    }
    name
}

/// Framework-relative path with forward slashes.
pub fn framework_relative(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Find an existing app, demo or example directory with the given lowercased id.
pub fn existing_app_dir(env: &Environment, app_id: &str) -> Option<PathBuf> {
    let dir_name = app_dir_name(app_id);
    APP_ROOTS
        .iter()
        .map(|root| env.root.join(root).join(&dir_name))
        .find(|dir| dir.exists())
}

/// Locate an app by name or path.
pub fn find_app(env: &Environment, name_or_path: &str) -> Result<Target> {
    let as_path = Path::new(name_or_path);
    if as_path.join(APP_MANIFEST).is_file() {
        return Ok(Target::app(as_path.canonicalize()?));
    }

    match existing_app_dir(env, name_or_path) {
        Some(dir) if dir.join(APP_MANIFEST).is_file() => {
            tracing::debug!("Found app {} at {}", name_or_path, dir.display());
            Ok(Target::app(dir))
        }
        _ => Err(Error::app_not_found(name_or_path)),
    }
}

/// Locate a module by name or path.
pub fn find_module(env: &Environment, name_or_path: &str) -> Result<Target> {
    let as_path = Path::new(name_or_path);
    if as_path.join(MODULE_MANIFEST).is_file() {
        return Ok(Target::module(as_path.canonicalize()?));
    }

    let lower = name_or_path.to_lowercase();
    let candidates = [
        env.root.join("modules").join(name_or_path),
        env.root.join("modules").join(user_module_id(name_or_path)),
        env.root.join("system_modules").join(name_or_path),
        env.root.join("system_modules").join(format!("nap{lower}")),
    ];

    candidates
        .into_iter()
        .find(|dir| dir.join(MODULE_MANIFEST).is_file())
        .map(|dir| {
            tracing::debug!("Found module {} at {}", name_or_path, dir.display());
            Target::module(dir)
        })
        .ok_or_else(|| Error::module_not_found(name_or_path))
}

/// Locate an app, falling back to a module.
pub fn find_target(env: &Environment, name_or_path: &str) -> Result<Target> {
    match find_app(env, name_or_path) {
        Ok(target) => Ok(target),
        Err(Error::TargetNotFound { .. }) => find_module(env, name_or_path).map_err(|_| {
            Error::TargetNotFound {
                kind: "app or module",
                name: name_or_path.to_string(),
            }
        }),
        Err(e) => Err(e),
    }
}

/// Immediate, non-hidden subdirectories of `dir`, sorted by name.
pub fn list_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if path.is_dir() && !hidden {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_module_ids() {
        assert_eq!(user_module_id("Foo"), "mod_foo");
        assert_eq!(user_module_id("mod_Foo"), "mod_foo");
        assert_eq!(app_module_id(Path::new("/nap/apps/myapp")), "mod_myapp");
    }

    #[test]
    fn test_app_local_module_id() {
        let temp = TempDir::new().unwrap();
        let app = temp.path().join("myapp");
        fs::create_dir_all(app.join(APP_MODULE_DIR)).unwrap();
        fs::write(app.join(APP_MANIFEST), "{}").unwrap();

        let target = Target::module(app.join(APP_MODULE_DIR));
        assert_eq!(target.id, "mod_myapp");
    }

    #[test]
    fn test_framework_relative() {
        let rel = framework_relative(Path::new("/nap"), Path::new("/nap/modules/foo"));
        assert_eq!(rel, "modules/foo");
    }

    #[test]
    fn test_build_dirs_clean() {
        let temp = TempDir::new().unwrap();
        let dirs = BuildDirs::for_target(temp.path(), Generator::UnixMakefiles);
        assert!(dirs.build_dir.ends_with("build"));
        assert!(!dirs.clean().unwrap());

        dirs.ensure().unwrap();
        fs::write(&dirs.record_path, "").unwrap();
        assert!(dirs.is_configured());

        assert!(dirs.clean().unwrap());
        assert!(!dirs.build_dir.exists());
    }

    #[test]
    fn test_list_subdirs_skips_hidden() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("b")).unwrap();
        fs::create_dir(temp.path().join("a")).unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        fs::write(temp.path().join("file"), "").unwrap();

        let dirs = list_subdirs(temp.path()).unwrap();
        let names: Vec<_> = dirs.iter().map(|d| dir_name(d)).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
