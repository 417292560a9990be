//! Environment resolution.
//!
//! Establishes which framework the orchestrator operates on, in which
//! context, and where the external generator lives. The resulting
//! [`Environment`] is constructed once at entry and passed explicitly to
//! every operation.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::platform::{Architecture, Generator, GeneratorKind, Platform};

/// Top-level build manifest that marks a source checkout.
pub const SOURCE_MARKER: &str = "CMakeLists.txt";

/// Shape of the framework root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildContext {
    /// Source checkout with a top-level build manifest.
    Source,
    /// Packaged framework release.
    Packaged,
}

impl BuildContext {
    /// Detect the context of a candidate root, if it is a framework root at all.
    pub fn detect(root: &Path) -> Option<Self> {
        if root.join(SOURCE_MARKER).is_file() {
            Some(BuildContext::Source)
        } else if root.join("system_modules").is_dir() {
            Some(BuildContext::Packaged)
        } else {
            None
        }
    }

    /// Path from an app executable to the framework root when the app
    /// carries no path mapping.
    pub fn default_exe_to_root(self) -> &'static str {
        match self {
            BuildContext::Source => "../..",
            BuildContext::Packaged => "../../../..",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildContext::Source => "source",
            BuildContext::Packaged => "framework_release",
        }
    }
}

/// Inputs to environment resolution, gathered from flags and variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOptions {
    /// Explicit framework root.
    pub root: Option<PathBuf>,
    /// Generator override.
    pub generator: Option<Generator>,
    /// Platform override, for cross-configuration and tests.
    pub platform: Option<Platform>,
    /// Architecture override, for cross-configuration and tests.
    pub arch: Option<Architecture>,
    /// Editor toolkit root (`QT_DIR`).
    pub qt_dir: Option<PathBuf>,
    /// Android NDK root (`ANDROID_NDK_ROOT`).
    pub android_ndk_root: Option<PathBuf>,
}

impl EnvOptions {
    /// Read `NAP_ROOT`, `NAP_GENERATOR`, `QT_DIR` and `ANDROID_NDK_ROOT`.
    pub fn from_env() -> Result<Self> {
        let generator = match std::env::var("NAP_GENERATOR") {
            Ok(value) if !value.is_empty() => Some(value.parse()?),
            _ => None,
        };

        Ok(Self {
            root: non_empty_var("NAP_ROOT").map(PathBuf::from),
            generator,
            platform: None,
            arch: None,
            qt_dir: non_empty_var("QT_DIR").map(PathBuf::from),
            android_ndk_root: non_empty_var("ANDROID_NDK_ROOT").map(PathBuf::from),
        })
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Resolved operating environment.
#[derive(Debug, Clone)]
pub struct Environment {
    pub context: BuildContext,
    /// Absolute framework root.
    pub root: PathBuf,
    pub platform: Platform,
    pub arch: Architecture,
    pub generator: Generator,
    /// Path to the generator executable.
    pub generator_binary: PathBuf,
    /// Path to the bundled interpreter, when present.
    pub interpreter: Option<PathBuf>,
    pub qt_dir: Option<PathBuf>,
    pub android_ndk_root: Option<PathBuf>,
}

impl Environment {
    /// Resolve the environment.
    ///
    /// Tries in order:
    /// 1. The explicit root from `options`
    /// 2. Ancestors of the current directory
    /// 3. Ancestors of the running executable
    pub fn resolve(options: &EnvOptions) -> Result<Self> {
        let mut searched = Vec::new();

        if let Some(root) = &options.root {
            let root = absolute(root)?;
            if BuildContext::detect(&root).is_some() {
                return Self::at_root(&root, options);
            }
            return Err(Error::EnvironmentNotFound {
                searched: root.display().to_string(),
            });
        }

        if let Ok(cwd) = std::env::current_dir() {
            if let Some(root) = find_root_upwards(&cwd) {
                return Self::at_root(&root, options);
            }
            searched.push(cwd.display().to_string());
        }

        if let Ok(exe) = std::env::current_exe() {
            if let Some(root) = exe.parent().and_then(find_root_upwards) {
                return Self::at_root(&root, options);
            }
            searched.push(exe.display().to_string());
        }

        Err(Error::EnvironmentNotFound {
            searched: searched.join(", "),
        })
    }

    /// Build the environment for a known framework root.
    pub fn at_root(root: &Path, options: &EnvOptions) -> Result<Self> {
        let root = absolute(root)?;
        let context = BuildContext::detect(&root).ok_or_else(|| Error::EnvironmentNotFound {
            searched: root.display().to_string(),
        })?;

        let platform = options.platform.unwrap_or_else(Platform::current);
        let arch = options.arch.unwrap_or_else(Architecture::current);
        let generator = options
            .generator
            .unwrap_or_else(|| platform.default_generator());

        let generator_binary = locate_generator(&root, context, platform, arch)?;
        let interpreter = locate_interpreter(&root, context, platform, arch);
        if interpreter.is_none() {
            tracing::debug!("No bundled interpreter found under {}", root.display());
        }

        tracing::debug!(
            "Resolved {} framework at {} ({} {}, {})",
            context.as_str(),
            root.display(),
            platform,
            arch,
            generator
        );

        Ok(Self {
            context,
            root,
            platform,
            arch,
            generator,
            generator_binary,
            interpreter,
            qt_dir: options.qt_dir.clone(),
            android_ndk_root: options.android_ndk_root.clone(),
        })
    }

    pub fn generator_kind(&self) -> GeneratorKind {
        self.generator.kind()
    }

    pub fn is_source(&self) -> bool {
        self.context == BuildContext::Source
    }

    /// Locate a platform tool on `PATH`.
    pub fn host_tool(&self, name: &str) -> Result<PathBuf> {
        which::which(name)
            .map_err(|_| Error::ToolchainMissing(format!("{name} not found in PATH")))
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        Ok(path.canonicalize()?)
    } else if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn find_root_upwards(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| BuildContext::detect(dir).is_some())
        .map(Path::to_path_buf)
}

/// Architecture directory used in the source thirdparty tree.
///
/// Only Linux ships per-architecture tools; other hosts use x86_64.
fn thirdparty_arch(platform: Platform, arch: Architecture) -> &'static str {
    match platform {
        Platform::Linux => arch.as_str(),
        _ => Architecture::X86_64.as_str(),
    }
}

/// Candidate generator path for a context, whether or not it exists.
pub fn generator_path(
    root: &Path,
    context: BuildContext,
    platform: Platform,
    arch: Architecture,
) -> PathBuf {
    let exe = format!("cmake{}", platform.exe_suffix());
    match context {
        BuildContext::Packaged => root.join("thirdparty").join("cmake").join("bin").join(exe),
        BuildContext::Source => root
            .join("..")
            .join("thirdparty")
            .join("cmake")
            .join(platform.thirdparty_dir())
            .join(thirdparty_arch(platform, arch))
            .join("bin")
            .join(exe),
    }
}

fn locate_generator(
    root: &Path,
    context: BuildContext,
    platform: Platform,
    arch: Architecture,
) -> Result<PathBuf> {
    let path = generator_path(root, context, platform, arch);
    if path.is_file() {
        Ok(path)
    } else {
        Err(Error::ToolchainMissing(format!(
            "generator not found at {}",
            path.display()
        )))
    }
}

fn locate_interpreter(
    root: &Path,
    context: BuildContext,
    platform: Platform,
    arch: Architecture,
) -> Option<PathBuf> {
    let path = match (context, platform) {
        (BuildContext::Packaged, Platform::Windows) => {
            root.join("thirdparty").join("python").join("python.exe")
        }
        (BuildContext::Packaged, _) => root
            .join("thirdparty")
            .join("python")
            .join("bin")
            .join("python3"),
        (BuildContext::Source, Platform::Windows) => root
            .join("..")
            .join("thirdparty")
            .join("python")
            .join("msvc")
            .join("x86_64")
            .join("python.exe"),
        (BuildContext::Source, _) => root
            .join("..")
            .join("thirdparty")
            .join("python")
            .join(platform.thirdparty_dir())
            .join(thirdparty_arch(platform, arch))
            .join("bin")
            .join("python3"),
    };
    path.is_file().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn options() -> EnvOptions {
        EnvOptions {
            platform: Some(Platform::Linux),
            arch: Some(Architecture::X86_64),
            ..EnvOptions::default()
        }
    }

    #[test]
    fn test_detect_context() {
        let temp = TempDir::new().unwrap();
        assert_eq!(BuildContext::detect(temp.path()), None);

        fs::create_dir(temp.path().join("system_modules")).unwrap();
        assert_eq!(
            BuildContext::detect(temp.path()),
            Some(BuildContext::Packaged)
        );

        fs::write(temp.path().join(SOURCE_MARKER), "").unwrap();
        assert_eq!(BuildContext::detect(temp.path()), Some(BuildContext::Source));
    }

    #[test]
    fn test_packaged_requires_generator() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("system_modules")).unwrap();

        let err = Environment::at_root(temp.path(), &options()).unwrap_err();
        assert!(matches!(err, Error::ToolchainMissing(_)));

        let bin = temp.path().join("thirdparty/cmake/bin");
        fs::create_dir_all(&bin).unwrap();
        fs::write(bin.join("cmake"), "").unwrap();

        let env = Environment::at_root(temp.path(), &options()).unwrap();
        assert_eq!(env.context, BuildContext::Packaged);
        assert!(env.generator_binary.ends_with("thirdparty/cmake/bin/cmake"));
        assert!(env.interpreter.is_none());
        assert_eq!(env.generator, Generator::UnixMakefiles);
    }

    #[test]
    fn test_source_generator_layout() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("nap");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(SOURCE_MARKER), "").unwrap();

        let bin = temp.path().join("thirdparty/cmake/linux/x86_64/bin");
        fs::create_dir_all(&bin).unwrap();
        fs::write(bin.join("cmake"), "").unwrap();

        let env = Environment::at_root(&root, &options()).unwrap();
        assert_eq!(env.context, BuildContext::Source);
        assert!(env.is_source());
    }

    #[test]
    fn test_explicit_root_not_a_framework() {
        let temp = TempDir::new().unwrap();
        let err = Environment::resolve(&options().with_root(temp.path())).unwrap_err();
        assert!(matches!(err, Error::EnvironmentNotFound { .. }));
    }

    #[test]
    fn test_find_root_upwards() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("system_modules")).unwrap();
        let nested = temp.path().join("apps/demo/src");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_root_upwards(&nested).as_deref(), Some(temp.path()));
    }
}
