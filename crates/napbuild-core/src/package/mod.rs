//! Packaging a built app into a redistributable directory or archive.
//!
//! ```text
//! <app>/bin_package/            # staging, renamed when complete
//! ├── <app>[.exe]
//! ├── lib/                      # module libraries + search-path libraries
//! ├── data/
//! ├── napkin/                   # editor, unless skipped
//! ├── app.json                  # with buildTimestamp
//! └── cache/path_mapping.json   # root role "."
//! ```

pub mod archive;
pub mod macos;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde_json::Value;

use crate::build::{self, BuildOptions};
use crate::env::{BuildContext, Environment};
use crate::error::{Error, Result};
use crate::fs_util;
use crate::manifest::schema::DEFAULT_PATH_MAPPING;
use crate::manifest::store::{to_pretty_string, write_atomic};
use crate::manifest::{self, AppManifest, PathMappingManifest};
use crate::path_mapper::PathMapper;
use crate::paths::{APP_MANIFEST, Target, TargetKind};
use crate::platform::{BuildType, Platform};
use crate::process::CommandRunner;
use crate::resolver::{ModuleResolver, ResolvedModule, app_seeds};
use crate::reveal;

pub use archive::{ArchiveFormat, archive_dir};
pub use macos::LoaderFixup;

/// Staging directory inside the app.
pub const STAGING_DIR: &str = "bin_package";
const NAPKIN: &str = "napkin";
const TIMESTAMP_FORMAT: &str = "%Y.%m.%dT%H.%M";
/// Framework release description, under `<root>/cmake/`.
const BUILD_INFO: &str = "build_info.json";

#[derive(Debug, Clone, Copy, Default)]
pub struct PackageOptions {
    /// Leave the editor out.
    pub no_napkin: bool,
    /// Keep the package as a directory.
    pub no_zip: bool,
    /// Don't reveal the result.
    pub no_show: bool,
}

/// What packaging produced.
#[derive(Debug, Clone)]
pub struct PackageReport {
    /// `<Title>-<Version>-<Platform>-<timestamp>`.
    pub name: String,
    /// Package directory, or archive when compressed.
    pub output: PathBuf,
    /// Libraries placed in the package's `lib/`.
    pub libraries: Vec<PathBuf>,
    /// Modules whose library could not be found.
    pub missing_libraries: Vec<String>,
    pub napkin: bool,
}

/// Package directory name for an app built at `when`.
pub fn package_name(app: &AppManifest, platform: Platform, when: &DateTime<Local>) -> String {
    format!(
        "{}-{}-{}-{}",
        app.title,
        app.version,
        platform.package_label(),
        when.format(TIMESTAMP_FORMAT)
    )
}

fn release_label(env: &Environment) -> String {
    BuildType::Release.output_label(env.arch)
}

/// Where the release build leaves the app executable.
pub fn app_binary_path(env: &Environment, target: &Target) -> PathBuf {
    let exe = format!("{}{}", target.build_target_name(), env.platform.exe_suffix());
    let base = match env.context {
        BuildContext::Source => env.root.as_path(),
        BuildContext::Packaged => target.dir.as_path(),
    };
    base.join("bin").join(release_label(env)).join(exe)
}

/// Where the release build leaves a module's library.
pub fn module_library_path(env: &Environment, module: &ResolvedModule) -> PathBuf {
    let name = format!("{}.{}", module.id, env.platform.shared_lib_ext());
    let base = match env.context {
        BuildContext::Source => env.root.as_path(),
        BuildContext::Packaged => module.dir.as_path(),
    };
    base.join("lib").join(release_label(env)).join(name)
}

/// Location of the editor to bundle.
///
/// A source checkout needs `QT_DIR` to ship the editor.
pub fn napkin_source(env: &Environment) -> Result<PathBuf> {
    match env.context {
        BuildContext::Packaged => Ok(env.root.join("tools").join(NAPKIN)),
        BuildContext::Source => {
            if env.qt_dir.is_none() {
                return Err(Error::ToolchainMissing(
                    "QT_DIR must point to the Qt installation to package napkin".to_string(),
                ));
            }
            Ok(env
                .root
                .join("bin")
                .join(release_label(env))
                .join(format!("{NAPKIN}{}", env.platform.exe_suffix())))
        }
    }
}

fn copy_shared_libs(platform: Platform, dir: &Path, lib_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut copied = Vec::new();
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        if entry.file_type()?.is_dir() || !platform.is_shared_lib(&name) {
            continue;
        }
        fs_util::copy_into(&entry.path(), lib_dir)?;
        copied.push(lib_dir.join(name));
    }
    Ok(copied)
}

fn write_app_manifest(
    env: &Environment,
    app: &AppManifest,
    staging: &Path,
    when: &DateTime<Local>,
) -> Result<()> {
    let mut document = app.to_document()?;
    document.insert(
        "PathMapping".to_string(),
        Value::String(DEFAULT_PATH_MAPPING.to_string()),
    );
    let build_info = env.root.join("cmake").join(BUILD_INFO);
    if build_info.is_file() {
        let info = manifest::read_document(&build_info)?;
        document.insert("napReleaseInfo".to_string(), Value::Object(info));
    } else {
        tracing::debug!("No release info at {}", build_info.display());
    }
    document.insert(
        "buildTimestamp".to_string(),
        Value::String(when.format("%Y-%m-%dT%H:%M:%S").to_string()),
    );
    write_atomic(
        &staging.join(APP_MANIFEST),
        to_pretty_string(&document)?.as_bytes(),
    )?;

    let mapping = PathMappingManifest::new(".");
    write_atomic(
        &staging.join(DEFAULT_PATH_MAPPING),
        to_pretty_string(&mapping)?.as_bytes(),
    )
}

/// Stage the editor. Returns the binaries to fix up.
fn stage_napkin(env: &Environment, source: &Path, staging: &Path) -> Result<Vec<PathBuf>> {
    let dest = staging.join(NAPKIN);
    let binary = dest.join(format!("{NAPKIN}{}", env.platform.exe_suffix()));
    if source.is_dir() {
        fs_util::copy_dir_all(source, &dest)?;
    } else if source.is_file() {
        fs_util::copy_into(source, &dest)?;
        fs_util::set_executable(&binary)?;
    } else {
        tracing::warn!("Napkin not found at {}, packaging without it", source.display());
        return Ok(Vec::new());
    }
    Ok(vec![binary].into_iter().filter(|b| b.is_file()).collect())
}

/// Build `target` in Release and package it.
///
/// Partial output is left in place when a step fails.
pub fn package_app(
    env: &Environment,
    runner: &dyn CommandRunner,
    target: &Target,
    options: &PackageOptions,
) -> Result<PackageReport> {
    if target.kind != TargetKind::App {
        return Err(Error::InvalidInput(format!(
            "only apps can be packaged, {} is a module",
            target.id
        )));
    }
    let napkin = if options.no_napkin {
        None
    } else {
        Some(napkin_source(env)?)
    };

    let app = manifest::load_app(&target.dir)?;
    build::build(
        env,
        runner,
        target,
        &BuildOptions {
            build_type: BuildType::Release,
            jobs: None,
        },
    )?;

    let binary = app_binary_path(env, target);
    if !binary.is_file() {
        return Err(Error::TargetNotFound {
            kind: "app binary",
            name: binary.display().to_string(),
        });
    }

    let when = Local::now();
    let name = package_name(&app, env.platform, &when);
    let staging = target.dir.join(STAGING_DIR);
    if fs_util::remove_dir_if_exists(&staging)? {
        tracing::debug!("Removed previous staging at {}", staging.display());
    }
    let lib_dir = staging.join("lib");
    fs::create_dir_all(&lib_dir)?;
    tracing::info!("Packaging {} into {}", app.title, staging.display());

    fs_util::copy_into(&binary, &staging)?;
    let staged_binary = staging.join(binary.file_name().unwrap_or_default());
    fs_util::set_executable(&staged_binary)?;

    // Absolute mapping: search paths must resolve on this machine.
    let mapper = PathMapper::new(Some(env.root.to_string_lossy().to_string()), env.arch);
    let resolution = ModuleResolver::new(env, mapper)
        .with_app(&target.dir)
        .resolve(&app_seeds(&target.dir, &app.required_modules))?;

    let mut libraries = Vec::new();
    let mut missing_libraries = Vec::new();
    for module in &resolution.located {
        let library = module_library_path(env, module);
        if library.is_file() {
            fs_util::copy_into(&library, &lib_dir)?;
            libraries.push(lib_dir.join(library.file_name().unwrap_or_default()));
        } else {
            tracing::warn!("No library for {} at {}", module.id, library.display());
            missing_libraries.push(module.id.clone());
        }
    }

    let search_dirs: Vec<PathBuf> = resolution
        .search_paths
        .iter()
        .map(PathBuf::from)
        .filter(|dir| dir.is_dir())
        .collect();
    for dir in &search_dirs {
        for library in copy_shared_libs(env.platform, dir, &lib_dir)? {
            if !libraries.contains(&library) {
                libraries.push(library);
            }
        }
    }

    let data = target.dir.join("data");
    if data.is_dir() {
        fs_util::copy_dir_all(&data, &staging.join("data"))?;
    }
    write_app_manifest(env, &app, &staging, &when)?;

    let mut binaries = vec![staged_binary];
    if let Some(source) = &napkin {
        binaries.extend(stage_napkin(env, source, &staging)?);
    }

    if env.platform == Platform::MacOs {
        binaries.extend(libraries.iter().cloned());
        let fixup = LoaderFixup::locate(env, runner, lib_dir.clone(), search_dirs)?;
        libraries.extend(fixup.run(&binaries)?);
    }

    let package_dir = target.dir.join(&name);
    fs_util::remove_dir_if_exists(&package_dir)?;
    fs::rename(&staging, &package_dir)?;

    let output = if options.no_zip {
        package_dir
    } else {
        let archive = archive_dir(&package_dir, ArchiveFormat::for_platform(env.platform))?;
        fs::remove_dir_all(&package_dir)?;
        archive
    };
    tracing::info!("Packaged {} to {}", app.title, output.display());

    if !options.no_show {
        reveal::reveal(env, runner, &output)?;
    }

    Ok(PackageReport {
        name,
        output,
        libraries,
        missing_libraries,
        napkin: napkin.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::find_app;
    use crate::testing::{FrameworkFixture, RecordingRunner};
    use chrono::TimeZone;

    fn release_dir(base: &Path) -> PathBuf {
        base.join("bin").join("Release-x86_64")
    }

    /// Demo app requiring napcore, which ships a library and a thirdparty
    /// search path, with a built binary in place.
    fn built_demo(fixture: &FrameworkFixture) -> PathBuf {
        let napcore = fixture
            .add_module_with_paths(
                "system_modules",
                "napcore",
                &[],
                &["{MODULE_DIR}/thirdparty/lib"],
            )
            .unwrap();
        let lib = napcore.join("lib/Release-x86_64");
        fs::create_dir_all(&lib).unwrap();
        fs::write(lib.join("napcore.so"), "core").unwrap();
        let thirdparty = napcore.join("thirdparty/lib");
        fs::create_dir_all(&thirdparty).unwrap();
        fs::write(thirdparty.join("libfoo.so.1"), "foo").unwrap();
        fs::write(thirdparty.join("readme.txt"), "").unwrap();

        let app = fixture.add_app("Demo", &["napcore"]).unwrap();
        fs::create_dir_all(release_dir(&app)).unwrap();
        fs::write(release_dir(&app).join("demo"), "exe").unwrap();
        fs::create_dir_all(app.join("data")).unwrap();
        fs::write(app.join("data/demo.json"), "{}").unwrap();
        app
    }

    #[test]
    fn test_package_name() {
        let app = AppManifest::new("Demo", Vec::new());
        let when = Local.with_ymd_and_hms(2026, 3, 4, 9, 5, 0).unwrap();
        assert_eq!(
            package_name(&app, Platform::Windows, &when),
            "Demo-0.1-Win64-2026.03.04T09.05"
        );
    }

    #[test]
    fn test_package_directory_layout() {
        let fixture = FrameworkFixture::new().unwrap();
        let app_dir = built_demo(&fixture);
        let env = fixture.env().unwrap();
        let target = find_app(&env, "Demo").unwrap();
        let runner = RecordingRunner::new();

        let options = PackageOptions {
            no_napkin: true,
            no_zip: true,
            no_show: true,
        };
        fs::write(
            fixture.root().join("cmake/build_info.json"),
            r#"{"version": "0.7.1", "buildNumber": 12}"#,
        )
        .unwrap();
        let report = package_app(&env, &runner, &target, &options).unwrap();
        assert!(report.name.starts_with("Demo-0.1-Linux-"));
        assert_eq!(report.output, target.dir.join(&report.name));
        assert!(report.missing_libraries.is_empty());
        assert!(!app_dir.join(STAGING_DIR).exists());

        let out = &report.output;
        assert_eq!(fs::read_to_string(out.join("demo")).unwrap(), "exe");
        assert!(out.join("lib/napcore.so").is_file());
        assert!(out.join("lib/libfoo.so.1").is_file());
        assert!(!out.join("lib/readme.txt").exists());
        assert!(out.join("data/demo.json").is_file());

        let manifest = manifest::read_document(&out.join(APP_MANIFEST)).unwrap();
        assert!(manifest.contains_key("buildTimestamp"));
        assert_eq!(manifest["napReleaseInfo"]["version"], "0.7.1");
        let mapping = manifest::read_document(&out.join(DEFAULT_PATH_MAPPING)).unwrap();
        let mapping = PathMappingManifest::from_document(&mapping, Path::new("m")).unwrap();
        assert_eq!(mapping.role(crate::manifest::schema::ROLE_EXE_TO_ROOT), Some("."));

        // generator, then release build
        let commands = runner.commands();
        assert!(commands[0].arg_strings().contains(&"-DCMAKE_BUILD_TYPE=Release".to_string()));
        assert_eq!(commands[1].arg_strings()[0], "--build");
    }

    #[test]
    fn test_package_archive_replaces_directory() {
        let fixture = FrameworkFixture::new().unwrap();
        built_demo(&fixture);
        let env = fixture.env().unwrap();
        let target = find_app(&env, "Demo").unwrap();
        let runner = RecordingRunner::new();

        let options = PackageOptions {
            no_napkin: true,
            no_show: true,
            ..PackageOptions::default()
        };
        let report = package_app(&env, &runner, &target, &options).unwrap();
        assert!(report.output.to_string_lossy().ends_with(".tar.gz"));
        assert!(report.output.is_file());
        assert!(!target.dir.join(&report.name).exists());
    }

    #[test]
    fn test_packaged_napkin_is_bundled() {
        let fixture = FrameworkFixture::new().unwrap();
        built_demo(&fixture);
        let tools = fixture.root().join("tools/napkin");
        fs::create_dir_all(&tools).unwrap();
        fs::write(tools.join("napkin"), "editor").unwrap();

        let env = fixture.env().unwrap();
        let target = find_app(&env, "Demo").unwrap();
        let options = PackageOptions {
            no_zip: true,
            no_show: true,
            ..PackageOptions::default()
        };
        let report = package_app(&env, &RecordingRunner::new(), &target, &options).unwrap();
        assert!(report.napkin);
        assert!(report.output.join("napkin/napkin").is_file());
    }

    #[test]
    fn test_missing_binary_is_reported() {
        let fixture = FrameworkFixture::new().unwrap();
        fixture.add_app("Demo", &[]).unwrap();
        let env = fixture.env().unwrap();
        let target = find_app(&env, "Demo").unwrap();

        let options = PackageOptions {
            no_napkin: true,
            no_zip: true,
            no_show: true,
        };
        let err = package_app(&env, &RecordingRunner::new(), &target, &options).unwrap_err();
        assert!(matches!(err, Error::TargetNotFound { kind: "app binary", .. }));
    }

    #[test]
    fn test_source_napkin_requires_qt() {
        let fixture = FrameworkFixture::new().unwrap();
        let mut env = fixture.env().unwrap();
        env.context = BuildContext::Source;
        env.qt_dir = None;
        assert!(matches!(napkin_source(&env), Err(Error::ToolchainMissing(_))));

        env.qt_dir = Some(PathBuf::from("/opt/qt"));
        assert!(napkin_source(&env).unwrap().ends_with("bin/Release-x86_64/napkin"));
    }

    #[test]
    fn test_module_is_not_packaged() {
        let fixture = FrameworkFixture::new().unwrap();
        let dir = fixture.add_module("modules", "mod_sensor", &[]).unwrap();
        let env = fixture.env().unwrap();
        let err = package_app(
            &env,
            &RecordingRunner::new(),
            &Target::module(dir),
            &PackageOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
