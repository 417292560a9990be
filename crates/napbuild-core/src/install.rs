//! Installing distributed module archives.
//!
//! An archive is a zip with exactly one top-level directory holding a
//! `module.json`. It is extracted to a temporary directory and validated
//! there; `modules/` is only written once validation has passed.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;
use zip::ZipArchive;

use crate::build::{self, BuildOptions};
use crate::create::template_build_file;
use crate::env::Environment;
use crate::error::{Error, Result, TemplateKind};
use crate::fs_util;
use crate::manifest::store::{get_str, read_document};
use crate::manifest::upgrade;
use crate::package;
use crate::paths::{self, APP_MANIFEST, APP_MODULE_DIR, MODULE_MANIFEST, Target};
use crate::platform::BuildType;
use crate::process::{CommandRunner, CommandSpec};
use crate::solution;

/// Directory inside a module that may bundle a demo app.
pub const DEMO_DIR: &str = "demo";

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Replace an existing module or demo.
    pub force: bool,
    /// Deploy the bundled demo to `apps/`.
    pub deploy_demo: bool,
    /// Build and launch the demo. Implies `deploy_demo`.
    pub run_demo: bool,
}

/// What an install did.
#[derive(Debug, Clone)]
pub struct Installed {
    pub module: Target,
    /// The module manifest was converted from the legacy schema.
    pub upgraded: bool,
    pub demo: Option<Target>,
    /// Command used to launch the demo.
    pub launched: Option<CommandSpec>,
}

fn archive_err(e: impl std::fmt::Display) -> Error {
    Error::Archive(e.to_string())
}

/// Extract a zip into `dest`, recreating symlinks on Unix.
///
/// The whole archive is validated before anything is written: symlinks must
/// point inside the archive and no entry may sit under a symlink entry.
/// Symlinks are created last.
pub fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(archive_err)?;

    let mut names: Vec<PathBuf> = Vec::with_capacity(archive.len());
    let mut symlinks: Vec<(PathBuf, String)> = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(archive_err)?;
        let Some(rel) = entry.enclosed_name() else {
            return Err(Error::Archive(format!(
                "entry '{}' escapes the archive",
                entry.name()
            )));
        };
        if entry.is_symlink() {
            let mut target = String::new();
            io::Read::read_to_string(&mut entry, &mut target)?;
            if !link_stays_inside(&rel, &target) {
                return Err(Error::Archive(format!(
                    "symlink '{}' -> '{target}' points outside the archive",
                    rel.display()
                )));
            }
            symlinks.push((rel.clone(), target));
        }
        names.push(rel);
    }
    for (link, _) in &symlinks {
        if let Some(inner) = names.iter().find(|p| *p != link && p.starts_with(link)) {
            return Err(Error::Archive(format!(
                "entry '{}' is nested under symlink '{}'",
                inner.display(),
                link.display()
            )));
        }
    }

    for (i, rel) in names.iter().enumerate() {
        let mut entry = archive.by_index(i).map_err(archive_err)?;
        if entry.is_symlink() {
            continue;
        }
        let out = dest.join(rel);
        if entry.is_dir() {
            fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut writer = File::create(&out)?;
        io::copy(&mut entry, &mut writer)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out, fs::Permissions::from_mode(mode & 0o7777))?;
        }
    }

    for (link, target) in symlinks {
        let out = dest.join(&link);
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        write_symlink(&target, &out)?;
    }
    Ok(())
}

/// Whether a relative link at `link` (archive-relative) resolves inside the
/// archive root without following other links.
fn link_stays_inside(link: &Path, target: &str) -> bool {
    let mut depth = link
        .parent()
        .map(|p| {
            p.components()
                .filter(|c| matches!(c, Component::Normal(_)))
                .count()
        })
        .unwrap_or(0);
    for component in Path::new(target).components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    !target.is_empty()
}

#[cfg(unix)]
fn write_symlink(target: &str, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_symlink(target: &str, link: &Path) -> Result<()> {
    let resolved = link.parent().unwrap_or(Path::new(".")).join(target);
    if resolved.is_file() {
        fs::copy(&resolved, link)?;
    } else {
        tracing::warn!("Skipping symlink {} -> {target}", link.display());
    }
    Ok(())
}

/// The single top-level directory of an extracted archive.
fn module_root(extracted: &Path) -> Result<PathBuf> {
    let entries: Vec<PathBuf> = fs::read_dir(extracted)?
        .map(|e| e.map(|e| e.path()))
        .collect::<io::Result<_>>()?;

    match entries.as_slice() {
        [dir] if dir.is_dir() => {
            if dir.join(MODULE_MANIFEST).is_file() {
                Ok(dir.clone())
            } else {
                Err(Error::InvalidInput(format!(
                    "archive directory '{}' has no {MODULE_MANIFEST}",
                    dir.file_name().unwrap_or_default().to_string_lossy()
                )))
            }
        }
        _ => Err(Error::InvalidInput(format!(
            "archive must contain exactly one top-level directory, found {} entries",
            entries.len()
        ))),
    }
}

/// Identity of the module in `dir`: its `mID`, or the directory name for
/// a legacy manifest.
fn module_identity(dir: &Path) -> Result<String> {
    let manifest_path = dir.join(MODULE_MANIFEST);
    let document = read_document(&manifest_path)?;
    let id = match get_str(&document, "mID") {
        Some(id) => id.to_string(),
        None => {
            tracing::warn!("Legacy module manifest in archive, using the directory name as id");
            dir.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        }
    };

    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\']);
    if !valid {
        return Err(Error::malformed(
            manifest_path,
            format!("'{id}' is not a valid module id"),
        ));
    }
    Ok(id)
}

/// Bundled demo app of an extracted module, if any.
fn bundled_demo(module_dir: &Path) -> Result<Option<PathBuf>> {
    Ok(paths::list_subdirs(&module_dir.join(DEMO_DIR))?
        .into_iter()
        .find(|dir| dir.join(APP_MANIFEST).is_file()))
}

fn refuse_or_clear(dest: &Path, what: &str, force: bool) -> Result<()> {
    if !dest.exists() {
        return Ok(());
    }
    if !force {
        return Err(Error::ExistingTarget(format!("{what} at {}", dest.display())));
    }
    tracing::info!("Replacing {what} at {}", dest.display());
    fs_util::remove_dir_if_exists(dest)?;
    Ok(())
}

/// Install the module archive at `archive_path`.
///
/// # Errors
///
/// - `InvalidInput` when the archive layout is wrong
/// - `ExistingTarget` when the module or demo exists and `force` is off
/// - `Archive` when the zip can't be read
/// - `ToolchainMissing` when the framework lacks the build file templates
pub fn install_module(
    env: &Environment,
    runner: &dyn CommandRunner,
    archive_path: &Path,
    options: &InstallOptions,
) -> Result<Installed> {
    if !archive_path.is_file() {
        return Err(Error::InvalidInput(format!(
            "module archive {} does not exist",
            archive_path.display()
        )));
    }

    let temp = TempDir::new()?;
    extract_zip(archive_path, temp.path())?;
    let extracted = module_root(temp.path())?;
    let id = module_identity(&extracted)?;

    let deploy_demo = options.deploy_demo || options.run_demo;
    let demo = if deploy_demo {
        let demo = bundled_demo(&extracted)?;
        if demo.is_none() {
            tracing::warn!("Module {id} bundles no demo");
        }
        demo
    } else {
        None
    };

    let module_dest = env.root.join("modules").join(&id);
    let demo_dest = demo
        .as_ref()
        .and_then(|d| d.file_name())
        .map(|name| env.root.join("apps").join(name));

    let module_build_file = template_build_file(&env.root, TemplateKind::Module);
    let app_build_file = template_build_file(&env.root, TemplateKind::App);
    let mut templates = vec![&module_build_file];
    if demo.is_some() {
        templates.push(&app_build_file);
    }
    if let Some(missing) = templates.into_iter().find(|t| !t.is_file()) {
        return Err(Error::ToolchainMissing(format!(
            "build file template not found at {}",
            missing.display()
        )));
    }

    // Both destinations are checked before either is written.
    if let Some(dest) = demo_dest.as_ref().filter(|d| d.exists() && !options.force) {
        return Err(Error::ExistingTarget(format!("demo at {}", dest.display())));
    }
    refuse_or_clear(&module_dest, &format!("module {id}"), options.force)?;

    tracing::info!("Installing module {id} to {}", module_dest.display());
    fs_util::copy_dir_all(&extracted, &module_dest)?;
    fs_util::copy_into(&module_build_file, &module_dest)?;
    let upgraded = !upgrade::upgrade_module_dir(&module_dest)?.upgraded.is_empty();
    solution::add_target(env, &module_dest)?;
    let module = Target::module(module_dest);

    let mut installed = Installed {
        module,
        upgraded,
        demo: None,
        launched: None,
    };

    if let (Some(source), Some(dest)) = (demo, demo_dest) {
        refuse_or_clear(&dest, "demo", true)?;
        tracing::info!("Deploying demo to {}", dest.display());
        fs_util::copy_dir_all(&source, &dest)?;
        fs_util::copy_into(&app_build_file, &dest)?;
        let demo_module = dest.join(APP_MODULE_DIR);
        if demo_module.is_dir() {
            fs_util::copy_into(&module_build_file, &demo_module)?;
        }
        solution::add_target(env, &dest)?;
        installed.demo = Some(Target::app(dest));
    }

    if options.run_demo {
        if let Some(demo) = &installed.demo {
            installed.launched = Some(run_demo(env, runner, demo)?);
        }
    }

    Ok(installed)
}

/// Build a demo in Release and launch it without waiting.
pub fn run_demo(env: &Environment, runner: &dyn CommandRunner, demo: &Target) -> Result<CommandSpec> {
    build::build(
        env,
        runner,
        demo,
        &BuildOptions {
            build_type: BuildType::Release,
            jobs: None,
        },
    )?;

    let binary = package::app_binary_path(env, demo);
    if !binary.is_file() {
        return Err(Error::TargetNotFound {
            kind: "app binary",
            name: binary.display().to_string(),
        });
    }
    let command = CommandSpec::new(&binary).current_dir(binary.parent().unwrap_or(&demo.dir));
    tracing::info!("Launching {}", binary.display());
    runner.launch(&command)?;
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create::BUILD_FILE;
    use crate::testing::{FrameworkFixture, RecordingRunner};
    use std::io::Write;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    enum Entry<'a> {
        File(&'a str, &'a str),
        #[cfg(unix)]
        Link(&'a str, &'a str),
    }

    fn write_zip(path: &Path, entries: &[Entry<'_>]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default();
        for entry in entries {
            match entry {
                Entry::File(name, contents) => {
                    writer.start_file(*name, options).unwrap();
                    writer.write_all(contents.as_bytes()).unwrap();
                }
                #[cfg(unix)]
                Entry::Link(name, target) => {
                    writer.add_symlink(*name, *target, options).unwrap();
                }
            }
        }
        writer.finish().unwrap();
    }

    const MODULE_JSON: &str =
        r#"{"Type": "Module", "mID": "mod_sensor", "RequiredModules": ["napcore"]}"#;
    const DEMO_JSON: &str = r#"{"Type": "App", "mID": "ProjectInfo", "Title": "SensorDemo", "Version": "0.1", "RequiredModules": ["mod_sensor"]}"#;

    #[test]
    fn test_two_top_level_dirs_rejected() {
        let fixture = FrameworkFixture::new().unwrap();
        let env = fixture.env().unwrap();
        let archive = fixture.root().join("bad.zip");
        write_zip(
            &archive,
            &[
                Entry::File("a/module.json", MODULE_JSON),
                Entry::File("b/module.json", MODULE_JSON),
            ],
        );

        let err = install_module(
            &env,
            &RecordingRunner::new(),
            &archive,
            &InstallOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_ne!(err.exit_code(), 0);
        assert!(!env.root.join("modules").exists());
    }

    #[test]
    fn test_missing_manifest_rejected() {
        let fixture = FrameworkFixture::new().unwrap();
        let env = fixture.env().unwrap();
        let archive = fixture.root().join("bad.zip");
        write_zip(&archive, &[Entry::File("sensor/readme.txt", "")]);

        let err = install_module(
            &env,
            &RecordingRunner::new(),
            &archive,
            &InstallOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("module.json"));
    }

    #[test]
    fn test_link_stays_inside() {
        let link = Path::new("mod/lib/libfoo.so");
        assert!(link_stays_inside(link, "libfoo.so.1"));
        assert!(link_stays_inside(link, "../../mod/lib/libfoo.so.1"));
        assert!(!link_stays_inside(link, "../../../etc/passwd"));
        assert!(!link_stays_inside(link, "/usr/lib/libfoo.so"));
        assert!(!link_stays_inside(Path::new("top"), ".."));
        assert!(!link_stays_inside(link, ""));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_out_of_archive_rejected() {
        let fixture = FrameworkFixture::new().unwrap();
        let env = fixture.env().unwrap();
        let outside = TempDir::new().unwrap();
        let archive = fixture.root().join("evil.zip");
        let target = outside.path().to_string_lossy().into_owned();
        write_zip(
            &archive,
            &[
                Entry::File("mod_evil/module.json", MODULE_JSON),
                Entry::Link("mod_evil/lib", &target),
                Entry::File("mod_evil/lib/pwned.txt", "x"),
            ],
        );

        let err = install_module(
            &env,
            &RecordingRunner::new(),
            &archive,
            &InstallOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Archive(_)));
        assert!(!outside.path().join("pwned.txt").exists());
        assert!(!env.root.join("modules").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_entry_under_symlink_rejected() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("nested.zip");
        write_zip(
            &archive,
            &[
                Entry::File("mod/data/a.txt", "a"),
                Entry::Link("mod/alias", "data"),
                Entry::File("mod/alias/b.txt", "b"),
            ],
        );

        let dest = temp.path().join("out");
        let err = extract_zip(&archive, &dest).unwrap_err();
        assert!(err.to_string().contains("nested under symlink"));
        assert!(!dest.exists());
    }

    #[test]
    fn test_install_uses_manifest_id() {
        let fixture = FrameworkFixture::new().unwrap();
        let env = fixture.env().unwrap();
        let archive = fixture.root().join("sensor.zip");
        let mut entries = vec![
            Entry::File("Sensor-1.0/module.json", MODULE_JSON),
            Entry::File("Sensor-1.0/lib/libsensor.so.1", "so"),
        ];
        #[cfg(unix)]
        entries.push(Entry::Link("Sensor-1.0/lib/libsensor.so", "libsensor.so.1"));
        write_zip(&archive, &entries);

        let runner = RecordingRunner::new();
        let installed =
            install_module(&env, &runner, &archive, &InstallOptions::default()).unwrap();
        assert_eq!(installed.module.id, "mod_sensor");
        assert!(!installed.upgraded);
        assert!(env.root.join("modules/mod_sensor/lib/libsensor.so.1").is_file());
        #[cfg(unix)]
        {
            let link = env.root.join("modules/mod_sensor/lib/libsensor.so");
            assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        }

        let err = install_module(&env, &runner, &archive, &InstallOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::ExistingTarget(_)));

        fs::write(env.root.join("modules/mod_sensor/stale.txt"), "").unwrap();
        let forced = InstallOptions {
            force: true,
            ..InstallOptions::default()
        };
        install_module(&env, &runner, &archive, &forced).unwrap();
        assert!(!env.root.join("modules/mod_sensor/stale.txt").exists());
    }

    #[test]
    fn test_legacy_manifest_upgraded() {
        let fixture = FrameworkFixture::new().unwrap();
        let env = fixture.env().unwrap();
        let archive = fixture.root().join("legacy.zip");
        write_zip(
            &archive,
            &[Entry::File("mod_legacy/module.json", r#"{"dependencies": ["napcore"]}"#)],
        );

        let installed = install_module(
            &env,
            &RecordingRunner::new(),
            &archive,
            &InstallOptions::default(),
        )
        .unwrap();
        assert!(installed.upgraded);
        let module = crate::manifest::load_module(&installed.module.dir).unwrap();
        assert_eq!(module.mid, "mod_legacy");
        assert_eq!(module.required_modules, vec!["napcore"]);
    }

    #[test]
    fn test_deploy_and_run_demo() {
        let fixture = FrameworkFixture::new().unwrap();
        fixture.add_module("system_modules", "napcore", &[]).unwrap();
        let env = fixture.env().unwrap();
        let archive = fixture.root().join("sensor.zip");
        write_zip(
            &archive,
            &[
                Entry::File("mod_sensor/module.json", MODULE_JSON),
                Entry::File("mod_sensor/demo/sensordemo/app.json", DEMO_JSON),
                Entry::File(
                    "mod_sensor/demo/sensordemo/module/module.json",
                    r#"{"Type": "Module", "mID": "mod_sensordemo"}"#,
                ),
            ],
        );

        // The build step leaves a binary behind, as the real tool would.
        let binary = env.root.join("apps/sensordemo/bin/Release-x86_64/sensordemo");
        let runner = RecordingRunner::new();
        let built = binary.clone();
        runner.respond_with(move |cmd| {
            if cmd.arg_strings().first().map(String::as_str) == Some("--build") {
                fs::create_dir_all(built.parent()?).ok()?;
                fs::write(&built, "exe").ok()?;
            }
            None
        });

        let options = InstallOptions {
            run_demo: true,
            ..InstallOptions::default()
        };
        let installed = install_module(&env, &runner, &archive, &options).unwrap();
        let demo = installed.demo.unwrap();
        assert!(demo.dir.ends_with("apps/sensordemo"));
        assert_eq!(installed.launched.unwrap().program, binary);

        let read = |path: PathBuf| fs::read_to_string(path).unwrap();
        let module_build_file = read(installed.module.dir.join(BUILD_FILE));
        assert_eq!(module_build_file, "# module build file\n");
        assert_eq!(read(demo.dir.join(BUILD_FILE)), "# app build file\n");
        assert_eq!(read(demo.dir.join("module").join(BUILD_FILE)), module_build_file);

        // generate, build, launch
        assert_eq!(runner.commands().len(), 3);

        let err = install_module(
            &env,
            &runner,
            &archive,
            &InstallOptions {
                force: false,
                deploy_demo: true,
                run_demo: false,
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::ExistingTarget(_)));
    }
}
