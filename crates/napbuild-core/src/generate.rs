//! Solution generation.
//!
//! Resolves a target's module closure, writes the dependency record into
//! its build directory and runs the generator there. A failed generation
//! leaves no record behind.

use std::path::PathBuf;

use crate::env::Environment;
use crate::error::{Error, Result};
use crate::manifest;
use crate::path_mapper::PathMapper;
use crate::paths::{APP_MODULE_DIR, BuildDirs, Target, TargetKind};
use crate::platform::{Architecture, BuildType, GeneratorKind, Platform};
use crate::process::{CommandRunner, CommandSpec, ProcessOutcome};
use crate::record::ResolvedDependencyRecord;
use crate::resolver::{ModuleResolver, app_seeds};

/// Result of a successful generation.
#[derive(Debug, Clone)]
pub struct Generated {
    pub build_dirs: BuildDirs,
    pub record: ResolvedDependencyRecord,
    pub command: CommandSpec,
}

/// Flags selected by host platform and generator kind.
///
/// Single-config generators take the build type now; multi-config
/// generators take it at build time and get architecture flags instead.
pub fn generator_flags(
    platform: Platform,
    kind: GeneratorKind,
    build_type: BuildType,
    arch: Architecture,
) -> Vec<String> {
    match (platform, kind) {
        (_, GeneratorKind::SingleConfig) => {
            vec![format!("-DCMAKE_BUILD_TYPE={}", build_type.as_str())]
        }
        (Platform::Windows, GeneratorKind::MultiConfig) => vec!["-A".into(), "x64".into()],
        (Platform::MacOs, GeneratorKind::MultiConfig) => {
            let osx_arch = match arch {
                Architecture::Arm64 => "arm64",
                _ => "x86_64",
            };
            vec![format!("-DCMAKE_OSX_ARCHITECTURES={osx_arch}")]
        }
        (Platform::Linux, GeneratorKind::MultiConfig) => Vec::new(),
    }
}

/// Full generator command for a target.
pub fn generator_command(
    env: &Environment,
    target: &Target,
    build_dirs: &BuildDirs,
    build_type: BuildType,
) -> CommandSpec {
    let mut command = CommandSpec::new(&env.generator_binary)
        .arg("-S")
        .arg(&target.dir)
        .arg("-B")
        .arg(&build_dirs.build_dir)
        .arg("-G")
        .arg(env.generator.cmake_name())
        .args(generator_flags(
            env.platform,
            env.generator_kind(),
            build_type,
            env.arch,
        ))
        .arg(format!(
            "-DNAP_DEPENDENCY_RECORD={}",
            build_dirs.record_path.display()
        ))
        .arg(format!("-DNAP_BUILD_CONTEXT={}", env.context.as_str()))
        .current_dir(&target.dir);

    if let Some(ndk) = &env.android_ndk_root {
        command = command.arg(format!("-DANDROID_NDK_ROOT={}", ndk.display()));
    }
    command
}

/// Resolve the dependency record of a target without touching disk.
pub fn resolve_record(env: &Environment, target: &Target) -> Result<ResolvedDependencyRecord> {
    let manifest_path = target.manifest_path();
    match target.kind {
        TargetKind::App => {
            let app = manifest::load_app(&target.dir)?;
            let mapping = manifest::load_path_mapping(&target.dir, &app)?;
            let mapper = PathMapper::for_app(env, mapping.as_ref());
            let seeds = app_seeds(&target.dir, &app.required_modules);

            let resolution = ModuleResolver::new(env, mapper)
                .with_app(&target.dir)
                .resolve(&seeds)?;
            let mut manifests = vec![manifest_path];
            if mapping.is_some() {
                manifests.push(target.dir.join(&app.path_mapping));
            }
            Ok(resolution.into_record(manifests))
        }
        TargetKind::Module => {
            let module = manifest::load_module(&target.dir)?;
            let mut resolver =
                ModuleResolver::new(env, PathMapper::for_context(env.context, env.arch));
            if let Some(app_dir) = owning_app(target) {
                resolver = resolver.with_app(app_dir);
            }
            let resolution = resolver.resolve(&module.required_modules)?;
            Ok(resolution.into_record(vec![manifest_path]))
        }
    }
}

fn owning_app(target: &Target) -> Option<PathBuf> {
    let is_app_module = target
        .dir
        .file_name()
        .is_some_and(|name| name == APP_MODULE_DIR);
    if !is_app_module {
        return None;
    }
    target
        .dir
        .parent()
        .filter(|app| app.join(crate::paths::APP_MANIFEST).is_file())
        .map(|app| app.to_path_buf())
}

/// Regenerate the build configuration of one target.
///
/// # Errors
///
/// Returns an error if:
/// - A manifest cannot be read or is malformed
/// - The build directory cannot be written
/// - The generator exits with a nonzero code (`ConfigureFailed`)
pub fn regenerate(
    env: &Environment,
    runner: &dyn CommandRunner,
    target: &Target,
    build_type: BuildType,
) -> Result<Generated> {
    let build_dirs = target.build_dirs(env.generator);
    ResolvedDependencyRecord::remove(&build_dirs.record_path)?;

    let mut record = resolve_record(env, target)?;
    if env.generator_kind() == GeneratorKind::SingleConfig {
        record.build_type = Some(build_type);
    }

    build_dirs.ensure()?;
    record.write(&build_dirs.record_path)?;

    let command = generator_command(env, target, &build_dirs, build_type);
    tracing::info!(
        "Generating {} {} ({})",
        target.kind.as_str(),
        target.id,
        env.generator
    );

    let outcome = match runner.run(&command) {
        Ok(outcome) => outcome,
        Err(e) => {
            ResolvedDependencyRecord::remove(&build_dirs.record_path)?;
            return Err(e);
        }
    };

    if !outcome.success() {
        ResolvedDependencyRecord::remove(&build_dirs.record_path)?;
        let code = match outcome {
            ProcessOutcome::Exited(code) => Some(code),
            ProcessOutcome::Signaled(_) => None,
        };
        return Err(Error::ConfigureFailed {
            target: target.dir.clone(),
            code,
        });
    }

    Ok(Generated {
        build_dirs,
        record,
        command,
    })
}
