//! Building a configured target.

use std::num::NonZeroUsize;

use crate::env::Environment;
use crate::error::{Error, Result};
use crate::generate;
use crate::paths::{BuildDirs, Target};
use crate::platform::{BuildType, GeneratorKind};
use crate::process::{CommandRunner, CommandSpec, ProcessOutcome};
use crate::record::ResolvedDependencyRecord;

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    pub build_type: BuildType,
    /// Parallel jobs; one per logical CPU when unset.
    pub jobs: Option<NonZeroUsize>,
}

/// Why a build directory has to be generated again, if it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegenerateReason {
    NotConfigured,
    ManifestChanged,
    BuildTypeChanged,
    UnreadableRecord,
}

impl RegenerateReason {
    pub fn describe(self) -> &'static str {
        match self {
            RegenerateReason::NotConfigured => "not configured yet",
            RegenerateReason::ManifestChanged => "a manifest changed",
            RegenerateReason::BuildTypeChanged => "the build type changed",
            RegenerateReason::UnreadableRecord => "the dependency record is unreadable",
        }
    }
}

/// Decide whether `build_dirs` must be generated before building.
pub fn regenerate_reason(
    env: &Environment,
    build_dirs: &BuildDirs,
    build_type: BuildType,
) -> Result<Option<RegenerateReason>> {
    if !build_dirs.is_configured() {
        return Ok(Some(RegenerateReason::NotConfigured));
    }
    let record = match ResolvedDependencyRecord::read(&build_dirs.record_path) {
        Ok(record) => record,
        Err(e) => {
            tracing::debug!("Discarding dependency record: {e}");
            return Ok(Some(RegenerateReason::UnreadableRecord));
        }
    };
    if record.is_stale(&build_dirs.record_path)? {
        return Ok(Some(RegenerateReason::ManifestChanged));
    }
    if env.generator_kind() == GeneratorKind::SingleConfig && record.build_type != Some(build_type)
    {
        return Ok(Some(RegenerateReason::BuildTypeChanged));
    }
    Ok(None)
}

pub fn default_jobs() -> NonZeroUsize {
    std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN)
}

/// Native build command for a configured target.
pub fn build_command(
    env: &Environment,
    target: &Target,
    build_dirs: &BuildDirs,
    options: &BuildOptions,
) -> CommandSpec {
    let jobs = options.jobs.unwrap_or_else(default_jobs);
    let mut command = CommandSpec::new(&env.generator_binary)
        .arg("--build")
        .arg(&build_dirs.build_dir)
        .arg("--target")
        .arg(target.build_target_name());
    if env.generator_kind() == GeneratorKind::MultiConfig {
        command = command
            .arg("--config")
            .arg(options.build_type.as_str());
    }
    command
        .arg("--parallel")
        .arg(jobs.to_string())
        .current_dir(&target.dir)
}

/// What a build did.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub regenerated: Option<RegenerateReason>,
    pub command: CommandSpec,
}

/// Build `target`, generating its build directory first when needed.
///
/// The build tool's exit code is carried in `BuildFailed`. A build tool
/// killed by a signal is reported as `BuildAborted` and not retried.
pub fn build(
    env: &Environment,
    runner: &dyn CommandRunner,
    target: &Target,
    options: &BuildOptions,
) -> Result<BuildReport> {
    let build_dirs = target.build_dirs(env.generator);

    let regenerated = regenerate_reason(env, &build_dirs, options.build_type)?;
    if let Some(reason) = regenerated {
        tracing::info!("Regenerating {}: {}", target.id, reason.describe());
        generate::regenerate(env, runner, target, options.build_type)?;
    }

    let command = build_command(env, target, &build_dirs, options);
    tracing::info!("Building {} ({})", target.id, options.build_type);

    match runner.run(&command)? {
        ProcessOutcome::Exited(0) => Ok(BuildReport {
            regenerated,
            command,
        }),
        ProcessOutcome::Exited(code) => Err(Error::BuildFailed {
            target: target.id.clone(),
            code,
        }),
        ProcessOutcome::Signaled(signal) => Err(Error::BuildAborted {
            target: target.id.clone(),
            signal,
        }),
    }
}
