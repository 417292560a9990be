//! Regenerate and clean command implementations.

use std::path::Path;

use napbuild_core::generate::{self, Generated};
use napbuild_core::paths::{self, Target};
use napbuild_core::{BuildType, CommandRunner, Environment, GeneratorKind, SystemRunner, reveal};

use crate::colors;

pub fn print_generated(target: &Target, generated: &Generated) {
    let record = &generated.record;
    colors::done(
        "Generated",
        format!("{} in {}", target.id, generated.build_dirs.build_dir.display()),
    );
    println!(
        "  {}modules:{} {}",
        colors::CYAN,
        colors::RESET,
        if record.transitive_modules.is_empty() {
            "(none)".to_string()
        } else {
            record.transitive_modules.join(" ")
        }
    );
    if let Some(build_type) = record.build_type {
        println!("  {}build type:{} {build_type}", colors::CYAN, colors::RESET);
    }
}

/// Reveal an IDE solution. Single-config generators produce none.
pub fn show_solution(env: &Environment, runner: &dyn CommandRunner, build_dir: &Path) {
    if env.generator_kind() != GeneratorKind::MultiConfig {
        return;
    }
    if let Err(e) = reveal::reveal(env, runner, build_dir) {
        tracing::warn!("Could not show {}: {e}", build_dir.display());
    }
}

fn regenerate(env: &Environment, target: &Target, build_type: BuildType, no_show: bool) -> anyhow::Result<()> {
    colors::header(&format!("Regenerating {} {}", target.kind.as_str(), target.id));
    let generated = generate::regenerate(env, &SystemRunner, target, build_type)?;
    print_generated(target, &generated);
    if !no_show {
        show_solution(env, &SystemRunner, &generated.build_dirs.build_dir);
    }
    Ok(())
}

/// Execute `regenerate app`.
pub fn app(env: &Environment, name: &str, build_type: BuildType, no_show: bool) -> anyhow::Result<()> {
    let target = paths::find_app(env, name)?;
    regenerate(env, &target, build_type, no_show)
}

/// Execute `regenerate module`.
pub fn module(env: &Environment, name: &str, build_type: BuildType) -> anyhow::Result<()> {
    let target = paths::find_module(env, name)?;
    regenerate(env, &target, build_type, true)
}

/// Execute `clean`.
pub fn clean(env: &Environment, name: &str) -> anyhow::Result<()> {
    let target = paths::find_target(env, name)?;
    let build_dirs = target.build_dirs(env.generator);
    if build_dirs.clean()? {
        colors::done("Removed", build_dirs.build_dir.display());
    } else {
        println!("{} has no build directory", target.id);
    }
    Ok(())
}
