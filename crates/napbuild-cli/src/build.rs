//! Build command implementation.

use std::num::NonZeroUsize;
use std::time::Instant;

use napbuild_core::build::{self, BuildOptions};
use napbuild_core::paths;
use napbuild_core::{BuildType, Environment, SystemRunner};

use crate::colors;

/// Execute `build`.
pub fn execute(
    env: &Environment,
    name: &str,
    build_type: BuildType,
    jobs: Option<NonZeroUsize>,
) -> anyhow::Result<()> {
    let start = Instant::now();
    let target = paths::find_target(env, name)?;
    colors::header(&format!("Building {} ({build_type})", target.id));

    let report = build::build(env, &SystemRunner, &target, &BuildOptions { build_type, jobs })?;
    if let Some(reason) = report.regenerated {
        println!(
            "{}Regenerated first: {}{}",
            colors::DIM,
            reason.describe(),
            colors::RESET
        );
    }
    colors::done(
        "Built",
        format!("{} in {:.2}s", target.id, start.elapsed().as_secs_f64()),
    );
    Ok(())
}
