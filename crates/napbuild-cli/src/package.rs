//! Package command implementation.

use std::time::Instant;

use napbuild_core::package::{self, PackageOptions};
use napbuild_core::{Environment, SystemRunner, paths};

use crate::colors;

/// Execute `package`.
pub fn execute(
    env: &Environment,
    name: &str,
    no_napkin: bool,
    no_zip: bool,
    no_show: bool,
) -> anyhow::Result<()> {
    let start = Instant::now();
    let target = paths::find_app(env, name)?;
    colors::header(&format!("Packaging {}", target.id));

    let options = PackageOptions {
        no_napkin,
        no_zip,
        no_show,
    };
    let report = package::package_app(env, &SystemRunner, &target, &options)?;

    for module in &report.missing_libraries {
        colors::note(format!("no library found for module {module}"));
    }
    println!(
        "  {}libraries:{} {}",
        colors::CYAN,
        colors::RESET,
        report.libraries.len()
    );
    println!(
        "  {}napkin:{} {}",
        colors::CYAN,
        colors::RESET,
        if report.napkin { "included" } else { "skipped" }
    );
    colors::done(
        "Packaged",
        format!(
            "{} in {:.2}s",
            report.output.display(),
            start.elapsed().as_secs_f64()
        ),
    );
    Ok(())
}
