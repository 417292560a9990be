//! Manifest upgrade command implementations.

use napbuild_core::manifest::upgrade::{self, UpgradeReport};
use napbuild_core::{Environment, paths};

use crate::colors;

fn print_report(report: &UpgradeReport) {
    for path in &report.upgraded {
        colors::done("Upgraded", path.display());
    }
    for path in &report.merged_configs {
        colors::done("Merged", format!("{} into ServiceConfig", path.display()));
    }
    println!(
        "{} upgraded, {} already current",
        report.upgraded.len(),
        report.unchanged.len()
    );
}

/// Execute `upgrade-app`.
pub fn app(env: &Environment, name: &str) -> anyhow::Result<()> {
    let target = paths::find_app(env, name)?;
    colors::header(&format!("Upgrading app {}", target.id));
    print_report(&upgrade::upgrade_app_dir(&target.dir)?);
    Ok(())
}

/// Execute `upgrade-module`.
pub fn module(env: &Environment, name: &str) -> anyhow::Result<()> {
    let target = paths::find_module(env, name)?;
    colors::header(&format!("Upgrading module {}", target.id));
    print_report(&upgrade::upgrade_module_dir(&target.dir)?);
    Ok(())
}

/// Execute `upgrade-repo`.
pub fn repo(env: &Environment) -> anyhow::Result<()> {
    colors::header("Upgrading apps and modules");
    print_report(&upgrade::upgrade_repo(&env.root)?);
    Ok(())
}

/// Execute `upgrade-all`.
pub fn all(env: &Environment) -> anyhow::Result<()> {
    colors::header("Upgrading the whole framework");
    print_report(&upgrade::upgrade_all(&env.root)?);
    Ok(())
}
