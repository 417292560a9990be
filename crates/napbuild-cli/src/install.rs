//! Install-module command implementation.

use std::path::Path;

use napbuild_core::install::{self, InstallOptions};
use napbuild_core::{Environment, SystemRunner};

use crate::colors;

/// Execute `install-module`.
pub fn execute(env: &Environment, archive: &Path, options: InstallOptions) -> anyhow::Result<()> {
    colors::header(&format!("Installing {}", archive.display()));

    let installed = install::install_module(env, &SystemRunner, archive, &options)?;
    colors::done(
        "Installed",
        format!("{} at {}", installed.module.id, installed.module.dir.display()),
    );
    if installed.upgraded {
        println!(
            "{}Converted legacy module manifest{}",
            colors::DIM,
            colors::RESET
        );
    }
    match &installed.demo {
        Some(demo) => colors::done("Deployed", format!("demo {} at {}", demo.id, demo.dir.display())),
        None if options.deploy_demo || options.run_demo => {
            colors::note(format!("{} bundles no demo", installed.module.id))
        }
        None => {}
    }
    if let Some(command) = &installed.launched {
        colors::done("Launched", command);
    }
    Ok(())
}
