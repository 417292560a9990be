//! Create command implementation.

use napbuild_core::create::{
    self, CreateAppOptions, CreateModuleOptions, Created, parse_module_list,
};
use napbuild_core::{BuildType, Environment, SystemRunner};

use crate::colors;
use crate::regenerate;

fn print_created(env: &Environment, created: &Created, no_show: bool) {
    colors::done(
        "Created",
        format!("{} {} at {}", created.target.kind.as_str(), created.target.id, created.target.dir.display()),
    );
    if let Some(module) = &created.app_module {
        colors::done("Created", format!("app module {} at {}", module.id, module.dir.display()));
    }
    match &created.generated {
        Some(generated) => {
            regenerate::print_generated(&created.target, generated);
            if !no_show {
                regenerate::show_solution(env, &SystemRunner, &generated.build_dirs.build_dir);
            }
        }
        None => println!(
            "{}Skipped generation, run `napbuild regenerate {} {}` when ready{}",
            colors::DIM,
            created.target.kind.as_str(),
            created.target.id,
            colors::RESET
        ),
    }
}

/// Execute `create app`.
pub fn app(
    env: &Environment,
    name: &str,
    options: &CreateAppOptions,
    no_show: bool,
) -> anyhow::Result<()> {
    colors::header(&format!("Creating app {name}"));
    let created = create::create_app(env, &SystemRunner, name, options)?;
    print_created(env, &created, no_show);
    Ok(())
}

/// Execute `create module`.
pub fn module(
    env: &Environment,
    name: &str,
    requires: &str,
    no_generate: bool,
    build_type: BuildType,
) -> anyhow::Result<()> {
    colors::header(&format!("Creating module {name}"));
    let options = CreateModuleOptions {
        requires: parse_module_list(requires),
        no_generate,
        build_type,
    };
    let created = create::create_module(env, &SystemRunner, name, &options)?;
    print_created(env, &created, true);
    Ok(())
}
