//! Creating apps and modules from templates.
//!
//! A template script materializes the sources and build files; the manifests
//! are written here. Every check that can refuse the request runs before
//! anything is written.

use std::path::{Path, PathBuf};

use crate::env::Environment;
use crate::error::{Error, Result, TemplateKind};
use crate::generate::{self, Generated};
use crate::manifest::store::{to_pretty_string, write_atomic};
use crate::manifest::{AppManifest, ModuleManifest};
use crate::paths::{
    self, APP_MANIFEST, APP_MODULE_DIR, MODULE_MANIFEST, Target, USER_MODULE_PREFIX,
};
use crate::platform::BuildType;
use crate::process::{CommandRunner, CommandSpec, ProcessOutcome};
use crate::solution;

/// Build-system entry file of an app or module.
pub const BUILD_FILE: &str = "CMakeLists.txt";

fn creator_name(kind: TemplateKind) -> &'static str {
    match kind {
        TemplateKind::App => "app_creator",
        TemplateKind::Module => "module_creator",
    }
}

/// Template script for `kind` under `root`.
pub fn template_script(root: &Path, kind: TemplateKind) -> PathBuf {
    let name = creator_name(kind);
    root.join("cmake").join(name).join(format!("{name}.cmake"))
}

/// Build file the template gives every app or module of `kind`.
pub fn template_build_file(root: &Path, kind: TemplateKind) -> PathBuf {
    root.join("cmake")
        .join(creator_name(kind))
        .join("template")
        .join(BUILD_FILE)
}

/// Validate a PascalCase app or module name.
///
/// A leading `mod_` is ignored. Returns the name without it.
pub fn validate_name(name: &str) -> Result<&str> {
    let name = name.strip_prefix(USER_MODULE_PREFIX).unwrap_or(name);

    if name.chars().count() < 2 {
        return Err(Error::InvalidInput(format!(
            "name '{name}' must be at least two characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::InvalidInput(format!(
            "name '{name}' contains invalid characters, use only A-Z, a-z, 0-9, '-' or '_'"
        )));
    }
    if !name.starts_with(|c: char| c.is_ascii_uppercase()) {
        return Err(Error::InvalidInput(format!(
            "name '{name}' must be PascalCase and start with an uppercase letter"
        )));
    }
    if !name.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(Error::InvalidInput(format!(
            "name '{name}' must be PascalCase, not all uppercase"
        )));
    }
    Ok(name)
}

/// Split a comma-separated module list.
pub fn parse_module_list(list: &str) -> Vec<String> {
    let mut modules: Vec<String> = Vec::new();
    for module in list.split(',').map(str::trim).filter(|m| !m.is_empty()) {
        if !modules.iter().any(|m| m == module) {
            modules.push(module.to_string());
        }
    }
    modules
}

#[derive(Debug, Clone, Default)]
pub struct CreateAppOptions {
    /// Modules the app requires.
    pub modules: Vec<String>,
    /// Create an app-local module.
    pub with_module: bool,
    /// Modules the app-local module requires.
    pub module_requires: Vec<String>,
    /// Skip solution generation.
    pub no_generate: bool,
    pub build_type: BuildType,
}

#[derive(Debug, Clone, Default)]
pub struct CreateModuleOptions {
    pub requires: Vec<String>,
    pub no_generate: bool,
    pub build_type: BuildType,
}

/// What was created.
#[derive(Debug, Clone)]
pub struct Created {
    pub target: Target,
    /// App-local module created alongside an app.
    pub app_module: Option<Target>,
    /// Generation result unless generation was skipped.
    pub generated: Option<Generated>,
}

fn run_template(
    env: &Environment,
    runner: &dyn CommandRunner,
    kind: TemplateKind,
    defines: Vec<String>,
) -> Result<()> {
    let script = template_script(&env.root, kind);
    if !script.is_file() {
        return Err(Error::ToolchainMissing(format!(
            "{kind} template not found at {}",
            script.display()
        )));
    }

    let command = CommandSpec::new(&env.generator_binary)
        .args(defines)
        .arg("-P")
        .arg(&script)
        .current_dir(&env.root);

    match runner.run(&command)? {
        ProcessOutcome::Exited(0) => Ok(()),
        outcome => Err(Error::TemplateFailure {
            kind,
            code: outcome.code(),
        }),
    }
}

fn write_manifest<T: serde::Serialize>(path: &Path, manifest: &T) -> Result<()> {
    write_atomic(path, to_pretty_string(manifest)?.as_bytes())
}

/// Create an app under `apps/`.
///
/// # Errors
///
/// - `InvalidInput` when the name isn't PascalCase
/// - `ExistingTarget` when an app, demo or example has the same id
/// - `TemplateFailure` when a template script fails
/// - `ConfigureFailed` when generating the new app fails
pub fn create_app(
    env: &Environment,
    runner: &dyn CommandRunner,
    name: &str,
    options: &CreateAppOptions,
) -> Result<Created> {
    if name.starts_with(USER_MODULE_PREFIX) {
        return Err(Error::InvalidInput(format!(
            "app name '{name}' may not start with '{USER_MODULE_PREFIX}'"
        )));
    }
    let name = validate_name(name)?;
    if let Some(existing) = paths::existing_app_dir(env, name) {
        return Err(Error::ExistingTarget(format!(
            "{} at {}",
            paths::app_dir_name(name),
            existing.display()
        )));
    }

    let app_dir = env.root.join("apps").join(paths::app_dir_name(name));
    tracing::info!("Creating app {name} at {}", app_dir.display());

    let mut defines = vec![
        format!("-DAPP_NAME={name}"),
        format!("-DAPP_DIR={}", app_dir.display()),
        format!("-DMODULE_LIST={}", options.modules.join(",")),
    ];
    if options.with_module {
        defines.push("-DINCLUDE_MODULE=1".to_string());
    }
    run_template(env, runner, TemplateKind::App, defines)?;

    write_manifest(
        &app_dir.join(APP_MANIFEST),
        &AppManifest::new(name, options.modules.clone()),
    )?;

    let app_module = if options.with_module {
        let module_dir = app_dir.join(APP_MODULE_DIR);
        let id = paths::app_module_id(&app_dir);
        run_template(
            env,
            runner,
            TemplateKind::Module,
            vec![
                format!("-DMODULE_NAME={name}"),
                format!("-DMODULE_DIR={}", module_dir.display()),
                "-DAPP_MODULE=1".to_string(),
                format!("-DAPP_DIR={}", app_dir.display()),
            ],
        )?;
        write_manifest(
            &module_dir.join(MODULE_MANIFEST),
            &ModuleManifest::new(id, options.module_requires.clone()),
        )?;
        Some(Target::module(module_dir))
    } else {
        None
    };

    solution::add_target(env, &app_dir)?;

    let target = Target::app(app_dir);
    let generated = if options.no_generate {
        None
    } else {
        Some(generate::regenerate(env, runner, &target, options.build_type)?)
    };

    Ok(Created {
        target,
        app_module,
        generated,
    })
}

/// Create a user module under `modules/`.
pub fn create_module(
    env: &Environment,
    runner: &dyn CommandRunner,
    name: &str,
    options: &CreateModuleOptions,
) -> Result<Created> {
    let name = validate_name(name)?;
    let id = paths::user_module_id(name);
    let module_dir = env.root.join("modules").join(&id);
    if module_dir.exists() {
        return Err(Error::ExistingTarget(format!(
            "module {id} at {}",
            module_dir.display()
        )));
    }

    tracing::info!("Creating module {id} at {}", module_dir.display());
    run_template(
        env,
        runner,
        TemplateKind::Module,
        vec![
            format!("-DMODULE_NAME={name}"),
            format!("-DMODULE_DIR={}", module_dir.display()),
        ],
    )?;
    write_manifest(
        &module_dir.join(MODULE_MANIFEST),
        &ModuleManifest::new(id, options.requires.clone()),
    )?;

    solution::add_target(env, &module_dir)?;

    let target = Target::module(module_dir);
    let generated = if options.no_generate {
        None
    } else {
        Some(generate::regenerate(env, runner, &target, options.build_type)?)
    };

    Ok(Created {
        target,
        app_module: None,
        generated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest;
    use crate::testing::{FrameworkFixture, RecordingRunner};
    use std::fs;

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("MyApp").unwrap(), "MyApp");
        assert_eq!(validate_name("mod_MyModule").unwrap(), "MyModule");
        assert_eq!(validate_name("Audio-Io_2").unwrap(), "Audio-Io_2");

        for bad in ["", "M", "myApp", "MYAPP", "My App", "My.App", "1App", "mod_x"] {
            assert!(
                matches!(validate_name(bad), Err(Error::InvalidInput(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_module_list() {
        assert_eq!(
            parse_module_list(" naprender, napscene,,naprender "),
            vec!["naprender", "napscene"]
        );
        assert!(parse_module_list("").is_empty());
    }

    #[test]
    fn test_create_app_collides_with_demo() {
        let fixture = FrameworkFixture::new().unwrap();
        fixture.add_app_under("demos", "MyApp", &[]).unwrap();
        let env = fixture.env().unwrap();
        let runner = RecordingRunner::new();

        let err = create_app(&env, &runner, "MyApp", &CreateAppOptions::default()).unwrap_err();
        assert!(matches!(err, Error::ExistingTarget(_)));
        assert_eq!(err.exit_code(), 2);
        assert!(runner.commands().is_empty());
        assert!(!env.root.join("apps").exists());
    }

    #[test]
    fn test_create_app_with_module() {
        let fixture = FrameworkFixture::new().unwrap();
        fixture.add_module("system_modules", "naprender", &[]).unwrap();
        let env = fixture.env().unwrap();
        let runner = RecordingRunner::new();

        let options = CreateAppOptions {
            modules: vec!["naprender".into()],
            with_module: true,
            ..CreateAppOptions::default()
        };
        let created = create_app(&env, &runner, "MyApp", &options).unwrap();
        assert!(created.target.dir.ends_with("apps/myapp"));
        assert_eq!(created.app_module.as_ref().unwrap().id, "mod_myapp");

        let app = manifest::load_app(&created.target.dir).unwrap();
        assert_eq!(app.title, "MyApp");
        assert_eq!(app.required_modules, vec!["naprender"]);

        let generated = created.generated.unwrap();
        assert_eq!(
            generated.record.transitive_modules,
            vec!["naprender", "mod_myapp"]
        );

        // app template, module template, generator
        let commands = runner.commands();
        assert_eq!(commands.len(), 3);
        assert!(commands[0].arg_strings().contains(&"-DINCLUDE_MODULE=1".to_string()));
        assert!(commands[1].arg_strings().contains(&"-DAPP_MODULE=1".to_string()));
    }

    #[test]
    fn test_template_failure_exit_codes() {
        let fixture = FrameworkFixture::new().unwrap();
        let env = fixture.env().unwrap();

        let runner = RecordingRunner::new();
        runner.push_outcome(ProcessOutcome::Exited(1));
        let err = create_app(&env, &runner, "MyApp", &CreateAppOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), 3);

        let runner = RecordingRunner::new();
        runner.push_outcome(ProcessOutcome::Exited(1));
        let err =
            create_module(&env, &runner, "Sensor", &CreateModuleOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), 5);
        assert!(!env.root.join("modules/mod_sensor/module.json").exists());
    }

    #[test]
    fn test_create_module() {
        let fixture = FrameworkFixture::new().unwrap();
        let env = fixture.env().unwrap();
        let runner = RecordingRunner::new();

        let options = CreateModuleOptions {
            no_generate: true,
            ..CreateModuleOptions::default()
        };
        let created = create_module(&env, &runner, "mod_Sensor", &options).unwrap();
        assert_eq!(created.target.id, "mod_sensor");
        assert!(created.generated.is_none());
        let module = manifest::load_module(&created.target.dir).unwrap();
        assert_eq!(module.mid, "mod_sensor");

        let err = create_module(&env, &runner, "Sensor", &options).unwrap_err();
        assert!(matches!(err, Error::ExistingTarget(_)));
        assert!(fs::read_dir(env.root.join("modules")).unwrap().count() == 1);
    }
}
