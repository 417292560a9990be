//! napbuild - create, configure, build and package NAP apps and modules.

mod build;
mod colors;
mod create;
mod info;
mod install;
mod package;
mod regenerate;
mod upgrade;

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use napbuild_core::create::{CreateAppOptions, parse_module_list};
use napbuild_core::{BuildType, EnvOptions, Environment};

#[derive(Parser)]
#[command(name = "napbuild")]
#[command(about = "Create, configure, build and package NAP apps and modules")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Framework root (overrides NAP_ROOT)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum BuildTypeArg {
    Debug,
    Release,
}

impl From<BuildTypeArg> for BuildType {
    fn from(arg: BuildTypeArg) -> Self {
        match arg {
            BuildTypeArg::Debug => BuildType::Debug,
            BuildTypeArg::Release => BuildType::Release,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum YesNo {
    Yes,
    No,
}

impl YesNo {
    fn enabled(self) -> bool {
        self == YesNo::Yes
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new app or module from a template
    Create {
        #[command(subcommand)]
        what: CreateCommand,
    },

    /// Generate the build configuration of an app or module
    Regenerate {
        #[command(subcommand)]
        what: RegenerateCommand,
    },

    /// Build an app or module, generating it first when needed
    Build {
        /// App or module name, or path
        target: String,

        #[arg(long, value_enum, default_value = "debug")]
        build_type: BuildTypeArg,

        /// Parallel build jobs (default: logical CPUs)
        #[arg(short, long)]
        jobs: Option<NonZeroUsize>,
    },

    /// Package a built app for distribution
    Package {
        /// App name or path
        app: String,

        /// Leave the napkin editor out
        #[arg(long)]
        no_napkin: bool,

        /// Keep the package as a directory
        #[arg(long)]
        no_zip: bool,

        /// Don't reveal the package when done
        #[arg(long)]
        no_show: bool,
    },

    /// Install a module from a zip archive
    InstallModule {
        /// Path to the module archive
        archive: PathBuf,

        /// Replace an existing module or demo
        #[arg(long, value_enum, default_value = "no")]
        force_overwrite_module: YesNo,

        /// Deploy the module's demo app
        #[arg(long, value_enum, default_value = "no")]
        deploy_demo: YesNo,

        /// Build and run the module's demo app
        #[arg(long, value_enum, default_value = "no")]
        run_demo: YesNo,
    },

    /// Upgrade an app manifest to the current schema
    UpgradeApp {
        /// App name or path
        name: String,
    },

    /// Upgrade a module manifest to the current schema
    UpgradeModule {
        /// Module name or path
        name: String,
    },

    /// Upgrade all user apps and modules
    UpgradeRepo,

    /// Upgrade every app and module in the framework
    UpgradeAll,

    /// Show the resolved environment
    Info,

    /// Remove the build directory of an app or module
    Clean {
        /// App or module name, or path
        target: String,
    },
}

#[derive(Subcommand)]
enum CreateCommand {
    /// Create an app under apps/
    App {
        /// PascalCase app name
        name: String,

        /// Comma-separated modules the app requires
        #[arg(long, default_value = "")]
        modules: String,

        /// Don't create an app-local module
        #[arg(long)]
        no_module: bool,

        /// Comma-separated modules the app-local module requires
        #[arg(long, default_value = "", conflicts_with = "no_module")]
        module_requires: String,

        /// Skip generating the build configuration
        #[arg(long)]
        no_generate: bool,

        /// Don't reveal the generated solution
        #[arg(long)]
        no_show: bool,

        #[arg(long, value_enum, default_value = "debug")]
        build_type: BuildTypeArg,
    },

    /// Create a user module under modules/
    Module {
        /// PascalCase module name
        name: String,

        /// Comma-separated modules this module requires
        #[arg(long, default_value = "")]
        requires: String,

        /// Skip generating the build configuration
        #[arg(long)]
        no_generate: bool,

        #[arg(long, value_enum, default_value = "debug")]
        build_type: BuildTypeArg,
    },
}

#[derive(Subcommand)]
enum RegenerateCommand {
    /// Regenerate an app
    App {
        /// App name or path
        target: String,

        #[arg(long, value_enum, default_value = "debug")]
        build_type: BuildTypeArg,

        /// Don't reveal the generated solution
        #[arg(long)]
        no_show: bool,
    },

    /// Regenerate a module
    Module {
        /// Module name or path
        target: String,

        #[arg(long, value_enum, default_value = "debug")]
        build_type: BuildTypeArg,
    },
}

fn environment(root: Option<PathBuf>) -> anyhow::Result<Environment> {
    let mut options = EnvOptions::from_env()?;
    if let Some(root) = root {
        options = options.with_root(root);
    }
    Ok(Environment::resolve(&options)?)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let env = environment(cli.root)?;

    match cli.command {
        Commands::Create { what } => match what {
            CreateCommand::App {
                name,
                modules,
                no_module,
                module_requires,
                no_generate,
                no_show,
                build_type,
            } => {
                let options = CreateAppOptions {
                    modules: parse_module_list(&modules),
                    with_module: !no_module,
                    module_requires: parse_module_list(&module_requires),
                    no_generate,
                    build_type: build_type.into(),
                };
                create::app(&env, &name, &options, no_show)
            }
            CreateCommand::Module {
                name,
                requires,
                no_generate,
                build_type,
            } => create::module(&env, &name, &requires, no_generate, build_type.into()),
        },

        Commands::Regenerate { what } => match what {
            RegenerateCommand::App {
                target,
                build_type,
                no_show,
            } => regenerate::app(&env, &target, build_type.into(), no_show),
            RegenerateCommand::Module { target, build_type } => {
                regenerate::module(&env, &target, build_type.into())
            }
        },

        Commands::Build {
            target,
            build_type,
            jobs,
        } => build::execute(&env, &target, build_type.into(), jobs),

        Commands::Package {
            app,
            no_napkin,
            no_zip,
            no_show,
        } => package::execute(&env, &app, no_napkin, no_zip, no_show),

        Commands::InstallModule {
            archive,
            force_overwrite_module,
            deploy_demo,
            run_demo,
        } => install::execute(
            &env,
            &archive,
            napbuild_core::InstallOptions {
                force: force_overwrite_module.enabled(),
                deploy_demo: deploy_demo.enabled(),
                run_demo: run_demo.enabled(),
            },
        ),

        Commands::UpgradeApp { name } => upgrade::app(&env, &name),
        Commands::UpgradeModule { name } => upgrade::module(&env, &name),
        Commands::UpgradeRepo => upgrade::repo(&env),
        Commands::UpgradeAll => upgrade::all(&env),

        Commands::Info => info::execute(&env),
        Commands::Clean { target } => regenerate::clean(&env, &target),
    }
}

/// Exit code for a failed command.
fn exit_code(err: &anyhow::Error) -> u8 {
    let code = err
        .downcast_ref::<napbuild_core::Error>()
        .map(napbuild_core::Error::exit_code)
        .unwrap_or(1);
    u8::try_from(code).ok().filter(|c| *c != 0).unwrap_or(1)
}

fn report(err: &anyhow::Error) {
    eprintln!("{}error:{} {err}", colors::RED, colors::RESET);
    let hint = err
        .downcast_ref::<napbuild_core::Error>()
        .and_then(napbuild_core::Error::hint);
    if let Some(hint) = hint {
        eprintln!("{}hint:{} {hint}", colors::DIM, colors::RESET);
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::from(exit_code(&err))
        }
    }
}
