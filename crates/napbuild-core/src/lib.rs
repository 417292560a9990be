//! Build and module orchestration for the NAP framework.
//!
//! This crate discovers apps and modules inside a framework checkout or
//! release, resolves module dependencies from their manifests, drives the
//! external build-system generator, and packages or installs the results.
//!
//! # Architecture
//!
//! ```text
//! Environment ──► Manifest store ──► ModuleResolver + PathMapper
//!                                          │
//!                                          ▼
//!                          ResolvedDependencyRecord (per build dir)
//!                                          │
//!                  ┌───────────────────────┼──────────────────┐
//!                  ▼                       ▼                  ▼
//!             generate::regenerate    build::build     package::package_app
//! ```
//!
//! Every external process goes through a [`process::CommandRunner`], so the
//! whole pipeline runs against a [`testing::RecordingRunner`] in tests.

pub mod build;
pub mod create;
pub mod env;
pub mod error;
pub mod fs_util;
pub mod generate;
pub mod install;
pub mod manifest;
pub mod package;
pub mod path_mapper;
pub mod paths;
pub mod platform;
pub mod process;
pub mod record;
pub mod resolver;
pub mod reveal;
pub mod solution;
pub mod testing;

pub use build::{BuildOptions, BuildReport, RegenerateReason};
pub use env::{BuildContext, EnvOptions, Environment};
pub use error::{Error, Result, TemplateKind};
pub use install::{InstallOptions, Installed};
pub use package::{PackageOptions, PackageReport};
pub use paths::{Target, TargetKind};
pub use platform::{Architecture, BuildType, Generator, GeneratorKind, Platform};
pub use process::{CommandRunner, CommandSpec, ProcessOutcome, SystemRunner};
pub use record::ResolvedDependencyRecord;
pub use resolver::{ModuleResolver, Resolution};
