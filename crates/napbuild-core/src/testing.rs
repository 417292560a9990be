//! Test harnesses for orchestration code.
//!
//! [`RecordingRunner`] stands in for the host toolchain: it records every
//! command and answers with scripted outcomes. [`FrameworkFixture`] lays out
//! a throw-away packaged framework with a stub generator binary.
//!
//! # Example
//!
//! ```
//! use napbuild_core::process::{CommandRunner, CommandSpec, ProcessOutcome};
//! use napbuild_core::testing::RecordingRunner;
//!
//! let runner = RecordingRunner::new();
//! runner.push_outcome(ProcessOutcome::Exited(2));
//!
//! let first = runner.run(&CommandSpec::new("cmake").arg("--build")).unwrap();
//! let second = runner.run(&CommandSpec::new("cmake")).unwrap();
//!
//! assert_eq!(first, ProcessOutcome::Exited(2));
//! assert_eq!(second, ProcessOutcome::Exited(0));
//! assert_eq!(runner.commands().len(), 2);
//! ```

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::json;
use tempfile::TempDir;

use crate::env::{EnvOptions, Environment};
use crate::error::{Result, TemplateKind};
use crate::manifest::store::write_atomic;
use crate::platform::{Architecture, Generator, Platform};
use crate::process::{CapturedOutput, CommandRunner, CommandSpec, ProcessOutcome};

type Responder = Box<dyn Fn(&CommandSpec) -> Option<ProcessOutcome> + Send>;

/// Records commands instead of running them.
///
/// Outcomes are taken from, in order: the first responder that answers,
/// the scripted queue, then `Exited(0)`.
#[derive(Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<CommandSpec>>,
    outcomes: Mutex<VecDeque<ProcessOutcome>>,
    stdout: Mutex<VecDeque<String>>,
    responders: Mutex<Vec<Responder>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next command.
    pub fn push_outcome(&self, outcome: ProcessOutcome) {
        lock(&self.outcomes).push_back(outcome);
    }

    /// Queue the stdout of the next captured command.
    pub fn push_stdout(&self, stdout: impl Into<String>) {
        lock(&self.stdout).push_back(stdout.into());
    }

    /// Answer commands with a closure, which may also touch the filesystem
    /// the way the real tool would. Returning `None` falls through.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&CommandSpec) -> Option<ProcessOutcome> + Send + 'static,
    {
        lock(&self.responders).push(Box::new(responder));
    }

    /// Every command seen so far.
    pub fn commands(&self) -> Vec<CommandSpec> {
        lock(&self.commands).clone()
    }

    /// Commands whose arguments contain `needle`.
    pub fn commands_with_arg(&self, needle: &str) -> Vec<CommandSpec> {
        self.commands()
            .into_iter()
            .filter(|c| c.arg_strings().iter().any(|a| a == needle))
            .collect()
    }

    fn record(&self, command: &CommandSpec) -> ProcessOutcome {
        lock(&self.commands).push(command.clone());
        let answered = lock(&self.responders)
            .iter()
            .find_map(|responder| responder(command));
        answered
            .or_else(|| lock(&self.outcomes).pop_front())
            .unwrap_or(ProcessOutcome::Exited(0))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CommandRunner for RecordingRunner {
    fn run(&self, command: &CommandSpec) -> Result<ProcessOutcome> {
        Ok(self.record(command))
    }

    fn capture(&self, command: &CommandSpec) -> Result<CapturedOutput> {
        let outcome = self.record(command);
        let stdout = lock(&self.stdout).pop_front().unwrap_or_default();
        Ok(CapturedOutput { outcome, stdout })
    }

    fn launch(&self, command: &CommandSpec) -> Result<()> {
        self.record(command);
        Ok(())
    }
}

/// A packaged framework in a temporary directory.
pub struct FrameworkFixture {
    temp: TempDir,
    platform: Platform,
    arch: Architecture,
    generator: Option<Generator>,
}

impl FrameworkFixture {
    /// Packaged framework for Linux x86_64 with a stub generator.
    pub fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        fs::create_dir_all(temp.path().join("system_modules"))?;
        let fixture = Self {
            temp,
            platform: Platform::Linux,
            arch: Architecture::X86_64,
            generator: None,
        };
        fixture.write_stub_generator(0)?;
        for kind in [TemplateKind::App, TemplateKind::Module] {
            let script = crate::create::template_script(fixture.root(), kind);
            write_atomic(&script, b"# template\n")?;
            let build_file = crate::create::template_build_file(fixture.root(), kind);
            write_atomic(&build_file, format!("# {kind} build file\n").as_bytes())?;
        }
        Ok(fixture)
    }

    pub fn with_platform(mut self, platform: Platform) -> Result<Self> {
        self.platform = platform;
        self.write_stub_generator(0)?;
        Ok(self)
    }

    pub fn with_generator(mut self, generator: Generator) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn options(&self) -> EnvOptions {
        EnvOptions {
            root: Some(self.root().to_path_buf()),
            generator: self.generator,
            platform: Some(self.platform),
            arch: Some(self.arch),
            ..EnvOptions::default()
        }
    }

    pub fn env(&self) -> Result<Environment> {
        Environment::at_root(self.root(), &self.options())
    }

    /// Path of the file the stub generator appends its arguments to.
    pub fn generator_log(&self) -> PathBuf {
        self.root().join("generator_calls.log")
    }

    /// Install a generator script that logs its arguments and exits with
    /// `exit_code`.
    pub fn write_stub_generator(&self, exit_code: i32) -> Result<PathBuf> {
        let bin = self.root().join("thirdparty").join("cmake").join("bin");
        let path = bin.join(format!("cmake{}", self.platform.exe_suffix()));
        let script = format!(
            "#!/bin/sh\necho \"$@\" >> \"{}\"\nexit {exit_code}\n",
            self.generator_log().display()
        );
        write_atomic(&path, script.as_bytes())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&path)?.permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&path, perms)?;
        }
        Ok(path)
    }

    /// Add a current-schema module under `parent` (`system_modules` or `modules`).
    pub fn add_module(&self, parent: &str, id: &str, requires: &[&str]) -> Result<PathBuf> {
        self.add_module_with_paths(parent, id, requires, &[])
    }

    pub fn add_module_with_paths(
        &self,
        parent: &str,
        id: &str,
        requires: &[&str],
        linux_paths: &[&str],
    ) -> Result<PathBuf> {
        let dir = self.root().join(parent).join(id);
        let manifest = json!({
            "Type": "Module",
            "mID": id,
            "RequiredModules": requires,
            "LibrarySearchPaths": {"linux": linux_paths}
        });
        write_atomic(
            &dir.join("module.json"),
            serde_json::to_string_pretty(&manifest)?.as_bytes(),
        )?;
        Ok(dir)
    }

    /// Add a current-schema app under `apps/<lowercase title>`.
    pub fn add_app(&self, title: &str, requires: &[&str]) -> Result<PathBuf> {
        self.add_app_under("apps", title, requires)
    }

    pub fn add_app_under(&self, parent: &str, title: &str, requires: &[&str]) -> Result<PathBuf> {
        let dir = self.root().join(parent).join(title.to_lowercase());
        let manifest = json!({
            "Type": "App",
            "mID": "ProjectInfo",
            "Title": title,
            "Version": "0.1",
            "RequiredModules": requires,
            "ServiceConfig": [],
            "PathMapping": "cache/path_mapping.json",
            "Data": ""
        });
        write_atomic(
            &dir.join("app.json"),
            serde_json::to_string_pretty(&manifest)?.as_bytes(),
        )?;
        Ok(dir)
    }

    /// Give an app an app-local module.
    pub fn add_app_module(&self, app_dir: &Path, requires: &[&str]) -> Result<PathBuf> {
        let dir = app_dir.join("module");
        let manifest = json!({
            "Type": "Module",
            "mID": crate::paths::app_module_id(app_dir),
            "RequiredModules": requires
        });
        write_atomic(
            &dir.join("module.json"),
            serde_json::to_string_pretty(&manifest)?.as_bytes(),
        )?;
        Ok(dir)
    }
}
