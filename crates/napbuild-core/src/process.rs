//! Child process execution.
//!
//! Every external tool (generator, build tool, template scripts, platform
//! tools) is started through a [`CommandRunner`], so the orchestration logic
//! can be exercised without the real toolchain.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use crate::error::{Error, Result};

/// A command line to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Arguments as lossy strings, for logging and assertions.
    pub fn arg_strings(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect()
    }

    /// Program file name without directory.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.contains(' ') {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Exited(i32),
    /// Terminated by a signal.
    Signaled(i32),
}

impl ProcessOutcome {
    pub fn success(self) -> bool {
        self == ProcessOutcome::Exited(0)
    }

    /// Exit code as a shell would report it.
    pub fn code(self) -> i32 {
        match self {
            ProcessOutcome::Exited(code) => code,
            ProcessOutcome::Signaled(signal) => 128 + signal,
        }
    }

    fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ProcessOutcome::Exited(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ProcessOutcome::Signaled(signal);
            }
        }
        ProcessOutcome::Exited(1)
    }
}

/// Output of a captured command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub outcome: ProcessOutcome,
    pub stdout: String,
}

/// Starts child processes and waits for them.
pub trait CommandRunner {
    /// Run with inherited stdio and wait for completion.
    fn run(&self, command: &CommandSpec) -> Result<ProcessOutcome>;

    /// Run and collect stdout.
    fn capture(&self, command: &CommandSpec) -> Result<CapturedOutput>;

    /// Start without waiting. Used to launch built apps.
    fn launch(&self, command: &CommandSpec) -> Result<()>;
}

/// Runs commands on the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &CommandSpec) -> Result<ProcessOutcome> {
        tracing::debug!("Running: {command}");
        let mut child = command
            .to_command()
            .spawn()
            .map_err(|e| spawn_error(&command.program, e))?;

        let status = {
            let _guard = InterruptGuard::new();
            child.wait()?
        };
        Ok(ProcessOutcome::from_status(status))
    }

    fn capture(&self, command: &CommandSpec) -> Result<CapturedOutput> {
        tracing::debug!("Capturing: {command}");
        let output = command
            .to_command()
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|e| spawn_error(&command.program, e))?;

        Ok(CapturedOutput {
            outcome: ProcessOutcome::from_status(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }

    fn launch(&self, command: &CommandSpec) -> Result<()> {
        tracing::debug!("Launching: {command}");
        command
            .to_command()
            .spawn()
            .map_err(|e| spawn_error(&command.program, e))?;
        Ok(())
    }
}

fn spawn_error(program: &Path, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::ToolchainMissing(format!("{} could not be started", program.display()))
    } else {
        Error::Io(e)
    }
}

/// Ignores SIGINT and SIGQUIT in this process while alive, so an interrupt
/// from the terminal is handled by the child alone.
struct InterruptGuard {
    #[cfg(unix)]
    previous: [libc::sighandler_t; 2],
}

impl InterruptGuard {
    #[cfg(unix)]
    fn new() -> Self {
        // SAFETY: installing SIG_IGN is async-signal-safe and the previous
        // handlers are restored on drop.
        let previous = unsafe {
            [
                libc::signal(libc::SIGINT, libc::SIG_IGN),
                libc::signal(libc::SIGQUIT, libc::SIG_IGN),
            ]
        };
        Self { previous }
    }

    #[cfg(not(unix))]
    fn new() -> Self {
        Self {}
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        // SAFETY: restores the handlers saved in `new`.
        unsafe {
            libc::signal(libc::SIGINT, self.previous[0]);
            libc::signal(libc::SIGQUIT, self.previous[1]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_spaces() {
        let spec = CommandSpec::new("/opt/cmake")
            .args(["-G", "Unix Makefiles"])
            .arg("-S.");
        assert_eq!(spec.to_string(), "/opt/cmake -G \"Unix Makefiles\" -S.");
        assert_eq!(spec.program_name(), "cmake");
    }

    #[test]
    fn test_outcome_codes() {
        assert!(ProcessOutcome::Exited(0).success());
        assert!(!ProcessOutcome::Signaled(6).success());
        assert_eq!(ProcessOutcome::Exited(3).code(), 3);
        assert_eq!(ProcessOutcome::Signaled(libc::SIGABRT).code(), 128 + libc::SIGABRT);
    }

    #[test]
    fn test_missing_program_is_toolchain_error() {
        let spec = CommandSpec::new("/definitely/not/a/real/tool");
        let err = SystemRunner.run(&spec).unwrap_err();
        assert!(matches!(err, Error::ToolchainMissing(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_exit_codes() {
        let ok = SystemRunner
            .run(&CommandSpec::new("sh").args(["-c", "exit 0"]))
            .unwrap();
        assert_eq!(ok, ProcessOutcome::Exited(0));

        let failed = SystemRunner
            .run(&CommandSpec::new("sh").args(["-c", "exit 7"]))
            .unwrap();
        assert_eq!(failed, ProcessOutcome::Exited(7));

        let aborted = SystemRunner
            .run(&CommandSpec::new("sh").args(["-c", "kill -ABRT $$"]))
            .unwrap();
        assert_eq!(aborted, ProcessOutcome::Signaled(libc::SIGABRT));

        let captured = SystemRunner
            .capture(&CommandSpec::new("sh").args(["-c", "echo hello"]))
            .unwrap();
        assert_eq!(captured.stdout.trim(), "hello");
    }
}
