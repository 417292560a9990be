//! Error types for napbuild-core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for napbuild-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// What a template script was materializing when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    App,
    Module,
}

impl std::fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateKind::App => f.write_str("app"),
            TemplateKind::Module => f.write_str("module"),
        }
    }
}

/// Errors that can occur in napbuild-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller-supplied input failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// App, module or demo could not be located under any search root.
    #[error("{kind} not found: {name}")]
    TargetNotFound { kind: &'static str, name: String },

    /// Refusing to overwrite something that already exists.
    #[error("{0} already exists")]
    ExistingTarget(String),

    /// A manifest file does not exist.
    #[error("manifest not found: {}", .0.display())]
    ManifestNotFound(PathBuf),

    /// A manifest could not be parsed or violates its schema.
    #[error("malformed manifest {}: {message}", path.display())]
    ManifestMalformed { path: PathBuf, message: String },

    /// The framework root could not be established.
    #[error("NAP framework root not found (searched: {searched})")]
    EnvironmentNotFound { searched: String },

    /// An external tool the orchestrator depends on is absent.
    #[error("toolchain missing: {0}")]
    ToolchainMissing(String),

    /// A template materialization script exited with a nonzero code.
    #[error("{kind} template failed with exit code {code}")]
    TemplateFailure { kind: TemplateKind, code: i32 },

    /// The build-system generator exited with a nonzero code.
    #[error("generation failed for {}{}", target.display(), code.map(|c| format!(" (exit code {c})")).unwrap_or_default())]
    ConfigureFailed { target: PathBuf, code: Option<i32> },

    /// The native build tool exited with a nonzero code.
    #[error("build of {target} failed with exit code {code}")]
    BuildFailed { target: String, code: i32 },

    /// The native build tool was terminated by a signal.
    #[error("build of {target} was terminated externally by signal {signal}")]
    BuildAborted { target: String, signal: i32 },

    /// Archive could not be read or written.
    #[error("archive error: {0}")]
    Archive(String),

    /// JSON error outside of manifest parsing.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn malformed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::ManifestMalformed {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn app_not_found(name: impl Into<String>) -> Self {
        Error::TargetNotFound {
            kind: "app",
            name: name.into(),
        }
    }

    pub fn module_not_found(name: impl Into<String>) -> Self {
        Error::TargetNotFound {
            kind: "module",
            name: name.into(),
        }
    }

    /// Process exit code reported by the CLI for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidInput(_)
            | Error::ManifestMalformed { .. }
            | Error::Archive(_)
            | Error::Json(_)
            | Error::Io(_) => 1,
            Error::TargetNotFound { .. }
            | Error::ExistingTarget(_)
            | Error::ManifestNotFound(_)
            | Error::EnvironmentNotFound { .. }
            | Error::ToolchainMissing(_) => 2,
            Error::TemplateFailure {
                kind: TemplateKind::App,
                ..
            } => 3,
            Error::ConfigureFailed { .. } => 4,
            Error::TemplateFailure {
                kind: TemplateKind::Module,
                ..
            } => 5,
            Error::BuildFailed { code, .. } => *code,
            Error::BuildAborted { signal, .. } => 128 + signal,
        }
    }

    /// A short recovery hint, when one is known.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Error::EnvironmentNotFound { .. } => {
                Some("run from inside a NAP framework or set NAP_ROOT / --root")
            }
            Error::ToolchainMissing(_) => {
                Some("check the framework's thirdparty directory is complete")
            }
            Error::ExistingTarget(_) => Some("pick another name or pass the force option"),
            Error::ManifestMalformed { .. } => {
                Some("fix the JSON by hand or run `napbuild upgrade-app` / `upgrade-module`")
            }
            Error::ConfigureFailed { .. } => {
                Some("the generator output above describes the failure")
            }
            _ => None,
        }
    }
}
