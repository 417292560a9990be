//! Host platform, architecture, build type and generator kinds.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Host operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
}

impl Platform {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }

    /// Key used in `LibrarySearchPaths` of module manifests.
    pub fn manifest_key(self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
            Platform::Windows => "windows",
        }
    }

    /// Display-friendly name.
    pub fn display_name(self) -> &'static str {
        match self {
            Platform::Linux => "Linux",
            Platform::MacOs => "macOS",
            Platform::Windows => "Windows",
        }
    }

    /// Platform label used in package names.
    pub fn package_label(self) -> &'static str {
        match self {
            Platform::Linux => "Linux",
            Platform::MacOs => "macOS",
            Platform::Windows => "Win64",
        }
    }

    /// Directory name of this platform in the source thirdparty tree.
    pub fn thirdparty_dir(self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
            Platform::Windows => "msvc",
        }
    }

    pub fn default_generator(self) -> Generator {
        match self {
            Platform::Linux => Generator::UnixMakefiles,
            Platform::MacOs => Generator::Xcode,
            Platform::Windows => Generator::VisualStudio,
        }
    }

    pub fn exe_suffix(self) -> &'static str {
        match self {
            Platform::Windows => ".exe",
            _ => "",
        }
    }

    pub fn shared_lib_ext(self) -> &'static str {
        match self {
            Platform::Linux => "so",
            Platform::MacOs => "dylib",
            Platform::Windows => "dll",
        }
    }

    /// Whether `file_name` looks like a shared library on this platform.
    ///
    /// Versioned Linux libraries (`libfoo.so.1.2`) count.
    pub fn is_shared_lib(self, file_name: &str) -> bool {
        match self {
            Platform::Linux => file_name.ends_with(".so") || file_name.contains(".so."),
            Platform::MacOs => file_name.ends_with(".dylib"),
            Platform::Windows => file_name.to_ascii_lowercase().ends_with(".dll"),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// CPU architecture as named by the framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    X86_64,
    Arm64,
    Armhf,
}

impl Architecture {
    pub fn current() -> Self {
        Self::from_machine(std::env::consts::ARCH)
    }

    /// Map a machine string to a framework architecture.
    ///
    /// Anything that is neither x86_64 nor 64-bit ARM is treated as armhf.
    pub fn from_machine(machine: &str) -> Self {
        match machine.to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" => Architecture::X86_64,
            "aarch64" | "arm64" => Architecture::Arm64,
            _ => Architecture::Armhf,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Architecture::X86_64 => "x86_64",
            Architecture::Arm64 => "arm64",
            Architecture::Armhf => "armhf",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BuildType {
    #[default]
    Debug,
    Release,
}

impl BuildType {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildType::Debug => "Debug",
            BuildType::Release => "Release",
        }
    }

    /// Output directory label, e.g. `Release-x86_64`.
    pub fn output_label(self, arch: Architecture) -> String {
        format!("{}-{}", self.as_str(), arch)
    }
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(BuildType::Debug),
            "release" => Ok(BuildType::Release),
            other => Err(Error::InvalidInput(format!(
                "unknown build type '{other}', expected debug or release"
            ))),
        }
    }
}

/// Whether a generator bakes the build type into its output tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorKind {
    /// Build type is fixed at generation time.
    SingleConfig,
    /// Build type is chosen per build invocation.
    MultiConfig,
}

/// Native build-system generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Generator {
    UnixMakefiles,
    Ninja,
    Xcode,
    VisualStudio,
}

impl Generator {
    pub fn kind(self) -> GeneratorKind {
        match self {
            Generator::UnixMakefiles | Generator::Ninja => GeneratorKind::SingleConfig,
            Generator::Xcode | Generator::VisualStudio => GeneratorKind::MultiConfig,
        }
    }

    /// Value passed to the generator's `-G` flag.
    pub fn cmake_name(self) -> &'static str {
        match self {
            Generator::UnixMakefiles => "Unix Makefiles",
            Generator::Ninja => "Ninja",
            Generator::Xcode => "Xcode",
            Generator::VisualStudio => "Visual Studio 17 2022",
        }
    }

    /// Name of the per-target build directory.
    pub fn build_dir_name(self) -> &'static str {
        match self {
            Generator::UnixMakefiles | Generator::Ninja => "build",
            Generator::Xcode => "xcode",
            Generator::VisualStudio => "msvc64",
        }
    }
}

impl fmt::Display for Generator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cmake_name())
    }
}

impl FromStr for Generator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "make" | "makefiles" | "unix makefiles" => Ok(Generator::UnixMakefiles),
            "ninja" => Ok(Generator::Ninja),
            "xcode" => Ok(Generator::Xcode),
            "vs" | "msvc" | "visual studio" => Ok(Generator::VisualStudio),
            other => Err(Error::InvalidInput(format!("unknown generator '{other}'"))),
        }
    }
}
