//! Loader path fix-up for macOS packages.
//!
//! Dynamic library references anchored at `/opt`, `/usr/local`, `@rpath` or
//! `@loader_path` are rewritten to point inside the package. Libraries that
//! aren't staged yet are copied in and fixed up themselves, until no new
//! library turns up. Other absolute references are left alone.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;

use crate::env::Environment;
use crate::error::{Error, Result};
use crate::fs_util;
use crate::process::{CommandRunner, CommandSpec};

const SYSTEM_PREFIXES: [&str; 2] = ["/opt/", "/usr/local/"];
const LOADER_PREFIXES: [&str; 2] = ["@rpath/", "@loader_path/"];

/// Library references listed by `otool -L`, without the binary's own
/// header line.
pub fn parse_otool_output(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let reference = line.split(" (").next().unwrap_or(line).trim();
            Some(reference.to_string())
        })
        .collect()
}

/// Whether a reference should point into the package.
pub fn is_relocatable(reference: &str) -> bool {
    SYSTEM_PREFIXES
        .iter()
        .chain(LOADER_PREFIXES.iter())
        .any(|prefix| reference.starts_with(prefix))
}

fn file_name(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

/// Rewrites binaries in a staging directory.
pub struct LoaderFixup<'a> {
    runner: &'a dyn CommandRunner,
    otool: PathBuf,
    install_name_tool: PathBuf,
    /// Staged library directory.
    lib_dir: PathBuf,
    /// Directories searched for `@rpath` and `@loader_path` references.
    search_dirs: Vec<PathBuf>,
}

impl<'a> LoaderFixup<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        otool: PathBuf,
        install_name_tool: PathBuf,
        lib_dir: PathBuf,
        search_dirs: Vec<PathBuf>,
    ) -> Self {
        Self {
            runner,
            otool,
            install_name_tool,
            lib_dir,
            search_dirs,
        }
    }

    /// Locate `otool` and `install_name_tool` on the host.
    pub fn locate(
        env: &Environment,
        runner: &'a dyn CommandRunner,
        lib_dir: PathBuf,
        search_dirs: Vec<PathBuf>,
    ) -> Result<Self> {
        Ok(Self::new(
            runner,
            env.host_tool("otool")?,
            env.host_tool("install_name_tool")?,
            lib_dir,
            search_dirs,
        ))
    }

    fn references(&self, binary: &Path) -> Result<Vec<String>> {
        let output = self
            .runner
            .capture(&CommandSpec::new(&self.otool).arg("-L").arg(binary))?;
        if !output.outcome.success() {
            return Err(Error::ToolchainMissing(format!(
                "otool failed on {}",
                binary.display()
            )));
        }
        Ok(parse_otool_output(&output.stdout))
    }

    fn find_library(&self, reference: &str) -> Option<PathBuf> {
        if SYSTEM_PREFIXES.iter().any(|p| reference.starts_with(p)) {
            let path = PathBuf::from(reference);
            return path.is_file().then_some(path);
        }
        let name = file_name(reference);
        std::iter::once(&self.lib_dir)
            .chain(self.search_dirs.iter())
            .map(|dir| dir.join(name))
            .find(|path| path.exists())
    }

    /// Loader-relative reference from `binary` to a staged library.
    fn loader_reference(&self, binary: &Path, name: &str) -> String {
        let binary_dir = binary.parent().unwrap_or(Path::new("."));
        if binary_dir == self.lib_dir {
            return format!("@loader_path/{name}");
        }
        let depth = binary_dir
            .strip_prefix(self.lib_dir.parent().unwrap_or(Path::new("")))
            .map(|rel| rel.components().count())
            .unwrap_or(0);
        let mut up = String::new();
        for _ in 0..depth {
            up.push_str("../");
        }
        format!("@loader_path/{up}lib/{name}")
    }

    /// Fix up `binaries` and every library they pull in.
    ///
    /// Returns the libraries copied into the package.
    pub fn run(&self, binaries: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut queue: VecDeque<PathBuf> = binaries.iter().cloned().collect();
        let mut visited: FxHashSet<PathBuf> = FxHashSet::default();
        let mut copied = Vec::new();

        while let Some(binary) = queue.pop_front() {
            if !visited.insert(binary.clone()) {
                continue;
            }

            for reference in self.references(&binary)? {
                if !is_relocatable(&reference) {
                    continue;
                }
                let name = file_name(&reference).to_string();
                let staged = self.lib_dir.join(&name);

                if !staged.exists() {
                    match self.find_library(&reference) {
                        Some(source) => {
                            tracing::debug!("Copying {} into package", source.display());
                            fs_util::copy_into(&source, &self.lib_dir)?;
                            copied.push(staged.clone());
                            queue.push_back(staged.clone());
                        }
                        None => {
                            tracing::warn!(
                                "{} references {reference}, which was not found",
                                binary.display()
                            );
                            continue;
                        }
                    }
                }

                let new_reference = self.loader_reference(&binary, &name);
                if new_reference != reference {
                    let command = CommandSpec::new(&self.install_name_tool)
                        .arg("-change")
                        .arg(&reference)
                        .arg(&new_reference)
                        .arg(&binary);
                    let outcome = self.runner.run(&command)?;
                    if !outcome.success() {
                        tracing::warn!(
                            "install_name_tool could not rewrite {reference} in {}",
                            binary.display()
                        );
                    }
                }
            }
        }

        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRunner;
    use std::fs;
    use tempfile::TempDir;

    const OTOOL_APP: &str = "/pkg/demo:\n\
        \t@rpath/libnapcore.dylib (compatibility version 0.0.0, current version 0.0.0)\n\
        \t/usr/lib/libSystem.B.dylib (compatibility version 1.0.0, current version 1311.0.0)\n";

    #[test]
    fn test_parse_otool() {
        assert_eq!(
            parse_otool_output(OTOOL_APP),
            vec!["@rpath/libnapcore.dylib", "/usr/lib/libSystem.B.dylib"]
        );
    }

    #[test]
    fn test_relocatable_prefixes() {
        assert!(is_relocatable("/usr/local/lib/libfoo.dylib"));
        assert!(is_relocatable("/opt/homebrew/lib/libfoo.dylib"));
        assert!(is_relocatable("@loader_path/../lib/libfoo.dylib"));
        assert!(!is_relocatable("/usr/lib/libSystem.B.dylib"));
        assert!(!is_relocatable("/System/Library/Frameworks/Cocoa"));
    }

    #[test]
    fn test_fixed_point_copies_transitive_libraries() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join("staging");
        let lib_dir = staging.join("lib");
        let search = temp.path().join("thirdparty");
        fs::create_dir_all(&lib_dir).unwrap();
        fs::create_dir_all(&search).unwrap();
        fs::write(staging.join("demo"), "").unwrap();
        fs::write(search.join("libnapcore.dylib"), "").unwrap();
        fs::write(search.join("libdep.dylib"), "").unwrap();

        let runner = RecordingRunner::new();
        // demo -> napcore -> dep -> (nothing)
        runner.push_stdout(OTOOL_APP);
        runner.push_stdout("libnapcore.dylib:\n\t@rpath/libdep.dylib (compatibility version 0.0.0)\n");
        runner.push_stdout("libdep.dylib:\n");

        let fixup = LoaderFixup::new(
            &runner,
            PathBuf::from("otool"),
            PathBuf::from("install_name_tool"),
            lib_dir.clone(),
            vec![search],
        );
        let copied = fixup.run(&[staging.join("demo")]).unwrap();
        assert_eq!(
            copied,
            vec![lib_dir.join("libnapcore.dylib"), lib_dir.join("libdep.dylib")]
        );

        let rewrites = runner.commands_with_arg("-change");
        assert_eq!(rewrites.len(), 2);
        assert_eq!(
            rewrites[0].arg_strings()[2],
            "@loader_path/lib/libnapcore.dylib"
        );
        assert_eq!(rewrites[1].arg_strings()[2], "@loader_path/libdep.dylib");
    }
}
