//! Resolved dependency record.
//!
//! Written into a target's build directory before the generator runs and
//! consumed by the generator's build scripts. The record is removed again
//! when generation fails, so its presence means the last generation
//! succeeded.
//!
//! ```text
//! # Generated by napbuild, do not edit
//! DEPENDENT_MODULES=naprender napscene
//! DEEP_DEPENDENT_MODULES=naprender napscene napcore
//! DEEP_DEPENDENT_RPATHS=../../system_modules/naprender/lib;...
//! BUILD_TYPE=Debug
//! MANIFESTS=/nap/apps/demo/app.json;...
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::manifest::store::write_atomic;
use crate::platform::BuildType;

pub const RECORD_FILENAME: &str = "module_dependencies.txt";

const HEADER: &str = "# Generated by napbuild, do not edit";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedDependencyRecord {
    /// Modules the target asked for, in declaration order.
    pub seed_modules: Vec<String>,
    /// Transitive closure in first-discovery order.
    pub transitive_modules: Vec<String>,
    /// Substituted runtime library search paths.
    pub search_paths: Vec<String>,
    /// Build type baked in by a single-config generator.
    pub build_type: Option<BuildType>,
    /// Manifests that contributed to this record.
    pub manifests: Vec<PathBuf>,
}

impl ResolvedDependencyRecord {
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(HEADER);
        out.push('\n');
        push_line(&mut out, "DEPENDENT_MODULES", &self.seed_modules.join(" "));
        push_line(
            &mut out,
            "DEEP_DEPENDENT_MODULES",
            &self.transitive_modules.join(" "),
        );
        push_line(&mut out, "DEEP_DEPENDENT_RPATHS", &self.search_paths.join(";"));
        if let Some(build_type) = self.build_type {
            push_line(&mut out, "BUILD_TYPE", build_type.as_str());
        }
        let manifests: Vec<_> = self
            .manifests
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect();
        push_line(&mut out, "MANIFESTS", &manifests.join(";"));
        out
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let mut record = Self::default();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::malformed(path, format!("line {}: expected KEY=value", index + 1))
            })?;
            match key {
                "DEPENDENT_MODULES" => record.seed_modules = split(value, ' '),
                "DEEP_DEPENDENT_MODULES" => record.transitive_modules = split(value, ' '),
                "DEEP_DEPENDENT_RPATHS" => record.search_paths = split(value, ';'),
                "BUILD_TYPE" => record.build_type = Some(value.parse()?),
                "MANIFESTS" => {
                    record.manifests = split(value, ';').into_iter().map(PathBuf::from).collect()
                }
                other => tracing::debug!("Ignoring unknown record key {other}"),
            }
        }
        Ok(record)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.render().as_bytes())?;
        tracing::debug!("Wrote dependency record {}", path.display());
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, path)
    }

    /// Remove a record, ignoring one that isn't there.
    pub fn remove(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => {
                tracing::debug!("Removed dependency record {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether any contributing manifest changed after the record at `path`
    /// was written. A missing manifest counts as a change.
    pub fn is_stale(&self, path: &Path) -> Result<bool> {
        let written = modified(path)?;
        for manifest in &self.manifests {
            match fs::metadata(manifest).and_then(|m| m.modified()) {
                Ok(time) if time <= written => {}
                Ok(_) => {
                    tracing::debug!("{} is newer than the record", manifest.display());
                    return Ok(true);
                }
                Err(_) => {
                    tracing::debug!("{} no longer exists", manifest.display());
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

fn push_line(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push('=');
    out.push_str(value);
    out.push('\n');
}

fn split(value: &str, separator: char) -> Vec<String> {
    value
        .split(separator)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn modified(path: &Path) -> Result<SystemTime> {
    Ok(fs::metadata(path)?.modified()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sample() -> ResolvedDependencyRecord {
        ResolvedDependencyRecord {
            seed_modules: vec!["render".into(), "scene".into()],
            transitive_modules: vec!["render".into(), "scene".into(), "core".into()],
            search_paths: vec!["../../modules/foo/lib/x86_64".into()],
            build_type: Some(BuildType::Release),
            manifests: vec![PathBuf::from("/nap/apps/demo/app.json")],
        }
    }

    #[test]
    fn test_render_format() {
        let text = sample().render();
        assert!(text.contains("DEPENDENT_MODULES=render scene\n"));
        assert!(text.contains("DEEP_DEPENDENT_MODULES=render scene core\n"));
        assert!(text.contains("DEEP_DEPENDENT_RPATHS=../../modules/foo/lib/x86_64\n"));
        assert!(text.contains("BUILD_TYPE=Release\n"));

        let parsed = ResolvedDependencyRecord::parse(&text, Path::new("r")).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ResolvedDependencyRecord::parse("nonsense", Path::new("r")).is_err());
        let empty = ResolvedDependencyRecord::parse("# only a comment\n", Path::new("r")).unwrap();
        assert!(empty.transitive_modules.is_empty());
        assert_eq!(empty.build_type, None);
    }

    #[test]
    fn test_staleness() {
        let temp = TempDir::new().unwrap();
        let manifest = temp.path().join("module.json");
        fs::write(&manifest, "{}").unwrap();

        let record_path = temp.path().join(RECORD_FILENAME);
        let record = ResolvedDependencyRecord {
            manifests: vec![manifest.clone()],
            ..ResolvedDependencyRecord::default()
        };
        record.write(&record_path).unwrap();

        let past = SystemTime::now() - Duration::from_secs(60);
        fs::File::options()
            .write(true)
            .open(&manifest)
            .unwrap()
            .set_modified(past)
            .unwrap();
        assert!(!record.is_stale(&record_path).unwrap());

        let future = SystemTime::now() + Duration::from_secs(60);
        fs::File::options()
            .write(true)
            .open(&manifest)
            .unwrap()
            .set_modified(future)
            .unwrap();
        assert!(record.is_stale(&record_path).unwrap());

        fs::remove_file(&manifest).unwrap();
        assert!(record.is_stale(&record_path).unwrap());
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(RECORD_FILENAME);
        ResolvedDependencyRecord::remove(&path).unwrap();
        fs::write(&path, "").unwrap();
        ResolvedDependencyRecord::remove(&path).unwrap();
        assert!(!path.exists());
    }
}
