//! Top-level solution index of a source checkout.
//!
//! Lists framework-relative paths of user targets that the top-level build
//! should pick up in addition to its own.

use std::path::Path;

use serde_json::Value;

use crate::env::Environment;
use crate::error::{Error, Result};
use crate::manifest::store::{self, Document};
use crate::paths::framework_relative;

pub const SOLUTION_INFO: &str = "solution_info.json";

fn new_index() -> Document {
    let mut doc = Document::new();
    doc.insert("Type".into(), "SolutionInfo".into());
    doc.insert("mID".into(), "SolutionInfo".into());
    doc.insert("AdditionalTargets".into(), Value::Array(Vec::new()));
    doc
}

/// Add `target_dir` to the index. Does nothing outside a source checkout.
///
/// Returns whether the index was touched.
pub fn add_target(env: &Environment, target_dir: &Path) -> Result<bool> {
    if !env.is_source() {
        return Ok(false);
    }
    let index_path = env.root.join(SOLUTION_INFO);
    let mut doc = if index_path.is_file() {
        store::read_document(&index_path)?
    } else {
        new_index()
    };

    let mut targets =
        store::get_string_list(&doc, "AdditionalTargets", &index_path).map_err(|_| {
            Error::malformed(&index_path, "'AdditionalTargets' must be a list of paths")
        })?;
    targets.push(framework_relative(&env.root, target_dir));
    targets.sort();
    targets.dedup();

    doc.insert("AdditionalTargets".into(), targets.into());
    store::write_document(&index_path, &doc)?;
    tracing::debug!("Added {} to {}", target_dir.display(), SOLUTION_INFO);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{EnvOptions, SOURCE_MARKER};
    use crate::platform::{Architecture, Platform};
    use std::fs;
    use tempfile::TempDir;

    fn source_env(temp: &TempDir) -> Environment {
        let root = temp.path().join("nap");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(SOURCE_MARKER), "").unwrap();
        let bin = temp.path().join("thirdparty/cmake/linux/x86_64/bin");
        fs::create_dir_all(&bin).unwrap();
        fs::write(bin.join("cmake"), "").unwrap();

        let options = EnvOptions {
            platform: Some(Platform::Linux),
            arch: Some(Architecture::X86_64),
            ..EnvOptions::default()
        };
        Environment::at_root(&root, &options).unwrap()
    }

    #[test]
    fn test_targets_sorted_and_unique() {
        let temp = TempDir::new().unwrap();
        let env = source_env(&temp);

        assert!(add_target(&env, &env.root.join("modules/mod_foo")).unwrap());
        assert!(add_target(&env, &env.root.join("apps/demo")).unwrap());
        assert!(add_target(&env, &env.root.join("modules/mod_foo")).unwrap());

        let doc = store::read_document(&env.root.join(SOLUTION_INFO)).unwrap();
        assert_eq!(
            Value::Object(doc),
            serde_json::json!({
                "Type": "SolutionInfo",
                "mID": "SolutionInfo",
                "AdditionalTargets": ["apps/demo", "modules/mod_foo"]
            })
        );
    }

    #[test]
    fn test_packaged_context_skips_index() {
        let fixture = crate::testing::FrameworkFixture::new().unwrap();
        let env = fixture.env().unwrap();
        assert!(!add_target(&env, &env.root.join("apps/demo")).unwrap());
        assert!(!env.root.join(SOLUTION_INFO).exists());
    }
}
