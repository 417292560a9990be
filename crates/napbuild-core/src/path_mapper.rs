//! Token substitution in library search paths.

use crate::env::{BuildContext, Environment};
use crate::manifest::PathMappingManifest;
use crate::manifest::schema::ROLE_EXE_TO_ROOT;
use crate::platform::Architecture;

pub const ROOT_TOKEN: &str = "{ROOT}";
pub const MODULE_DIR_TOKEN: &str = "{MODULE_DIR}";
pub const BUILD_ARCH_TOKEN: &str = "{BUILD_ARCH}";

/// Substitutes `{ROOT}`, `{MODULE_DIR}` and `{BUILD_ARCH}`.
///
/// Tokens without a binding are left in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapper {
    /// Path from the app executable to the framework root.
    root: Option<String>,
    arch: Architecture,
}

impl PathMapper {
    pub fn new(root: Option<String>, arch: Architecture) -> Self {
        Self {
            root: root.map(|r| r.trim_end_matches('/').to_string()),
            arch,
        }
    }

    /// Mapper for an app, using its path mapping when present.
    pub fn for_app(env: &Environment, mapping: Option<&PathMappingManifest>) -> Self {
        let root = mapping
            .and_then(|m| m.role(ROLE_EXE_TO_ROOT))
            .map(str::to_string)
            .unwrap_or_else(|| env.context.default_exe_to_root().to_string());
        Self::new(Some(root), env.arch)
    }

    /// Mapper using the default role path of the context.
    pub fn for_context(context: BuildContext, arch: Architecture) -> Self {
        Self::new(Some(context.default_exe_to_root().to_string()), arch)
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// Substitute every bound token in `input`.
    ///
    /// `module_path` is the framework-relative path of the module that
    /// declared the search path.
    pub fn substitute(&self, input: &str, module_path: Option<&str>) -> String {
        let mut out = input.replace(BUILD_ARCH_TOKEN, self.arch.as_str());

        if let (Some(root), Some(module_path)) = (&self.root, module_path) {
            out = out.replace(MODULE_DIR_TOKEN, &join(root, module_path));
        }
        if let Some(root) = &self.root {
            out = out.replace(ROOT_TOKEN, root);
        }
        out
    }
}

fn join(root: &str, rel: &str) -> String {
    match (root.is_empty(), rel.is_empty()) {
        (true, _) => rel.to_string(),
        (_, true) => root.to_string(),
        _ => format!("{root}/{rel}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_dir_and_arch() {
        let mapper = PathMapper::new(Some("../..".into()), Architecture::X86_64);
        assert_eq!(
            mapper.substitute("{MODULE_DIR}/lib/{BUILD_ARCH}", Some("modules/foo")),
            "../../modules/foo/lib/x86_64"
        );
    }

    #[test]
    fn test_root_token() {
        let mapper = PathMapper::new(Some("../../".into()), Architecture::Arm64);
        assert_eq!(
            mapper.substitute("{ROOT}/thirdparty/lib/{BUILD_ARCH}", None),
            "../../thirdparty/lib/arm64"
        );
    }

    #[test]
    fn test_unbound_tokens_pass_through() {
        let mapper = PathMapper::new(None, Architecture::Armhf);
        assert_eq!(
            mapper.substitute("{ROOT}/{MODULE_DIR}/{BUILD_ARCH}", Some("modules/foo")),
            "{ROOT}/{MODULE_DIR}/armhf"
        );

        let mapper = PathMapper::new(Some("..".into()), Architecture::X86_64);
        assert_eq!(
            mapper.substitute("{MODULE_DIR}/lib", None),
            "{MODULE_DIR}/lib"
        );
        assert_eq!(mapper.substitute("{UNKNOWN}/lib", None), "{UNKNOWN}/lib");
    }

    #[test]
    fn test_each_occurrence_replaced() {
        let mapper = PathMapper::new(Some(".".into()), Architecture::X86_64);
        assert_eq!(
            mapper.substitute("{BUILD_ARCH}-{BUILD_ARCH}", None),
            "x86_64-x86_64"
        );
    }

    #[test]
    fn test_context_defaults() {
        let source = PathMapper::for_context(BuildContext::Source, Architecture::X86_64);
        assert_eq!(source.root(), Some("../.."));
        let packaged = PathMapper::for_context(BuildContext::Packaged, Architecture::X86_64);
        assert_eq!(packaged.root(), Some("../../../.."));
    }
}
