//! Info command implementation.

use napbuild_core::Environment;

use crate::colors;

fn field(name: &str, value: impl std::fmt::Display) {
    println!("  {}{name:<16}{} {value}", colors::CYAN, colors::RESET);
}

/// Execute `info`.
pub fn execute(env: &Environment) -> anyhow::Result<()> {
    colors::header("NAP framework");
    field("context", env.context.as_str());
    field("root", env.root.display());
    field("platform", env.platform);
    field("architecture", env.arch);
    field("generator", env.generator);
    field("generator binary", env.generator_binary.display());
    match &env.interpreter {
        Some(path) => field("interpreter", path.display()),
        None => colors::note("no bundled interpreter found"),
    }
    field("build directory", env.generator.build_dir_name());
    if let Some(qt) = &env.qt_dir {
        field("QT_DIR", qt.display());
    }
    if let Some(ndk) = &env.android_ndk_root {
        field("ANDROID_NDK_ROOT", ndk.display());
    }
    Ok(())
}
