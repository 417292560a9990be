//! Showing generated files in the host's file browser or IDE.

use std::path::Path;

use crate::env::Environment;
use crate::error::Result;
use crate::platform::Platform;
use crate::process::{CommandRunner, CommandSpec};

/// Command template for Linux, `%PACKAGE_PATH%` is replaced by the path.
pub const SHOW_FILE_COMMAND_VAR: &str = "NAP_SHOW_FILE_COMMAND";
const DEFAULT_SHOW_FILE_COMMAND: &str = "nautilus -s %PACKAGE_PATH%";
const PATH_PLACEHOLDER: &str = "%PACKAGE_PATH%";

/// Command that reveals `path`, or `None` when the host has no way to.
pub fn reveal_command(platform: Platform, path: &Path, linux_template: Option<&str>) -> Option<CommandSpec> {
    let shown = path.to_string_lossy();
    match platform {
        Platform::MacOs => Some(CommandSpec::new("open").arg("-R").arg(path)),
        Platform::Windows => Some(CommandSpec::new("explorer").arg(format!("/select,{shown}"))),
        Platform::Linux => {
            let template = linux_template.unwrap_or(DEFAULT_SHOW_FILE_COMMAND);
            let mut parts = template
                .split_whitespace()
                .map(|part| part.replace(PATH_PLACEHOLDER, &shown));
            let program = parts.next()?;
            Some(CommandSpec::new(program).args(parts))
        }
    }
}

/// Reveal `path` without waiting. Linux only does this in a graphical
/// session.
pub fn reveal(env: &Environment, runner: &dyn CommandRunner, path: &Path) -> Result<()> {
    if env.platform == Platform::Linux && !has_graphical_session() {
        tracing::debug!("No graphical session, not revealing {}", path.display());
        return Ok(());
    }
    let template = std::env::var(SHOW_FILE_COMMAND_VAR).ok();
    if let Some(command) = reveal_command(env.platform, path, template.as_deref()) {
        if let Err(e) = runner.launch(&command) {
            tracing::warn!("Could not reveal {}: {e}", path.display());
        }
    }
    Ok(())
}

fn has_graphical_session() -> bool {
    std::env::var_os("DISPLAY").is_some() || std::env::var_os("WAYLAND_DISPLAY").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reveal_commands() {
        let path = Path::new("/nap/apps/demo/Demo-0.1-macOS.zip");
        let mac = reveal_command(Platform::MacOs, path, None).unwrap();
        assert_eq!(mac.program_name(), "open");
        assert_eq!(mac.arg_strings()[0], "-R");

        let linux = reveal_command(Platform::Linux, path, Some("xdg-open %PACKAGE_PATH%")).unwrap();
        assert_eq!(linux.program_name(), "xdg-open");
        assert_eq!(linux.arg_strings(), vec![path.to_string_lossy().to_string()]);

        let default = reveal_command(Platform::Linux, path, None).unwrap();
        assert_eq!(default.program_name(), "nautilus");
        assert_eq!(default.arg_strings()[0], "-s");

        assert!(reveal_command(Platform::Linux, path, Some("   ")).is_none());
    }
}
