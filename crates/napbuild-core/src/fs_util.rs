//! Filesystem helpers for staging and installing trees.

use std::fs;
use std::path::Path;

use crate::error::Result;

/// Recursively copy `src` into `dst`, recreating symlinks as symlinks
/// where the host supports it.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            copy_symlink(&from, &to)?;
        } else if file_type.is_dir() {
            copy_dir_all(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

/// Copy a single file or symlink into `dst_dir`, keeping its name.
pub fn copy_into(src: &Path, dst_dir: &Path) -> Result<()> {
    let Some(name) = src.file_name() else {
        return Ok(());
    };
    fs::create_dir_all(dst_dir)?;
    let to = dst_dir.join(name);
    if fs::symlink_metadata(src)?.file_type().is_symlink() {
        copy_symlink(src, &to)
    } else {
        fs::copy(src, &to)?;
        Ok(())
    }
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    let target = fs::read_link(from)?;
    if fs::symlink_metadata(to).is_ok() {
        fs::remove_file(to)?;
    }
    std::os::unix::fs::symlink(target, to)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    if from.is_dir() {
        copy_dir_all(from, to)
    } else {
        fs::copy(from, to)?;
        Ok(())
    }
}

/// Remove a directory tree if present.
pub fn remove_dir_if_exists(dir: &Path) -> Result<bool> {
    if fs::symlink_metadata(dir).is_err() {
        return Ok(false);
    }
    fs::remove_dir_all(dir)?;
    Ok(true)
}

/// Mark a file executable on Unix.
pub fn set_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(perms.mode() | 0o755);
        fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_tree() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("lib/nested")).unwrap();
        fs::write(src.join("lib/nested/a.txt"), "a").unwrap();
        fs::write(src.join("lib/libfoo.so.1"), "so").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink("libfoo.so.1", src.join("lib/libfoo.so")).unwrap();

        let dst = temp.path().join("dst");
        copy_dir_all(&src, &dst).unwrap();
        assert_eq!(fs::read_to_string(dst.join("lib/nested/a.txt")).unwrap(), "a");

        #[cfg(unix)]
        {
            let link = dst.join("lib/libfoo.so");
            assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
            assert_eq!(fs::read_link(&link).unwrap(), Path::new("libfoo.so.1"));
        }

        assert!(remove_dir_if_exists(&dst).unwrap());
        assert!(!remove_dir_if_exists(&dst).unwrap());
    }
}
