//! Package archives: gzipped tarballs on Linux, zip elsewhere.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::Builder as TarBuilder;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Error, Result};
use crate::platform::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
}

impl ArchiveFormat {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Linux => ArchiveFormat::TarGz,
            Platform::MacOs | Platform::Windows => ArchiveFormat::Zip,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::Zip => "zip",
        }
    }
}

fn archive_err(e: impl std::fmt::Display) -> Error {
    Error::Archive(e.to_string())
}

/// Archive `dir` as a single top-level directory named after it, next to it.
///
/// Returns the archive path.
pub fn archive_dir(dir: &Path, format: ArchiveFormat) -> Result<PathBuf> {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| archive_err(format!("cannot archive {}", dir.display())))?;
    let parent = dir.parent().unwrap_or(Path::new("."));
    let output = parent.join(format!("{name}.{}", format.extension()));

    tracing::info!("Archiving to {}", output.display());
    match format {
        ArchiveFormat::TarGz => write_tar_gz(dir, &name, &output)?,
        ArchiveFormat::Zip => write_zip(dir, &name, &output)?,
    }
    Ok(output)
}

fn write_tar_gz(dir: &Path, name: &str, output: &Path) -> Result<()> {
    let file = File::create(output)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = TarBuilder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(name, dir)?;
    let encoder = builder.into_inner()?;
    encoder.finish()?.flush()?;
    Ok(())
}

fn write_zip(dir: &Path, name: &str, output: &Path) -> Result<()> {
    let file = File::create(output)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    writer
        .add_directory(format!("{name}/"), options)
        .map_err(archive_err)?;
    add_zip_entries(&mut writer, dir, name, options)?;
    writer.finish().map_err(archive_err)?;
    Ok(())
}

fn add_zip_entries(
    writer: &mut ZipWriter<File>,
    dir: &Path,
    prefix: &str,
    options: SimpleFileOptions,
) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let entry_name = format!("{prefix}/{}", entry.file_name().to_string_lossy());
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            let target = fs::read_link(&path)?;
            writer
                .add_symlink(entry_name, target.to_string_lossy(), options)
                .map_err(archive_err)?;
        } else if file_type.is_dir() {
            writer
                .add_directory(format!("{entry_name}/"), options)
                .map_err(archive_err)?;
            add_zip_entries(writer, &path, &entry_name, options)?;
        } else {
            writer
                .start_file(entry_name, options.unix_permissions(file_mode(&path)?))
                .map_err(archive_err)?;
            io::copy(&mut File::open(&path)?, writer)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    Ok(fs::metadata(path)?.permissions().mode())
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Result<u32> {
    Ok(0o644)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    fn staged(temp: &TempDir) -> PathBuf {
        let dir = temp.path().join("Demo-0.1-Linux-2026.01.01T12.00");
        fs::create_dir_all(dir.join("lib")).unwrap();
        fs::write(dir.join("demo"), "binary").unwrap();
        fs::write(dir.join("lib/libnapcore.so"), "lib").unwrap();
        dir
    }

    #[test]
    fn test_tar_gz_has_single_root() {
        let temp = TempDir::new().unwrap();
        let dir = staged(&temp);
        let output = archive_dir(&dir, ArchiveFormat::TarGz).unwrap();
        assert!(output.to_string_lossy().ends_with(".tar.gz"));

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&output).unwrap()));
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names.iter().all(|n| n.starts_with("Demo-0.1-Linux-2026.01.01T12.00")));
        assert!(names.iter().any(|n| n.ends_with("lib/libnapcore.so")));
    }

    #[test]
    fn test_zip_has_single_root() {
        let temp = TempDir::new().unwrap();
        let dir = staged(&temp);
        let output = archive_dir(&dir, ArchiveFormat::Zip).unwrap();

        let archive = zip::ZipArchive::new(File::open(&output).unwrap()).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        assert!(names.contains(&"Demo-0.1-Linux-2026.01.01T12.00/"));
        assert!(names.contains(&"Demo-0.1-Linux-2026.01.01T12.00/lib/libnapcore.so"));
        assert_eq!(names.len(), 4);
    }
}
