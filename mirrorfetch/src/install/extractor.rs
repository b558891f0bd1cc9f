//! Archive extraction.
//!
//! Supports zip and gzip-compressed tar archives. Entries whose paths are
//! absolute or climb out of the target directory are rejected before any
//! file is written for them.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path};
use std::str::FromStr;

use flate2::read::GzDecoder;
use tracing::debug;

use super::error::{InstallError, InstallResult};

/// Supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
}

impl ArchiveKind {
    /// Guess the format from a file name (`.zip`, `.tar.gz`, `.tgz`).
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar-gz",
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArchiveKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zip" => Ok(Self::Zip),
            "tar-gz" | "tar.gz" | "tgz" => Ok(Self::TarGz),
            other => Err(format!("unknown archive format '{}'", other)),
        }
    }
}

/// Extract `archive` into `target`, returning the number of files written.
pub fn extract(archive: &Path, target: &Path, kind: ArchiveKind) -> InstallResult<usize> {
    fs::create_dir_all(target).map_err(|e| InstallError::CreateDirFailed {
        path: target.to_path_buf(),
        source: e,
    })?;

    let files = match kind {
        ArchiveKind::Zip => extract_zip(archive, target)?,
        ArchiveKind::TarGz => extract_tar_gz(archive, target)?,
    };

    debug!(
        archive = %archive.display(),
        target = %target.display(),
        format = %kind,
        files,
        "Extracted archive"
    );
    Ok(files)
}

fn extract_zip(archive: &Path, target: &Path) -> InstallResult<usize> {
    let mut zip = open_zip(archive)?;
    let mut files = 0;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| extraction_failed(archive, e))?;
        let relative = entry
            .enclosed_name()
            .filter(|p| is_safe_relative(p))
            .ok_or_else(|| InstallError::UnsafeEntry {
                archive: archive.to_path_buf(),
                entry: entry.name().to_string(),
            })?;
        let out_path = target.join(relative);

        if entry.is_dir() {
            create_dir(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            create_dir(parent)?;
        }
        let mut out = File::create(&out_path).map_err(|e| InstallError::WriteFailed {
            path: out_path.clone(),
            source: e,
        })?;
        io::copy(&mut entry, &mut out).map_err(|e| InstallError::WriteFailed {
            path: out_path.clone(),
            source: e,
        })?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            // Permission bits are advisory; a failure here does not fail extraction.
            let _ = fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o777));
        }

        files += 1;
    }

    Ok(files)
}

fn extract_tar_gz(archive: &Path, target: &Path) -> InstallResult<usize> {
    let mut tar = open_tar_gz(archive)?;
    let mut files = 0;

    for entry in tar.entries().map_err(|e| extraction_failed(archive, e))? {
        let mut entry = entry.map_err(|e| extraction_failed(archive, e))?;
        let path = entry
            .path()
            .map_err(|e| extraction_failed(archive, e))?
            .into_owned();

        if !is_safe_relative(&path) {
            return Err(InstallError::UnsafeEntry {
                archive: archive.to_path_buf(),
                entry: path.display().to_string(),
            });
        }

        let is_file = entry.header().entry_type().is_file();
        let unpacked = entry
            .unpack_in(target)
            .map_err(|e| extraction_failed(archive, e))?;
        if !unpacked {
            return Err(InstallError::UnsafeEntry {
                archive: archive.to_path_buf(),
                entry: path.display().to_string(),
            });
        }
        if is_file {
            files += 1;
        }
    }

    Ok(files)
}

fn open_zip(archive: &Path) -> InstallResult<zip::ZipArchive<BufReader<File>>> {
    let file = open(archive)?;
    zip::ZipArchive::new(BufReader::new(file)).map_err(|e| extraction_failed(archive, e))
}

fn open_tar_gz(archive: &Path) -> InstallResult<tar::Archive<GzDecoder<BufReader<File>>>> {
    let file = open(archive)?;
    Ok(tar::Archive::new(GzDecoder::new(BufReader::new(file))))
}

fn open(archive: &Path) -> InstallResult<File> {
    File::open(archive).map_err(|e| InstallError::ReadFailed {
        path: archive.to_path_buf(),
        source: e,
    })
}

fn create_dir(path: &Path) -> InstallResult<()> {
    fs::create_dir_all(path).map_err(|e| InstallError::CreateDirFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

fn extraction_failed(archive: &Path, e: impl fmt::Display) -> InstallError {
    InstallError::ExtractionFailed {
        path: archive.to_path_buf(),
        reason: e.to_string(),
    }
}

/// True when `path` is relative and never climbs above its root.
fn is_safe_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn write_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
        let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::fast());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_detect() {
        assert_eq!(ArchiveKind::detect(Path::new("a/b.zip")), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::detect(Path::new("B.TAR.GZ")), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect(Path::new("c.tgz")), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect(Path::new("d.tar")), None);
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("zip".parse::<ArchiveKind>().unwrap(), ArchiveKind::Zip);
        assert_eq!("tar-gz".parse::<ArchiveKind>().unwrap(), ArchiveKind::TarGz);
        assert!("rar".parse::<ArchiveKind>().is_err());
    }

    #[test]
    fn test_extract_zip() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("pkg.zip");
        write_zip(&archive, &[("a.txt", b"alpha"), ("dir/b.txt", b"beta")]);

        let target = temp.path().join("out");
        let files = extract(&archive, &target, ArchiveKind::Zip).unwrap();

        assert_eq!(files, 2);
        assert_eq!(fs::read(target.join("a.txt")).unwrap(), b"alpha");
        assert_eq!(fs::read(target.join("dir/b.txt")).unwrap(), b"beta");
    }

    #[test]
    fn test_extract_tar_gz() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("pkg.tar.gz");
        write_tar_gz(&archive, &[("x/one.bin", b"1"), ("two.bin", b"22")]);

        let target = temp.path().join("out");
        let files = extract(&archive, &target, ArchiveKind::TarGz).unwrap();

        assert_eq!(files, 2);
        assert_eq!(fs::read(target.join("x/one.bin")).unwrap(), b"1");
        assert_eq!(fs::read(target.join("two.bin")).unwrap(), b"22");
    }

    #[test]
    fn test_zip_path_traversal_rejected() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("evil.zip");
        write_zip(&archive, &[("../escape.txt", b"nope")]);

        let target = temp.path().join("out");
        let result = extract(&archive, &target, ArchiveKind::Zip);

        assert!(matches!(result, Err(InstallError::UnsafeEntry { .. })));
        assert!(!temp.path().join("escape.txt").exists());
    }

    #[test]
    fn test_corrupt_archive() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("bad.zip");
        fs::write(&archive, b"not a zip").unwrap();

        let result = extract(&archive, &temp.path().join("out"), ArchiveKind::Zip);
        assert!(matches!(result, Err(InstallError::ExtractionFailed { .. })));
    }

    #[test]
    fn test_is_safe_relative() {
        assert!(is_safe_relative(Path::new("a/b/c")));
        assert!(is_safe_relative(Path::new("./a")));
        assert!(!is_safe_relative(Path::new("../a")));
        assert!(!is_safe_relative(Path::new("a/../../b")));
        assert!(!is_safe_relative(Path::new("/etc/passwd")));
        assert!(!is_safe_relative(Path::new("")));
    }
}
