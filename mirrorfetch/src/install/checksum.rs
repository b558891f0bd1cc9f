//! SHA-256 verification of downloaded archives.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use super::error::{InstallError, InstallResult};

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Calculate the lowercase hex SHA-256 digest of a file.
pub fn calculate_file_checksum(path: &Path) -> InstallResult<String> {
    let read_err = |e| InstallError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = File::open(path).map_err(read_err)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(read_err)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify a file against an expected digest. Hex case is ignored.
pub fn verify_checksum(path: &Path, expected: &str) -> InstallResult<()> {
    let expected = normalize_digest(expected)?;
    let actual = calculate_file_checksum(path)?;
    if actual != expected {
        return Err(InstallError::ChecksumMismatch {
            filename: path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Lowercase a digest after checking it is 64 hex characters.
pub fn normalize_digest(digest: &str) -> InstallResult<String> {
    let digest = digest.trim();
    if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(InstallError::InvalidDigest(digest.to_string()));
    }
    Ok(digest.to_ascii_lowercase())
}
