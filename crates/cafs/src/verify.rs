//! Functionality to check whether a file in the store holds the content an
//! [`IntegrityDescriptor`] describes.
//!
//! The size of the file is compared first because it is cheap and catches
//! most mismatches. Only when the size matches is the content hashed.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use cafs_digest::{Hasher, IntegrityDescriptor};
use fs_err::tokio as fs;

use crate::{run_blocking_io, BirthTime};

/// Files modified less than this many milliseconds after they were last
/// checked are considered unmodified.
const MODIFIED_TOLERANCE_MS: i64 = 100;

/// An error that indicates that a file does not match its descriptor.
#[derive(Debug, thiserror::Error)]
pub enum FileValidationError {
    /// The file does not exist.
    #[error("the file does not exist")]
    NotFound,

    /// An error occurred while reading the metadata of the file.
    #[error("failed to retrieve file metadata")]
    GetMetadataFailed(#[source] std::io::Error),

    /// The size of the file does not match the expected size.
    #[error("incorrect size, expected {0} but file on disk is {1}")]
    IncorrectSize(u64, u64),

    /// The digest of the file does not match the expected digest.
    #[error("hash mismatch, expected '{0}' but file on disk is '{1}'")]
    HashMismatch(String, String),

    /// An IO error occurred while reading the file.
    #[error("an io error occurred")]
    IoError(#[from] std::io::Error),
}

/// Determine whether the file at `path` holds the content described by
/// `descriptor`.
///
/// This function blocks, use [`verify`] from async code.
pub fn check_file(path: &Path, descriptor: &IntegrityDescriptor) -> Result<(), FileValidationError> {
    let mut file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(FileValidationError::NotFound),
        Err(e) => return Err(FileValidationError::IoError(e)),
    };

    if let Some(expected_size) = descriptor.size() {
        let actual_size = file
            .metadata()
            .map_err(FileValidationError::GetMetadataFailed)?
            .len();
        if expected_size != actual_size {
            return Err(FileValidationError::IncorrectSize(expected_size, actual_size));
        }
    }

    let mut hasher = Hasher::new(descriptor.algorithm());
    std::io::copy(&mut file, &mut hasher)?;
    let digest = hasher.finalize();
    if digest != descriptor.digest() {
        return Err(FileValidationError::HashMismatch(
            descriptor.to_hex(),
            hex::encode(digest),
        ));
    }

    Ok(())
}

/// Returns `true` if the file at `path` exists and holds the content described
/// by `descriptor`.
///
/// Never fails: a missing file, an unreadable file and a mismatch are all
/// reported as `false`, meaning the content has to be written.
pub async fn verify(path: &Path, descriptor: &IntegrityDescriptor) -> bool {
    let metadata = match fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(err) => {
            if err.kind() != ErrorKind::NotFound {
                tracing::debug!("could not stat '{}': {err}", path.display());
            }
            return false;
        }
    };

    // Reject without reading the file if the size is already off.
    if let Some(expected_size) = descriptor.size() {
        if metadata.len() != expected_size {
            tracing::debug!(
                "'{}' has size {} but {} was expected",
                path.display(),
                metadata.len(),
                expected_size
            );
            return false;
        }
    }

    let owned_path: PathBuf = path.to_path_buf();
    let descriptor = descriptor.clone();
    let result = run_blocking_io(move || {
        Ok(match check_file(&owned_path, &descriptor) {
            Ok(()) => None,
            Err(err) => Some(err),
        })
    })
    .await;

    match result {
        Ok(None) => true,
        Ok(Some(err)) => {
            tracing::debug!("'{}' failed verification: {err}", path.display());
            false
        }
        Err(err) => {
            tracing::debug!("verification of '{}' was interrupted: {err}", path.display());
            false
        }
    }
}

/// Returns `true` if the file at `path` still holds the content described by
/// `descriptor`, given that it was known to be intact at `checked_at`.
///
/// A file that was not modified after `checked_at` and still has the expected
/// size is trusted without hashing. In every other case the content is hashed
/// with [`verify`].
pub async fn verify_file_since(
    path: &Path,
    descriptor: &IntegrityDescriptor,
    checked_at: BirthTime,
) -> bool {
    let Ok(metadata) = fs::metadata(path).await else {
        return false;
    };

    if let Some(expected_size) = descriptor.size() {
        if metadata.len() != expected_size {
            return false;
        }

        let modified = metadata
            .modified()
            .ok()
            .map(|modified| chrono::DateTime::<chrono::Utc>::from(modified).timestamp_millis());
        if let Some(modified) = modified {
            if modified - checked_at <= MODIFIED_TOLERANCE_MS {
                return true;
            }
        }
    }

    verify(path, descriptor).await
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;
    use cafs_digest::Algorithm;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_check_file_matches() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_file(temp_dir.path(), "file", b"Hello, world!");
        let descriptor = IntegrityDescriptor::from_bytes(Algorithm::Sha512, b"Hello, world!");
        assert_matches!(check_file(&path, &descriptor), Ok(()));
    }

    #[test]
    fn test_check_file_missing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let descriptor = IntegrityDescriptor::from_bytes(Algorithm::Sha512, b"");
        assert_matches!(
            check_file(&temp_dir.path().join("missing"), &descriptor),
            Err(FileValidationError::NotFound)
        );
    }

    #[test]
    fn test_check_file_incorrect_size() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_file(temp_dir.path(), "file", b"short");
        let descriptor = IntegrityDescriptor::from_bytes(Algorithm::Sha512, b"longer content");
        assert_matches!(
            check_file(&path, &descriptor),
            Err(FileValidationError::IncorrectSize(14, 5))
        );
    }

    #[test]
    fn test_check_file_hash_mismatch() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_file(temp_dir.path(), "file", b"0123456789");
        let descriptor = IntegrityDescriptor::from_bytes(Algorithm::Sha256, b"0123456780");
        assert_matches!(
            check_file(&path, &descriptor),
            Err(FileValidationError::HashMismatch(expected, _)) if expected == descriptor.to_hex()
        );
    }

    #[test]
    fn test_check_file_without_size_hashes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_file(temp_dir.path(), "file", b"content");
        let descriptor: IntegrityDescriptor =
            IntegrityDescriptor::from_bytes(Algorithm::Sha256, b"content")
                .to_string()
                .parse()
                .unwrap();
        assert_eq!(descriptor.size(), None);
        assert_matches!(check_file(&path, &descriptor), Ok(()));
    }

    #[tokio::test]
    async fn test_verify() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_file(temp_dir.path(), "file", b"some content");
        let descriptor = IntegrityDescriptor::from_bytes(Algorithm::Sha512, b"some content");
        assert!(verify(&path, &descriptor).await);

        let other = IntegrityDescriptor::from_bytes(Algorithm::Sha512, b"some c0ntent");
        assert!(!verify(&path, &other).await);

        assert!(!verify(&temp_dir.path().join("missing"), &descriptor).await);
    }

    #[tokio::test]
    async fn test_verify_rejects_size_mismatch_before_hashing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_file(temp_dir.path(), "file", b"some content");

        // The digest matches the file, only the expected size is off.
        let descriptor =
            IntegrityDescriptor::from_bytes(Algorithm::Sha512, b"some content").with_size(11);
        assert!(!verify(&path, &descriptor).await);
        assert_matches!(
            check_file(&path, &descriptor),
            Err(FileValidationError::IncorrectSize(11, 12))
        );
    }

    #[tokio::test]
    async fn test_verify_directory_is_not_verified() {
        let temp_dir = tempfile::tempdir().unwrap();
        let descriptor = IntegrityDescriptor::from_bytes(Algorithm::Sha512, b"");
        assert!(!verify(temp_dir.path(), &descriptor.clone().with_size(0)).await);
        assert!(!verify(temp_dir.path(), &descriptor).await);
    }

    #[tokio::test]
    async fn test_verify_file_since_trusts_unmodified_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_file(temp_dir.path(), "file", b"0123456789");
        let descriptor = IntegrityDescriptor::from_bytes(Algorithm::Sha512, b"0123456789");
        let checked_at = crate::now_millis();

        // Corrupt the file without changing its size or modification time.
        let modified = std::fs::metadata(&path).unwrap().modified().unwrap();
        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.write_all(b"X").unwrap();
        file.set_modified(modified).unwrap();
        drop(file);

        // The file looks untouched so it is not hashed.
        assert!(verify_file_since(&path, &descriptor, checked_at).await);

        // A file checked long ago is hashed again and the corruption found.
        assert!(!verify_file_since(&path, &descriptor, checked_at - 60_000).await);
    }

    #[tokio::test]
    async fn test_verify_file_since_size_mismatch() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_file(temp_dir.path(), "file", b"0123456789");
        let descriptor = IntegrityDescriptor::from_bytes(Algorithm::Sha512, b"012345678");
        assert!(!verify_file_since(&path, &descriptor, crate::now_millis()).await);
    }
}
