#![deny(missing_docs)]

//! The write path of a content-addressable file store (CAFS).
//!
//! Every file in the store lives at a path derived from the digest of its
//! content, so identical content is stored once. This crate places a single
//! buffer into the store and guarantees that:
//!
//! - identical content is written to disk at most once per [`StoreSession`],
//!   concurrent requests for the same destination share one write,
//! - readers never observe a partially written file, content is written to a
//!   temporary sibling and atomically renamed into place,
//! - content that is already present and intact is recognized and not written
//!   again.
//!
//! # Architecture
//!
//! Files are stored in a directory structure based on the hex digest of their
//! content:
//! ```text
//! <store_dir>/files/
//!   <first 2 hex chars>/
//!     <remaining hex chars>          regular files
//!     <remaining hex chars>-exec     files with an executable bit set
//! ```
//!
//! # Components
//!
//! - [`verify`] / [`check_file`]: compare a file on disk against an
//!   [`IntegrityDescriptor`], size first and digest second.
//! - [`temp_path`]: the process scoped temporary name a write goes through.
//! - [`commit`]: the atomic rename into the final location.
//! - [`StoreSession`]: coordinates all of the above and deduplicates writes
//!   to the same destination.
//!
//! # Usage
//!
//! ```rust,no_run
//! use cafs::StoreSession;
//!
//! # async fn example() -> Result<(), cafs::WriteError> {
//! let session = StoreSession::new("/path/to/store");
//! let result = session.add_buffer(&b"Hello, world!"[..], Some(0o644)).await?;
//! println!(
//!     "stored {} at {} (checked at {})",
//!     result.integrity,
//!     result.file_path.display(),
//!     result.checked_at
//! );
//! # Ok(())
//! # }
//! ```

mod commit;
mod error;
mod registry;
mod reporter;
mod session;
mod temp_name;
mod verify;

use std::path::PathBuf;

pub use cafs_digest::{Algorithm, IntegrityDescriptor};
pub use commit::{commit, CommitOutcome};
pub use error::WriteError;
pub use reporter::WriteReporter;
pub use session::{FileWriteResult, StoreSession, WriteOptions, WriteRequest};
pub use temp_name::{temp_path, temp_path_for_process};
pub use verify::{check_file, verify, verify_file_since, FileValidationError};

/// Milliseconds since the unix epoch at which the store first saw a piece of
/// content.
pub type BirthTime = i64;

/// The directory inside the store that holds file contents.
pub const FILES_DIR: &str = "files";

/// The suffix appended to the content path of executable files.
pub const EXEC_SUFFIX: &str = "-exec";

/// Whether a stored file carries an executable bit. Executable and regular
/// variants of the same content are stored as different files.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum FileKind {
    /// A regular file.
    NonExecutable,
    /// A file with at least one executable bit set.
    Executable,
}

impl FileKind {
    /// Determines the kind of file from POSIX mode bits.
    pub fn from_mode(mode: u32) -> Self {
        if mode & 0o111 != 0 {
            FileKind::Executable
        } else {
            FileKind::NonExecutable
        }
    }
}

/// Returns the path of a file relative to the [`FILES_DIR`] for the given hex
/// digest. Note that the path might not exist.
pub fn content_path_from_hex(kind: FileKind, hex: &str) -> PathBuf {
    let (prefix, rest) = hex.split_at(hex.len().min(2));
    let file_name = match kind {
        FileKind::NonExecutable => rest.to_string(),
        FileKind::Executable => format!("{rest}{EXEC_SUFFIX}"),
    };
    PathBuf::from(prefix).join(file_name)
}

/// Returns the destination key, relative to the store directory, for content
/// described by `integrity`.
pub fn file_path_in_store(integrity: &IntegrityDescriptor, kind: FileKind) -> PathBuf {
    PathBuf::from(FILES_DIR).join(content_path_from_hex(kind, &integrity.to_hex()))
}

/// Returns the current time as a [`BirthTime`].
pub(crate) fn now_millis() -> BirthTime {
    chrono::Utc::now().timestamp_millis()
}

/// Runs blocking filesystem work on the blocking thread pool.
///
/// A panic in the closure is resumed on the calling task.
pub(crate) async fn run_blocking_io<T, F>(f: F) -> std::io::Result<T>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f)
        .await
        .map_err(tokio::task::JoinError::try_into_panic)
    {
        Ok(result) => result,
        Err(Err(err)) => Err(std::io::Error::new(std::io::ErrorKind::Interrupted, err)),
        Err(Ok(panic)) => std::panic::resume_unwind(panic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_content_path_from_hex() {
        let hex = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(
            content_path_from_hex(FileKind::NonExecutable, hex),
            PathBuf::from("e3").join("b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
        assert_eq!(
            content_path_from_hex(FileKind::Executable, hex),
            PathBuf::from("e3")
                .join("b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855-exec")
        );
    }

    #[rstest]
    #[case(0o644, FileKind::NonExecutable)]
    #[case(0o600, FileKind::NonExecutable)]
    #[case(0o755, FileKind::Executable)]
    #[case(0o744, FileKind::Executable)]
    #[case(0o001, FileKind::Executable)]
    fn test_file_kind_from_mode(#[case] mode: u32, #[case] expected: FileKind) {
        assert_eq!(FileKind::from_mode(mode), expected);
    }

    #[test]
    fn test_file_path_in_store() {
        let integrity = IntegrityDescriptor::from_bytes(Algorithm::Sha256, b"");
        assert_eq!(
            file_path_in_store(&integrity, FileKind::NonExecutable),
            PathBuf::from("files")
                .join("e3")
                .join("b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
    }
}
