use std::{path::PathBuf, sync::Arc};

/// An error that can occur while placing content into the store.
///
/// A single write may be awaited by many callers, all of them receive a clone
/// of the same error. I/O errors are therefore shared through an [`Arc`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum WriteError {
    /// Creating or writing the temporary file failed. The destination was not
    /// touched.
    #[error("failed to write temporary file '{}'", .0.display())]
    TempWrite(PathBuf, #[source] Arc<std::io::Error>),

    /// Moving the temporary file into place failed. The destination is left
    /// in whatever state it was in before the attempt.
    #[error("failed to move '{}' to '{}'", .from.display(), .to.display())]
    Commit {
        /// The temporary file.
        from: PathBuf,
        /// The destination in the store.
        to: PathBuf,
        /// The underlying error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The destination key is not a relative path below the store directory.
    #[error("'{}' is not a valid destination inside the store", .0.display())]
    InvalidKey(PathBuf),

    /// The task that performed the write for this destination stopped before
    /// it published a result.
    #[error("the write to '{}' was aborted before it completed", .0.display())]
    Aborted(PathBuf),
}

impl WriteError {
    /// Returns the [`std::io::ErrorKind`] of the underlying I/O error, if any.
    pub fn io_error_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            WriteError::TempWrite(_, err) | WriteError::Commit { source: err, .. } => {
                Some(err.kind())
            }
            WriteError::InvalidKey(_) | WriteError::Aborted(_) => None,
        }
    }
}
