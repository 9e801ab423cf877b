//! Atomically moves a fully written temporary file into the store.

use std::{io::ErrorKind, path::Path};

use fs_err::tokio as fs;

/// How [`commit`] placed the content at its destination.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CommitOutcome {
    /// The temporary file was renamed onto the destination.
    Renamed,

    /// The temporary file disappeared but the destination exists. Another
    /// process that derived the same temporary name has committed the same
    /// content first.
    RaceTolerated,
}

/// Renames `temp_path` to `destination`, replacing any existing file.
///
/// The rename is atomic for readers of `destination`: they either see the old
/// file or the new one in full. If the temporary file is missing while the
/// destination exists the race with another writer is tolerated and
/// [`CommitOutcome::RaceTolerated`] is returned. The destination is content
/// addressed, so whichever writer won wrote equivalent content. It is not
/// verified again.
pub async fn commit(temp_path: &Path, destination: &Path) -> std::io::Result<CommitOutcome> {
    let err = match fs::rename(temp_path, destination).await {
        Ok(()) => return Ok(CommitOutcome::Renamed),
        Err(err) => err,
    };

    if err.kind() == ErrorKind::NotFound && fs::metadata(destination).await.is_ok() {
        tracing::warn!(
            "'{}' vanished before it could be committed, '{}' was written by another process",
            temp_path.display(),
            destination.display()
        );
        return Ok(CommitOutcome::RaceTolerated);
    }

    Err(err)
}
