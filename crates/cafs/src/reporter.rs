use std::path::Path;

use crate::CommitOutcome;

/// A trait that can be implemented to observe the filesystem work a
/// [`crate::StoreSession`] performs.
///
/// Callbacks run on the task that performs the write, between the steps they
/// report on.
pub trait WriteReporter: Send + Sync {
    /// Called when the destination already holds the expected content and no
    /// write is performed.
    fn on_skip(&self, _destination: &Path) {}

    /// Called after the content has been written to the temporary file and
    /// before it is committed.
    fn on_temp_written(&self, _temp_path: &Path, _destination: &Path) {}

    /// Called after the temporary file was committed to its destination.
    fn on_commit(&self, _destination: &Path, _outcome: CommitOutcome) {}
}
