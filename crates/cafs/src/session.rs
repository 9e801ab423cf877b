//! The write coordinator, see [`StoreSession`].

use std::{
    io::Write,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use bytes::Bytes;
use cafs_digest::{Algorithm, IntegrityDescriptor};
use tracing::Instrument;

use crate::{
    commit::{commit, CommitOutcome},
    file_path_in_store, now_millis,
    registry::{InFlightRegistry, Registration},
    run_blocking_io,
    temp_name::temp_path,
    verify::verify,
    BirthTime, FileKind, WriteError, WriteReporter,
};

/// A request to place a buffer into the store.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    /// The destination relative to the store directory. It is expected to be
    /// derived from the digest of the content, see
    /// [`crate::file_path_in_store`].
    pub key: PathBuf,

    /// The content to store.
    pub content: Bytes,

    /// POSIX mode bits for a newly written file. Ignored on platforms without
    /// them.
    pub mode: Option<u32>,

    /// Describes the content, used to detect that the destination already
    /// holds it.
    pub integrity: IntegrityDescriptor,
}

impl WriteRequest {
    /// Constructs a new request without mode bits.
    pub fn new(
        key: impl Into<PathBuf>,
        content: impl Into<Bytes>,
        integrity: IntegrityDescriptor,
    ) -> Self {
        Self {
            key: key.into(),
            content: content.into(),
            mode: None,
            integrity,
        }
    }

    /// Sets the mode bits of the file.
    #[must_use]
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// The result of [`StoreSession::add_buffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWriteResult {
    /// When the store first saw the content. Consumers can skip verifying the
    /// file again if it was not modified after this time, see
    /// [`crate::verify_file_since`].
    pub checked_at: BirthTime,

    /// The integrity of the content.
    pub integrity: IntegrityDescriptor,

    /// The absolute path of the content in the store.
    pub file_path: PathBuf,
}

/// Options that control how a [`StoreSession`] writes files.
#[derive(Clone)]
pub struct WriteOptions {
    fsync: bool,
    reporter: Option<Arc<dyn WriteReporter>>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            fsync: true,
            reporter: None,
        }
    }
}

impl WriteOptions {
    /// Whether temporary files are synced to disk before they are committed.
    /// Defaults to `true`.
    #[must_use]
    pub fn with_fsync(mut self, fsync: bool) -> Self {
        self.fsync = fsync;
        self
    }

    /// Sets a reporter that observes the filesystem work of the session.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn WriteReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }
}

/// A [`StoreSession`] places content into a store directory.
///
/// Every destination is written at most once per session. Concurrent requests
/// for the same destination share a single write and all receive its outcome,
/// including its error. Once a destination has been resolved further requests
/// return the recorded birth time without touching the filesystem, until the
/// entry is removed with [`StoreSession::forget`] or [`StoreSession::clear`].
///
/// Writes run on their own task: a caller that stops awaiting does not cancel
/// the write, other requests may depend on it.
///
/// Cloning a session is cheap, clones share their registry.
#[derive(Clone)]
pub struct StoreSession {
    inner: Arc<StoreSessionInner>,
}

struct StoreSessionInner {
    store_dir: PathBuf,
    options: WriteOptions,
    registry: InFlightRegistry,
}

impl StoreSession {
    /// Constructs a new session for the store located at the specified path.
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        Self::with_options(store_dir, WriteOptions::default())
    }

    /// Constructs a new session with custom [`WriteOptions`].
    pub fn with_options(store_dir: impl Into<PathBuf>, options: WriteOptions) -> Self {
        Self {
            inner: Arc::new(StoreSessionInner {
                store_dir: store_dir.into(),
                options,
                registry: InFlightRegistry::default(),
            }),
        }
    }

    /// Returns the root directory of the store.
    pub fn store_dir(&self) -> &Path {
        &self.inner.store_dir
    }

    /// Places the content of `request` at `store_dir/request.key` and returns
    /// its birth time.
    ///
    /// If the destination already holds content matching `request.integrity`
    /// nothing is written and the current time is returned. Otherwise the
    /// content is written to a temporary file next to the destination and
    /// renamed into place, the returned time is taken after the content was
    /// written and before it was committed.
    ///
    /// Keys that are absolute or contain `.` or `..` components are rejected
    /// with [`WriteError::InvalidKey`].
    pub async fn write_content(&self, request: WriteRequest) -> Result<BirthTime, WriteError> {
        let destination = self
            .destination(&request.key)
            .ok_or_else(|| WriteError::InvalidKey(request.key.clone()))?;

        let mut receiver = match self.inner.registry.register(&destination) {
            Registration::Done(outcome) => return outcome,
            Registration::Joined(receiver) => receiver,
            Registration::Owner(pending, receiver) => {
                let inner = self.inner.clone();
                let span = tracing::debug_span!("write", path = %destination.display());
                let task_destination = destination.clone();
                tokio::spawn(
                    async move {
                        let outcome = inner.write_or_skip(&task_destination, request).await;
                        inner.registry.complete(&task_destination, pending, outcome);
                    }
                    .instrument(span),
                );
                receiver
            }
        };

        receiver
            .recv()
            .await
            .unwrap_or_else(|_| Err(WriteError::Aborted(destination)))
    }

    /// Hashes `content`, stores it under the path derived from its digest and
    /// the executable bits of `mode`, and returns where it was stored.
    pub async fn add_buffer(
        &self,
        content: impl Into<Bytes>,
        mode: Option<u32>,
    ) -> Result<FileWriteResult, WriteError> {
        let content = content.into();
        let integrity = IntegrityDescriptor::from_bytes(Algorithm::Sha512, &content);
        let kind = mode.map_or(FileKind::NonExecutable, FileKind::from_mode);
        let key = file_path_in_store(&integrity, kind);

        let checked_at = self
            .write_content(WriteRequest {
                key: key.clone(),
                content,
                mode,
                integrity: integrity.clone(),
            })
            .await?;

        Ok(FileWriteResult {
            checked_at,
            integrity,
            file_path: self.inner.store_dir.join(key),
        })
    }

    /// Returns the birth time of a destination this session has already
    /// written or verified, without touching the filesystem.
    pub fn cached(&self, key: impl AsRef<Path>) -> Option<BirthTime> {
        let destination = self.destination(key.as_ref())?;
        self.inner.registry.cached(&destination)
    }

    /// Removes the recorded outcome for a destination, the next request for it
    /// checks the filesystem again. Returns `true` if there was an entry.
    pub fn forget(&self, key: impl AsRef<Path>) -> bool {
        self.destination(key.as_ref())
            .is_some_and(|destination| self.inner.registry.forget(&destination))
    }

    /// Removes all recorded outcomes, including failures.
    pub fn clear(&self) {
        self.inner.registry.clear();
    }

    /// Returns the number of destinations that are being written or whose
    /// outcome is recorded.
    pub fn len(&self) -> usize {
        self.inner.registry.len()
    }

    /// Returns `true` if this session has not seen any destination.
    pub fn is_empty(&self) -> bool {
        self.inner.registry.is_empty()
    }

    /// Joins `key` to the store directory, or returns `None` if the result
    /// would not be a path inside the store.
    fn destination(&self, key: &Path) -> Option<PathBuf> {
        let is_plain_relative = key.components().next().is_some()
            && key
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        is_plain_relative.then(|| self.inner.store_dir.join(key))
    }
}

impl StoreSessionInner {
    async fn write_or_skip(
        &self,
        destination: &Path,
        request: WriteRequest,
    ) -> Result<BirthTime, WriteError> {
        if verify(destination, &request.integrity).await {
            tracing::debug!("content already present, skipping write");
            if let Some(reporter) = &self.options.reporter {
                reporter.on_skip(destination);
            }
            return Ok(now_millis());
        }

        let temp_path = temp_path(destination);
        write_temp_file(
            temp_path.clone(),
            request.content,
            request.mode,
            self.options.fsync,
        )
        .await
        .map_err(|err| WriteError::TempWrite(temp_path.clone(), Arc::new(err)))?;

        let birth_time = now_millis();
        if let Some(reporter) = &self.options.reporter {
            reporter.on_temp_written(&temp_path, destination);
        }

        let outcome = commit(&temp_path, destination)
            .await
            .map_err(|err| WriteError::Commit {
                from: temp_path.clone(),
                to: destination.to_path_buf(),
                source: Arc::new(err),
            })?;

        tracing::debug!("committed '{}' ({outcome:?})", temp_path.display());
        if let Some(reporter) = &self.options.reporter {
            reporter.on_commit(destination, outcome);
        }

        Ok(match outcome {
            CommitOutcome::Renamed => birth_time,
            CommitOutcome::RaceTolerated => now_millis(),
        })
    }
}

/// Creates or truncates the file at `path`, creating missing parent
/// directories, and writes `content` to it.
async fn write_temp_file(
    path: PathBuf,
    content: Bytes,
    mode: Option<u32>,
    fsync: bool,
) -> std::io::Result<()> {
    run_blocking_io(move || {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        if let Some(mode) = mode {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        let mut file = options.open(&path)?;
        file.write_all(&content)?;
        if fsync {
            file.sync_all()?;
        }
        Ok(())
    })
    .await
}
