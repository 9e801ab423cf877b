//! The registry of writes a session has started, keyed by absolute
//! destination path.
//!
//! Each entry is either pending, in which case later requests subscribe to a
//! broadcast channel on which the single writer publishes its outcome, or
//! done, in which case the outcome is returned immediately. Looking up an
//! entry and registering a new pending entry happen under the same map entry
//! lock so two requests can never both become the writer.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
};

use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::broadcast;

use crate::{BirthTime, WriteError};

/// The outcome of a single write, shared by everybody who waited for it.
pub(crate) type WriteOutcome = Result<BirthTime, WriteError>;

enum Slot {
    /// A write is in flight. The writer owns the only strong reference to the
    /// sender, if it went away without publishing the upgrade fails.
    Pending {
        id: u64,
        sender: Weak<broadcast::Sender<WriteOutcome>>,
    },
    /// The write finished.
    Done(WriteOutcome),
}

/// What a request for a destination has to do next.
#[derive(Debug)]
pub(crate) enum Registration {
    /// The destination was written before, this is the outcome.
    Done(WriteOutcome),
    /// Another request is writing the destination, wait for its outcome.
    Joined(broadcast::Receiver<WriteOutcome>),
    /// This request has to perform the write and publish the outcome with
    /// [`InFlightRegistry::complete`].
    Owner(PendingWrite, broadcast::Receiver<WriteOutcome>),
}

/// The right, and the obligation, to publish the outcome of a write.
#[derive(Debug)]
pub(crate) struct PendingWrite {
    id: u64,
    sender: Arc<broadcast::Sender<WriteOutcome>>,
}

#[derive(Default)]
pub(crate) struct InFlightRegistry {
    slots: DashMap<PathBuf, Slot>,
    next_id: AtomicU64,
}

impl InFlightRegistry {
    /// Looks up `destination` and, if nobody is writing it, registers the
    /// caller as its writer. This is a single step with respect to other
    /// callers.
    pub fn register(&self, destination: &Path) -> Registration {
        let mut entry = match self.slots.entry(destination.to_path_buf()) {
            Entry::Vacant(entry) => {
                let (pending, receiver) = self.new_pending();
                entry.insert(Slot::Pending {
                    id: pending.id,
                    sender: Arc::downgrade(&pending.sender),
                });
                return Registration::Owner(pending, receiver);
            }
            Entry::Occupied(entry) => entry,
        };

        let sender = match entry.get() {
            Slot::Done(outcome) => return Registration::Done(outcome.clone()),
            Slot::Pending { sender, .. } => sender.upgrade(),
        };

        if let Some(sender) = sender {
            // Subscribe while holding the entry, the writer publishes under
            // the same lock.
            return Registration::Joined(sender.subscribe());
        }

        // The previous writer went away without publishing, take over.
        tracing::debug!(
            "taking over abandoned write to '{}'",
            destination.display()
        );
        let (pending, receiver) = self.new_pending();
        entry.insert(Slot::Pending {
            id: pending.id,
            sender: Arc::downgrade(&pending.sender),
        });
        Registration::Owner(pending, receiver)
    }

    /// Records the outcome of the write to `destination` and hands it to every
    /// waiting request.
    ///
    /// If the entry was forgotten while the write was in flight the outcome is
    /// only published to the requests that are already waiting.
    pub fn complete(&self, destination: &Path, pending: PendingWrite, outcome: WriteOutcome) {
        match self.slots.entry(destination.to_path_buf()) {
            Entry::Occupied(mut entry) => {
                if matches!(entry.get(), Slot::Pending { id, .. } if *id == pending.id) {
                    entry.insert(Slot::Done(outcome.clone()));
                }
                let _ = pending.sender.send(outcome);
            }
            Entry::Vacant(_) => {
                let _ = pending.sender.send(outcome);
            }
        }
    }

    /// Returns the birth time of a destination that was successfully written,
    /// without touching the filesystem.
    pub fn cached(&self, destination: &Path) -> Option<BirthTime> {
        self.slots.get(destination).and_then(|slot| match slot.value() {
            Slot::Done(Ok(birth_time)) => Some(*birth_time),
            Slot::Done(Err(_)) | Slot::Pending { .. } => None,
        })
    }

    /// Removes the entry for `destination`. Returns `true` if there was one.
    pub fn forget(&self, destination: &Path) -> bool {
        self.slots.remove(destination).is_some()
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn new_pending(&self) -> (PendingWrite, broadcast::Receiver<WriteOutcome>) {
        let (sender, receiver) = broadcast::channel(1);
        let pending = PendingWrite {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            sender: Arc::new(sender),
        };
        (pending, receiver)
    }
}
