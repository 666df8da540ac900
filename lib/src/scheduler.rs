//! Debounced write-back of mutated graphs to their files.
//!
//! Each file has at most one pending write-back. The first mutation of a quiet
//! file arms it: a task opens and locks the file, then waits until the
//! debounce deadline. Later mutations only push the deadline back (re-arm).
//! The task re-checks for re-arms after sleeping, after serializing and after
//! writing; any re-arm sends it back to sleep so a stale snapshot is never the
//! last thing written. Once a full pass completes without a re-arm, the
//! pending record is removed and the handle closed, both under the pending
//! map's lock, so the next mutation starts a fresh cycle with a fresh handle.
//!
//! Failures are not retried: the pending record is dropped, a
//! [`StoreEvent::WriteFailed`] is published, and the file stays stale until
//! the next mutation of its graph.

use crate::errors::StoreError;
use crate::events::StoreEvent;
use crate::io::ExclusiveFile;
use crate::registry::FileEntry;
use crate::util::lock;
use log::{debug, error, info, trace};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Deadline {
    target: Instant,
    /// Bumped on every re-arm.
    generation: u64,
}

#[derive(Debug)]
struct PendingWrite {
    deadline: Mutex<Deadline>,
}

impl PendingWrite {
    fn new(target: Instant) -> Self {
        Self {
            deadline: Mutex::new(Deadline {
                target,
                generation: 0,
            }),
        }
    }

    fn deadline(&self) -> Deadline {
        *lock(&self.deadline)
    }

    fn rearm(&self, target: Instant) {
        let mut deadline = lock(&self.deadline);
        deadline.target = deadline.target.max(target);
        deadline.generation += 1;
    }

    fn rearmed_since(&self, seen: Deadline) -> bool {
        self.deadline().generation != seen.generation
    }
}

/// How a write-back cycle ended without error.
enum Settled {
    Written(usize),
    Unchanged,
}

#[derive(Debug)]
pub struct WriteBackScheduler {
    delay: Duration,
    pending: Mutex<HashMap<String, Arc<PendingWrite>>>,
    /// Number of pending write-backs, watched by [`WriteBackScheduler::flush_all`].
    in_flight: watch::Sender<usize>,
    events: broadcast::Sender<StoreEvent>,
}

impl WriteBackScheduler {
    pub fn new(delay: Duration, events: broadcast::Sender<StoreEvent>) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            delay,
            pending: Mutex::new(HashMap::new()),
            in_flight,
            events,
        }
    }

    /// Records that `entry` changed in memory and schedules its write-back.
    ///
    /// Never blocks on I/O. Must be called from within a Tokio runtime.
    pub fn notify_mutated(self: &Arc<Self>, entry: &Arc<FileEntry>) {
        let target = Instant::now() + self.delay;
        let mut pending = lock(&self.pending);
        if let Some(write) = pending.get(entry.id()) {
            trace!("Re-arming write-back of {}", entry.id());
            write.rearm(target);
            return;
        }
        let write = Arc::new(PendingWrite::new(target));
        pending.insert(entry.id().to_string(), Arc::clone(&write));
        self.in_flight.send_replace(pending.len());
        drop(pending);

        debug!("Scheduling write-back of {} to {}", entry.id(), entry.path().display());
        let scheduler = Arc::clone(self);
        let entry = Arc::clone(entry);
        tokio::spawn(async move {
            scheduler.write_back(entry, write).await;
        });
    }

    /// Number of files with a pending write-back.
    pub fn pending_writes(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Whether the file with this id has a pending write-back.
    pub fn is_pending(&self, id: &str) -> bool {
        lock(&self.pending).contains_key(id)
    }

    /// Waits until no write-back is pending for any file.
    pub async fn flush_all(&self) {
        let mut in_flight = self.in_flight.subscribe();
        // the sender lives as long as `self`, so this only returns once idle
        let _ = in_flight.wait_for(|pending| *pending == 0).await;
    }

    async fn write_back(&self, entry: Arc<FileEntry>, write: Arc<PendingWrite>) {
        let handle = match ExclusiveFile::open(entry.path()).await {
            Ok(handle) => handle,
            Err(e) => {
                self.abandon(&entry, None, e);
                self.refresh_in_flight();
                return;
            }
        };
        match self.run(&entry, &write, handle).await {
            Ok(Settled::Written(bytes)) => {
                let at = entry
                    .last_persisted()
                    .unwrap_or_else(chrono::Utc::now);
                info!(
                    "Wrote graph {} to {} ({} bytes)",
                    entry.id(),
                    entry.path().display(),
                    bytes
                );
                self.publish(StoreEvent::Persisted {
                    graph: entry.graph_name(),
                    path: entry.path().to_path_buf(),
                    bytes,
                    at,
                });
            }
            Ok(Settled::Unchanged) => {
                debug!("Graph {} unchanged on disk, nothing written", entry.id());
                self.publish(StoreEvent::Unchanged {
                    graph: entry.graph_name(),
                    path: entry.path().to_path_buf(),
                });
            }
            Err((handle, e)) => self.abandon(&entry, handle, e),
        }
        // only now, so `flush_all` returns after the outcome is published
        self.refresh_in_flight();
    }

    /// The run loop. On success the pending record is gone and the handle closed.
    async fn run(
        &self,
        entry: &Arc<FileEntry>,
        write: &PendingWrite,
        mut handle: ExclusiveFile,
    ) -> Result<Settled, (Option<ExclusiveFile>, StoreError)> {
        let mut written = None;
        loop {
            let seen = write.deadline();
            tokio::time::sleep_until(seen.target).await;
            if write.rearmed_since(seen) {
                continue;
            }

            let snapshot = Arc::clone(entry);
            let bytes = match tokio::task::spawn_blocking(move || snapshot.serialize()).await {
                Ok(Ok(bytes)) => bytes,
                Ok(Err(e)) => return Err((Some(handle), e)),
                Err(e) => return Err((Some(handle), e.into())),
            };
            if write.rearmed_since(seen) {
                trace!("Discarding stale serialization of {}", entry.id());
                continue;
            }

            if !entry.matches_disk(&bytes) {
                entry.forget_disk();
                trace!(
                    "Writing {} bytes of {} to {}",
                    bytes.len(),
                    entry.format().file_extension(),
                    handle.path().display()
                );
                if let Err(e) = handle.replace_contents(bytes.clone()).await {
                    return Err((Some(handle), e));
                }
                entry.mark_persisted(&bytes);
                written = Some(bytes.len());
            }
            if write.rearmed_since(seen) {
                trace!("Graph {} changed while being written, rescheduling", entry.id());
                continue;
            }

            match self.settle(entry.id(), write, seen, handle) {
                Ok(()) => {
                    return Ok(match written {
                        Some(bytes) => Settled::Written(bytes),
                        None => Settled::Unchanged,
                    })
                }
                Err(returned) => handle = returned,
            }
        }
    }

    /// Ends the cycle unless a re-arm slipped in since `seen`. The check, the
    /// removal and the close happen under the pending lock, so `notify_mutated`
    /// either re-arms this cycle or starts a new one after the handle is closed.
    fn settle(
        &self,
        id: &str,
        write: &PendingWrite,
        seen: Deadline,
        handle: ExclusiveFile,
    ) -> Result<(), ExclusiveFile> {
        let mut pending = lock(&self.pending);
        if write.rearmed_since(seen) {
            return Err(handle);
        }
        pending.remove(id);
        handle.close();
        Ok(())
    }

    fn abandon(&self, entry: &FileEntry, handle: Option<ExclusiveFile>, e: StoreError) {
        entry.forget_disk();
        {
            let mut pending = lock(&self.pending);
            if let Some(handle) = handle {
                handle.close();
            }
            pending.remove(entry.id());
        }
        error!(
            "Failed to write graph {} to {}: {}",
            entry.id(),
            entry.path().display(),
            e
        );
        self.publish(StoreEvent::WriteFailed {
            graph: entry.graph_name(),
            path: entry.path().to_path_buf(),
            error: e.to_string(),
        });
    }

    fn refresh_in_flight(&self) {
        let pending = lock(&self.pending);
        self.in_flight.send_replace(pending.len());
    }

    fn publish(&self, event: StoreEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}
