//! Serializes commits for one file through a single dedicated OS thread
//! that owns the `StorageFileManager` outright once it is handed over
//! (spec.md §4.4, §5).
//!
//! A thread pool isn't the right tool here: there is exactly one mutable
//! resource (the file) and exactly one writer ever touches it, so a pool
//! would just be N-1 idle threads. `GamesmanNova` reaches for the same
//! dedicated-worker shape for persisting checkpoint log files, which is
//! where this pattern is grounded. Completions are reported through
//! `tokio::sync::oneshot` so callers can `.await` them from async code
//! without requiring the worker thread itself to run inside a runtime.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::storage_file::{ChangeSet, StorageFileManager};

struct CommitJob {
    batches: Vec<(&'static str, ChangeSet)>,
    cancel: CancellationToken,
    respond: oneshot::Sender<Result<(), EngineError>>,
}

enum Message {
    Commit(CommitJob),
    Shutdown,
}

/// Handle to the worker thread. Cloning the handle is cheap (it only
/// clones the `mpsc::Sender`); every clone feeds the same queue.
#[derive(Clone)]
pub struct FileWriteQueue {
    sender: mpsc::Sender<Message>,
}

pub struct FileWriteQueueHandle {
    pub queue: FileWriteQueue,
    join: Option<JoinHandle<()>>,
}

impl FileWriteQueue {
    /// Takes ownership of `manager` on the spawned thread; nothing else
    /// may touch it afterward.
    pub fn spawn(manager: StorageFileManager) -> FileWriteQueueHandle {
        let (sender, receiver) = mpsc::channel::<Message>();
        let join = thread::Builder::new()
            .name("recordstore-write-queue".into())
            .spawn(move || Self::run(manager, receiver))
            .expect("failed to spawn recordstore write-queue thread");

        FileWriteQueueHandle {
            queue: FileWriteQueue { sender },
            join: Some(join),
        }
    }

    fn run(mut manager: StorageFileManager, receiver: mpsc::Receiver<Message>) {
        while let Ok(message) = receiver.recv() {
            match message {
                Message::Commit(job) => {
                    let result = Self::apply_job(&mut manager, job.batches, &job.cancel);
                    let _ = job.respond.send(result);
                }
                Message::Shutdown => break,
            }
        }
    }

    fn apply_job(
        manager: &mut StorageFileManager,
        batches: Vec<(&'static str, ChangeSet)>,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        for (name, changes) in batches {
            if cancel.is_cancelled() {
                tracing::warn!(table = name, "commit cancelled before applying table batch");
                return Err(EngineError::Cancelled);
            }
            if changes.is_empty() {
                continue;
            }
            tracing::debug!(
                table = name,
                added = changes.added.len(),
                modified = changes.modified.len(),
                deleted = changes.deleted.len(),
                "applying table batch"
            );
            manager.apply_changes(name, &changes)?;
        }
        Ok(())
    }

    /// Enqueues a commit and returns a receiver that resolves once the
    /// worker thread has applied every table's batch (or hit an error,
    /// or observed cancellation).
    pub async fn submit_commit(
        &self,
        batches: Vec<(&'static str, ChangeSet)>,
        cancel: CancellationToken,
    ) -> Result<(), EngineError> {
        let (respond, receiver) = oneshot::channel();
        let job = CommitJob {
            batches,
            cancel,
            respond,
        };
        self.sender
            .send(Message::Commit(job))
            .map_err(|_| EngineError::Disposed)?;
        receiver.await.map_err(|_| EngineError::Disposed)?
    }
}

impl FileWriteQueueHandle {
    pub fn queue(&self) -> FileWriteQueue {
        self.queue.clone()
    }
}

/// How long `shutdown` waits for the worker thread to drain outstanding
/// work before giving up on joining it (spec.md §4.4, §5).
const SHUTDOWN_WAIT: Duration = Duration::from_secs(10);

impl Drop for FileWriteQueueHandle {
    fn drop(&mut self) {
        let _ = self.queue.sender.send(Message::Shutdown);
        let Some(join) = self.join.take() else {
            return;
        };

        // `JoinHandle::join` has no timeout of its own, so a watcher thread
        // joins it and reports back over a channel we can bound with
        // `recv_timeout`. If the worker is still stuck past the deadline we
        // give up on joining and let the watcher finish on its own time.
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let watcher = thread::Builder::new()
            .name("recordstore-write-queue-shutdown".into())
            .spawn(move || {
                let _ = join.join();
                let _ = done_tx.send(());
            });

        let Ok(watcher) = watcher else {
            return;
        };

        match done_rx.recv_timeout(SHUTDOWN_WAIT) {
            Ok(()) => {
                let _ = watcher.join();
            }
            Err(_) => {
                tracing::warn!(
                    "recordstore write-queue worker did not shut down within {:?}; abandoning join",
                    SHUTDOWN_WAIT
                );
            }
        }
    }
}
