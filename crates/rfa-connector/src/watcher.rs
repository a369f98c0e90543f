//! Directory watch acquisition
//!
//! Watches the report directory (non-recursive) for newly created files and
//! runs each one through a bounded per-file retry loop: probe for an
//! exclusive lock held by the writer, back off, re-read. Files are handled
//! concurrently, capped by a semaphore, and tracked in a `JoinSet` so
//! shutdown can abort in-flight retries best-effort.

use notify::{EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::pipeline::Pipeline;

/// Per-file retry ceiling.
pub const MAX_ATTEMPTS: u32 = 5;

/// Delay between per-file attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Capacity of the event channel between notify's thread and the tokio loop.
const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Probe whether a file is currently held open exclusively by another
/// writer. A failed read+write open is taken as "locked".
pub fn is_file_locked(path: &Path) -> bool {
    std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .is_err()
}

/// Directory watch loop feeding per-file worker tasks.
pub struct FileAcquisition {
    directory: PathBuf,
    max_concurrent: usize,
    pipeline: Pipeline,
}

impl FileAcquisition {
    pub fn new(directory: PathBuf, max_concurrent: usize, pipeline: Pipeline) -> Self {
        Self {
            directory,
            max_concurrent,
            pipeline,
        }
    }

    /// Run until cancelled. A watcher setup failure halts this mode (the
    /// process keeps running so the failure is visible in the logs).
    pub async fn run(self, cancel: CancellationToken) {
        let (tx, mut rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        // notify calls back on its own thread; bridge into tokio.
        let mut watcher = match notify::recommended_watcher(move |res| {
            let _ = tx.blocking_send(res);
        }) {
            Ok(watcher) => watcher,
            Err(e) => {
                error!(error = %e, "Failed to create file watcher, file acquisition halted");
                return;
            },
        };

        if let Err(e) = watcher.watch(&self.directory, RecursiveMode::NonRecursive) {
            error!(
                dir = %self.directory.display(),
                error = %e,
                "Failed to watch report directory, file acquisition halted"
            );
            return;
        }

        info!(dir = %self.directory.display(), "Watching for report files");

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    None => {
                        warn!("File watcher channel closed, file acquisition halted");
                        break;
                    },
                    Some(Err(e)) => {
                        warn!(error = %e, "File watcher reported an error");
                    },
                    Some(Ok(event)) if matches!(event.kind, EventKind::Create(_)) => {
                        for path in event.paths {
                            if !path.is_file() {
                                continue;
                            }
                            self.spawn_file_task(&mut tasks, &semaphore, path, &cancel);
                        }
                    },
                    Some(Ok(_)) => {},
                },
                // Reap finished file tasks so the set does not grow unbounded.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {},
            }
        }

        // Best-effort shutdown: in-flight retry loops are aborted, not drained.
        tasks.shutdown().await;
        info!("File acquisition shut down");
    }

    fn spawn_file_task(
        &self,
        tasks: &mut JoinSet<()>,
        semaphore: &Arc<Semaphore>,
        path: PathBuf,
        cancel: &CancellationToken,
    ) {
        let semaphore = Arc::clone(semaphore);
        let pipeline = self.pipeline.clone();
        let cancel = cancel.clone();

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            handle_file(&path, &pipeline, &cancel).await;
        });
    }
}

/// Per-file retry loop: up to [`MAX_ATTEMPTS`] attempts, [`RETRY_DELAY`]
/// apart. Locked files and transient read errors both consume an attempt; a
/// vanished file is abandoned immediately.
async fn handle_file(path: &Path, pipeline: &Pipeline, cancel: &CancellationToken) {
    for attempt in 1..=MAX_ATTEMPTS {
        if cancel.is_cancelled() {
            return;
        }

        info!(
            path = %path.display(),
            attempt,
            max_attempts = MAX_ATTEMPTS,
            "Attempting to process file"
        );

        if is_file_locked(path) {
            warn!(path = %path.display(), "File is still being used by another process");
            if !wait_for_retry(attempt, cancel).await {
                return;
            }
            continue;
        }

        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let payload = String::from_utf8_lossy(&bytes);
                pipeline.process(&payload, &path.display().to_string()).await;
                info!(path = %path.display(), "Successfully processed file");
                return;
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Vanished between the event and the read; nothing to retry.
                error!(path = %path.display(), error = %e, "File disappeared, abandoning");
                return;
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "IO error reading file, retrying");
                if !wait_for_retry(attempt, cancel).await {
                    return;
                }
            },
        }
    }

    warn!(
        path = %path.display(),
        attempts = MAX_ATTEMPTS,
        "Giving up on file after repeated failures"
    );
}

/// Sleep before the next attempt, unless this was the last one or the token
/// fires. Returns false when the caller should stop retrying.
async fn wait_for_retry(attempt: u32, cancel: &CancellationToken) -> bool {
    if attempt >= MAX_ATTEMPTS {
        return true;
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = sleep(RETRY_DELAY) => true,
    }
}
