use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use portfox_core::{CancelToken, LifecycleError};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Check,
    Update,
    Create,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::Update => "update",
            Self::Create => "create",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Busy,
}

type SlotKey = (OperationKind, PathBuf);

/// Registry of background workers. At most one worker runs per (kind, target); clones
/// share the same registry.
#[derive(Debug, Clone, Default)]
pub struct Workers {
    busy: Arc<Mutex<HashSet<SlotKey>>>,
}

impl Workers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, kind: OperationKind, target: &Path) -> WorkerState {
        if self.slots().contains(&(kind, normalize_target(target))) {
            WorkerState::Busy
        } else {
            WorkerState::Idle
        }
    }

    /// Starts `job` on a dedicated thread, or fails with `Busy` when the slot is taken.
    pub fn spawn<T, F>(
        &self,
        kind: OperationKind,
        target: &Path,
        job: F,
    ) -> Result<TaskHandle<T>, LifecycleError>
    where
        F: FnOnce(CancelToken) -> T + Send + 'static,
        T: Send + 'static,
    {
        let key = (kind, normalize_target(target));
        if !self.slots().insert(key.clone()) {
            return Err(LifecycleError::Busy {
                kind: kind.as_str().to_string(),
                target: target.to_path_buf(),
            });
        }

        let slot = SlotGuard {
            busy: Arc::clone(&self.busy),
            key,
        };
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        let spawned = thread::Builder::new()
            .name(format!("portfox-{}", kind.as_str()))
            .spawn(move || {
                let _slot = slot;
                job(worker_cancel)
            });

        // A failed spawn drops the closure, and with it the slot guard.
        let handle = spawned.map_err(|err| {
            LifecycleError::filesystem(format!("failed to start {kind} worker"), err)
        })?;

        info!(kind = kind.as_str(), target = %target.display(), "worker started");
        Ok(TaskHandle {
            kind,
            target: target.to_path_buf(),
            cancel,
            handle,
        })
    }

    fn slots(&self) -> MutexGuard<'_, HashSet<SlotKey>> {
        self.busy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Frees the registry slot when the worker thread finishes, even by panic.
struct SlotGuard {
    busy: Arc<Mutex<HashSet<SlotKey>>>,
    key: SlotKey,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut busy = self
            .busy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        busy.remove(&self.key);
        debug!(kind = self.key.0.as_str(), "worker slot released");
    }
}

pub struct TaskHandle<T> {
    kind: OperationKind,
    target: PathBuf,
    cancel: CancelToken,
    handle: JoinHandle<T>,
}

impl<T> TaskHandle<T> {
    /// Requests cooperative cancellation; the job sees it at its next checked boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn join(self) -> Result<T, LifecycleError> {
        self.handle
            .join()
            .map_err(|_| LifecycleError::WorkerPanicked {
                kind: self.kind.as_str().to_string(),
                target: self.target,
            })
    }
}

fn normalize_target(target: &Path) -> PathBuf {
    target
        .canonicalize()
        .unwrap_or_else(|_| target.to_path_buf())
}
