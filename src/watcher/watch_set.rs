use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use tracing::debug;

use crate::error::WatchError;

/// The subset of filesystem operations the branch watcher cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsOp {
    Write,
    Create,
    Other,
}

impl From<&EventKind> for FsOp {
    fn from(kind: &EventKind) -> Self {
        match kind {
            EventKind::Create(_) => FsOp::Create,
            // Git replaces HEAD and loose refs by renaming a `.lock` file over them.
            EventKind::Modify(ModifyKind::Name(
                RenameMode::To | RenameMode::Both | RenameMode::Any,
            )) => FsOp::Create,
            EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
                FsOp::Write
            }
            _ => FsOp::Other,
        }
    }
}

/// A single-path change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub path: PathBuf,
    pub op: FsOp,
}

impl FsEvent {
    pub fn new(path: impl Into<PathBuf>, op: FsOp) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }

    /// Split a `notify` event into one event per affected path.
    pub fn from_notify(event: notify::Event) -> Vec<FsEvent> {
        let op = FsOp::from(&event.kind);
        event
            .paths
            .into_iter()
            .map(|path| FsEvent { path, op })
            .collect()
    }
}

/// Subscribe/unsubscribe seam over the filesystem notification service.
/// Production uses `notify`'s recommended watcher; tests use a recorder.
pub trait WatchBackend: Send + 'static {
    fn watch(&mut self, path: &Path) -> Result<(), WatchError>;
    fn unwatch(&mut self, path: &Path) -> Result<(), WatchError>;
}

impl WatchBackend for RecommendedWatcher {
    fn watch(&mut self, path: &Path) -> Result<(), WatchError> {
        notify::Watcher::watch(self, path, RecursiveMode::NonRecursive)?;
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> Result<(), WatchError> {
        notify::Watcher::unwatch(self, path)?;
        Ok(())
    }
}

/// Owned set of active subscriptions, keyed by path. The branch watcher
/// subscribes to directories and filters their events down to the files
/// it tracks.
pub struct WatchSet<B: WatchBackend> {
    backend: B,
    paths: Vec<PathBuf>,
}

impl<B: WatchBackend> WatchSet<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            paths: Vec::new(),
        }
    }

    /// Subscribe to `path`. Returns `Ok(false)` if it was already watched.
    pub fn add(&mut self, path: &Path) -> Result<bool, WatchError> {
        if self.contains(path) {
            return Ok(false);
        }
        self.backend.watch(path)?;
        self.paths.push(path.to_path_buf());
        Ok(true)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Drop every subscription and the backend itself.
    pub fn release(mut self) {
        for path in std::mem::take(&mut self.paths) {
            if let Err(e) = self.backend.unwatch(&path) {
                debug!("unwatch {} failed: {e}", path.display());
            }
        }
    }
}
