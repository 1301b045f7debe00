use std::path::PathBuf;

use thiserror::Error;

/// Failures while setting up or running a branch watcher.
///
/// None of these are fatal to the host: initialization errors fall back to a
/// one-shot branch lookup, runtime errors are logged and skipped.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("not a git repository: {} has no .git directory", .0.display())]
    NotARepository(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("filesystem watch error: {0}")]
    Notify(#[from] notify::Error),
}

impl WatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
