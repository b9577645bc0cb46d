//! File watching for `--watch`.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{Result, ValidationError};

/// Watches a single file. Dropping it stops the watch.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<()>,
}

impl FileWatcher {
    /// Watch the parent directory of `path` so editors that replace the file
    /// on save are still seen.
    pub fn new(path: &Path) -> Result<Self> {
        let target = path.to_path_buf();
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, events) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_relevant(&event, &target) => {
                let _ = tx.send(());
            }
            Ok(_) => {}
            Err(error) => warn!(%error, "file watch error"),
        })
        .map_err(watch_error)?;

        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(watch_error)?;

        Ok(Self {
            _watcher: watcher,
            events,
        })
    }

    /// Wait for the next change, coalescing any burst already queued.
    /// Returns `None` if the watcher stopped.
    pub async fn changed(&mut self) -> Option<()> {
        self.events.recv().await?;
        while self.events.try_recv().is_ok() {}
        Some(())
    }
}

/// Modify or create events that touch `target`'s file name
pub fn is_relevant(event: &Event, target: &Path) -> bool {
    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
        return false;
    }
    let Some(name) = target.file_name() else {
        return false;
    };
    event.paths.iter().any(|p| p.file_name() == Some(name))
}

fn watch_error(error: notify::Error) -> ValidationError {
    ValidationError::Io(std::io::Error::other(error.to_string()))
}
