use crate::core::error::{Error, Result};
use crate::engine::Engine;
use crate::indexing::discovery::is_journal_file;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::sync_channel;
use std::sync::Arc;
use tracing::{debug, warn};

/// Depth of the pending-event queue between the OS watcher and the worker.
/// A full queue blocks the watcher callback rather than dropping events.
const EVENT_QUEUE_DEPTH: usize = 1024;

/// A filesystem change the index must reconcile with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Moved(PathBuf, PathBuf),
}

/// Translate one notify event into zero or more change events.
/// Directory events and non-journal extensions are dropped here.
pub fn translate(event: &Event) -> Vec<ChangeEvent> {
    match &event.kind {
        EventKind::Create(_) => journal_paths(event).map(ChangeEvent::Created).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let (Some(src), Some(dest)) = (event.paths.first(), event.paths.get(1)) else {
                return Vec::new();
            };
            match (is_journal_file(src), is_journal_file(dest)) {
                (true, true) => vec![ChangeEvent::Moved(src.clone(), dest.clone())],
                // Renamed away from a journal extension: the indexed file is gone
                (true, false) => vec![ChangeEvent::Deleted(src.clone())],
                // Renamed into a journal extension: a new file appeared
                (false, true) => vec![ChangeEvent::Created(dest.clone())],
                (false, false) => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            journal_paths(event).map(ChangeEvent::Deleted).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            journal_paths(event).map(ChangeEvent::Created).collect()
        }
        EventKind::Modify(_) => journal_paths(event).map(ChangeEvent::Modified).collect(),
        EventKind::Remove(_) => journal_paths(event).map(ChangeEvent::Deleted).collect(),
        _ => Vec::new(),
    }
}

fn journal_paths(event: &Event) -> impl Iterator<Item = PathBuf> + '_ {
    event
        .paths
        .iter()
        .filter(|p| is_journal_file(p))
        .cloned()
}

/// Reconciliation loop: watches the journal tree and keeps the index
/// consistent with it.
pub struct FileWatcher {
    root: PathBuf,
    engine: Arc<Engine>,
}

impl FileWatcher {
    pub fn new(root: &Path, engine: Arc<Engine>) -> Self {
        Self {
            root: root.to_path_buf(),
            engine,
        }
    }

    /// Watch for changes and apply them until the watcher goes away.
    ///
    /// Events flow through a bounded channel into this single consumer, so
    /// they are applied strictly in delivery order with no coalescing: a
    /// rapid series of writes to one file becomes the same series of full
    /// re-index replacements.
    pub fn watch(&self) -> Result<()> {
        let (tx, rx) = sync_channel::<ChangeEvent>(EVENT_QUEUE_DEPTH);

        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    for change in translate(&event) {
                        if tx.send(change).is_err() {
                            break;
                        }
                    }
                }
                Err(e) => warn!("watcher error: {}", e),
            },
            notify::Config::default(),
        )
        .map_err(|e| watch_error(format!("Failed to create file watcher: {}", e)))?;

        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| {
                watch_error(format!("Failed to watch {}: {}", self.root.display(), e))
            })?;

        for change in rx {
            debug!("applying {:?}", change);
            if let Err(e) = self.engine.apply_event(&change) {
                warn!("failed to apply {:?}: {}", change, e);
            }
        }

        Ok(())
    }
}

fn watch_error(message: String) -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::Other, message))
}
