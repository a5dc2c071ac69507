//! File watching for hot reload, behind the `hot-reload` feature.
//!
//! The watcher runs on notify's own thread and queues events on a
//! channel; [`AssetServer::process_hot_reload`] drains it on the driver
//! thread so reloads happen at a well-defined point in the frame.
//!
//! [`AssetServer::process_hot_reload`]: crate::server::AssetServer::process_hot_reload

use std::path::{Path, PathBuf};
use std::sync::mpsc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::{AssetError, AssetResult};

pub(crate) struct AssetWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<notify::Result<Event>>,
}

impl AssetWatcher {
    pub fn new(dir: &Path) -> AssetResult<Self> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx).map_err(|e| AssetError::Watch {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;
        watcher
            .watch(dir, RecursiveMode::Recursive)
            .map_err(|e| AssetError::Watch {
                path: dir.to_path_buf(),
                message: e.to_string(),
            })?;
        tracing::info!(dir = %dir.display(), "watching for asset changes");
        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Drains queued events into a deduplicated list of changed files.
    pub fn poll_changes(&self) -> Vec<PathBuf> {
        let mut changed = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            let event = match event {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(error = %err, "file watcher error");
                    continue;
                }
            };
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                continue;
            }
            for path in event.paths {
                if !changed.contains(&path) {
                    changed.push(path);
                }
            }
        }
        changed
    }
}
