//! File lifecycle tracking — mirrors editor open/close of view-tree
//! documents into the engine's view of the generated artifacts.
//!
//! At most one synced entry exists per generated path; re-opening the same
//! document is a no-op. Each entry carries a filesystem watch on its
//! generated artifact whose change events funnel into the session's watch
//! pump.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::paths;
use crate::server::EngineHandle;

/// One tracked generated artifact. Dropping the entry stops its watch.
struct SyncedFile {
    #[allow(dead_code)]
    original: PathBuf,
    _watcher: Option<RecommendedWatcher>,
}

pub(crate) struct FileTracker {
    engine: EngineHandle,
    workspace_roots: Vec<PathBuf>,
    watch_tx: mpsc::Sender<PathBuf>,
    synced: HashMap<PathBuf, SyncedFile>,
}

impl FileTracker {
    pub fn new(
        engine: EngineHandle,
        workspace_roots: Vec<PathBuf>,
        watch_tx: mpsc::Sender<PathBuf>,
    ) -> Self {
        Self {
            engine,
            workspace_roots,
            watch_tx,
            synced: HashMap::new(),
        }
    }

    /// Mirror an editor open. Idempotent per generated path.
    pub async fn open(&mut self, document: &Path) {
        let Some(generated) = paths::generated_path(document) else {
            return;
        };
        if self.synced.contains_key(&generated) {
            return;
        }

        let content = match std::fs::read_to_string(&generated) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(
                    "cannot read generated artifact {}: {e}",
                    generated.display()
                );
                return;
            }
        };

        let watcher = watch_generated(&generated, self.watch_tx.clone());
        let project_root =
            paths::workspace_root_for(&self.workspace_roots, document).map(Path::to_path_buf);

        self.synced.insert(
            generated.clone(),
            SyncedFile {
                original: document.to_path_buf(),
                _watcher: watcher,
            },
        );
        self.engine
            .open(&generated, content, project_root.as_deref())
            .await;
    }

    /// Mirror an editor close; untracked documents are ignored.
    pub async fn close(&mut self, document: &Path) {
        let Some(generated) = paths::generated_path(document) else {
            return;
        };
        if self.synced.remove(&generated).is_none() {
            return;
        }
        self.engine.close(&generated).await;
    }

    #[must_use]
    pub fn is_tracked(&self, generated: &Path) -> bool {
        self.synced.contains_key(generated)
    }

    #[cfg(test)]
    pub(crate) fn tracked_count(&self) -> usize {
        self.synced.len()
    }
}

/// Watch one generated artifact; change events funnel into the session's
/// watch pump. Registration failure degrades to an unwatched entry.
fn watch_generated(generated: &Path, tx: mpsc::Sender<PathBuf>) -> Option<RecommendedWatcher> {
    let path = generated.to_path_buf();
    let result = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
        Ok(event) => {
            let relevant = matches!(
                event.kind,
                notify::EventKind::Create(_) | notify::EventKind::Modify(_)
            );
            if relevant && tx.blocking_send(path.clone()).is_err() {
                tracing::trace!("watch consumer gone; dropping change event");
            }
        }
        Err(e) => tracing::warn!("watch error: {e}"),
    });

    let mut watcher = match result {
        Ok(watcher) => watcher,
        Err(e) => {
            tracing::warn!("cannot create watcher for {}: {e}", generated.display());
            return None;
        }
    };
    if let Err(e) = watcher.watch(generated, RecursiveMode::NonRecursive) {
        tracing::warn!("cannot watch {}: {e}", generated.display());
        return None;
    }
    Some(watcher)
}
