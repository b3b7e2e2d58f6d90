//! Canonical in-memory file tree of the open project.
//!
//! Invariants:
//! - every path in the open list (and the current path) exists in the tree;
//! - each write fully replaces the previous contents of a path;
//! - mutations mark the tree for persistence, and a batch of mutations yields
//!   exactly one persistence request when the owner drains it;
//! - nothing is handed to the store before the first load. Mutations made
//!   before it are layered over the loaded tree and persisted afterwards.

use workspace_protocol::{FileNode, FileTree};

use crate::error::WorkspaceError;

/// Paths touched by an overwrite-by-path merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
}

impl MergeReport {
    /// Every path mentioned by the patch, in patch order per category.
    pub fn touched(&self) -> impl Iterator<Item = &str> + '_ {
        self.created
            .iter()
            .chain(&self.updated)
            .chain(&self.unchanged)
            .map(String::as_str)
    }

    #[must_use]
    pub fn changed_count(&self) -> usize {
        self.created.len() + self.updated.len()
    }
}

/// Applies `patch` onto `base`: each patch path replaces the base node, and
/// base paths absent from the patch are kept untouched.
#[must_use]
pub fn merge_overwrite(base: &FileTree, patch: &FileTree) -> (FileTree, MergeReport) {
    let mut merged = base.clone();
    let mut report = MergeReport::default();

    for (path, node) in patch.iter() {
        match merged.insert(path, node.clone()) {
            None => report.created.push(path.to_string()),
            Some(previous) if previous == *node => report.unchanged.push(path.to_string()),
            Some(_) => report.updated.push(path.to_string()),
        }
    }

    (merged, report)
}

/// Persistence acknowledgement state of the local tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Synced,
    Pending,
    Failed(String),
}

/// Snapshot handed to the store, tagged with a monotonically increasing generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistRequest {
    pub generation: u64,
    pub tree: FileTree,
}

#[derive(Debug, Default)]
pub struct FileTreeStore {
    tree: FileTree,
    open_files: Vec<String>,
    current: Option<String>,
    dirty: bool,
    loaded: bool,
    last_issued: u64,
    last_acked: u64,
    sync: Option<SyncState>,
}

impl FileTreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a store-loaded tree.
    ///
    /// On the first load, paths written locally beforehand overwrite the
    /// loaded ones and stay scheduled for persistence. Later loads replace the
    /// whole tree and schedule nothing.
    pub fn replace(&mut self, tree: FileTree) {
        if !self.loaded && self.dirty {
            let (merged, report) = merge_overwrite(&tree, &self.tree);
            tracing::debug!(
                created = report.created.len(),
                updated = report.updated.len(),
                "carried local edits over the loaded tree"
            );
            self.tree = merged;
        } else {
            self.tree = tree;
            self.dirty = false;
        }
        self.loaded = true;
        self.prune_selection();
    }

    /// True once a store-loaded tree has been installed.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn get(&self, path: &str) -> Option<&FileNode> {
        self.tree.get(path)
    }

    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    /// Copy of the current tree, detached from later edits.
    pub fn snapshot(&self) -> FileTree {
        self.tree.clone()
    }

    /// Current paths in insertion order. Call again to restart.
    pub fn list_paths(&self) -> impl Iterator<Item = &str> + Clone + '_ {
        self.tree.paths()
    }

    pub fn set(
        &mut self,
        path: impl Into<String>,
        contents: impl Into<String>,
    ) -> Result<(), WorkspaceError> {
        let path = path.into();
        if path.trim().is_empty() {
            return Err(WorkspaceError::EmptyPath);
        }

        self.tree.insert(path, FileNode::new(contents));
        self.dirty = true;
        Ok(())
    }

    /// Overwrite-by-path merge; an empty patch schedules nothing.
    pub fn merge(&mut self, patch: &FileTree) -> MergeReport {
        let (merged, report) = merge_overwrite(&self.tree, patch);
        if !patch.is_empty() {
            self.tree = merged;
            self.dirty = true;
        }
        report
    }

    pub fn remove(&mut self, path: &str) -> Result<FileNode, WorkspaceError> {
        let removed = self
            .tree
            .remove(path)
            .ok_or_else(|| WorkspaceError::UnknownFile {
                path: path.to_string(),
            })?;
        self.dirty = true;
        self.prune_selection();
        Ok(removed)
    }

    /// Marks `path` current and appends it to the open list if needed.
    pub fn open(&mut self, path: &str) -> Result<(), WorkspaceError> {
        if !self.tree.contains(path) {
            return Err(WorkspaceError::UnknownFile {
                path: path.to_string(),
            });
        }

        if !self.open_files.iter().any(|open| open == path) {
            self.open_files.push(path.to_string());
        }
        self.current = Some(path.to_string());
        Ok(())
    }

    /// Closes `path`; the current selection moves to the neighbouring tab.
    pub fn close(&mut self, path: &str) {
        let Some(index) = self.open_files.iter().position(|open| open == path) else {
            return;
        };

        self.open_files.remove(index);
        if self.current.as_deref() == Some(path) {
            self.current = self
                .open_files
                .get(index)
                .or_else(|| self.open_files.last())
                .cloned();
        }
    }

    pub fn open_files(&self) -> &[String] {
        &self.open_files
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Drains the pending persistence request, if any mutation happened since
    /// the last drain. Held back until the first load.
    pub fn take_persist_request(&mut self) -> Option<PersistRequest> {
        if !self.loaded || !self.dirty {
            return None;
        }

        self.dirty = false;
        self.last_issued += 1;
        self.sync = Some(SyncState::Pending);
        Some(PersistRequest {
            generation: self.last_issued,
            tree: self.tree.clone(),
        })
    }

    /// Records a store acknowledgement. Acks may arrive out of issue order.
    pub fn on_persisted(&mut self, generation: u64) {
        if generation <= self.last_acked {
            tracing::debug!(generation, last_acked = self.last_acked, "stale persist ack");
            return;
        }

        self.last_acked = generation;
        if generation == self.last_issued {
            self.sync = Some(SyncState::Synced);
        }
    }

    /// Records a store failure. Local state is kept as the source of truth.
    pub fn on_persist_failed(&mut self, generation: u64, error: &str) {
        tracing::warn!(generation, error, "file tree persistence failed");
        if generation > self.last_acked {
            self.sync = Some(SyncState::Failed(error.to_string()));
        }
    }

    /// `None` until the first local mutation has been handed to the store.
    pub fn sync_state(&self) -> Option<&SyncState> {
        self.sync.as_ref()
    }

    fn prune_selection(&mut self) {
        let tree = &self.tree;
        self.open_files.retain(|path| tree.contains(path));
        if self
            .current
            .as_deref()
            .is_some_and(|current| !tree.contains(current))
        {
            self.current = self.open_files.last().cloned();
        }
    }
}
