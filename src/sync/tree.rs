// Tree synchronizer - lazy expansion, path location and removal propagation
use crate::entry::Location;
use crate::error::{NavError, StorageError};
use crate::io::provider::StorageProvider;
use crate::model::path::{display_name_of, is_same_or_descendant, PathAnalyzer};
use crate::state::tree::{FolderNode, FolderTree, NodeHandle};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Effect of an external removal on the displayed location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemovalEffect {
    Unaffected,
    /// The current location is gone; `fallback_parent` is where to go next.
    CurrentInvalidated { fallback_parent: Option<PathBuf> },
}

pub struct TreeSynchronizer {
    tree: Mutex<FolderTree>,
    storage: Arc<dyn StorageProvider>,
    show_hidden: AtomicBool,
}

impl TreeSynchronizer {
    pub fn new(storage: Arc<dyn StorageProvider>, show_hidden: bool) -> Self {
        Self {
            tree: Mutex::new(FolderTree::new()),
            storage,
            show_hidden: AtomicBool::new(show_hidden),
        }
    }

    pub fn set_show_hidden(&self, show_hidden: bool) {
        self.show_hidden.store(show_hidden, Ordering::Relaxed);
    }

    fn include_hidden(&self) -> bool {
        self.show_hidden.load(Ordering::Relaxed)
    }

    /// Read access to the tree. Do not hold across storage calls.
    pub async fn tree(&self) -> MutexGuard<'_, FolderTree> {
        self.tree.lock().await
    }

    /// Replaces the whole tree with a single root node.
    pub async fn reset_root(&self, location: Location) -> NodeHandle {
        let probe = self
            .storage
            .has_subfolders(&location.path, self.include_hidden())
            .await;
        self.tree.lock().await.reset(location, probe)
    }

    pub async fn root_path(&self) -> Option<PathBuf> {
        let tree = self.tree.lock().await;
        tree.root()
            .and_then(|root| tree.node(root))
            .map(|node| node.location.path.clone())
    }

    pub async fn clear(&self) {
        self.tree.lock().await.clear();
    }

    /// Lists subfolders of `node` and appends one child per folder.
    /// Returns the number of children appended; zero when already realized.
    pub async fn expand(&self, node: NodeHandle) -> Result<usize, StorageError> {
        let path = {
            let mut tree = self.tree.lock().await;
            let Some(current) = tree.node(node) else {
                return Ok(0);
            };
            if current.expanded && current.realized && !current.stale {
                return Ok(0);
            }
            let path = current.location.path.clone();
            tree.set_expanded(node, true);
            path
        };

        let include_hidden = self.include_hidden();
        let entries = match self.storage.list_children(&path, include_hidden).await {
            Ok(entries) => entries,
            Err(err) => {
                self.tree.lock().await.set_expanded(node, false);
                return Err(err);
            }
        };

        let folders: Vec<_> = entries.into_iter().filter(|e| e.is_dir()).collect();
        let listed: Vec<String> = folders.iter().map(|e| e.name.clone()).collect();

        let mut appended = 0;
        for entry in folders {
            let probe = self.storage.has_subfolders(&entry.path, include_hidden).await;
            let mut tree = self.tree.lock().await;
            let still_open = tree.is_reachable(node)
                && tree.node(node).map(|n| n.expanded).unwrap_or(false);
            if !still_open {
                debug!(path = %path.display(), "collapsed during expansion");
                tree.clear_children(node);
                return Ok(appended);
            }
            if tree.find_child(node, &entry.name).is_some() {
                continue;
            }
            if tree
                .append_child(node, FolderNode::new(entry.location(), probe))
                .is_some()
            {
                appended += 1;
            }
        }

        // A re-listing keeps surviving children and drops vanished ones.
        let mut tree = self.tree.lock().await;
        if tree.is_reachable(node) {
            for child in tree.children(node) {
                let gone = tree
                    .node(child)
                    .map(|n| !listed.contains(&display_name_of(&n.location.path)))
                    .unwrap_or(false);
                if gone {
                    tree.remove_subtree(child);
                }
            }
            tree.mark_realized(node);
        }
        Ok(appended)
    }

    /// Drops the in-memory child list; the folders themselves are untouched.
    pub async fn collapse(&self, node: NodeHandle) {
        let mut tree = self.tree.lock().await;
        tree.set_expanded(node, false);
        tree.clear_children(node);
    }

    /// Finds the realized node for `target`, walking down from `node`.
    pub async fn locate(&self, node: NodeHandle, target: &Path) -> Option<NodeHandle> {
        self.tree.lock().await.locate_from(node, target)
    }

    pub async fn node_for(&self, target: &Path) -> Option<NodeHandle> {
        self.tree.lock().await.locate(target)
    }

    /// Expands every folder from the root down to `target` and returns its node.
    pub async fn reveal(&self, target: &Path) -> Result<NodeHandle, NavError> {
        let not_located = || NavError::LocateFolderFailed(target.to_path_buf());
        let (root, root_path) = {
            let tree = self.tree.lock().await;
            let root = tree.root().ok_or_else(not_located)?;
            let path = tree.node(root).ok_or_else(not_located)?.location.path.clone();
            (root, path)
        };

        let mut analyzer = PathAnalyzer::new(target, &root_path).map_err(|_| not_located())?;
        let mut current = root;
        while analyzer.has_next_level() {
            self.expand(current).await?;
            let segment = analyzer.next_relative_segment().map_err(|_| not_located())?;
            current = self
                .tree
                .lock()
                .await
                .find_child(current, &segment)
                .ok_or_else(not_located)?;
        }
        Ok(current)
    }

    /// Re-lists `node` on its next expansion.
    pub async fn mark_stale(&self, node: NodeHandle) {
        self.tree.lock().await.mark_stale(node);
    }

    /// Re-lists an expanded node after a mutation inside it.
    pub async fn refresh_children(&self, node: NodeHandle) -> Result<usize, StorageError> {
        let expanded = {
            let mut tree = self.tree.lock().await;
            tree.mark_stale(node);
            tree.node(node).map(|n| n.expanded).unwrap_or(false)
        };
        if !expanded {
            return Ok(0);
        }
        self.expand(node).await
    }

    /// Retargets the node of `from` after its folder was renamed to `to`.
    pub async fn relocate(&self, from: &Path, to: Location) -> Option<NodeHandle> {
        let mut tree = self.tree.lock().await;
        let node = tree.locate(from)?;
        tree.relocate(node, to);
        Some(node)
    }

    /// Drops the node of `removed` and reports whether `current` went with it.
    pub async fn propagate_removal(&self, removed: &Path, current: Option<&Path>) -> RemovalEffect {
        {
            let mut tree = self.tree.lock().await;
            if let Some(node) = tree.locate(removed) {
                let parent = tree.parent(node);
                tree.remove_subtree(node);
                if let Some(parent) = parent {
                    if tree.children(parent).is_empty() {
                        tree.mark_stale(parent);
                    }
                }
            }
        }

        match current {
            Some(current) if is_same_or_descendant(current, removed) => {
                RemovalEffect::CurrentInvalidated {
                    fallback_parent: removed.parent().map(Path::to_path_buf),
                }
            }
            _ => RemovalEffect::Unaffected,
        }
    }
}
