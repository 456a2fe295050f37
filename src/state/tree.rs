// Folder tree - lazily realized directory nodes stored in an arena
use crate::entry::Location;
use crate::model::path::PathAnalyzer;
use indextree::{Arena, NodeId};
use std::path::Path;

/// Handle of a node in a [`FolderTree`]. Stale handles are detected, never
/// dereferenced.
pub type NodeHandle = NodeId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FolderNode {
    pub location: Location,
    /// Subfolders may exist but have not been listed yet.
    pub has_unrealized_children: bool,
    pub expanded: bool,
    /// Child list must be re-listed on next expansion.
    pub stale: bool,
    /// Child list has been listed at least once since the last collapse.
    pub realized: bool,
}

impl FolderNode {
    pub fn new(location: Location, has_unrealized_children: bool) -> Self {
        Self {
            location,
            has_unrealized_children,
            expanded: false,
            stale: false,
            realized: false,
        }
    }
}

/// Directory tree with parent links kept as arena indices.
pub struct FolderTree {
    arena: Arena<FolderNode>,
    root: Option<NodeId>,
}

impl Default for FolderTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FolderTree {
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            root: None,
        }
    }

    pub fn with_root(location: Location, has_unrealized_children: bool) -> Self {
        let mut tree = Self::new();
        tree.reset(location, has_unrealized_children);
        tree
    }

    /// Drops every node and installs a new root.
    pub fn reset(&mut self, location: Location, has_unrealized_children: bool) -> NodeId {
        self.arena = Arena::new();
        let root = self
            .arena
            .new_node(FolderNode::new(location, has_unrealized_children));
        self.root = Some(root);
        root
    }

    pub fn clear(&mut self) {
        self.arena = Arena::new();
        self.root = None;
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&FolderNode> {
        if id.is_removed(&self.arena) {
            return None;
        }
        self.arena.get(id).map(|n| n.get())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut FolderNode> {
        if id.is_removed(&self.arena) {
            return None;
        }
        self.arena.get_mut(id).map(|n| n.get_mut())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        if id.is_removed(&self.arena) {
            return None;
        }
        self.arena.get(id).and_then(|n| n.parent())
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        if id.is_removed(&self.arena) {
            return Vec::new();
        }
        id.children(&self.arena).collect()
    }

    /// True while the ancestor chain of `id` still ends at the root.
    pub fn is_reachable(&self, id: NodeId) -> bool {
        let Some(root) = self.root else {
            return false;
        };
        if id.is_removed(&self.arena) {
            return false;
        }
        id.ancestors(&self.arena).last() == Some(root)
    }

    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) {
        if let Some(node) = self.node_mut(id) {
            node.expanded = expanded;
        }
    }

    pub fn mark_stale(&mut self, id: NodeId) {
        if let Some(node) = self.node_mut(id) {
            node.stale = true;
        }
    }

    pub fn mark_realized(&mut self, id: NodeId) {
        if let Some(node) = self.node_mut(id) {
            node.realized = true;
            node.stale = false;
        }
    }

    /// Appends a child only while `parent` is expanded and reachable.
    pub fn append_child(&mut self, parent: NodeId, child: FolderNode) -> Option<NodeId> {
        let expanded = self.node(parent).map(|n| n.expanded).unwrap_or(false);
        if !expanded || !self.is_reachable(parent) {
            return None;
        }
        let id = self.arena.new_node(child);
        parent.append(id, &mut self.arena);
        Some(id)
    }

    /// Forgets the in-memory children of `id`.
    /// A node that had children goes back to "unrealized" rather than leaf.
    pub fn clear_children(&mut self, id: NodeId) {
        let children = self.children(id);
        let had_children = !children.is_empty();
        for child in children {
            self.remove_subtree(child);
        }
        if let Some(node) = self.node_mut(id) {
            node.realized = false;
            node.stale = false;
            node.has_unrealized_children |= had_children;
        }
    }

    /// Detaches and frees `id` together with all of its descendants.
    pub fn remove_subtree(&mut self, id: NodeId) {
        if id.is_removed(&self.arena) {
            return;
        }
        let mut doomed: Vec<NodeId> = id.descendants(&self.arena).collect();
        doomed.reverse();
        for node in doomed {
            node.remove(&mut self.arena);
        }
        if self.root == Some(id) {
            self.root = None;
        }
    }

    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent).into_iter().find(|child| {
            self.node(*child)
                .and_then(|n| n.location.path.file_name())
                .map(|n| n == name)
                .unwrap_or(false)
        })
    }

    /// Walks realized nodes from `start`, one path component per level.
    pub fn locate_from(&self, start: NodeId, target: &Path) -> Option<NodeId> {
        let start_path = self.node(start)?.location.path.clone();
        let mut analyzer = PathAnalyzer::new(target, &start_path).ok()?;
        let mut current = start;
        while analyzer.has_next_level() {
            let segment = analyzer.next_relative_segment().ok()?;
            current = self.find_child(current, &segment)?;
        }
        Some(current)
    }

    pub fn locate(&self, target: &Path) -> Option<NodeId> {
        self.locate_from(self.root?, target)
    }

    pub fn len(&self) -> usize {
        match self.root {
            Some(root) => root.descendants(&self.arena).count(),
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Retargets a node after a rename of its folder.
    pub fn relocate(&mut self, id: NodeId, location: Location) {
        let old = match self.node(id) {
            Some(node) => node.location.path.clone(),
            None => return,
        };
        let subtree: Vec<NodeId> = id.descendants(&self.arena).collect();
        for node_id in subtree {
            if node_id == id {
                if let Some(node) = self.node_mut(node_id) {
                    node.location = location.clone();
                }
                continue;
            }
            if let Some(node) = self.node_mut(node_id) {
                if let Ok(rest) = node.location.path.strip_prefix(&old) {
                    node.location.path = location.path.join(rest);
                }
            }
        }
    }
}
