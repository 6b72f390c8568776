// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Path-keyed arena of shadow nodes
//!
//! The index owns every [`Node`] of a tree. Nodes are addressed by [`NodeId`] and found
//! by normalized path; the path map holds at most one node per key. Tombstoned nodes
//! stay in the arena (and in the path map until something else takes the path or
//! [`PathIndex::prune`] runs) so that ids held by callers never dangle.
//!
//! `PathIndex` itself is not synchronized; [`crate::FsTree`] wraps it in one mutex.

use std::collections::HashMap;

use tracing::warn;

use crate::config::CaseSensitivity;
use crate::node::{LinkGroup, Node, NodeId};
use crate::ops::FsOps;
use crate::path;
use crate::types::NodeHandle;

#[derive(Debug)]
pub struct PathIndex {
    case: CaseSensitivity,
    nodes: Vec<Node>,
    by_path: HashMap<String, NodeId>,
    next_group: u64,
}

impl PathIndex {
    pub fn new(case: CaseSensitivity) -> Self {
        Self {
            case,
            nodes: Vec::new(),
            by_path: HashMap::new(),
            next_group: 1,
        }
    }

    pub fn case_sensitivity(&self) -> CaseSensitivity {
        self.case
    }

    pub fn key(&self, path: &str) -> String {
        self.case.fold(&path::normalize(path))
    }

    /// Resident node at `path`, tombstoned or not
    pub fn find(&self, path: &str) -> Option<NodeId> {
        self.by_path.get(&self.key(path)).copied()
    }

    /// Node at `path` that still exists
    pub fn find_existing(&self, path: &str) -> Option<NodeId> {
        self.find(path).filter(|id| self.nodes[id.0].exists)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    /// Insert `node`, or overwrite the mutable state of the node resident at its path
    ///
    /// Overwriting keeps the resident id so that references held elsewhere stay valid.
    pub fn upsert(&mut self, mut node: Node) -> NodeId {
        let key = self.key(&node.path);
        if let Some(&id) = self.by_path.get(&key) {
            let slot = &mut self.nodes[id.0];
            slot.identity = node.identity;
            slot.path = node.path;
            slot.name = node.name;
            slot.kind = node.kind;
            slot.parent = node.parent;
            slot.attrs = node.attrs;
            slot.written = node.written;
            slot.exists = node.exists;
            slot.looked_up = node.looked_up;
            slot.owned = node.owned;
            return id;
        }
        let id = NodeId(self.nodes.len());
        node.id = id;
        self.nodes.push(node);
        self.by_path.insert(key, id);
        id
    }

    /// Reclaim the node at `path` if it is looked up, then drop it from the path map
    pub fn remove(&mut self, path: &str, ops: &dyn FsOps) -> Option<NodeId> {
        let id = self.find(path)?;
        let _ = self.reclaim(id, ops);
        let key = self.key(path);
        self.by_path.remove(&key);
        self.nodes[id.0].exists = false;
        Some(id)
    }

    /// Tombstone a node, optionally giving its handle back first
    pub fn mark_not_existing(&mut self, id: NodeId, reclaim: bool, ops: &dyn FsOps) {
        if reclaim {
            let _ = self.reclaim(id, ops);
        }
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.exists = false;
        }
    }

    /// Give back the node's lookup reference; a no-op when it holds none
    pub fn reclaim(&mut self, id: NodeId, ops: &dyn FsOps) -> crate::error::Status {
        let Some(node) = self.nodes.get_mut(id.0) else {
            return Ok(());
        };
        if node.is_root() {
            return Ok(());
        }
        let Some(handle) = node.live_handle() else {
            return Ok(());
        };
        match ops.reclaim(handle) {
            Ok(()) => {
                node.looked_up = false;
                Ok(())
            }
            Err(errno) => {
                warn!("reclaim of {} ({}) failed: {}", node.path, handle, errno);
                Err(errno)
            }
        }
    }

    /// Drop the node's path key so the next node at that path gets its own slot
    pub fn unmap(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(id.0) else {
            return;
        };
        let key = self.key(&node.path);
        if self.by_path.get(&key) == Some(&id) {
            self.by_path.remove(&key);
        }
    }

    /// Move a resident node to a new path key
    ///
    /// A tombstone already sitting at the new key is evicted from the path map.
    pub fn rekey(&mut self, id: NodeId, new_path: &str) {
        let old_key = self.key(&self.nodes[id.0].path);
        if self.by_path.get(&old_key) == Some(&id) {
            self.by_path.remove(&old_key);
        }
        let new_path = path::normalize(new_path);
        let new_key = self.key(&new_path);
        if let Some(previous) = self.by_path.insert(new_key, id) {
            if previous != id && self.nodes[previous.0].exists {
                warn!(
                    "rekey of {} displaced live node {}",
                    new_path, self.nodes[previous.0].path
                );
                self.nodes[previous.0].exists = false;
            }
        }
        self.nodes[id.0].set_path(new_path);
    }

    /// Drop tombstones from the path map; their arena slots stay addressable
    pub fn prune(&mut self) -> usize {
        let before = self.by_path.len();
        let nodes = &self.nodes;
        self.by_path.retain(|_, id| nodes[id.0].exists);
        before - self.by_path.len()
    }

    pub fn new_link_group(&mut self) -> LinkGroup {
        let group = LinkGroup::new(self.next_group);
        self.next_group += 1;
        group
    }

    /// Every existing node, in insertion order
    pub fn iter_existing(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.exists)
    }

    pub fn ids_existing(&self) -> Vec<NodeId> {
        self.iter_existing().map(|n| n.id).collect()
    }

    /// Existing nodes carrying `identity`; more than one for hard-linked files
    pub fn ids_with_identity(&self, identity: NodeHandle) -> Vec<NodeId> {
        self.iter_existing()
            .filter(|n| n.identity == Some(identity) && !n.is_dir())
            .map(|n| n.id)
            .collect()
    }

    /// Existing nodes strictly below `ancestor`
    pub fn descendants(&self, ancestor: &str) -> Vec<NodeId> {
        self.iter_existing()
            .filter(|n| path::is_descendant(&n.path, ancestor, self.case))
            .map(|n| n.id)
            .collect()
    }

    /// Every node still holding a lookup reference, tombstones included, root excluded
    pub fn held_handles(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.looked_up && !n.is_root())
            .map(|n| n.id)
            .collect()
    }

    pub fn resident_len(&self) -> usize {
        self.by_path.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use crate::ops::MockFsOps;

    fn looked_up_file(path: &str, handle: u64) -> Node {
        let mut node = Node::new(path, NodeKind::File { group: None });
        node.identity = Some(NodeHandle(handle));
        node.looked_up = true;
        node
    }

    #[test]
    fn upsert_overwrites_in_place() {
        let mut index = PathIndex::new(CaseSensitivity::Sensitive);
        let first = index.upsert(looked_up_file("/a", 1));
        let second = index.upsert(looked_up_file("/a", 2));
        assert_eq!(first, second);
        assert_eq!(index.get(first).unwrap().identity, Some(NodeHandle(2)));
        assert_eq!(index.resident_len(), 1);
    }

    #[test]
    fn insensitive_index_folds_case() {
        let mut index = PathIndex::new(CaseSensitivity::InsensitivePreserving);
        let id = index.upsert(looked_up_file("/Docs/Readme", 1));
        assert_eq!(index.find("/docs/README"), Some(id));
        assert_eq!(index.get(id).unwrap().path, "/Docs/Readme");
    }

    #[test]
    fn reclaim_is_idempotent() {
        let mut ops = MockFsOps::new();
        ops.expect_reclaim().times(1).returning(|_| Ok(()));
        let mut index = PathIndex::new(CaseSensitivity::Sensitive);
        let id = index.upsert(looked_up_file("/a", 9));
        assert!(index.reclaim(id, &ops).is_ok());
        assert!(index.reclaim(id, &ops).is_ok());
        index.mark_not_existing(id, true, &ops);
        assert!(!index.get(id).unwrap().exists);
        assert_eq!(index.get(id).unwrap().identity, Some(NodeHandle(9)));
    }

    #[test]
    fn remove_reclaims_and_unmaps() {
        let mut ops = MockFsOps::new();
        ops.expect_reclaim().times(1).returning(|_| Ok(()));
        let mut index = PathIndex::new(CaseSensitivity::Sensitive);
        index.upsert(looked_up_file("/a", 3));
        assert!(index.remove("/a", &ops).is_some());
        assert_eq!(index.find("/a"), None);
        assert!(index.remove("/a", &ops).is_none());
    }

    #[test]
    fn prune_drops_only_tombstones() {
        let ops = MockFsOps::new();
        let mut index = PathIndex::new(CaseSensitivity::Sensitive);
        let a = index.upsert(Node::new("/a", NodeKind::Directory));
        index.upsert(Node::new("/b", NodeKind::Directory));
        index.mark_not_existing(a, false, &ops);
        assert_eq!(index.prune(), 1);
        assert_eq!(index.find("/a"), None);
        assert!(index.find("/b").is_some());
        assert!(index.get(a).is_some());
    }

    #[test]
    fn rekey_moves_key_and_path() {
        let mut index = PathIndex::new(CaseSensitivity::Sensitive);
        let id = index.upsert(Node::new("/d/x", NodeKind::File { group: None }));
        index.rekey(id, "/e/x");
        assert_eq!(index.find("/d/x"), None);
        assert_eq!(index.find("/e/x"), Some(id));
        assert_eq!(index.get(id).unwrap().name, "x");
    }
}
