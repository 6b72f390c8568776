// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Regrouping of nodes that share one identity into hard-link groups

use std::collections::HashMap;

use tracing::debug;

use crate::index::PathIndex;
use crate::node::{NodeId, NodeKind};
use crate::tree::FsTree;
use crate::types::NodeHandle;

/// Rebuild every link group from identities
///
/// Existing non-directory, non-symlink nodes are grouped by identity in insertion
/// order. The first node of a group of two or more stays a `File` and carries a fresh
/// group; the others become `HardLink` aliases. Running it twice gives the same
/// result. Returns the number of aliases.
pub fn resolve(index: &mut PathIndex) -> usize {
    let mut by_identity: HashMap<NodeHandle, Vec<NodeId>> = HashMap::new();
    let mut order = Vec::new();
    for node in index.iter_existing() {
        if !matches!(node.kind, NodeKind::File { .. } | NodeKind::HardLink { .. }) {
            continue;
        }
        let Some(identity) = node.identity else {
            continue;
        };
        let members = by_identity.entry(identity).or_default();
        if members.is_empty() {
            order.push(identity);
        }
        members.push(node.id());
    }

    let mut aliases = 0;
    for identity in order {
        let members = &by_identity[&identity];
        if members.len() < 2 {
            if let Some(node) = index.get_mut(members[0]) {
                node.kind = NodeKind::File { group: None };
            }
            continue;
        }
        let group = index.new_link_group();
        if let Some(canonical) = index.get_mut(members[0]) {
            canonical.kind = NodeKind::File {
                group: Some(group.clone()),
            };
        }
        for &alias in &members[1..] {
            if let Some(node) = index.get_mut(alias) {
                node.kind = NodeKind::HardLink {
                    group: group.clone(),
                };
                group.increment();
                aliases += 1;
            }
        }
        debug!("identity {} has {} links", identity, group.nlink());
    }
    aliases
}

impl FsTree {
    pub fn resolve_hardlinks(&self) -> usize {
        resolve(&mut self.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaseSensitivity;
    use crate::node::Node;
    use crate::types::NodeType;

    fn file(index: &mut PathIndex, path: &str, handle: u64) -> NodeId {
        let mut node = Node::new(path, NodeKind::File { group: None });
        node.identity = Some(NodeHandle(handle));
        index.upsert(node)
    }

    #[test]
    fn groups_shared_identities() {
        let mut index = PathIndex::new(CaseSensitivity::Sensitive);
        let a = file(&mut index, "/a", 10);
        let b = file(&mut index, "/b", 11);
        let c = file(&mut index, "/c", 10);
        let d = file(&mut index, "/d/c", 10);

        assert_eq!(resolve(&mut index), 2);
        let canonical = index.get(a).unwrap();
        assert_eq!(canonical.node_type(), NodeType::File);
        let group = canonical.link_group().unwrap().clone();
        assert_eq!(group.nlink(), 3);
        for alias in [c, d] {
            let node = index.get(alias).unwrap();
            assert_eq!(node.node_type(), NodeType::HardLink);
            assert!(node.link_group().unwrap().same_group(&group));
        }
        assert!(index.get(b).unwrap().link_group().is_none());
    }

    #[test]
    fn resolving_twice_is_stable() {
        let mut index = PathIndex::new(CaseSensitivity::Sensitive);
        let a = file(&mut index, "/a", 1);
        file(&mut index, "/b", 1);
        resolve(&mut index);
        assert_eq!(resolve(&mut index), 1);
        assert_eq!(index.get(a).unwrap().link_group().unwrap().nlink(), 2);
    }

    #[test]
    fn directories_are_never_grouped() {
        let mut index = PathIndex::new(CaseSensitivity::Sensitive);
        let mut dir = Node::new("/d", NodeKind::Directory);
        dir.identity = Some(NodeHandle(5));
        let dir = index.upsert(dir);
        file(&mut index, "/f", 5);
        assert_eq!(resolve(&mut index), 0);
        assert_eq!(index.get(dir).unwrap().node_type(), NodeType::Directory);
    }
}
