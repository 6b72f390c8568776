// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Shadow records for single filesystem entries

use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::path;
use crate::types::{Attributes, NodeHandle, NodeType};

/// Slot of a node in the tree's arena
///
/// Ids stay valid for the lifetime of the tree, also across renames and deletes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node{}", self.0)
    }
}

#[derive(Debug)]
struct LinkGroupInner {
    id: u64,
    nlink: AtomicU32,
}

/// Counter shared by every alias of one hard-linked file
#[derive(Clone, Debug)]
pub struct LinkGroup(Arc<LinkGroupInner>);

impl LinkGroup {
    pub(crate) fn new(id: u64) -> Self {
        Self(Arc::new(LinkGroupInner {
            id,
            nlink: AtomicU32::new(1),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn nlink(&self) -> u32 {
        self.0.nlink.load(Ordering::SeqCst)
    }

    pub(crate) fn increment(&self) {
        self.0.nlink.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn decrement(&self) {
        // Saturate at zero
        let _ = self
            .0
            .nlink
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn same_group(&self, other: &LinkGroup) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// What a node is; hard links carry the group they share with their aliases
#[derive(Clone, Debug)]
pub enum NodeKind {
    /// A regular file. The canonical record of a hard-linked file keeps this kind and
    /// carries the group.
    File { group: Option<LinkGroup> },
    Directory,
    Symlink { target: String },
    HardLink { group: LinkGroup },
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::File { .. } => NodeType::File,
            NodeKind::Directory => NodeType::Directory,
            NodeKind::Symlink { .. } => NodeType::Symlink,
            NodeKind::HardLink { .. } => NodeType::HardLink,
        }
    }

    pub fn link_group(&self) -> Option<&LinkGroup> {
        match self {
            NodeKind::File { group } => group.as_ref(),
            NodeKind::HardLink { group } => Some(group),
            NodeKind::Directory | NodeKind::Symlink { .. } => None,
        }
    }
}

/// Ordered set of merged half-open byte ranges
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ByteRanges(Vec<Range<u64>>);

impl ByteRanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, range: Range<u64>) {
        if range.is_empty() {
            return;
        }
        let mut merged = range;
        let mut kept = Vec::with_capacity(self.0.len() + 1);
        for existing in self.0.drain(..) {
            if existing.end < merged.start || existing.start > merged.end {
                kept.push(existing);
            } else {
                merged.start = merged.start.min(existing.start);
                merged.end = merged.end.max(existing.end);
            }
        }
        let at = kept.partition_point(|r| r.start < merged.start);
        kept.insert(at, merged);
        self.0 = kept;
    }

    /// Forget everything at or beyond `len`
    pub fn truncate(&mut self, len: u64) {
        self.0.retain(|r| r.start < len);
        if let Some(last) = self.0.last_mut() {
            last.end = last.end.min(len);
        }
    }

    pub fn contains(&self, offset: u64) -> bool {
        let idx = self.0.partition_point(|r| r.end <= offset);
        self.0.get(idx).is_some_and(|r| r.start <= offset)
    }

    pub fn end(&self) -> u64 {
        self.0.last().map(|r| r.end).unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Range<u64>> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Shadow record of one filesystem entry
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) id: NodeId,
    pub identity: Option<NodeHandle>,
    pub path: String,
    pub name: String,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub attrs: Option<Attributes>,
    pub written: ByteRanges,
    pub exists: bool,
    pub looked_up: bool,
    pub owned: bool,
}

impl Node {
    pub(crate) fn new(path: &str, kind: NodeKind) -> Self {
        let path = path::normalize(path);
        Self {
            id: NodeId(usize::MAX),
            identity: None,
            name: path::file_name(&path).to_string(),
            path,
            kind,
            parent: None,
            attrs: None,
            written: ByteRanges::new(),
            exists: true,
            looked_up: false,
            owned: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    pub fn link_group(&self) -> Option<&LinkGroup> {
        self.kind.link_group()
    }

    pub fn symlink_target(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Symlink { target } => Some(target),
            _ => None,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory)
    }

    pub fn is_root(&self) -> bool {
        self.path == path::ROOT
    }

    pub(crate) fn set_path(&mut self, new_path: String) {
        self.name = path::file_name(&new_path).to_string();
        self.path = new_path;
    }

    /// Live handle, if the node is currently looked up
    pub fn live_handle(&self) -> Option<NodeHandle> {
        if self.looked_up {
            self.identity
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_ranges_merge_overlapping_and_adjacent() {
        let mut ranges = ByteRanges::new();
        ranges.insert(10..20);
        ranges.insert(0..5);
        ranges.insert(20..25);
        ranges.insert(3..11);
        let collected: Vec<_> = ranges.iter().cloned().collect();
        assert_eq!(collected, vec![0..25]);
    }

    #[test]
    fn byte_ranges_keep_gaps_and_truncate() {
        let mut ranges = ByteRanges::new();
        ranges.insert(0..4);
        ranges.insert(8..16);
        assert!(ranges.contains(3));
        assert!(!ranges.contains(4));
        assert!(ranges.contains(8));
        ranges.truncate(10);
        assert_eq!(ranges.end(), 10);
        ranges.truncate(2);
        let collected: Vec<_> = ranges.iter().cloned().collect();
        assert_eq!(collected, vec![0..2]);
    }

    #[test]
    fn link_group_decrement_saturates() {
        let group = LinkGroup::new(7);
        group.decrement();
        group.decrement();
        assert_eq!(group.nlink(), 0);
        let alias = group.clone();
        alias.increment();
        assert_eq!(group.nlink(), 1);
        assert!(group.same_group(&alias));
        assert!(!group.same_group(&LinkGroup::new(7)));
    }
}
