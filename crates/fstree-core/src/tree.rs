// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The shadow tree and its read-side node operations
//!
//! [`FsTree`] bundles the operation table, the configuration and the locked
//! [`PathIndex`]. Every operation calls into the table first and touches the index
//! only when the call succeeded. Table calls are made without holding the index lock,
//! except for the reclaim that accompanies tombstoning.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::TreeConfig;
use crate::content::{pattern_bytes, PatternReport};
use crate::error::{Errno, FsResult, Status, TreeError, TreeResult};
use crate::index::PathIndex;
use crate::node::{Node, NodeId, NodeKind};
use crate::ops::FsOps;
use crate::path;
use crate::types::{Attributes, DirEntry, DirEntryAttr, FileType, NodeHandle, SetAttrs};

const VERIFY_CHUNK: usize = 64 * 1024;

/// Node touched by an operation plus the raw status of the filesystem call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub node: Option<NodeId>,
    pub status: Status,
}

impl Outcome {
    pub(crate) fn ok(node: NodeId) -> Self {
        Self {
            node: Some(node),
            status: Ok(()),
        }
    }

    pub(crate) fn failed(node: Option<NodeId>, errno: Errno) -> Self {
        Self {
            node,
            status: Err(errno),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    /// 0 on success, the errno otherwise
    pub fn code(&self) -> i32 {
        crate::error::status_code(&self.status)
    }

    pub fn errno(&self) -> Option<Errno> {
        self.status.err()
    }
}

/// Summary of [`FsTree::purge_owned`]
#[derive(Clone, Debug, Default, Serialize)]
pub struct PurgeReport {
    pub deleted: usize,
    pub failed: Vec<(String, i32)>,
}

/// Shadow model of one mounted filesystem
pub struct FsTree {
    ops: Arc<dyn FsOps>,
    config: TreeConfig,
    index: Mutex<PathIndex>,
    root: NodeId,
}

impl FsTree {
    pub fn new(ops: Arc<dyn FsOps>, config: TreeConfig) -> Self {
        let mut index = PathIndex::new(config.case_sensitivity);
        let handle = ops.root();
        let mut root = Node::new(path::ROOT, NodeKind::Directory);
        root.identity = Some(handle);
        root.looked_up = true;
        root.attrs = match ops.getattr(handle) {
            Ok(attrs) => Some(attrs),
            Err(errno) => {
                warn!("getattr on root failed: {}", errno);
                None
            }
        };
        let root = index.upsert(root);
        Self {
            ops,
            config,
            index: Mutex::new(index),
            root,
        }
    }

    pub(crate) fn index(&self) -> MutexGuard<'_, PathIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn ops(&self) -> &Arc<dyn FsOps> {
        &self.ops
    }

    /// Snapshot of a node
    pub fn node(&self, id: NodeId) -> Option<Node> {
        self.index().get(id).cloned()
    }

    pub(crate) fn snapshot(&self, id: NodeId) -> TreeResult<Node> {
        self.node(id).ok_or(TreeError::UnknownNode(id))
    }

    /// Snapshot of the existing node at `path`
    pub fn find(&self, path: &str) -> Option<Node> {
        let index = self.index();
        index.find_existing(path).and_then(|id| index.get(id).cloned())
    }

    pub fn find_id(&self, path: &str) -> Option<NodeId> {
        self.index().find_existing(path)
    }

    /// Snapshots of every existing node, in insertion order
    pub fn existing_nodes(&self) -> Vec<Node> {
        self.index().iter_existing().cloned().collect()
    }

    /// Drop tombstones from the path index
    pub fn prune(&self) -> usize {
        let pruned = self.index().prune();
        debug!("pruned {} tombstones", pruned);
        pruned
    }

    /// Live handle for `id`, looking the node up when it holds none
    pub(crate) fn ensure_handle(&self, id: NodeId) -> TreeResult<FsResult<NodeHandle>> {
        let node = self.snapshot(id)?;
        if !node.exists {
            return Ok(Err(Errno::ENOENT));
        }
        if let Some(handle) = node.live_handle() {
            return Ok(Ok(handle));
        }
        let outcome = self.lookup(&node.path)?;
        if let Err(errno) = outcome.status {
            return Ok(Err(errno));
        }
        let handle = outcome
            .node
            .and_then(|id| self.index().get(id).and_then(Node::live_handle));
        Ok(handle.ok_or(Errno::ENOENT))
    }

    /// Look up an absolute path
    pub fn lookup(&self, path: &str) -> TreeResult<Outcome> {
        self.lookup_in(None, path, None)
    }

    /// Look up `rel` below `parent` (root when `None`)
    ///
    /// Intermediate directories are resolved one by one. A node that is already looked
    /// up is returned as is; passing `handle` skips the filesystem lookup and installs
    /// that handle as the node's identity.
    pub fn lookup_in(
        &self,
        parent: Option<NodeId>,
        rel: &str,
        handle: Option<NodeHandle>,
    ) -> TreeResult<Outcome> {
        let base = match parent {
            Some(id) => self.snapshot(id)?.path,
            None => path::ROOT.to_string(),
        };
        let full = path::join(&base, rel);
        if full == path::ROOT {
            return Ok(Outcome::ok(self.root));
        }

        {
            let mut index = self.index();
            if let Some(id) = index.find_existing(&full) {
                if let Some(node) = index.get_mut(id) {
                    if node.looked_up {
                        match handle {
                            None => return Ok(Outcome::ok(id)),
                            Some(handle) => {
                                node.identity = Some(handle);
                                return Ok(Outcome::ok(id));
                            }
                        }
                    }
                }
            }
        }

        let parent_path = path::parent(&full).unwrap_or(path::ROOT);
        let name = path::file_name(&full).to_string();
        let parent_outcome = self.lookup_in(None, parent_path, None)?;
        let Some(parent_id) = parent_outcome.node.filter(|_| parent_outcome.is_ok()) else {
            return Ok(Outcome {
                node: None,
                status: parent_outcome.status,
            });
        };
        let parent_handle = match self.ensure_handle(parent_id)? {
            Ok(h) => h,
            Err(errno) => return Ok(Outcome::failed(None, errno)),
        };

        let (handle, fresh_reference) = match handle {
            Some(h) => (h, false),
            None => match self.ops.lookup(parent_handle, &name) {
                Ok(h) => (h, true),
                Err(errno) => {
                    debug!("lookup {} failed: {}", full, errno);
                    return Ok(Outcome::failed(None, errno));
                }
            },
        };

        let attrs = match self.ops.getattr(handle) {
            Ok(attrs) => attrs,
            Err(errno) => {
                if fresh_reference {
                    let _ = self.ops.reclaim(handle);
                }
                return Ok(Outcome::failed(None, errno));
            }
        };

        let link_target = if attrs.file_type == FileType::Symlink {
            self.ops
                .readlink(handle, self.config.readlink_buffer)
                .map(|(target, _)| target)
                .ok()
        } else {
            None
        };

        let mut index = self.index();
        let resident = index
            .find_existing(&full)
            .and_then(|id| index.get(id))
            .cloned();

        if let Some(resident) = &resident {
            if fresh_reference && resident.looked_up && resident.identity == Some(handle) {
                // Raced with another lookup of the same path; keep theirs
                let _ = self.ops.reclaim(handle);
                return Ok(Outcome::ok(resident.id()));
            }
        }

        let same_object = resident
            .as_ref()
            .filter(|r| r.identity == Some(handle) || r.identity.is_none());
        let kind = classify(&attrs, link_target, same_object.map(|r| &r.kind));

        let mut node = Node::new(&full, kind);
        node.identity = Some(handle);
        node.looked_up = true;
        node.parent = Some(parent_id);
        node.attrs = Some(attrs);
        if let Some(resident) = same_object {
            node.written = resident.written.clone();
            node.owned = resident.owned;
        }
        let id = index.upsert(node);
        debug!("looked up {} as {}", full, handle);
        Ok(Outcome::ok(id))
    }

    /// Give back the node's lookup reference; a no-op for nodes that hold none
    pub fn reclaim(&self, id: NodeId) -> TreeResult<Outcome> {
        let mut index = self.index();
        if index.get(id).is_none() {
            return Err(TreeError::UnknownNode(id));
        }
        let status = index.reclaim(id, self.ops.as_ref());
        Ok(Outcome { node: Some(id), status })
    }

    /// Reclaim every node still holding a handle, tombstones included
    pub fn reclaim_all(&self) -> usize {
        let mut index = self.index();
        let mut released = 0;
        for id in index.held_handles() {
            if index.reclaim(id, self.ops.as_ref()).is_ok() {
                released += 1;
            }
        }
        released
    }

    pub fn getattr(&self, id: NodeId) -> TreeResult<FsResult<Attributes>> {
        let handle = match self.ensure_handle(id)? {
            Ok(h) => h,
            Err(errno) => return Ok(Err(errno)),
        };
        let attrs = match self.ops.getattr(handle) {
            Ok(attrs) => attrs,
            Err(errno) => return Ok(Err(errno)),
        };
        if let Some(node) = self.index().get_mut(id) {
            node.attrs = Some(attrs.clone());
        }
        Ok(Ok(attrs))
    }

    pub fn setattr(&self, id: NodeId, changes: &SetAttrs) -> TreeResult<FsResult<Attributes>> {
        let handle = match self.ensure_handle(id)? {
            Ok(h) => h,
            Err(errno) => return Ok(Err(errno)),
        };
        let attrs = match self.ops.setattr(handle, changes) {
            Ok(attrs) => attrs,
            Err(errno) => return Ok(Err(errno)),
        };
        let mut index = self.index();
        if let Some(len) = changes.size {
            for alias in index.ids_with_identity(handle) {
                if let Some(node) = index.get_mut(alias) {
                    node.written.truncate(len);
                }
            }
        }
        if let Some(node) = index.get_mut(id) {
            node.attrs = Some(attrs.clone());
        }
        Ok(Ok(attrs))
    }

    pub fn read(&self, id: NodeId, offset: u64, len: usize) -> TreeResult<FsResult<Vec<u8>>> {
        let handle = match self.ensure_handle(id)? {
            Ok(h) => h,
            Err(errno) => return Ok(Err(errno)),
        };
        Ok(self.ops.read(handle, offset, len))
    }

    /// Write `data` and remember the range that landed, on every link to the file
    pub fn write(&self, id: NodeId, offset: u64, data: &[u8]) -> TreeResult<FsResult<usize>> {
        let handle = match self.ensure_handle(id)? {
            Ok(h) => h,
            Err(errno) => return Ok(Err(errno)),
        };
        let written = match self.ops.write(handle, offset, data) {
            Ok(n) => n,
            Err(errno) => return Ok(Err(errno)),
        };
        let mut index = self.index();
        for alias in index.ids_with_identity(handle) {
            if let Some(node) = index.get_mut(alias) {
                node.written.insert(offset..offset + written as u64);
            }
        }
        Ok(Ok(written))
    }

    pub fn write_pattern(
        &self,
        id: NodeId,
        offset: u64,
        len: usize,
    ) -> TreeResult<FsResult<usize>> {
        self.write(id, offset, &pattern_bytes(offset, len))
    }

    /// Read the whole file back: written ranges must hold the pattern, the rest zeroes
    pub fn verify_pattern(&self, id: NodeId) -> TreeResult<FsResult<PatternReport>> {
        let size = match self.getattr(id)? {
            Ok(attrs) => attrs.size,
            Err(errno) => return Ok(Err(errno)),
        };
        let written = self.snapshot(id)?.written;
        let mut report = PatternReport::default();
        let mut offset = 0u64;
        while offset < size {
            let want = VERIFY_CHUNK.min((size - offset) as usize);
            let chunk = match self.read(id, offset, want)? {
                Ok(chunk) => chunk,
                Err(errno) => return Ok(Err(errno)),
            };
            if chunk.is_empty() {
                break;
            }
            let expected = pattern_bytes(offset, chunk.len());
            for (i, (&got, &pattern)) in chunk.iter().zip(expected.iter()).enumerate() {
                let at = offset + i as u64;
                let expected_byte = if written.contains(at) { pattern } else { 0 };
                if got != expected_byte {
                    report.record_mismatch(at);
                }
            }
            report.checked_bytes += chunk.len() as u64;
            offset += chunk.len() as u64;
        }
        if report.checked_bytes < written.end().min(size) {
            report.record_mismatch(report.checked_bytes);
        }
        Ok(Ok(report))
    }

    /// All entries of a directory, following cookies until the listing is exhausted
    pub fn readdir(&self, id: NodeId) -> TreeResult<FsResult<Vec<DirEntry>>> {
        let handle = match self.ensure_handle(id)? {
            Ok(h) => h,
            Err(errno) => return Ok(Err(errno)),
        };
        let mut entries = Vec::new();
        let mut cookie = 0;
        loop {
            let page = match self.ops.readdir(handle, cookie, self.config.readdir_buffer) {
                Ok(page) => page,
                Err(errno) => return Ok(Err(errno)),
            };
            entries.extend(page.entries);
            match page.next_cookie {
                Some(next) => cookie = next,
                None => break,
            }
        }
        Ok(Ok(entries))
    }

    pub fn readdirattr(&self, id: NodeId) -> TreeResult<FsResult<Vec<DirEntryAttr>>> {
        let handle = match self.ensure_handle(id)? {
            Ok(h) => h,
            Err(errno) => return Ok(Err(errno)),
        };
        let mut entries = Vec::new();
        let mut cookie = 0;
        loop {
            let page = match self.ops.readdirattr(handle, cookie, self.config.readdir_buffer) {
                Ok(page) => page,
                Err(errno) => return Ok(Err(errno)),
            };
            entries.extend(page.entries);
            match page.next_cookie {
                Some(next) => cookie = next,
                None => break,
            }
        }
        Ok(Ok(entries))
    }

    pub fn readlink(&self, id: NodeId) -> TreeResult<FsResult<String>> {
        let handle = match self.ensure_handle(id)? {
            Ok(h) => h,
            Err(errno) => return Ok(Err(errno)),
        };
        let (target, attrs) = match self.ops.readlink(handle, self.config.readlink_buffer) {
            Ok(found) => found,
            Err(errno) => return Ok(Err(errno)),
        };
        if let Some(node) = self.index().get_mut(id) {
            node.attrs = Some(attrs);
        }
        Ok(Ok(target))
    }

    pub fn sync(&self, id: NodeId) -> TreeResult<Status> {
        let handle = match self.ensure_handle(id)? {
            Ok(h) => h,
            Err(errno) => return Ok(Err(errno)),
        };
        Ok(self.ops.sync(handle))
    }

    /// Delete every existing node created through this tree, deepest first
    pub fn purge_owned(&self) -> TreeResult<PurgeReport> {
        let mut owned: Vec<(usize, NodeId, String)> = self
            .index()
            .iter_existing()
            .filter(|n| n.owned && !n.is_root())
            .map(|n| (path::depth(&n.path), n.id(), n.path.clone()))
            .collect();
        owned.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.2.cmp(&b.2)));

        let mut report = PurgeReport::default();
        for (_, id, path) in owned {
            if !self.snapshot(id)?.exists {
                continue;
            }
            let outcome = self.delete(crate::mutate::DeleteRequest::node(id).force())?;
            match outcome.status {
                Ok(()) => report.deleted += 1,
                Err(errno) => report.failed.push((path, errno.code())),
            }
        }
        Ok(report)
    }
}

/// Node kind for freshly fetched attributes
///
/// A regular file keeps the link-group bookkeeping of the record it replaces, so a
/// re-lookup never forgets that it is a hard link.
fn classify(
    attrs: &Attributes,
    link_target: Option<String>,
    previous: Option<&NodeKind>,
) -> NodeKind {
    match attrs.file_type {
        FileType::Directory => NodeKind::Directory,
        FileType::Symlink => {
            let target = link_target
                .or_else(|| match previous {
                    Some(NodeKind::Symlink { target }) => Some(target.clone()),
                    _ => None,
                })
                .unwrap_or_default();
            NodeKind::Symlink { target }
        }
        FileType::Regular => match previous {
            Some(kind @ (NodeKind::File { .. } | NodeKind::HardLink { .. })) => kind.clone(),
            _ => NodeKind::File { group: None },
        },
    }
}
