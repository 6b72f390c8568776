// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Structural node operations: create, delete, rename

use tracing::{debug, warn};

use crate::error::{Errno, FsResult, Status, TreeError, TreeResult};
use crate::index::PathIndex;
use crate::node::{ByteRanges, LinkGroup, Node, NodeId, NodeKind};
use crate::path;
use crate::tree::{FsTree, Outcome};
use crate::types::{Attributes, NodeHandle, NodeType, SetAttrs};

/// Arguments of [`FsTree::create`]
#[derive(Clone, Debug)]
pub struct CreateRequest {
    pub node_type: NodeType,
    pub name: String,
    /// Containing directory, root when `None`
    pub parent: Option<NodeId>,
    pub attrs: SetAttrs,
    pub symlink_target: Option<String>,
    /// Existing node to link to, required for [`NodeType::HardLink`]
    pub link_source: Option<NodeId>,
}

impl CreateRequest {
    pub fn new(node_type: NodeType, name: impl Into<String>) -> Self {
        Self {
            node_type,
            name: name.into(),
            parent: None,
            attrs: SetAttrs::default(),
            symlink_target: None,
            link_source: None,
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self::new(NodeType::File, name)
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(NodeType::Directory, name)
    }

    pub fn symlink(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            symlink_target: Some(target.into()),
            ..Self::new(NodeType::Symlink, name)
        }
    }

    pub fn hardlink(name: impl Into<String>, source: NodeId) -> Self {
        Self {
            link_source: Some(source),
            ..Self::new(NodeType::HardLink, name)
        }
    }

    pub fn in_dir(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_attrs(mut self, attrs: SetAttrs) -> Self {
        self.attrs = attrs;
        self
    }
}

#[derive(Clone, Debug)]
pub enum DeleteTarget {
    Node(NodeId),
    Named {
        node_type: NodeType,
        name: String,
        parent: Option<NodeId>,
    },
}

/// Arguments of [`FsTree::delete`]
#[derive(Clone, Debug)]
pub struct DeleteRequest {
    pub target: DeleteTarget,
    /// Clear the read-only bit first if it is set
    pub force: bool,
}

impl DeleteRequest {
    pub fn node(id: NodeId) -> Self {
        Self {
            target: DeleteTarget::Node(id),
            force: false,
        }
    }

    pub fn named(node_type: NodeType, name: impl Into<String>) -> Self {
        Self {
            target: DeleteTarget::Named {
                node_type,
                name: name.into(),
                parent: None,
            },
            force: false,
        }
    }

    /// Containing directory of a named target; ignored for node targets
    pub fn in_dir(mut self, dir: NodeId) -> Self {
        if let DeleteTarget::Named { parent, .. } = &mut self.target {
            *parent = Some(dir);
        }
        self
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Arguments of [`FsTree::rename`]
///
/// Passing explicit source or target nodes hands their live handles to the filesystem
/// alongside the names. With `reclaim_target` unset, a displaced target keeps its lookup
/// reference and the caller is responsible for it.
#[derive(Clone, Debug)]
pub struct RenameRequest {
    pub source_name: String,
    pub source_node: Option<NodeId>,
    pub source_dir: Option<NodeId>,
    pub target_name: Option<String>,
    pub target_node: Option<NodeId>,
    pub target_dir: Option<NodeId>,
    pub reclaim_target: bool,
}

impl RenameRequest {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            source_node: None,
            source_dir: None,
            target_name: None,
            target_node: None,
            target_dir: None,
            reclaim_target: true,
        }
    }

    pub fn from_dir(mut self, dir: NodeId) -> Self {
        self.source_dir = Some(dir);
        self
    }

    pub fn to_dir(mut self, dir: NodeId) -> Self {
        self.target_dir = Some(dir);
        self
    }

    pub fn to_name(mut self, name: impl Into<String>) -> Self {
        self.target_name = Some(name.into());
        self
    }

    pub fn with_source_node(mut self, node: NodeId) -> Self {
        self.source_node = Some(node);
        self
    }

    pub fn with_target_node(mut self, node: NodeId) -> Self {
        self.target_node = Some(node);
        self
    }

    pub fn keep_target_handle(mut self) -> Self {
        self.reclaim_target = false;
        self
    }
}

/// New hard link as seen right after the filesystem made it
struct LinkedAlias {
    handle: NodeHandle,
    /// Whether `handle` carries a lookup reference of its own
    looked_up: bool,
    attrs: Attributes,
}

/// Source state that the filesystem cannot tell us again after a rename
struct Preserved {
    kind: NodeKind,
    written: ByteRanges,
    owned: bool,
}

fn validate_name(name: &str) -> TreeResult<()> {
    if name.is_empty() || name.contains('/') {
        return Err(TreeError::InvalidArgument(format!(
            "{name:?} is not a single path component"
        )));
    }
    Ok(())
}

/// Whether `preserved` may replace `fresh` on the node that replaces a renamed source
fn kinds_compatible(fresh: &NodeKind, preserved: &NodeKind) -> bool {
    matches!(
        (fresh, preserved),
        (NodeKind::Directory, NodeKind::Directory)
            | (NodeKind::Symlink { .. }, NodeKind::Symlink { .. })
            | (
                NodeKind::File { .. } | NodeKind::HardLink { .. },
                NodeKind::File { .. } | NodeKind::HardLink { .. }
            )
    )
}

/// Put `source` into a link group, creating one on first link, and count one more alias
fn join_link_group(index: &mut PathIndex, source: NodeId) -> LinkGroup {
    let existing = index.get(source).and_then(|n| n.link_group().cloned());
    let group = match existing {
        Some(group) => group,
        None => {
            let group = index.new_link_group();
            if let Some(node) = index.get_mut(source) {
                node.kind = NodeKind::File {
                    group: Some(group.clone()),
                };
            }
            group
        }
    };
    group.increment();
    group
}

impl FsTree {
    /// Create a file, directory, symlink or hard link
    ///
    /// Filesystem failures come back in the outcome's status. Caller mistakes and a
    /// hard link that resolves to a different identity than its source are errors.
    pub fn create(&self, req: CreateRequest) -> TreeResult<Outcome> {
        validate_name(&req.name)?;
        let parent_id = req.parent.unwrap_or(self.root());
        let parent = self.snapshot(parent_id)?;
        let full = path::join(&parent.path, &req.name);

        let source = match req.node_type {
            NodeType::HardLink => {
                let source_id = req.link_source.ok_or_else(|| {
                    TreeError::InvalidArgument(format!("hardlink {full} needs a source node"))
                })?;
                let source = self.snapshot(source_id)?;
                let linkable = matches!(source.node_type(), NodeType::File | NodeType::HardLink);
                if !source.exists || !linkable {
                    return Err(TreeError::InvalidArgument(format!(
                        "hardlink source {} is not an existing regular file",
                        source.path
                    )));
                }
                Some(source)
            }
            _ => None,
        };
        let target = match req.node_type {
            NodeType::Symlink => Some(req.symlink_target.clone().ok_or_else(|| {
                TreeError::InvalidArgument(format!("symlink {full} needs a target"))
            })?),
            _ => None,
        };

        let dir = match self.ensure_handle(parent_id)? {
            Ok(h) => h,
            Err(errno) => return Ok(Outcome::failed(None, errno)),
        };

        let mut source_attrs = None;
        let mut holds_reference = true;
        let created = match (req.node_type, &source, &target) {
            (NodeType::File, _, _) => self.ops().create(dir, &req.name, &req.attrs),
            (NodeType::Directory, _, _) => self.ops().mkdir(dir, &req.name, &req.attrs),
            (NodeType::Symlink, _, Some(target)) => {
                self.ops().symlink(dir, &req.name, target, &req.attrs)
            }
            (NodeType::HardLink, Some(source), _) => {
                match self.hardlink_to(source, dir, &req.name, &full)? {
                    Ok(alias) => {
                        source_attrs = Some(alias.attrs);
                        holds_reference = alias.looked_up;
                        Ok(alias.handle)
                    }
                    Err(errno) => Err(errno),
                }
            }
            (NodeType::Symlink | NodeType::HardLink, _, _) => Err(Errno::EINVAL),
        };
        let handle = match created {
            Ok(handle) => handle,
            Err(errno) => {
                debug!("create {} {} failed: {}", req.node_type.label(), full, errno);
                return Ok(Outcome::failed(None, errno));
            }
        };

        let attrs = match self.ops().getattr(handle) {
            Ok(attrs) => Some(attrs),
            Err(errno) => {
                warn!("getattr after creating {} failed: {}", full, errno);
                None
            }
        };

        let mut index = self.index();
        if index.find_existing(&full).is_some() {
            if holds_reference {
                let _ = self.ops().reclaim(handle);
            }
            return Err(TreeError::DuplicatePath(full));
        }
        let kind = match (req.node_type, &source) {
            (NodeType::File, _) => NodeKind::File { group: None },
            (NodeType::Directory, _) => NodeKind::Directory,
            (NodeType::Symlink, _) => NodeKind::Symlink {
                target: target.unwrap_or_default(),
            },
            (NodeType::HardLink, Some(source)) => {
                let group = join_link_group(&mut index, source.id());
                if let Some(node) = index.get_mut(source.id()) {
                    node.attrs = source_attrs;
                }
                NodeKind::HardLink { group }
            }
            (NodeType::HardLink, None) => NodeKind::File { group: None },
        };

        let mut node = Node::new(&full, kind);
        node.identity = Some(handle);
        node.looked_up = holds_reference;
        node.owned = true;
        node.parent = Some(parent_id);
        node.attrs = attrs;
        if let Some(source) = source.as_ref().and_then(|s| index.get(s.id())) {
            node.written = source.written.clone();
        }
        let id = index.upsert(node);
        debug!("created {} {} as {}", req.node_type.label(), full, handle);
        Ok(Outcome::ok(id))
    }

    fn hardlink_to(
        &self,
        source: &Node,
        dir: NodeHandle,
        name: &str,
        full: &str,
    ) -> TreeResult<FsResult<LinkedAlias>> {
        let source_handle = match self.ensure_handle(source.id())? {
            Ok(h) => h,
            Err(errno) => return Ok(Err(errno)),
        };
        let attrs = match self.ops().hardlink(source_handle, dir, name) {
            Ok(attrs) => attrs,
            Err(errno) => return Ok(Err(errno)),
        };
        let handle = match self.ops().lookup(dir, name) {
            Ok(handle) => handle,
            Err(errno) => {
                // The link exists; track it under the source's identity without a reference
                warn!("hardlink {} created but lookup failed: {}", full, errno);
                return Ok(Ok(LinkedAlias {
                    handle: source_handle,
                    looked_up: false,
                    attrs,
                }));
            }
        };
        if handle != source_handle {
            let _ = self.ops().reclaim(handle);
            return Err(TreeError::HardlinkMismatch {
                path: full.to_string(),
                expected: source_handle,
                actual: handle,
            });
        }
        Ok(Ok(LinkedAlias {
            handle,
            looked_up: true,
            attrs,
        }))
    }

    /// Remove a file, symlink, hard link or empty directory
    pub fn delete(&self, req: DeleteRequest) -> TreeResult<Outcome> {
        let (full, node_type, resident) = match &req.target {
            DeleteTarget::Node(id) => {
                let node = self.snapshot(*id)?;
                if !node.exists {
                    return Ok(Outcome::failed(Some(*id), Errno::ENOENT));
                }
                (node.path.clone(), node.node_type(), Some(*id))
            }
            DeleteTarget::Named {
                node_type,
                name,
                parent,
            } => {
                validate_name(name)?;
                let base = match parent {
                    Some(p) => self.snapshot(*p)?.path,
                    None => path::ROOT.to_string(),
                };
                let full = path::join(&base, name);
                let resident = self.find_id(&full);
                (full, *node_type, resident)
            }
        };
        if full == path::ROOT {
            return Err(TreeError::RootRemoval);
        }

        let parent_path = path::parent(&full).unwrap_or(path::ROOT).to_string();
        let name = path::file_name(&full).to_string();
        let parent = self.lookup(&parent_path)?;
        let Some(parent_id) = parent.node.filter(|_| parent.is_ok()) else {
            return Ok(Outcome {
                node: resident,
                status: parent.status,
            });
        };
        let dir = match self.ensure_handle(parent_id)? {
            Ok(h) => h,
            Err(errno) => return Ok(Outcome::failed(resident, errno)),
        };

        if req.force {
            if let Err(errno) = self.clear_read_only(&full)? {
                debug!("clearing read-only on {} failed: {}", full, errno);
                return Ok(Outcome::failed(resident, errno));
            }
        }

        let removed = match node_type {
            NodeType::Directory => self.ops().rmdir(dir, &name),
            NodeType::File | NodeType::Symlink | NodeType::HardLink => {
                self.ops().remove(dir, &name)
            }
        };
        if let Err(errno) = removed {
            debug!("delete {} failed: {}", full, errno);
            return Ok(Outcome::failed(resident, errno));
        }

        let mut index = self.index();
        let id = index.find_existing(&full).or(resident);
        if let Some(id) = id {
            if let Some(group) = index.get(id).and_then(|n| n.link_group().cloned()) {
                group.decrement();
            }
            index.mark_not_existing(id, true, self.ops().as_ref());
        }
        debug!("deleted {}", full);
        Ok(Outcome {
            node: id,
            status: Ok(()),
        })
    }

    fn clear_read_only(&self, full: &str) -> TreeResult<Status> {
        let outcome = self.lookup(full)?;
        let Some(id) = outcome.node.filter(|_| outcome.is_ok()) else {
            return Ok(outcome.status);
        };
        let attrs = match self.getattr(id)? {
            Ok(attrs) => attrs,
            Err(errno) => return Ok(Err(errno)),
        };
        if !attrs.is_read_only() {
            return Ok(Ok(()));
        }
        Ok(self.setattr(id, &SetAttrs::mode(attrs.mode | 0o200))?.map(|_| ()))
    }

    /// Rename an entry, moving a whole subtree when it is a directory
    ///
    /// A target inside the source's own subtree is refused with `EACCES` before the
    /// filesystem is asked.
    pub fn rename(&self, req: RenameRequest) -> TreeResult<Outcome> {
        validate_name(&req.source_name)?;
        let target_name = req
            .target_name
            .clone()
            .unwrap_or_else(|| req.source_name.clone());
        validate_name(&target_name)?;

        let source_dir = req.source_dir.unwrap_or(self.root());
        let target_dir = req.target_dir.unwrap_or(self.root());
        let source_path = path::join(&self.snapshot(source_dir)?.path, &req.source_name);
        let target_path = path::join(&self.snapshot(target_dir)?.path, &target_name);
        let source_id = req.source_node.or_else(|| self.find_id(&source_path));

        if path::is_descendant(&target_path, &source_path, self.config().case_sensitivity) {
            debug!("refusing to move {} below itself ({})", source_path, target_path);
            return Ok(Outcome::failed(source_id, Errno::EACCES));
        }

        let from_dir = match self.ensure_handle(source_dir)? {
            Ok(h) => h,
            Err(errno) => return Ok(Outcome::failed(source_id, errno)),
        };
        let to_dir = match self.ensure_handle(target_dir)? {
            Ok(h) => h,
            Err(errno) => return Ok(Outcome::failed(source_id, errno)),
        };
        let from_handle = match req.source_node {
            Some(id) => match self.ensure_handle(id)? {
                Ok(h) => Some(h),
                Err(errno) => return Ok(Outcome::failed(source_id, errno)),
            },
            None => None,
        };
        let to_handle = match req.target_node {
            Some(id) => match self.ensure_handle(id)? {
                Ok(h) => Some(h),
                Err(errno) => return Ok(Outcome::failed(source_id, errno)),
            },
            None => None,
        };

        let source_node = source_id.and_then(|id| self.node(id)).filter(|n| n.exists);
        let preserved = source_node.as_ref().map(|n| Preserved {
            kind: n.kind.clone(),
            written: n.written.clone(),
            owned: n.owned,
        });
        let displaced = self
            .find_id(&target_path)
            .filter(|id| Some(*id) != source_id);
        let same_file = match (&source_node, displaced.and_then(|id| self.node(id))) {
            (Some(source), Some(target)) => {
                source.identity.is_some() && source.identity == target.identity
            }
            _ => false,
        };

        if from_handle.is_none() {
            if let Some(id) = source_id {
                let _ = self.index().reclaim(id, self.ops().as_ref());
            }
        }

        let renamed = self.ops().rename(
            from_dir,
            from_handle,
            &req.source_name,
            to_dir,
            to_handle,
            &target_name,
        );
        if let Err(errno) = renamed {
            debug!("rename {} -> {} failed: {}", source_path, target_path, errno);
            self.restore_source(&source_path, source_id, from_handle.is_some())?;
            return Ok(Outcome::failed(source_id, errno));
        }
        if same_file {
            // Two links to one file: POSIX leaves both names in place
            self.restore_source(&source_path, source_id, from_handle.is_some())?;
            return Ok(Outcome {
                node: source_id,
                status: Ok(()),
            });
        }

        {
            let mut index = self.index();
            let ops = self.ops().as_ref();
            if let Some(id) = source_id {
                index.mark_not_existing(id, false, ops);
                if let Some(node) = index.get_mut(id) {
                    node.looked_up = false;
                }
            }
            if let Some(target) = displaced {
                if let Some(group) = index.get(target).and_then(|n| n.link_group().cloned()) {
                    group.decrement();
                }
                if req.reclaim_target {
                    let _ = index.reclaim(target, ops);
                }
                index.mark_not_existing(target, false, ops);
                index.unmap(target);
            }
            for child in index.descendants(&source_path) {
                let Some(old_path) = index.get(child).map(|n| n.path.clone()) else {
                    continue;
                };
                index.rekey(child, &path::rebase(&old_path, &source_path, &target_path));
            }
        }

        let outcome = self.lookup_in(None, &target_path, from_handle)?;
        let new_id = match outcome.node.filter(|_| outcome.is_ok()) {
            Some(id) => id,
            None => {
                let Some(source) = source_node.as_ref() else {
                    warn!(
                        "rename {} -> {} succeeded but the target could not be looked up",
                        source_path, target_path
                    );
                    return Ok(outcome);
                };
                warn!(
                    "rename {} -> {} succeeded but lookup failed ({:?}); placing the source there",
                    source_path,
                    target_path,
                    outcome.errno()
                );
                let mut node = Node::new(&target_path, source.kind.clone());
                node.identity = from_handle.or(source.identity);
                node.looked_up = from_handle.is_some();
                node.parent = Some(target_dir);
                node.attrs = source.attrs.clone();
                self.index().upsert(node)
            }
        };

        let mut index = self.index();
        if let Some(old_id) = source_id.filter(|old| *old != new_id) {
            for id in index.ids_existing() {
                if let Some(node) = index.get_mut(id) {
                    if node.parent == Some(old_id) {
                        node.parent = Some(new_id);
                    }
                }
            }
        }
        if let (Some(preserved), Some(node)) = (preserved, index.get_mut(new_id)) {
            if kinds_compatible(&node.kind, &preserved.kind) {
                node.kind = preserved.kind;
            }
            node.written = preserved.written;
            node.owned = preserved.owned;
        }
        debug!("renamed {} -> {}", source_path, target_path);
        Ok(Outcome::ok(new_id))
    }

    /// Re-derive the source after a rename that did not move it
    fn restore_source(
        &self,
        source_path: &str,
        source_id: Option<NodeId>,
        explicit_handle: bool,
    ) -> TreeResult<()> {
        let Some(id) = source_id else {
            return Ok(());
        };
        if explicit_handle {
            if let Some(node) = self.index().get_mut(id) {
                node.looked_up = node.identity.is_some();
            }
            return Ok(());
        }
        let outcome = self.lookup(source_path)?;
        if let Err(errno) = outcome.status {
            debug!("re-lookup of {} failed: {}", source_path, errno);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::TreeConfig;
    use crate::ops::MockFsOps;
    use crate::types::FileType;

    fn attrs(file_type: FileType, fileid: u64) -> Attributes {
        Attributes {
            file_type,
            mode: 0o755,
            size: 0,
            nlink: 1,
            uid: 0,
            gid: 0,
            fileid,
            mtime: 0,
        }
    }

    fn base_mock() -> MockFsOps {
        let mut ops = MockFsOps::new();
        ops.expect_root().return_const(NodeHandle(1));
        ops
    }

    #[test]
    fn rename_below_itself_never_reaches_the_filesystem() {
        let mut ops = base_mock();
        ops.expect_mkdir().times(1).returning(|_, _, _| Ok(NodeHandle(2)));
        ops.expect_getattr()
            .returning(|h| Ok(attrs(FileType::Directory, h.0)));
        ops.expect_rename().never();
        let tree = FsTree::new(Arc::new(ops), TreeConfig::default());

        let d = tree
            .create(CreateRequest::directory("d"))
            .expect("create")
            .node
            .expect("node");
        let outcome = tree
            .rename(RenameRequest::new("d").to_dir(d).to_name("sub"))
            .expect("rename");
        assert_eq!(outcome.errno(), Some(Errno::EACCES));
        assert_eq!(tree.find("/d").map(|n| n.id()), Some(d));
        assert!(tree.find("/d/sub").is_none());
    }

    #[test]
    fn hardlink_to_a_different_identity_is_a_hard_failure() {
        let mut ops = base_mock();
        ops.expect_create().returning(|_, _, _| Ok(NodeHandle(2)));
        ops.expect_getattr()
            .returning(|h| Ok(attrs(FileType::Regular, h.0)));
        ops.expect_hardlink()
            .returning(|_, _, _| Ok(attrs(FileType::Regular, 2)));
        ops.expect_lookup().returning(|_, _| Ok(NodeHandle(3)));
        ops.expect_reclaim()
            .withf(|h| *h == NodeHandle(3))
            .times(1)
            .returning(|_| Ok(()));
        let tree = FsTree::new(Arc::new(ops), TreeConfig::default());

        let f = tree
            .create(CreateRequest::file("f"))
            .expect("create")
            .node
            .expect("node");
        let err = tree
            .create(CreateRequest::hardlink("g", f))
            .expect_err("mismatch");
        assert!(matches!(err, TreeError::HardlinkMismatch { .. }), "{err}");
        assert!(tree.find("/g").is_none());
    }

    #[test]
    fn root_cannot_be_deleted() {
        let mut ops = base_mock();
        ops.expect_getattr()
            .returning(|h| Ok(attrs(FileType::Directory, h.0)));
        ops.expect_rmdir().never();
        let tree = FsTree::new(Arc::new(ops), TreeConfig::default());
        let err = tree
            .delete(DeleteRequest::node(tree.root()))
            .expect_err("root");
        assert!(matches!(err, TreeError::RootRemoval));
    }

    #[test]
    fn failed_rename_looks_the_source_up_again() {
        let mut ops = base_mock();
        ops.expect_create().times(1).returning(|_, _, _| Ok(NodeHandle(2)));
        ops.expect_getattr().returning(|h| {
            let file_type = if h.0 == 1 {
                FileType::Directory
            } else {
                FileType::Regular
            };
            Ok(attrs(file_type, h.0))
        });
        ops.expect_reclaim().times(1).returning(|_| Ok(()));
        ops.expect_rename()
            .times(1)
            .returning(|_, _, _, _, _, _| Err(Errno::EIO));
        ops.expect_lookup()
            .withf(|dir, name| *dir == NodeHandle(1) && name == "a")
            .times(1)
            .returning(|_, _| Ok(NodeHandle(2)));
        let tree = FsTree::new(Arc::new(ops), TreeConfig::default());

        let a = tree
            .create(CreateRequest::file("a"))
            .expect("create")
            .node
            .expect("node");
        let outcome = tree
            .rename(RenameRequest::new("a").to_name("b"))
            .expect("rename");
        assert_eq!(outcome.errno(), Some(Errno::EIO));
        let node = tree.find("/a").expect("source still modelled");
        assert_eq!(node.id(), a);
        assert!(node.looked_up);
        assert!(node.owned);
        assert!(tree.find("/b").is_none());
    }

    #[test]
    fn tombstoned_node_deletes_with_enoent() {
        let mut ops = base_mock();
        ops.expect_create().returning(|_, _, _| Ok(NodeHandle(2)));
        ops.expect_getattr().returning(|h| {
            let file_type = if h.0 == 1 {
                FileType::Directory
            } else {
                FileType::Regular
            };
            Ok(attrs(file_type, h.0))
        });
        ops.expect_remove().times(1).returning(|_, _| Ok(()));
        ops.expect_reclaim().times(1).returning(|_| Ok(()));
        let tree = FsTree::new(Arc::new(ops), TreeConfig::default());

        let a = tree
            .create(CreateRequest::file("a"))
            .expect("create")
            .node
            .expect("node");
        assert!(tree.delete(DeleteRequest::node(a)).expect("delete").is_ok());
        let again = tree.delete(DeleteRequest::node(a)).expect("delete");
        assert_eq!(again.errno(), Some(Errno::ENOENT));
    }

    #[test]
    fn names_with_separators_are_rejected() {
        let mut ops = base_mock();
        ops.expect_getattr()
            .returning(|h| Ok(attrs(FileType::Directory, h.0)));
        ops.expect_create().never();
        let tree = FsTree::new(Arc::new(ops), TreeConfig::default());
        assert!(matches!(
            tree.create(CreateRequest::file("a/b")),
            Err(TreeError::InvalidArgument(_))
        ));
        assert!(matches!(
            tree.create(CreateRequest::file("")),
            Err(TreeError::InvalidArgument(_))
        ));
    }
}
