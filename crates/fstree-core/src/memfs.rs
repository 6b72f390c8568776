// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory reference filesystem
//!
//! `MemFs` implements [`FsOps`] with POSIX-style semantics and counts lookup
//! references per inode, so a test can check that the model gave every handle back.
//! Inodes are freed once they have neither names nor lookup references.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::config::CaseSensitivity;
use crate::error::{Errno, FsResult};
use crate::fault::{FaultInjector, FaultOp};
use crate::ops::FsOps;
use crate::types::{
    Attributes, DirEntry, DirEntryAttr, DirPage, FileType, NodeHandle, SetAttrs,
};

const ROOT_INO: u64 = 1;
const NAME_MAX: usize = 255;
const DIRENT_COST: usize = 8;
const DIRENT_ATTR_COST: usize = 64;

#[derive(Debug)]
struct Slot {
    /// Name as created; the map key may be folded
    name: String,
    ino: u64,
}

#[derive(Debug)]
enum Content {
    File(Vec<u8>),
    Dir {
        entries: BTreeMap<String, Slot>,
        parent: u64,
    },
    Symlink(String),
}

#[derive(Debug)]
struct Inode {
    content: Content,
    mode: u32,
    uid: u32,
    gid: u32,
    nlink: u32,
    lookups: u64,
    mtime: i64,
}

impl Inode {
    fn file_type(&self) -> FileType {
        match self.content {
            Content::File(_) => FileType::Regular,
            Content::Dir { .. } => FileType::Directory,
            Content::Symlink(_) => FileType::Symlink,
        }
    }

    fn size(&self) -> u64 {
        match &self.content {
            Content::File(data) => data.len() as u64,
            Content::Dir { entries, .. } => (entries.len() as u64 + 2) * 32,
            Content::Symlink(target) => target.len() as u64,
        }
    }

    fn attrs(&self, ino: u64) -> Attributes {
        Attributes {
            file_type: self.file_type(),
            mode: self.mode,
            size: self.size(),
            nlink: self.nlink,
            uid: self.uid,
            gid: self.gid,
            fileid: ino,
            mtime: self.mtime,
        }
    }
}

#[derive(Debug)]
struct State {
    inodes: HashMap<u64, Inode>,
    next_ino: u64,
    clock: i64,
}

impl State {
    fn new() -> Self {
        let mut inodes = HashMap::new();
        inodes.insert(
            ROOT_INO,
            Inode {
                content: Content::Dir {
                    entries: BTreeMap::new(),
                    parent: ROOT_INO,
                },
                mode: 0o755,
                uid: 0,
                gid: 0,
                nlink: 2,
                lookups: 0,
                mtime: 0,
            },
        );
        Self {
            inodes,
            next_ino: ROOT_INO + 1,
            clock: 0,
        }
    }

    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }

    fn inode(&self, ino: u64) -> FsResult<&Inode> {
        self.inodes.get(&ino).ok_or(Errno::EBADF)
    }

    fn inode_mut(&mut self, ino: u64) -> FsResult<&mut Inode> {
        self.inodes.get_mut(&ino).ok_or(Errno::EBADF)
    }

    fn entries(&self, dir: u64) -> FsResult<&BTreeMap<String, Slot>> {
        match &self.inode(dir)?.content {
            Content::Dir { entries, .. } => Ok(entries),
            _ => Err(Errno::ENOTDIR),
        }
    }

    fn entries_mut(&mut self, dir: u64) -> FsResult<&mut BTreeMap<String, Slot>> {
        match &mut self.inode_mut(dir)?.content {
            Content::Dir { entries, .. } => Ok(entries),
            _ => Err(Errno::ENOTDIR),
        }
    }

    fn parent_of(&self, dir: u64) -> FsResult<u64> {
        match &self.inode(dir)?.content {
            Content::Dir { parent, .. } => Ok(*parent),
            _ => Err(Errno::ENOTDIR),
        }
    }

    fn child(&self, dir: u64, key: &str) -> FsResult<u64> {
        self.entries(dir)?
            .get(key)
            .map(|slot| slot.ino)
            .ok_or(Errno::ENOENT)
    }

    fn allocate(&mut self, content: Content, mode: u32, nlink: u32) -> u64 {
        let ino = self.next_ino;
        self.next_ino += 1;
        let mtime = self.tick();
        self.inodes.insert(
            ino,
            Inode {
                content,
                mode,
                uid: 0,
                gid: 0,
                nlink,
                lookups: 0,
                mtime,
            },
        );
        ino
    }

    fn free_if_unused(&mut self, ino: u64) {
        if ino == ROOT_INO {
            return;
        }
        if let Some(inode) = self.inodes.get(&ino) {
            if inode.nlink == 0 && inode.lookups == 0 {
                self.inodes.remove(&ino);
                trace!("freed inode {}", ino);
            }
        }
    }

    fn touch(&mut self, ino: u64) {
        let now = self.tick();
        if let Some(inode) = self.inodes.get_mut(&ino) {
            inode.mtime = now;
        }
    }

    fn is_ancestor(&self, ancestor: u64, mut dir: u64) -> FsResult<bool> {
        loop {
            if dir == ancestor {
                return Ok(true);
            }
            if dir == ROOT_INO {
                return Ok(false);
            }
            dir = self.parent_of(dir)?;
        }
    }

    /// Drop one name of `ino`; a directory loses its `.` link and its parent's `..`
    fn unlink_inode(&mut self, parent: u64, ino: u64) -> FsResult<()> {
        let is_dir = matches!(self.inode(ino)?.content, Content::Dir { .. });
        if is_dir {
            self.inode_mut(ino)?.nlink = 0;
            let parent = self.inode_mut(parent)?;
            parent.nlink = parent.nlink.saturating_sub(1);
        } else {
            let inode = self.inode_mut(ino)?;
            inode.nlink = inode.nlink.saturating_sub(1);
        }
        self.free_if_unused(ino);
        Ok(())
    }
}

/// Reference filesystem living entirely in memory
#[derive(Debug)]
pub struct MemFs {
    case: CaseSensitivity,
    state: Mutex<State>,
    faults: FaultInjector,
}

fn check_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(Errno::EINVAL);
    }
    if name.len() > NAME_MAX {
        return Err(Errno::ENAMETOOLONG);
    }
    Ok(())
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new(CaseSensitivity::default())
    }
}

impl MemFs {
    pub fn new(case: CaseSensitivity) -> Self {
        Self {
            case,
            state: Mutex::new(State::new()),
            faults: FaultInjector::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(&self, name: &str) -> String {
        self.case.fold(name)
    }

    fn fault(&self, op: FaultOp, name: Option<&str>) -> FsResult<()> {
        match self.faults.should_fault(op, name) {
            Some(errno) => {
                trace!("injecting {} into {:?} {:?}", errno, op, name);
                Err(errno)
            }
            None => Ok(()),
        }
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Add a metadata file to the root, the way volumes carry a journal
    pub fn add_reserved_file(&self, name: &str) -> FsResult<()> {
        check_name(name)?;
        let key = self.key(name);
        let mut state = self.state();
        if state.entries(ROOT_INO)?.contains_key(&key) {
            return Err(Errno::EEXIST);
        }
        let ino = state.allocate(Content::File(Vec::new()), 0o444, 1);
        state.entries_mut(ROOT_INO)?.insert(
            key,
            Slot {
                name: name.to_string(),
                ino,
            },
        );
        Ok(())
    }

    /// Lookup references not yet given back, summed over every inode
    pub fn outstanding_lookups(&self) -> u64 {
        self.state().inodes.values().map(|i| i.lookups).sum()
    }

    /// Live inodes, root included
    pub fn inode_count(&self) -> usize {
        self.state().inodes.len()
    }

    fn make(
        &self,
        op: FaultOp,
        dir: NodeHandle,
        name: &str,
        content: Content,
        attrs: &SetAttrs,
    ) -> FsResult<NodeHandle> {
        self.fault(op, Some(name))?;
        check_name(name)?;
        let key = self.key(name);
        let mut state = self.state();
        if state.entries(dir.0)?.contains_key(&key) {
            return Err(Errno::EEXIST);
        }
        let (mode, nlink, content) = match content {
            Content::Dir { entries, .. } => (
                0o755,
                2,
                Content::Dir {
                    entries,
                    parent: dir.0,
                },
            ),
            Content::File(mut data) => {
                if let Some(size) = attrs.size {
                    data.resize(size as usize, 0);
                }
                (0o644, 1, Content::File(data))
            }
            symlink @ Content::Symlink(_) => (0o777, 1, symlink),
        };
        let is_dir = matches!(content, Content::Dir { .. });
        let ino = state.allocate(content, attrs.mode.unwrap_or(mode) & 0o7777, nlink);
        {
            let inode = state.inode_mut(ino)?;
            inode.uid = attrs.uid.unwrap_or(0);
            inode.gid = attrs.gid.unwrap_or(0);
            if let Some(mtime) = attrs.mtime {
                inode.mtime = mtime;
            }
            inode.lookups = 1;
        }
        state.entries_mut(dir.0)?.insert(
            key,
            Slot {
                name: name.to_string(),
                ino,
            },
        );
        if is_dir {
            state.inode_mut(dir.0)?.nlink += 1;
        }
        state.touch(dir.0);
        Ok(NodeHandle(ino))
    }

    fn listing(&self, state: &State, dir: u64) -> FsResult<Vec<(String, u64)>> {
        let parent = state.parent_of(dir)?;
        let mut listing = vec![(".".to_string(), dir), ("..".to_string(), parent)];
        listing.extend(
            state
                .entries(dir)?
                .values()
                .map(|slot| (slot.name.clone(), slot.ino)),
        );
        Ok(listing)
    }
}

/// Take entries from `cookie` on while their cost fits into `buf_size`
fn page<T>(
    items: Vec<T>,
    cookie: u64,
    buf_size: usize,
    cost: impl Fn(&T) -> usize,
) -> FsResult<DirPage<T>> {
    let start = cookie as usize;
    let total = items.len();
    let mut used = 0;
    let mut entries = Vec::new();
    for item in items.into_iter().skip(start) {
        let needed = cost(&item);
        if used + needed > buf_size {
            break;
        }
        used += needed;
        entries.push(item);
    }
    if entries.is_empty() && start < total {
        return Err(Errno::EINVAL);
    }
    let next = start + entries.len();
    Ok(DirPage {
        entries,
        next_cookie: (next < total).then_some(next as u64),
    })
}

impl FsOps for MemFs {
    fn root(&self) -> NodeHandle {
        NodeHandle(ROOT_INO)
    }

    fn create(&self, dir: NodeHandle, name: &str, attrs: &SetAttrs) -> FsResult<NodeHandle> {
        self.make(FaultOp::Create, dir, name, Content::File(Vec::new()), attrs)
    }

    fn mkdir(&self, dir: NodeHandle, name: &str, attrs: &SetAttrs) -> FsResult<NodeHandle> {
        let content = Content::Dir {
            entries: BTreeMap::new(),
            parent: dir.0,
        };
        self.make(FaultOp::Mkdir, dir, name, content, attrs)
    }

    fn symlink(
        &self,
        dir: NodeHandle,
        name: &str,
        target: &str,
        attrs: &SetAttrs,
    ) -> FsResult<NodeHandle> {
        if target.is_empty() {
            return Err(Errno::EINVAL);
        }
        let content = Content::Symlink(target.to_string());
        self.make(FaultOp::Symlink, dir, name, content, attrs)
    }

    fn hardlink(&self, src: NodeHandle, dir: NodeHandle, name: &str) -> FsResult<Attributes> {
        self.fault(FaultOp::Hardlink, Some(name))?;
        check_name(name)?;
        let key = self.key(name);
        let mut state = self.state();
        if matches!(state.inode(src.0)?.content, Content::Dir { .. }) {
            return Err(Errno::EPERM);
        }
        if state.inode(src.0)?.nlink == 0 {
            return Err(Errno::ENOENT);
        }
        if state.entries(dir.0)?.contains_key(&key) {
            return Err(Errno::EEXIST);
        }
        state.entries_mut(dir.0)?.insert(
            key,
            Slot {
                name: name.to_string(),
                ino: src.0,
            },
        );
        state.inode_mut(src.0)?.nlink += 1;
        state.touch(dir.0);
        Ok(state.inode(src.0)?.attrs(src.0))
    }

    fn remove(&self, dir: NodeHandle, name: &str) -> FsResult<()> {
        self.fault(FaultOp::Remove, Some(name))?;
        let key = self.key(name);
        let mut state = self.state();
        let ino = state.child(dir.0, &key)?;
        let inode = state.inode(ino)?;
        if matches!(inode.content, Content::Dir { .. }) {
            return Err(Errno::EISDIR);
        }
        if inode.attrs(ino).is_read_only() && !matches!(inode.content, Content::Symlink(_)) {
            return Err(Errno::EACCES);
        }
        state.entries_mut(dir.0)?.remove(&key);
        state.unlink_inode(dir.0, ino)?;
        state.touch(dir.0);
        Ok(())
    }

    fn rmdir(&self, dir: NodeHandle, name: &str) -> FsResult<()> {
        self.fault(FaultOp::Rmdir, Some(name))?;
        let key = self.key(name);
        let mut state = self.state();
        let ino = state.child(dir.0, &key)?;
        let inode = state.inode(ino)?;
        let Content::Dir { entries, .. } = &inode.content else {
            return Err(Errno::ENOTDIR);
        };
        if !entries.is_empty() {
            return Err(Errno::ENOTEMPTY);
        }
        if inode.attrs(ino).is_read_only() {
            return Err(Errno::EACCES);
        }
        state.entries_mut(dir.0)?.remove(&key);
        state.unlink_inode(dir.0, ino)?;
        state.touch(dir.0);
        Ok(())
    }

    fn rename(
        &self,
        from_dir: NodeHandle,
        from: Option<NodeHandle>,
        from_name: &str,
        to_dir: NodeHandle,
        to: Option<NodeHandle>,
        to_name: &str,
    ) -> FsResult<()> {
        self.fault(FaultOp::Rename, Some(from_name))?;
        check_name(to_name)?;
        let from_key = self.key(from_name);
        let to_key = self.key(to_name);
        let mut state = self.state();

        let ino = state.child(from_dir.0, &from_key)?;
        if from.is_some_and(|h| h.0 != ino) {
            return Err(Errno::EINVAL);
        }
        state.entries(to_dir.0)?;
        let src_is_dir = matches!(state.inode(ino)?.content, Content::Dir { .. });
        if src_is_dir && state.is_ancestor(ino, to_dir.0)? {
            return Err(Errno::EINVAL);
        }

        if from_dir == to_dir && from_key == to_key {
            // Same entry; only the spelling may change
            if let Some(slot) = state.entries_mut(from_dir.0)?.get_mut(&from_key) {
                slot.name = to_name.to_string();
            }
            state.touch(from_dir.0);
            return Ok(());
        }

        match state.child(to_dir.0, &to_key) {
            Ok(existing) => {
                if to.is_some_and(|h| h.0 != existing) {
                    return Err(Errno::EINVAL);
                }
                if existing == ino {
                    return Ok(());
                }
                match (&state.inode(existing)?.content, src_is_dir) {
                    (Content::Dir { entries, .. }, true) => {
                        if !entries.is_empty() {
                            return Err(Errno::ENOTEMPTY);
                        }
                    }
                    (Content::Dir { .. }, false) => return Err(Errno::EISDIR),
                    (_, true) => return Err(Errno::ENOTDIR),
                    (_, false) => {}
                }
                state.entries_mut(to_dir.0)?.remove(&to_key);
                state.unlink_inode(to_dir.0, existing)?;
            }
            Err(Errno::ENOENT) => {}
            Err(errno) => return Err(errno),
        }

        state.entries_mut(from_dir.0)?.remove(&from_key);
        state.entries_mut(to_dir.0)?.insert(
            to_key,
            Slot {
                name: to_name.to_string(),
                ino,
            },
        );
        if src_is_dir && from_dir != to_dir {
            if let Content::Dir { parent, .. } = &mut state.inode_mut(ino)?.content {
                *parent = to_dir.0;
            }
            let old_parent = state.inode_mut(from_dir.0)?;
            old_parent.nlink = old_parent.nlink.saturating_sub(1);
            state.inode_mut(to_dir.0)?.nlink += 1;
        }
        state.touch(from_dir.0);
        state.touch(to_dir.0);
        Ok(())
    }

    fn lookup(&self, dir: NodeHandle, name: &str) -> FsResult<NodeHandle> {
        self.fault(FaultOp::Lookup, Some(name))?;
        let mut state = self.state();
        let ino = match name {
            "." => {
                state.entries(dir.0)?;
                dir.0
            }
            ".." => state.parent_of(dir.0)?,
            _ => state.child(dir.0, &self.key(name))?,
        };
        state.inode_mut(ino)?.lookups += 1;
        Ok(NodeHandle(ino))
    }

    fn reclaim(&self, handle: NodeHandle) -> FsResult<()> {
        self.fault(FaultOp::Reclaim, None)?;
        let mut state = self.state();
        let inode = state.inode_mut(handle.0)?;
        if inode.lookups == 0 {
            return Err(Errno::EINVAL);
        }
        inode.lookups -= 1;
        state.free_if_unused(handle.0);
        Ok(())
    }

    fn getattr(&self, handle: NodeHandle) -> FsResult<Attributes> {
        self.fault(FaultOp::Getattr, None)?;
        let state = self.state();
        Ok(state.inode(handle.0)?.attrs(handle.0))
    }

    fn setattr(&self, handle: NodeHandle, attrs: &SetAttrs) -> FsResult<Attributes> {
        self.fault(FaultOp::Setattr, None)?;
        let mut state = self.state();
        let now = state.tick();
        let inode = state.inode_mut(handle.0)?;
        if let Some(size) = attrs.size {
            match &mut inode.content {
                Content::File(data) => data.resize(size as usize, 0),
                Content::Dir { .. } => return Err(Errno::EISDIR),
                Content::Symlink(_) => return Err(Errno::EINVAL),
            }
        }
        if let Some(mode) = attrs.mode {
            inode.mode = mode & 0o7777;
        }
        if let Some(uid) = attrs.uid {
            inode.uid = uid;
        }
        if let Some(gid) = attrs.gid {
            inode.gid = gid;
        }
        inode.mtime = attrs.mtime.unwrap_or(now);
        Ok(inode.attrs(handle.0))
    }

    fn read(&self, handle: NodeHandle, offset: u64, len: usize) -> FsResult<Vec<u8>> {
        self.fault(FaultOp::Read, None)?;
        let state = self.state();
        match &state.inode(handle.0)?.content {
            Content::File(data) => {
                let start = (offset as usize).min(data.len());
                let end = start.saturating_add(len).min(data.len());
                Ok(data[start..end].to_vec())
            }
            Content::Dir { .. } => Err(Errno::EISDIR),
            Content::Symlink(_) => Err(Errno::EINVAL),
        }
    }

    fn write(&self, handle: NodeHandle, offset: u64, data: &[u8]) -> FsResult<usize> {
        self.fault(FaultOp::Write, None)?;
        let mut state = self.state();
        let now = state.tick();
        let inode = state.inode_mut(handle.0)?;
        match &mut inode.content {
            Content::File(content) => {
                let start = offset as usize;
                let end = start + data.len();
                if end > content.len() {
                    content.resize(end, 0);
                }
                content[start..end].copy_from_slice(data);
            }
            Content::Dir { .. } => return Err(Errno::EISDIR),
            Content::Symlink(_) => return Err(Errno::EINVAL),
        }
        inode.mtime = now;
        Ok(data.len())
    }

    fn readdir(
        &self,
        dir: NodeHandle,
        cookie: u64,
        buf_size: usize,
    ) -> FsResult<DirPage<DirEntry>> {
        self.fault(FaultOp::Readdir, None)?;
        let state = self.state();
        let mut entries = Vec::new();
        for (name, ino) in self.listing(&state, dir.0)? {
            entries.push(DirEntry {
                name,
                file_type: state.inode(ino)?.file_type(),
            });
        }
        page(entries, cookie, buf_size, |e| DIRENT_COST + e.name.len())
    }

    fn readdirattr(
        &self,
        dir: NodeHandle,
        cookie: u64,
        buf_size: usize,
    ) -> FsResult<DirPage<DirEntryAttr>> {
        self.fault(FaultOp::Readdirattr, None)?;
        let state = self.state();
        let mut entries = Vec::new();
        for slot in state.entries(dir.0)?.values() {
            entries.push(DirEntryAttr {
                name: slot.name.clone(),
                attrs: state.inode(slot.ino)?.attrs(slot.ino),
            });
        }
        page(entries, cookie, buf_size, |e| DIRENT_ATTR_COST + e.name.len())
    }

    fn readlink(&self, handle: NodeHandle, buf_size: usize) -> FsResult<(String, Attributes)> {
        self.fault(FaultOp::Readlink, None)?;
        let state = self.state();
        let inode = state.inode(handle.0)?;
        match &inode.content {
            Content::Symlink(target) if target.len() > buf_size => Err(Errno::ERANGE),
            Content::Symlink(target) => Ok((target.clone(), inode.attrs(handle.0))),
            _ => Err(Errno::EINVAL),
        }
    }

    fn sync(&self, handle: NodeHandle) -> FsResult<()> {
        self.fault(FaultOp::Sync, None)?;
        self.state().inode(handle.0).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fs() -> MemFs {
        MemFs::new(CaseSensitivity::Sensitive)
    }

    #[test]
    fn create_lookup_and_reclaim_balance() {
        let fs = fs();
        let root = fs.root();
        let h = fs.create(root, "a", &SetAttrs::default()).expect("create");
        assert_eq!(fs.create(root, "a", &SetAttrs::default()), Err(Errno::EEXIST));
        assert_eq!(fs.lookup(root, "a"), Ok(h));
        assert_eq!(fs.outstanding_lookups(), 2);
        fs.reclaim(h).expect("reclaim");
        fs.reclaim(h).expect("reclaim");
        assert_eq!(fs.reclaim(h), Err(Errno::EINVAL));
        assert_eq!(fs.outstanding_lookups(), 0);
    }

    #[test]
    fn unlinked_inode_lives_until_reclaimed() {
        let fs = fs();
        let root = fs.root();
        let h = fs.create(root, "a", &SetAttrs::default()).expect("create");
        fs.remove(root, "a").expect("remove");
        assert_eq!(fs.getattr(h).expect("still open").nlink, 0);
        fs.reclaim(h).expect("reclaim");
        assert_eq!(fs.getattr(h), Err(Errno::EBADF));
        assert_eq!(fs.inode_count(), 1);
    }

    #[test]
    fn hardlinks_share_the_inode() {
        let fs = fs();
        let root = fs.root();
        let h = fs.create(root, "f", &SetAttrs::default()).expect("create");
        let attrs = fs.hardlink(h, root, "g").expect("link");
        assert_eq!(attrs.nlink, 2);
        assert_eq!(fs.lookup(root, "g"), Ok(h));
        let d = fs.mkdir(root, "d", &SetAttrs::default()).expect("mkdir");
        assert_eq!(fs.hardlink(d, root, "e"), Err(Errno::EPERM));
    }

    #[test]
    fn read_only_files_refuse_removal() {
        let fs = fs();
        let root = fs.root();
        fs.create(root, "ro", &SetAttrs::mode(0o444)).expect("create");
        assert_eq!(fs.remove(root, "ro"), Err(Errno::EACCES));
    }

    #[test]
    fn rename_follows_posix_rules() {
        let fs = fs();
        let root = fs.root();
        let d = fs.mkdir(root, "d", &SetAttrs::default()).expect("mkdir");
        let sub = fs.mkdir(d, "sub", &SetAttrs::default()).expect("mkdir");
        fs.create(sub, "x", &SetAttrs::default()).expect("create");
        fs.create(root, "f", &SetAttrs::default()).expect("create");

        assert_eq!(fs.rename(root, None, "d", sub, None, "d"), Err(Errno::EINVAL));
        assert_eq!(fs.rename(root, None, "f", d, None, "sub"), Err(Errno::EISDIR));
        assert_eq!(fs.rename(d, None, "sub", root, None, "f"), Err(Errno::ENOTDIR));
        fs.mkdir(root, "full", &SetAttrs::default()).expect("mkdir");
        assert_eq!(fs.rename(d, None, "sub", root, None, "full"), Ok(()));
        assert!(fs.lookup(root, "full").is_ok());
        assert_eq!(fs.rename(root, None, "d", root, None, "full"), Err(Errno::ENOTEMPTY));
    }

    #[test]
    fn case_insensitive_names_preserve_spelling() {
        let fs = MemFs::new(CaseSensitivity::InsensitivePreserving);
        let root = fs.root();
        fs.create(root, "Readme", &SetAttrs::default()).expect("create");
        assert_eq!(fs.create(root, "README", &SetAttrs::default()), Err(Errno::EEXIST));
        fs.rename(root, None, "readme", root, None, "README.md")
            .expect("rename");
        fs.rename(root, None, "readme.md", root, None, "ReadMe.md")
            .expect("case-only rename");
        let listing = fs.readdir(root, 0, 4096).expect("readdir");
        let names: Vec<_> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![".", "..", "ReadMe.md"]);
    }

    #[test]
    fn readdir_pages_with_cookies() {
        let fs = fs();
        let root = fs.root();
        for i in 0..10 {
            fs.create(root, &format!("file{i}"), &SetAttrs::default())
                .expect("create");
        }
        let mut cookie = 0;
        let mut names = Vec::new();
        loop {
            let page = fs.readdir(root, cookie, 40).expect("page");
            assert!(page.entries.len() <= 3);
            names.extend(page.entries.into_iter().map(|e| e.name));
            match page.next_cookie {
                Some(next) => cookie = next,
                None => break,
            }
        }
        assert_eq!(names.len(), 12);
        assert_eq!(fs.readdir(root, 0, 4), Err(Errno::EINVAL));
    }

    #[test]
    fn readlink_respects_buffer() {
        let fs = fs();
        let root = fs.root();
        let l = fs
            .symlink(root, "l", "/some/long/target", &SetAttrs::default())
            .expect("symlink");
        assert_eq!(fs.readlink(l, 4), Err(Errno::ERANGE));
        assert_eq!(fs.readlink(l, 64).expect("readlink").0, "/some/long/target");
    }
}
