// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Low-level operation table of the filesystem under test
//!
//! This is the only way the model talks to a filesystem. Handles returned by
//! `create`, `mkdir`, `symlink` and `lookup` carry one lookup reference each, which
//! the caller gives back with `reclaim`. The root handle is never reclaimed.

use crate::error::FsResult;
use crate::types::{Attributes, DirEntry, DirEntryAttr, DirPage, NodeHandle, SetAttrs};

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait FsOps: Send + Sync {
    /// Handle of the volume root
    fn root(&self) -> NodeHandle;

    fn create(&self, dir: NodeHandle, name: &str, attrs: &SetAttrs) -> FsResult<NodeHandle>;

    fn mkdir(&self, dir: NodeHandle, name: &str, attrs: &SetAttrs) -> FsResult<NodeHandle>;

    fn symlink(
        &self,
        dir: NodeHandle,
        name: &str,
        target: &str,
        attrs: &SetAttrs,
    ) -> FsResult<NodeHandle>;

    /// Link `src` into `dir` as `name`; returns the updated attributes of `src`
    fn hardlink(&self, src: NodeHandle, dir: NodeHandle, name: &str) -> FsResult<Attributes>;

    fn remove(&self, dir: NodeHandle, name: &str) -> FsResult<()>;

    fn rmdir(&self, dir: NodeHandle, name: &str) -> FsResult<()>;

    /// Either side may be identified by name alone or by name plus a live handle
    #[allow(clippy::too_many_arguments)]
    fn rename(
        &self,
        from_dir: NodeHandle,
        from: Option<NodeHandle>,
        from_name: &str,
        to_dir: NodeHandle,
        to: Option<NodeHandle>,
        to_name: &str,
    ) -> FsResult<()>;

    fn lookup(&self, dir: NodeHandle, name: &str) -> FsResult<NodeHandle>;

    fn reclaim(&self, handle: NodeHandle) -> FsResult<()>;

    fn getattr(&self, handle: NodeHandle) -> FsResult<Attributes>;

    fn setattr(&self, handle: NodeHandle, attrs: &SetAttrs) -> FsResult<Attributes>;

    fn read(&self, handle: NodeHandle, offset: u64, len: usize) -> FsResult<Vec<u8>>;

    fn write(&self, handle: NodeHandle, offset: u64, data: &[u8]) -> FsResult<usize>;

    fn readdir(&self, dir: NodeHandle, cookie: u64, buf_size: usize)
        -> FsResult<DirPage<DirEntry>>;

    fn readdirattr(
        &self,
        dir: NodeHandle,
        cookie: u64,
        buf_size: usize,
    ) -> FsResult<DirPage<DirEntryAttr>>;

    fn readlink(&self, handle: NodeHandle, buf_size: usize) -> FsResult<(String, Attributes)>;

    fn sync(&self, handle: NodeHandle) -> FsResult<()>;
}
