// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions shared by the model and the operation table

use serde::{Deserialize, Serialize};

/// Opaque identity handle handed out by the filesystem under test
///
/// Two directory entries that are hard links of one file resolve to the same handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeHandle(pub u64);

impl NodeHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Object type as reported by the filesystem
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
}

/// Node type as tracked by the model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    File,
    Directory,
    Symlink,
    HardLink,
}

impl NodeType {
    pub fn label(self) -> &'static str {
        match self {
            NodeType::File => "file",
            NodeType::Directory => "directory",
            NodeType::Symlink => "symlink",
            NodeType::HardLink => "hardlink",
        }
    }
}

impl From<FileType> for NodeType {
    fn from(value: FileType) -> Self {
        match value {
            FileType::Regular => NodeType::File,
            FileType::Directory => NodeType::Directory,
            FileType::Symlink => NodeType::Symlink,
        }
    }
}

/// Attribute snapshot returned by getattr/setattr/lookup-adjacent calls
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    pub file_type: FileType,
    /// Permission bits only (no S_IFMT)
    pub mode: u32,
    pub size: u64,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub fileid: u64,
    pub mtime: i64,
}

impl Attributes {
    /// Owner write bit cleared, which is how a read-only entry shows up
    pub fn is_read_only(&self) -> bool {
        self.mode & 0o200 == 0
    }
}

/// Attribute changes requested through create/mkdir/symlink/setattr
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetAttrs {
    #[serde(default)]
    pub mode: Option<u32>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub uid: Option<u32>,
    #[serde(default)]
    pub gid: Option<u32>,
    #[serde(default)]
    pub mtime: Option<i64>,
}

impl SetAttrs {
    pub fn mode(mode: u32) -> Self {
        Self {
            mode: Some(mode),
            ..Self::default()
        }
    }

    pub fn size(size: u64) -> Self {
        Self {
            size: Some(size),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Entry produced by readdir
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub file_type: FileType,
}

/// Entry produced by readdirattr
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntryAttr {
    pub name: String,
    pub attrs: Attributes,
}

/// One buffer's worth of directory entries
///
/// `next_cookie` is `None` once the directory is exhausted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirPage<E> {
    pub entries: Vec<E>,
    pub next_cookie: Option<u64>,
}
