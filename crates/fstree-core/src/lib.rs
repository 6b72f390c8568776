// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Shadow model of a filesystem tree for conformance and stress testing.
//!
//! An [`FsTree`] mirrors what a filesystem should contain while a test drives it
//! through its low-level operation table ([`FsOps`]). Every operation calls the
//! table first and updates the model only when the call succeeded, so the model
//! can later be rebuilt from scratch ([`FsTree::build`]) and compared against the
//! maintained copy ([`are_fs_equal`]), and reported link counts can be checked
//! against the model ([`FsTree::validate_tree`]).
//!
//! [`MemFs`] is an in-memory reference implementation of the operation table with
//! fault injection, used by the tests and the stress binary.

pub mod builder;
pub mod config;
pub mod content;
pub mod error;
pub mod export;
pub mod fault;
pub mod hardlink;
pub mod index;
pub mod memfs;
pub mod mutate;
pub mod node;
pub mod ops;
pub mod path;
pub mod tree;
pub mod types;
pub mod validate;

pub use builder::TreeBuilder;
pub use config::{CaseSensitivity, TreeConfig};
pub use content::PatternReport;
pub use error::{Errno, FsResult, Status, TreeError, TreeResult};
pub use export::{read_records, write_records, NodeRecord};
pub use fault::{FaultErrno, FaultInjector, FaultOp, FaultPolicy, FaultRule};
pub use memfs::MemFs;
pub use mutate::{CreateRequest, DeleteRequest, DeleteTarget, RenameRequest};
pub use node::{ByteRanges, LinkGroup, Node, NodeId, NodeKind};
#[cfg(any(test, feature = "mock"))]
pub use ops::MockFsOps;
pub use ops::FsOps;
pub use tree::{FsTree, Outcome, PurgeReport};
pub use types::{
    Attributes, DirEntry, DirEntryAttr, DirPage, FileType, NodeHandle, NodeType, SetAttrs,
};
pub use validate::{
    are_fs_equal, compare_records, EqualityReport, LinkCountFailure, PathMismatch,
    ValidationReport,
};
