// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the FSTree shadow model
//!
//! [`Errno`] is what the filesystem under test answered; it is handed back to the
//! caller as an assertable outcome. [`TreeError`] means the model itself can no
//! longer be trusted and the current operation stops.

use std::fmt;
use std::io;

use crate::node::NodeId;
use crate::types::NodeHandle;

/// POSIX-style status returned by a call into the operation table
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Errno(i32);

impl Errno {
    pub const EPERM: Errno = Errno(libc::EPERM);
    pub const ENOENT: Errno = Errno(libc::ENOENT);
    pub const EIO: Errno = Errno(libc::EIO);
    pub const EACCES: Errno = Errno(libc::EACCES);
    pub const EEXIST: Errno = Errno(libc::EEXIST);
    pub const ENOTDIR: Errno = Errno(libc::ENOTDIR);
    pub const EISDIR: Errno = Errno(libc::EISDIR);
    pub const EINVAL: Errno = Errno(libc::EINVAL);
    pub const ENOSPC: Errno = Errno(libc::ENOSPC);
    pub const EROFS: Errno = Errno(libc::EROFS);
    pub const ERANGE: Errno = Errno(libc::ERANGE);
    pub const ENOTEMPTY: Errno = Errno(libc::ENOTEMPTY);
    pub const EBADF: Errno = Errno(libc::EBADF);
    pub const ENAMETOOLONG: Errno = Errno(libc::ENAMETOOLONG);

    pub fn code(self) -> i32 {
        self.0
    }
}

impl fmt::Debug for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Errno({})", self.0)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", io::Error::from_raw_os_error(self.0))
    }
}

impl std::error::Error for Errno {}

impl From<Errno> for io::Error {
    fn from(errno: Errno) -> Self {
        io::Error::from_raw_os_error(errno.0)
    }
}

/// Result of a single operation-table call
pub type FsResult<T> = Result<T, Errno>;

/// Status half of an [`crate::Outcome`]: `Ok(())` is status 0
pub type Status = Result<(), Errno>;

/// Raw numeric form of a status, 0 on success
pub fn status_code(status: &Status) -> i32 {
    match status {
        Ok(()) => 0,
        Err(errno) => errno.code(),
    }
}

/// Model-invariant violations and caller misuse
#[derive(thiserror::Error, Debug)]
pub enum TreeError {
    #[error("path {0} is already present in the tree")]
    DuplicatePath(String),
    #[error("hardlink {path} resolved to {actual}, expected source identity {expected}")]
    HardlinkMismatch {
        path: String,
        expected: NodeHandle,
        actual: NodeHandle,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("removing the root is forbidden")]
    RootRemoval,
    #[error("node {0} is not part of this tree")]
    UnknownNode(NodeId),
    #[error("{op} failed while walking {path}: {errno}")]
    Walk {
        op: &'static str,
        path: String,
        errno: Errno,
    },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type TreeResult<T> = Result<T, TreeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_is_zero_on_success() {
        assert_eq!(status_code(&Ok(())), 0);
        assert_eq!(status_code(&Err(Errno::EACCES)), libc::EACCES);
    }

    #[test]
    fn errno_display_mentions_code() {
        let text = Errno::ENOENT.to_string();
        assert!(text.contains(&libc::ENOENT.to_string()), "{text}");
    }
}
