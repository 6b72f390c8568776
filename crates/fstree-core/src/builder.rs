// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Populate a fresh tree by walking the filesystem

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::TreeConfig;
use crate::error::{TreeError, TreeResult};
use crate::node::NodeId;
use crate::ops::FsOps;
use crate::path;
use crate::tree::FsTree;
use crate::types::FileType;

/// Recursive readdir + lookup walk
pub struct TreeBuilder<'a> {
    tree: &'a FsTree,
    visited: usize,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(tree: &'a FsTree) -> Self {
        Self { tree, visited: 0 }
    }

    /// Walk everything below the root, then regroup hard links
    pub fn walk(mut self) -> TreeResult<usize> {
        let root = self.tree.root();
        self.walk_dir(root)?;
        let aliases = self.tree.resolve_hardlinks();
        info!(
            "tree walk found {} entries ({} hard link aliases)",
            self.visited, aliases
        );
        Ok(self.visited)
    }

    fn walk_dir(&mut self, dir: NodeId) -> TreeResult<()> {
        let dir_path = self.tree.snapshot(dir)?.path;
        let entries = self.tree.readdir(dir)?.map_err(|errno| TreeError::Walk {
            op: "readdir",
            path: dir_path.clone(),
            errno,
        })?;

        for entry in entries {
            if self.tree.config().is_reserved(&entry.name) {
                continue;
            }
            let full = path::join(&dir_path, &entry.name);
            if self.tree.find_id(&full).is_some() {
                return Err(TreeError::DuplicatePath(full));
            }
            let outcome = self.tree.lookup_in(Some(dir), &entry.name, None)?;
            let id = match (outcome.node, outcome.status) {
                (Some(id), Ok(())) => id,
                (_, Err(errno)) => {
                    return Err(TreeError::Walk {
                        op: "lookup",
                        path: full,
                        errno,
                    })
                }
                (None, Ok(())) => {
                    return Err(TreeError::Walk {
                        op: "lookup",
                        path: full,
                        errno: crate::error::Errno::ENOENT,
                    })
                }
            };
            self.visited += 1;
            debug!("walked {}", full);
            if entry.file_type == FileType::Directory {
                self.walk_dir(id)?;
            }
        }
        Ok(())
    }
}

impl FsTree {
    /// Model of whatever the filesystem currently holds
    pub fn build(ops: Arc<dyn FsOps>, config: TreeConfig) -> TreeResult<FsTree> {
        let tree = FsTree::new(ops, config);
        TreeBuilder::new(&tree).walk()?;
        Ok(tree)
    }
}
