// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Flat JSON records of a tree, for comparing trees across processes

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::TreeResult;
use crate::tree::FsTree;
use crate::types::NodeType;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub path: String,
    pub node_type: NodeType,
    #[serde(default)]
    pub owned: bool,
}

impl FsTree {
    /// Records of every existing node except the root, sorted by path
    pub fn records(&self) -> Vec<NodeRecord> {
        let mut records: Vec<NodeRecord> = self
            .index()
            .iter_existing()
            .filter(|n| !n.is_root())
            .map(|n| NodeRecord {
                path: n.path.clone(),
                node_type: n.node_type(),
                owned: n.owned,
            })
            .collect();
        records.sort_by(|a, b| a.path.cmp(&b.path));
        records
    }

    pub fn write_records<W: Write>(&self, writer: W) -> TreeResult<()> {
        write_records(writer, &self.records())
    }
}

pub fn write_records<W: Write>(mut writer: W, records: &[NodeRecord]) -> TreeResult<()> {
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.flush()?;
    Ok(())
}

pub fn read_records<R: Read>(reader: R) -> TreeResult<Vec<NodeRecord>> {
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_survive_a_file() {
        let records = vec![
            NodeRecord {
                path: "/a".into(),
                node_type: NodeType::Directory,
                owned: true,
            },
            NodeRecord {
                path: "/a/f".into(),
                node_type: NodeType::HardLink,
                owned: false,
            },
        ];
        let file = tempfile::NamedTempFile::new().expect("tempfile");
        write_records(file.reopen().expect("reopen"), &records).expect("write");
        let read = read_records(file.reopen().expect("reopen")).expect("read");
        assert_eq!(read, records);
    }

    #[test]
    fn owned_defaults_to_false() {
        let read = read_records(&br#"[{"path":"/x","node_type":"symlink"}]"#[..]).expect("read");
        assert!(!read[0].owned);
        assert_eq!(read[0].node_type, NodeType::Symlink);
    }
}
