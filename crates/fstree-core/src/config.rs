// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Tree configuration

use serde::{Deserialize, Serialize};

/// How path components are compared
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseSensitivity {
    #[default]
    Sensitive,
    InsensitivePreserving,
}

impl CaseSensitivity {
    /// Index key for a path under this comparison mode
    pub fn fold(self, path: &str) -> String {
        match self {
            CaseSensitivity::Sensitive => path.to_string(),
            CaseSensitivity::InsensitivePreserving => path.to_lowercase(),
        }
    }

    pub fn names_equal(self, a: &str, b: &str) -> bool {
        match self {
            CaseSensitivity::Sensitive => a == b,
            CaseSensitivity::InsensitivePreserving => a.to_lowercase() == b.to_lowercase(),
        }
    }
}

fn default_reserved_names() -> Vec<String> {
    [
        ".",
        "..",
        ".journal",
        ".journal_info_block",
        ".fseventsd",
        ".Spotlight-V100",
        ".Trashes",
    ]
    .iter()
    .map(|name| name.to_string())
    .collect()
}

fn default_readdir_buffer() -> usize {
    4096
}

fn default_readlink_buffer() -> usize {
    1024
}

fn default_max_reported_mismatches() -> usize {
    5
}

/// Knobs for one [`crate::FsTree`]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TreeConfig {
    #[serde(default)]
    pub case_sensitivity: CaseSensitivity,
    /// Names that are never modelled: self/parent links, journal and metadata files
    #[serde(default = "default_reserved_names")]
    pub reserved_names: Vec<String>,
    #[serde(default = "default_readdir_buffer")]
    pub readdir_buffer: usize,
    #[serde(default = "default_readlink_buffer")]
    pub readlink_buffer: usize,
    #[serde(default = "default_max_reported_mismatches")]
    pub max_reported_mismatches: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            case_sensitivity: CaseSensitivity::default(),
            reserved_names: default_reserved_names(),
            readdir_buffer: default_readdir_buffer(),
            readlink_buffer: default_readlink_buffer(),
            max_reported_mismatches: default_max_reported_mismatches(),
        }
    }
}

impl TreeConfig {
    pub fn case_insensitive() -> Self {
        Self {
            case_sensitivity: CaseSensitivity::InsensitivePreserving,
            ..Self::default()
        }
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Whether `name` is skipped by walks; "." and ".." always are
    pub fn is_reserved(&self, name: &str) -> bool {
        if name == "." || name == ".." {
            return true;
        }
        self.reserved_names
            .iter()
            .any(|reserved| self.case_sensitivity.names_equal(reserved, name))
    }
}
