// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Cross-checks between trees, and between a tree and reported link counts

use std::cmp::Ordering;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::TreeConfig;
use crate::error::TreeResult;
use crate::export::NodeRecord;
use crate::path;
use crate::tree::FsTree;
use crate::types::NodeType;

/// One side of the comparison has an entry the other lacks
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PathMismatch {
    pub model: Option<String>,
    pub truth: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EqualityReport {
    pub equal: bool,
    pub model_entries: usize,
    pub truth_entries: usize,
    pub mismatch_count: usize,
    /// The first mismatches, up to `TreeConfig::max_reported_mismatches`
    pub mismatches: Vec<PathMismatch>,
}

/// Comparison key: folded path plus type, hard links counted as files
fn comparable(records: &[NodeRecord], config: &TreeConfig) -> Vec<(String, NodeType, String)> {
    let mut keyed: Vec<_> = records
        .iter()
        .filter(|r| r.path != path::ROOT)
        .filter(|r| !path::segments(&r.path).any(|seg| config.is_reserved(seg)))
        .map(|r| {
            let node_type = match r.node_type {
                NodeType::HardLink => NodeType::File,
                other => other,
            };
            (config.case_sensitivity.fold(&r.path), node_type, r.path.clone())
        })
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed
}

fn describe(entry: &(String, NodeType, String)) -> String {
    format!("{} ({})", entry.2, entry.1.label())
}

/// Compare two record sets as sorted, folded path lists
pub fn compare_records(
    model: &[NodeRecord],
    truth: &[NodeRecord],
    config: &TreeConfig,
) -> EqualityReport {
    let model = comparable(model, config);
    let truth = comparable(truth, config);
    let mut report = EqualityReport {
        equal: true,
        model_entries: model.len(),
        truth_entries: truth.len(),
        ..EqualityReport::default()
    };

    let push = |report: &mut EqualityReport, mismatch: PathMismatch| {
        report.equal = false;
        report.mismatch_count += 1;
        if report.mismatches.len() < config.max_reported_mismatches {
            warn!(
                "tree mismatch: model {:?} vs truth {:?}",
                mismatch.model, mismatch.truth
            );
            report.mismatches.push(mismatch);
        }
    };

    let (mut m, mut t) = (0, 0);
    while m < model.len() || t < truth.len() {
        let order = match (model.get(m), truth.get(t)) {
            (Some(a), Some(b)) => a.0.cmp(&b.0),
            (Some(_), None) => Ordering::Less,
            (None, _) => Ordering::Greater,
        };
        match order {
            Ordering::Equal => {
                if model[m].1 != truth[t].1 {
                    push(
                        &mut report,
                        PathMismatch {
                            model: Some(describe(&model[m])),
                            truth: Some(describe(&truth[t])),
                        },
                    );
                }
                m += 1;
                t += 1;
            }
            Ordering::Less => {
                push(
                    &mut report,
                    PathMismatch {
                        model: Some(describe(&model[m])),
                        truth: None,
                    },
                );
                m += 1;
            }
            Ordering::Greater => {
                push(
                    &mut report,
                    PathMismatch {
                        model: None,
                        truth: Some(describe(&truth[t])),
                    },
                );
                t += 1;
            }
        }
    }
    report
}

/// Structural equality of the maintained model and a tree rebuilt from scratch
pub fn are_fs_equal(model: &FsTree, truth: &FsTree) -> EqualityReport {
    compare_records(&model.records(), &truth.records(), model.config())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LinkCountFailure {
    pub path: String,
    pub node_type: NodeType,
    pub expected: u32,
    pub reported: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub checked: usize,
    pub skipped: usize,
    pub failures: Vec<LinkCountFailure>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }
}

impl FsTree {
    /// Check every existing node's reported link count against the model
    pub fn validate_tree(&self) -> TreeResult<ValidationReport> {
        let mut report = ValidationReport::default();
        for node in self.existing_nodes() {
            if node.is_dir() {
                continue;
            }
            let expected = node.link_group().map(|g| g.nlink()).unwrap_or(1);
            let attrs = match self.getattr(node.id())? {
                Ok(attrs) => attrs,
                Err(errno) => {
                    warn!("skipping {}: getattr failed: {}", node.path, errno);
                    report.skipped += 1;
                    continue;
                }
            };
            report.checked += 1;
            if attrs.nlink != expected {
                warn!(
                    "{} {} reports nlink {}, model expects {}",
                    node.node_type().label(),
                    node.path,
                    attrs.nlink,
                    expected
                );
                report.failures.push(LinkCountFailure {
                    path: node.path.clone(),
                    node_type: node.node_type(),
                    expected,
                    reported: attrs.nlink,
                });
            }
        }
        debug!(
            "validated {} nodes, {} skipped, {} failures",
            report.checked,
            report.skipped,
            report.failures.len()
        );
        Ok(report)
    }
}
