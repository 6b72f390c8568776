// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Deterministic failure injection for the reference filesystem

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::Errno;

/// Operation-table calls that can be made to fail
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultOp {
    Create,
    Mkdir,
    Symlink,
    Hardlink,
    Remove,
    Rmdir,
    Rename,
    Lookup,
    Reclaim,
    Getattr,
    Setattr,
    Read,
    Write,
    Readdir,
    Readdirattr,
    Readlink,
    Sync,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultErrno {
    Eio,
    Enospc,
    Eacces,
    Erofs,
    Enoent,
}

impl FaultErrno {
    fn to_errno(self) -> Errno {
        match self {
            FaultErrno::Eio => Errno::EIO,
            FaultErrno::Enospc => Errno::ENOSPC,
            FaultErrno::Eacces => Errno::EACCES,
            FaultErrno::Erofs => Errno::EROFS,
            FaultErrno::Enoent => Errno::ENOENT,
        }
    }
}

/// Which call fails, with which errno, and how often
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FaultRule {
    pub op: FaultOp,
    pub errno: FaultErrno,
    /// Number of leading matching calls to let through
    #[serde(default)]
    pub start_after: u64,
    #[serde(default)]
    pub max_faults: Option<u64>,
    /// Only calls naming this entry match; every call matches when unset
    #[serde(default)]
    pub name: Option<String>,
}

impl FaultRule {
    pub fn new(op: FaultOp, errno: FaultErrno) -> Self {
        Self {
            op,
            errno,
            start_after: 0,
            max_faults: None,
            name: None,
        }
    }

    fn matches(&self, op: FaultOp, name: Option<&str>) -> bool {
        if self.op != op {
            return false;
        }
        match &self.name {
            Some(wanted) => name == Some(wanted.as_str()),
            None => true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct FaultPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<FaultRule>,
}

impl FaultPolicy {
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn summary(&self) -> FaultPolicySummary {
        FaultPolicySummary {
            enabled: self.enabled,
            active: self.enabled && !self.rules.is_empty(),
            rule_count: self.rules.len(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct FaultPolicySummary {
    pub enabled: bool,
    pub active: bool,
    pub rule_count: usize,
}

#[derive(Clone, Debug, Default)]
struct RuleCounters {
    hits: u64,
    invocations: u64,
}

#[derive(Clone, Debug, Default)]
struct FaultState {
    policy: FaultPolicy,
    counters: Vec<RuleCounters>,
    injected: u64,
}

/// Policy plus per-rule hit counts
#[derive(Debug, Default)]
pub struct FaultInjector {
    state: Mutex<FaultState>,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FaultState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> FaultPolicy {
        self.state().policy.clone()
    }

    pub fn summary(&self) -> FaultPolicySummary {
        self.snapshot().summary()
    }

    pub fn set_policy(&self, policy: FaultPolicy) {
        let mut guard = self.state();
        guard.counters = vec![RuleCounters::default(); policy.rules.len()];
        guard.policy = policy;
    }

    pub fn clear(&self) {
        self.set_policy(FaultPolicy::default());
    }

    /// Total faults handed out since the injector was created
    pub fn injected(&self) -> u64 {
        self.state().injected
    }

    pub fn should_fault(&self, op: FaultOp, name: Option<&str>) -> Option<Errno> {
        let mut guard = self.state();
        if !guard.policy.enabled {
            return None;
        }
        let state = &mut *guard;
        state
            .counters
            .resize(state.policy.rules.len(), RuleCounters::default());
        for (rule, counters) in state.policy.rules.iter().zip(state.counters.iter_mut()) {
            if !rule.matches(op, name) {
                continue;
            }
            counters.invocations = counters.invocations.saturating_add(1);
            if counters.invocations <= rule.start_after {
                continue;
            }
            if let Some(max) = rule.max_faults {
                if counters.hits >= max {
                    continue;
                }
            }
            counters.hits = counters.hits.saturating_add(1);
            state.injected += 1;
            return Some(rule.errno.to_errno());
        }
        None
    }
}
