// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use anyhow::{bail, Context, Result};
use blake3::Hasher;
use clap::{Args, Parser, Subcommand};
use fstree_core::{
    are_fs_equal, compare_records, fault::FaultPolicySummary, read_records, CaseSensitivity,
    CreateRequest, DeleteRequest, Errno, EqualityReport, FaultPolicy, FsOps, FsTree, MemFs,
    NodeId, NodeRecord, NodeType, Outcome, PurgeReport, RenameRequest, SetAttrs, TreeConfig,
    TreeError, ValidationReport,
};
use rand::{rngs::SmallRng, seq::SliceRandom, Rng, SeedableRng};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

const MAX_DEPTH: usize = 5;

fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => {
            let context = run_workload(args)?;
            if let Some(path) = context.json_output.clone() {
                serde_json::to_writer_pretty(
                    File::create(&path)
                        .with_context(|| format!("failed to create {}", path.display()))?,
                    &context.report,
                )?;
            }
            write_json_to_stdout(&context.report)?;
            if context.report.status != "passed" {
                bail!("stress run failed");
            }
        }
        Command::Compare(args) => {
            let report = compare_files(&args)?;
            write_json_to_stdout(&report)?;
            if !report.equal {
                bail!(
                    "{} and {} differ",
                    args.model.display(),
                    args.truth.display()
                );
            }
        }
    }
    Ok(())
}

fn write_json_to_stdout<T: serde::Serialize>(value: &T) -> Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
    out.flush()?;
    Ok(())
}

#[derive(Parser)]
#[command(author, version, about = "Shadow-model stress workload runner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drive the shadow model against the in-memory filesystem
    Run(RunArgs),
    /// Compare two exported model record files
    Compare(CompareArgs),
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Number of worker threads to spawn
    #[arg(long, default_value_t = 8)]
    threads: usize,

    /// Operations each worker performs
    #[arg(long, default_value_t = 500)]
    ops_per_worker: usize,

    /// Seed for the workers' generators; derived from the clock when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Fold names the way case-insensitive volumes do
    #[arg(long)]
    case_insensitive: bool,

    /// Largest single write in KiB
    #[arg(long, default_value_t = 16)]
    max_write_kib: usize,

    /// JSON tree configuration
    #[arg(long)]
    tree_config: Option<PathBuf>,

    /// JSON fault policy applied to the filesystem during the workload
    #[arg(long)]
    fault_policy: Option<PathBuf>,

    /// Optional path for writing the JSON report
    #[arg(long)]
    json_output: Option<PathBuf>,

    /// Optional path for exporting the model's records after the workload
    #[arg(long)]
    model_output: Option<PathBuf>,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            threads: 8,
            ops_per_worker: 500,
            seed: None,
            case_insensitive: false,
            max_write_kib: 16,
            tree_config: None,
            fault_policy: None,
            json_output: None,
            model_output: None,
        }
    }
}

#[derive(Args)]
struct CompareArgs {
    #[arg(long)]
    model: PathBuf,

    #[arg(long)]
    truth: PathBuf,

    #[arg(long)]
    case_insensitive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Create,
    Mkdir,
    Symlink,
    Hardlink,
    Write,
    Truncate,
    Verify,
    Rename,
    Delete,
}

impl Operation {
    fn label(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Mkdir => "mkdir",
            Operation::Symlink => "symlink",
            Operation::Hardlink => "hardlink",
            Operation::Write => "write",
            Operation::Truncate => "truncate",
            Operation::Verify => "verify",
            Operation::Rename => "rename",
            Operation::Delete => "delete",
        }
    }
}

#[derive(Default, Serialize, Clone)]
struct OperationStats {
    create: u64,
    mkdir: u64,
    symlink: u64,
    hardlink: u64,
    write: u64,
    truncate: u64,
    verify: u64,
    rename: u64,
    delete: u64,
}

impl OperationStats {
    fn increment(&mut self, op: Operation) {
        match op {
            Operation::Create => self.create += 1,
            Operation::Mkdir => self.mkdir += 1,
            Operation::Symlink => self.symlink += 1,
            Operation::Hardlink => self.hardlink += 1,
            Operation::Write => self.write += 1,
            Operation::Truncate => self.truncate += 1,
            Operation::Verify => self.verify += 1,
            Operation::Rename => self.rename += 1,
            Operation::Delete => self.delete += 1,
        }
    }

    fn total(&self) -> u64 {
        self.create
            + self.mkdir
            + self.symlink
            + self.hardlink
            + self.write
            + self.truncate
            + self.verify
            + self.rename
            + self.delete
    }
}

impl std::ops::AddAssign<&OperationStats> for OperationStats {
    fn add_assign(&mut self, other: &OperationStats) {
        self.create += other.create;
        self.mkdir += other.mkdir;
        self.symlink += other.symlink;
        self.hardlink += other.hardlink;
        self.write += other.write;
        self.truncate += other.truncate;
        self.verify += other.verify;
        self.rename += other.rename;
        self.delete += other.delete;
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
struct TreeFingerprint {
    digest: String,
    entry_count: u64,
}

#[derive(Serialize, Clone)]
struct FaultSummary {
    policy: FaultPolicySummary,
    injected: u64,
}

#[derive(Serialize, Clone)]
struct CleanupSummary {
    purge: PurgeReport,
    leaked_lookups: u64,
    remaining_inodes: usize,
    pruned_tombstones: usize,
}

#[derive(Serialize, Clone)]
struct RunReport {
    phase: String,
    threads: usize,
    ops_per_worker: usize,
    seed: u64,
    case_sensitivity: CaseSensitivity,
    start_time: String,
    end_time: String,
    operations: OperationStats,
    total_ops: u64,
    benign_errors: HashMap<String, u64>,
    fatal_errors: HashMap<String, u64>,
    faults: Option<FaultSummary>,
    validation: ValidationReport,
    equality: EqualityReport,
    fingerprint: TreeFingerprint,
    cleanup: CleanupSummary,
    status: String,
}

struct RunContext {
    report: RunReport,
    json_output: Option<PathBuf>,
}

fn load_tree_config(args: &RunArgs) -> Result<TreeConfig> {
    let mut config = match &args.tree_config {
        Some(path) => {
            let bytes = fs::read(path)
                .with_context(|| format!("failed to read tree config {}", path.display()))?;
            TreeConfig::from_json_bytes(&bytes)
                .with_context(|| format!("invalid tree config {}", path.display()))?
        }
        None => TreeConfig::default(),
    };
    if args.case_insensitive {
        config.case_sensitivity = CaseSensitivity::InsensitivePreserving;
    }
    Ok(config)
}

fn load_fault_policy(path: &PathBuf) -> Result<FaultPolicy> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read fault policy {}", path.display()))?;
    FaultPolicy::from_json_bytes(&bytes)
        .with_context(|| format!("invalid fault policy {}", path.display()))
}

fn run_workload(args: RunArgs) -> Result<RunContext> {
    let config = load_tree_config(&args)?;
    let seed = args.seed.unwrap_or_else(|| {
        let seed_base = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;
        seed_base ^ ((std::process::id() as u64) << 32)
    });

    let fs = Arc::new(MemFs::new(config.case_sensitivity));
    let ops: Arc<dyn FsOps> = fs.clone();
    let tree = Arc::new(FsTree::new(ops.clone(), config.clone()));

    let faults_active = match &args.fault_policy {
        Some(path) => {
            let policy = load_fault_policy(path)?;
            let active = policy.summary().active;
            fs.faults().set_policy(policy);
            active
        }
        None => false,
    };

    info!(
        "shadow model workload: threads={}, ops_per_worker={}, seed={}, case={:?}, faults={}",
        args.threads, args.ops_per_worker, seed, config.case_sensitivity, faults_active
    );

    let start_time = chrono::Utc::now();
    let mut handles = Vec::with_capacity(args.threads);
    for worker_id in 0..args.threads {
        let worker = Worker {
            id: worker_id,
            tree: tree.clone(),
            ops_budget: args.ops_per_worker,
            max_write: args.max_write_kib.max(1) * 1024,
            faults_active,
            rng_seed: seed ^ (worker_id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15),
        };
        handles.push(std::thread::spawn(move || worker.run()));
    }

    let mut aggregate_stats = OperationStats::default();
    let mut benign_errors: HashMap<String, u64> = HashMap::new();
    let mut fatal_errors: HashMap<String, u64> = HashMap::new();

    for handle in handles {
        match handle.join() {
            Ok(result) => {
                aggregate_stats += &result.stats;
                merge_counts(&mut benign_errors, &result.benign_errors);
                merge_counts(&mut fatal_errors, &result.fatal_errors);
            }
            Err(panic) => {
                let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                *fatal_errors.entry("thread_panic".to_string()).or_insert(0) += 1;
                warn!("worker thread panicked: {}", msg);
            }
        }
    }

    let faults = faults_active.then(|| FaultSummary {
        policy: fs.faults().summary(),
        injected: fs.faults().injected(),
    });
    fs.faults().clear();

    let validation = tree.validate_tree().context("link count validation")?;
    tree.prune();
    let truth = FsTree::build(ops, config.clone()).context("rebuilding the tree")?;
    let equality = are_fs_equal(&tree, &truth);
    let fingerprint = fingerprint_records(&truth.records());
    truth.reclaim_all();

    if let Some(path) = &args.model_output {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        tree.write_records(file)
            .with_context(|| format!("failed to export model to {}", path.display()))?;
    }

    let purge = tree.purge_owned().context("purging test entries")?;
    tree.reclaim_all();
    let cleanup = CleanupSummary {
        purge,
        leaked_lookups: fs.outstanding_lookups(),
        remaining_inodes: fs.inode_count(),
        pruned_tombstones: tree.prune(),
    };
    let end_time = chrono::Utc::now();

    let passed = fatal_errors.is_empty()
        && validation.is_valid()
        && equality.equal
        && cleanup.purge.failed.is_empty()
        && cleanup.leaked_lookups == 0;
    let status = if passed { "passed" } else { "failed" }.to_string();

    let report = RunReport {
        phase: "shadow_model".to_string(),
        threads: args.threads,
        ops_per_worker: args.ops_per_worker,
        seed,
        case_sensitivity: config.case_sensitivity,
        start_time: start_time.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        end_time: end_time.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        operations: aggregate_stats.clone(),
        total_ops: aggregate_stats.total(),
        benign_errors,
        fatal_errors,
        faults,
        validation,
        equality,
        fingerprint,
        cleanup,
        status,
    };

    Ok(RunContext {
        report,
        json_output: args.json_output,
    })
}

fn merge_counts(target: &mut HashMap<String, u64>, source: &HashMap<String, u64>) {
    for (key, value) in source {
        *target.entry(key.clone()).or_insert(0) += value;
    }
}

fn fingerprint_records(records: &[NodeRecord]) -> TreeFingerprint {
    let mut hasher = Hasher::new();
    for record in records {
        hasher.update(record.path.as_bytes());
        hasher.update(b"\0");
        hasher.update(record.node_type.label().as_bytes());
        hasher.update(b"\n");
    }
    TreeFingerprint {
        digest: format!("blake3:{}", hasher.finalize().to_hex()),
        entry_count: records.len() as u64,
    }
}

fn compare_files(args: &CompareArgs) -> Result<EqualityReport> {
    let open = |path: &PathBuf| -> Result<Vec<NodeRecord>> {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        read_records(io::BufReader::new(file))
            .with_context(|| format!("failed to parse {}", path.display()))
    };
    let config = if args.case_insensitive {
        TreeConfig::case_insensitive()
    } else {
        TreeConfig::default()
    };
    Ok(compare_records(&open(&args.model)?, &open(&args.truth)?, &config))
}

struct Worker {
    id: usize,
    tree: Arc<FsTree>,
    ops_budget: usize,
    max_write: usize,
    faults_active: bool,
    rng_seed: u64,
}

struct WorkerResult {
    stats: OperationStats,
    benign_errors: HashMap<String, u64>,
    fatal_errors: HashMap<String, u64>,
}

enum OperationResult {
    Completed,
    Benign { label: String },
    Fatal { label: String, detail: String },
}

/// Entries one worker created and still believes in
struct WorkingSet {
    base: NodeId,
    dirs: Vec<NodeId>,
    entries: Vec<NodeId>,
    seq: u64,
}

impl WorkingSet {
    fn next_name(&mut self, prefix: &str) -> String {
        self.seq += 1;
        format!("{prefix}{:04}", self.seq)
    }

    /// Directories below the worker's own, which may be moved or removed
    fn subdirs(&self) -> Vec<NodeId> {
        self.dirs.iter().copied().filter(|d| *d != self.base).collect()
    }

    fn replace(&mut self, old: NodeId, new: NodeId) {
        for id in self.dirs.iter_mut().chain(self.entries.iter_mut()) {
            if *id == old {
                *id = new;
            }
        }
    }

    fn forget(&mut self, id: NodeId) {
        self.dirs.retain(|d| *d != id);
        self.entries.retain(|e| *e != id);
    }
}

impl Worker {
    fn run(self) -> WorkerResult {
        let mut rng = SmallRng::seed_from_u64(self.rng_seed);
        let mut stats = OperationStats::default();
        let mut benign_errors: HashMap<String, u64> = HashMap::new();
        let mut fatal_errors: HashMap<String, u64> = HashMap::new();

        let dir_name = format!("worker{:02}", self.id);
        let base = match self.tree.create(CreateRequest::directory(dir_name)) {
            Ok(outcome) if outcome.is_ok() => outcome.node,
            Ok(outcome) => {
                warn!("worker {} failed to create its directory: {:?}", self.id, outcome.status);
                None
            }
            Err(err) => {
                warn!("worker {} failed to create its directory: {}", self.id, err);
                None
            }
        };
        let Some(base) = base else {
            fatal_errors.insert("worker_dir_create".into(), 1);
            return WorkerResult {
                stats,
                benign_errors,
                fatal_errors,
            };
        };
        let mut set = WorkingSet {
            base,
            dirs: vec![base],
            entries: Vec::new(),
            seq: 0,
        };

        for _ in 0..self.ops_budget {
            let op = self.pick_operation(&mut rng);
            let result = match op {
                Operation::Create => self.create(&mut rng, &mut set, NodeType::File),
                Operation::Mkdir => self.create(&mut rng, &mut set, NodeType::Directory),
                Operation::Symlink => self.create(&mut rng, &mut set, NodeType::Symlink),
                Operation::Hardlink => self.hardlink(&mut rng, &mut set),
                Operation::Write => self.write(&mut rng, &set),
                Operation::Truncate => self.truncate(&mut rng, &set),
                Operation::Verify => self.verify(&mut rng, &set),
                Operation::Rename => self.rename(&mut rng, &mut set),
                Operation::Delete => self.delete(&mut rng, &mut set),
            };

            match result {
                OperationResult::Completed => stats.increment(op),
                OperationResult::Benign { label } => {
                    *benign_errors.entry(label).or_insert(0) += 1;
                }
                OperationResult::Fatal { label, detail } => {
                    *fatal_errors.entry(label.clone()).or_insert(0) += 1;
                    warn!("worker {} fatal {}: {}", self.id, label, detail);
                }
            }
        }

        WorkerResult {
            stats,
            benign_errors,
            fatal_errors,
        }
    }

    fn pick_operation(&self, rng: &mut SmallRng) -> Operation {
        let bucket = rng.gen_range(0..100);
        match bucket {
            0..=19 => Operation::Create,
            20..=27 => Operation::Mkdir,
            28..=32 => Operation::Symlink,
            33..=40 => Operation::Hardlink,
            41..=60 => Operation::Write,
            61..=65 => Operation::Truncate,
            66..=77 => Operation::Verify,
            78..=88 => Operation::Rename,
            _ => Operation::Delete,
        }
    }

    fn pick_dir(&self, rng: &mut SmallRng, set: &WorkingSet) -> NodeId {
        let shallow: Vec<NodeId> = set
            .dirs
            .iter()
            .copied()
            .filter(|d| {
                self.tree
                    .node(*d)
                    .is_some_and(|n| fstree_core::path::depth(&n.path) < MAX_DEPTH)
            })
            .collect();
        shallow.choose(rng).copied().unwrap_or(set.base)
    }

    fn pick_regular_file(&self, rng: &mut SmallRng, set: &WorkingSet) -> Option<NodeId> {
        let files: Vec<NodeId> = set
            .entries
            .iter()
            .copied()
            .filter(|id| {
                self.tree.node(*id).is_some_and(|n| {
                    n.exists && matches!(n.node_type(), NodeType::File | NodeType::HardLink)
                })
            })
            .collect();
        files.choose(rng).copied()
    }

    fn create(
        &self,
        rng: &mut SmallRng,
        set: &mut WorkingSet,
        node_type: NodeType,
    ) -> OperationResult {
        let op = match node_type {
            NodeType::Directory => Operation::Mkdir,
            NodeType::Symlink => Operation::Symlink,
            NodeType::File | NodeType::HardLink => Operation::Create,
        };
        let dir = self.pick_dir(rng, set);
        let req = match node_type {
            NodeType::Directory => CreateRequest::directory(set.next_name("d")),
            NodeType::Symlink => {
                let target = format!("../target-{:x}", rng.gen::<u32>());
                CreateRequest::symlink(set.next_name("l"), target)
            }
            NodeType::File | NodeType::HardLink => CreateRequest::file(set.next_name("f")),
        };
        match self.tree.create(req.in_dir(dir)) {
            Ok(outcome) => match (outcome.node, outcome.status) {
                (Some(id), Ok(())) => {
                    if node_type == NodeType::Directory {
                        set.dirs.push(id);
                    } else {
                        set.entries.push(id);
                    }
                    OperationResult::Completed
                }
                _ => self.classify_outcome(op, &outcome),
            },
            Err(err) => model_failure(op, err),
        }
    }

    fn hardlink(&self, rng: &mut SmallRng, set: &mut WorkingSet) -> OperationResult {
        let Some(source) = self.pick_regular_file(rng, set) else {
            return OperationResult::Benign {
                label: "hardlink_no_source".into(),
            };
        };
        let dir = self.pick_dir(rng, set);
        let req = CreateRequest::hardlink(set.next_name("h"), source).in_dir(dir);
        match self.tree.create(req) {
            Ok(outcome) => match (outcome.node, outcome.status) {
                (Some(id), Ok(())) => {
                    set.entries.push(id);
                    OperationResult::Completed
                }
                _ => self.classify_outcome(Operation::Hardlink, &outcome),
            },
            Err(err) => model_failure(Operation::Hardlink, err),
        }
    }

    fn write(&self, rng: &mut SmallRng, set: &WorkingSet) -> OperationResult {
        let Some(file) = self.pick_regular_file(rng, set) else {
            return OperationResult::Benign {
                label: "write_no_target".into(),
            };
        };
        let size = self
            .tree
            .node(file)
            .and_then(|n| n.attrs)
            .map(|a| a.size)
            .unwrap_or(0);
        let offset = rng.gen_range(0..=size.saturating_add(4096));
        let len = rng.gen_range(1..=self.max_write);
        match self.tree.write_pattern(file, offset, len) {
            Ok(Ok(_)) => OperationResult::Completed,
            Ok(Err(errno)) => self.classify_errno(Operation::Write, errno),
            Err(err) => model_failure(Operation::Write, err),
        }
    }

    fn truncate(&self, rng: &mut SmallRng, set: &WorkingSet) -> OperationResult {
        let Some(file) = self.pick_regular_file(rng, set) else {
            return OperationResult::Benign {
                label: "truncate_no_target".into(),
            };
        };
        let len = rng.gen_range(0..=self.max_write as u64);
        match self.tree.setattr(file, &SetAttrs::size(len)) {
            Ok(Ok(_)) => OperationResult::Completed,
            Ok(Err(errno)) => self.classify_errno(Operation::Truncate, errno),
            Err(err) => model_failure(Operation::Truncate, err),
        }
    }

    fn verify(&self, rng: &mut SmallRng, set: &WorkingSet) -> OperationResult {
        let Some(file) = self.pick_regular_file(rng, set) else {
            return OperationResult::Benign {
                label: "verify_no_target".into(),
            };
        };
        match self.tree.verify_pattern(file) {
            Ok(Ok(report)) if report.is_clean() => OperationResult::Completed,
            Ok(Ok(report)) => OperationResult::Fatal {
                label: "verify_mismatch".into(),
                detail: format!(
                    "{} bytes differ, first at {:?}",
                    report.mismatches, report.first_mismatch
                ),
            },
            Ok(Err(errno)) => self.classify_errno(Operation::Verify, errno),
            Err(err) => model_failure(Operation::Verify, err),
        }
    }

    fn rename(&self, rng: &mut SmallRng, set: &mut WorkingSet) -> OperationResult {
        let movable_dirs = set.subdirs();
        let source = if !movable_dirs.is_empty() && rng.gen_bool(0.3) {
            movable_dirs.choose(rng).copied()
        } else {
            set.entries.choose(rng).copied()
        };
        let Some(source) = source else {
            return OperationResult::Benign {
                label: "rename_no_source".into(),
            };
        };
        let Some(node) = self.tree.node(source).filter(|n| n.exists) else {
            set.forget(source);
            return OperationResult::Benign {
                label: "rename_stale_source".into(),
            };
        };
        let from_dir = node.parent.unwrap_or(self.tree.root());
        let to_dir = self.pick_dir(rng, set);
        let req = RenameRequest::new(node.name.clone())
            .from_dir(from_dir)
            .to_dir(to_dir)
            .to_name(set.next_name("r"));
        match self.tree.rename(req) {
            Ok(outcome) => match (outcome.node, outcome.status) {
                (Some(new_id), Ok(())) => {
                    set.replace(source, new_id);
                    OperationResult::Completed
                }
                (_, Err(errno)) if errno == Errno::EACCES && node.is_dir() => {
                    OperationResult::Benign {
                        label: "rename_into_own_subtree".into(),
                    }
                }
                _ => self.classify_outcome(Operation::Rename, &outcome),
            },
            Err(err) => model_failure(Operation::Rename, err),
        }
    }

    fn delete(&self, rng: &mut SmallRng, set: &mut WorkingSet) -> OperationResult {
        let removable_dirs = set.subdirs();
        let target = if !removable_dirs.is_empty() && rng.gen_bool(0.2) {
            removable_dirs.choose(rng).copied()
        } else {
            set.entries.choose(rng).copied()
        };
        let Some(target) = target else {
            return OperationResult::Benign {
                label: "delete_no_target".into(),
            };
        };
        match self.tree.delete(DeleteRequest::node(target)) {
            Ok(outcome) if outcome.is_ok() => {
                set.forget(target);
                OperationResult::Completed
            }
            Ok(outcome) => self.classify_outcome(Operation::Delete, &outcome),
            Err(err) => model_failure(Operation::Delete, err),
        }
    }

    fn classify_outcome(&self, op: Operation, outcome: &Outcome) -> OperationResult {
        match outcome.errno() {
            Some(errno) => self.classify_errno(op, errno),
            None => OperationResult::Fatal {
                label: format!("{}_no_node", op.label()),
                detail: "operation succeeded without a node".into(),
            },
        }
    }

    fn classify_errno(&self, op: Operation, errno: Errno) -> OperationResult {
        if errno == Errno::ENOTEMPTY || errno == Errno::EEXIST || errno == Errno::ENOENT {
            return OperationResult::Benign {
                label: format!("{}_{}", op.label(), errno_label(errno)),
            };
        }
        if self.faults_active {
            debug!("worker {} {} hit injected {}", self.id, op.label(), errno);
            return OperationResult::Benign {
                label: format!("{}_injected_{}", op.label(), errno_label(errno)),
            };
        }
        OperationResult::Fatal {
            label: format!("{}_{}", op.label(), errno_label(errno)),
            detail: errno.to_string(),
        }
    }
}

fn model_failure(op: Operation, err: TreeError) -> OperationResult {
    OperationResult::Fatal {
        label: format!("{}_model", op.label()),
        detail: err.to_string(),
    }
}

fn errno_label(errno: Errno) -> String {
    match errno {
        Errno::ENOENT => "enoent".into(),
        Errno::EEXIST => "eexist".into(),
        Errno::ENOTEMPTY => "enotempty".into(),
        Errno::EACCES => "eacces".into(),
        Errno::EIO => "eio".into(),
        Errno::ENOSPC => "enospc".into(),
        Errno::EROFS => "erofs".into(),
        other => format!("errno{}", other.code()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn small_run(seed: u64) -> RunArgs {
        RunArgs {
            threads: 3,
            ops_per_worker: 150,
            seed: Some(seed),
            max_write_kib: 4,
            ..RunArgs::default()
        }
    }

    #[test]
    fn seeded_run_passes_and_cleans_up() {
        let context = run_workload(small_run(7)).unwrap();
        let report = context.report;
        assert_eq!(report.status, "passed", "fatal: {:?}", report.fatal_errors);
        assert!(report.total_ops > 0);
        assert!(report.equality.equal);
        assert_eq!(report.cleanup.leaked_lookups, 0);
        assert_eq!(report.cleanup.remaining_inodes, 1);
    }

    #[test]
    fn case_insensitive_run_passes() {
        let args = RunArgs {
            case_insensitive: true,
            ..small_run(11)
        };
        let report = run_workload(args).unwrap().report;
        assert_eq!(report.status, "passed", "fatal: {:?}", report.fatal_errors);
        assert_eq!(
            report.case_sensitivity,
            CaseSensitivity::InsensitivePreserving
        );
    }

    #[test]
    fn injected_faults_are_tolerated() {
        let dir = tempdir().unwrap();
        let policy = dir.path().join("faults.json");
        fs::write(
            &policy,
            br#"{ "enabled": true, "rules": [
                { "op": "write", "errno": "eio", "start_after": 5, "max_faults": 10 },
                { "op": "create", "errno": "enospc", "start_after": 3, "max_faults": 5 }
            ] }"#,
        )
        .unwrap();
        let args = RunArgs {
            fault_policy: Some(policy),
            ..small_run(3)
        };
        let report = run_workload(args).unwrap().report;
        assert!(report.fatal_errors.is_empty(), "{:?}", report.fatal_errors);
        let faults = report.faults.expect("fault summary");
        assert!(faults.injected > 0);
        assert!(report.equality.equal);
    }

    #[test]
    fn exported_model_compares_equal_to_itself() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("model.json");
        let args = RunArgs {
            model_output: Some(model.clone()),
            ..small_run(5)
        };
        let report = run_workload(args).unwrap().report;
        let equality = compare_files(&CompareArgs {
            model: model.clone(),
            truth: model,
            case_insensitive: false,
        })
        .unwrap();
        assert!(equality.equal);
        assert_eq!(equality.model_entries as u64, report.fingerprint.entry_count);
    }

    #[test]
    fn fingerprint_tracks_paths_and_types() {
        let records = vec![NodeRecord {
            path: "/a".into(),
            node_type: NodeType::File,
            owned: true,
        }];
        let fp1 = fingerprint_records(&records);
        assert_eq!(fp1, fingerprint_records(&records));
        assert_eq!(fp1.entry_count, 1);

        let renamed = vec![NodeRecord {
            path: "/b".into(),
            ..records[0].clone()
        }];
        assert_ne!(fp1.digest, fingerprint_records(&renamed).digest);
    }

    #[test]
    fn unexpected_errnos_are_fatal_without_faults() {
        let worker = Worker {
            id: 0,
            tree: Arc::new(FsTree::new(
                Arc::new(MemFs::default()),
                TreeConfig::default(),
            )),
            ops_budget: 0,
            max_write: 1024,
            faults_active: false,
            rng_seed: 0,
        };
        assert!(matches!(
            worker.classify_errno(Operation::Write, Errno::EIO),
            OperationResult::Fatal { .. }
        ));
        assert!(matches!(
            worker.classify_errno(Operation::Delete, Errno::ENOTEMPTY),
            OperationResult::Benign { .. }
        ));
    }
}
