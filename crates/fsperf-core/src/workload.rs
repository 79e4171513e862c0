//! Workload generation.
//!
//! Each worker thread owns a private namespace under its own temp dir: a
//! bounded-fanout directory tree for `mkdir`/`rmdir` and a flat file list
//! for everything else. Nothing is shared between threads, so the
//! filesystem under test never sees contention caused by the harness.

use crate::config::ShuffleMode;
use crate::error::{BenchError, Result};
use crate::ops::{OpKind, Targets};
use crate::testcase::{OpType, TestEnv};
use rand::Rng;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

/// A directory name that cannot collide across hosts, processes or calls.
///
/// Built from the host name, the process id and a random salt so that
/// cooperating processes never need to agree on names.
pub fn gen_temp_dir(base: &Path, tag: &str) -> PathBuf {
    let salt: u32 = rand::random();
    base.join(format!(
        "fsperf.{}.{}.{tag}.{salt:08x}",
        hostname(),
        std::process::id()
    ))
}

/// Host name with path separators and dots flattened.
pub fn hostname() -> String {
    nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().replace(['/', '.'], "_"))
        .unwrap_or_else(|_| "localhost".to_string())
}

/// Bounded-fanout tree of `num` directories under `root`.
///
/// Parents are taken from a FIFO queue seeded with `root`; every `factor`
/// children the next parent is popped. Each parent precedes its children in
/// the result, so the list is a valid creation order and its reverse a
/// valid deletion order.
pub fn gen_dirs(root: &Path, num: usize, factor: usize) -> Vec<PathBuf> {
    let factor = factor.max(1);
    let mut queue = VecDeque::from([root.to_path_buf()]);
    let mut dirs = Vec::with_capacity(num);
    let mut parent = root.to_path_buf();
    let mut level = 0usize;

    for i in 0..num {
        if i % factor == 0 {
            // Every pop is preceded by at least `factor` pushes.
            if let Some(next) = queue.pop_front() {
                parent = next;
            }
            level += 1;
        }
        let child = parent.join(format!("d{level}.{i}"));
        queue.push_back(child.clone());
        dirs.push(child);
    }

    dirs
}

/// Flat list `root/<i>.dat` for `i` in `0..num`.
pub fn gen_files(root: &Path, num: usize) -> Vec<PathBuf> {
    (0..num).map(|i| root.join(format!("{i}.dat"))).collect()
}

/// Reorder `list` in place according to `mode`.
///
/// `Round` rotates left by `round` positions, `round` times.
pub fn shuffle<T, R: Rng + ?Sized>(list: &mut [T], mode: ShuffleMode, round: usize, rng: &mut R) {
    if list.len() < 2 {
        return;
    }
    match mode {
        ShuffleMode::None => {}
        ShuffleMode::Random => {
            use rand::seq::SliceRandom;
            list.shuffle(rng);
        }
        ShuffleMode::Round => {
            let step = round % list.len();
            for _ in 0..round {
                list.rotate_left(step);
            }
        }
    }
}

/// Which of a workload's path lists an operation acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSet {
    Dirs,
    Files,
}

/// Tracks which entries exist while an operation list runs.
///
/// Operations that act on "whatever exists" (stat, access, chmod, utime,
/// rename) prefer the files when they are live and fall back to the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Namespace {
    dirs: bool,
    files: bool,
}

impl Namespace {
    /// Target set for `op` in the current state, if it has one.
    pub fn targets(&self, op: OpKind) -> Option<TargetSet> {
        match op {
            OpKind::Mkdir => (!self.dirs).then_some(TargetSet::Dirs),
            OpKind::Rmdir => self.dirs.then_some(TargetSet::Dirs),
            OpKind::Creat => Some(TargetSet::Files),
            OpKind::Open | OpKind::OpenClose | OpKind::Unlink => {
                self.files.then_some(TargetSet::Files)
            }
            op if op.targets_live_entries() => {
                if self.files {
                    Some(TargetSet::Files)
                } else if self.dirs {
                    Some(TargetSet::Dirs)
                } else {
                    None
                }
            }
            _ => Some(TargetSet::Files),
        }
    }

    /// Resolve the targets of `op` and record its effect on the namespace.
    pub fn apply(&mut self, op: OpKind) -> Result<TargetSet> {
        let set = self.targets(op).ok_or_else(|| {
            BenchError::invalid(format!("{op} has no existing entries to act on at this point"))
        })?;
        match op {
            OpKind::Mkdir => self.dirs = true,
            OpKind::Rmdir => self.dirs = false,
            OpKind::Creat => self.files = true,
            OpKind::Unlink => self.files = false,
            _ => {}
        }
        Ok(set)
    }
}

/// The private namespace of one worker thread for one TestCase.
#[derive(Debug, Clone)]
pub struct Workload {
    root: PathBuf,
    dirs: Vec<PathBuf>,
    files: Vec<PathBuf>,
}

impl Workload {
    /// Generate the paths for `env` under `root`; nothing touches disk yet.
    pub fn build(root: PathBuf, env: &TestEnv, io_files: usize) -> Self {
        let (dirs, files) = match env.optype {
            OpType::Meta => {
                let num = env.opcnt.unwrap_or(0);
                let factor = env.factor.unwrap_or(1);
                (gen_dirs(&root, num, factor), gen_files(&root, num))
            }
            OpType::Io => (Vec::new(), gen_files(&root, io_files)),
        };
        Self { root, dirs, files }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn targets(&self, set: TargetSet) -> Targets<'_> {
        match set {
            TargetSet::Dirs => Targets::dirs(&self.dirs),
            TargetSet::Files => Targets::files(&self.files),
        }
    }

    /// Shuffle the flat file list; the tree keeps its creation order.
    pub fn shuffle_files<R: Rng + ?Sized>(&mut self, mode: ShuffleMode, round: usize, rng: &mut R) {
        shuffle(&mut self.files, mode, round, rng);
    }

    /// Create the workload root.
    pub fn setup(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| BenchError::syscall("setup", &self.root, e))
    }

    /// Remove the workload root and anything left below it.
    pub fn cleanup(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BenchError::syscall("cleanup", &self.root, e)),
        }
    }
}
