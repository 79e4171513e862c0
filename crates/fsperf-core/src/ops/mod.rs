//! Timed filesystem operation primitives.
//!
//! Every primitive acts once per target (metadata) or once per block (I/O)
//! and times each individual call on its own, never a batch. The raw
//! per-call latencies travel alongside the summarising [`OperationResult`]
//! so the aggregator can build throughput distributions from them.

// Allow numeric casts: block counts and offsets move between u64, usize and f64.
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

mod io;
mod meta;
mod timing;

pub use timing::{Recorder, wall_clock};

use crate::config::{BenchConfig, IoFlags};
use crate::error::Result;
use crate::testcase::TestEnv;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Name of a filesystem operation as it appears in operation lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    #[serde(rename = "mkdir")]
    Mkdir,
    #[serde(rename = "rmdir")]
    Rmdir,
    #[serde(rename = "creat")]
    Creat,
    #[serde(rename = "open")]
    Open,
    #[serde(rename = "open_close")]
    OpenClose,
    #[serde(rename = "access")]
    Access,
    #[serde(rename = "stat_EXIST", alias = "stat")]
    StatExist,
    #[serde(rename = "stat_NONEXIST")]
    StatNonexist,
    #[serde(rename = "utime")]
    Utime,
    #[serde(rename = "chmod")]
    Chmod,
    #[serde(rename = "rename")]
    Rename,
    #[serde(rename = "unlink")]
    Unlink,
    #[serde(rename = "write")]
    Write,
    #[serde(rename = "rewrite")]
    Rewrite,
    #[serde(rename = "read")]
    Read,
    #[serde(rename = "reread")]
    Reread,
    #[serde(rename = "randwrite")]
    RandWrite,
    #[serde(rename = "randread")]
    RandRead,
    #[serde(rename = "fwrite")]
    FWrite,
    #[serde(rename = "frewrite")]
    FRewrite,
    #[serde(rename = "fread")]
    FRead,
    #[serde(rename = "freread")]
    FReread,
}

impl OpKind {
    pub const ALL: [Self; 22] = [
        Self::Mkdir,
        Self::Rmdir,
        Self::Creat,
        Self::Open,
        Self::OpenClose,
        Self::Access,
        Self::StatExist,
        Self::StatNonexist,
        Self::Utime,
        Self::Chmod,
        Self::Rename,
        Self::Unlink,
        Self::Write,
        Self::Rewrite,
        Self::Read,
        Self::Reread,
        Self::RandWrite,
        Self::RandRead,
        Self::FWrite,
        Self::FRewrite,
        Self::FRead,
        Self::FReread,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Mkdir => "mkdir",
            Self::Rmdir => "rmdir",
            Self::Creat => "creat",
            Self::Open => "open",
            Self::OpenClose => "open_close",
            Self::Access => "access",
            Self::StatExist => "stat_EXIST",
            Self::StatNonexist => "stat_NONEXIST",
            Self::Utime => "utime",
            Self::Chmod => "chmod",
            Self::Rename => "rename",
            Self::Unlink => "unlink",
            Self::Write => "write",
            Self::Rewrite => "rewrite",
            Self::Read => "read",
            Self::Reread => "reread",
            Self::RandWrite => "randwrite",
            Self::RandRead => "randread",
            Self::FWrite => "fwrite",
            Self::FRewrite => "frewrite",
            Self::FRead => "fread",
            Self::FReread => "freread",
        }
    }

    /// Metadata operations move no file content.
    pub fn is_meta(self) -> bool {
        matches!(
            self,
            Self::Mkdir
                | Self::Rmdir
                | Self::Creat
                | Self::Open
                | Self::OpenClose
                | Self::Access
                | Self::StatExist
                | Self::StatNonexist
                | Self::Utime
                | Self::Chmod
                | Self::Rename
                | Self::Unlink
        )
    }

    pub fn is_writer(self) -> bool {
        matches!(
            self,
            Self::Write | Self::Rewrite | Self::RandWrite | Self::FWrite | Self::FRewrite
        )
    }

    pub fn is_reader(self) -> bool {
        matches!(
            self,
            Self::Read | Self::Reread | Self::RandRead | Self::FRead | Self::FReread
        )
    }

    /// Operations that bring their targets into existence.
    ///
    /// Everything else is a follow-up and gets the thread's shuffle applied
    /// to its file list first.
    pub fn creates_targets(self) -> bool {
        matches!(
            self,
            Self::Mkdir | Self::Creat | Self::Write | Self::FWrite | Self::RandWrite
        )
    }

    /// Operations that act on whichever entries currently exist, files or
    /// directories.
    pub fn targets_live_entries(self) -> bool {
        matches!(
            self,
            Self::Access
                | Self::StatExist
                | Self::StatNonexist
                | Self::Utime
                | Self::Chmod
                | Self::Rename
        )
    }

    pub fn default_meta_ops() -> Vec<Self> {
        vec![
            Self::Mkdir,
            Self::Creat,
            Self::Access,
            Self::Open,
            Self::OpenClose,
            Self::StatExist,
            Self::StatNonexist,
            Self::Utime,
            Self::Chmod,
            Self::Rename,
            Self::Unlink,
            Self::Rmdir,
        ]
    }

    pub fn default_io_ops() -> Vec<Self> {
        vec![
            Self::Write,
            Self::Rewrite,
            Self::Read,
            Self::Reread,
            Self::RandRead,
            Self::RandWrite,
        ]
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OpKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == "stat" {
            return Ok(Self::StatExist);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.name() == s)
            .ok_or_else(|| {
                let valid: Vec<_> = Self::ALL.iter().map(|op| op.name()).collect();
                format!("Unknown operation: {s}. Valid options: {}", valid.join(", "))
            })
    }
}

/// Summary of one primitive invocation. All times are in seconds.
///
/// `op_count` equals the number of calls made, `0 <= min_latency <= max_latency`
/// and `total_elapsed >= max_latency`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub op: OpKind,
    pub op_count: u64,
    pub min_latency: f64,
    pub max_latency: f64,
    pub total_elapsed: f64,
    pub start_time: f64,
    pub end_time: f64,
}

/// An [`OperationResult`] together with the raw samples it summarises.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpSamples {
    pub result: OperationResult,
    /// Latency of every individual call, in call order.
    pub latencies: Vec<f64>,
    /// Work done by one call: 1 for metadata, bytes per block for I/O.
    pub unit_work: f64,
}

impl OpSamples {
    pub fn total_work(&self) -> f64 {
        self.unit_work * self.latencies.len() as f64
    }
}

/// Paths a primitive acts on.
#[derive(Debug, Clone, Copy)]
pub struct Targets<'a> {
    pub paths: &'a [PathBuf],
    /// Whether the paths are directories (chooses chmod bits).
    pub dirs: bool,
}

impl<'a> Targets<'a> {
    pub fn files(paths: &'a [PathBuf]) -> Self {
        Self { paths, dirs: false }
    }

    pub fn dirs(paths: &'a [PathBuf]) -> Self {
        Self { paths, dirs: true }
    }
}

/// File and block geometry for the I/O primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoParams {
    pub fsize: u64,
    pub blksize: u64,
    pub flags: IoFlags,
}

impl IoParams {
    /// Whole blocks per file; a trailing partial block is not touched.
    pub fn blocks(&self) -> u64 {
        self.fsize / self.blksize
    }
}

/// Direction of a data transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    Read,
    Write,
}

/// One executable filesystem action with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Primitive {
    Mkdir,
    Rmdir,
    Creat,
    /// Open read-only; the close is timed only when `timed_close` is set.
    Open { timed_close: bool },
    Access,
    Stat,
    /// Stat a sibling path that is expected to be absent.
    StatMissing,
    Utime,
    Chmod,
    Rename,
    Unlink,
    /// Sequential block transfer, unbuffered or through a userspace buffer.
    Sequential {
        kind: OpKind,
        transfer: Transfer,
        buffered: bool,
        io: IoParams,
    },
    /// Positioned transfers over a seeded permutation of block offsets.
    Random {
        kind: OpKind,
        transfer: Transfer,
        io: IoParams,
        seed: u64,
    },
}

impl Primitive {
    /// Bind `kind` to the parameters of `env`.
    ///
    /// `seed` feeds the random-offset walk and the write payload.
    pub fn bind(kind: OpKind, env: &TestEnv, config: &BenchConfig, seed: u64) -> Self {
        let io = IoParams {
            fsize: env.fsize.unwrap_or(0),
            blksize: env.blksize.unwrap_or(1).max(1),
            flags: config.io,
        };
        let sequential = |transfer, buffered| Self::Sequential {
            kind,
            transfer,
            buffered,
            io,
        };

        match kind {
            OpKind::Mkdir => Self::Mkdir,
            OpKind::Rmdir => Self::Rmdir,
            OpKind::Creat => Self::Creat,
            OpKind::Open => Self::Open { timed_close: false },
            OpKind::OpenClose => Self::Open { timed_close: true },
            OpKind::Access => Self::Access,
            OpKind::StatExist => Self::Stat,
            OpKind::StatNonexist => Self::StatMissing,
            OpKind::Utime => Self::Utime,
            OpKind::Chmod => Self::Chmod,
            OpKind::Rename => Self::Rename,
            OpKind::Unlink => Self::Unlink,
            OpKind::Write | OpKind::Rewrite => sequential(Transfer::Write, false),
            OpKind::Read | OpKind::Reread => sequential(Transfer::Read, false),
            OpKind::FWrite | OpKind::FRewrite => sequential(Transfer::Write, true),
            OpKind::FRead | OpKind::FReread => sequential(Transfer::Read, true),
            OpKind::RandWrite => Self::Random {
                kind,
                transfer: Transfer::Write,
                io,
                seed,
            },
            OpKind::RandRead => Self::Random {
                kind,
                transfer: Transfer::Read,
                io,
                seed,
            },
        }
    }

    pub fn kind(&self) -> OpKind {
        match self {
            Self::Mkdir => OpKind::Mkdir,
            Self::Rmdir => OpKind::Rmdir,
            Self::Creat => OpKind::Creat,
            Self::Open { timed_close: false } => OpKind::Open,
            Self::Open { timed_close: true } => OpKind::OpenClose,
            Self::Access => OpKind::Access,
            Self::Stat => OpKind::StatExist,
            Self::StatMissing => OpKind::StatNonexist,
            Self::Utime => OpKind::Utime,
            Self::Chmod => OpKind::Chmod,
            Self::Rename => OpKind::Rename,
            Self::Unlink => OpKind::Unlink,
            Self::Sequential { kind, .. } | Self::Random { kind, .. } => *kind,
        }
    }

    /// Run the action over `targets` and return its timed samples.
    ///
    /// Any OS error other than the expected miss of [`Primitive::StatMissing`]
    /// is returned as [`crate::BenchError::Syscall`].
    pub fn execute(&self, targets: Targets<'_>) -> Result<OpSamples> {
        let op = self.kind();
        match self {
            Self::Sequential {
                transfer,
                buffered,
                io: params,
                ..
            } => {
                let mut rec = Recorder::new(op, targets.paths.len() * params.blocks() as usize);
                for path in targets.paths {
                    io::sequential(&mut rec, path, *transfer, *buffered, params)?;
                }
                Ok(rec.finish(params.blksize as f64))
            }
            Self::Random {
                transfer,
                io: params,
                seed,
                ..
            } => {
                let mut rec = Recorder::new(op, targets.paths.len() * params.blocks() as usize);
                for (index, path) in targets.paths.iter().enumerate() {
                    io::random(&mut rec, path, *transfer, params, seed.wrapping_add(index as u64))?;
                }
                Ok(rec.finish(params.blksize as f64))
            }
            meta_op => {
                let mut rec = Recorder::new(op, targets.paths.len());
                meta::run(meta_op, &mut rec, targets)?;
                Ok(rec.finish(1.0))
            }
        }
    }
}
