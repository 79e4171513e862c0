//! Error taxonomy for benchmark runs.
//!
//! Every variant is fatal to the run. The one tolerated failure, a `stat` on a
//! deliberately absent path, never becomes a `BenchError`: `stat_NONEXIST`
//! absorbs it as an ordinary sample.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the engine.
pub type Result<T> = std::result::Result<T, BenchError>;

#[derive(Error, Debug)]
pub enum BenchError {
    /// Cooperating processes built different TestCases for the same slot.
    #[error("TestCase id mismatch: rank {rank} has {remote}, local id is {local}")]
    ConfigurationMismatch { rank: usize, local: u64, remote: u64 },

    /// Unexpected OS error inside a timed operation.
    #[error("{op} failed on {}: {source}", path.display())]
    Syscall {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A barrier was torn down because another participant failed.
    #[error("Barrier aborted by a failing participant")]
    Aborted,

    #[error("Coordination stream error: {0}")]
    Coordination(#[source] io::Error),

    #[error("Coordination protocol error: {0}")]
    Protocol(String),

    #[error("Worker thread {0} panicked")]
    ThreadPanicked(usize),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl BenchError {
    /// Wrap an OS error raised by `op` on `path`.
    pub fn syscall(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Syscall {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// True for errors that mean "someone else failed first".
    ///
    /// The runner prefers reporting the original failure over the `Aborted`
    /// echoes it causes in the other workers.
    pub fn is_secondary(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

impl From<serde_json::Error> for BenchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}
