//! Benchmark configuration.
//!
//! A [`BenchConfig`] is built once by the front end, validated, and then
//! owned by the runner, which lends it read-only to every worker.

use crate::error::{BenchError, Result};
use crate::ops::OpKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which families of TestCases the plan contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Metadata operations over a generated directory tree.
    #[default]
    Meta,
    /// Block I/O over per-thread files.
    Io,
    /// Metadata plan followed by the I/O plan.
    All,
}

impl Mode {
    pub fn includes_meta(self) -> bool {
        matches!(self, Self::Meta | Self::All)
    }

    pub fn includes_io(self) -> bool {
        matches!(self, Self::Io | Self::All)
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "meta" | "metadata" => Ok(Self::Meta),
            "io" | "data" => Ok(Self::Io),
            "all" | "both" => Ok(Self::All),
            _ => Err(format!("Unknown mode: {s}. Valid options: meta, io, all")),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Meta => write!(f, "meta"),
            Self::Io => write!(f, "io"),
            Self::All => write!(f, "all"),
        }
    }
}

/// How a thread reorders its flat file list before follow-up operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShuffleMode {
    #[default]
    None,
    Random,
    Round,
}

impl FromStr for ShuffleMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "random" => Ok(Self::Random),
            "round" => Ok(Self::Round),
            _ => Err(format!("Unknown shuffle mode: {s}. Valid options: none, random, round")),
        }
    }
}

impl fmt::Display for ShuffleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Random => write!(f, "random"),
            Self::Round => write!(f, "round"),
        }
    }
}

/// How the cross-actor synchronization window of an operation is derived
/// from barrier timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncWindow {
    /// Mean of each actor's own `end - start`.
    #[default]
    Average,
    /// Wall-clock span: latest end minus earliest start.
    Span,
}

impl FromStr for SyncWindow {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "average" | "avg" | "mean" => Ok(Self::Average),
            "span" | "wallclock" => Ok(Self::Span),
            _ => Err(format!("Unknown sync window: {s}. Valid options: average, span")),
        }
    }
}

impl fmt::Display for SyncWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Average => write!(f, "average"),
            Self::Span => write!(f, "span"),
        }
    }
}

/// Flags shaping the I/O primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct IoFlags {
    /// Open files with `O_SYNC`.
    pub syncio: bool,
    /// `fsync` written files before closing them.
    pub fsync: bool,
    /// Count open latency into the operation's total elapsed time.
    pub opentime: bool,
    /// Count close (and fsync) latency into the operation's total elapsed time.
    pub closetime: bool,
}

/// Complete, validated configuration for one benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct BenchConfig {
    /// Directory on the filesystem under test that hosts all workloads.
    pub base_dir: PathBuf,
    pub mode: Mode,
    /// Worker threads per process.
    pub nproc: usize,
    /// File sizes in bytes (I/O plans).
    pub fsize_range: Vec<u64>,
    /// Block sizes in bytes (I/O plans).
    pub blksize_range: Vec<u64>,
    /// Operation counts per thread (metadata plans).
    pub opcnt_range: Vec<usize>,
    /// Directory tree fan-out (metadata plans).
    pub factor_range: Vec<usize>,
    pub meta_ops: Vec<OpKind>,
    pub io_ops: Vec<OpKind>,
    /// Files per thread in I/O plans.
    pub io_files: usize,
    pub io: IoFlags,
    pub shuffle: ShuffleMode,
    pub shuffle_round: usize,
    /// Pause between TestCases, in seconds.
    pub sleep_secs: f64,
    /// Seed for shuffles and random offset walks. `None` draws from the OS.
    pub seed: Option<u64>,
    pub sync_window: SyncWindow,
    pub dryrun: bool,
    /// Leave workload trees in place after each TestCase.
    pub keep: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            base_dir: std::env::temp_dir(),
            mode: Mode::Meta,
            nproc: 1,
            fsize_range: vec![1024 * 1024],
            blksize_range: vec![4096],
            opcnt_range: vec![1000],
            factor_range: vec![16],
            meta_ops: OpKind::default_meta_ops(),
            io_ops: OpKind::default_io_ops(),
            io_files: 1,
            io: IoFlags::default(),
            shuffle: ShuffleMode::None,
            shuffle_round: 1,
            sleep_secs: 0.0,
            seed: None,
            sync_window: SyncWindow::Average,
            dryrun: false,
            keep: false,
        }
    }
}

impl BenchConfig {
    /// Create a configuration rooted at `base_dir` with default ranges.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn sleep(&self) -> Duration {
        Duration::from_secs_f64(self.sleep_secs.max(0.0))
    }

    /// Check the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.nproc == 0 {
            return Err(BenchError::invalid("nproc must be at least 1"));
        }
        if !self.sleep_secs.is_finite() || self.sleep_secs < 0.0 {
            return Err(BenchError::invalid("sleep must be a non-negative number of seconds"));
        }

        if self.mode.includes_meta() {
            if self.meta_ops.is_empty() {
                return Err(BenchError::invalid("no metadata operations selected"));
            }
            if let Some(op) = self.meta_ops.iter().find(|op| !op.is_meta()) {
                return Err(BenchError::invalid(format!("{op} is not a metadata operation")));
            }
            non_empty_positive("opcnt", &self.opcnt_range)?;
            non_empty_positive("factor", &self.factor_range)?;
        }

        if self.mode.includes_io() {
            if self.io_ops.is_empty() {
                return Err(BenchError::invalid("no I/O operations selected"));
            }
            if let Some(op) = self.io_ops.iter().find(|op| op.is_meta()) {
                return Err(BenchError::invalid(format!("{op} is not an I/O operation")));
            }
            non_empty_positive("fsize", &self.fsize_range)?;
            non_empty_positive("blksize", &self.blksize_range)?;
            if self.io_files == 0 {
                return Err(BenchError::invalid("io_files must be at least 1"));
            }
        }

        if self.shuffle == ShuffleMode::Round && self.shuffle_round == 0 {
            return Err(BenchError::invalid("round shuffle needs shuffle_round >= 1"));
        }

        Ok(())
    }
}

fn non_empty_positive<T>(name: &str, values: &[T]) -> Result<()>
where
    T: Copy + Default + PartialOrd + fmt::Display,
{
    if values.is_empty() {
        return Err(BenchError::invalid(format!("{name} range is empty")));
    }
    if let Some(v) = values.iter().find(|&&v| v <= T::default()) {
        return Err(BenchError::invalid(format!("{name} values must be positive, got {v}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        BenchConfig::default().validate().unwrap();
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("meta".parse::<Mode>().unwrap(), Mode::Meta);
        assert_eq!("IO".parse::<Mode>().unwrap(), Mode::Io);
        assert_eq!("both".parse::<Mode>().unwrap(), Mode::All);
        assert!("disk".parse::<Mode>().is_err());
    }

    #[test]
    fn test_rejects_zero_threads() {
        let config = BenchConfig {
            nproc: 0,
            ..BenchConfig::default()
        };
        assert!(matches!(config.validate(), Err(BenchError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_io_op_in_meta_list() {
        let config = BenchConfig {
            meta_ops: vec![OpKind::Mkdir, OpKind::Read],
            ..BenchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_factor() {
        let config = BenchConfig {
            factor_range: vec![4, 0],
            ..BenchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_io_ranges_ignored_in_meta_mode() {
        let config = BenchConfig {
            fsize_range: Vec::new(),
            ..BenchConfig::default()
        };
        config.validate().unwrap();

        let config = BenchConfig {
            mode: Mode::Io,
            ..config
        };
        assert!(config.validate().is_err());
    }
}
