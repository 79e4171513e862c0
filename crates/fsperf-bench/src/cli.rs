//! Command-line interface.

// Allow CLI-specific patterns
#![allow(clippy::struct_excessive_bools)]

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use fsperf_core::{BenchConfig, IoFlags, Mode, OpKind, ShuffleMode, SyncWindow};
use std::io::IsTerminal;
use std::path::PathBuf;

/// Concurrent filesystem metadata and I/O benchmark.
///
/// Every worker thread runs the same ordered operation list on its own
/// private namespace; threads (and, under a launcher, processes on other
/// hosts) meet at a barrier after each operation.
#[derive(Parser, Debug)]
#[command(name = "fsperf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory on the filesystem under test.
    #[arg(value_name = "DIR", env = "FSPERF_BASE_DIR")]
    pub base_dir: PathBuf,

    /// Benchmark mode.
    ///
    /// Valid values: meta, io, all
    #[arg(short = 'm', long, default_value = "meta")]
    pub mode: Mode,

    /// Worker threads per process.
    #[arg(short = 'n', long, default_value_t = 1, env = "FSPERF_NPROC")]
    pub nproc: usize,

    /// File sizes for I/O cases (comma-separated, e.g. 64KiB,1MiB).
    #[arg(long, value_delimiter = ',', default_value = "1MiB", value_parser = parse_size)]
    pub fsize: Vec<u64>,

    /// Block sizes for I/O cases (comma-separated, e.g. 4k,64k).
    #[arg(long, value_delimiter = ',', default_value = "4KiB", value_parser = parse_size)]
    pub blksize: Vec<u64>,

    /// Operations per thread for metadata cases (comma-separated).
    #[arg(long, value_delimiter = ',', default_value = "1000")]
    pub opcnt: Vec<usize>,

    /// Directory tree fan-out for metadata cases (comma-separated).
    #[arg(long, value_delimiter = ',', default_value = "16")]
    pub factor: Vec<usize>,

    /// Metadata operations, in execution order.
    ///
    /// Valid values: mkdir, rmdir, creat, open, open_close, access,
    /// stat_EXIST (or stat), stat_NONEXIST, utime, chmod, rename, unlink
    #[arg(long = "meta-ops", value_delimiter = ',', value_name = "OPS")]
    pub meta_ops: Vec<OpKind>,

    /// I/O operations, in execution order.
    ///
    /// Valid values: write, rewrite, read, reread, randwrite, randread,
    /// fwrite, frewrite, fread, freread
    #[arg(long = "io-ops", value_delimiter = ',', value_name = "OPS")]
    pub io_ops: Vec<OpKind>,

    /// Files per thread for I/O cases.
    #[arg(long, default_value_t = 1)]
    pub io_files: usize,

    /// Open files with O_SYNC.
    #[arg(long)]
    pub syncio: bool,

    /// Fsync written files before closing them.
    #[arg(long)]
    pub fsync: bool,

    /// Count open latency into the elapsed time of I/O operations.
    #[arg(long)]
    pub opentime: bool,

    /// Count close (and fsync) latency into the elapsed time of I/O operations.
    #[arg(long)]
    pub closetime: bool,

    /// Reorder the file list before operations that do not create it.
    ///
    /// Valid values: none, random, round
    #[arg(long, default_value = "none")]
    pub shuffle: ShuffleMode,

    /// Rotation step (and count) for round shuffling.
    #[arg(long, default_value_t = 1)]
    pub shuffle_round: usize,

    /// Seconds to pause between TestCases.
    #[arg(long, default_value_t = 0.0)]
    pub sleep: f64,

    /// Seed for shuffles and random offsets.
    #[arg(long, env = "FSPERF_SEED")]
    pub seed: Option<u64>,

    /// How host and global windows are measured.
    ///
    /// Valid values: average (mean per-actor window), span (first start to last end)
    #[arg(long, default_value = "average")]
    pub sync_window: SyncWindow,

    /// Print the TestCase plan and exit.
    #[arg(long)]
    pub dry_run: bool,

    /// Leave workload trees in place.
    #[arg(long)]
    pub keep: bool,

    /// Export results to JSON file.
    #[arg(long, value_name = "PATH")]
    pub json: Option<PathBuf>,

    /// Include raw per-call latencies of this process in the JSON export.
    #[arg(long, requires = "json")]
    pub raw: bool,

    /// Inbound coordination stream (path or fd:N).
    #[arg(long, value_name = "STREAM")]
    pub coord_in: Option<String>,

    /// Outbound coordination stream (path or fd:N).
    #[arg(long, value_name = "STREAM")]
    pub coord_out: Option<String>,

    /// Disable colored output.
    #[arg(long, conflicts_with = "color")]
    pub no_color: bool,

    /// Force colored output (even when not a TTY).
    #[arg(long, conflicts_with = "no_color")]
    pub color: bool,

    /// Verbose output (-v info, -vv debug).
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// --color forces it on, --no-color forces it off.
    pub fn use_color(&self) -> bool {
        self.color || (!self.no_color && supports_color())
    }

    /// Build the immutable run configuration.
    pub fn into_config(self) -> Result<BenchConfig> {
        if self.base_dir.exists() && !self.base_dir.is_dir() {
            bail!("Base path is not a directory: {}", self.base_dir.display());
        }

        let mut config = BenchConfig::new(self.base_dir);
        config.mode = self.mode;
        config.nproc = self.nproc;
        config.fsize_range = self.fsize;
        config.blksize_range = self.blksize;
        config.opcnt_range = self.opcnt;
        config.factor_range = self.factor;
        if !self.meta_ops.is_empty() {
            config.meta_ops = self.meta_ops;
        }
        if !self.io_ops.is_empty() {
            config.io_ops = self.io_ops;
        }
        config.io_files = self.io_files;
        config.io = IoFlags {
            syncio: self.syncio,
            fsync: self.fsync,
            opentime: self.opentime,
            closetime: self.closetime,
        };
        config.shuffle = self.shuffle;
        config.shuffle_round = self.shuffle_round;
        config.sleep_secs = self.sleep;
        config.seed = self.seed;
        config.sync_window = self.sync_window;
        config.dryrun = self.dry_run;
        config.keep = self.keep;

        config.validate().context("Invalid benchmark configuration")?;
        Ok(config)
    }
}

/// Parse a byte count.
///
/// Plain numbers are bytes. `k`/`m`/`g`/`t` and the `KiB`-style suffixes are
/// powers of 1024; `KB`-style suffixes are powers of 1000. Case-insensitive.
pub fn parse_size(input: &str) -> std::result::Result<u64, String> {
    let input = input.trim();
    if let Ok(bytes) = input.parse::<u64>() {
        return Ok(bytes);
    }

    let split = input
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .ok_or_else(|| format!("Invalid size: {input}"))?;
    let (number, suffix) = input.split_at(split);
    if number.is_empty() {
        return Err(format!("No number found in: {input}"));
    }
    let value: f64 = number
        .parse()
        .map_err(|_| format!("Invalid number: {number}"))?;

    let multiplier: u64 = match suffix.trim().to_ascii_uppercase().as_str() {
        "B" => 1,
        "K" | "KI" | "KIB" => 1 << 10,
        "M" | "MI" | "MIB" => 1 << 20,
        "G" | "GI" | "GIB" => 1 << 30,
        "T" | "TI" | "TIB" => 1 << 40,
        "KB" => 1_000,
        "MB" => 1_000_000,
        "GB" => 1_000_000_000,
        "TB" => 1_000_000_000_000,
        _ => {
            return Err(format!(
                "Unknown size suffix: {suffix}. Valid options: k/KiB, m/MiB, g/GiB, t/TiB, KB, MB, GB, TB"
            ));
        }
    };

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let bytes = (value * multiplier as f64).round() as u64;
    Ok(bytes)
}

fn supports_color() -> bool {
    // https://no-color.org/
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }
    std::io::stdout().is_terminal()
}
