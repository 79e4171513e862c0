//! fsperf-core - concurrent execution engine for filesystem benchmarks.
//!
//! Drives synthetic metadata and I/O workloads through a fixed set of
//! filesystem operations, timing every individual call, and reduces the
//! samples into thread, host and global throughput records.
//!
//! The pieces, leaves first:
//!
//! - [`workload`] builds the per-thread directory tree and file lists
//! - [`ops`] holds one timed primitive per filesystem action
//! - [`sync`] is the generation-counted barrier that keeps worker threads in lock-step
//! - [`thread`] runs one worker's ordered operation list
//! - [`coord`] is the cross-process rendezvous (barrier, broadcast, consistency check)
//! - [`aggregate`] reduces raw samples into [`aggregate::AggregateRecord`]s
//! - [`runner`] ties a [`config::BenchConfig`] plan to all of the above

pub mod aggregate;
pub mod config;
pub mod coord;
pub mod error;
pub mod ops;
pub mod runner;
pub mod sync;
pub mod testcase;
pub mod thread;
pub mod workload;

pub use aggregate::{AggregateRecord, HostSummary, Level};
pub use config::{BenchConfig, IoFlags, Mode, ShuffleMode, SyncWindow};
pub use coord::HostCoordinator;
pub use error::{BenchError, Result};
pub use ops::{OpKind, OperationResult};
pub use runner::{Runner, TestCaseReport};
pub use testcase::{TestCase, TestEnv, build_plan};
pub use thread::ThreadResult;
