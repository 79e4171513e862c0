//! fsperf - command-line front end for the fsperf-core engine.
//!
//! Builds one immutable [`fsperf_core::BenchConfig`] from the command line,
//! discovers this process's place among cooperating ranks, and renders the
//! results: tables on the terminal of rank 0, optionally a JSON file.

pub mod cli;
pub mod report;

pub use cli::Cli;
