//! Three-level reduction of raw samples: thread, host, global.
//!
//! Every level reports two different throughputs and keeps them apart:
//! the statistics (`min/max/avg/std`) of a distribution, and an `aggregate`
//! computed from total work over elapsed time. With uneven latencies the
//! two differ widely.

// Sample counts and nanosecond values are converted to f64 throughout.
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]

use crate::config::SyncWindow;
use crate::ops::{OpKind, OpSamples};
use crate::thread::ThreadResult;
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Thread,
    Host,
    Global,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Thread => "thread",
            Self::Host => "host",
            Self::Global => "global",
        };
        write!(f, "{s}")
    }
}

/// Latency percentiles of one thread's calls, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// One reduced result, keyed by `(level, operation, key)`.
///
/// Throughputs are in operations/s for metadata and bytes/s for I/O.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub level: Level,
    pub operation: OpKind,
    /// Parameter tuple of the TestCase, e.g. `opcnt=100,factor=16`.
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub host: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub thread: Option<usize>,
    /// Size of the distribution the statistics were taken over.
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub std: f64,
    pub aggregate: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub latency: Option<LatencyPercentiles>,
}

impl AggregateRecord {
    pub fn unit(&self) -> &'static str {
        if self.operation.is_meta() { "ops/s" } else { "B/s" }
    }
}

/// Summary statistics of a distribution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Spread {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    /// Population standard deviation.
    pub std: f64,
}

impl Spread {
    pub fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        Self {
            count: values.len(),
            min,
            max,
            avg: values.mean(),
            std: values.population_std_dev(),
        }
    }
}

/// Total work over elapsed seconds, zero when no time has passed.
fn rate(work: f64, elapsed: f64) -> f64 {
    if elapsed > 0.0 { work / elapsed } else { 0.0 }
}

/// Thread-level reduction of one operation's samples.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadReduction {
    pub spread: Spread,
    pub aggregate: f64,
    pub work: f64,
    pub latency: Option<LatencyPercentiles>,
}

/// Reduce one operation's per-call latencies.
///
/// Exact-zero samples (below clock resolution) are replaced by the mean
/// latency before the per-call throughputs `unit_work / latency` are taken.
pub fn reduce_thread(samples: &OpSamples) -> ThreadReduction {
    let latencies = &samples.latencies;
    let work = samples.total_work();
    if latencies.is_empty() {
        return ThreadReduction {
            spread: Spread::default(),
            aggregate: 0.0,
            work,
            latency: None,
        };
    }

    let mean = latencies.mean();
    let adjusted: Vec<f64> = latencies
        .iter()
        .map(|&l| if l == 0.0 { mean } else { l })
        .collect();
    let elapsed: f64 = adjusted.iter().sum();

    let per_call: Vec<f64> = adjusted
        .iter()
        .map(|&l| rate(samples.unit_work, l))
        .collect();

    ThreadReduction {
        spread: Spread::of(&per_call),
        aggregate: rate(work, elapsed),
        work,
        latency: percentiles(&adjusted),
    }
}

/// Longest latency the histogram resolves (one hour, in nanoseconds).
const MAX_TRACKED_NS: u64 = 3_600_000_000_000;

fn percentiles(latencies: &[f64]) -> Option<LatencyPercentiles> {
    let mut hist = Histogram::<u64>::new_with_bounds(1, MAX_TRACKED_NS, 3).ok()?;
    for &l in latencies {
        hist.saturating_record(((l * 1e9) as u64).max(1));
    }
    let at = |q: f64| hist.value_at_quantile(q) as f64 / 1e9;
    Some(LatencyPercentiles {
        p50: at(0.50),
        p95: at(0.95),
        p99: at(0.99),
    })
}

/// Thread records for every thread and operation of one TestCase.
pub fn thread_records(key: &str, threads: &[ThreadResult]) -> Vec<AggregateRecord> {
    threads
        .iter()
        .flat_map(|t| {
            t.operations.iter().map(move |samples| {
                let reduced = reduce_thread(samples);
                AggregateRecord {
                    level: Level::Thread,
                    operation: samples.result.op,
                    key: key.to_string(),
                    host: Some(t.host_id),
                    thread: Some(t.thread_id),
                    count: reduced.spread.count,
                    min: reduced.spread.min,
                    max: reduced.spread.max,
                    avg: reduced.spread.avg,
                    std: reduced.spread.std,
                    aggregate: reduced.aggregate,
                    latency: reduced.latency,
                }
            })
        })
        .collect()
}

/// Width of the synchronized window spanned by `(start, end)` pairs.
pub fn sync_window(spans: &[(f64, f64)], mode: SyncWindow) -> f64 {
    if spans.is_empty() {
        return 0.0;
    }
    match mode {
        SyncWindow::Average => {
            spans.iter().map(|(start, end)| end - start).sum::<f64>() / spans.len() as f64
        }
        SyncWindow::Span => {
            let start = spans.iter().map(|s| s.0).fold(f64::INFINITY, f64::min);
            let end = spans.iter().map(|s| s.1).fold(f64::NEG_INFINITY, f64::max);
            end - start
        }
    }
}

/// One operation's host-level result, as exchanged between ranks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostOpSummary {
    pub operation: OpKind,
    /// Spread of the threads' aggregate throughputs.
    pub spread: Spread,
    pub aggregate: f64,
    /// Total work done by all threads of the host.
    pub work: f64,
    pub window: f64,
    /// Earliest barrier release before the operation.
    pub start: f64,
    /// Latest barrier release after the operation.
    pub end: f64,
}

/// Everything a host contributes to the global reduction of one TestCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSummary {
    pub host: usize,
    pub hostname: String,
    pub key: String,
    pub threads: usize,
    pub operations: Vec<HostOpSummary>,
}

impl HostSummary {
    /// Combine the threads of one host.
    ///
    /// The window of operation `k` is taken from each thread's barrier
    /// timestamps `ts[k]` and `ts[k + 1]`, not from the samples, so skew
    /// between threads counts against the host.
    pub fn from_threads(
        host: usize,
        hostname: &str,
        key: &str,
        threads: &[ThreadResult],
        mode: SyncWindow,
    ) -> Self {
        let op_count = threads.iter().map(|t| t.operations.len()).min().unwrap_or(0);

        let operations = (0..op_count)
            .map(|k| {
                let reduced: Vec<ThreadReduction> =
                    threads.iter().map(|t| reduce_thread(&t.operations[k])).collect();
                let aggregates: Vec<f64> = reduced.iter().map(|r| r.aggregate).collect();
                let work: f64 = reduced.iter().map(|r| r.work).sum();
                let spans: Vec<(f64, f64)> = threads
                    .iter()
                    .filter_map(|t| Some((*t.sync_timestamps.get(k)?, *t.sync_timestamps.get(k + 1)?)))
                    .collect();
                let window = sync_window(&spans, mode);

                HostOpSummary {
                    operation: threads[0].operations[k].result.op,
                    spread: Spread::of(&aggregates),
                    aggregate: rate(work, window),
                    work,
                    window,
                    start: spans.iter().map(|s| s.0).fold(f64::INFINITY, f64::min),
                    end: spans.iter().map(|s| s.1).fold(f64::NEG_INFINITY, f64::max),
                }
            })
            .collect();

        Self {
            host,
            hostname: hostname.to_string(),
            key: key.to_string(),
            threads: threads.len(),
            operations,
        }
    }

    pub fn records(&self) -> Vec<AggregateRecord> {
        self.operations
            .iter()
            .map(|op| AggregateRecord {
                level: Level::Host,
                operation: op.operation,
                key: self.key.clone(),
                host: Some(self.host),
                thread: None,
                count: op.spread.count,
                min: op.spread.min,
                max: op.spread.max,
                avg: op.spread.avg,
                std: op.spread.std,
                aggregate: op.aggregate,
                latency: None,
            })
            .collect()
    }
}

/// Combine the rank-ordered host summaries of one TestCase.
///
/// Same reduction as one level down: the spread is over the hosts'
/// aggregates, the aggregate is total work over the cross-host window.
/// `Average` takes the mean of the hosts' own windows; `Span` runs from
/// the earliest host start to the latest host end.
pub fn global_records(hosts: &[HostSummary], mode: SyncWindow) -> Vec<AggregateRecord> {
    let Some(first) = hosts.first() else {
        return Vec::new();
    };
    let op_count = hosts.iter().map(|h| h.operations.len()).min().unwrap_or(0);

    (0..op_count)
        .map(|k| {
            let ops: Vec<&HostOpSummary> = hosts.iter().map(|h| &h.operations[k]).collect();
            let aggregates: Vec<f64> = ops.iter().map(|o| o.aggregate).collect();
            let work: f64 = ops.iter().map(|o| o.work).sum();
            let window = match mode {
                SyncWindow::Average => ops.iter().map(|o| o.window).sum::<f64>() / ops.len() as f64,
                SyncWindow::Span => {
                    let spans: Vec<(f64, f64)> = ops.iter().map(|o| (o.start, o.end)).collect();
                    sync_window(&spans, SyncWindow::Span)
                }
            };
            let spread = Spread::of(&aggregates);

            AggregateRecord {
                level: Level::Global,
                operation: ops[0].operation,
                key: first.key.clone(),
                host: None,
                thread: None,
                count: spread.count,
                min: spread.min,
                max: spread.max,
                avg: spread.avg,
                std: spread.std,
                aggregate: rate(work, window),
                latency: None,
            }
        })
        .collect()
}
