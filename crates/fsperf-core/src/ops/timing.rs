//! Per-call latency recording.

use crate::ops::{OpKind, OpSamples, OperationResult};
use quanta::Clock;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Process-wide TSC-backed clock; calibration happens once.
fn clock() -> &'static Clock {
    static CLOCK: OnceLock<Clock> = OnceLock::new();
    CLOCK.get_or_init(Clock::new)
}

/// Seconds since the Unix epoch.
///
/// Used for start/end and barrier timestamps, which have to be comparable
/// across threads and hosts. Latencies use the monotonic clock instead.
pub fn wall_clock() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

/// Collects the latency of every timed call made by one primitive invocation.
#[derive(Debug)]
pub struct Recorder {
    op: OpKind,
    latencies: Vec<f64>,
    /// Timed time outside the per-call samples (open/close when requested).
    overhead: f64,
    start_time: f64,
}

impl Recorder {
    pub fn new(op: OpKind, capacity: usize) -> Self {
        Self {
            op,
            latencies: Vec::with_capacity(capacity),
            overhead: 0.0,
            start_time: wall_clock(),
        }
    }

    /// Time exactly one call and keep its latency as a sample.
    #[inline]
    pub fn time<T, E>(&mut self, call: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let clock = clock();
        let start = clock.raw();
        let out = call();
        let end = clock.raw();
        self.latencies.push(clock.delta(start, end).as_secs_f64());
        out
    }

    /// Time a call that counts toward the total but is not a sample.
    pub fn time_overhead<T, E>(&mut self, call: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
        let clock = clock();
        let start = clock.raw();
        let out = call();
        let end = clock.raw();
        self.overhead += clock.delta(start, end).as_secs_f64();
        out
    }

    pub fn op(&self) -> OpKind {
        self.op
    }

    /// Close the recording; `unit_work` is the work one call performs.
    pub fn finish(self, unit_work: f64) -> OpSamples {
        let (min, max) = if self.latencies.is_empty() {
            (0.0, 0.0)
        } else {
            self.latencies
                .iter()
                .fold((f64::INFINITY, 0.0_f64), |(lo, hi), &l| (lo.min(l), hi.max(l)))
        };
        let total = self.latencies.iter().sum::<f64>() + self.overhead;

        OpSamples {
            result: OperationResult {
                op: self.op,
                op_count: self.latencies.len() as u64,
                min_latency: min,
                max_latency: max,
                total_elapsed: total,
                start_time: self.start_time,
                end_time: wall_clock(),
            },
            latencies: self.latencies,
            unit_work,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_result_invariants_hold() {
        let mut rec = Recorder::new(OpKind::StatExist, 3);
        for ms in [1, 3, 2] {
            rec.time(|| {
                std::thread::sleep(Duration::from_millis(ms));
                Ok::<_, ()>(())
            })
            .unwrap();
        }
        let samples = rec.finish(1.0);
        let r = &samples.result;

        assert_eq!(r.op_count, 3);
        assert_eq!(samples.latencies.len(), 3);
        assert!(0.0 <= r.min_latency && r.min_latency <= r.max_latency);
        assert!(r.total_elapsed >= r.max_latency);
        assert!(r.max_latency >= 0.003);
        assert!(r.end_time >= r.start_time);
    }

    #[test]
    fn test_overhead_counts_in_total_only() {
        let mut rec = Recorder::new(OpKind::Write, 1);
        rec.time_overhead(|| {
            std::thread::sleep(Duration::from_millis(5));
            Ok::<_, ()>(())
        })
        .unwrap();
        rec.time(|| Ok::<_, ()>(())).unwrap();
        let samples = rec.finish(4096.0);

        assert_eq!(samples.result.op_count, 1);
        assert!(samples.result.total_elapsed >= 0.005);
        assert!(samples.result.max_latency < samples.result.total_elapsed);
        assert!((samples.total_work() - 4096.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failed_call_propagates() {
        let mut rec = Recorder::new(OpKind::Unlink, 1);
        let out: Result<(), &str> = rec.time(|| Err("boom"));
        assert_eq!(out, Err("boom"));
    }

    #[test]
    fn test_empty_recording() {
        let samples = Recorder::new(OpKind::Mkdir, 0).finish(1.0);
        assert_eq!(samples.result.op_count, 0);
        assert!(samples.result.min_latency.abs() < f64::EPSILON);
    }
}
