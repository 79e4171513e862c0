//! End-to-end runs of the engine against a scratch directory.
//!
//! Each test builds a configuration, runs it on a single process and checks
//! the raw samples and reduced records.

use fsperf_core::aggregate::reduce_thread;
use fsperf_core::ops::{Primitive, Targets};
use fsperf_core::workload::gen_files;
use fsperf_core::{
    BenchConfig, HostCoordinator, Level, Mode, OpKind, Runner, ShuffleMode, SyncWindow, TestEnv,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_metadata_lockstep_four_threads() {
    let tmp = TempDir::new().unwrap();
    let config = BenchConfig {
        nproc: 4,
        opcnt_range: vec![100],
        factor_range: vec![16],
        meta_ops: vec![OpKind::Mkdir, OpKind::StatExist, OpKind::Rmdir],
        seed: Some(1),
        ..BenchConfig::new(tmp.path())
    };
    let reports = Runner::new(config, HostCoordinator::single()).run().unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];

    assert_eq!(report.threads.len(), 4);
    for thread in &report.threads {
        let counts: Vec<(OpKind, u64)> = thread
            .operations
            .iter()
            .map(|s| (s.result.op, s.result.op_count))
            .collect();
        assert_eq!(counts, vec![
            (OpKind::Mkdir, 100),
            (OpKind::StatExist, 100),
            (OpKind::Rmdir, 100),
        ]);
        for samples in &thread.operations {
            let r = &samples.result;
            assert!(0.0 <= r.min_latency && r.min_latency <= r.max_latency);
            assert!(r.total_elapsed >= r.max_latency);
            assert!(r.start_time <= r.end_time);
        }
    }

    let host_stat = report
        .records
        .iter()
        .find(|r| r.level == Level::Host && r.operation == OpKind::StatExist)
        .unwrap();
    assert_eq!(host_stat.count, 4);
    assert!(host_stat.aggregate > 0.0);
    assert!(host_stat.min <= host_stat.avg && host_stat.avg <= host_stat.max);

    for record in report.records.iter().filter(|r| r.level == Level::Thread) {
        assert_eq!(record.count, 100);
        assert!(record.min <= record.avg && record.avg <= record.max);
    }

    // Workloads are removed after the TestCase.
    assert!(listing(tmp.path()).is_empty());
}

#[test]
fn test_sequential_io_matches_raw_latencies() {
    let tmp = TempDir::new().unwrap();
    let config = BenchConfig {
        mode: Mode::Io,
        fsize_range: vec![1024 * 1024],
        blksize_range: vec![4096],
        io_ops: vec![OpKind::Write, OpKind::Read],
        ..BenchConfig::new(tmp.path())
    };
    let reports = Runner::new(config, HostCoordinator::single()).run().unwrap();
    let report = &reports[0];
    let thread = &report.threads[0];

    for samples in &thread.operations {
        assert_eq!(samples.result.op_count, 256);
        assert_eq!(samples.latencies.len(), 256);
    }

    let write = &thread.operations[0];
    let mean = write.latencies.iter().sum::<f64>() / 256.0;
    let elapsed: f64 = write
        .latencies
        .iter()
        .map(|&l| if l == 0.0 { mean } else { l })
        .sum();
    let expected = 256.0 * 4096.0 / elapsed;

    let recorded = report
        .records
        .iter()
        .find(|r| r.level == Level::Thread && r.operation == OpKind::Write)
        .unwrap();
    assert_eq!(recorded.unit(), "B/s");
    assert!(((recorded.aggregate - expected) / expected).abs() < 1e-6);
    assert!((reduce_thread(write).aggregate - recorded.aggregate).abs() <= f64::EPSILON * expected);
}

#[test]
fn test_rename_restores_listing() {
    let tmp = TempDir::new().unwrap();
    let files = gen_files(tmp.path(), 3);
    for file in &files {
        fs::write(file, b"").unwrap();
    }
    let before = listing(tmp.path());

    let config = BenchConfig::new(tmp.path());
    let rename = Primitive::bind(OpKind::Rename, &TestEnv::meta(1, 3, 1), &config, 0);
    let samples = rename.execute(Targets::files(&files)).unwrap();

    assert_eq!(samples.result.op_count, 3);
    assert_eq!(listing(tmp.path()), before);
}

#[test]
fn test_aggregate_differs_from_mean_when_uneven() {
    let tmp = TempDir::new().unwrap();
    let config = BenchConfig {
        mode: Mode::Io,
        fsize_range: vec![256 * 1024],
        blksize_range: vec![4096],
        io_ops: vec![OpKind::Write, OpKind::RandRead],
        ..BenchConfig::new(tmp.path())
    };
    let reports = Runner::new(config, HostCoordinator::single()).run().unwrap();

    for record in reports[0].records.iter().filter(|r| r.level == Level::Thread) {
        // The harmonic aggregate never exceeds the arithmetic mean.
        assert!(record.aggregate <= record.avg * (1.0 + 1e-9), "{record:?}");
        assert!(record.latency.is_some());
    }
}

#[test]
fn test_full_plan_with_shuffles_and_span_window() {
    let tmp = TempDir::new().unwrap();
    let config = BenchConfig {
        mode: Mode::All,
        nproc: 2,
        opcnt_range: vec![30],
        factor_range: vec![4],
        meta_ops: vec![
            OpKind::Mkdir,
            OpKind::Creat,
            OpKind::Open,
            OpKind::OpenClose,
            OpKind::Access,
            OpKind::StatExist,
            OpKind::StatNonexist,
            OpKind::Utime,
            OpKind::Chmod,
            OpKind::Rename,
            OpKind::Unlink,
            OpKind::Rmdir,
        ],
        fsize_range: vec![64 * 1024],
        blksize_range: vec![4096, 16384],
        io_ops: vec![
            OpKind::Write,
            OpKind::Rewrite,
            OpKind::Read,
            OpKind::Reread,
            OpKind::RandWrite,
            OpKind::RandRead,
            OpKind::FWrite,
            OpKind::FRewrite,
            OpKind::FRead,
            OpKind::FReread,
        ],
        io_files: 2,
        shuffle: ShuffleMode::Round,
        shuffle_round: 2,
        sync_window: SyncWindow::Span,
        seed: Some(99),
        ..BenchConfig::new(tmp.path())
    };
    let mut seen = 0;
    let reports = Runner::new(config, HostCoordinator::single())
        .run_with(|_, _| seen += 1)
        .unwrap();

    assert_eq!(reports.len(), 3);
    assert_eq!(seen, 3);
    assert_eq!(reports[1].case.env.key(), "fsize=65536,blksize=4096");
    for thread in &reports[1].threads {
        // 2 files x 16 blocks
        assert!(thread.operations.iter().all(|s| s.result.op_count == 32));
    }
    for report in &reports {
        assert!(report.global().all(|r| r.aggregate > 0.0));
    }
    assert!(listing(tmp.path()).is_empty());
}
