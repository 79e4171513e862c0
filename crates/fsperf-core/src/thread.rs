//! Worker threads executing one TestCase in lock-step.

use crate::config::{BenchConfig, ShuffleMode};
use crate::coord::HostCoordinator;
use crate::error::Result;
use crate::ops::{OpSamples, Primitive, wall_clock};
use crate::sync::ThreadSync;
use crate::testcase::TestCase;
use crate::workload::{Namespace, Workload, gen_temp_dir};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Raw outcome of one worker for one TestCase.
///
/// `sync_timestamps[0]` is the release of the start barrier and
/// `sync_timestamps[k + 1]` the release of the barrier after operation `k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadResult {
    /// Rank of the owning process.
    pub host_id: usize,
    pub process_id: u32,
    pub thread_id: usize,
    pub sync_timestamps: Vec<f64>,
    pub operations: Vec<OpSamples>,
}

/// Aborts the crew's barrier when a worker leaves early, panics included.
struct AbortGuard<'a> {
    sync: &'a ThreadSync,
    armed: bool,
}

impl Drop for AbortGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.sync.abort();
        }
    }
}

/// Shared state every worker of one TestCase borrows.
#[derive(Debug, Clone, Copy)]
pub struct Crew<'a> {
    pub config: &'a BenchConfig,
    pub case: &'a TestCase,
    pub sync: &'a ThreadSync,
    pub coordinator: &'a HostCoordinator,
}

/// One worker: a private workload driven through the TestCase's operations.
#[derive(Debug)]
pub struct BenchThread<'a> {
    id: usize,
    crew: Crew<'a>,
}

impl<'a> BenchThread<'a> {
    pub fn new(id: usize, crew: Crew<'a>) -> Self {
        Self { id, crew }
    }

    /// Run the TestCase to completion.
    ///
    /// On failure the shared barrier is aborted so the other workers stop
    /// at their next rendezvous instead of waiting for this one.
    pub fn run(self) -> Result<ThreadResult> {
        let mut guard = AbortGuard {
            sync: self.crew.sync,
            armed: true,
        };
        let result = self.execute();
        guard.armed = result.is_err();
        result
    }

    fn execute(&self) -> Result<ThreadResult> {
        let Crew { config, case, .. } = self.crew;
        let root = gen_temp_dir(&config.base_dir, &format!("t{}", self.id));
        let mut workload = Workload::build(root, &case.env, config.io_files);
        workload.setup()?;

        let outcome = self.drive(&mut workload);

        if config.keep {
            debug!(thread = self.id, root = %workload.root().display(), "Keeping workload");
        } else if let Err(err) = workload.cleanup() {
            warn!(thread = self.id, error = %err, "Workload cleanup failed");
        }
        outcome
    }

    fn drive(&self, workload: &mut Workload) -> Result<ThreadResult> {
        let Crew { config, case, .. } = self.crew;
        let mut rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(
                seed ^ case.id.rotate_left(17) ^ (self.id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15),
            ),
            None => ChaCha8Rng::from_os_rng(),
        };

        self.rendezvous()?;
        let mut sync_timestamps = Vec::with_capacity(case.ops.len() + 1);
        sync_timestamps.push(wall_clock());

        let mut namespace = Namespace::default();
        let mut operations = Vec::with_capacity(case.ops.len());
        for &op in &case.ops {
            let set = namespace.apply(op)?;
            if !op.creates_targets() && config.shuffle != ShuffleMode::None {
                workload.shuffle_files(config.shuffle, config.shuffle_round, &mut rng);
            }

            let primitive = Primitive::bind(op, &case.env, config, rng.random());
            let samples = primitive.execute(workload.targets(set))?;
            debug!(
                thread = self.id,
                %op,
                calls = samples.result.op_count,
                elapsed = samples.result.total_elapsed,
                "Operation finished"
            );
            operations.push(samples);

            self.rendezvous()?;
            sync_timestamps.push(wall_clock());
        }

        Ok(ThreadResult {
            host_id: self.crew.coordinator.rank(),
            process_id: std::process::id(),
            thread_id: self.id,
            sync_timestamps,
            operations,
        })
    }

    /// Local barrier; with peers, the round's leader also meets the other hosts.
    fn rendezvous(&self) -> Result<()> {
        let coordinator = self.crew.coordinator;
        if coordinator.size() > 1 {
            self.crew.sync.barrier_with(|| coordinator.barrier())
        } else {
            self.crew.sync.barrier()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::OpKind;
    use crate::testcase::TestEnv;
    use tempfile::TempDir;

    fn config(base: &std::path::Path) -> BenchConfig {
        BenchConfig {
            seed: Some(7),
            ..BenchConfig::new(base)
        }
    }

    #[test]
    fn test_single_thread_meta_case() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path());
        let case = TestCase::new(
            TestEnv::meta(1, 20, 4),
            vec![OpKind::Mkdir, OpKind::Creat, OpKind::StatExist, OpKind::Unlink, OpKind::Rmdir],
        )
        .unwrap();
        let sync = ThreadSync::new(1);
        let coordinator = HostCoordinator::single();
        let crew = Crew { config: &config, case: &case, sync: &sync, coordinator: &coordinator };

        let result = BenchThread::new(0, crew).run().unwrap();

        assert_eq!(result.operations.len(), 5);
        assert_eq!(result.sync_timestamps.len(), 6);
        assert!(result.sync_timestamps.windows(2).all(|w| w[0] <= w[1]));
        for samples in &result.operations {
            assert_eq!(samples.result.op_count, 20);
        }
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_keep_leaves_workload() {
        let tmp = TempDir::new().unwrap();
        let config = BenchConfig {
            keep: true,
            shuffle: ShuffleMode::Random,
            ..config(tmp.path())
        };
        let case = TestCase::new(TestEnv::io(1, 16384, 4096), vec![OpKind::Write, OpKind::Read]).unwrap();
        let sync = ThreadSync::new(1);
        let coordinator = HostCoordinator::single();
        let crew = Crew { config: &config, case: &case, sync: &sync, coordinator: &coordinator };

        let result = BenchThread::new(3, crew).run().unwrap();

        assert_eq!(result.thread_id, 3);
        assert_eq!(result.operations[1].result.op_count, 4);
        let kept: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_failure_aborts_the_crew() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path());
        // Reading files that were never written fails on open.
        let case = TestCase {
            id: 1,
            env: TestEnv::io(2, 8192, 4096),
            ops: vec![OpKind::Read],
        };
        let sync = ThreadSync::new(2);
        let coordinator = HostCoordinator::single();
        let crew = Crew { config: &config, case: &case, sync: &sync, coordinator: &coordinator };

        let results: Vec<Result<ThreadResult>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|id| s.spawn(move || BenchThread::new(id, crew).run()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.iter().all(Result::is_err));
        assert!(sync.is_aborted());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }
}
