//! Plan execution: one fixed pool of workers per TestCase, then reduction.

use crate::aggregate::{AggregateRecord, HostSummary, Level, global_records, thread_records};
use crate::config::BenchConfig;
use crate::coord::HostCoordinator;
use crate::error::{BenchError, Result};
use crate::sync::ThreadSync;
use crate::testcase::{TestCase, build_plan};
use crate::thread::{BenchThread, Crew, ThreadResult};
use crate::workload::hostname;
use serde::Serialize;
use std::thread;
use tracing::{debug, info};

/// Everything produced by one completed TestCase.
#[derive(Debug, Clone, Serialize)]
pub struct TestCaseReport {
    pub case: TestCase,
    /// Raw results of this process's workers.
    pub threads: Vec<ThreadResult>,
    /// Host summaries of every rank, in rank order.
    pub hosts: Vec<HostSummary>,
    /// Thread records of this process, host records of every rank, then
    /// the global records.
    pub records: Vec<AggregateRecord>,
}

impl TestCaseReport {
    pub fn global(&self) -> impl Iterator<Item = &AggregateRecord> {
        self.records.iter().filter(|r| r.level == Level::Global)
    }
}

/// Drives a benchmark plan on this process and its peers.
#[derive(Debug)]
pub struct Runner {
    config: BenchConfig,
    coordinator: HostCoordinator,
    hostname: String,
}

impl Runner {
    pub fn new(config: BenchConfig, coordinator: HostCoordinator) -> Self {
        Self {
            config,
            coordinator,
            hostname: hostname(),
        }
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &HostCoordinator {
        &self.coordinator
    }

    /// The TestCases a run would execute, in order.
    pub fn plan(&self) -> Result<Vec<TestCase>> {
        self.config.validate()?;
        build_plan(&self.config)
    }

    /// Execute the whole plan. In dry-run mode nothing runs.
    pub fn run(&self) -> Result<Vec<TestCaseReport>> {
        self.run_with(|_, _| {})
    }

    /// Execute the whole plan, calling `on_case` after each TestCase.
    ///
    /// The first failure ends the run; a TestCase that did not complete
    /// in full yields no report.
    pub fn run_with(
        &self,
        mut on_case: impl FnMut(usize, &TestCaseReport),
    ) -> Result<Vec<TestCaseReport>> {
        let plan = self.plan()?;
        if self.config.dryrun {
            info!(cases = plan.len(), "Dry run, nothing executed");
            return Ok(Vec::new());
        }

        info!(
            cases = plan.len(),
            nproc = self.config.nproc,
            rank = self.coordinator.rank(),
            size = self.coordinator.size(),
            base = %self.config.base_dir.display(),
            "Starting benchmark"
        );

        let mut reports = Vec::with_capacity(plan.len());
        for (index, case) in plan.into_iter().enumerate() {
            if index > 0 && self.config.sleep_secs > 0.0 {
                debug!(secs = self.config.sleep_secs, "Sleeping between TestCases");
                thread::sleep(self.config.sleep());
            }

            let report = self.run_case(case)?;
            on_case(index, &report);
            reports.push(report);
        }
        Ok(reports)
    }

    fn run_case(&self, case: TestCase) -> Result<TestCaseReport> {
        self.coordinator.verify_testcase(case.id)?;
        info!(id = case.id, env = %case.env, ops = case.ops.len(), "Running TestCase");

        let threads = self.spawn_crew(&case)?;

        let key = case.env.key();
        let window = self.config.sync_window;
        let summary =
            HostSummary::from_threads(self.coordinator.rank(), &self.hostname, &key, &threads, window);
        let hosts: Vec<HostSummary> = self.coordinator.exchange(&summary)?;

        let mut records = thread_records(&key, &threads);
        records.extend(hosts.iter().flat_map(HostSummary::records));
        records.extend(global_records(&hosts, window));

        Ok(TestCaseReport {
            case,
            threads,
            hosts,
            records,
        })
    }

    /// Start `nproc` workers together and join them together.
    fn spawn_crew(&self, case: &TestCase) -> Result<Vec<ThreadResult>> {
        let sync = ThreadSync::new(self.config.nproc);
        let crew = Crew {
            config: &self.config,
            case,
            sync: &sync,
            coordinator: &self.coordinator,
        };

        thread::scope(|s| {
            let mut failure: Option<BenchError> = None;
            let mut handles = Vec::with_capacity(self.config.nproc);
            for id in 0..self.config.nproc {
                let spawned = thread::Builder::new()
                    .name(format!("fsperf-{id}"))
                    .spawn_scoped(s, move || BenchThread::new(id, crew).run());
                match spawned {
                    Ok(handle) => handles.push((id, handle)),
                    Err(err) => {
                        sync.abort();
                        failure = Some(BenchError::Io(err));
                        break;
                    }
                }
            }

            let mut results = Vec::with_capacity(handles.len());
            for (id, handle) in handles {
                let err = match handle.join() {
                    Ok(Ok(result)) => {
                        results.push(result);
                        continue;
                    }
                    Ok(Err(err)) => err,
                    Err(_) => BenchError::ThreadPanicked(id),
                };
                failure = Some(match failure.take() {
                    Some(first) if !first.is_secondary() || err.is_secondary() => first,
                    _ => err,
                });
            }

            match failure {
                Some(err) => Err(err),
                None => Ok(results),
            }
        })
    }
}
