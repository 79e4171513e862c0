//! Result output: terminal tables, progress and JSON export.

pub mod format;
pub mod printer;
pub mod progress;

pub use format::{format_latency, format_ops, format_rate, format_size, format_throughput};
pub use printer::ReportPrinter;
pub use progress::CaseProgress;

use fsperf_core::aggregate::{AggregateRecord, HostSummary};
use fsperf_core::ops::OpKind;
use fsperf_core::{BenchConfig, TestCaseReport, TestEnv, ThreadResult};
use serde::Serialize;
use std::path::Path;

/// JSON-serializable benchmark report
#[derive(Debug, Clone, Serialize)]
pub struct FsperfReport<'a> {
    pub metadata: ReportMetadata,
    pub config: &'a BenchConfig,
    pub cases: Vec<CaseJson<'a>>,
}

/// Report metadata
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub timestamp: String,
    pub platform: String,
    pub fsperf_version: String,
    pub hostname: String,
    /// Number of cooperating processes.
    pub ranks: usize,
}

/// One TestCase in the JSON report
#[derive(Debug, Clone, Serialize)]
pub struct CaseJson<'a> {
    pub id: u64,
    pub env: TestEnv,
    pub ops: &'a [OpKind],
    pub records: &'a [AggregateRecord],
    pub hosts: &'a [HostSummary],
    /// Raw samples of this process's threads (with --raw)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<&'a [ThreadResult]>,
}

impl<'a> CaseJson<'a> {
    pub fn from_report(report: &'a TestCaseReport, raw: bool) -> Self {
        Self {
            id: report.case.id,
            env: report.case.env,
            ops: &report.case.ops,
            records: &report.records,
            hosts: &report.hosts,
            threads: raw.then_some(report.threads.as_slice()),
        }
    }
}

/// Export results to JSON file
pub fn export_json(
    reports: &[TestCaseReport],
    config: &BenchConfig,
    ranks: usize,
    raw: bool,
    path: &Path,
) -> anyhow::Result<()> {
    let report = FsperfReport {
        metadata: ReportMetadata {
            timestamp: chrono::Utc::now().to_rfc3339(),
            platform: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            fsperf_version: env!("CARGO_PKG_VERSION").to_string(),
            hostname: fsperf_core::workload::hostname(),
            ranks,
        },
        config,
        cases: reports.iter().map(|r| CaseJson::from_report(r, raw)).collect(),
    };

    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(path, json)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsperf_core::{HostCoordinator, Runner};
    use tempfile::TempDir;

    fn run_small(base: &Path) -> (BenchConfig, Vec<TestCaseReport>) {
        let config = BenchConfig {
            opcnt_range: vec![5],
            factor_range: vec![2],
            meta_ops: vec![OpKind::Mkdir, OpKind::StatExist, OpKind::Rmdir],
            ..BenchConfig::new(base)
        };
        let runner = Runner::new(config, HostCoordinator::single());
        let reports = runner.run().unwrap();
        (runner.config().clone(), reports)
    }

    #[test]
    fn test_export_json() {
        let tmp = TempDir::new().unwrap();
        let (config, reports) = run_small(tmp.path());
        let path = tmp.path().join("out.json");

        export_json(&reports, &config, 1, false, &path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["metadata"]["ranks"], 1);
        assert_eq!(value["config"]["mode"], "meta");
        let case = &value["cases"][0];
        assert_eq!(case["env"]["opcnt"], 5);
        assert_eq!(case["ops"][1], "stat_EXIST");
        assert!(case.get("threads").is_none());
        // 3 thread + 3 host + 3 global records
        assert_eq!(case["records"].as_array().unwrap().len(), 9);
    }

    #[test]
    fn test_export_json_with_raw_samples() {
        let tmp = TempDir::new().unwrap();
        let (config, reports) = run_small(tmp.path());
        let path = tmp.path().join("raw.json");

        export_json(&reports, &config, 1, true, &path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let latencies = &value["cases"][0]["threads"][0]["operations"][0]["latencies"];
        assert_eq!(latencies.as_array().unwrap().len(), 5);
    }
}
