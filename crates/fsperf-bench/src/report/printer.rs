//! Terminal output for plans and results.

use crate::report::format::{format_latency, format_rate, format_size};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, presets::UTF8_FULL};
use fsperf_core::testcase::OpType;
use fsperf_core::{AggregateRecord, BenchConfig, Level, TestCase, TestCaseReport};
use owo_colors::OwoColorize;

/// Formats and prints benchmark output.
pub struct ReportPrinter {
    /// Whether color output is enabled.
    color: bool,
}

impl ReportPrinter {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn heading(&self, text: &str) -> String {
        if self.color {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }

    /// One line describing the run about to start.
    pub fn print_banner(&self, config: &BenchConfig, ranks: usize) {
        let title = self.heading("fsperf");
        println!(
            "{title} {} on {} ({} thread(s) x {} rank(s), window: {})",
            config.mode,
            config.base_dir.display(),
            config.nproc,
            ranks,
            config.sync_window
        );
        println!();
    }

    /// Print the TestCase plan without running it.
    pub fn print_plan(&self, plan: &[TestCase]) {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(
            ["#", "Id", "Type", "Parameters", "Operations"]
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );

        for (index, case) in plan.iter().enumerate() {
            let ops: Vec<&str> = case.ops.iter().map(|op| op.name()).collect();
            table.add_row(vec![
                Cell::new(index + 1),
                Cell::new(case.id),
                Cell::new(match case.env.optype {
                    OpType::Meta => "meta",
                    OpType::Io => "io",
                }),
                Cell::new(describe_params(case)),
                Cell::new(ops.join(",")),
            ]);
        }

        println!("{}", self.heading(&format!("Plan: {} TestCase(s)", plan.len())));
        println!("{table}");
    }

    /// Print the host and global records of one finished TestCase.
    pub fn print_case(&self, index: usize, report: &TestCaseReport) {
        let title = format!(
            "TestCase {}: {} (id {})",
            index + 1,
            describe_params(&report.case),
            report.case.id
        );
        if self.color {
            println!("{}", title.bold().yellow());
        } else {
            println!("{title}");
        }

        let multi_host = report.hosts.len() > 1;
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(
            ["Operation", "Level", "Aggregate", "Avg", "Min", "Max", "Std", "p99"]
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );

        for record in report.records.iter().filter(|r| match r.level {
            Level::Global => true,
            Level::Host => multi_host,
            Level::Thread => false,
        }) {
            table.add_row(self.record_row(record, report));
        }
        println!("{table}");
        println!();
    }

    fn record_row(&self, record: &AggregateRecord, report: &TestCaseReport) -> Vec<Cell> {
        let meta = record.operation.is_meta();
        let level = match record.host {
            Some(host) => format!("host {host}"),
            None => record.level.to_string(),
        };
        let aggregate = Cell::new(format_rate(record.aggregate, meta)).set_alignment(CellAlignment::Right);
        let aggregate = if self.color && record.level == Level::Global {
            aggregate.fg(Color::Green).add_attribute(Attribute::Bold)
        } else {
            aggregate
        };

        vec![
            Cell::new(record.operation.name()),
            Cell::new(level),
            aggregate,
            Cell::new(format_rate(record.avg, meta)).set_alignment(CellAlignment::Right),
            Cell::new(format_rate(record.min, meta)).set_alignment(CellAlignment::Right),
            Cell::new(format_rate(record.max, meta)).set_alignment(CellAlignment::Right),
            Cell::new(format_rate(record.std, meta)).set_alignment(CellAlignment::Right),
            Cell::new(worst_p99(report, record).map_or_else(|| "-".to_string(), format_latency))
                .set_alignment(CellAlignment::Right),
        ]
    }

    /// Closing summary: the global aggregate of every operation of every case.
    pub fn print_summary(&self, reports: &[TestCaseReport]) {
        if reports.is_empty() {
            return;
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(
            ["Parameters", "Operation", "Aggregate"]
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );
        for report in reports {
            for record in report.global() {
                table.add_row(vec![
                    Cell::new(&record.key),
                    Cell::new(record.operation.name()),
                    Cell::new(format_rate(record.aggregate, record.operation.is_meta()))
                        .set_alignment(CellAlignment::Right),
                ]);
            }
        }

        println!("{}", self.heading("Summary"));
        println!("{table}");
    }
}

/// `opcnt=100 factor=16` or `fsize=1 MiB blksize=4 KiB`.
fn describe_params(case: &TestCase) -> String {
    let env = &case.env;
    let params = match env.optype {
        OpType::Meta => format!(
            "opcnt={} factor={}",
            env.opcnt.unwrap_or(0),
            env.factor.unwrap_or(0)
        ),
        OpType::Io => format!(
            "fsize={} blksize={}",
            format_size(env.fsize.unwrap_or(0)),
            format_size(env.blksize.unwrap_or(0))
        ),
    };
    format!("{params} nproc={}", env.nproc)
}

/// Highest thread-level p99 latency this process saw for the record's operation.
fn worst_p99(report: &TestCaseReport, record: &AggregateRecord) -> Option<f64> {
    report
        .records
        .iter()
        .filter(|r| r.level == Level::Thread && r.operation == record.operation)
        .filter(|r| record.host.is_none_or(|host| r.host == Some(host)))
        .filter_map(|r| r.latency.map(|l| l.p99))
        .reduce(f64::max)
}
