//! fsperf - concurrent filesystem metadata and I/O benchmark.

// Use mimalloc for reduced allocation latency (enabled by default).
// Disable with `--no-default-features` if debugging allocator issues.
#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use fsperf_bench::cli::Cli;
use fsperf_bench::report::{CaseProgress, ReportPrinter, export_json};
use fsperf_core::{BenchError, HostCoordinator, Runner};
use std::process::ExitCode;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Exit status when cooperating processes built different plans.
const EXIT_MISMATCH: u8 = 3;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            match err.downcast_ref::<BenchError>() {
                Some(BenchError::ConfigurationMismatch { .. }) => ExitCode::from(EXIT_MISMATCH),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let color = cli.use_color();
    let json_output = cli.json.clone();
    let raw = cli.raw;

    let coordinator = HostCoordinator::from_env(cli.coord_in.as_deref(), cli.coord_out.as_deref())
        .context("Failed to join the coordination world")?;
    let config = cli.into_config()?;

    let root = coordinator.is_root();
    let ranks = coordinator.size();
    let printer = ReportPrinter::new(color);
    let runner = Runner::new(config, coordinator);

    let plan = runner.plan().context("Failed to build the TestCase plan")?;
    tracing::info!("Planned {} TestCases", plan.len());

    if runner.config().dryrun {
        if root {
            printer.print_plan(&plan);
        }
        return Ok(());
    }

    if root {
        printer.print_banner(runner.config(), ranks);
    }

    let progress = CaseProgress::new(plan.len(), color, root);
    let reports = runner
        .run_with(|index, report| {
            progress.case_done(index, report, || {
                if root {
                    printer.print_case(index, report);
                }
            });
        })
        .context("Benchmark execution failed")?;
    progress.finish();

    if root {
        printer.print_summary(&reports);

        if let Some(path) = json_output {
            export_json(&reports, runner.config(), ranks, raw, &path)
                .context("Failed to export JSON")?;
            println!("Results exported to: {}", path.display());
        }
    }

    Ok(())
}

/// Log through the progress bar so messages appear above it.
///
/// RUST_LOG wins when set; otherwise warn, info with -v, debug with -vv.
fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        })
    });

    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(indicatif_layer.get_stderr_writer()),
        )
        .with(indicatif_layer)
        .with(filter)
        .init();
}
