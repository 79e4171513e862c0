//! TestCase progress bar.

use fsperf_core::TestCaseReport;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress over the TestCases of a run; hidden on non-root ranks.
pub struct CaseProgress {
    bar: ProgressBar,
}

impl CaseProgress {
    pub fn new(total: usize, color: bool, visible: bool) -> Self {
        if !visible {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }

        let template = if color {
            "  {spinner:.cyan} {msg}\n  {bar:40.cyan/dim} {pos}/{len}  {elapsed_precise}"
        } else {
            "  {spinner} {msg}\n  {bar:40} {pos}/{len}  {elapsed_precise}"
        };
        let style = ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");

        let bar = ProgressBar::new(total as u64);
        bar.set_style(style);
        bar.set_message("Running TestCase 1");
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    /// Record a finished TestCase; `print` runs with the bar cleared.
    pub fn case_done(&self, index: usize, report: &TestCaseReport, print: impl FnOnce()) {
        self.bar.suspend(print);
        self.bar.inc(1);
        self.bar
            .set_message(format!("Finished {} (next: TestCase {})", report.case.env, index + 2));
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
