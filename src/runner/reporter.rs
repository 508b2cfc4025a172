use crate::model::case::CaseStatus;
use crate::runner::outcome::{CaseResult, HookError, RunSummary};

/// Lifecycle-event sink implemented by the presentation layer.
///
/// Both executors deliver events in tree declaration order: `on_run_start`,
/// then per suite `on_suite_start` … cases … nested suites … `on_suite_end`,
/// then `on_run_end`. Skipped cases emit only `on_test_end` (they never
/// leave `Pending`).
pub trait Reporter {
    fn on_run_start(&mut self, _total_tests: usize) {}
    fn on_suite_start(&mut self, _name: &str) {}
    fn on_test_start(&mut self, _name: &str) {}
    fn on_test_end(&mut self, _result: &CaseResult) {}
    fn on_suite_end(&mut self, _name: &str) {}
    fn on_run_end(&mut self, _summary: &RunSummary) {}
}

/// Discards every event. For callers that only want the run outcome.
#[derive(Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {}

/// Format a status label for terminal output.
fn status_label(status: CaseStatus) -> &'static str {
    match status {
        CaseStatus::Pending => "PENDING",
        CaseStatus::Running => "RUNNING",
        CaseStatus::Passed => "PASSED",
        CaseStatus::Failed => "FAILED",
        CaseStatus::TimedOut => "TIMEOUT",
        CaseStatus::Skipped => "SKIPPED",
    }
}

/// Format a case result as it completes.
pub fn format_case_result(result: &CaseResult) -> String {
    let status = status_label(result.status);
    let duration_secs = result.duration.as_secs_f64();
    let mut line = format!("  [{status}] {} ({duration_secs:.1}s)", result.name);
    if let Some(error) = &result.error {
        line.push_str(&format!("\n         → {}", error.message));
    }
    line
}

/// Format a recorded hook failure.
pub fn format_hook_error(error: &HookError) -> String {
    format!("  [HOOK] {error}")
}

/// Format the final summary after all cases complete.
pub fn format_summary(summary: &RunSummary) -> String {
    let duration_secs = summary.duration.as_secs_f64();
    let mut parts = Vec::new();

    if summary.passed > 0 {
        parts.push(format!("{} passed", summary.passed));
    }
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed));
    }
    if summary.skipped > 0 {
        parts.push(format!("{} skipped", summary.skipped));
    }
    if parts.is_empty() {
        parts.push("0 tests".into());
    }

    format!("\nResults: {} ({duration_secs:.1}s)", parts.join(", "))
}

/// Format the run header line.
pub fn format_run_header(total_tests: usize) -> String {
    format!("Running {total_tests} tests...\n")
}

/// Renders the event stream as human-readable lines on stdout, with
/// suite nesting shown by indentation.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    depth: usize,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn indent(&self) -> String {
        "  ".repeat(self.depth)
    }
}

impl Reporter for ConsoleReporter {
    fn on_run_start(&mut self, total_tests: usize) {
        println!("{}", format_run_header(total_tests));
    }

    fn on_suite_start(&mut self, name: &str) {
        println!("{}{name}", self.indent());
        self.depth += 1;
    }

    fn on_test_end(&mut self, result: &CaseResult) {
        let indent = self.indent();
        for line in format_case_result(result).lines() {
            println!("{indent}{line}");
        }
    }

    fn on_suite_end(&mut self, _name: &str) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn on_run_end(&mut self, summary: &RunSummary) {
        println!("{}", format_summary(summary));
    }
}
