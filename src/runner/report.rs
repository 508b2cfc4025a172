use serde::{Deserialize, Serialize};

use crate::runner::outcome::RunOutcome;

/// Serializable run outcome for machine-readable output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub name: String,
    pub run: RunMetadata,
    pub results: Vec<CaseReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hook_errors: Vec<HookErrorReport>,
    pub summary: SummaryReport,
}

/// Metadata about the run execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub mode: String,
    pub duration_ms: u64,
}

/// A single case's result in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub order: usize,
    pub name: String,
    pub status: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

/// Error detail in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: String,
    pub message: String,
}

/// A recorded hook failure in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookErrorReport {
    pub suite: String,
    pub hook: String,
    pub message: String,
}

/// Summary statistics in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub success: bool,
}

/// Convert a [`RunOutcome`] into a serializable [`RunReport`].
pub fn to_report(outcome: &RunOutcome, name: &str) -> RunReport {
    let results: Vec<CaseReport> = outcome
        .results
        .iter()
        .enumerate()
        .map(|(i, case)| CaseReport {
            order: i + 1,
            name: case.name.clone(),
            status: case.status.to_string(),
            duration_ms: case.duration.as_millis() as u64,
            error: case.error.as_ref().map(|e| ErrorReport {
                kind: e.kind.to_string(),
                message: e.message.clone(),
            }),
        })
        .collect();

    let hook_errors = outcome
        .hook_errors
        .iter()
        .map(|e| HookErrorReport {
            suite: e.suite.clone(),
            hook: e.kind.to_string(),
            message: e.message.clone(),
        })
        .collect();

    RunReport {
        name: name.to_owned(),
        run: RunMetadata {
            mode: outcome.mode.to_string(),
            duration_ms: outcome.summary.duration.as_millis() as u64,
        },
        results,
        hook_errors,
        summary: SummaryReport {
            total: outcome.summary.total,
            passed: outcome.summary.passed,
            failed: outcome.summary.failed,
            skipped: outcome.summary.skipped,
            success: outcome.summary.success(),
        },
    }
}

/// Emit a run report as YAML.
pub fn emit_run_yaml(report: &RunReport) -> String {
    serde_yaml::to_string(report).unwrap_or_else(|e| format!("# Error serializing report: {e}"))
}

/// Emit a run report as JSON.
pub fn emit_run_json(report: &RunReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|e| format!("{{ \"error\": \"{}\" }}", e))
}

/// Emit a run report as JUnit XML.
pub fn emit_run_junit(report: &RunReport) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    let name = xml_escape(&report.name);
    let tests = report.summary.total;
    let failures = report.summary.failed;
    let time_secs = report.run.duration_ms as f64 / 1000.0;

    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#).unwrap();
    writeln!(
        out,
        r#"<testsuites name="{name}" tests="{tests}" failures="{failures}" time="{time_secs:.1}">"#
    )
    .unwrap();
    writeln!(
        out,
        r#"  <testsuite name="{name}" tests="{tests}" failures="{failures}" time="{time_secs:.1}">"#
    )
    .unwrap();

    for case in &report.results {
        let case_name = xml_escape(&case.name);
        let case_time = case.duration_ms as f64 / 1000.0;
        writeln!(
            out,
            r#"    <testcase name="{case_name}" classname="{name}" time="{case_time:.1}">"#
        )
        .unwrap();

        if case.status == "failed" || case.status == "timed out" {
            if let Some(err) = &case.error {
                writeln!(
                    out,
                    r#"      <failure message="{}" type="{}"/>"#,
                    xml_escape(&err.message),
                    xml_escape(&err.kind)
                )
                .unwrap();
            } else {
                writeln!(out, r#"      <failure message="test failed"/>"#).unwrap();
            }
        }

        if case.status == "skipped" {
            writeln!(out, r#"      <skipped/>"#).unwrap();
        }

        writeln!(out, "    </testcase>").unwrap();
    }

    // Hook failures never belong to a single testcase; surface them in
    // suite-level system-err so CI does not silently drop them.
    if !report.hook_errors.is_empty() {
        writeln!(out, "    <system-err>").unwrap();
        for err in &report.hook_errors {
            writeln!(
                out,
                "      {} hook in {}: {}",
                xml_escape(&err.hook),
                xml_escape(&err.suite),
                xml_escape(&err.message)
            )
            .unwrap();
        }
        writeln!(out, "    </system-err>").unwrap();
    }

    writeln!(out, "  </testsuite>").unwrap();
    writeln!(out, "</testsuites>").unwrap();

    out
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
