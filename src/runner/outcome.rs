use std::fmt;
use std::time::Duration;

use crate::model::case::CaseStatus;
use crate::model::suite::HookKind;

/// The outcome of one case, as handed to the reporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseResult {
    pub name: String,
    pub status: CaseStatus,
    pub duration: Duration,
    pub error: Option<CaseError>,
}

impl CaseResult {
    pub fn passed(name: &str, duration: Duration) -> Self {
        Self {
            name: name.to_owned(),
            status: CaseStatus::Passed,
            duration,
            error: None,
        }
    }

    pub fn failed(name: &str, duration: Duration, error: CaseError) -> Self {
        Self {
            name: name.to_owned(),
            status: CaseStatus::Failed,
            duration,
            error: Some(error),
        }
    }

    pub fn timed_out(name: &str, duration: Duration, error: CaseError) -> Self {
        Self {
            name: name.to_owned(),
            status: CaseStatus::TimedOut,
            duration,
            error: Some(error),
        }
    }

    pub fn skipped(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            status: CaseStatus::Skipped,
            duration: Duration::ZERO,
            error: None,
        }
    }
}

/// Why a case failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseError {
    pub kind: CaseErrorKind,
    pub message: String,
}

impl fmt::Display for CaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Classification of case failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseErrorKind {
    /// A `beforeEach` hook in the effective chain failed; the body never ran.
    BeforeHookFailed,
    /// The test body itself failed.
    BodyFailed,
    /// A hook or the body exceeded its wall-clock budget.
    Timeout,
}

impl fmt::Display for CaseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeHookFailed => write!(f, "before hook failed"),
            Self::BodyFailed => write!(f, "test failed"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// A non-fatal hook failure: `afterEach`, `beforeAll`, or `afterAll`.
///
/// Recorded on the run outcome; never changes a case status, though a
/// `beforeAll` failure skips the suite's cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookError {
    pub suite: String,
    pub kind: HookKind,
    pub message: String,
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} hook in \"{}\": {}", self.kind, self.suite, self.message)
    }
}

/// Which executor produced an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Sequential,
    Parallel { jobs: usize },
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Parallel { jobs } => write!(f, "parallel({jobs})"),
        }
    }
}

/// Aggregate counts for a completed run.
///
/// Invariant: `total == passed + failed + skipped`, with timed-out cases
/// counted under `failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration: Duration,
}

impl RunSummary {
    /// Whether every non-skipped case passed.
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    pub fn from_results(results: &[CaseResult], duration: Duration) -> Self {
        let mut summary = Self {
            total: results.len(),
            passed: 0,
            failed: 0,
            skipped: 0,
            duration,
        };
        for r in results {
            match r.status {
                CaseStatus::Passed => summary.passed += 1,
                CaseStatus::Skipped => summary.skipped += 1,
                s if s.is_failure() => summary.failed += 1,
                // Pending/Running never appear in final results.
                _ => {}
            }
        }
        summary
    }
}

/// Everything a completed run produced, in tree declaration order.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub mode: RunMode,
    pub results: Vec<CaseResult>,
    pub hook_errors: Vec<HookError>,
    pub summary: RunSummary,
}

impl RunOutcome {
    /// The exit-contract verdict: all non-skipped cases passed.
    pub fn success(&self) -> bool {
        self.summary.success()
    }
}

/// Error from the run boundary.
#[derive(Debug, Clone)]
pub struct RunError {
    pub kind: RunErrorKind,
    pub message: String,
}

impl RunError {
    pub(crate) fn no_tests(message: impl Into<String>) -> Self {
        Self {
            kind: RunErrorKind::NoTestsFound,
            message: message.into(),
        }
    }

    pub(crate) fn pool_start(message: impl Into<String>) -> Self {
        Self {
            kind: RunErrorKind::PoolStartFailed,
            message: message.into(),
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Classification of run-boundary errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunErrorKind {
    /// No cases registered, or a filter matched no case names. Distinct
    /// from a zero-test "success".
    NoTestsFound,
    /// The worker pool could not be started; the dispatcher falls back
    /// to sequential execution.
    PoolStartFailed,
}

impl fmt::Display for RunErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTestsFound => write!(f, "no tests found"),
            Self::PoolStartFailed => write!(f, "worker pool failed to start"),
        }
    }
}
