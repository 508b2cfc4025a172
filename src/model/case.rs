use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::timeout::context::{ExtendError, TimeoutContext};

/// Lifecycle state of a single test case.
///
/// `Pending → Running → {Passed | Failed | TimedOut | Skipped}`.
/// A case that is skipped never enters `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseStatus {
    Pending,
    Running,
    Passed,
    Failed,
    TimedOut,
    Skipped,
}

impl CaseStatus {
    /// `TimedOut` is a sub-state of failure: both count against the verdict.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut)
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// A unit of test work: a hook or a test body.
///
/// Callable with an execution context, returns success or a descriptive
/// failure. Stored behind `Arc` so the parallel scheduler can clone handles
/// onto worker threads without cloning the caller's closure.
pub type Work = Arc<dyn Fn(&TestContext) -> Result<(), String> + Send + Sync>;

/// Execution context handed to every hook and body invocation.
///
/// Carries the case name and, when a wall-clock budget is active for the
/// current unit, a handle to its timeout context so the work item can
/// request more time.
pub struct TestContext {
    case_name: String,
    timeout: Option<Arc<TimeoutContext>>,
}

impl TestContext {
    /// Context for an unbounded unit of work.
    pub fn new(case_name: impl Into<String>) -> Self {
        Self {
            case_name: case_name.into(),
            timeout: None,
        }
    }

    /// Context for a unit running under the given timeout.
    pub fn with_timeout(case_name: impl Into<String>, timeout: Arc<TimeoutContext>) -> Self {
        Self {
            case_name: case_name.into(),
            timeout: Some(timeout),
        }
    }

    pub fn case_name(&self) -> &str {
        &self.case_name
    }

    /// Request additional budget for the current unit of work.
    ///
    /// A no-op when the unit is unbounded.
    ///
    /// # Errors
    ///
    /// Returns [`ExtendError`] if the cumulative extension would exceed the
    /// configured ceiling or the unit has already settled.
    pub fn extend_timeout(&self, extra: Duration) -> Result<(), ExtendError> {
        match &self.timeout {
            Some(ctx) => ctx.extend(extra),
            None => Ok(()),
        }
    }
}

/// A single named unit of test work.
///
/// Owned exclusively by its parent suite; created once at registration time
/// and mutated only by the executor during a single run.
pub struct TestCase {
    pub name: String,
    pub body: Work,
    pub status: CaseStatus,
    pub error_message: Option<String>,
    pub duration: Duration,
    pub skip: bool,
    pub only: bool,
    /// Per-test budget; overrides suite and global budgets.
    pub timeout: Option<Duration>,
}

impl TestCase {
    pub fn new(
        name: impl Into<String>,
        body: impl Fn(&TestContext) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            body: Arc::new(body),
            status: CaseStatus::Pending,
            error_message: None,
            duration: Duration::ZERO,
            skip: false,
            only: false,
            timeout: None,
        }
    }

    /// Mark this case skipped.
    pub fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }

    /// Focus the run on this case (and any other `only`-marked work).
    pub fn focused(mut self) -> Self {
        self.only = true;
        self
    }

    /// Set a per-test wall-clock budget.
    pub fn with_timeout(mut self, budget: Duration) -> Self {
        self.timeout = Some(budget);
        self
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("status", &self.status)
            .field("skip", &self.skip)
            .field("only", &self.only)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_new_defaults() {
        let case = TestCase::new("create user", |_| Ok(()));
        assert_eq!(case.name, "create user");
        assert_eq!(case.status, CaseStatus::Pending);
        assert_eq!(case.duration, Duration::ZERO);
        assert!(case.error_message.is_none());
        assert!(!case.skip);
        assert!(!case.only);
        assert!(case.timeout.is_none());
    }

    #[test]
    fn case_builder_modifiers() {
        let case = TestCase::new("slow path", |_| Ok(()))
            .skipped()
            .with_timeout(Duration::from_millis(250));
        assert!(case.skip);
        assert_eq!(case.timeout, Some(Duration::from_millis(250)));

        let focused = TestCase::new("focused", |_| Ok(())).focused();
        assert!(focused.only);
    }

    #[test]
    fn case_body_receives_context() {
        let case = TestCase::new("named", |ctx| {
            if ctx.case_name() == "named" {
                Ok(())
            } else {
                Err(format!("unexpected case name {}", ctx.case_name()))
            }
        });
        let ctx = TestContext::new("named");
        assert_eq!((case.body)(&ctx), Ok(()));
    }

    #[test]
    fn status_display() {
        assert_eq!(CaseStatus::Pending.to_string(), "pending");
        assert_eq!(CaseStatus::Running.to_string(), "running");
        assert_eq!(CaseStatus::Passed.to_string(), "passed");
        assert_eq!(CaseStatus::Failed.to_string(), "failed");
        assert_eq!(CaseStatus::TimedOut.to_string(), "timed out");
        assert_eq!(CaseStatus::Skipped.to_string(), "skipped");
    }

    #[test]
    fn timed_out_is_a_failure() {
        assert!(CaseStatus::Failed.is_failure());
        assert!(CaseStatus::TimedOut.is_failure());
        assert!(!CaseStatus::Passed.is_failure());
        assert!(!CaseStatus::Skipped.is_failure());
    }

    #[test]
    fn context_extend_without_budget_is_noop() {
        let ctx = TestContext::new("unbounded");
        assert!(ctx.extend_timeout(Duration::from_secs(1)).is_ok());
    }
}
