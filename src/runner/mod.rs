pub mod options;
pub mod outcome;
pub mod parallel;
pub mod report;
pub mod reporter;
pub mod sequential;
pub(crate) mod unit;

use std::sync::Arc;

use crate::model::registry::TestRegistry;
use crate::runner::options::RunnerOptions;
use crate::runner::outcome::{RunError, RunErrorKind, RunOutcome};
use crate::runner::reporter::Reporter;
use crate::timeout::monitor::TimeoutMonitor;

/// Run every registered test and return the outcome.
///
/// Dispatches to the parallel scheduler when `options.parallel` is set,
/// falling back to the sequential executor if the worker pool cannot be
/// started. The fallback is clean: pool startup is probed before any
/// hook runs, so no suite bracket executes twice.
///
/// # Errors
///
/// [`RunErrorKind::NoTestsFound`] when no cases are registered, or when
/// `options.filter` matches no case name.
pub fn run(
    registry: &mut TestRegistry,
    reporter: &mut dyn Reporter,
    options: &RunnerOptions,
) -> Result<RunOutcome, RunError> {
    if registry.case_count() == 0 {
        return Err(RunError::no_tests("no tests registered"));
    }
    if let Some(filter) = &options.filter
        && !registry.any_case_matches(filter)
    {
        return Err(RunError::no_tests(format!(
            "filter \"{filter}\" matched no test names"
        )));
    }

    // A monitor that fails to start only costs background sweeps;
    // expiry is still detected when the executor queries a context.
    let monitor = Arc::new(TimeoutMonitor::start().unwrap_or_else(|_| TimeoutMonitor::disabled()));

    if options.parallel {
        match parallel::run_parallel(registry, reporter, options, &monitor) {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.kind == RunErrorKind::PoolStartFailed => {
                Ok(sequential::run_sequential(registry, reporter, options, &monitor))
            }
            Err(e) => Err(e),
        }
    } else {
        Ok(sequential::run_sequential(registry, reporter, options, &monitor))
    }
}
