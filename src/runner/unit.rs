use std::time::{Duration, Instant};

use crate::future::{BoundedError, run_bounded};
use crate::model::case::Work;
use crate::model::suite::SuiteId;
use crate::runner::outcome::{CaseError, CaseErrorKind, CaseResult};
use crate::timeout::monitor::TimeoutMonitor;

/// One schedulable unit: a case's effective hook chain plus its body,
/// snapshotted out of the tree so either executor can run it.
pub(crate) struct ExecUnit {
    pub suite: SuiteId,
    pub case_index: usize,
    pub name: String,
    pub before: Vec<Work>,
    pub body: Work,
    pub after: Vec<Work>,
    /// Effective budget for each hook and the body; `None` = unlimited.
    pub budget: Option<Duration>,
}

/// What running a unit produced: the case result plus any `afterEach`
/// failures, which are recorded but never change the case status.
pub(crate) struct UnitOutcome {
    pub result: CaseResult,
    pub after_errors: Vec<String>,
}

/// Execute one unit: effective `beforeEach` chain, body, effective
/// `afterEach` chain. The first before-hook failure (or timeout) fails
/// the case and the body never runs; `afterEach` hooks always run for a
/// case that got this far.
pub(crate) fn run_unit(
    unit: &ExecUnit,
    extension_ceiling: Duration,
    monitor: &TimeoutMonitor,
) -> UnitOutcome {
    let start = Instant::now();
    let mut error: Option<CaseError> = None;

    for hook in &unit.before {
        match run_bounded(hook, &unit.name, unit.budget, extension_ceiling, monitor) {
            Ok(()) => {}
            Err(e) => {
                error = Some(classify(e, CaseErrorKind::BeforeHookFailed));
                break;
            }
        }
    }

    if error.is_none()
        && let Err(e) = run_bounded(&unit.body, &unit.name, unit.budget, extension_ceiling, monitor)
    {
        error = Some(classify(e, CaseErrorKind::BodyFailed));
    }

    let mut after_errors = Vec::new();
    for hook in &unit.after {
        if let Err(e) = run_bounded(hook, &unit.name, unit.budget, extension_ceiling, monitor) {
            after_errors.push(e.to_string());
        }
    }

    let duration = start.elapsed();
    let result = match error {
        None => CaseResult::passed(&unit.name, duration),
        Some(e) if e.kind == CaseErrorKind::Timeout => {
            CaseResult::timed_out(&unit.name, duration, e)
        }
        Some(e) => CaseResult::failed(&unit.name, duration, e),
    };
    UnitOutcome {
        result,
        after_errors,
    }
}

fn classify(error: BoundedError, failure_kind: CaseErrorKind) -> CaseError {
    match error {
        BoundedError::TimedOut { .. } => CaseError {
            kind: CaseErrorKind::Timeout,
            message: error.to_string(),
        },
        BoundedError::Failed(message) => CaseError {
            kind: failure_kind,
            message,
        },
    }
}
