use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::future::run_bounded;
use crate::model::case::CaseStatus;
use crate::model::registry::TestRegistry;
use crate::model::suite::{HookKind, SuiteId};
use crate::runner::options::RunnerOptions;
use crate::runner::outcome::{
    CaseError, CaseErrorKind, CaseResult, HookError, RunError, RunMode, RunOutcome, RunSummary,
};
use crate::runner::reporter::Reporter;
use crate::runner::unit::{ExecUnit, UnitOutcome, run_unit};
use crate::timeout::monitor::TimeoutMonitor;

/// Key for a case inside the shared results map.
type CaseKey = (usize, usize);

/// Execute the tree across a fixed worker pool, then replay results in
/// tree order.
///
/// Three phases. *Plan*: a single-threaded walk runs each live suite's
/// `beforeAll`, resolves skip decisions, and snapshots every runnable
/// case into an execution unit. *Execute*: `jobs` workers drain a shared
/// queue; joining every worker is the barrier; `afterAll` hooks then run
/// in reverse tree order. *Replay*: a deterministic pass over the
/// original tree order writes each case's outcome back exactly once and
/// emits reporter events in canonical order, so reporter-observable
/// ordering is identical to sequential mode.
///
/// # Errors
///
/// [`RunError::pool_start`] when no worker thread can be spawned; the
/// probe runs before any hook, so the caller can fall back to the
/// sequential runner without re-running suite brackets.
pub fn run_parallel(
    registry: &mut TestRegistry,
    reporter: &mut dyn Reporter,
    options: &RunnerOptions,
    monitor: &Arc<TimeoutMonitor>,
) -> Result<RunOutcome, RunError> {
    // Probe before side effects so a fallback rerun is clean.
    match thread::Builder::new().spawn(|| {}) {
        Ok(probe) => {
            let _ = probe.join();
        }
        Err(e) => return Err(RunError::pool_start(e.to_string())),
    }

    let jobs = options
        .jobs
        .unwrap_or_else(|| thread::available_parallelism().map_or(1, usize::from))
        .max(1);

    let start = Instant::now();
    reporter.on_run_start(registry.case_count());

    // Plan.
    let mut plan = Plan {
        decisions: HashMap::new(),
        units: VecDeque::new(),
        closers: Vec::new(),
        hook_errors: Vec::new(),
    };
    let roots = registry.roots().to_vec();
    for root in &roots {
        plan_suite(registry, options, monitor, &mut plan, *root, false);
    }
    let mut hook_errors = plan.hook_errors;

    // Execute.
    let worker_count = jobs.min(plan.units.len()).max(1);
    let queue = Arc::new(Mutex::new(plan.units));
    let results: Arc<Mutex<HashMap<CaseKey, UnitOutcome>>> = Arc::new(Mutex::new(HashMap::new()));
    let bail = Arc::new(AtomicBool::new(false));

    let mut handles = Vec::with_capacity(worker_count);
    for index in 0..worker_count {
        let queue = Arc::clone(&queue);
        let results = Arc::clone(&results);
        let bail = Arc::clone(&bail);
        let monitor = Arc::clone(monitor);
        let bail_enabled = options.bail;
        let ceiling = options.max_extension;
        let spawned = thread::Builder::new()
            .name(format!("trellis-worker-{index}"))
            .spawn(move || drain_queue(&queue, &results, &bail, bail_enabled, ceiling, &monitor));
        if let Ok(handle) = spawned {
            handles.push(handle);
        }
    }
    if handles.is_empty() {
        // The probe succeeded but the real pool did not; degrade to
        // draining the queue on this thread rather than losing tests.
        drain_queue(
            &queue,
            &results,
            &bail,
            options.bail,
            options.max_extension,
            monitor,
        );
    }

    // Barrier: the run does not proceed until every dispatched task is done.
    for handle in handles {
        let _ = handle.join();
    }

    // Suite closers, innermost first.
    for id in plan.closers.iter().rev() {
        let name = registry.suite_ref(*id).name.clone();
        let budget = registry.effective_timeout(*id, None, options.default_timeout);
        let hooks = registry.suite_ref(*id).after_all.clone();
        for hook in hooks {
            if let Err(e) = run_bounded(&hook, &name, budget, options.max_extension, monitor) {
                hook_errors.push(HookError {
                    suite: name.clone(),
                    kind: HookKind::AfterAll,
                    message: e.to_string(),
                });
            }
        }
    }

    // Replay in tree order.
    let mut results_map = match Arc::try_unwrap(results) {
        Ok(mutex) => mutex.into_inner().unwrap_or_default(),
        Err(shared) => shared.lock().map(|mut m| std::mem::take(&mut *m)).unwrap_or_default(),
    };
    let mut replay = Replay {
        registry,
        reporter,
        decisions: plan.decisions,
        results_map: &mut results_map,
        results: Vec::new(),
        hook_errors: &mut hook_errors,
    };
    for root in &roots {
        replay.suite(*root);
    }
    let results = replay.results;

    let summary = RunSummary::from_results(&results, start.elapsed());
    reporter.on_run_end(&summary);
    Ok(RunOutcome {
        mode: RunMode::Parallel { jobs },
        results,
        hook_errors,
        summary,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Skip,
    Dispatched,
}

struct Plan {
    decisions: HashMap<CaseKey, Decision>,
    units: VecDeque<ExecUnit>,
    /// Suites whose `beforeAll` was attempted, in tree order.
    closers: Vec<SuiteId>,
    hook_errors: Vec<HookError>,
}

fn plan_suite(
    registry: &TestRegistry,
    options: &RunnerOptions,
    monitor: &TimeoutMonitor,
    plan: &mut Plan,
    id: SuiteId,
    forced_skip: bool,
) {
    let suite = registry.suite_ref(id);
    let name = suite.name.clone();
    let skip_suite = forced_skip || registry.should_skip(id);
    let mut before_all_failed = false;

    if !skip_suite {
        plan.closers.push(id);
        let budget = registry.effective_timeout(id, None, options.default_timeout);
        for hook in &suite.before_all {
            if let Err(e) = run_bounded(hook, &name, budget, options.max_extension, monitor) {
                plan.hook_errors.push(HookError {
                    suite: name.clone(),
                    kind: HookKind::BeforeAll,
                    message: e.to_string(),
                });
                before_all_failed = true;
                break;
            }
        }
    }

    for (index, case) in suite.cases.iter().enumerate() {
        let key = (id.index(), index);
        let only_excluded = registry.has_only() && !case.only && !registry.scope_has_only(id);
        let filter_miss = options
            .filter
            .as_deref()
            .is_some_and(|f| !case.name.contains(f));
        if skip_suite || before_all_failed || case.skip || only_excluded || filter_miss {
            plan.decisions.insert(key, Decision::Skip);
            continue;
        }
        plan.decisions.insert(key, Decision::Dispatched);
        plan.units.push_back(ExecUnit {
            suite: id,
            case_index: index,
            name: case.name.clone(),
            before: registry.effective_before_each(id),
            body: Arc::clone(&case.body),
            after: registry.effective_after_each(id),
            budget: registry.effective_timeout(id, case.timeout, options.default_timeout),
        });
    }

    for child in suite.children.clone() {
        plan_suite(
            registry,
            options,
            monitor,
            plan,
            child,
            skip_suite || before_all_failed,
        );
    }
}

/// Worker body: pop units until the queue is empty. Under `bail`, units
/// popped after the first failure are marked skipped without starting.
fn drain_queue(
    queue: &Mutex<VecDeque<ExecUnit>>,
    results: &Mutex<HashMap<CaseKey, UnitOutcome>>,
    bail: &AtomicBool,
    bail_enabled: bool,
    ceiling: Duration,
    monitor: &TimeoutMonitor,
) {
    loop {
        let unit = match queue.lock() {
            Ok(mut q) => q.pop_front(),
            Err(_) => return,
        };
        let Some(unit) = unit else { return };
        let key = (unit.suite.index(), unit.case_index);

        let outcome = if bail.load(Ordering::Acquire) {
            UnitOutcome {
                result: CaseResult::skipped(&unit.name),
                after_errors: Vec::new(),
            }
        } else {
            let outcome = run_unit(&unit, ceiling, monitor);
            if bail_enabled && outcome.result.status.is_failure() {
                bail.store(true, Ordering::Release);
            }
            outcome
        };

        if let Ok(mut map) = results.lock() {
            map.insert(key, outcome);
        }
    }
}

struct Replay<'a> {
    registry: &'a mut TestRegistry,
    reporter: &'a mut dyn Reporter,
    decisions: HashMap<CaseKey, Decision>,
    results_map: &'a mut HashMap<CaseKey, UnitOutcome>,
    results: Vec<CaseResult>,
    hook_errors: &'a mut Vec<HookError>,
}

impl Replay<'_> {
    fn suite(&mut self, id: SuiteId) {
        let name = self.registry.suite_ref(id).name.clone();
        self.reporter.on_suite_start(&name);

        let case_count = self.registry.suite_ref(id).cases.len();
        for index in 0..case_count {
            self.case(id, index, &name);
        }
        let children = self.registry.suite_ref(id).children.clone();
        for child in children {
            self.suite(child);
        }

        self.reporter.on_suite_end(&name);
    }

    fn case(&mut self, id: SuiteId, index: usize, suite_name: &str) {
        let key = (id.index(), index);
        let case_name = self.registry.suite_ref(id).cases[index].name.clone();

        let outcome = match self.decisions.get(&key) {
            Some(Decision::Dispatched) => {
                self.results_map.remove(&key).unwrap_or_else(|| UnitOutcome {
                    result: CaseResult::failed(
                        &case_name,
                        Duration::ZERO,
                        CaseError {
                            kind: CaseErrorKind::BodyFailed,
                            message: "worker did not report a result".into(),
                        },
                    ),
                    after_errors: Vec::new(),
                })
            }
            _ => UnitOutcome {
                result: CaseResult::skipped(&case_name),
                after_errors: Vec::new(),
            },
        };

        for message in outcome.after_errors {
            self.hook_errors.push(HookError {
                suite: suite_name.to_owned(),
                kind: HookKind::AfterEach,
                message,
            });
        }

        // The single write of this case's final state.
        {
            let case = &mut self.registry.suite_mut(id).cases[index];
            case.status = outcome.result.status;
            case.duration = outcome.result.duration;
            case.error_message = outcome.result.error.as_ref().map(|e| e.message.clone());
        }

        if outcome.result.status != CaseStatus::Skipped {
            self.reporter.on_test_start(&case_name);
        }
        self.reporter.on_test_end(&outcome.result);
        self.results.push(outcome.result);
    }
}
