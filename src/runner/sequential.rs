use std::sync::Arc;
use std::time::Instant;

use crate::future::run_bounded;
use crate::model::case::CaseStatus;
use crate::model::registry::TestRegistry;
use crate::model::suite::{HookKind, SuiteId};
use crate::runner::options::RunnerOptions;
use crate::runner::outcome::{CaseResult, HookError, RunMode, RunOutcome, RunSummary};
use crate::runner::reporter::Reporter;
use crate::runner::unit::{ExecUnit, run_unit};
use crate::timeout::monitor::TimeoutMonitor;

/// Execute the tree in strict declaration order on one thread of control.
///
/// Events reach the reporter in tree order with strict
/// before → body → after ordering per case and `beforeAll`/`afterAll`
/// bracketing per suite.
pub fn run_sequential(
    registry: &mut TestRegistry,
    reporter: &mut dyn Reporter,
    options: &RunnerOptions,
    monitor: &TimeoutMonitor,
) -> RunOutcome {
    let start = Instant::now();
    reporter.on_run_start(registry.case_count());

    let mut run = SequentialRun {
        registry,
        reporter,
        options,
        monitor,
        results: Vec::new(),
        hook_errors: Vec::new(),
        bailed: false,
    };
    let roots = run.registry.roots().to_vec();
    for root in roots {
        run.run_suite(root, false);
    }

    let results = run.results;
    let hook_errors = run.hook_errors;
    let summary = RunSummary::from_results(&results, start.elapsed());
    reporter.on_run_end(&summary);
    RunOutcome {
        mode: RunMode::Sequential,
        results,
        hook_errors,
        summary,
    }
}

struct SequentialRun<'a> {
    registry: &'a mut TestRegistry,
    reporter: &'a mut dyn Reporter,
    options: &'a RunnerOptions,
    monitor: &'a TimeoutMonitor,
    results: Vec<CaseResult>,
    hook_errors: Vec<HookError>,
    bailed: bool,
}

impl SequentialRun<'_> {
    /// `forced_skip` carries a `beforeAll` failure down from an ancestor;
    /// flag-based skips are folded by the registry itself.
    fn run_suite(&mut self, id: SuiteId, forced_skip: bool) {
        let name = self.registry.suite_ref(id).name.clone();
        self.reporter.on_suite_start(&name);

        let skip_suite = forced_skip || self.registry.should_skip(id);
        // Skipped suites run no hooks at all; a bail before entry means the
        // suite was never started, so its brackets don't run either.
        let attempt_hooks = !skip_suite && !self.bailed;
        let mut before_all_failed = false;

        if attempt_hooks {
            let budget = self
                .registry
                .effective_timeout(id, None, self.options.default_timeout);
            let hooks = self.registry.suite_ref(id).before_all.clone();
            for hook in hooks {
                if let Err(e) =
                    run_bounded(&hook, &name, budget, self.options.max_extension, self.monitor)
                {
                    self.hook_errors.push(HookError {
                        suite: name.clone(),
                        kind: HookKind::BeforeAll,
                        message: e.to_string(),
                    });
                    before_all_failed = true;
                    break;
                }
            }
        }

        let case_count = self.registry.suite_ref(id).cases.len();
        for index in 0..case_count {
            self.run_case(id, index, skip_suite || before_all_failed, &name);
        }

        let children = self.registry.suite_ref(id).children.clone();
        for child in children {
            self.run_suite(child, skip_suite || before_all_failed);
        }

        // afterAll runs unconditionally for any suite whose beforeAll was
        // attempted, even after a beforeAll failure or a mid-suite bail.
        if attempt_hooks {
            let budget = self
                .registry
                .effective_timeout(id, None, self.options.default_timeout);
            let hooks = self.registry.suite_ref(id).after_all.clone();
            for hook in hooks {
                if let Err(e) =
                    run_bounded(&hook, &name, budget, self.options.max_extension, self.monitor)
                {
                    self.hook_errors.push(HookError {
                        suite: name.clone(),
                        kind: HookKind::AfterAll,
                        message: e.to_string(),
                    });
                }
            }
        }

        self.reporter.on_suite_end(&name);
    }

    fn run_case(&mut self, id: SuiteId, index: usize, forced_skip: bool, suite_name: &str) {
        let (case_name, case_skip, case_only, case_timeout, body) = {
            let case = &self.registry.suite_ref(id).cases[index];
            (
                case.name.clone(),
                case.skip,
                case.only,
                case.timeout,
                Arc::clone(&case.body),
            )
        };

        let only_excluded =
            self.registry.has_only() && !case_only && !self.registry.scope_has_only(id);
        let filter_miss = self
            .options
            .filter
            .as_deref()
            .is_some_and(|f| !case_name.contains(f));

        if forced_skip || case_skip || self.bailed || only_excluded || filter_miss {
            self.registry.suite_mut(id).cases[index].status = CaseStatus::Skipped;
            let result = CaseResult::skipped(&case_name);
            self.reporter.on_test_end(&result);
            self.results.push(result);
            return;
        }

        self.reporter.on_test_start(&case_name);
        self.registry.suite_mut(id).cases[index].status = CaseStatus::Running;

        let unit = ExecUnit {
            suite: id,
            case_index: index,
            name: case_name,
            before: self.registry.effective_before_each(id),
            body,
            after: self.registry.effective_after_each(id),
            budget: self
                .registry
                .effective_timeout(id, case_timeout, self.options.default_timeout),
        };
        let outcome = run_unit(&unit, self.options.max_extension, self.monitor);

        for message in outcome.after_errors {
            self.hook_errors.push(HookError {
                suite: suite_name.to_owned(),
                kind: HookKind::AfterEach,
                message,
            });
        }

        {
            let case = &mut self.registry.suite_mut(id).cases[index];
            case.status = outcome.result.status;
            case.duration = outcome.result.duration;
            case.error_message = outcome.result.error.as_ref().map(|e| e.message.clone());
        }

        if outcome.result.status.is_failure() && self.options.bail {
            self.bailed = true;
        }

        self.reporter.on_test_end(&outcome.result);
        self.results.push(outcome.result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::case::TestCase;
    use crate::model::suite::SuiteOptions;
    use std::sync::Mutex;
    use std::time::Duration;

    // -- Recording reporter for event-order assertions --

    #[derive(Default)]
    struct RecordingReporter {
        events: Vec<String>,
    }

    impl Reporter for RecordingReporter {
        fn on_run_start(&mut self, total_tests: usize) {
            self.events.push(format!("run_start({total_tests})"));
        }
        fn on_suite_start(&mut self, name: &str) {
            self.events.push(format!("suite_start({name})"));
        }
        fn on_test_start(&mut self, name: &str) {
            self.events.push(format!("test_start({name})"));
        }
        fn on_test_end(&mut self, result: &CaseResult) {
            self.events
                .push(format!("test_end({}, {})", result.name, result.status));
        }
        fn on_suite_end(&mut self, name: &str) {
            self.events.push(format!("suite_end({name})"));
        }
        fn on_run_end(&mut self, summary: &RunSummary) {
            self.events.push(format!(
                "run_end({}/{}/{}/{})",
                summary.total, summary.passed, summary.failed, summary.skipped
            ));
        }
    }

    fn run(registry: &mut TestRegistry, options: &RunnerOptions) -> (RunOutcome, RecordingReporter) {
        let monitor = TimeoutMonitor::disabled();
        let mut reporter = RecordingReporter::default();
        let outcome = run_sequential(registry, &mut reporter, options, &monitor);
        (outcome, reporter)
    }

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn mark(log: &Log, label: &'static str) -> impl Fn(&crate::model::case::TestContext) -> Result<(), String> + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |_| {
            log.lock().unwrap().push(label);
            Ok(())
        }
    }

    #[test]
    fn hook_ordering_across_nested_suites() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = TestRegistry::new();
        let a1 = mark(&log, "a1");
        let x1 = mark(&log, "x1");
        let b1 = mark(&log, "b1");
        let y1 = mark(&log, "y1");
        let body = mark(&log, "C");
        registry.suite("A", |r| {
            r.before_each(a1);
            r.after_each(x1);
            r.suite("B", |r| {
                r.before_each(b1);
                r.after_each(y1);
                r.case(TestCase::new("C", body));
            });
        });

        let (outcome, _) = run(&mut registry, &RunnerOptions::default());
        assert!(outcome.success());
        assert_eq!(*log.lock().unwrap(), vec!["a1", "b1", "C", "y1", "x1"]);
    }

    #[test]
    fn suite_brackets_run_once_per_suite() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = TestRegistry::new();
        let before_all = mark(&log, "before_all");
        let after_all = mark(&log, "after_all");
        let t1 = mark(&log, "t1");
        let t2 = mark(&log, "t2");
        registry.suite("A", |r| {
            r.before_all(before_all);
            r.after_all(after_all);
            r.case(TestCase::new("t1", t1));
            r.case(TestCase::new("t2", t2));
        });

        run(&mut registry, &RunnerOptions::default());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["before_all", "t1", "t2", "after_all"]
        );
    }

    #[test]
    fn before_all_does_not_inherit() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = TestRegistry::new();
        let outer_all = mark(&log, "outer_all");
        let inner_case = mark(&log, "inner_case");
        registry.suite("outer", |r| {
            r.before_all(outer_all);
            r.suite("inner", |r| {
                r.case(TestCase::new("inner case", inner_case));
            });
        });

        run(&mut registry, &RunnerOptions::default());
        // outer's beforeAll runs once for the outer suite, not again for inner.
        assert_eq!(*log.lock().unwrap(), vec!["outer_all", "inner_case"]);
    }

    #[test]
    fn skip_propagates_to_nested_cases_and_hooks() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = TestRegistry::new();
        let hook = mark(&log, "hook");
        let all = mark(&log, "all");
        let c1 = mark(&log, "c1");
        let c2 = mark(&log, "c2");
        registry.suite_with("A", SuiteOptions::skipped(), |r| {
            r.before_each(hook);
            r.before_all(all);
            r.case(TestCase::new("c1", c1));
            r.suite("B", |r| {
                r.case(TestCase::new("c2", c2));
            });
        });

        let (outcome, _) = run(&mut registry, &RunnerOptions::default());
        assert!(log.lock().unwrap().is_empty(), "no hook or body may run");
        assert_eq!(outcome.summary.skipped, 2);
        assert_eq!(outcome.summary.total, 2);
        assert!(outcome.results.iter().all(|r| r.status == CaseStatus::Skipped));
    }

    #[test]
    fn only_isolates_unmarked_cases() {
        let mut registry = TestRegistry::new();
        registry.suite("A", |r| {
            r.case(TestCase::new("plain", |_| Ok(())));
            r.case(TestCase::new("focused", |_| Ok(())).focused());
        });
        registry.suite("B", |r| {
            r.case(TestCase::new("other", |_| Ok(())));
        });

        let (outcome, _) = run(&mut registry, &RunnerOptions::default());
        let by_name = |name: &str| {
            outcome
                .results
                .iter()
                .find(|r| r.name == name)
                .unwrap()
                .status
        };
        assert_eq!(by_name("focused"), CaseStatus::Passed);
        assert_eq!(by_name("plain"), CaseStatus::Skipped);
        assert_eq!(by_name("other"), CaseStatus::Skipped);
    }

    #[test]
    fn only_on_suite_covers_its_cases() {
        let mut registry = TestRegistry::new();
        registry.suite_with("focused suite", SuiteOptions::focused(), |r| {
            r.case(TestCase::new("in scope", |_| Ok(())));
        });
        registry.suite("plain suite", |r| {
            r.case(TestCase::new("out of scope", |_| Ok(())));
        });

        let (outcome, _) = run(&mut registry, &RunnerOptions::default());
        assert_eq!(outcome.results[0].status, CaseStatus::Passed);
        assert_eq!(outcome.results[1].status, CaseStatus::Skipped);
    }

    #[test]
    fn bail_stops_issuing_after_first_failure() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = TestRegistry::new();
        let t1 = mark(&log, "t1");
        let t3 = mark(&log, "t3");
        registry.suite("A", |r| {
            r.case(TestCase::new("t1", t1));
            r.case(TestCase::new("t2", |_| Err("boom".into())));
            r.case(TestCase::new("t3", t3));
        });

        let options = RunnerOptions {
            bail: true,
            ..RunnerOptions::default()
        };
        let (outcome, _) = run(&mut registry, &options);
        assert_eq!(*log.lock().unwrap(), vec!["t1"], "t3 must never start");
        assert_eq!(outcome.results[0].status, CaseStatus::Passed);
        assert_eq!(outcome.results[1].status, CaseStatus::Failed);
        assert_eq!(outcome.results[2].status, CaseStatus::Skipped);
    }

    #[test]
    fn bail_skips_following_suites_but_closes_started_ones() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = TestRegistry::new();
        let after_all = mark(&log, "after_all_A");
        let never = mark(&log, "before_all_B");
        registry.suite("A", |r| {
            r.after_all(after_all);
            r.case(TestCase::new("fails", |_| Err("boom".into())));
        });
        registry.suite("B", |r| {
            r.before_all(never);
            r.case(TestCase::new("later", |_| Ok(())));
        });

        let options = RunnerOptions {
            bail: true,
            ..RunnerOptions::default()
        };
        let (outcome, _) = run(&mut registry, &options);
        // A's afterAll still runs; B is never started so its brackets don't.
        assert_eq!(*log.lock().unwrap(), vec!["after_all_A"]);
        assert_eq!(outcome.results[1].status, CaseStatus::Skipped);
    }

    #[test]
    fn before_all_failure_skips_suite_recursively_but_runs_after_all() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = TestRegistry::new();
        let after_all = mark(&log, "after_all");
        let c1 = mark(&log, "c1");
        let c2 = mark(&log, "c2");
        registry.suite("A", |r| {
            r.before_all(|_| Err("setup failed".into()));
            r.after_all(after_all);
            r.case(TestCase::new("c1", c1));
            r.suite("B", |r| {
                r.case(TestCase::new("c2", c2));
            });
        });

        let (outcome, _) = run(&mut registry, &RunnerOptions::default());
        assert_eq!(*log.lock().unwrap(), vec!["after_all"]);
        assert!(outcome.results.iter().all(|r| r.status == CaseStatus::Skipped));
        assert_eq!(outcome.hook_errors.len(), 1);
        assert_eq!(outcome.hook_errors[0].kind, HookKind::BeforeAll);
        assert_eq!(outcome.hook_errors[0].message, "setup failed");
        // All-skipped is a valid outcome, not a failure.
        assert!(outcome.success());
    }

    #[test]
    fn after_each_failure_is_recorded_not_fatal() {
        let mut registry = TestRegistry::new();
        registry.suite("A", |r| {
            r.after_each(|_| Err("teardown failed".into()));
            r.case(TestCase::new("passes", |_| Ok(())));
        });

        let (outcome, _) = run(&mut registry, &RunnerOptions::default());
        assert!(outcome.success());
        assert_eq!(outcome.results[0].status, CaseStatus::Passed);
        assert_eq!(outcome.hook_errors.len(), 1);
        assert_eq!(outcome.hook_errors[0].kind, HookKind::AfterEach);
    }

    #[test]
    fn after_all_failure_is_recorded_not_fatal() {
        let mut registry = TestRegistry::new();
        registry.suite("A", |r| {
            r.after_all(|_| Err("cleanup failed".into()));
            r.case(TestCase::new("passes", |_| Ok(())));
        });

        let (outcome, _) = run(&mut registry, &RunnerOptions::default());
        assert!(outcome.success());
        assert_eq!(outcome.hook_errors.len(), 1);
        assert_eq!(outcome.hook_errors[0].kind, HookKind::AfterAll);
    }

    #[test]
    fn filter_skips_non_matching_names() {
        let mut registry = TestRegistry::new();
        registry.suite("A", |r| {
            r.case(TestCase::new("create user", |_| Ok(())));
            r.case(TestCase::new("ping", |_| Ok(())));
        });

        let options = RunnerOptions {
            filter: Some("user".into()),
            ..RunnerOptions::default()
        };
        let (outcome, _) = run(&mut registry, &options);
        assert_eq!(outcome.results[0].status, CaseStatus::Passed);
        assert_eq!(outcome.results[1].status, CaseStatus::Skipped);
    }

    #[test]
    fn reporter_sees_tree_ordered_events() {
        let mut registry = TestRegistry::new();
        registry.suite("outer", |r| {
            r.case(TestCase::new("first", |_| Ok(())));
            r.suite("inner", |r| {
                r.case(TestCase::new("second", |_| Ok(())));
            });
        });

        let (_, reporter) = run(&mut registry, &RunnerOptions::default());
        assert_eq!(
            reporter.events,
            vec![
                "run_start(2)",
                "suite_start(outer)",
                "test_start(first)",
                "test_end(first, passed)",
                "suite_start(inner)",
                "test_start(second)",
                "test_end(second, passed)",
                "suite_end(inner)",
                "suite_end(outer)",
                "run_end(2/2/0/0)",
            ]
        );
    }

    #[test]
    fn skipped_case_emits_only_test_end() {
        let mut registry = TestRegistry::new();
        registry.suite("A", |r| {
            r.case(TestCase::new("skipped one", |_| Ok(())).skipped());
        });

        let (_, reporter) = run(&mut registry, &RunnerOptions::default());
        assert!(!reporter.events.iter().any(|e| e == "test_start(skipped one)"));
        assert!(reporter.events.contains(&"test_end(skipped one, skipped)".into()));
    }

    #[test]
    fn statuses_and_durations_written_back_to_tree() {
        let mut registry = TestRegistry::new();
        let id = registry.suite("A", |r| {
            r.case(TestCase::new("passes", |_| Ok(())));
            r.case(TestCase::new("fails", |_| Err("boom".into())));
        });

        run(&mut registry, &RunnerOptions::default());
        let suite = registry.suite_ref(id);
        assert_eq!(suite.cases[0].status, CaseStatus::Passed);
        assert_eq!(suite.cases[1].status, CaseStatus::Failed);
        assert_eq!(suite.cases[1].error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn timed_out_case_reports_sub_state_of_failure() {
        let mut registry = TestRegistry::new();
        registry.suite("A", |r| {
            r.case(
                TestCase::new("sleeper", |_| {
                    std::thread::sleep(Duration::from_millis(120));
                    Ok(())
                })
                .with_timeout(Duration::from_millis(30)),
            );
        });

        let (outcome, _) = run(&mut registry, &RunnerOptions::default());
        assert_eq!(outcome.results[0].status, CaseStatus::TimedOut);
        assert_eq!(outcome.summary.failed, 1);
        assert!(!outcome.success());
    }

    #[test]
    fn result_count_invariant_holds() {
        let mut registry = TestRegistry::new();
        registry.suite("A", |r| {
            r.case(TestCase::new("passes", |_| Ok(())));
            r.case(TestCase::new("fails", |_| Err("boom".into())));
            r.case(TestCase::new("skipped", |_| Ok(())).skipped());
        });

        let (outcome, _) = run(&mut registry, &RunnerOptions::default());
        let s = &outcome.summary;
        assert_eq!(s.total, s.passed + s.failed + s.skipped);
        assert_eq!((s.passed, s.failed, s.skipped), (1, 1, 1));
    }
}
