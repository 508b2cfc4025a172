use std::time::Duration;

use crate::model::case::{TestCase, TestContext, Work};
use crate::model::suite::{SuiteId, SuiteOptions, TestSuite};

/// Name given to the suite synthesized for cases declared outside any suite.
pub const DEFAULT_SUITE_NAME: &str = "(default)";

/// Owns the suite tree and routes declarations during registration.
///
/// Suites live in a flat arena; `SuiteId` values index into it. The
/// `cursor` tracks the suite currently being declared so nested `suite`
/// calls and `case`/hook declarations land in the right place. The tree
/// is built by a single-threaded registration pass and treated as
/// read-only during execution, except for each case's own
/// status/duration/error fields.
pub struct TestRegistry {
    suites: Vec<TestSuite>,
    roots: Vec<SuiteId>,
    cursor: Option<SuiteId>,
    default_root: Option<SuiteId>,
    has_only: bool,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self {
            suites: Vec::new(),
            roots: Vec::new(),
            cursor: None,
            default_root: None,
            has_only: false,
        }
    }

    /// Declare a suite under the current cursor (or as a root) and run
    /// `body` with the cursor pointing at it.
    pub fn suite(&mut self, name: impl Into<String>, body: impl FnOnce(&mut Self)) -> SuiteId {
        self.suite_with(name, SuiteOptions::default(), body)
    }

    /// Declare a suite with explicit modifiers.
    pub fn suite_with(
        &mut self,
        name: impl Into<String>,
        options: SuiteOptions,
        body: impl FnOnce(&mut Self),
    ) -> SuiteId {
        let mut suite = TestSuite::new(name);
        suite.skip = options.skip;
        suite.only = options.only;
        suite.timeout = options.timeout;
        suite.parent = self.cursor;
        if options.only {
            self.has_only = true;
        }

        let id = SuiteId(self.suites.len());
        self.suites.push(suite);
        match self.cursor {
            Some(parent) => self.suites[parent.0].children.push(id),
            None => self.roots.push(id),
        }

        let previous = self.cursor.replace(id);
        body(self);
        self.cursor = previous;
        id
    }

    /// Declare a case in the cursor's suite, synthesizing an anonymous
    /// default suite when no suite is being declared.
    pub fn case(&mut self, case: TestCase) {
        if case.only {
            self.has_only = true;
        }
        let target = self.cursor_or_default();
        self.suites[target.0].cases.push(case);
    }

    pub fn before_each(
        &mut self,
        hook: impl Fn(&TestContext) -> Result<(), String> + Send + Sync + 'static,
    ) {
        let target = self.cursor_or_default();
        self.suites[target.0].before_each.push(std::sync::Arc::new(hook));
    }

    pub fn after_each(
        &mut self,
        hook: impl Fn(&TestContext) -> Result<(), String> + Send + Sync + 'static,
    ) {
        let target = self.cursor_or_default();
        self.suites[target.0].after_each.push(std::sync::Arc::new(hook));
    }

    pub fn before_all(
        &mut self,
        hook: impl Fn(&TestContext) -> Result<(), String> + Send + Sync + 'static,
    ) {
        let target = self.cursor_or_default();
        self.suites[target.0].before_all.push(std::sync::Arc::new(hook));
    }

    pub fn after_all(
        &mut self,
        hook: impl Fn(&TestContext) -> Result<(), String> + Send + Sync + 'static,
    ) {
        let target = self.cursor_or_default();
        self.suites[target.0].after_all.push(std::sync::Arc::new(hook));
    }

    fn cursor_or_default(&mut self) -> SuiteId {
        if let Some(cursor) = self.cursor {
            return cursor;
        }
        if let Some(default) = self.default_root {
            return default;
        }
        let id = SuiteId(self.suites.len());
        self.suites.push(TestSuite::new(DEFAULT_SUITE_NAME));
        self.roots.push(id);
        self.default_root = Some(id);
        id
    }

    pub fn roots(&self) -> &[SuiteId] {
        &self.roots
    }

    pub fn suite_ref(&self, id: SuiteId) -> &TestSuite {
        &self.suites[id.0]
    }

    pub fn suite_mut(&mut self, id: SuiteId) -> &mut TestSuite {
        &mut self.suites[id.0]
    }

    /// True if any suite or case anywhere in the tree carries `only`.
    pub fn has_only(&self) -> bool {
        self.has_only
    }

    /// Ancestor chain from root down to (and including) `id`.
    fn chain(&self, id: SuiteId) -> Vec<SuiteId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = self.suites[current.0].parent {
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chain
    }

    /// Effective `beforeEach` list for a case in `id`: ancestors first,
    /// the case's own suite last. Recomputed per call; chains are bounded
    /// by nesting depth, so no caching.
    pub fn effective_before_each(&self, id: SuiteId) -> Vec<Work> {
        self.chain(id)
            .iter()
            .flat_map(|s| self.suites[s.0].before_each.iter().cloned())
            .collect()
    }

    /// Effective `afterEach` list: the case's own suite first, root last.
    pub fn effective_after_each(&self, id: SuiteId) -> Vec<Work> {
        self.chain(id)
            .iter()
            .rev()
            .flat_map(|s| self.suites[s.0].after_each.iter().cloned())
            .collect()
    }

    /// OR-fold of `skip` up the ancestor chain.
    pub fn should_skip(&self, id: SuiteId) -> bool {
        self.chain(id).iter().any(|s| self.suites[s.0].skip)
    }

    /// OR-fold of `only` up the ancestor chain (suite-level marks only;
    /// case-level `only` is checked by the executor).
    pub fn scope_has_only(&self, id: SuiteId) -> bool {
        self.chain(id).iter().any(|s| self.suites[s.0].only)
    }

    /// Resolve the budget for a case in `id`: per-test, else the nearest
    /// ancestor suite's, else the global default, else unlimited.
    pub fn effective_timeout(
        &self,
        id: SuiteId,
        case_timeout: Option<Duration>,
        default: Option<Duration>,
    ) -> Option<Duration> {
        if case_timeout.is_some() {
            return case_timeout;
        }
        self.chain(id)
            .iter()
            .rev()
            .find_map(|s| self.suites[s.0].timeout)
            .or(default)
    }

    /// Total number of cases in the tree.
    pub fn case_count(&self) -> usize {
        self.suites.iter().map(|s| s.cases.len()).sum()
    }

    /// Whether any case name contains the given substring.
    pub fn any_case_matches(&self, filter: &str) -> bool {
        self.suites
            .iter()
            .any(|s| s.cases.iter().any(|c| c.name.contains(filter)))
    }
}

impl Default for TestRegistry {
    fn default() -> Self {
        Self::new()
    }
}
