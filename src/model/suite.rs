use std::fmt;
use std::time::Duration;

use crate::model::case::{TestCase, Work};

/// Index of a suite inside the registry's arena.
///
/// Suites are stored in a flat `Vec`; parent and child references are
/// lookup keys into it, never owning pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SuiteId(pub(crate) usize);

impl SuiteId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Which of the four lifecycle hook lists a hook belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    BeforeEach,
    AfterEach,
    BeforeAll,
    AfterAll,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeEach => write!(f, "beforeEach"),
            Self::AfterEach => write!(f, "afterEach"),
            Self::BeforeAll => write!(f, "beforeAll"),
            Self::AfterAll => write!(f, "afterAll"),
        }
    }
}

/// A named grouping of test cases and nested suites, carrying its own
/// hook lists and inheritable `skip`/`only` modifiers.
pub struct TestSuite {
    pub name: String,
    pub cases: Vec<TestCase>,
    pub children: Vec<SuiteId>,
    pub before_each: Vec<Work>,
    pub after_each: Vec<Work>,
    pub before_all: Vec<Work>,
    pub after_all: Vec<Work>,
    pub skip: bool,
    pub only: bool,
    /// Per-suite budget; applies to cases without their own.
    pub timeout: Option<Duration>,
    pub parent: Option<SuiteId>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cases: Vec::new(),
            children: Vec::new(),
            before_each: Vec::new(),
            after_each: Vec::new(),
            before_all: Vec::new(),
            after_all: Vec::new(),
            skip: false,
            only: false,
            timeout: None,
            parent: None,
        }
    }

    pub fn hooks(&self, kind: HookKind) -> &[Work] {
        match kind {
            HookKind::BeforeEach => &self.before_each,
            HookKind::AfterEach => &self.after_each,
            HookKind::BeforeAll => &self.before_all,
            HookKind::AfterAll => &self.after_all,
        }
    }
}

impl fmt::Debug for TestSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSuite")
            .field("name", &self.name)
            .field("cases", &self.cases)
            .field("children", &self.children)
            .field("skip", &self.skip)
            .field("only", &self.only)
            .field("timeout", &self.timeout)
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

/// Declaration-time modifiers for a suite.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuiteOptions {
    pub skip: bool,
    pub only: bool,
    pub timeout: Option<Duration>,
}

impl SuiteOptions {
    pub fn skipped() -> Self {
        Self {
            skip: true,
            ..Self::default()
        }
    }

    pub fn focused() -> Self {
        Self {
            only: true,
            ..Self::default()
        }
    }

    pub fn with_timeout(budget: Duration) -> Self {
        Self {
            timeout: Some(budget),
            ..Self::default()
        }
    }
}
