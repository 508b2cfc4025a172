use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::model::case::{TestContext, Work};
use crate::timeout::context::TimeoutContext;
use crate::timeout::monitor::TimeoutMonitor;

/// Completion-poll granularity for [`TestFuture::await_value`] and
/// [`run_bounded`].
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A single-assignment result container for one asynchronous unit of work.
///
/// The unit runs on its own thread and settles the future exactly once via
/// [`resolve`](Self::resolve) or [`reject`](Self::reject); later writes are
/// ignored. The owning caller busy-polls [`is_completed`](Self::is_completed)
/// (or blocks in [`await_value`](Self::await_value)) to retrieve the outcome.
pub struct TestFuture<T> {
    inner: Arc<FutureInner<T>>,
}

struct FutureInner<T> {
    completed: AtomicBool,
    result: Mutex<Option<Result<T, String>>>,
}

impl<T> TestFuture<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(FutureInner {
                completed: AtomicBool::new(false),
                result: Mutex::new(None),
            }),
        }
    }

    /// Settle with a success value. First write wins.
    pub fn resolve(&self, value: T) {
        self.settle(Ok(value));
    }

    /// Settle with a failure message. First write wins.
    pub fn reject(&self, error: impl Into<String>) {
        self.settle(Err(error.into()));
    }

    fn settle(&self, outcome: Result<T, String>) {
        if let Ok(mut slot) = self.inner.result.lock()
            && slot.is_none()
        {
            *slot = Some(outcome);
            self.inner.completed.store(true, Ordering::Release);
        }
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed.load(Ordering::Acquire)
    }

    /// Block until the future settles, then take its outcome.
    pub fn await_value(&self) -> Result<T, String> {
        while !self.is_completed() {
            thread::sleep(POLL_INTERVAL);
        }
        self.take_outcome()
    }

    fn take_outcome(&self) -> Result<T, String> {
        match self.inner.result.lock() {
            Ok(mut slot) => slot
                .take()
                .unwrap_or_else(|| Err("future settled but outcome already taken".into())),
            Err(_) => Err("future state poisoned".into()),
        }
    }
}

impl<T> Clone for TestFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for TestFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TestFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestFuture")
            .field("completed", &self.is_completed())
            .finish()
    }
}

/// Outcome of racing one unit of work against its budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundedError {
    /// The unit ran to completion and reported a failure (or panicked).
    Failed(String),
    /// The budget (including any extension) elapsed first. The unit's
    /// thread is abandoned, not interrupted.
    TimedOut { allowed: Duration, elapsed: Duration },
}

impl fmt::Display for BoundedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(message) => write!(f, "{message}"),
            Self::TimedOut { allowed, elapsed } => write!(
                f,
                "timed out after {}ms (budget {}ms)",
                elapsed.as_millis(),
                allowed.as_millis()
            ),
        }
    }
}

fn invoke(work: &Work, ctx: &TestContext) -> Result<(), String> {
    match panic::catch_unwind(AssertUnwindSafe(|| work(ctx))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            Err(format!("panicked: {message}"))
        }
    }
}

/// Run one unit of work, bounded by an optional wall-clock budget.
///
/// Unbounded units run inline on the caller's thread. Bounded units are
/// dispatched onto their own thread, registered with the monitor, and
/// raced against the budget; on expiry the caller receives
/// [`BoundedError::TimedOut`] and abandons the still-running thread —
/// best-effort abandonment, not cancellation. The detached thread may keep
/// consuming resources until its work naturally finishes.
pub fn run_bounded(
    work: &Work,
    case_name: &str,
    budget: Option<Duration>,
    extension_ceiling: Duration,
    monitor: &TimeoutMonitor,
) -> Result<(), BoundedError> {
    let Some(budget) = budget else {
        let ctx = TestContext::new(case_name);
        return invoke(work, &ctx).map_err(BoundedError::Failed);
    };

    let timeout = Arc::new(TimeoutContext::new(budget, extension_ceiling));
    monitor.register(Arc::clone(&timeout));

    let future: TestFuture<()> = TestFuture::new();
    let thread_future = future.clone();
    let thread_work = Arc::clone(work);
    let thread_ctx = TestContext::with_timeout(case_name, Arc::clone(&timeout));

    timeout.start();
    let spawned = thread::Builder::new()
        .name(format!("unit: {case_name}"))
        .spawn(move || match invoke(&thread_work, &thread_ctx) {
            Ok(()) => thread_future.resolve(()),
            Err(e) => thread_future.reject(e),
        });
    if let Err(e) = spawned {
        return Err(BoundedError::Failed(format!(
            "failed to dispatch unit of work: {e}"
        )));
    }

    while !future.is_completed() {
        if timeout.is_timed_out() {
            return Err(BoundedError::TimedOut {
                allowed: timeout.budget() + timeout.extension(),
                elapsed: timeout.elapsed(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
    timeout.complete();
    future.await_value().map_err(BoundedError::Failed)
}

/// Run a group of units in batches of at most `max_concurrent`, applying
/// the same race-against-budget policy to each member before the next
/// batch starts. Results are returned in input order.
pub fn execute_concurrent(
    units: &[(String, Work)],
    max_concurrent: usize,
    budget: Option<Duration>,
    extension_ceiling: Duration,
    monitor: &TimeoutMonitor,
) -> Vec<Result<(), BoundedError>> {
    let batch_size = max_concurrent.max(1);
    let mut results = Vec::with_capacity(units.len());

    for batch in units.chunks(batch_size) {
        let mut in_flight = Vec::with_capacity(batch.len());
        for (name, work) in batch {
            in_flight.push(dispatch(work, name, budget, extension_ceiling, monitor));
        }
        for flight in in_flight {
            results.push(settle(flight));
        }
    }
    results
}

enum Flight {
    Spawned {
        future: TestFuture<()>,
        timeout: Option<Arc<TimeoutContext>>,
    },
    FailedToStart(String),
}

fn dispatch(
    work: &Work,
    case_name: &str,
    budget: Option<Duration>,
    extension_ceiling: Duration,
    monitor: &TimeoutMonitor,
) -> Flight {
    let timeout = budget.map(|b| {
        let ctx = Arc::new(TimeoutContext::new(b, extension_ceiling));
        monitor.register(Arc::clone(&ctx));
        ctx
    });

    let future: TestFuture<()> = TestFuture::new();
    let thread_future = future.clone();
    let thread_work = Arc::clone(work);
    let thread_ctx = match &timeout {
        Some(ctx) => TestContext::with_timeout(case_name, Arc::clone(ctx)),
        None => TestContext::new(case_name),
    };

    if let Some(ctx) = &timeout {
        ctx.start();
    }
    let spawned = thread::Builder::new()
        .name(format!("unit: {case_name}"))
        .spawn(move || match invoke(&thread_work, &thread_ctx) {
            Ok(()) => thread_future.resolve(()),
            Err(e) => thread_future.reject(e),
        });
    match spawned {
        Ok(_) => Flight::Spawned { future, timeout },
        Err(e) => Flight::FailedToStart(format!("failed to dispatch unit of work: {e}")),
    }
}

fn settle(flight: Flight) -> Result<(), BoundedError> {
    match flight {
        Flight::FailedToStart(message) => Err(BoundedError::Failed(message)),
        Flight::Spawned { future, timeout } => {
            match timeout {
                Some(ctx) => {
                    while !future.is_completed() {
                        if ctx.is_timed_out() {
                            return Err(BoundedError::TimedOut {
                                allowed: ctx.budget() + ctx.extension(),
                                elapsed: ctx.elapsed(),
                            });
                        }
                        thread::sleep(POLL_INTERVAL);
                    }
                    ctx.complete();
                }
                None => {
                    while !future.is_completed() {
                        thread::sleep(POLL_INTERVAL);
                    }
                }
            }
            future.await_value().map_err(BoundedError::Failed)
        }
    }
}
