use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::timeout::context::TimeoutContext;

/// How often the monitor sweeps registered contexts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Background watchdog over all active timeout contexts.
///
/// One dedicated thread polls every registered context at a fixed
/// interval and lets [`TimeoutContext::is_timed_out`] flag expiries. The
/// monitor never interrupts a unit of work; the owning executor observes
/// the flag and reacts. Settled contexts are dropped from the sweep.
pub struct TimeoutMonitor {
    contexts: Arc<Mutex<Vec<Arc<TimeoutContext>>>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TimeoutMonitor {
    /// Start a monitor with the default poll interval.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the monitor thread cannot be spawned.
    /// Callers may fall back to [`disabled`](Self::disabled) — timeouts
    /// still trip when the executor itself queries the context.
    pub fn start() -> io::Result<Self> {
        Self::start_with_interval(DEFAULT_POLL_INTERVAL)
    }

    pub fn start_with_interval(interval: Duration) -> io::Result<Self> {
        let contexts: Arc<Mutex<Vec<Arc<TimeoutContext>>>> = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_contexts = Arc::clone(&contexts);
        let thread_shutdown = Arc::clone(&shutdown);
        let handle = thread::Builder::new()
            .name("timeout-monitor".into())
            .spawn(move || {
                while !thread_shutdown.load(Ordering::Acquire) {
                    if let Ok(mut active) = thread_contexts.lock() {
                        active.retain(|ctx| !ctx.state().is_settled());
                        for ctx in active.iter() {
                            let _ = ctx.is_timed_out();
                        }
                    }
                    thread::sleep(interval);
                }
            })?;

        Ok(Self {
            contexts,
            shutdown,
            handle: Some(handle),
        })
    }

    /// A monitor with no background thread. Contexts can still be
    /// registered; expiry is only detected when the executor queries.
    pub fn disabled() -> Self {
        Self {
            contexts: Arc::new(Mutex::new(Vec::new())),
            shutdown: Arc::new(AtomicBool::new(true)),
            handle: None,
        }
    }

    /// Put a context under watch.
    pub fn register(&self, ctx: Arc<TimeoutContext>) {
        if let Ok(mut active) = self.contexts.lock() {
            active.push(ctx);
        }
    }

    /// Number of contexts currently under watch.
    pub fn watched(&self) -> usize {
        self.contexts.lock().map_or(0, |active| active.len())
    }
}

impl Drop for TimeoutMonitor {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
