use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lifecycle of a timeout-bounded unit of work.
///
/// Stored as a `u8` behind an atomic so transitions are lock-free; the
/// numeric encoding is internal to this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutState {
    NotStarted,
    Running,
    Completed,
    TimedOut,
    /// The budget was extended while the unit was still inside it.
    Extended,
    /// Elapsed time has passed the base budget but a granted extension
    /// still covers it.
    GracePeriod,
}

impl TimeoutState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::TimedOut,
            4 => Self::Extended,
            _ => Self::GracePeriod,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::Running => 1,
            Self::Completed => 2,
            Self::TimedOut => 3,
            Self::Extended => 4,
            Self::GracePeriod => 5,
        }
    }

    /// Terminal states: the unit has finished or been flagged.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut)
    }
}

/// Error from [`TimeoutContext::extend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtendError {
    /// The cumulative extension would exceed the configured ceiling.
    CeilingExceeded { requested: Duration, ceiling: Duration },
    /// The unit has already completed or timed out.
    Settled,
}

impl fmt::Display for ExtendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CeilingExceeded { requested, ceiling } => write!(
                f,
                "extension to {}ms exceeds ceiling of {}ms",
                requested.as_millis(),
                ceiling.as_millis()
            ),
            Self::Settled => write!(f, "unit has already settled"),
        }
    }
}

/// Tracks the wall-clock budget of one unit of work.
///
/// The owning executor starts the context when the unit is dispatched and
/// queries [`is_timed_out`](Self::is_timed_out); the background monitor
/// polls the same method. Neither interrupts the unit — a flagged context
/// only tells the executor to stop waiting.
pub struct TimeoutContext {
    budget: Duration,
    ceiling: Duration,
    extension_ms: AtomicU64,
    state: AtomicU8,
    started: OnceLock<Instant>,
}

impl TimeoutContext {
    /// A context with the given budget and extension ceiling.
    pub fn new(budget: Duration, ceiling: Duration) -> Self {
        Self {
            budget,
            ceiling,
            extension_ms: AtomicU64::new(0),
            state: AtomicU8::new(TimeoutState::NotStarted.as_u8()),
            started: OnceLock::new(),
        }
    }

    /// Record the start timestamp and move to `Running`.
    pub fn start(&self) {
        let _ = self.started.set(Instant::now());
        let _ = self.state.compare_exchange(
            TimeoutState::NotStarted.as_u8(),
            TimeoutState::Running.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn state(&self) -> TimeoutState {
        TimeoutState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Cumulative extension granted so far.
    pub fn extension(&self) -> Duration {
        Duration::from_millis(self.extension_ms.load(Ordering::Acquire))
    }

    /// Time since `start`, zero if never started.
    pub fn elapsed(&self) -> Duration {
        self.started.get().map_or(Duration::ZERO, Instant::elapsed)
    }

    /// Grant additional budget.
    ///
    /// # Errors
    ///
    /// Rejected once the cumulative extension would exceed the ceiling, or
    /// after the unit has settled.
    pub fn extend(&self, extra: Duration) -> Result<(), ExtendError> {
        if self.state().is_settled() {
            return Err(ExtendError::Settled);
        }
        let extra_ms = extra.as_millis() as u64;
        let mut current = self.extension_ms.load(Ordering::Acquire);
        loop {
            let requested = Duration::from_millis(current + extra_ms);
            if requested > self.ceiling {
                return Err(ExtendError::CeilingExceeded {
                    requested,
                    ceiling: self.ceiling,
                });
            }
            match self.extension_ms.compare_exchange(
                current,
                current + extra_ms,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        self.transition_if_live(TimeoutState::Extended);
        Ok(())
    }

    /// Mark the unit finished. Returns false if it had already been
    /// flagged as timed out, in which case the flag wins.
    pub fn complete(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if TimeoutState::from_u8(current).is_settled() {
                return TimeoutState::from_u8(current) == TimeoutState::Completed;
            }
            match self.state.compare_exchange(
                current,
                TimeoutState::Completed.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Lazily evaluate `elapsed >= budget + extension`.
    ///
    /// Flags the context `TimedOut` on expiry, or `GracePeriod` when only
    /// a granted extension still covers the elapsed time. A completed
    /// context is never timed out.
    pub fn is_timed_out(&self) -> bool {
        match self.state() {
            TimeoutState::Completed => return false,
            TimeoutState::TimedOut => return true,
            TimeoutState::NotStarted => return false,
            _ => {}
        }
        let elapsed = self.elapsed();
        let extension = self.extension();
        if elapsed >= self.budget + extension {
            self.transition_if_live(TimeoutState::TimedOut);
            // Re-check: a racing complete() may have won.
            return self.state() == TimeoutState::TimedOut;
        }
        if elapsed >= self.budget && !extension.is_zero() {
            self.transition_if_live(TimeoutState::GracePeriod);
        }
        false
    }

    fn transition_if_live(&self, target: TimeoutState) {
        let mut current = self.state.load(Ordering::Acquire);
        while !TimeoutState::from_u8(current).is_settled() {
            match self.state.compare_exchange(
                current,
                target.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

impl fmt::Debug for TimeoutContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutContext")
            .field("budget", &self.budget)
            .field("ceiling", &self.ceiling)
            .field("extension", &self.extension())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const CEILING: Duration = Duration::from_millis(500);

    #[test]
    fn context_starts_not_started() {
        let ctx = TimeoutContext::new(Duration::from_millis(100), CEILING);
        assert_eq!(ctx.state(), TimeoutState::NotStarted);
        assert_eq!(ctx.elapsed(), Duration::ZERO);
        assert!(!ctx.is_timed_out());
    }

    #[test]
    fn start_moves_to_running() {
        let ctx = TimeoutContext::new(Duration::from_millis(100), CEILING);
        ctx.start();
        assert_eq!(ctx.state(), TimeoutState::Running);
    }

    #[test]
    fn within_budget_is_not_timed_out() {
        let ctx = TimeoutContext::new(Duration::from_secs(60), CEILING);
        ctx.start();
        assert!(!ctx.is_timed_out());
        assert_eq!(ctx.state(), TimeoutState::Running);
    }

    #[test]
    fn expired_budget_flags_timed_out() {
        let ctx = TimeoutContext::new(Duration::from_millis(10), CEILING);
        ctx.start();
        thread::sleep(Duration::from_millis(25));
        assert!(ctx.is_timed_out());
        assert_eq!(ctx.state(), TimeoutState::TimedOut);
    }

    #[test]
    fn completed_context_never_times_out() {
        let ctx = TimeoutContext::new(Duration::from_millis(10), CEILING);
        ctx.start();
        assert!(ctx.complete());
        thread::sleep(Duration::from_millis(25));
        assert!(!ctx.is_timed_out());
        assert_eq!(ctx.state(), TimeoutState::Completed);
    }

    #[test]
    fn complete_loses_to_prior_timeout_flag() {
        let ctx = TimeoutContext::new(Duration::from_millis(5), CEILING);
        ctx.start();
        thread::sleep(Duration::from_millis(15));
        assert!(ctx.is_timed_out());
        assert!(!ctx.complete());
        assert_eq!(ctx.state(), TimeoutState::TimedOut);
    }

    #[test]
    fn extend_within_ceiling_accumulates() {
        let ctx = TimeoutContext::new(Duration::from_millis(100), CEILING);
        ctx.start();
        ctx.extend(Duration::from_millis(200)).unwrap();
        ctx.extend(Duration::from_millis(200)).unwrap();
        assert_eq!(ctx.extension(), Duration::from_millis(400));
        assert_eq!(ctx.state(), TimeoutState::Extended);
    }

    #[test]
    fn extend_past_ceiling_is_rejected() {
        let ctx = TimeoutContext::new(Duration::from_millis(100), CEILING);
        ctx.start();
        ctx.extend(Duration::from_millis(400)).unwrap();
        let err = ctx.extend(Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, ExtendError::CeilingExceeded { .. }));
        // The granted extension is unchanged by the rejected request.
        assert_eq!(ctx.extension(), Duration::from_millis(400));
    }

    #[test]
    fn extend_after_settling_is_rejected() {
        let ctx = TimeoutContext::new(Duration::from_millis(100), CEILING);
        ctx.start();
        ctx.complete();
        assert_eq!(
            ctx.extend(Duration::from_millis(10)),
            Err(ExtendError::Settled)
        );
    }

    #[test]
    fn extension_defers_timeout() {
        let ctx = TimeoutContext::new(Duration::from_millis(10), CEILING);
        ctx.start();
        ctx.extend(Duration::from_millis(300)).unwrap();
        thread::sleep(Duration::from_millis(30));
        // Past the base budget, inside the extension: grace period.
        assert!(!ctx.is_timed_out());
        assert_eq!(ctx.state(), TimeoutState::GracePeriod);
    }

    #[test]
    fn exhausted_extension_times_out() {
        let ctx = TimeoutContext::new(Duration::from_millis(5), CEILING);
        ctx.start();
        ctx.extend(Duration::from_millis(10)).unwrap();
        thread::sleep(Duration::from_millis(30));
        assert!(ctx.is_timed_out());
        assert_eq!(ctx.state(), TimeoutState::TimedOut);
    }

    #[test]
    fn extend_error_display() {
        let err = ExtendError::CeilingExceeded {
            requested: Duration::from_millis(600),
            ceiling: Duration::from_millis(500),
        };
        assert_eq!(err.to_string(), "extension to 600ms exceeds ceiling of 500ms");
        assert_eq!(ExtendError::Settled.to_string(), "unit has already settled");
    }
}
