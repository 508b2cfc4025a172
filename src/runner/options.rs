use std::time::Duration;

/// Configuration accepted by either executor.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Stop issuing new cases after the first failure.
    pub bail: bool,
    /// Skip any case whose name does not contain this substring.
    pub filter: Option<String>,
    /// Use the bounded-parallel scheduler instead of the sequential runner.
    pub parallel: bool,
    /// Worker-pool degree; `None` means available parallelism. Only
    /// meaningful when `parallel` is set.
    pub jobs: Option<usize>,
    /// Global per-unit budget for cases and suites without their own;
    /// `None` means unlimited.
    pub default_timeout: Option<Duration>,
    /// Ceiling on the cumulative timeout extension a unit may request.
    pub max_extension: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            bail: false,
            filter: None,
            parallel: false,
            jobs: None,
            default_timeout: None,
            max_extension: Duration::from_secs(5),
        }
    }
}
