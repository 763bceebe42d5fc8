//! Timing scopes around long-running operations.

use std::time::{Duration, Instant};

/// Logs the start of an operation and, when dropped, how long it took.
///
/// The elapsed time is logged on every exit path, including `?` early
/// returns and unwinding.
#[derive(Debug)]
pub struct TimedScope {
    name: &'static str,
    start: Instant,
}

impl TimedScope {
    pub fn start(name: &'static str) -> Self {
        tracing::info!("[{} running...]", name);
        Self {
            name,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for TimedScope {
    fn drop(&mut self) {
        tracing::info!(
            "[{} took {:.1} seconds]",
            self.name,
            self.start.elapsed().as_secs_f64()
        );
    }
}

/// Run `f` inside a [`TimedScope`] named `name`.
pub fn timed<T, F>(name: &'static str, f: F) -> T
where
    F: FnOnce() -> T,
{
    let _scope = TimedScope::start(name);
    f()
}
