//! Supervision strategies
//!

use std::{
    fmt::Debug,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use backoff::backoff::Backoff as InnerBackoff;

/// Trait to define a RetryStrategy. You can use this trait to define your
/// custom retry strategy.
pub trait RetryStrategy: Debug + Send + Sync {
    /// Maximum number of restarts before permanently failing an entity.
    fn max_retries(&self) -> usize;
    /// Wait duration before retrying.
    fn next_backoff(&mut self) -> Option<Duration>;
    /// Sliding window the restart budget applies within. `None` means a plain
    /// lifetime budget without a window.
    fn within_window(&self) -> Option<Duration> {
        None
    }
}

/// A SupervisionStrategy defines what to do when an entity fails. Currently
/// there are two choices: stop the entity and do nothing, or retry the start.
/// For Retry you can set a RetryStrategy.
#[derive(Debug)]
pub enum SupervisionStrategy {
    /// Stop the entity if an error occurs.
    Stop,
    /// Restart the entity if an error occurs.
    Retry(Box<dyn RetryStrategy>),
}

/// A retry strategy that immediately restarts an entity that failed.
#[derive(Debug, Default)]
pub struct NoIntervalStrategy {
    max_retries: usize,
}

impl NoIntervalStrategy {
    pub fn new(max_retries: usize) -> Self {
        NoIntervalStrategy { max_retries }
    }
}

impl RetryStrategy for NoIntervalStrategy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        None
    }
}

/// A retry strategy that restarts an entity with a fixed wait period before
/// retrying.
#[derive(Debug, Default)]
pub struct FixedIntervalStrategy {
    /// Maximum number of retries before permanently failing an entity.
    max_retries: usize,
    /// Wait duration before retrying.
    duration: Duration,
}

impl FixedIntervalStrategy {
    pub fn new(max_retries: usize, duration: Duration) -> Self {
        FixedIntervalStrategy {
            max_retries,
            duration,
        }
    }
}

impl RetryStrategy for FixedIntervalStrategy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        Some(self.duration)
    }
}

/// A retry strategy that restarts an entity with an exponential backoff wait
/// period before retrying.
#[derive(Debug, Default)]
pub struct ExponentialBackoffStrategy {
    /// Maximum number of retries before permanently failing an entity.
    max_retries: usize,
    /// Inner exponential backoff strategy.
    inner: Arc<Mutex<backoff::ExponentialBackoff>>,
}

impl ExponentialBackoffStrategy {
    pub fn new(max_retries: usize) -> Self {
        ExponentialBackoffStrategy {
            max_retries,
            inner: Arc::new(Mutex::new(backoff::ExponentialBackoff::default())),
        }
    }
}

impl RetryStrategy for ExponentialBackoffStrategy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        self.inner.lock().ok().and_then(|mut eb| eb.next_backoff())
    }
}

/// A retry strategy that restarts an entity immediately, but only allows
/// `max_retries` failures within a sliding time window. Once the budget is
/// exhausted inside the window the entity is stopped; failures older than the
/// window no longer count.
#[derive(Debug)]
pub struct WindowedStrategy {
    max_retries: usize,
    within: Duration,
}

impl WindowedStrategy {
    pub fn new(max_retries: usize, within: Duration) -> Self {
        WindowedStrategy {
            max_retries,
            within,
        }
    }
}

impl RetryStrategy for WindowedStrategy {
    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        None
    }

    fn within_window(&self) -> Option<Duration> {
        Some(self.within)
    }
}

/// Restart bookkeeping kept by the runner across an entity's lifetime.
///
/// Each failure instant is recorded; instants older than the strategy's
/// window are pruned before the budget is checked. With `max_retries = m`,
/// the `(m + 1)`th failure inside the window exhausts the budget.
#[derive(Debug, Default)]
pub(crate) struct RestartWindow {
    failures: Vec<Instant>,
}

impl RestartWindow {
    /// Records a failure and answers whether a restart is still allowed
    /// under the given budget.
    pub(crate) fn record(
        &mut self,
        max_retries: usize,
        within: Option<Duration>,
    ) -> bool {
        let now = Instant::now();
        self.failures.push(now);
        if let Some(window) = within {
            self.failures
                .retain(|instant| now.duration_since(*instant) <= window);
        }
        self.failures.len() <= max_retries
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_no_interval_strategy() {
        let mut strategy = NoIntervalStrategy::new(3);
        assert_eq!(strategy.max_retries(), 3);
        assert_eq!(strategy.next_backoff(), None);
        assert_eq!(strategy.within_window(), None);
    }

    #[test]
    fn test_fixed_interval_strategy() {
        let mut strategy =
            FixedIntervalStrategy::new(3, Duration::from_secs(1));
        assert_eq!(strategy.max_retries(), 3);
        assert_eq!(strategy.next_backoff(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_exponential_backoff_strategy() {
        let mut strategy = ExponentialBackoffStrategy::new(3);
        assert_eq!(strategy.max_retries(), 3);
        assert!(strategy.next_backoff().is_some());
    }

    #[test]
    fn test_windowed_strategy() {
        let mut strategy =
            WindowedStrategy::new(3, Duration::from_secs(10));
        assert_eq!(strategy.max_retries(), 3);
        assert_eq!(strategy.next_backoff(), None);
        assert_eq!(strategy.within_window(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_restart_window_budget() {
        let mut window = RestartWindow::default();
        let within = Some(Duration::from_secs(60));
        // Three failures fit in a budget of three.
        assert!(window.record(3, within));
        assert!(window.record(3, within));
        assert!(window.record(3, within));
        // The fourth inside the window exhausts the budget.
        assert!(!window.record(3, within));
    }

    #[test]
    fn test_restart_window_prunes_old_failures() {
        let mut window = RestartWindow::default();
        let within = Some(Duration::from_millis(1));
        assert!(window.record(1, within));
        std::thread::sleep(Duration::from_millis(10));
        // The first failure has left the window; the budget is fresh.
        assert!(window.record(1, within));
    }

    #[test]
    fn test_restart_window_without_window() {
        let mut window = RestartWindow::default();
        assert!(window.record(2, None));
        assert!(window.record(2, None));
        assert!(!window.record(2, None));
    }
}
