use std::cell::RefCell;
use std::thread;
use std::time::Duration;

/// Blocking wait between remote calls.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Parks the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Records requested waits without blocking.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    waits: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.borrow().clone()
    }

    pub fn total(&self) -> Duration {
        self.waits.borrow().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.waits.borrow_mut().push(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay: Duration::from_millis(500),
        }
    }
}

/// Poll `predicate` up to `policy.max_attempts` times, waiting `policy.delay`
/// before each attempt. Returns `Ok(true)` as soon as the predicate holds,
/// `Ok(false)` once the attempts are spent. A predicate error stops polling.
pub fn poll_until<E, F>(
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
    mut predicate: F,
) -> Result<bool, E>
where
    F: FnMut(u32) -> Result<bool, E>,
{
    for attempt in 1..=policy.max_attempts {
        sleeper.sleep(policy.delay);
        if predicate(attempt)? {
            return Ok(true);
        }
    }
    Ok(false)
}
