//! Bounded polling.
//!
//! [`wait_until`] repeatedly evaluates a predicate until it holds or a
//! wall-clock budget runs out.  The caller binds any arguments the predicate
//! needs by capturing them in the closure:
//!
//! ```no_run
//! use std::time::Duration;
//! use dut_ntp::poll::wait_until;
//!
//! let ready = wait_until(
//!     Duration::from_secs(30),
//!     Duration::from_secs(5),
//!     Duration::ZERO,
//!     || std::path::Path::new("/run/ntpd.pid").exists(),
//! );
//! ```
//!
//! A timeout is reported as `false`, never as an error.  Errors returned by a
//! fallible predicate (see [`try_wait_until`]) abort the wait and are handed
//! back unchanged.

use log::{debug, trace};
use std::convert::Infallible;
use std::thread;
use std::time::{Duration, Instant};

/// Lower bound applied to the polling interval so that a zero interval does
/// not turn into a busy loop.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Timing parameters of a bounded poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poll {
    /// Budget measured from the first predicate call.
    pub timeout: Duration,
    /// Spacing between predicate calls.
    pub interval: Duration,
    /// Initial wait before the first call.
    pub delay: Duration,
}

impl Poll {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The interval actually slept between attempts.
    pub fn effective_interval(&self) -> Duration {
        self.interval.max(MIN_POLL_INTERVAL)
    }

    /// Poll an infallible predicate.  Panics inside the predicate unwind
    /// through the caller.
    pub fn until<F>(&self, mut predicate: F) -> bool
    where
        F: FnMut() -> bool,
    {
        match self.try_until(|| Ok::<_, Infallible>(predicate())) {
            Ok(done) => done,
            Err(never) => match never {},
        }
    }

    /// Poll a fallible predicate.  The first `Err` ends the wait and is
    /// returned as is.
    pub fn try_until<F, E>(&self, mut predicate: F) -> Result<bool, E>
    where
        F: FnMut() -> Result<bool, E>,
    {
        if !self.delay.is_zero() {
            trace!("poll: initial delay {:?}", self.delay);
            thread::sleep(self.delay);
        }

        let interval = self.effective_interval();
        let start = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            if predicate()? {
                debug!(
                    "poll: condition met after {attempts} attempt(s) in {:?}",
                    start.elapsed()
                );
                return Ok(true);
            }

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                debug!(
                    "poll: gave up after {attempts} attempt(s) in {elapsed:?} (timeout {:?})",
                    self.timeout
                );
                return Ok(false);
            }

            trace!("poll: attempt {attempts} not satisfied, sleeping {interval:?}");
            thread::sleep(interval);
        }
    }
}

/// Wait up to `timeout` for `predicate` to return true, checking every
/// `interval` after an initial `delay`.
///
/// The predicate is always called at least once.
pub fn wait_until<F>(timeout: Duration, interval: Duration, delay: Duration, predicate: F) -> bool
where
    F: FnMut() -> bool,
{
    Poll::new(timeout, interval)
        .with_delay(delay)
        .until(predicate)
}

/// Like [`wait_until`], for predicates that can fail.
pub fn try_wait_until<F, E>(
    timeout: Duration,
    interval: Duration,
    delay: Duration,
    predicate: F,
) -> Result<bool, E>
where
    F: FnMut() -> Result<bool, E>,
{
    Poll::new(timeout, interval)
        .with_delay(delay)
        .try_until(predicate)
}
