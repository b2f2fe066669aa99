//! Cancellation primitives shared between the host and worker threads
use crate::Error;
use std::{
    cell::Cell,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Instant,
};

/// Token to cancel an in-progress batch
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Build a new token, which is initialized as "not cancelled"
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark this token as cancelled
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Check if the token is cancelled
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Number of [`Watchdog::check`] calls between clock reads
const CLOCK_INTERVAL: u32 = 64;

/// Per-thread guard which stops evaluation on cancellation or deadline
///
/// The token is checked on every call; the clock is only read every
/// [`CLOCK_INTERVAL`] calls.  When the deadline passes, the token is
/// cancelled so that sibling threads stop as well.
pub(crate) struct Watchdog {
    token: Option<CancelToken>,
    deadline: Option<Instant>,
    ticks: Cell<u32>,
}

impl Watchdog {
    pub fn new(token: CancelToken, deadline: Option<Instant>) -> Self {
        Self {
            token: Some(token),
            deadline,
            ticks: Cell::new(0),
        }
    }

    /// Builds a watchdog that never fires
    pub fn unbounded() -> Self {
        Self {
            token: None,
            deadline: None,
            ticks: Cell::new(0),
        }
    }

    pub fn check(&self) -> Result<(), Error> {
        let Some(token) = &self.token else {
            return Ok(());
        };
        if token.is_cancelled() {
            return Err(Error::Interrupted);
        }
        let t = self.ticks.get().wrapping_add(1);
        self.ticks.set(t);
        if t % CLOCK_INTERVAL == 0
            && self.deadline.is_some_and(|d| Instant::now() >= d)
        {
            token.cancel();
            return Err(Error::Interrupted);
        }
        Ok(())
    }
}

/// RAII guard counting one live worker context
///
/// The count is incremented on construction and decremented on drop, so it
/// returns to its baseline on every exit path of the worker.
pub(crate) struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    pub fn new(count: Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(count)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_token() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn test_watchdog_deadline() {
        let token = CancelToken::new();
        let dog = Watchdog::new(token.clone(), Some(Instant::now()));
        let mut n = 0;
        while dog.check().is_ok() {
            n += 1;
        }
        assert!(n < CLOCK_INTERVAL);
        assert!(token.is_cancelled());

        let dog = Watchdog::new(
            CancelToken::new(),
            Some(Instant::now() + Duration::from_secs(60)),
        );
        for _ in 0..1000 {
            assert!(dog.check().is_ok());
        }
        assert!(Watchdog::unbounded().check().is_ok());
    }

    #[test]
    fn test_live_guard() {
        let count = Arc::new(AtomicUsize::new(0));
        let a = LiveGuard::new(count.clone());
        let b = LiveGuard::new(count.clone());
        assert_eq!(count.load(Ordering::SeqCst), 2);
        drop(a);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        drop(b);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
