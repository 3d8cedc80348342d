use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::{Condvar, Mutex};

use super::error::DriverError;

const UNINITIALIZED: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;
const FAILED: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

/// Runs an initialization exactly once, however many workers race for it.
///
/// The first caller of [`SeedLatch::get_or_init`] moves the latch from
/// `Uninitialized` to `Initializing` and runs the initializer; every other
/// caller blocks until it settles as `Ready` or `Failed` and then observes the
/// same outcome.
pub struct SeedLatch<T> {
    state: AtomicU8,
    outcome: Mutex<Option<Result<Arc<T>, String>>>,
    settled: Condvar,
}

impl<T> Default for SeedLatch<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SeedLatch<T> {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINITIALIZED),
            outcome: Mutex::new(None),
            settled: Condvar::new(),
        }
    }

    pub fn state(&self) -> LatchState {
        match self.state.load(Ordering::Acquire) {
            UNINITIALIZED => LatchState::Uninitialized,
            INITIALIZING => LatchState::Initializing,
            READY => LatchState::Ready,
            _ => LatchState::Failed,
        }
    }

    /// The initialized value, without waiting. `None` unless `Ready`.
    pub fn get(&self) -> Option<Arc<T>> {
        match self.outcome.lock().as_ref() {
            Some(Ok(value)) => Some(Arc::clone(value)),
            _ => None,
        }
    }

    /// Returns the initialized value, running `init` if nobody has yet.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::SeedFailed` to every caller if the initializer
    /// failed.
    pub fn get_or_init<F>(&self, init: F) -> Result<Arc<T>, DriverError>
    where
        F: FnOnce() -> Result<T, DriverError>,
    {
        if self
            .state
            .compare_exchange(UNINITIALIZED, INITIALIZING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let outcome = init().map(Arc::new).map_err(|e| e.to_string());
            let mut slot = self.outcome.lock();
            *slot = Some(outcome.clone());
            let settled_state = if outcome.is_ok() { READY } else { FAILED };
            self.state.store(settled_state, Ordering::Release);
            drop(slot);
            self.settled.notify_all();
            return outcome.map_err(DriverError::SeedFailed);
        }

        let mut slot = self.outcome.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone().map_err(DriverError::SeedFailed);
            }
            self.settled.wait(&mut slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn initializer_runs_once_across_racing_threads() {
        let latch = Arc::new(SeedLatch::<usize>::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let latch = Arc::clone(&latch);
                let runs = Arc::clone(&runs);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    latch
                        .get_or_init(|| {
                            runs.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            Ok(99)
                        })
                        .map(|value| *value)
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 99);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(latch.state(), LatchState::Ready);
    }

    #[test]
    fn failure_is_observed_by_later_callers() {
        let latch = SeedLatch::<usize>::new();
        let first = latch.get_or_init(|| Err(DriverError::Probe("no catalog".to_string())));
        assert!(matches!(first, Err(DriverError::SeedFailed(_))));
        assert_eq!(latch.state(), LatchState::Failed);

        let second = latch.get_or_init(|| Ok(1));
        match second {
            Err(DriverError::SeedFailed(message)) => assert_eq!(message, "no catalog"),
            other => panic!("expected SeedFailed, got {other:?}"),
        }
        assert!(latch.get().is_none());
    }
}
