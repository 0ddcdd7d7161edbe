use std::sync::atomic::{AtomicU64, Ordering};

/// Lamport logical clock shared between the request loop and the
/// replica listener of a process.
///
/// The two rules:
/// - before emitting a frame, call [`tick`](Self::tick) and stamp the
///   returned value on the frame;
/// - after receiving a frame carrying `remote`, call
///   [`observe`](Self::observe) so the local clock jumps past it.
///
/// Updates are lock-free compare-and-swap so concurrent tasks never lose
/// a bump.
#[derive(Debug, Default)]
pub struct LamportClock(AtomicU64);

impl LamportClock {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Resume from a previously observed value.
    pub fn starting_at(value: u64) -> Self {
        Self(AtomicU64::new(value))
    }

    /// The current value, without advancing.
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Advance by one for a local event and return the new value.
    pub fn tick(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Merge a remote clock value: `local = max(local, remote) + 1`.
    /// Returns the new local value.
    pub fn observe(&self, remote: u64) -> u64 {
        let mut current = self.0.load(Ordering::SeqCst);
        loop {
            let next = current.max(remote) + 1;
            match self
                .0
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}
