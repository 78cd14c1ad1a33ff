//! Non-reentrancy guard for state-changing engine operations.
//!
//! A thread that already holds the lock and tries to take it again (for example from inside a
//! token callback) is rejected with `ReentrantCall`. Other threads queue until it is released.

use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};

use tracing::warn;

use crate::error::EngineError;

/// Ownership is tracked per thread. A callback that hands re-entry to another thread and then
/// waits for it deadlocks instead of failing with `ReentrantCall`; collaborators must call back
/// on the thread that called them.
#[derive(Debug, Default)]
pub struct ReentrancyLock {
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
}

impl ReentrancyLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self, operation: &'static str) -> Result<ReentrancyGuard<'_>, EngineError> {
        let current = thread::current().id();
        let mut owner = self.owner.lock().map_err(|_| EngineError::LockPoisoned)?;
        loop {
            match *owner {
                None => break,
                Some(holder) if holder == current => {
                    warn!(operation, "Rejected reentrant call");
                    return Err(EngineError::ReentrantCall);
                }
                Some(_) => {
                    owner = self
                        .released
                        .wait(owner)
                        .map_err(|_| EngineError::LockPoisoned)?;
                }
            }
        }
        *owner = Some(current);
        Ok(ReentrancyGuard { lock: self })
    }

}

/// Releases the lock on drop, including on early return or unwind.
#[derive(Debug)]
pub struct ReentrancyGuard<'a> {
    lock: &'a ReentrancyLock,
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        let mut owner = self
            .lock
            .owner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *owner = None;
        self.lock.released.notify_one();
    }
}
