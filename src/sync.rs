//! Small synchronization helpers shared across the crate.

use std::sync::{Mutex, MutexGuard};

/// Acquire mutex guard, ignoring poisoning
pub(crate) fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
