use std::sync::{Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Result, StoreError};

const BACKOFF: Duration = Duration::from_micros(50);

/// Acquire `mutex`, giving up with [`StoreError::Timeout`] at `deadline`.
pub(crate) fn lock_until<'a, T>(
    mutex: &'a Mutex<T>,
    deadline: Instant,
    resource: &'static str,
) -> Result<MutexGuard<'a, T>> {
    let started = Instant::now();
    loop {
        match mutex.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(_)) => return Err(StoreError::Poisoned(resource)),
            Err(TryLockError::WouldBlock) => {
                if Instant::now() >= deadline {
                    return Err(StoreError::Timeout {
                        resource,
                        waited_ms: started.elapsed().as_millis() as u64,
                    });
                }
                thread::sleep(BACKOFF);
            }
        }
    }
}
